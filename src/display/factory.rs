/*
 *  display/factory.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Builds the configured display driver
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use crate::config::{DisplayConfig, DriverKind};
use crate::display::drivers::{HeadlessDriver, SnapshotDriver};
use crate::display::error::DisplayError;
use crate::display::traits::DisplayDriver;
use log::{debug, info};

/// Type alias for boxed display driver trait objects
pub type BoxedDriver = Box<dyn DisplayDriver>;

/// Factory for creating display drivers from configuration
pub struct DisplayDriverFactory;

impl DisplayDriverFactory {
    /// Create a display driver from configuration
    ///
    /// The driver is returned uninitialised; the display consumer calls
    /// `init()` once it owns it.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = DisplayConfig {
    ///     driver: DriverKind::Snapshot,
    ///     snapshot_path: "/tmp/sign.ppm".into(),
    ///     ..Default::default()
    /// };
    ///
    /// let driver = DisplayDriverFactory::create_from_config(&config)?;
    /// ```
    pub fn create_from_config(config: &DisplayConfig) -> Result<BoxedDriver, DisplayError> {
        if config.width == 0 || config.height == 0 {
            return Err(DisplayError::InvalidConfiguration(format!(
                "display size {}x{} is empty",
                config.width, config.height
            )));
        }

        info!("Creating {:?} display driver, {}x{}", config.driver, config.width, config.height);

        let driver: BoxedDriver = match config.driver {
            DriverKind::Headless => Box::new(HeadlessDriver::new(config.width, config.height)),
            DriverKind::Snapshot => {
                debug!("Snapshot path: {}", config.snapshot_path.display());
                Box::new(SnapshotDriver::new(
                    config.width,
                    config.height,
                    config.snapshot_path.clone(),
                ))
            }
        };
        Ok(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_headless() {
        let driver = DisplayDriverFactory::create_from_config(&DisplayConfig::default()).unwrap();
        assert_eq!(driver.dimensions(), (160, 32));
    }

    #[test]
    fn test_rejects_empty_display() {
        let config = DisplayConfig { width: 0, ..Default::default() };
        assert!(matches!(
            DisplayDriverFactory::create_from_config(&config),
            Err(DisplayError::InvalidConfiguration(_))
        ));
    }
}
