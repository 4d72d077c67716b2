/*
 *  display/drivers/headless.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  In-memory panel: keeps the last frame and counts every call
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

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::RgbColor;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::display::error::DisplayError;
use crate::display::traits::{DisplayCapabilities, DisplayDriver, check_frame};

/// Headless display driver
///
/// Runs the whole pipeline without a panel attached. Tests and CI use it to
/// inspect what would have been shown; the state handle stays valid after
/// the driver moves onto the display thread.
#[derive(Debug, Clone)]
pub struct HeadlessDriver {
    capabilities: DisplayCapabilities,
    state: Arc<Mutex<HeadlessState>>,
}

/// Shared state for inspection
#[derive(Debug, Default)]
pub struct HeadlessState {
    pub init_count: usize,
    pub frame_count: usize,
    pub clear_count: usize,
    pub last_brightness: Option<u8>,
    pub is_initialized: bool,
    /// Last frame pushed, row-major
    pub frame: Vec<Rgb565>,

    /// Simulate failures (for error testing)
    pub simulate_draw_failure: bool,
    pub simulate_init_failure: bool,
}

impl HeadlessState {
    /// Pixels in the last frame that are not black
    pub fn lit_pixels(&self) -> usize {
        self.frame.iter().filter(|&&p| p != Rgb565::BLACK).count()
    }
}

impl HeadlessDriver {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            capabilities: DisplayCapabilities {
                width,
                height,
                max_fps: 120,
                supports_brightness: true,
            },
            state: Arc::new(Mutex::new(HeadlessState {
                frame: vec![Rgb565::BLACK; (width * height) as usize],
                ..Default::default()
            })),
        }
    }

    /// Handle for inspection
    pub fn state(&self) -> Arc<Mutex<HeadlessState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HeadlessState>, DisplayError> {
        self.state
            .lock()
            .map_err(|_| DisplayError::Other("headless state poisoned".to_string()))
    }
}

impl DisplayDriver for HeadlessDriver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        let mut state = self.lock()?;
        if state.simulate_init_failure {
            return Err(DisplayError::InitializationFailed("simulated".to_string()));
        }
        state.init_count += 1;
        state.is_initialized = true;
        Ok(())
    }

    fn draw_bitmap(&mut self, pixels: &[Rgb565], width: u32, height: u32) -> Result<(), DisplayError> {
        check_frame(&self.capabilities, pixels, width, height)?;
        let mut state = self.lock()?;
        if state.simulate_draw_failure {
            return Err(DisplayError::Other("Simulated draw failure".to_string()));
        }
        state.frame.clear();
        state.frame.extend_from_slice(pixels);
        state.frame_count += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        let mut state = self.lock()?;
        state.frame.fill(Rgb565::BLACK);
        state.clear_count += 1;
        Ok(())
    }

    fn set_brightness(&mut self, value: u8) -> Result<(), DisplayError> {
        self.lock()?.last_brightness = Some(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_init() {
        let mut driver = HeadlessDriver::new(160, 32);
        let state = driver.state();
        assert!(!state.lock().unwrap().is_initialized);
        driver.init().unwrap();
        assert_eq!(state.lock().unwrap().init_count, 1);
        assert!(state.lock().unwrap().is_initialized);
    }

    #[test]
    fn test_headless_frame_and_clear() {
        let mut driver = HeadlessDriver::new(4, 2);
        let frame = vec![Rgb565::RED; 8];
        driver.draw_bitmap(&frame, 4, 2).unwrap();
        assert_eq!(driver.state().lock().unwrap().lit_pixels(), 8);

        driver.clear().unwrap();
        let state = driver.state();
        let state = state.lock().unwrap();
        assert_eq!(state.lit_pixels(), 0);
        assert_eq!(state.clear_count, 1);
        assert_eq!(state.frame_count, 1);
    }

    #[test]
    fn test_headless_rejects_wrong_geometry() {
        let mut driver = HeadlessDriver::new(4, 2);
        assert!(matches!(
            driver.draw_bitmap(&[Rgb565::RED; 3], 4, 2),
            Err(DisplayError::BufferSizeMismatch { expected: 8, actual: 3 })
        ));
        assert!(driver.draw_bitmap(&[Rgb565::RED; 8], 2, 4).is_err());
    }

    #[test]
    fn test_headless_brightness_and_failures() {
        let mut driver = HeadlessDriver::new(4, 2);
        driver.set_brightness(90).unwrap();
        assert_eq!(driver.state().lock().unwrap().last_brightness, Some(90));

        driver.state().lock().unwrap().simulate_draw_failure = true;
        assert!(driver.draw_bitmap(&[Rgb565::RED; 8], 4, 2).is_err());
    }
}
