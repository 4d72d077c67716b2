/*
 *  providers/clock.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
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

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, Utc};
use embedded_graphics::pixelcolor::Rgb565;
use log::warn;
use std::fmt::Write;
use std::sync::Arc;

use crate::fetch::ProviderError;
use crate::providers::Provider;
use crate::render::RenderMessage;
use crate::sign::SignMode;

/// Wall-clock time source. `None` means the clock is not trustworthy yet.
pub trait WallClock: Send + Sync {
    fn now(&self) -> Option<DateTime<Utc>>;
}

/// System time, rejected until it has been set (e.g. by NTP after boot).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        // an unsynchronised RTC starts at the epoch
        (now.year() >= 2020).then_some(now)
    }
}

/// Shows the time of day as text.
pub struct ClockProvider {
    clock: Arc<dyn WallClock>,
    format: String,
    utc: bool,
    color: Rgb565,
    error_logged: bool,
}

impl ClockProvider {
    pub fn new(clock: Arc<dyn WallClock>, format: impl Into<String>, utc: bool, color: Rgb565) -> Self {
        Self {
            clock,
            format: format.into(),
            utc,
            color,
            error_logged: false,
        }
    }

    /// Current time formatted for display.
    pub fn time_string(&self) -> Result<String, ProviderError> {
        let now = self.clock.now().ok_or(ProviderError::ClockUnavailable)?;
        let mut out = String::new();
        // a bad strftime pattern surfaces as fmt::Error rather than a panic
        let written = if self.utc {
            write!(out, "{}", now.format(&self.format))
        } else {
            write!(out, "{}", now.with_timezone(&Local).format(&self.format))
        };
        written.map_err(|_| ProviderError::NotConfigured("clock.format"))?;
        Ok(out)
    }
}

#[async_trait]
impl Provider for ClockProvider {
    fn mode(&self) -> SignMode {
        SignMode::Clock
    }

    fn name(&self) -> &'static str {
        "clock"
    }

    async fn poll(&mut self) -> RenderMessage {
        match self.time_string() {
            Ok(text) => {
                self.error_logged = false;
                RenderMessage::text(SignMode::Clock, text, self.color)
            }
            Err(e) => {
                // once per outage, not once a second
                if !self.error_logged {
                    warn!("Clock: {}", e);
                    self.error_logged = true;
                }
                RenderMessage::text_error(SignMode::Clock)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::render::{RenderContent, palette};
    use chrono::TimeZone;

    pub(crate) struct FixedClock(pub Option<DateTime<Utc>>);

    impl WallClock for FixedClock {
        fn now(&self) -> Option<DateTime<Utc>> {
            self.0
        }
    }

    pub(crate) fn at(h: u32, m: u32, s: u32) -> Arc<FixedClock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 3, 9, h, m, s).single()))
    }

    #[tokio::test]
    async fn test_formats_time() {
        let mut p = ClockProvider::new(at(7, 5, 9), "%H:%M:%S", true, palette::AMBER);
        let msg = p.poll().await;
        assert_eq!(msg.mode, SignMode::Clock);
        match &msg.content {
            RenderContent::Text(t) => {
                assert_eq!(t.text, "07:05:09");
                assert_eq!(t.color, palette::AMBER);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!msg.is_error());
    }

    #[tokio::test]
    async fn test_unavailable_clock_is_error() {
        let mut p = ClockProvider::new(Arc::new(FixedClock(None)), "%H:%M", true, palette::AMBER);
        assert!(p.poll().await.is_error());
    }

    #[test]
    fn test_bad_format_is_reported() {
        let p = ClockProvider::new(at(1, 2, 3), "%Q", true, palette::AMBER);
        assert!(p.time_string().is_err());
    }

    #[test]
    fn test_system_clock_is_set() {
        assert!(SystemClock.now().is_some());
    }
}
