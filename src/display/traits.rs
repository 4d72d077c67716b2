/*
 *  display/traits.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display driver abstraction: the one seam between the renderer and a panel
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

use crate::display::error::DisplayError;

/// Display hardware capabilities
#[derive(Debug, Clone)]
pub struct DisplayCapabilities {
    /// Display width in pixels
    pub width: u32,

    /// Display height in pixels
    pub height: u32,

    /// Maximum refresh rate in frames per second
    pub max_fps: u32,

    /// Whether the panel honours set_brightness
    pub supports_brightness: bool,
}

impl DisplayCapabilities {
    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }
}

/// Core display driver trait
///
/// A driver only moves finished frames to the panel. All drawing happens
/// on the renderer's canvas first.
pub trait DisplayDriver: Send {
    fn capabilities(&self) -> &DisplayCapabilities;

    fn dimensions(&self) -> (u32, u32) {
        let caps = self.capabilities();
        (caps.width, caps.height)
    }

    /// Bring the panel up. Called once before the first frame.
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Push a full frame, row-major, `width * height` pixels.
    fn draw_bitmap(&mut self, pixels: &[Rgb565], width: u32, height: u32) -> Result<(), DisplayError>;

    /// Blank the panel.
    fn clear(&mut self) -> Result<(), DisplayError>;

    /// Set brightness (0-255).
    fn set_brightness(&mut self, value: u8) -> Result<(), DisplayError>;
}

/// Reject a frame whose geometry differs from the panel.
pub fn check_frame(caps: &DisplayCapabilities, pixels: &[Rgb565], width: u32, height: u32) -> Result<(), DisplayError> {
    if width != caps.width || height != caps.height || pixels.len() != caps.pixel_count() {
        return Err(DisplayError::BufferSizeMismatch {
            expected: caps.pixel_count(),
            actual: pixels.len(),
        });
    }
    Ok(())
}
