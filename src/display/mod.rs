/*
 *  display/mod.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display subsystem - drivers, canvas, renderer and the consumer task
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

// Core trait definitions
pub mod traits;
pub mod error;
pub mod framebuffer;
pub mod factory;

// Display drivers
pub mod drivers;

// Content routines
pub mod renderer;

// The task that owns the display
pub mod consumer;

// Re-exports for convenience
pub use consumer::{ConsumerState, ConsumerStats, DisplayConsumer};
pub use error::DisplayError;
pub use factory::{BoxedDriver, DisplayDriverFactory};
pub use framebuffer::Canvas;
pub use renderer::Renderer;
pub use traits::{DisplayCapabilities, DisplayDriver};
