/*
 *  constants.rs
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

use std::time::Duration;

/// Width in pixels of a single HUB75 panel module.
pub const PANEL_RES_X: u32 = 32;
/// Height in pixels of a single HUB75 panel module.
pub const PANEL_RES_Y: u32 = 32;
/// Number of panels chained one to another.
pub const PANEL_CHAIN: u32 = 5;

/// The width of the whole sign.
pub const SCREEN_WIDTH: u32 = PANEL_RES_X * PANEL_CHAIN;
/// The height of the whole sign.
pub const SCREEN_HEIGHT: u32 = PANEL_RES_Y;

/// Default panel brightness (0-255).
pub const DEFAULT_BRIGHTNESS: u8 = 90;

// Channel sizing and timing
pub const RENDER_QUEUE_CAPACITY: usize = 8;
pub const CONTROL_QUEUE_CAPACITY: usize = 4;
pub const ANIMATION_QUEUE_CAPACITY: usize = 8;
pub const PROVIDER_COMMAND_CAPACITY: usize = 2;
/// Producers give up on a full queue after this long.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(10);
/// Display consumer wakes at least this often to notice mode changes.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(10);

// Provider cadences
pub const TRANSIT_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const CLOCK_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const MUSIC_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const TEST_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const CONNECTIVITY_CHECK_INTERVAL: Duration = Duration::from_secs(30);
/// A single external fetch is abandoned after this long.
pub const FETCH_DEADLINE: Duration = Duration::from_secs(8);

// Animation geometry
/// Leftward scroll speed in pixels per second.
pub const ANIMATION_SCROLL_SPEED: i32 = -10;
/// Blank gap appended after the text before it wraps around.
pub const ANIMATION_WRAP_PADDING: u32 = 8;
pub const ANIMATION_FONT_HEIGHT: u32 = 8;
/// Album cover slot on the left of the music layout.
pub const ANIMATION_IMAGE_WIDTH: u32 = 32;
pub const ANIMATION_FPS: u32 = 30;

/// Upper bound for prediction labels and values.
pub const MAX_PREDICTION_CHARS: usize = 16;
/// Status strings are cut to this many characters.
pub const STATUS_TOKEN_CHARS: usize = 6;

/// Cached now-playing data older than this is not shown.
pub const MUSIC_FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);
/// Spotify access tokens are refreshed at least this often.
pub const SPOTIFY_TOKEN_REFRESH_RATE: Duration = Duration::from_secs(30 * 60);
