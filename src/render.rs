/*
 *  render.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Render-message protocol: everything a provider can ask the display
 *  consumer to draw. Each message owns its data outright.
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

use arrayvec::ArrayString;
use embedded_graphics::geometry::{Point, Size};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::primitives::Rectangle;
use std::sync::Arc;
use std::time::Instant;

use crate::constants::MAX_PREDICTION_CHARS;
use crate::sign::SignMode;

/// Fixed-capacity text for prediction labels and values.
pub type ShortText = ArrayString<MAX_PREDICTION_CHARS>;

/// Copy as much of `s` as fits, never splitting a character.
pub fn short_text(s: &str) -> ShortText {
    let mut out = ShortText::new();
    for ch in s.chars() {
        if out.try_push(ch).is_err() {
            break;
        }
    }
    out
}

/// Sign palette.
pub mod palette {
    use embedded_graphics::pixelcolor::Rgb565;

    pub const AMBER: Rgb565 = Rgb565::new(31, 47, 0);
    pub const WHITE: Rgb565 = Rgb565::new(31, 63, 31);
    pub const BLACK: Rgb565 = Rgb565::new(0, 0, 0);
    pub const RED: Rgb565 = Rgb565::new(31, 0, 0);
    pub const GREEN: Rgb565 = Rgb565::new(0, 63, 0);
    pub const BLUE: Rgb565 = Rgb565::new(0, 0, 31);
    pub const SPOTIFY_GREEN: Rgb565 = Rgb565::new(3, 46, 10);
}

/// Screen-space box in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn to_rectangle(self) -> Rectangle {
        Rectangle::new(Point::new(self.x, self.y), Size::new(self.w, self.h))
    }
}

/// One line of the transit board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Prediction {
    pub label: ShortText,
    pub value: ShortText,
}

impl Prediction {
    pub fn new(label: &str, value: &str) -> Self {
        Self {
            label: short_text(label),
            value: short_text(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionStatus {
    Ok,
    /// One-shot: the prediction in this slot just became "ARR".
    OkShowArrivingBanner(usize),
    /// The station was just changed; label 0 carries the station name.
    OkShowStationBanner,
    Error,
    /// Nothing new to draw; keep what is on screen.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitContent {
    pub status: PredictionStatus,
    pub predictions: [Prediction; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStatus {
    Ok,
    /// The source failed; `text` is empty and the fallback is shown.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextContent {
    pub status: TextStatus,
    pub text: String,
    pub color: Rgb565,
}

/// Snapshot of the song on the music service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CurrentlyPlaying {
    pub title: String,
    pub artist: String,
    pub duration_ms: i64,
    pub progress_ms: i64,
    /// Wall-clock ms when the song was observed; 0 means never.
    pub timestamp_ms: i64,
    pub album_cover_ref: Option<String>,
}

impl CurrentlyPlaying {
    /// The "no song ever observed" sentinel.
    pub fn nothing() -> Self {
        Self::default()
    }

    pub fn has_song(&self) -> bool {
        self.timestamp_ms != 0
    }

    /// Same (title, artist) pair, ignoring playback position.
    pub fn same_song(&self, other: &CurrentlyPlaying) -> bool {
        self.title == other.title && self.artist == other.artist
    }

    /// Playback position as a fraction of the track, clamped to 0..=1.
    pub fn progress_ratio(&self) -> f32 {
        if self.duration_ms <= 0 {
            return 0.0;
        }
        (self.progress_ms as f32 / self.duration_ms as f32).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicStatus {
    Ok,
    /// Service returned nothing; showing the last fresh song instead.
    OkShowCached,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicContent {
    pub status: MusicStatus,
    pub now_playing: CurrentlyPlaying,
}

/// Fixed animation slots. Each belongs to exactly one sign mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnimationId {
    MusicTitle,
    MusicArtist,
}

impl AnimationId {
    pub const ALL: [AnimationId; 2] = [AnimationId::MusicTitle, AnimationId::MusicArtist];

    /// The mode whose content this animation belongs to.
    pub fn owner(self) -> SignMode {
        match self {
            AnimationId::MusicTitle | AnimationId::MusicArtist => SignMode::Music,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationKind {
    TextScroll,
}

/// One frame of a running animation, ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationFrame {
    pub id: AnimationId,
    pub kind: AnimationKind,
    pub bbox: Rect,
    /// Pixels per second; negative scrolls left, zero is static.
    pub speed: i32,
    pub text: Arc<str>,
    pub started: Instant,
    /// Horizontal shift for this frame, always in `0..wrap_width`.
    pub offset: u32,
    pub wrap_width: u32,
}

/// Payload of a render message, one case per content kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderContent {
    Transit(TransitContent),
    Text(TextContent),
    Music(MusicContent),
    Animation(AnimationFrame),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKind {
    Transit,
    Text,
    Music,
    Animation,
}

impl RenderContent {
    pub fn kind(&self) -> RenderKind {
        match self {
            RenderContent::Transit(_) => RenderKind::Transit,
            RenderContent::Text(_) => RenderKind::Text,
            RenderContent::Music(_) => RenderKind::Music,
            RenderContent::Animation(_) => RenderKind::Animation,
        }
    }
}

/// What travels on the render channel: content plus the mode that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderMessage {
    pub mode: SignMode,
    pub content: RenderContent,
}

impl RenderMessage {
    pub fn transit(status: PredictionStatus, predictions: [Prediction; 2]) -> Self {
        Self {
            mode: SignMode::Transit,
            content: RenderContent::Transit(TransitContent { status, predictions }),
        }
    }

    pub fn text(mode: SignMode, text: impl Into<String>, color: Rgb565) -> Self {
        Self {
            mode,
            content: RenderContent::Text(TextContent {
                status: TextStatus::Ok,
                text: text.into(),
                color,
            }),
        }
    }

    /// A text-mode message reporting that its source failed.
    pub fn text_error(mode: SignMode) -> Self {
        Self {
            mode,
            content: RenderContent::Text(TextContent {
                status: TextStatus::Error,
                text: String::new(),
                color: palette::RED,
            }),
        }
    }

    pub fn music(status: MusicStatus, now_playing: CurrentlyPlaying) -> Self {
        Self {
            mode: SignMode::Music,
            content: RenderContent::Music(MusicContent { status, now_playing }),
        }
    }

    pub fn animation(frame: AnimationFrame) -> Self {
        Self {
            mode: frame.id.owner(),
            content: RenderContent::Animation(frame),
        }
    }

    pub fn kind(&self) -> RenderKind {
        self.content.kind()
    }

    /// True when the producing provider reported a failure.
    pub fn is_error(&self) -> bool {
        match &self.content {
            RenderContent::Transit(t) => t.status == PredictionStatus::Error,
            RenderContent::Text(t) => t.status == TextStatus::Error,
            RenderContent::Music(m) => m.status == MusicStatus::Error,
            RenderContent::Animation(_) => false,
        }
    }
}
