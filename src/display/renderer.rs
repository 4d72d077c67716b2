/*
 *  display/renderer.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  One render routine per content kind, drawn on a canvas then pushed
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
use core::fmt::Write;
use embedded_graphics::mono_font::ascii::{FONT_5X8, FONT_6X10};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, PrimitiveStyleBuilder, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use log::{debug, warn};
use std::time::Instant;

use crate::animation::{ANIMATION_FONT, text_width};
use crate::constants::ANIMATION_IMAGE_WIDTH;
use crate::display::error::DisplayError;
use crate::display::factory::BoxedDriver;
use crate::display::framebuffer::Canvas;
use crate::render::{
    AnimationFrame, MusicContent, MusicStatus, PredictionStatus, RenderContent, RenderMessage, TextContent, TextStatus, TransitContent, palette,
};
use crate::sign::SignMode;

const TEXT_FONT: &MonoFont<'static> = &FONT_6X10;
const SMALL_FONT: &MonoFont<'static> = &FONT_5X8;

/// Board rows, top edge of each line.
const ROW_Y: [i32; 2] = [3, 19];
const MARGIN: i32 = 2;

/// Music layout: times sit under the scrolling title/artist, bar at the bottom.
const TIME_Y: i32 = 20;
const PROGRESS_Y: i32 = 30;
const PROGRESS_HEIGHT: u32 = 2;

/// Text shown when a mode's provider reports an error.
pub fn fallback(mode: SignMode) -> &'static str {
    match mode {
        SignMode::Transit => "Failed to fetch MBTA data",
        SignMode::Music => "Nothing is playing",
        SignMode::Clock => "Time unavailable",
        SignMode::Test => "No test signal",
    }
}

/// Longest position shown: 99:59:59.
const MAX_SHOWN_SECS: i64 = 100 * 3600 - 1;

/// Format a song position as `MM:SS`, or `HH:MM:SS` past the hour.
/// `negative` prefixes a minus, for time remaining. Anything past 99 hours
/// is shown as 99:59:59.
pub fn format_millis(ms: i64, negative: bool) -> ArrayString<16> {
    let total = (ms.max(0) / 1000).min(MAX_SHOWN_SECS);
    let (hours, mins, secs) = (total / 3600, (total / 60) % 60, total % 60);
    let mut out = ArrayString::new();
    let sign = if negative { "-" } else { "" };
    let written = if hours > 0 {
        write!(&mut out, "{}{:02}:{:02}:{:02}", sign, hours, mins, secs)
    } else {
        write!(&mut out, "{}{:02}:{:02}", sign, mins, secs)
    };
    if written.is_err() {
        out.clear();
        out.push_str("--:--");
    }
    out
}

/// Frame timing, warns when pushing frames falls behind the animation rate.
#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    pub render_time_us: u64,
    pub transfer_time_us: u64,
    pub frame_count: u64,
    pub avg_frame_time_us: u64,
    pub target_frame_time_us: u64,
}

impl PerformanceMetrics {
    pub fn new(target_fps: u32) -> Self {
        Self {
            render_time_us: 0,
            transfer_time_us: 0,
            frame_count: 0,
            avg_frame_time_us: 0,
            target_frame_time_us: 1_000_000 / u64::from(target_fps.max(1)),
        }
    }

    pub fn record_frame(&mut self, render_time_us: u64, transfer_time_us: u64) {
        self.render_time_us = render_time_us;
        self.transfer_time_us = transfer_time_us;
        let frame_time_us = render_time_us + transfer_time_us;
        self.frame_count += 1;

        if self.avg_frame_time_us == 0 {
            self.avg_frame_time_us = frame_time_us;
        } else {
            self.avg_frame_time_us = (self.avg_frame_time_us + frame_time_us) / 2;
        }

        if frame_time_us > self.target_frame_time_us * 12 / 10 {
            warn!(
                "Frame time {}μs exceeds target {}μs (render: {}μs, transfer: {}μs)",
                frame_time_us, self.target_frame_time_us, render_time_us, transfer_time_us
            );
        }
    }
}

/// What currently fills the panel, outside the animation boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Blank,
    /// The prediction board, not a banner.
    Board,
    TransitNotice,
    Text,
    Music,
    MusicFallback,
}

/// Owns the canvas and the driver. Only the display consumer holds one.
pub struct Renderer {
    canvas: Canvas,
    driver: BoxedDriver,
    screen: Screen,
    pub metrics: PerformanceMetrics,
}

impl Renderer {
    pub fn new(driver: BoxedDriver, target_fps: u32) -> Self {
        let (w, h) = driver.dimensions();
        Self {
            canvas: Canvas::new(w, h),
            driver,
            screen: Screen::Blank,
            metrics: PerformanceMetrics::new(target_fps),
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Bring the panel up blank at the given brightness.
    pub fn init(&mut self, brightness: u8) -> Result<(), DisplayError> {
        self.driver.init()?;
        if self.driver.capabilities().supports_brightness {
            self.driver.set_brightness(brightness)?;
        }
        self.clear()
    }

    /// Blank canvas and panel.
    pub fn clear(&mut self) -> Result<(), DisplayError> {
        self.canvas.blank();
        self.screen = Screen::Blank;
        self.driver.clear()
    }

    /// Draw one message. Returns whether a frame was pushed to the panel.
    pub fn render(&mut self, msg: &RenderMessage) -> Result<bool, DisplayError> {
        let started = Instant::now();
        let dirty = match &msg.content {
            RenderContent::Transit(t) => self.render_transit(t)?,
            RenderContent::Text(t) => self.render_text(msg.mode, t)?,
            RenderContent::Music(m) => self.render_music(m)?,
            RenderContent::Animation(a) => self.render_animation(a)?,
        };
        if !dirty {
            return Ok(false);
        }
        let render_us = started.elapsed().as_micros() as u64;
        let transfer = Instant::now();
        self.flush()?;
        self.metrics.record_frame(render_us, transfer.elapsed().as_micros() as u64);
        Ok(true)
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        let (w, h) = (self.canvas.width(), self.canvas.height());
        self.driver.draw_bitmap(self.canvas.as_slice(), w, h)
    }

    fn render_transit(&mut self, content: &TransitContent) -> Result<bool, DisplayError> {
        match content.status {
            PredictionStatus::Ok => self.draw_board(content)?,
            PredictionStatus::OkShowArrivingBanner(slot) => {
                let label = content.predictions.get(slot).map(|p| p.label.as_str()).unwrap_or("");
                let mut first = ArrayString::<32>::new();
                if write!(&mut first, "{} train", label).is_err() {
                    first.clear();
                    first.push_str("Train");
                }
                self.canvas.blank();
                self.draw_centered_at(&first, ROW_Y[0], palette::AMBER)?;
                self.draw_centered_at("is now arriving.", ROW_Y[1], palette::AMBER)?;
                self.screen = Screen::TransitNotice;
            }
            PredictionStatus::OkShowStationBanner => {
                self.canvas.blank();
                self.draw_centered(content.predictions[0].label.as_str(), palette::AMBER)?;
                self.screen = Screen::TransitNotice;
            }
            PredictionStatus::Error => {
                self.canvas.blank();
                self.draw_centered(fallback(SignMode::Transit), palette::RED)?;
                self.screen = Screen::TransitNotice;
            }
            // unchanged since the provider's last poll, which this panel
            // may never have seen (discarded while another mode was up)
            PredictionStatus::Skip => {
                if self.screen == Screen::Board {
                    return Ok(false);
                }
                debug!("Skip over {:?} screen, drawing the carried board", self.screen);
                self.draw_board(content)?;
            }
        }
        Ok(true)
    }

    fn draw_board(&mut self, content: &TransitContent) -> Result<(), DisplayError> {
        self.canvas.blank();
        let style = MonoTextStyle::new(TEXT_FONT, palette::AMBER);
        let right = self.canvas.width() as i32 - MARGIN;
        for (prediction, &y) in content.predictions.iter().zip(ROW_Y.iter()) {
            Text::with_baseline(prediction.label.as_str(), Point::new(MARGIN, y), style, Baseline::Top)
                .draw(&mut self.canvas)?;
            let x = justify_right(TEXT_FONT, prediction.value.as_str(), right);
            Text::with_baseline(prediction.value.as_str(), Point::new(x, y), style, Baseline::Top)
                .draw(&mut self.canvas)?;
        }
        self.screen = Screen::Board;
        Ok(())
    }

    fn render_text(&mut self, mode: SignMode, content: &TextContent) -> Result<bool, DisplayError> {
        self.canvas.blank();
        self.screen = Screen::Text;
        match content.status {
            TextStatus::Ok => self.draw_centered(&content.text, content.color)?,
            TextStatus::Error => self.draw_centered(fallback(mode), palette::RED)?,
        }
        Ok(true)
    }

    fn render_music(&mut self, content: &MusicContent) -> Result<bool, DisplayError> {
        if content.status == MusicStatus::Error {
            self.canvas.blank();
            self.draw_centered(fallback(SignMode::Music), palette::WHITE)?;
            self.screen = Screen::MusicFallback;
            return Ok(true);
        }

        let width = self.canvas.width();
        let height = self.canvas.height();
        let cover = Rectangle::new(Point::zero(), Size::new(ANIMATION_IMAGE_WIDTH, height));
        let info = Rectangle::new(
            Point::new(ANIMATION_IMAGE_WIDTH as i32, TIME_Y),
            Size::new(width.saturating_sub(ANIMATION_IMAGE_WIDTH), height.saturating_sub(TIME_Y as u32)),
        );
        if self.screen == Screen::Music {
            // the scrolling title and artist keep their own boxes
            self.canvas.fill_solid(&cover, palette::BLACK)?;
            self.canvas.fill_solid(&info, palette::BLACK)?;
        } else {
            self.canvas.blank();
            self.screen = Screen::Music;
        }

        // cover art placeholder
        cover
            .into_styled(PrimitiveStyle::with_stroke(palette::SPOTIFY_GREEN, 1))
            .draw(&mut self.canvas)?;

        let song = &content.now_playing;
        let color = if content.status == MusicStatus::OkShowCached { palette::AMBER } else { palette::WHITE };
        let style = MonoTextStyle::new(SMALL_FONT, color);
        let left = ANIMATION_IMAGE_WIDTH as i32 + MARGIN;
        let elapsed = format_millis(song.progress_ms, false);
        Text::with_baseline(&elapsed, Point::new(left, TIME_Y), style, Baseline::Top)
            .draw(&mut self.canvas)?;
        let remaining = format_millis(song.duration_ms - song.progress_ms, true);
        let x = justify_right(SMALL_FONT, &remaining, width as i32 - MARGIN);
        Text::with_baseline(&remaining, Point::new(x, TIME_Y), style, Baseline::Top)
            .draw(&mut self.canvas)?;

        self.draw_progress(song.progress_ratio())?;
        Ok(true)
    }

    fn draw_progress(&mut self, ratio: f32) -> Result<(), DisplayError> {
        let x = ANIMATION_IMAGE_WIDTH as i32;
        let width = self.canvas.width().saturating_sub(ANIMATION_IMAGE_WIDTH);
        Rectangle::new(Point::new(x, PROGRESS_Y), Size::new(width, PROGRESS_HEIGHT))
            .into_styled(PrimitiveStyleBuilder::new().fill_color(palette::BLUE).build())
            .draw(&mut self.canvas)?;

        let fill = (width as f32 * ratio.clamp(0.0, 1.0)) as u32;
        if fill > 0 {
            Rectangle::new(Point::new(x, PROGRESS_Y), Size::new(fill, PROGRESS_HEIGHT))
                .into_styled(PrimitiveStyle::with_fill(palette::SPOTIFY_GREEN))
                .draw(&mut self.canvas)?;
        }
        Ok(())
    }

    /// Blank the box, then draw the text at both wrap positions, clipped to the box.
    fn render_animation(&mut self, frame: &AnimationFrame) -> Result<bool, DisplayError> {
        let bbox = frame.bbox.to_rectangle();
        self.canvas.fill_solid(&bbox, palette::BLACK)?;

        let style = MonoTextStyle::new(ANIMATION_FONT, palette::WHITE);
        let mut clipped = self.canvas.clipped(&bbox);
        let x = frame.bbox.x + frame.offset as i32;
        for x in [x - frame.wrap_width as i32, x] {
            Text::with_baseline(&frame.text, Point::new(x, frame.bbox.y), style, Baseline::Top)
                .draw(&mut clipped)?;
        }
        Ok(true)
    }

    fn draw_centered(&mut self, text: &str, color: Rgb565) -> Result<(), DisplayError> {
        let y = (self.canvas.height() as i32 - TEXT_FONT.character_size.height as i32) / 2;
        self.draw_centered_at(text, y, color)
    }

    fn draw_centered_at(&mut self, text: &str, y: i32, color: Rgb565) -> Result<(), DisplayError> {
        let x = justify_center(TEXT_FONT, text, self.canvas.width());
        Text::with_baseline(text, Point::new(x, y), MonoTextStyle::new(TEXT_FONT, color), Baseline::Top)
            .draw(&mut self.canvas)?;
        Ok(())
    }
}

/// x at which `text` ends at `right_edge`.
fn justify_right(font: &MonoFont<'_>, text: &str, right_edge: i32) -> i32 {
    right_edge - text_width(font, text) as i32
}

/// x that centres `text` across `width`; never negative.
fn justify_center(font: &MonoFont<'_>, text: &str, width: u32) -> i32 {
    (width.saturating_sub(text_width(font, text)) / 2) as i32
}
