/*
 *  animation.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Scrolling text scheduler. Offsets are a pure function of elapsed time,
 *  so a dropped frame never desynchronises the scroll.
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

use embedded_graphics::mono_font::MonoFont;
use embedded_graphics::mono_font::ascii::FONT_5X8;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::channel::BestEffortSender;
use crate::constants::{ANIMATION_SCROLL_SPEED, ANIMATION_WRAP_PADDING};
use crate::render::{AnimationFrame, AnimationId, AnimationKind, Rect, RenderMessage};
use crate::sign::{SharedMode, SignMode};

/// Font used for all animated text.
pub const ANIMATION_FONT: &MonoFont<'static> = &FONT_5X8;

/// Rendered width of `text` in `font`, in pixels.
pub fn text_width(font: &MonoFont<'_>, text: &str) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        return 0;
    }
    n * font.character_size.width + (n - 1) * font.character_spacing
}

/// A single scrolling text slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    pub id: AnimationId,
    pub kind: AnimationKind,
    pub bbox: Rect,
    pub speed: i32,
    pub text: Arc<str>,
    pub text_width: u32,
    pub started: Instant,
}

impl Animation {
    /// Distance after which the scroll repeats.
    pub fn wrap_width(&self) -> u32 {
        self.bbox.w.max(self.text_width) + ANIMATION_WRAP_PADDING
    }

    /// Time for one full revolution, `None` for static text.
    pub fn period(&self) -> Option<Duration> {
        if self.speed == 0 {
            return None;
        }
        let ms = u64::from(self.wrap_width()) * 1000 / u64::from(self.speed.unsigned_abs());
        Some(Duration::from_millis(ms))
    }

    /// Horizontal shift at `now`, always in `0..wrap_width`.
    pub fn offset_at(&self, now: Instant) -> u32 {
        if self.speed == 0 {
            return 0;
        }
        let elapsed_ms = now.saturating_duration_since(self.started).as_millis() as i64;
        // floor division keeps the sequence exactly periodic for negative speeds
        let travelled = (i64::from(self.speed) * elapsed_ms).div_euclid(1000);
        travelled.rem_euclid(i64::from(self.wrap_width())) as u32
    }

    pub fn frame_at(&self, now: Instant) -> AnimationFrame {
        AnimationFrame {
            id: self.id,
            kind: self.kind,
            bbox: self.bbox,
            speed: self.speed,
            text: Arc::clone(&self.text),
            started: self.started,
            offset: self.offset_at(now),
            wrap_width: self.wrap_width(),
        }
    }
}

/// Requests from other tasks; the scheduler task is the only owner of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnimationCommand {
    Upsert { id: AnimationId, text: String, bbox: Rect },
    Remove(AnimationId),
    /// Drop every animation owned by this mode.
    ClearMode(SignMode),
}

pub struct AnimationScheduler {
    table: BTreeMap<AnimationId, Animation>,
    font: &'static MonoFont<'static>,
}

impl Default for AnimationScheduler {
    fn default() -> Self {
        Self::new(ANIMATION_FONT)
    }
}

impl AnimationScheduler {
    pub fn new(font: &'static MonoFont<'static>) -> Self {
        Self {
            table: BTreeMap::new(),
            font,
        }
    }

    /// Create or replace the animation for `id`.
    ///
    /// Refreshing with identical text and box keeps the running scroll
    /// position; anything else restarts it at `now`.
    pub fn upsert(&mut self, id: AnimationId, text: &str, bbox: Rect, now: Instant) -> &Animation {
        let width = text_width(self.font, text);
        let speed = if width > bbox.w { ANIMATION_SCROLL_SPEED } else { 0 };
        let started = match self.table.get(&id) {
            Some(old) if &*old.text == text && old.bbox == bbox => old.started,
            _ => now,
        };
        let animation = Animation {
            id,
            kind: AnimationKind::TextScroll,
            bbox,
            speed,
            text: Arc::from(text),
            text_width: width,
            started,
        };
        self.table.insert(id, animation);
        &self.table[&id]
    }

    pub fn remove(&mut self, id: AnimationId) -> Option<Animation> {
        self.table.remove(&id)
    }

    /// Remove everything not owned by `mode`.
    pub fn retain_mode(&mut self, mode: SignMode) {
        self.table.retain(|id, _| id.owner() == mode);
    }

    pub fn clear_mode(&mut self, mode: SignMode) {
        self.table.retain(|id, _| id.owner() != mode);
    }

    pub fn get(&self, id: AnimationId) -> Option<&Animation> {
        self.table.get(&id)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// One render message per active animation. Does not mutate state.
    pub fn tick(&self, now: Instant) -> Vec<RenderMessage> {
        self.table
            .values()
            .map(|a| RenderMessage::animation(a.frame_at(now)))
            .collect()
    }

    /// Apply a command. Upserts for a mode that is not current are refused.
    pub fn apply(&mut self, cmd: AnimationCommand, current: SignMode, now: Instant) {
        match cmd {
            AnimationCommand::Upsert { id, text, bbox } => {
                if id.owner() != current {
                    debug!("Refusing {:?} animation while in {} mode", id, current);
                    return;
                }
                let a = self.upsert(id, &text, bbox, now);
                debug!("Animation {:?} '{}' speed {}", a.id, a.text, a.speed);
            }
            AnimationCommand::Remove(id) => {
                self.remove(id);
            }
            AnimationCommand::ClearMode(mode) => self.clear_mode(mode),
        }
    }

    /// Scheduler task: apply commands as they arrive and emit frames on a fixed tick.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<AnimationCommand>,
        render: BestEffortSender<RenderMessage>,
        mode: SharedMode,
        frame_interval: Duration,
        shutdown: CancellationToken,
    ) {
        info!("Animation scheduler started ({:?} frames)", frame_interval);
        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.apply(cmd, mode.load(), Instant::now()),
                    None => break,
                },
                _ = ticker.tick() => {
                    self.retain_mode(mode.load());
                    for msg in self.tick(Instant::now()) {
                        render.send(msg).await;
                    }
                }
            }
        }
        info!("Animation scheduler stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOX: Rect = Rect::new(33, 1, 126, 8);

    fn long_text() -> String {
        "An extremely long song title that will never fit".to_string()
    }

    #[test]
    fn test_text_width_monospace() {
        let w1 = text_width(ANIMATION_FONT, "a");
        assert_eq!(text_width(ANIMATION_FONT, ""), 0);
        assert!(text_width(ANIMATION_FONT, "abcd") >= 4 * w1);
    }

    #[test]
    fn test_short_text_is_static() {
        let mut s = AnimationScheduler::default();
        let a = s.upsert(AnimationId::MusicTitle, "Hi", BOX, Instant::now());
        assert_eq!(a.speed, 0);
        assert_eq!(a.offset_at(Instant::now() + Duration::from_secs(3)), 0);
    }

    #[test]
    fn test_long_text_scrolls_left() {
        let mut s = AnimationScheduler::default();
        let a = s.upsert(AnimationId::MusicTitle, &long_text(), BOX, Instant::now());
        assert_eq!(a.speed, ANIMATION_SCROLL_SPEED);
        assert!(a.speed < 0);
        assert_eq!(a.wrap_width(), a.text_width + ANIMATION_WRAP_PADDING);
    }

    #[test]
    fn test_tick_idempotent_at_same_instant() {
        let t0 = Instant::now();
        let mut s = AnimationScheduler::default();
        s.upsert(AnimationId::MusicTitle, &long_text(), BOX, t0);
        s.upsert(AnimationId::MusicArtist, "Band", BOX, t0);
        let at = t0 + Duration::from_millis(2_345);
        let first = s.tick(at);
        let second = s.tick(at);
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_offset_is_periodic_and_in_range() {
        let t0 = Instant::now();
        let mut s = AnimationScheduler::default();
        let a = s.upsert(AnimationId::MusicTitle, &long_text(), BOX, t0).clone();
        let wrap = a.wrap_width();
        // |speed| = 10 so the period is a whole number of milliseconds
        let period = a.period().unwrap();
        assert_eq!(period, Duration::from_millis(u64::from(wrap) * 100));
        for ms in [0u64, 1, 99, 100, 1_234, 5_555, 17_001, 60_000] {
            let t = t0 + Duration::from_millis(ms);
            let off = a.offset_at(t);
            assert!(off < wrap);
            assert_eq!(off, a.offset_at(t + period));
        }
    }

    #[test]
    fn test_offset_moves_left_over_time() {
        let t0 = Instant::now();
        let mut s = AnimationScheduler::default();
        let a = s.upsert(AnimationId::MusicTitle, &long_text(), BOX, t0).clone();
        let wrap = a.wrap_width();
        // one second at -10 px/s is ten pixels left, i.e. wrap - 10
        assert_eq!(a.offset_at(t0 + Duration::from_secs(1)), wrap - 10);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let t0 = Instant::now();
        let mut s = AnimationScheduler::default();
        s.upsert(AnimationId::MusicTitle, &long_text(), BOX, t0);
        let later = t0 + Duration::from_secs(5);

        // same text keeps the running scroll
        s.upsert(AnimationId::MusicTitle, &long_text(), BOX, later);
        assert_eq!(s.len(), 1);
        assert_eq!(s.get(AnimationId::MusicTitle).unwrap().started, t0);

        // new text restarts it
        s.upsert(AnimationId::MusicTitle, "Next song", BOX, later);
        assert_eq!(s.len(), 1);
        assert_eq!(s.get(AnimationId::MusicTitle).unwrap().started, later);
    }

    #[test]
    fn test_empty_tick_is_noop() {
        let s = AnimationScheduler::default();
        assert!(s.tick(Instant::now()).is_empty());
    }

    #[test]
    fn test_apply_refuses_foreign_mode_and_clears() {
        let now = Instant::now();
        let mut s = AnimationScheduler::default();
        let upsert = AnimationCommand::Upsert {
            id: AnimationId::MusicTitle,
            text: "t".into(),
            bbox: BOX,
        };
        s.apply(upsert.clone(), SignMode::Clock, now);
        assert!(s.is_empty());

        s.apply(upsert, SignMode::Music, now);
        assert_eq!(s.len(), 1);

        s.apply(AnimationCommand::ClearMode(SignMode::Music), SignMode::Clock, now);
        assert!(s.is_empty());
    }

    #[test]
    fn test_retain_mode_enforces_key_invariant() {
        let now = Instant::now();
        let mut s = AnimationScheduler::default();
        s.upsert(AnimationId::MusicTitle, "a", BOX, now);
        s.upsert(AnimationId::MusicArtist, "b", BOX, now);
        s.retain_mode(SignMode::Music);
        assert_eq!(s.len(), 2);
        s.retain_mode(SignMode::Transit);
        assert!(s.is_empty());
    }

    #[tokio::test]
    async fn test_run_emits_frames_for_music() {
        use crate::channel::bounded;

        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let (render_tx, mut render_rx) = bounded("render", 16, Duration::from_millis(5));
        let mode = SharedMode::new(SignMode::Music);
        let token = CancellationToken::new();
        let task = tokio::spawn(AnimationScheduler::default().run(
            cmd_rx,
            render_tx,
            mode,
            Duration::from_millis(5),
            token.clone(),
        ));

        cmd_tx
            .send(AnimationCommand::Upsert {
                id: AnimationId::MusicArtist,
                text: "Band".into(),
                bbox: BOX,
            })
            .await
            .unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(2), render_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.mode, SignMode::Music);
        token.cancel();
        task.await.unwrap();
    }
}
