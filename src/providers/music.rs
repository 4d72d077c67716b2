/*
 *  providers/music.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Now-playing provider with a short-lived cache for empty responses
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
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::animation::AnimationCommand;
use crate::channel::BestEffortSender;
use crate::constants::{ANIMATION_FONT_HEIGHT, ANIMATION_IMAGE_WIDTH, SCREEN_WIDTH};
use crate::fetch::{ProviderError, with_deadline};
use crate::providers::Provider;
use crate::providers::clock::WallClock;
use crate::render::{AnimationId, CurrentlyPlaying, MusicStatus, Rect, RenderMessage};
use crate::sign::SignMode;

/// Scrolling title, right of the cover.
pub const TITLE_BOX: Rect = Rect::new(
    ANIMATION_IMAGE_WIDTH as i32 + 1,
    1,
    SCREEN_WIDTH - ANIMATION_IMAGE_WIDTH - 2,
    ANIMATION_FONT_HEIGHT,
);
/// Scrolling artist, under the title.
pub const ARTIST_BOX: Rect = Rect::new(
    ANIMATION_IMAGE_WIDTH as i32 + 1,
    1 + ANIMATION_FONT_HEIGHT as i32,
    SCREEN_WIDTH - ANIMATION_IMAGE_WIDTH - 2,
    ANIMATION_FONT_HEIGHT,
);

/// A now-playing service. `Ok(None)` means nothing is playing right now.
#[async_trait]
pub trait MusicSource: Send + Sync {
    async fn currently_playing(&self) -> Result<Option<CurrentlyPlaying>, ProviderError>;
}

pub struct MusicProvider {
    source: Arc<dyn MusicSource>,
    clock: Arc<dyn WallClock>,
    animations: BestEffortSender<AnimationCommand>,
    deadline: Duration,
    freshness: Duration,
    cache: CurrentlyPlaying,
}

impl MusicProvider {
    pub fn new(
        source: Arc<dyn MusicSource>,
        clock: Arc<dyn WallClock>,
        animations: BestEffortSender<AnimationCommand>,
        deadline: Duration,
        freshness: Duration,
    ) -> Self {
        Self {
            source,
            clock,
            animations,
            deadline,
            freshness,
            cache: CurrentlyPlaying::nothing(),
        }
    }

    pub fn cached(&self) -> &CurrentlyPlaying {
        &self.cache
    }

    fn now_ms(&self) -> Result<i64, ProviderError> {
        Ok(self.clock.now().ok_or(ProviderError::ClockUnavailable)?.timestamp_millis())
    }

    /// Whether the cached song may still stand in for an empty response.
    fn cache_is_fresh(&self, now_ms: i64) -> bool {
        if !self.cache.has_song() {
            return false;
        }
        let age = now_ms.saturating_sub(self.cache.timestamp_ms);
        (0..=self.freshness.as_millis() as i64).contains(&age)
    }

    async fn scroll_metadata(&self, song: &CurrentlyPlaying, restart: bool) {
        if restart {
            for id in AnimationId::ALL {
                self.animations.send(AnimationCommand::Remove(id)).await;
            }
        }
        self.animations
            .send(AnimationCommand::Upsert {
                id: AnimationId::MusicTitle,
                text: song.title.clone(),
                bbox: TITLE_BOX,
            })
            .await;
        self.animations
            .send(AnimationCommand::Upsert {
                id: AnimationId::MusicArtist,
                text: song.artist.clone(),
                bbox: ARTIST_BOX,
            })
            .await;
    }

    async fn stop_metadata(&self) {
        for id in AnimationId::ALL {
            self.animations.send(AnimationCommand::Remove(id)).await;
        }
    }

    async fn refresh(&mut self) -> Result<RenderMessage, ProviderError> {
        let fetched = with_deadline(self.deadline, self.source.currently_playing()).await?;
        let now_ms = self.now_ms()?;
        match fetched {
            Some(mut song) => {
                song.timestamp_ms = now_ms;
                let changed = !song.same_song(&self.cache);
                if changed {
                    info!("Now playing: {} - {}", song.artist, song.title);
                }
                self.scroll_metadata(&song, changed).await;
                self.cache = song.clone();
                Ok(RenderMessage::music(MusicStatus::Ok, song))
            }
            None if self.cache_is_fresh(now_ms) => {
                debug!("Music: empty response, showing cached song");
                let cached = self.cache.clone();
                self.scroll_metadata(&cached, false).await;
                Ok(RenderMessage::music(MusicStatus::OkShowCached, self.cache.clone()))
            }
            None => Err(ProviderError::StaleData {
                age: Duration::from_millis(now_ms.saturating_sub(self.cache.timestamp_ms).max(0) as u64),
            }),
        }
    }
}

#[async_trait]
impl Provider for MusicProvider {
    fn mode(&self) -> SignMode {
        SignMode::Music
    }

    fn name(&self) -> &'static str {
        "music"
    }

    async fn poll(&mut self) -> RenderMessage {
        match self.refresh().await {
            Ok(msg) => msg,
            Err(e) => {
                if self.cache.has_song() {
                    warn!("Music: {}", e);
                } else {
                    debug!("Music: {}", e);
                }
                self.stop_metadata().await;
                RenderMessage::music(MusicStatus::Error, self.cache.clone())
            }
        }
    }
}
