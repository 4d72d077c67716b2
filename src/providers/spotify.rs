/*
 *  providers/spotify.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Spotify Web API: refresh-token grant and the currently-playing endpoint
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
use log::{debug, info};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::constants::SPOTIFY_TOKEN_REFRESH_RATE;
use crate::fetch::{Fetched, HttpClient, ProviderError};
use crate::providers::music::MusicSource;
use crate::render::CurrentlyPlaying;

pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const CURRENTLY_PLAYING_URL: &str = "https://api.spotify.com/v1/me/player/currently-playing";

#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PlayingResponse {
    progress_ms: Option<i64>,
    item: Option<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    name: String,
    duration_ms: i64,
    #[serde(default)]
    artists: Vec<Artist>,
    album: Option<Album>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    obtained: Instant,
    lifetime: Duration,
}

impl AccessToken {
    fn is_usable(&self, now: Instant) -> bool {
        let age = now.saturating_duration_since(self.obtained);
        age < self.lifetime && age < SPOTIFY_TOKEN_REFRESH_RATE
    }
}

impl PlayingResponse {
    fn into_playing(self) -> Option<CurrentlyPlaying> {
        // item is null during ads and between tracks
        let track = self.item?;
        Some(CurrentlyPlaying {
            title: track.name,
            artist: track.artists.into_iter().next().map(|a| a.name).unwrap_or_default(),
            duration_ms: track.duration_ms,
            progress_ms: self.progress_ms.unwrap_or(0),
            timestamp_ms: 0,
            album_cover_ref: track.album.and_then(|a| a.images.into_iter().next()).map(|i| i.url),
        })
    }
}

pub struct SpotifyClient {
    http: HttpClient,
    credentials: SpotifyCredentials,
    token_url: String,
    playing_url: String,
    // only ever locked for a copy, never across a request
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(http: HttpClient, credentials: SpotifyCredentials) -> Self {
        Self::with_endpoints(http, credentials, TOKEN_URL, CURRENTLY_PLAYING_URL)
    }

    pub fn with_endpoints(http: HttpClient, credentials: SpotifyCredentials, token_url: &str, playing_url: &str) -> Self {
        Self {
            http,
            credentials,
            token_url: token_url.to_string(),
            playing_url: playing_url.to_string(),
            token: Mutex::new(None),
        }
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.token.lock().ok()?;
        guard.as_ref().filter(|t| t.is_usable(Instant::now())).map(|t| t.value.clone())
    }

    fn store_token(&self, token: Option<AccessToken>) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = token;
        }
    }

    async fn refresh_token(&self) -> Result<String, ProviderError> {
        let request = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
            ]);
        let resp: TokenResponse = match self.http.fetch_json(request).await {
            Ok(Fetched::Document(resp)) => resp,
            Ok(Fetched::Empty) => return Err(ProviderError::Auth("empty token response".to_string())),
            // invalid_grant and friends come back as 400
            Err(ProviderError::Status(status)) if status == StatusCode::BAD_REQUEST => {
                return Err(ProviderError::Auth("refresh token rejected".to_string()));
            }
            Err(e) => return Err(e),
        };
        let lifetime = Duration::from_secs(resp.expires_in.unwrap_or(3600));
        info!("Spotify access token refreshed (valid {}s)", lifetime.as_secs());
        self.store_token(Some(AccessToken {
            value: resp.access_token.clone(),
            obtained: Instant::now(),
            lifetime,
        }));
        Ok(resp.access_token)
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        match self.cached_token() {
            Some(token) => Ok(token),
            None => self.refresh_token().await,
        }
    }
}

#[async_trait]
impl MusicSource for SpotifyClient {
    async fn currently_playing(&self) -> Result<Option<CurrentlyPlaying>, ProviderError> {
        let token = self.access_token().await?;
        let request = self.http.get(&self.playing_url).bearer_auth(token);
        match self.http.fetch_json::<PlayingResponse>(request).await {
            Ok(Fetched::Document(resp)) => Ok(resp.into_playing()),
            Ok(Fetched::Empty) => Ok(None),
            Err(e @ ProviderError::Auth(_)) => {
                debug!("Spotify rejected the access token, refreshing next poll");
                self.store_token(None);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
