/*
 *  sign.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Sign modes, control messages and the mode controller
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

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::animation::AnimationCommand;
use crate::channel::BestEffortSender;
use crate::providers::ProviderCommand;
use crate::providers::transit::Station;

/// What the sign is showing. Order matters: `ModeShift` walks it.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignMode {
    Test = 0,
    Transit = 1,
    Clock = 2,
    Music = 3,
}

impl SignMode {
    pub const ALL: [SignMode; 4] = [SignMode::Test, SignMode::Transit, SignMode::Clock, SignMode::Music];
    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// The following mode, wrapping after the last.
    pub fn next(self) -> Self {
        Self::ALL[(self.index() as usize + 1) % Self::COUNT]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignMode::Test => "test",
            SignMode::Transit => "transit",
            SignMode::Clock => "clock",
            SignMode::Music => "music",
        }
    }
}

impl fmt::Display for SignMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected input from a control collaborator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("invalid sign mode: {0}")]
    InvalidMode(String),
    #[error("invalid station id: {0}")]
    InvalidStation(String),
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("missing argument for '{0}'")]
    MissingArgument(&'static str),
}

/// Accepts a mode name ("clock") or its index ("2").
impl FromStr for SignMode {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(idx) = s.parse::<u8>() {
            return SignMode::from_index(idx).ok_or_else(|| ControlError::InvalidMode(s.to_string()));
        }
        SignMode::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ControlError::InvalidMode(s.to_string()))
    }
}

/// Requests travelling on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UIMessage {
    ModeChange(SignMode),
    ModeShift,
    StationChange(Station),
}

/// Current mode, readable from any task without locking.
#[derive(Debug, Clone)]
pub struct SharedMode(Arc<AtomicU8>);

impl SharedMode {
    pub fn new(mode: SignMode) -> Self {
        Self(Arc::new(AtomicU8::new(mode.index())))
    }

    pub fn load(&self) -> SignMode {
        // only valid indices are ever stored
        SignMode::from_index(self.0.load(Ordering::Acquire)).unwrap_or(SignMode::Test)
    }

    fn store(&self, mode: SignMode) {
        self.0.store(mode.index(), Ordering::Release);
    }
}

/// Remembers the last selected mode across restarts.
#[derive(Debug, Clone)]
pub struct ModeStore {
    path: PathBuf,
}

impl ModeStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Option<SignMode> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match raw.parse() {
            Ok(mode) => Some(mode),
            Err(e) => {
                warn!("Ignoring stored sign mode in {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub async fn save(&self, mode: SignMode) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!("Cannot create {}: {}", parent.display(), e);
                return;
            }
        }
        if let Err(e) = tokio::fs::write(&self.path, mode.as_str()).await {
            warn!("Cannot persist sign mode to {}: {}", self.path.display(), e);
        }
    }
}

/// Owns the sign mode and reacts to control messages.
pub struct ModeController {
    mode: SharedMode,
    animations: BestEffortSender<AnimationCommand>,
    transit: BestEffortSender<ProviderCommand>,
    store: Option<ModeStore>,
}

impl ModeController {
    pub fn new(
        mode: SharedMode,
        animations: BestEffortSender<AnimationCommand>,
        transit: BestEffortSender<ProviderCommand>,
    ) -> Self {
        Self {
            mode,
            animations,
            transit,
            store: None,
        }
    }

    pub fn with_store(mut self, store: ModeStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn current_mode(&self) -> SignMode {
        self.mode.load()
    }

    pub fn shared_mode(&self) -> SharedMode {
        self.mode.clone()
    }

    /// Apply one control message and return the resulting mode.
    pub async fn apply(&mut self, msg: UIMessage) -> SignMode {
        let current = self.mode.load();
        let next = match msg {
            UIMessage::ModeChange(mode) => mode,
            UIMessage::ModeShift => current.next(),
            UIMessage::StationChange(station) => {
                info!("Transit station -> {}", station);
                if !self.transit.send(ProviderCommand::SetStation(station)).await.is_sent() {
                    warn!("Station change to {} was not delivered", station);
                }
                return current;
            }
        };

        if next != current {
            info!("Sign mode changed: {} -> {}", current, next);
            // publish first so late upserts for the old mode are refused
            self.mode.store(next);
            self.animations.send(AnimationCommand::ClearMode(current)).await;
            if let Some(store) = &self.store {
                store.save(next).await;
            }
        } else {
            debug!("Sign mode unchanged ({})", current);
        }
        next
    }

    /// Drain the control channel until cancelled.
    pub async fn run(mut self, mut control: mpsc::Receiver<UIMessage>, shutdown: CancellationToken) {
        info!("Mode controller started in {} mode", self.current_mode());
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                msg = control.recv() => match msg {
                    Some(msg) => { self.apply(msg).await; }
                    None => break,
                },
            }
        }
        info!("Mode controller stopped.");
    }
}
