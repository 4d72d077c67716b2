/*
 *  watchdog.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Poll timers and the connectivity watchdog
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
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::network::NetworkLink;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimerStats {
    pub fired: u64,
    /// Ticks folded into a wakeup the provider had not taken yet.
    pub coalesced: u64,
}

/// Posts "poll now" to one provider at a fixed cadence.
///
/// The wakeup queue holds a single slot, so a provider stuck in a slow
/// fetch sees one pending wakeup rather than a backlog.
#[derive(Debug)]
pub struct PollTimer {
    name: &'static str,
    period: Duration,
    tx: mpsc::Sender<()>,
}

/// Timer plus the receiver its provider listens on.
pub fn poll_timer(name: &'static str, period: Duration) -> (PollTimer, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (PollTimer { name, period, tx }, rx)
}

impl PollTimer {
    /// Post one wakeup without waiting. Returns false once the provider is gone.
    pub fn fire(&self, stats: &mut TimerStats) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => {
                stats.fired += 1;
                true
            }
            Err(TrySendError::Full(())) => {
                stats.coalesced += 1;
                true
            }
            Err(TrySendError::Closed(())) => false,
        }
    }

    /// The first tick fires immediately so every mode has content at startup.
    pub async fn run(self, shutdown: CancellationToken) -> TimerStats {
        let mut stats = TimerStats::default();
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("{} timer every {:?}", self.name, self.period);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if !self.fire(&mut stats) {
                        debug!("{} timer: provider gone", self.name);
                        break;
                    }
                }
            }
        }
        debug!("{} timer stopped ({} fired, {} coalesced)", self.name, stats.fired, stats.coalesced);
        stats
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityStats {
    pub checks: u64,
    pub failures: u64,
    pub reconnects: u64,
}

/// Checks link health and asks the link to recover. Never touches render state.
pub struct ConnectivityWatchdog {
    link: Arc<dyn NetworkLink>,
    period: Duration,
}

impl ConnectivityWatchdog {
    pub fn new(link: Arc<dyn NetworkLink>, period: Duration) -> Self {
        Self { link, period }
    }

    pub async fn check_once(&self, stats: &mut ConnectivityStats) {
        stats.checks += 1;
        if self.link.is_up().await {
            return;
        }
        stats.failures += 1;
        warn!("Network link down, reconnecting");
        match self.link.reconnect().await {
            Ok(()) => {
                stats.reconnects += 1;
                info!("Reconnect issued");
            }
            Err(e) => warn!("Reconnect failed: {}", e),
        }
    }

    pub async fn run(self, shutdown: CancellationToken) -> ConnectivityStats {
        let mut stats = ConnectivityStats::default();
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // nothing to check right at boot
        interval.tick().await;

        info!("Connectivity watchdog started, every {:?}", self.period);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    // a hung reconnect must not outlive shutdown
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = self.check_once(&mut stats) => {}
                    }
                }
            }
        }
        info!("Connectivity watchdog stopped ({} checks, {} failures)", stats.checks, stats.failures);
        stats
    }
}
