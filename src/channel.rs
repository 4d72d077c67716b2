/*
 *  channel.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Bounded, best-effort queues between tasks. A send waits a short time
 *  for room and then drops the message: render content is perishable and
 *  the next poll supersedes it.
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

use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};

/// Outcome of a best-effort send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Queue stayed full for the whole timeout.
    Dropped,
    /// Receiver is gone (shutdown).
    Closed,
}

impl Delivery {
    pub fn is_sent(self) -> bool {
        self == Delivery::Sent
    }
}

/// Producer half of a bounded queue with at-most-once delivery.
#[derive(Debug)]
pub struct BestEffortSender<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    timeout: Duration,
    dropped: Arc<AtomicU64>,
}

// derive(Clone) would needlessly require T: Clone
impl<T> Clone for BestEffortSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            timeout: self.timeout,
            dropped: Arc::clone(&self.dropped),
        }
    }
}

/// Create a named bounded queue. `capacity` must be non-zero.
pub fn bounded<T>(
    name: &'static str,
    capacity: usize,
    send_timeout: Duration,
) -> (BestEffortSender<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sender = BestEffortSender {
        name,
        tx,
        timeout: send_timeout,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (sender, rx)
}

impl<T> BestEffortSender<T> {
    /// Send, waiting at most the configured timeout for room.
    pub async fn send(&self, msg: T) -> Delivery {
        match self.tx.send_timeout(msg, self.timeout).await {
            Ok(()) => Delivery::Sent,
            Err(SendTimeoutError::Timeout(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("{} queue full, message dropped ({} total)", self.name, total);
                Delivery::Dropped
            }
            Err(SendTimeoutError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Non-async variant for callers outside the runtime (signal hooks, stdin).
    pub fn try_send(&self, msg: T) -> Delivery {
        match self.tx.try_send(msg) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("{} queue full, message dropped", self.name);
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Messages dropped on a full queue since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
