/*
 *  display/consumer.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  The only task that touches the display
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

use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::display::renderer::Renderer;
use crate::render::{RenderKind, RenderMessage};
use crate::sign::{SharedMode, SignMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Rendering(RenderKind),
}

/// Every received message is either dispatched or discarded, never both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub dispatched: u64,
    pub discarded: u64,
    /// Dispatched messages whose render routine failed.
    pub render_errors: u64,
}

pub struct DisplayConsumer {
    renderer: Renderer,
    mode: SharedMode,
    last_mode: SignMode,
    state: ConsumerState,
    stats: ConsumerStats,
}

impl DisplayConsumer {
    pub fn new(renderer: Renderer, mode: SharedMode) -> Self {
        let last_mode = mode.load();
        Self {
            renderer,
            mode,
            last_mode,
            state: ConsumerState::Idle,
            stats: ConsumerStats::default(),
        }
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Blank the panel as soon as the mode moves on, even before new content arrives.
    fn follow_mode(&mut self) -> SignMode {
        let current = self.mode.load();
        if current != self.last_mode {
            debug!("Display follows mode {} -> {}", self.last_mode, current);
            if let Err(e) = self.renderer.clear() {
                warn!("Display clear failed: {}", e);
            }
            self.last_mode = current;
        }
        current
    }

    /// Discard or dispatch one message.
    pub fn handle(&mut self, msg: RenderMessage) {
        self.stats.received += 1;
        let current = self.follow_mode();
        if msg.mode != current {
            self.stats.discarded += 1;
            debug!("Discarded {:?} from {} while in {}", msg.kind(), msg.mode, current);
            return;
        }

        self.stats.dispatched += 1;
        self.state = ConsumerState::Rendering(msg.kind());
        if let Err(e) = self.renderer.render(&msg) {
            self.stats.render_errors += 1;
            warn!("Render of {:?} failed: {}", msg.kind(), e);
        }
        self.state = ConsumerState::Idle;
    }

    /// Drain the render channel until cancelled or every producer is gone.
    /// The timeout keeps mode changes visible while the channel is quiet.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<RenderMessage>,
        shutdown: CancellationToken,
        recv_timeout: Duration,
    ) -> ConsumerStats {
        info!("Display consumer started in {} mode", self.last_mode);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                next = tokio::time::timeout(recv_timeout, rx.recv()) => match next {
                    Ok(Some(msg)) => self.handle(msg),
                    Ok(None) => {
                        info!("Render channel closed");
                        break;
                    }
                    Err(_elapsed) => {
                        self.follow_mode();
                    }
                },
            }
        }
        if let Err(e) = self.renderer.clear() {
            error!("Failed to clear display on exit: {}", e);
        }
        info!(
            "Display consumer stopped: {} received, {} dispatched, {} discarded",
            self.stats.received, self.stats.dispatched, self.stats.discarded
        );
        self.stats
    }

    /// Run on a dedicated OS thread, driven by the given runtime handle.
    pub fn spawn_dedicated(
        self,
        handle: tokio::runtime::Handle,
        rx: mpsc::Receiver<RenderMessage>,
        shutdown: CancellationToken,
        recv_timeout: Duration,
    ) -> std::io::Result<std::thread::JoinHandle<ConsumerStats>> {
        std::thread::Builder::new()
            .name("display".to_string())
            .spawn(move || handle.block_on(self.run(rx, shutdown, recv_timeout)))
    }
}
