/*
 *  providers/mod.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Data providers and the task loop that drives them
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

pub mod clock;
pub mod mbta;
pub mod music;
pub mod spotify;
pub mod test_pattern;
pub mod transit;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::channel::{BestEffortSender, Delivery};
use crate::render::RenderMessage;
use crate::sign::{SharedMode, SignMode};

use transit::Station;

/// Out-of-band requests for a provider, delivered between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderCommand {
    SetStation(Station),
}

/// Whether a provider keeps polling while its mode is not on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPolicy {
    /// Poll on every tick; caches stay warm for an instant switch.
    #[default]
    Always,
    /// Skip ticks while another mode is current.
    ActiveOnly,
}

/// A periodic source of display content for one sign mode.
#[async_trait]
pub trait Provider: Send {
    fn mode(&self) -> SignMode;

    fn name(&self) -> &'static str;

    /// Produce the next message. Never fails: errors become an error status.
    async fn poll(&mut self) -> RenderMessage;

    /// React to a command; may return content to show right away.
    async fn handle_command(&mut self, _cmd: ProviderCommand) -> Option<RenderMessage> {
        None
    }
}

/// Per-provider counters, returned when the loop exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProviderStats {
    pub polls: u64,
    pub skipped: u64,
    pub sent: u64,
    pub dropped: u64,
}

/// Drives one provider from its watchdog wakeups.
pub struct ProviderTask<P: Provider> {
    provider: P,
    policy: PollPolicy,
    mode: SharedMode,
    render: BestEffortSender<RenderMessage>,
    stats: ProviderStats,
}

impl<P: Provider> ProviderTask<P> {
    pub fn new(provider: P, policy: PollPolicy, mode: SharedMode, render: BestEffortSender<RenderMessage>) -> Self {
        Self {
            provider,
            policy,
            mode,
            render,
            stats: ProviderStats::default(),
        }
    }

    pub fn stats(&self) -> ProviderStats {
        self.stats
    }

    async fn publish(&mut self, msg: RenderMessage) {
        match self.render.send(msg).await {
            Delivery::Sent => self.stats.sent += 1,
            Delivery::Dropped => self.stats.dropped += 1,
            Delivery::Closed => debug!("{}: render channel closed", self.provider.name()),
        }
    }

    /// Poll on every wakeup, apply commands between polls, stop on cancel.
    pub async fn run(
        mut self,
        mut wakeups: mpsc::Receiver<()>,
        mut commands: Option<mpsc::Receiver<ProviderCommand>>,
        shutdown: CancellationToken,
    ) -> ProviderStats {
        let name = self.provider.name();
        info!("{} provider started ({:?})", name, self.policy);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                cmd = next_command(&mut commands), if commands.is_some() => match cmd {
                    Some(cmd) => {
                        debug!("{}: command {:?}", name, cmd);
                        if let Some(msg) = self.provider.handle_command(cmd).await {
                            self.publish(msg).await;
                        }
                    }
                    None => commands = None,
                },
                tick = wakeups.recv() => {
                    if tick.is_none() {
                        break;
                    }
                    if self.policy == PollPolicy::ActiveOnly && self.mode.load() != self.provider.mode() {
                        self.stats.skipped += 1;
                        continue;
                    }
                    self.stats.polls += 1;
                    let msg = tokio::select! {
                        () = shutdown.cancelled() => break,
                        msg = self.provider.poll() => msg,
                    };
                    self.publish(msg).await;
                }
            }
        }
        if self.stats.dropped > 0 {
            warn!("{} provider: {} messages dropped on a full render queue", name, self.stats.dropped);
        }
        info!("{} provider stopped.", name);
        self.stats
    }
}

async fn next_command(commands: &mut Option<mpsc::Receiver<ProviderCommand>>) -> Option<ProviderCommand> {
    match commands {
        Some(rx) => rx.recv().await,
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::bounded;
    use crate::render::palette;
    use std::time::Duration;

    struct Counter {
        mode: SignMode,
        n: u32,
    }

    #[async_trait]
    impl Provider for Counter {
        fn mode(&self) -> SignMode {
            self.mode
        }

        fn name(&self) -> &'static str {
            "counter"
        }

        async fn poll(&mut self) -> RenderMessage {
            self.n += 1;
            RenderMessage::text(self.mode, self.n.to_string(), palette::WHITE)
        }

        async fn handle_command(&mut self, _cmd: ProviderCommand) -> Option<RenderMessage> {
            self.n = 100;
            Some(RenderMessage::text(self.mode, "reset", palette::WHITE))
        }
    }

    fn text_of(msg: &RenderMessage) -> String {
        match &msg.content {
            crate::render::RenderContent::Text(t) => t.text.clone(),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_polls_once_per_wakeup_in_order() {
        let (render_tx, mut render_rx) = bounded("render", 8, Duration::from_millis(5));
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let task = ProviderTask::new(
            Counter { mode: SignMode::Clock, n: 0 },
            PollPolicy::Always,
            SharedMode::new(SignMode::Test),
            render_tx,
        );
        let handle = tokio::spawn(task.run(wake_rx, None, shutdown.clone()));

        for _ in 0..3 {
            wake_tx.send(()).await.unwrap();
            let msg = render_rx.recv().await.unwrap();
            assert_eq!(msg.mode, SignMode::Clock);
        }
        shutdown.cancel();
        let stats = handle.await.unwrap();
        assert_eq!(stats.polls, 3);
        assert_eq!(stats.sent, 3);
    }

    #[tokio::test]
    async fn test_active_only_skips_inactive_mode() {
        let (render_tx, mut render_rx) = bounded("render", 8, Duration::from_millis(5));
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let task = ProviderTask::new(
            Counter { mode: SignMode::Music, n: 0 },
            PollPolicy::ActiveOnly,
            SharedMode::new(SignMode::Clock),
            render_tx,
        );
        let handle = tokio::spawn(task.run(wake_rx, None, CancellationToken::new()));
        wake_tx.send(()).await.unwrap();
        wake_tx.send(()).await.unwrap();
        drop(wake_tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.polls, 0);
        assert_eq!(stats.skipped, 2);
        assert!(render_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_command_reply_is_published() {
        let (render_tx, mut render_rx) = bounded("render", 8, Duration::from_millis(5));
        let (_wake_tx, wake_rx) = mpsc::channel::<()>(1);
        let (cmd_tx, cmd_rx) = mpsc::channel(2);
        let shutdown = CancellationToken::new();
        let task = ProviderTask::new(
            Counter { mode: SignMode::Transit, n: 0 },
            PollPolicy::Always,
            SharedMode::new(SignMode::Transit),
            render_tx,
        );
        let handle = tokio::spawn(task.run(wake_rx, Some(cmd_rx), shutdown.clone()));

        cmd_tx.send(ProviderCommand::SetStation(Station::Kendall)).await.unwrap();
        let msg = render_rx.recv().await.unwrap();
        assert_eq!(text_of(&msg), "reset");

        // a closed command channel must not stop the provider
        drop(cmd_tx);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());
        shutdown.cancel();
        handle.await.unwrap();
    }
}
