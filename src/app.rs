/*
 *  app.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Wires channels, tasks and the display together
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
use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::animation::{ANIMATION_FONT, AnimationScheduler};
use crate::channel::{BestEffortSender, bounded};
use crate::config::{Config, SignConfig};
use crate::constants::PROVIDER_COMMAND_CAPACITY;
use crate::display::{BoxedDriver, ConsumerStats, DisplayConsumer, DisplayError, Renderer};
use crate::fetch::{HttpClient, ProviderError};
use crate::input;
use crate::network::{NetworkLink, TcpCheckLink};
use crate::providers::clock::{ClockProvider, SystemClock, WallClock};
use crate::providers::mbta::MbtaClient;
use crate::providers::music::{MusicProvider, MusicSource};
use crate::providers::spotify::{SpotifyClient, SpotifyCredentials};
use crate::providers::test_pattern::TestPatternProvider;
use crate::providers::transit::{TransitProvider, TransitSource};
use crate::providers::{PollPolicy, Provider, ProviderCommand, ProviderStats, ProviderTask};
use crate::render::{CurrentlyPlaying, RenderMessage, palette};
use crate::sign::{ModeController, ModeStore, SharedMode, SignMode, UIMessage};
use crate::watchdog::{ConnectivityWatchdog, TimerStats, poll_timer};

/// Stands in when no music credentials are configured.
struct UnconfiguredMusic;

#[async_trait]
impl MusicSource for UnconfiguredMusic {
    async fn currently_playing(&self) -> Result<Option<CurrentlyPlaying>, ProviderError> {
        Err(ProviderError::NotConfigured("music credentials"))
    }
}

/// External collaborators, swappable for tests.
pub struct Sources {
    pub clock: Arc<dyn WallClock>,
    pub transit: Arc<dyn TransitSource>,
    pub music: Arc<dyn MusicSource>,
    /// None disables the connectivity watchdog.
    pub network: Option<Arc<dyn NetworkLink>>,
}

impl Sources {
    /// Real MBTA and Spotify clients, the system clock and a TCP reachability check.
    pub fn from_config(cfg: &Config) -> Result<Self, ProviderError> {
        let transit_http = HttpClient::new(Duration::from_secs(cfg.transit.fetch_timeout_secs))?;
        let transit = MbtaClient::new(transit_http, &cfg.transit.api_base, &cfg.transit.route, cfg.transit.api_key.clone());

        let music: Arc<dyn MusicSource> = match (
            cfg.music.client_id.clone(),
            cfg.music.client_secret.clone(),
            cfg.music.refresh_token.clone(),
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => {
                let http = HttpClient::new(Duration::from_secs(cfg.music.fetch_timeout_secs))?;
                Arc::new(SpotifyClient::new(http, SpotifyCredentials { client_id, client_secret, refresh_token }))
            }
            _ => {
                warn!("Spotify credentials missing; music mode will show its fallback");
                Arc::new(UnconfiguredMusic)
            }
        };

        let network: Option<Arc<dyn NetworkLink>> = cfg.network.enabled.then(|| {
            Arc::new(TcpCheckLink::new(
                cfg.network.check_addr.clone(),
                Duration::from_millis(cfg.network.check_timeout_ms),
                cfg.network.reconnect_command.clone(),
            )) as Arc<dyn NetworkLink>
        });

        Ok(Self {
            clock: Arc::new(SystemClock),
            transit: Arc::new(transit),
            music,
            network,
        })
    }
}

/// What the tasks did, gathered after shutdown.
#[derive(Debug, Default, Clone)]
pub struct AppReport {
    pub consumer: ConsumerStats,
    pub providers: Vec<(SignMode, ProviderStats)>,
    /// Render messages producers gave up on.
    pub render_dropped: u64,
}

/// Control-side handles a caller can use while the sign runs.
#[derive(Clone)]
pub struct AppHandles {
    pub mode: SharedMode,
    pub control: BestEffortSender<UIMessage>,
}

pub struct App {
    config: Config,
    sources: Sources,
    driver: BoxedDriver,
}

/// Stored mode wins over the configured one when remembering is on.
fn initial_mode(sign: &SignConfig) -> (SignMode, Option<ModeStore>) {
    let store = if sign.remember_mode { sign.state_path().map(ModeStore::new) } else { None };
    let mode = store.as_ref().and_then(ModeStore::load).unwrap_or(sign.initial_mode);
    (mode, store)
}

/// Spawns each provider with its own poll timer.
struct ProviderSpawner {
    policy: PollPolicy,
    mode: SharedMode,
    render: BestEffortSender<RenderMessage>,
    stop: CancellationToken,
    timers: Vec<JoinHandle<TimerStats>>,
    tasks: Vec<(SignMode, JoinHandle<ProviderStats>)>,
}

impl ProviderSpawner {
    fn spawn<P: Provider + 'static>(
        &mut self,
        provider: P,
        period: Duration,
        commands: Option<mpsc::Receiver<ProviderCommand>>,
    ) {
        let mode = provider.mode();
        let (timer, wakeups) = poll_timer(provider.name(), period);
        let task = ProviderTask::new(provider, self.policy, self.mode.clone(), self.render.clone());
        self.timers.push(tokio::spawn(timer.run(self.stop.clone())));
        self.tasks.push((mode, tokio::spawn(task.run(wakeups, commands, self.stop.clone()))));
    }
}

impl App {
    pub fn new(config: Config, sources: Sources, driver: BoxedDriver) -> Self {
        Self { config, sources, driver }
    }

    /// Run until `signal` resolves, then shut down in order. Returns as soon
    /// as the sign stops on its own, e.g. when the panel fails to come up.
    pub async fn run_until<S>(self, signal: S) -> Result<AppReport, DisplayError>
    where
        S: Future<Output = ()>,
    {
        let shutdown = CancellationToken::new();
        let mut task = tokio::spawn(self.run(shutdown.clone(), None));
        tokio::select! {
            () = signal => {}
            joined = &mut task => {
                warn!("Sign stopped before shutdown was requested");
                return joined.map_err(|e| DisplayError::Other(format!("sign task failed: {}", e)))?;
            }
        }
        shutdown.cancel();
        task.await
            .map_err(|e| DisplayError::Other(format!("sign task failed: {}", e)))?
    }

    /// Start everything, run until `shutdown` fires, then stop in order.
    /// `ready` receives the control handles once all tasks are up.
    pub async fn run(
        self,
        shutdown: CancellationToken,
        ready: Option<oneshot::Sender<AppHandles>>,
    ) -> Result<AppReport, DisplayError> {
        let App { config: cfg, sources, driver } = self;
        let (initial, store) = initial_mode(&cfg.sign);
        let shared = SharedMode::new(initial);
        info!("Starting in {} mode", initial);

        let ch = &cfg.channels;
        let (render_tx, render_rx) = bounded::<RenderMessage>("render", ch.render_capacity, ch.send_timeout());
        let (control_tx, control_rx) = bounded::<UIMessage>("control", ch.control_capacity, ch.send_timeout());
        let (anim_tx, anim_rx) = bounded("animation", ch.animation_capacity, ch.send_timeout());
        let (transit_cmd_tx, transit_cmd_rx) =
            bounded::<ProviderCommand>("transit", PROVIDER_COMMAND_CAPACITY, ch.send_timeout());

        // display first, so nothing is produced for a panel that failed to come up
        let mut renderer = Renderer::new(driver, cfg.display.animation_fps);
        renderer.init(cfg.display.brightness)?;
        let consumer = DisplayConsumer::new(renderer, shared.clone());
        let consumer_stop = CancellationToken::new();
        let consumer_task = if cfg.display.dedicated_thread {
            let handle = tokio::runtime::Handle::current();
            ConsumerTask::Thread(consumer.spawn_dedicated(handle, render_rx, consumer_stop.clone(), ch.receive_timeout())?)
        } else {
            ConsumerTask::Task(tokio::spawn(consumer.run(render_rx, consumer_stop.clone(), ch.receive_timeout())))
        };

        let stop = CancellationToken::new();
        let mut background: Vec<JoinHandle<()>> = Vec::new();

        let mut controller = ModeController::new(shared.clone(), anim_tx.clone(), transit_cmd_tx);
        if let Some(store) = store {
            controller = controller.with_store(store);
        }
        background.push(tokio::spawn(controller.run(control_rx, stop.clone())));

        let frame_interval = Duration::from_secs(1) / cfg.display.animation_fps.max(1);
        background.push(tokio::spawn(AnimationScheduler::new(ANIMATION_FONT).run(
            anim_rx,
            render_tx.clone(),
            shared.clone(),
            frame_interval,
            stop.clone(),
        )));

        let secs = Duration::from_secs;
        let mut spawner = ProviderSpawner {
            policy: cfg.sign.poll_policy,
            mode: shared.clone(),
            render: render_tx.clone(),
            stop: stop.clone(),
            timers: Vec::new(),
            tasks: Vec::new(),
        };
        spawner.spawn(
            TestPatternProvider::new(cfg.test_pattern.banner.clone()),
            secs(cfg.test_pattern.interval_secs),
            None,
        );
        spawner.spawn(
            TransitProvider::new(
                sources.transit,
                Arc::clone(&sources.clock),
                cfg.transit.station,
                cfg.transit.layout,
                cfg.transit.direction,
                secs(cfg.transit.fetch_timeout_secs),
            ),
            secs(cfg.transit.interval_secs),
            Some(transit_cmd_rx),
        );
        spawner.spawn(
            ClockProvider::new(Arc::clone(&sources.clock), cfg.clock.format.clone(), cfg.clock.utc, palette::WHITE),
            secs(cfg.clock.interval_secs),
            None,
        );
        spawner.spawn(
            MusicProvider::new(
                sources.music,
                Arc::clone(&sources.clock),
                anim_tx,
                secs(cfg.music.fetch_timeout_secs),
                secs(cfg.music.freshness_secs),
            ),
            secs(cfg.music.interval_secs),
            None,
        );
        let ProviderSpawner { timers, tasks: provider_tasks, .. } = spawner;

        if let Some(link) = sources.network {
            let dog = ConnectivityWatchdog::new(link, secs(cfg.network.check_interval_secs));
            let stop = stop.clone();
            background.push(tokio::spawn(async move {
                dog.run(stop).await;
            }));
        }

        if cfg.input.console {
            let reader = BufReader::new(tokio::io::stdin());
            let (tx, stop) = (control_tx.clone(), stop.clone());
            background.push(tokio::spawn(async move {
                input::run_console(reader, tx, stop).await;
            }));
        }
        #[cfg(unix)]
        if cfg.input.button_signal {
            let (tx, stop) = (control_tx.clone(), stop.clone());
            background.push(tokio::spawn(async move {
                if let Err(e) = input::run_button_signal(tx, stop).await {
                    warn!("Mode button unavailable: {}", e);
                }
            }));
        }

        if let Some(ready) = ready {
            let _ = ready.send(AppHandles { mode: shared.clone(), control: control_tx.clone() });
        }
        drop(control_tx);

        shutdown.cancelled().await;
        info!("Shutting down");

        // producers first, then the consumer clears the panel
        stop.cancel();
        let mut report = AppReport::default();
        for (mode, task) in provider_tasks {
            match task.await {
                Ok(stats) => report.providers.push((mode, stats)),
                Err(e) => error!("{} provider task failed: {}", mode, e),
            }
        }
        for task in timers {
            if let Err(e) = task.await {
                error!("Timer task failed: {}", e);
            }
        }
        for task in background {
            if let Err(e) = task.await {
                error!("Task failed: {}", e);
            }
        }
        report.render_dropped = render_tx.dropped();
        drop(render_tx);

        consumer_stop.cancel();
        report.consumer = consumer_task.join().await?;
        info!(
            "Sign stopped: {} frames dispatched, {} render messages dropped",
            report.consumer.dispatched, report.render_dropped
        );
        Ok(report)
    }
}

enum ConsumerTask {
    Thread(std::thread::JoinHandle<ConsumerStats>),
    Task(JoinHandle<ConsumerStats>),
}

impl ConsumerTask {
    async fn join(self) -> Result<ConsumerStats, DisplayError> {
        match self {
            ConsumerTask::Task(task) => task
                .await
                .map_err(|e| DisplayError::Other(format!("display task failed: {}", e))),
            ConsumerTask::Thread(thread) => tokio::task::spawn_blocking(move || thread.join())
                .await
                .map_err(|e| DisplayError::Other(format!("display join failed: {}", e)))?
                .map_err(|_| DisplayError::Other("display thread panicked".to_string())),
        }
    }
}
