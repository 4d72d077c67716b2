/*
 *  tests/sign_pipeline.rs
 *
 *  Whole-sign tests: fake sources, headless panel
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 */

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use embedded_graphics::pixelcolor::Rgb565;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use lmsign::app::{App, AppHandles, AppReport, Sources};
use lmsign::channel::bounded;
use lmsign::config::Config;
use lmsign::display::DisplayError;
use lmsign::display::drivers::{HeadlessDriver, HeadlessState};
use lmsign::fetch::ProviderError;
use lmsign::providers::clock::{ClockProvider, WallClock};
use lmsign::providers::music::MusicSource;
use lmsign::providers::transit::{Direction, RawPrediction, Station, TransitSource};
use lmsign::providers::{PollPolicy, ProviderTask};
use lmsign::render::{CurrentlyPlaying, RenderMessage, palette};
use lmsign::sign::{SharedMode, SignMode, UIMessage};

struct FixedClock(DateTime<Utc>);

impl WallClock for FixedClock {
    fn now(&self) -> Option<DateTime<Utc>> {
        Some(self.0)
    }
}

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap()
}

struct FakeTransit;

#[async_trait]
impl TransitSource for FakeTransit {
    async fn predictions(&self, _station: Station) -> Result<Vec<RawPrediction>, ProviderError> {
        let at = |secs| Some(noon() + ChronoDuration::seconds(secs));
        Ok(vec![
            RawPrediction {
                direction: Direction::Southbound,
                arrival: at(200),
                departure: at(230),
                status: None,
                headsign: Some("Ashmont".into()),
            },
            RawPrediction {
                direction: Direction::Northbound,
                arrival: at(400),
                departure: at(430),
                status: None,
                headsign: Some("Alewife".into()),
            },
        ])
    }
}

struct NothingPlaying;

#[async_trait]
impl MusicSource for NothingPlaying {
    async fn currently_playing(&self) -> Result<Option<CurrentlyPlaying>, ProviderError> {
        Ok(None)
    }
}

fn fake_sources() -> Sources {
    Sources {
        clock: Arc::new(FixedClock(noon())),
        transit: Arc::new(FakeTransit),
        music: Arc::new(NothingPlaying),
        network: None,
    }
}

fn test_config(mode: SignMode) -> Config {
    let mut cfg = Config::default();
    cfg.sign.initial_mode = mode;
    cfg.display.dedicated_thread = false;
    cfg.input.console = false;
    cfg.input.button_signal = false;
    cfg
}

struct Running {
    handles: AppHandles,
    panel: Arc<Mutex<HeadlessState>>,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<Result<AppReport, DisplayError>>,
}

async fn start(cfg: Config) -> Running {
    let driver = HeadlessDriver::new(cfg.display.width, cfg.display.height);
    let panel = driver.state();
    let sources = fake_sources();
    let shutdown = CancellationToken::new();
    let (ready_tx, ready_rx) = oneshot::channel();
    let task = tokio::spawn(App::new(cfg, sources, Box::new(driver)).run(shutdown.clone(), Some(ready_tx)));
    let handles = ready_rx.await.unwrap();
    Running { handles, panel, shutdown, task }
}

impl Running {
    fn frame(&self) -> Vec<Rgb565> {
        self.panel.lock().unwrap().frame.clone()
    }

    async fn wait_for(&self, what: &str, mut cond: impl FnMut(&HeadlessState) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond(&self.panel.lock().unwrap()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    async fn stop(self) -> (AppReport, Arc<Mutex<HeadlessState>>) {
        self.shutdown.cancel();
        (self.task.await.unwrap().unwrap(), self.panel)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_only_current_mode_reaches_the_panel() {
    let sign = start(test_config(SignMode::Clock)).await;
    sign.wait_for("clock frame", |s| s.frame_count > 0 && s.lit_pixels() > 0).await;
    // give the other providers' first polls time to arrive and be discarded
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (report, panel) = sign.stop().await;
    let c = report.consumer;
    assert_eq!(c.discarded + c.dispatched, c.received);
    // test, transit and music all polled at startup while clock was showing
    assert!(c.discarded >= 3, "{:?}", c);
    assert!(c.dispatched >= 1);
    assert_eq!(report.providers.len(), 4);

    // cleared on exit
    assert_eq!(panel.lock().unwrap().lit_pixels(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mode_shift_switches_content() {
    let sign = start(test_config(SignMode::Transit)).await;
    sign.wait_for("transit board", |s| s.lit_pixels() > 0).await;
    let board = sign.frame();

    assert!(sign.handles.control.send(UIMessage::ModeShift).await.is_sent());
    let deadline = Instant::now() + Duration::from_secs(2);
    while sign.handles.mode.load() != SignMode::Clock {
        assert!(Instant::now() < deadline, "mode never changed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // the clock ticks every second; its frame replaces the board
    sign.wait_for("clock frame", |s| s.lit_pixels() > 0 && s.frame != board).await;
    let (report, _panel) = sign.stop().await;
    assert_eq!(report.consumer.discarded + report.consumer.dispatched, report.consumer.received);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_station_change_shows_banner_without_mode_change() {
    let sign = start(test_config(SignMode::Transit)).await;
    sign.wait_for("transit board", |s| s.lit_pixels() > 0).await;
    let board = sign.frame();

    assert!(sign.handles.control.send(UIMessage::StationChange(Station::ParkStreet)).await.is_sent());
    sign.wait_for("station banner", |s| s.lit_pixels() > 0 && s.frame != board).await;
    assert_eq!(sign.handles.mode.load(), SignMode::Transit);
    sign.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transit_polled_in_background_shows_on_switch() {
    let mut cfg = test_config(SignMode::Clock);
    cfg.transit.interval_secs = 1;
    let sign = start(cfg).await;
    // first transit poll lands while the clock is up
    sign.wait_for("clock frame", |s| s.lit_pixels() > 0).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let clock_frame = sign.frame();

    assert!(sign.handles.control.send(UIMessage::ModeChange(SignMode::Transit)).await.is_sent());
    // the fake feed never changes, so every later poll is unchanged
    sign.wait_for("transit board", |s| s.lit_pixels() > 0 && s.frame != clock_frame).await;
    let (report, _panel) = sign.stop().await;
    assert!(report.consumer.discarded >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dead_panel_ends_the_run_without_a_signal() {
    let cfg = test_config(SignMode::Clock);
    let driver = HeadlessDriver::new(cfg.display.width, cfg.display.height);
    driver.state().lock().unwrap().simulate_init_failure = true;

    let app = App::new(cfg, fake_sources(), Box::new(driver));
    let result = tokio::time::timeout(Duration::from_secs(2), app.run_until(std::future::pending()))
        .await
        .expect("run_until kept waiting for a signal");
    assert!(matches!(result, Err(DisplayError::InitializationFailed(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_signal_stops_the_run() {
    let cfg = test_config(SignMode::Clock);
    let driver = HeadlessDriver::new(cfg.display.width, cfg.display.height);
    let panel = driver.state();
    let app = App::new(cfg, fake_sources(), Box::new(driver));

    let report = app.run_until(tokio::time::sleep(Duration::from_millis(300))).await.unwrap();
    assert_eq!(report.providers.len(), 4);
    assert_eq!(panel.lock().unwrap().lit_pixels(), 0);
}

#[tokio::test]
async fn test_saturated_render_channel_does_not_stall_providers() {
    // nobody drains the render channel
    let (render_tx, _render_rx) = bounded::<RenderMessage>("render", 1, Duration::from_millis(10));
    let provider = ClockProvider::new(Arc::new(FixedClock(noon())), "%H:%M:%S", true, palette::WHITE);
    let task = ProviderTask::new(provider, PollPolicy::Always, SharedMode::new(SignMode::Clock), render_tx.clone());

    let (wake_tx, wake_rx) = mpsc::channel(16);
    for _ in 0..10 {
        wake_tx.send(()).await.unwrap();
    }
    drop(wake_tx);

    let started = Instant::now();
    let stats = task.run(wake_rx, None, CancellationToken::new()).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(stats.polls, 10);
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.dropped, 9);
    assert_eq!(render_tx.dropped(), 9);
}
