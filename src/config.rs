use clap::{ArgAction, Parser, ValueHint};
use dirs_next::{data_local_dir, home_dir};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{env, fs, path::{Path, PathBuf}};
use thiserror::Error;

use crate::constants::*;
use crate::providers::PollPolicy;
use crate::providers::transit::{Direction, SlotLayout, Station};
use crate::sign::SignMode;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration. Every section falls back to its defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General options
    pub log_level: Option<String>, // e.g., "info" | "debug"
    pub display: DisplayConfig,
    pub sign: SignConfig,
    pub channels: ChannelConfig,
    pub transit: TransitConfig,
    pub music: MusicConfig,
    pub clock: ClockConfig,
    pub test_pattern: TestPatternConfig,
    pub network: NetworkConfig,
    pub input: InputConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// In-memory only
    #[default]
    Headless,
    /// PPM file, refreshed a couple of times a second
    Snapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub driver: DriverKind,
    pub width: u32,
    pub height: u32,
    pub brightness: u8, // 0-255
    pub snapshot_path: PathBuf,
    /// run the display consumer on its own OS thread
    pub dedicated_thread: bool,
    pub animation_fps: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Headless,
            width: SCREEN_WIDTH,
            height: SCREEN_HEIGHT,
            brightness: DEFAULT_BRIGHTNESS,
            snapshot_path: PathBuf::from("lmsign.ppm"),
            dedicated_thread: true,
            animation_fps: ANIMATION_FPS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignConfig {
    pub initial_mode: SignMode,
    /// restore the last selected mode at startup
    pub remember_mode: bool,
    pub state_file: Option<PathBuf>,
    pub poll_policy: PollPolicy,
}

impl Default for SignConfig {
    fn default() -> Self {
        Self {
            initial_mode: SignMode::Transit,
            remember_mode: false,
            state_file: None,
            poll_policy: PollPolicy::Always,
        }
    }
}

impl SignConfig {
    /// Explicit path, else `<data dir>/lmsign/mode`.
    pub fn state_path(&self) -> Option<PathBuf> {
        self.state_file
            .clone()
            .or_else(|| data_local_dir().map(|d| d.join("lmsign").join("mode")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub render_capacity: usize,
    pub control_capacity: usize,
    pub animation_capacity: usize,
    pub send_timeout_ms: u64,
    pub receive_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            render_capacity: RENDER_QUEUE_CAPACITY,
            control_capacity: CONTROL_QUEUE_CAPACITY,
            animation_capacity: ANIMATION_QUEUE_CAPACITY,
            send_timeout_ms: SEND_TIMEOUT.as_millis() as u64,
            receive_timeout_ms: RECEIVE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ChannelConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitConfig {
    pub api_base: String,
    /// also read from MBTA_API_KEY
    pub api_key: Option<String>,
    pub route: String,
    pub station: Station,
    pub layout: SlotLayout,
    /// used by the one_direction layout
    pub direction: Direction,
    pub interval_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for TransitConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api-v3.mbta.com".to_string(),
            api_key: None,
            route: "Red".to_string(),
            station: Station::Harvard,
            layout: SlotLayout::BothDirections,
            direction: Direction::Southbound,
            interval_secs: TRANSIT_POLL_INTERVAL.as_secs(),
            fetch_timeout_secs: FETCH_DEADLINE.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    /// also read from SPOTIFY_CLIENT_ID / _SECRET / _REFRESH_TOKEN
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub interval_secs: u64,
    pub freshness_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            refresh_token: None,
            interval_secs: MUSIC_POLL_INTERVAL.as_secs(),
            freshness_secs: MUSIC_FRESHNESS_WINDOW.as_secs(),
            fetch_timeout_secs: FETCH_DEADLINE.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// strftime pattern
    pub format: String,
    pub utc: bool,
    pub interval_secs: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            format: "%H:%M:%S".to_string(),
            utc: false,
            interval_secs: CLOCK_POLL_INTERVAL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestPatternConfig {
    pub banner: String,
    pub interval_secs: u64,
}

impl Default for TestPatternConfig {
    fn default() -> Self {
        Self {
            banner: "lmsign".to_string(),
            interval_secs: TEST_POLL_INTERVAL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub enabled: bool,
    /// host:port checked for reachability
    pub check_addr: String,
    pub check_timeout_ms: u64,
    pub check_interval_secs: u64,
    /// program and arguments run when the check fails
    pub reconnect_command: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_addr: "api-v3.mbta.com:443".to_string(),
            check_timeout_ms: 3_000,
            check_interval_secs: CONNECTIVITY_CHECK_INTERVAL.as_secs(),
            reconnect_command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// read commands from stdin
    pub console: bool,
    /// SIGUSR1 acts as the mode button
    pub button_signal: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { console: true, button_signal: true }
    }
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "lmsign", about = "LED matrix sign", version, disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Shorthand for --log-level debug
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub debug: bool,
    /// Start in this mode (name or index)
    #[arg(long)]
    pub mode: Option<SignMode>,
    /// Transit station (name, index or stop id)
    #[arg(long)]
    pub station: Option<Station>,
    #[arg(long, value_enum)]
    pub display_driver: Option<DriverArg>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub snapshot_path: Option<PathBuf>,
    #[arg(long)]
    pub display_width: Option<u32>,
    #[arg(long)]
    pub display_height: Option<u32>,
    #[arg(long)]
    pub brightness: Option<u8>,
    #[arg(long, action = ArgAction::Set)]
    pub dedicated_display_thread: Option<bool>,
    #[arg(long, value_enum)]
    pub poll_policy: Option<PollPolicyArg>,
    #[arg(long, action = ArgAction::Set)]
    pub console: Option<bool>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DriverArg {
    Headless,
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PollPolicyArg {
    Always,
    ActiveOnly,
}

/// Public entry point: read YAML, apply env secrets and CLI, validate.
pub fn load(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) defaults (from `Default` impls), 2) YAML file (explicit path or search)
    let mut cfg = if let Some(p) = cli.config.as_ref() {
        if !p.exists() {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
        read_yaml(p)?
    } else if let Some(p) = find_config_file() {
        read_yaml(&p)?
    } else {
        Config::default()
    };

    // 3) secrets from the environment
    apply_env(&mut cfg, |key| env::var(key).ok());

    // 4) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 5) Validate
    validate(&cfg)?;
    Ok(cfg)
}

/// Pretty YAML of the effective config.
pub fn dump(cfg: &Config) -> Result<String, ConfigError> {
    Ok(serde_yaml::to_string(cfg)?)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/lmsign/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/lmsign/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/lmsign.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["lmsign.yaml", "config.yaml", "config/lmsign.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    parse_yaml(&s)
}

pub fn parse_yaml(s: &str) -> Result<Config, ConfigError> {
    Ok(serde_yaml::from_str(s)?)
}

/// Secrets never need to live in the YAML file.
fn apply_env(cfg: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("MBTA_API_KEY")          { cfg.transit.api_key = Some(v); }
    if let Some(v) = var("SPOTIFY_CLIENT_ID")     { cfg.music.client_id = Some(v); }
    if let Some(v) = var("SPOTIFY_CLIENT_SECRET") { cfg.music.client_secret = Some(v); }
    if let Some(v) = var("SPOTIFY_REFRESH_TOKEN") { cfg.music.refresh_token = Some(v); }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()  { cfg.log_level = cli.log_level.clone(); }
    if cli.debug                { cfg.log_level = Some("debug".to_string()); }
    if let Some(m) = cli.mode   { cfg.sign.initial_mode = m; }
    if let Some(s) = cli.station { cfg.transit.station = s; }
    if let Some(p) = cli.poll_policy {
        cfg.sign.poll_policy = match p {
            PollPolicyArg::Always => PollPolicy::Always,
            PollPolicyArg::ActiveOnly => PollPolicy::ActiveOnly,
        };
    }

    let display = &mut cfg.display;
    if let Some(d) = cli.display_driver {
        display.driver = match d {
            DriverArg::Headless => DriverKind::Headless,
            DriverArg::Snapshot => DriverKind::Snapshot,
        };
    }
    if let Some(p) = cli.snapshot_path.as_ref()  { display.snapshot_path = p.clone(); }
    if let Some(w) = cli.display_width           { display.width = w; }
    if let Some(h) = cli.display_height          { display.height = h; }
    if let Some(b) = cli.brightness              { display.brightness = b; }
    if let Some(t) = cli.dedicated_display_thread { display.dedicated_thread = t; }
    if let Some(c) = cli.console                 { cfg.input.console = c; }
}

/// Put any invariants here (required fields, ranges, etc.)
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let fail = |msg: &str| Err(ConfigError::Validation(msg.to_string()));

    if cfg.display.width == 0 || cfg.display.height == 0 {
        return fail("display width/height must be > 0");
    }
    if cfg.display.animation_fps == 0 {
        return fail("display animation_fps must be > 0");
    }
    let ch = &cfg.channels;
    if ch.render_capacity == 0 || ch.control_capacity == 0 || ch.animation_capacity == 0 {
        return fail("channel capacities must be > 0");
    }
    if ch.send_timeout_ms == 0 || ch.receive_timeout_ms == 0 {
        return fail("channel timeouts must be > 0");
    }
    let intervals = [
        ("transit.interval_secs", cfg.transit.interval_secs),
        ("music.interval_secs", cfg.music.interval_secs),
        ("clock.interval_secs", cfg.clock.interval_secs),
        ("test_pattern.interval_secs", cfg.test_pattern.interval_secs),
        ("network.check_interval_secs", cfg.network.check_interval_secs),
        ("transit.fetch_timeout_secs", cfg.transit.fetch_timeout_secs),
        ("music.fetch_timeout_secs", cfg.music.fetch_timeout_secs),
    ];
    if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
        return Err(ConfigError::Validation(format!("{} must be > 0", name)));
    }
    if cfg.clock.format.is_empty() {
        return fail("clock format must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        validate(&cfg).unwrap();
        assert_eq!(cfg.display.width, 160);
        assert_eq!(cfg.display.height, 32);
        assert_eq!(cfg.display.brightness, 90);
        assert_eq!(cfg.sign.poll_policy, PollPolicy::Always);
        assert!(cfg.display.dedicated_thread);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = parse_yaml(
            "transit:\n  station: park_street\n  layout: one_direction\n  direction: northbound\nsign:\n  initial_mode: music\n",
        )
        .unwrap();
        assert_eq!(cfg.transit.station, Station::ParkStreet);
        assert_eq!(cfg.transit.layout, SlotLayout::OneDirection);
        assert_eq!(cfg.transit.direction, Direction::Northbound);
        assert_eq!(cfg.sign.initial_mode, SignMode::Music);
        assert_eq!(cfg.transit.route, "Red");
        assert_eq!(cfg.clock.interval_secs, 1);
    }

    #[test]
    fn test_bad_yaml_is_error() {
        assert!(matches!(parse_yaml("transit:\n  station: braintree\n"), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_validation_rejects_zeroes() {
        let mut cfg = Config::default();
        cfg.channels.render_capacity = 0;
        assert!(validate(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.clock.interval_secs = 0;
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("clock.interval_secs"));
    }

    #[test]
    fn test_env_then_cli_precedence() {
        let mut cfg = parse_yaml("log_level: warn\nmusic:\n  client_id: from-yaml\n").unwrap();
        let env: HashMap<&str, &str> = [("SPOTIFY_CLIENT_ID", "from-env"), ("MBTA_API_KEY", "k")].into();
        apply_env(&mut cfg, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.music.client_id.as_deref(), Some("from-env"));
        assert_eq!(cfg.transit.api_key.as_deref(), Some("k"));

        let cli = Cli {
            debug: true,
            station: Some(Station::Davis),
            brightness: Some(200),
            dedicated_display_thread: Some(false),
            ..Default::default()
        };
        apply_cli_overrides(&mut cfg, &cli);
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        assert_eq!(cfg.transit.station, Station::Davis);
        assert_eq!(cfg.display.brightness, 200);
        assert!(!cfg.display.dedicated_thread);
    }

    #[test]
    fn test_cli_parses_mode_and_station() {
        let cli = Cli::try_parse_from(["lmsign", "--mode", "clock", "--station", "kendall", "--poll-policy", "active-only"])
            .unwrap();
        assert_eq!(cli.mode, Some(SignMode::Clock));
        assert_eq!(cli.station, Some(Station::Kendall));
        assert_eq!(cli.poll_policy, Some(PollPolicyArg::ActiveOnly));
    }

    #[test]
    fn test_dump_roundtrips() {
        let cfg = Config::default();
        let yaml = dump(&cfg).unwrap();
        let back = parse_yaml(&yaml).unwrap();
        assert_eq!(back.transit.station, cfg.transit.station);
    }
}
