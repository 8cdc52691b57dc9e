use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::registry::{AgentDescriptor, AgentRegistry};

const DEFAULT_PORT: u16 = 4310;
const DEFAULT_STALENESS_SECS: i64 = 120;
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;
const DEFAULT_BATCH_CAP: u32 = 10;
const DEFAULT_DRIVE_INTERVAL_SECS: u64 = 60;
const DEFAULT_FOLLOWUP_DELAY_SECS: i64 = 300;
const DEFAULT_RETAIN_DAYS: u32 = 30;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── HealthConfig ─────────────────────────────────────────────────────────────

/// Health monitoring configuration (`[health]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// A heartbeat older than this many seconds marks its agent unresponsive.
    /// Default: 120.
    pub staleness_secs: i64,
    /// How often the background monitor evaluates the fleet (seconds).
    /// Default: 300.
    pub check_interval_secs: u64,
    /// Run a fallback recovery pass automatically when the monitor finds
    /// unresponsive critical agents. Default: true.
    pub auto_recover: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            staleness_secs: DEFAULT_STALENESS_SECS,
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            auto_recover: true,
        }
    }
}

// ─── SchedulerConfig ──────────────────────────────────────────────────────────

/// Task scheduler configuration (`[scheduler]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum tasks processed per cycle. Default: 10.
    pub batch_cap: u32,
    /// Seconds between internally driven cycles. 0 disables the internal
    /// drive loop — cycles then run only via the REST trigger. Default: 60.
    pub drive_interval_secs: u64,
    /// Delay before a failed task's follow-up comes due (seconds). Default: 300.
    pub followup_delay_secs: i64,
    /// Days to keep completed/failed tasks before pruning (0 = never).
    /// Default: 30.
    pub retain_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_cap: DEFAULT_BATCH_CAP,
            drive_interval_secs: DEFAULT_DRIVE_INTERVAL_SECS,
            followup_delay_secs: DEFAULT_FOLLOWUP_DELAY_SECS,
            retain_days: DEFAULT_RETAIN_DAYS,
        }
    }
}

// ─── BriefingConfig ───────────────────────────────────────────────────────────

/// Daily briefing configuration (`[briefing]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BriefingConfig {
    /// Generate a briefing automatically once a day. Default: true.
    /// The manual REST trigger works either way.
    pub enabled: bool,
}

impl Default for BriefingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ─── ObservabilityConfig ─────────────────────────────────────────────────────

/// Daemon observability configuration (`[observability]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log SQLite queries that exceed this threshold (milliseconds). Default: 100.
    /// Set to 0 to disable slow query logging.
    pub slow_query_threshold_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 100,
        }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// REST server port (default: 4310).
    port: Option<u16>,
    /// Log level filter string, e.g. "debug", "info,wardend=trace" (default: "info").
    log: Option<String>,
    /// Bind address for the REST server (default: "127.0.0.1"; use "0.0.0.0" for LAN access).
    bind_address: Option<String>,
    /// Log output format: "pretty" (default, human-readable) | "json" (structured for log aggregators).
    log_format: Option<String>,
    /// Bearer token for operator endpoints. None = operator auth disabled.
    api_token: Option<String>,
    /// Bearer token for the external scheduler trigger. None = trigger auth disabled.
    cycle_secret: Option<String>,
    /// Health monitoring (`[health]`).
    health: Option<HealthConfig>,
    /// Task scheduler (`[scheduler]`).
    scheduler: Option<SchedulerConfig>,
    /// Daily briefing (`[briefing]`).
    briefing: Option<BriefingConfig>,
    /// Observability (`[observability]`).
    observability: Option<ObservabilityConfig>,
    /// Extra agents layered over the built-in catalog (`[[agents]]` tables).
    /// An entry reusing a built-in id replaces it.
    agents: Option<Vec<AgentDescriptor>>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── WardenConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WardenConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Bind address for the REST server (WARDEND_BIND env var, default: "127.0.0.1").
    pub bind_address: String,
    /// Log output format: "pretty" (default) | "json" (structured for Loki/Elasticsearch).
    pub log_format: String,
    /// Bearer token required on operator endpoints (WARDEND_API_TOKEN env var).
    /// None = operator authentication disabled (local-only, trusted loopback use).
    pub api_token: Option<String>,
    /// Bearer token required on the scheduler cycle trigger (WARDEND_CYCLE_SECRET
    /// env var). Kept separate from `api_token` so an external cron holds a
    /// narrower credential. None = trigger authentication disabled.
    pub cycle_secret: Option<String>,
    /// Health monitoring: staleness window, check interval, auto-recovery.
    pub health: HealthConfig,
    /// Task scheduler: batch cap, drive interval, follow-up delay, retention.
    pub scheduler: SchedulerConfig,
    /// Daily briefing generation.
    pub briefing: BriefingConfig,
    /// Observability: slow query threshold, future metrics settings.
    pub observability: ObservabilityConfig,
    /// Agents declared in config.toml, layered over the built-in catalog.
    pub extra_agents: Vec<AgentDescriptor>,
}

impl WardenConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let bind_address = bind_address
            .or(std::env::var("WARDEND_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let log_format = std::env::var("WARDEND_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let api_token = std::env::var("WARDEND_API_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.api_token);

        let cycle_secret = std::env::var("WARDEND_CYCLE_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.cycle_secret);

        let health = toml.health.unwrap_or_default();
        let scheduler = toml.scheduler.unwrap_or_default();
        let briefing = toml.briefing.unwrap_or_default();
        let observability = toml.observability.unwrap_or_default();
        let extra_agents = toml.agents.unwrap_or_default();

        Self {
            port,
            data_dir,
            log,
            bind_address,
            log_format,
            api_token,
            cycle_secret,
            health,
            scheduler,
            briefing,
            observability,
            extra_agents,
        }
    }

    /// The agent catalog: built-in agents plus any `[[agents]]` entries from
    /// config.toml. A configured entry reusing a built-in id replaces it.
    pub fn agent_registry(&self) -> AgentRegistry {
        let mut entries: Vec<AgentDescriptor> =
            AgentRegistry::builtin().iter().cloned().collect();
        entries.extend(self.extra_agents.iter().cloned());
        AgentRegistry::from_entries(entries)
    }
}

// ─── Hot-reloadable config subset ─────────────────────────────────────────────

/// Non-critical config fields that can be changed without restarting the daemon.
#[derive(Debug, Clone)]
pub struct HotConfig {
    pub log_level: String,
    pub staleness_secs: i64,
    pub batch_cap: u32,
}

impl Default for HotConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            staleness_secs: DEFAULT_STALENESS_SECS,
            batch_cap: DEFAULT_BATCH_CAP,
        }
    }
}

impl HotConfig {
    /// Seed the hot subset from a fully resolved config.
    pub fn from_config(config: &WardenConfig) -> Self {
        Self {
            log_level: config.log.clone(),
            staleness_secs: config.health.staleness_secs,
            batch_cap: config.scheduler.batch_cap,
        }
    }
}

/// Shared handle to the hot subset; readers see updates on their next access.
pub type SharedHotConfig = Arc<RwLock<HotConfig>>;

/// Watches `config.toml` for changes and reloads non-critical fields.
///
/// The watcher uses the `notify` crate (kqueue on macOS, inotify on Linux)
/// to detect file modifications. Only the log level, the staleness window,
/// and the scheduler batch cap are reloaded; port, bind address, and other
/// startup-only fields require a full restart.
pub struct ConfigWatcher {
    // Hold the watcher alive; dropping it stops the file watch.
    _watcher: notify_debouncer_full::Debouncer<
        notify_debouncer_full::notify::RecommendedWatcher,
        notify_debouncer_full::FileIdMap,
    >,
}

impl ConfigWatcher {
    /// Start watching `{data_dir}/config.toml`, writing changes into `hot`.
    ///
    /// Returns `None` if the watcher could not be created (non-fatal; the
    /// daemon runs fine without hot-reload).
    pub fn start(data_dir: &Path, hot: SharedHotConfig) -> Option<Self> {
        let config_path = data_dir.join("config.toml");

        let hot_clone = hot.clone();
        let config_path_clone = config_path.clone();
        let rt_handle = tokio::runtime::Handle::current();

        let watcher = notify_debouncer_full::new_debouncer(
            std::time::Duration::from_secs(2),
            None,
            move |result: notify_debouncer_full::DebounceEventResult| {
                if let Ok(events) = result {
                    // Only act on modify/create events
                    let relevant = events.iter().any(|e| {
                        use notify_debouncer_full::notify::EventKind;
                        matches!(e.event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    });
                    if relevant {
                        let hot = hot_clone.clone();
                        let path = config_path_clone.clone();
                        rt_handle.spawn(async move {
                            let new_config = load_hot_config(&path);
                            let mut guard = hot.write().await;
                            if guard.log_level != new_config.log_level
                                || guard.staleness_secs != new_config.staleness_secs
                                || guard.batch_cap != new_config.batch_cap
                            {
                                info!(
                                    log_level = %new_config.log_level,
                                    staleness_secs = new_config.staleness_secs,
                                    batch_cap = new_config.batch_cap,
                                    "config.toml reloaded"
                                );
                                *guard = new_config;
                            }
                        });
                    }
                }
            },
        );

        match watcher {
            Ok(mut debouncer) => {
                use notify_debouncer_full::notify::Watcher as _;
                // Watch the data_dir (parent of config.toml) since watching a
                // non-existent file fails on some platforms.
                let watch_path = config_path.parent().unwrap_or_else(|| Path::new("."));
                if let Err(e) = debouncer.watcher().watch(
                    watch_path,
                    notify_debouncer_full::notify::RecursiveMode::NonRecursive,
                ) {
                    warn!("config watcher failed to start: {e} — hot-reload disabled");
                    return None;
                }
                info!(path = %config_path.display(), "config hot-reload watcher started");
                Some(Self {
                    _watcher: debouncer,
                })
            }
            Err(e) => {
                warn!("config watcher creation failed: {e} — hot-reload disabled");
                None
            }
        }
    }
}

/// Load only the hot-reloadable fields from config.toml.
fn load_hot_config(path: &Path) -> HotConfig {
    let toml = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| toml::from_str::<TomlConfig>(&s).ok())
        .unwrap_or_default();
    let health = toml.health.unwrap_or_default();
    let scheduler = toml.scheduler.unwrap_or_default();
    HotConfig {
        log_level: toml.log.unwrap_or_else(|| "info".to_string()),
        staleness_secs: health.staleness_secs,
        batch_cap: scheduler.batch_cap,
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/wardend
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("wardend");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/wardend or ~/.local/share/wardend
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("wardend");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("wardend");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\wardend
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("wardend");
        }
    }
    // Fallback
    PathBuf::from(".wardend")
}
