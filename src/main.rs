use wardend::doctor;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use wardend::{
    briefing::run_briefing_job,
    config::{ConfigWatcher, WardenConfig},
    health::run_health_monitor,
    rest,
    scheduler::run_scheduler_job,
    AppContext,
};

#[derive(Parser)]
#[command(
    name = "wardend",
    about = "Agent warden — health monitoring and task scheduling daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// REST API server port
    #[arg(long, env = "WARDEND_PORT")]
    port: Option<u16>,

    /// Data directory for config and the SQLite database
    #[arg(long, env = "WARDEND_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "WARDEND_LOG")]
    log: Option<String>,

    /// Bind address for the REST server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "WARDEND_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "WARDEND_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon server (default when no subcommand given).
    ///
    /// Runs wardend in the foreground.
    ///
    /// Examples:
    ///   wardend serve
    ///   wardend
    Serve,
    /// Scaffold the data directory.
    ///
    /// Creates {data_dir}, a starter config.toml with every value commented
    /// out at its default, and the SQLite database (migrated and ready).
    /// Safe to re-run: existing files are never overwritten.
    ///
    /// Examples:
    ///   wardend init
    ///   wardend init --data-dir /var/lib/wardend
    Init,
    /// Show daemon status (running, version, uptime).
    ///
    /// Queries the running daemon's /health endpoint and prints a summary
    /// line. Exits 0 if healthy, 1 if stopped or unresponsive.
    ///
    /// Examples:
    ///   wardend status
    ///   wardend status --json
    Status {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },
    /// Run diagnostic checks on daemon prerequisites.
    ///
    /// Checks port availability, data directory writability, SQLite database
    /// accessibility, the agent catalog, and disk space.
    ///
    /// Exit code 0 if all checks pass, 1 if any check fails.
    ///
    /// Examples:
    ///   wardend doctor
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── Logging setup ────────────────────────────────────────────────────────
    // Init once — must happen before any tracing calls.
    let log_level = args.log.as_deref().unwrap_or("info").to_owned();
    let log_format =
        std::env::var("WARDEND_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    match args.command {
        Some(Command::Init) => {
            run_init(args.data_dir).await?;
        }
        Some(Command::Status { json }) => {
            let config =
                WardenConfig::new(args.port, args.data_dir, Some("error".to_string()), None);
            let exit_code = run_status(&config, json).await;
            std::process::exit(exit_code);
        }
        Some(Command::Doctor) => {
            let config =
                WardenConfig::new(args.port, args.data_dir, Some("error".to_string()), None);
            let results = doctor::run_doctor(&config);
            doctor::print_doctor_results(&results);
            let failed = results.iter().filter(|r| !r.passed).count();
            std::process::exit(if failed == 0 { 0 } else { 1 });
        }
        None | Some(Command::Serve) => {
            run_server(args.port, args.data_dir, args.log, args.bind_address).await?;
        }
    }

    Ok(())
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators like Loki/Elasticsearch).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("wardend.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            // Fall back to stdout-only — don't panic on a bad log path.
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}

// ── Panic hook + crash log ────────────────────────────────────────────────────

/// Install a custom panic hook that writes panic info + backtrace to
/// `{data_dir}/crash.log`.
///
/// The crash log is checked and removed on the next startup (`check_crash_log`).
fn install_panic_hook(data_dir: std::path::PathBuf) {
    let original = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        // Call the original hook first (prints to stderr).
        original(info);

        let crash_path = data_dir.join("crash.log");
        let msg = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("unknown panic");

        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        let backtrace = std::backtrace::Backtrace::capture();
        let content = format!(
            "wardend panic at {location}\n\
             message: {msg}\n\
             version: {}\n\
             backtrace:\n{backtrace:#}\n",
            env!("CARGO_PKG_VERSION")
        );

        // Best-effort write — if this fails, we can't do much.
        let _ = std::fs::write(&crash_path, &content);
    }));
}

/// Check for a crash log from the previous run, log it at error level, then
/// delete it.
///
/// Called early in `run_server()` after logging is initialized.
fn check_crash_log(data_dir: &std::path::Path) {
    let crash_path = data_dir.join("crash.log");
    match std::fs::read_to_string(&crash_path) {
        Ok(content) => {
            tracing::error!(
                crash_report = %content.trim(),
                "previous daemon run ended with a panic — see crash report above"
            );
            let _ = std::fs::remove_file(&crash_path);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(err = %e, "could not read crash.log");
        }
    }
}

// ── wardend init ──────────────────────────────────────────────────────────────

const STARTER_CONFIG: &str = r#"# wardend configuration — all values shown at their defaults.
# Uncomment and edit to override. CLI flags and WARDEND_* env vars win.

# port = 4310
# bind_address = "127.0.0.1"
# log = "info"
# log_format = "pretty"        # or "json"
# api_token = ""               # bearer token for operator endpoints
# cycle_secret = ""            # bearer token for POST /api/v1/scheduler/cycle

# [health]
# staleness_secs = 120
# check_interval_secs = 300
# auto_recover = true

# [scheduler]
# batch_cap = 10
# drive_interval_secs = 60     # 0 = external triggers only
# followup_delay_secs = 300
# retain_days = 30

# [briefing]
# enabled = true

# [observability]
# slow_query_threshold_ms = 100

# Extra agents layered over the built-in catalog:
# [[agents]]
# id = "data-agent"
# name = "Data Agent"
# role = "service"             # "system" | "service"
# critical = false
"#;

async fn run_init(data_dir: Option<std::path::PathBuf>) -> Result<()> {
    let config = WardenConfig::new(None, data_dir, None, None);
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("failed to create {}", config.data_dir.display()))?;

    let config_path = config.data_dir.join("config.toml");
    if config_path.exists() {
        println!(
            "config.toml already exists at {} — leaving it in place",
            config_path.display()
        );
    } else {
        tokio::fs::write(&config_path, STARTER_CONFIG)
            .await
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        println!("created {}", config_path.display());
    }

    // Open (and migrate) the database so the first `serve` starts instantly.
    let _storage = wardend::storage::Storage::new(&config.data_dir).await?;
    println!(
        "database ready at {}",
        config.data_dir.join("wardend.db").display()
    );
    Ok(())
}

// ── wardend status ────────────────────────────────────────────────────────────

async fn run_status(config: &WardenConfig, json: bool) -> i32 {
    // A daemon bound to 0.0.0.0 is still reachable on loopback.
    let host = if config.bind_address == "0.0.0.0" {
        "127.0.0.1"
    } else {
        config.bind_address.as_str()
    };
    let url = format!("http://{host}:{}/health", config.port);

    let client = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(3))
        .build()
    {
        Ok(c) => c,
        Err(_) => return 1,
    };

    let resp = match client.get(&url).send().await {
        Ok(r) => r,
        Err(_) => {
            if json {
                println!(r#"{{"status":"not_running"}}"#);
            } else {
                println!("wardend: not running");
            }
            return 1;
        }
    };

    match resp.json::<serde_json::Value>().await {
        Ok(result) => {
            let version = result["version"].as_str().unwrap_or("?");
            let uptime_secs = result["uptimeSecs"].as_u64().unwrap_or(0);
            let uptime_str = format_uptime(uptime_secs);

            if json {
                println!("{}", serde_json::to_string(&result).unwrap_or_default());
            } else {
                println!("wardend {version} — Running (uptime {uptime_str})");
            }
            0
        }
        Err(_) => {
            if json {
                println!(r#"{{"status":"not_running"}}"#);
            } else {
                println!("wardend: not running");
            }
            1
        }
    }
}

/// Format uptime seconds as "2h 14m" or "45m 3s".
fn format_uptime(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

// ── wardend serve ─────────────────────────────────────────────────────────────

async fn run_server(
    port: Option<u16>,
    data_dir: Option<std::path::PathBuf>,
    log: Option<String>,
    bind_address: Option<String>,
) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "wardend starting");

    let config = WardenConfig::new(port, data_dir, log, bind_address);
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        "config loaded"
    );

    // ── Panic hook: write crash.log on panic ─────────────────────────────────
    install_panic_hook(config.data_dir.clone());
    // If previous run panicked, log the crash report and delete it.
    check_crash_log(&config.data_dir);

    let ctx = AppContext::init(config).await?;
    info!(
        agents = ctx.registry.len(),
        critical = ctx.registry.critical_count(),
        "agent catalog loaded"
    );

    // ── Config hot-reload watcher ────────────────────────────────────────────
    // Must stay alive for the server lifetime; dropping it stops the watch.
    let _config_watcher = ConfigWatcher::start(&ctx.config.data_dir, ctx.hot.clone());

    // ── Background jobs ──────────────────────────────────────────────────────
    {
        let evaluator = ctx.evaluator.clone();
        let fallback = ctx.fallback.clone();
        let gate = ctx.gate.clone();
        let interval = ctx.config.health.check_interval_secs;
        let auto_recover = ctx.config.health.auto_recover;
        tokio::spawn(run_health_monitor(
            evaluator,
            fallback,
            gate,
            interval,
            auto_recover,
        ));
    }
    {
        let engine = ctx.engine.clone();
        let gate = ctx.gate.clone();
        let interval = ctx.config.scheduler.drive_interval_secs;
        tokio::spawn(run_scheduler_job(engine, gate, interval));
    }
    if ctx.config.briefing.enabled {
        let generator = ctx.briefing.clone();
        let gate = ctx.gate.clone();
        let tasks = ctx.engine.store().clone();
        let storage = ctx.storage.clone();
        let retain_days = ctx.config.scheduler.retain_days;
        tokio::spawn(run_briefing_job(
            generator,
            gate,
            tasks,
            storage,
            retain_days,
        ));
    }

    rest::start_rest_server(ctx).await
}
