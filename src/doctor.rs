// SPDX-License-Identifier: MIT
//! doctor.rs — pre-flight diagnostic checks for `wardend doctor`.
//!
//! This module is self-contained and does NOT require AppContext.
//! It runs before the daemon starts, so it can catch configuration
//! problems before they cause confusing startup failures.

use crate::config::WardenConfig;

/// The result of a single diagnostic check.
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Run all diagnostic checks and return a list of results.
pub fn run_doctor(config: &WardenConfig) -> Vec<CheckResult> {
    vec![
        check_port_available(config),
        check_data_dir_writable(config),
        check_sqlite_accessible(config),
        check_agent_catalog(config),
        check_disk_space(config),
    ]
}

// ─── Individual checks ────────────────────────────────────────────────────────

/// Check 1: the configured REST port is available (not in use by another process).
fn check_port_available(config: &WardenConfig) -> CheckResult {
    let bind = format!("{}:{}", config.bind_address, config.port);
    let passed = std::net::TcpListener::bind(&bind).is_ok();
    CheckResult {
        name: "REST port available",
        passed,
        detail: if passed {
            format!("port {} is free", config.port)
        } else {
            format!(
                "port {} is in use — is another wardend already running?",
                config.port
            )
        },
    }
}

/// Check 2: the data directory exists (or can be created) and is writable.
fn check_data_dir_writable(config: &WardenConfig) -> CheckResult {
    let data_dir = &config.data_dir;
    if let Err(e) = std::fs::create_dir_all(data_dir) {
        return CheckResult {
            name: "Data directory writable",
            passed: false,
            detail: format!("cannot create {}: {e}", data_dir.display()),
        };
    }
    // Try to create a temp file to confirm writability
    let test_path = data_dir.join(".doctor_write_test");
    match std::fs::write(&test_path, b"ok") {
        Ok(_) => {
            let _ = std::fs::remove_file(&test_path);
            CheckResult {
                name: "Data directory writable",
                passed: true,
                detail: format!("{} is writable", data_dir.display()),
            }
        }
        Err(e) => CheckResult {
            name: "Data directory writable",
            passed: false,
            detail: format!("cannot write to {}: {e}", data_dir.display()),
        },
    }
}

/// Check 3: SQLite database file is accessible.
fn check_sqlite_accessible(config: &WardenConfig) -> CheckResult {
    let db_path = config.data_dir.join("wardend.db");
    let exists = db_path.exists();
    CheckResult {
        name: "SQLite DB accessible",
        passed: exists,
        detail: if exists {
            format!("{} exists and is readable", db_path.display())
        } else {
            format!(
                "{} not found (will be created on first start)",
                db_path.display()
            )
        },
    }
}

/// Check 4: the agent catalog resolves to something workable.
fn check_agent_catalog(config: &WardenConfig) -> CheckResult {
    let registry = config.agent_registry();
    if registry.is_empty() {
        return CheckResult {
            name: "Agent catalog",
            passed: false,
            detail: "no agents configured — nothing to monitor".to_string(),
        };
    }
    if let Some(bad) = registry
        .iter()
        .find(|a| a.id.trim().is_empty() || a.name.trim().is_empty())
    {
        return CheckResult {
            name: "Agent catalog",
            passed: false,
            detail: format!("agent entry with empty id or name: {:?}", bad.id),
        };
    }
    CheckResult {
        name: "Agent catalog",
        passed: true,
        detail: format!(
            "{} agents ({} critical)",
            registry.len(),
            registry.critical_count()
        ),
    }
}

/// Check 5: sufficient disk space is available (> 100 MB).
fn check_disk_space(config: &WardenConfig) -> CheckResult {
    match available_disk_bytes(&config.data_dir) {
        Some(bytes) => {
            const WARN_THRESHOLD: u64 = 100 * 1024 * 1024; // 100 MB
            let passed = bytes > WARN_THRESHOLD;
            let detail = if bytes >= 1024 * 1024 * 1024 {
                format!("{:.1} GB free", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
            } else {
                format!("{:.0} MB free", bytes as f64 / (1024.0 * 1024.0))
            };
            CheckResult {
                name: "Disk space",
                passed,
                detail: if passed {
                    detail
                } else {
                    format!("low disk space: only {detail}")
                },
            }
        }
        None => CheckResult {
            name: "Disk space",
            passed: true, // assume ok if we cannot check
            detail: "could not determine disk space".to_string(),
        },
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Return available bytes on the filesystem containing `path`.
fn available_disk_bytes(path: &std::path::Path) -> Option<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        let path_cstr = CString::new(path.to_str().unwrap_or("/").as_bytes()).ok()?;
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::statvfs(path_cstr.as_ptr(), &mut stat) };
        if ret == 0 {
            // f_bavail = blocks available to unprivileged user
            // f_frsize = fundamental file system block size
            Some(stat.f_bavail as u64 * stat.f_frsize as u64)
        } else {
            None
        }
    }
    #[cfg(not(unix))]
    {
        // On non-Unix platforms (Windows), we skip the check.
        let _ = path;
        None
    }
}

// ─── Output ───────────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Print a formatted table of check results to stdout.
pub fn print_doctor_results(results: &[CheckResult]) {
    println!();
    println!("{BOLD}wardend doctor — pre-flight checks{RESET}");
    println!("{}", "─".repeat(60));

    for r in results {
        let (symbol, color) = if r.passed { ("✓", GREEN) } else { ("✗", RED) };
        println!("  {color}{symbol}{RESET}  {:<30}  {}", r.name, r.detail);
    }

    println!("{}", "─".repeat(60));

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed == 0 {
        println!("{GREEN}All checks passed.{RESET}");
    } else {
        println!("{RED}{failed} check(s) failed. See above for details.{RESET}");
    }
    println!();
}
