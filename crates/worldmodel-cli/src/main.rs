//! `worldmodel-cli` – World Model Command Line Interface
//!
//! The `worldmodel` binary:
//!
//! 1. Initialises tracing (console or JSON, optional OTLP export).
//! 2. Loads `~/.worldmodel/config.toml`, writing defaults on first run.
//! 3. Opens the SQLite world model and starts a background map listener.
//! 4. Drops the user into an interactive shell over the boundary
//!    operations (`/help` lists them).

mod config;
mod repl;
mod telemetry;

use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use worldmodel_ingest::{MapBus, MapListener};
use worldmodel_store::WorldModel;
use worldmodel_store::sqlite::SqliteBackend;

fn main() {
    let _telemetry = telemetry::init_tracing("worldmodel");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down after the current command …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => first_run(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    // ── World model ───────────────────────────────────────────────────────
    let backend = match open_backend(&cfg) {
        Ok(backend) => backend,
        Err(e) => {
            println!("{}: {}", "Failed to open world model database".red(), e);
            std::process::exit(1);
        }
    };
    let world = Arc::new(WorldModel::with_ref_field(Arc::new(backend), cfg.ref_field.clone()));
    info!(database = %cfg.database_path, class_tag = %cfg.class_tag, "world model opened");

    // ── Map listener ──────────────────────────────────────────────────────
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };
    let bus = MapBus::default();
    let listener = MapListener::new(world.clone(), cfg.listener_config());
    let _listener = runtime.spawn(listener.run(bus.subscribe()));

    println!(
        "  Map listener: class tag {}, {} update(s)/s, atomic dedup {}",
        cfg.class_tag.bold(),
        cfg.max_updates_per_sec,
        if cfg.atomic_dedup { "on".green() } else { "off".yellow() }
    );
    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    let shell = repl::Shell::new(world, bus);
    repl::run(&shell, shutdown);

    // Closing the bus lets the listener drain and stop.
    drop(shell);
    runtime.shutdown_timeout(Duration::from_secs(2));
}

fn open_backend(cfg: &config::Config) -> Result<SqliteBackend, String> {
    if cfg.is_in_memory() {
        return SqliteBackend::open_in_memory().map_err(|e| e.to_string());
    }
    if let Some(parent) = Path::new(&cfg.database_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        config::create_private_dir(parent)?;
    }
    SqliteBackend::open(&cfg.database_path).map_err(|e| e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// First run
// ─────────────────────────────────────────────────────────────────────────────

fn first_run() -> config::Config {
    println!();
    println!("  No configuration found.  Let's set up the world model.\n");

    let mut cfg = config::Config::default();
    cfg.database_path = prompt_line(
        &format!("  Database path (or {}) [{}]: ", config::IN_MEMORY, cfg.database_path),
        &cfg.database_path,
    );
    cfg.class_tag = prompt_line(&format!("  Map class tag [{}]: ", cfg.class_tag), &cfg.class_tag);

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {} {}",
        "World Model".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Instances, descriptions and descriptors of the robot's world");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
