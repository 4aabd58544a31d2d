//! Verdict server binary.
//!
//! Startup sequence: load configuration, initialize tracing, open the
//! connection pool, run migrations, load every tenant's engine, serve HTTP.
//! Any failure before the listener binds exits non-zero.
//!
//! ```bash
//! # Start with config.toml / env configuration
//! verdict-server
//!
//! # Explicit config file and overrides
//! verdict-server --config /etc/verdict/config.toml --host 0.0.0.0 --port 9090
//!
//! # Point at a database directly
//! verdict-server --database /var/lib/verdict/verdict.db
//! ```

use std::sync::Arc;
use std::sync::OnceLock;

use clap::Parser;

use verdict::logging::{level_directive, LogSampler};
use verdict::server::{start_http_server, AppState};
use verdict::store::{migrations, new_file_pool};
use verdict::{Config, TenantManager};

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Verdict - a multi-tenant rules evaluation server
#[derive(Parser, Debug)]
#[command(name = "verdict-server", version, about)]
struct Cli {
    /// Host address to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Path to configuration file (TOML)
    #[arg(long, short)]
    config: Option<String>,

    /// Override the database path
    #[arg(long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let mut config = if let Some(ref config_path) = cli.config {
        if !std::path::Path::new(config_path).exists() {
            eprintln!("ERROR: Config file not found: {config_path}");
            std::process::exit(1);
        }
        Config::from_file(config_path).unwrap_or_else(|e| {
            eprintln!("ERROR: Failed to parse config from {config_path}: {e}");
            std::process::exit(1);
        })
    } else {
        Config::load().unwrap_or_else(|e| {
            eprintln!("ERROR: Failed to load configuration: {e}");
            eprintln!("Set [database] url in config.toml or VERDICT_DATABASE__URL.");
            std::process::exit(1);
        })
    };

    if let Some(database) = cli.database {
        config.database.url = database;
    }
    if let Some(host) = cli.host {
        config.http.host = host;
    }
    if let Some(port) = cli.port {
        config.http.port = port;
    }

    init_tracing(&config);

    // Panics on worker threads must not vanish into the non-blocking
    // writer's buffer.
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map_or_else(
            || "unknown".to_string(),
            |l| format!("{}:{}:{}", l.file(), l.line(), l.column()),
        );
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        tracing::error!(location, payload, "PANIC - thread panicked");
        eprintln!("PANIC at {location}: {payload}");
    }));

    let pool = new_file_pool(&config.database.url, &config.connection_config()).map_err(|e| {
        eprintln!("ERROR: Failed to open database {}: {e}", config.database.url);
        e
    })?;

    {
        let conn = pool.get()?;
        migrations::run_migrations(&conn)?;
    }

    let manager = Arc::new(TenantManager::new(pool.clone()));
    let loaded = manager.load_all_tenants().map_err(|e| {
        eprintln!("ERROR: Failed to load tenants: {e}");
        e
    })?;
    tracing::info!(loaded, "engine manager ready");

    let state = Arc::new(AppState {
        manager,
        pool,
        sampler: Arc::new(LogSampler::new(config.logging.sample_rate)),
    });

    start_http_server(state, &config.http).await
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::{fmt, EnvFilter};

    let directive = level_directive(&config.logging.level).unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive));

    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = TRACE_GUARD.set(guard);

    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true)
        .init();
}
