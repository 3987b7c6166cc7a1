use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

mod config;
mod daemon;
mod idea_client;
mod pidlock;
mod state;

use config::MarcusConfig;
use daemon::MarcusDaemon;
use pidlock::PidLock;

/// Marcus — autonomous quantitative research daemon.
#[derive(Parser, Debug)]
#[command(name = "marcus-daemon", version, about)]
struct Cli {
    /// Execute exactly one research cycle, then exit.
    #[arg(long)]
    once: bool,

    /// Trigger one dashboard refresh and exit (no research).
    #[arg(long)]
    dashboard_only: bool,

    /// Load configuration from a JSON file instead of compiled defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match MarcusConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("fatal: {err:#}");
            return ExitCode::from(1);
        }
    };

    init_tracing(&config);

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    let pid_path = std::path::Path::new(&config.logs_dir).join("marcus.pid");
    let _pid_lock = match PidLock::acquire(pid_path) {
        Ok(lock) => lock,
        Err(err) => {
            tracing::error!(error = %err, "startup aborted");
            return ExitCode::from(1);
        }
    };

    let mut daemon = match MarcusDaemon::new(config).await {
        Ok(daemon) => daemon,
        Err(err) => {
            tracing::error!(error = ?err, "startup failed");
            return ExitCode::from(1);
        }
    };

    if cli.dashboard_only {
        return match daemon.dashboard_refresh() {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                tracing::error!(error = %err, "dashboard refresh failed");
                ExitCode::from(1)
            }
        };
    }

    if cli.once {
        tracing::info!("single-cycle mode");
        return match daemon.run_once().await {
            Ok(summary) => {
                tracing::info!(
                    cycle_num = summary.cycle_num,
                    backtests = summary.backtests_run,
                    deployed = summary.stage5_passed,
                    "cycle finished"
                );
                ExitCode::SUCCESS
            }
            Err(err) => {
                tracing::error!(error = ?err, "cycle failed");
                ExitCode::from(2)
            }
        };
    }

    tracing::info!("MARCUS DAEMON STARTING");
    match daemon.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "daemon exited with error");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(config: &MarcusConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
