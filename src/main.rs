//! pinrun - GPIO alias/group runner
//!
//! Console, REST API and AI front-ends over one activation scheduler.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use pinrun::api::{self, ApiState, DEFAULT_API_PORT};
use pinrun::cli::Console;
use pinrun::config::{ConfigManager, ConfigWatcher, FileConfigStore};
use pinrun::drivers::sysfs::DEFAULT_GPIO_ROOT;
use pinrun::drivers::{ConsoleDriver, OutputDriver, SysfsGpioDriver};
use pinrun::executor::CommandExecutor;
use pinrun::paths::AppPaths;
use pinrun::scheduler::ActivationScheduler;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DriverKind {
    /// Log output changes only
    Console,
    /// Linux sysfs GPIO
    Sysfs,
}

/// pinrun - trigger GPIO outputs by alias or group
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML, or JSON with a .json extension)
    #[arg(short, long, env = "PINRUN_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Also write daily-rotated log files to this directory
    #[arg(long, env = "PINRUN_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// API listen address
    #[arg(long, env = "PINRUN_HOST", default_value = "0.0.0.0")]
    host: String,

    /// API port
    #[arg(short, long, env = "PINRUN_PORT", default_value_t = DEFAULT_API_PORT)]
    port: u16,

    /// Output driver
    #[arg(long, value_enum, env = "PINRUN_DRIVER", default_value_t = DriverKind::Console)]
    driver: DriverKind,

    /// sysfs GPIO class directory
    #[arg(long, default_value = DEFAULT_GPIO_ROOT)]
    gpio_root: PathBuf,

    /// Line number of BCM 0 in sysfs (512 on recent Raspberry Pi kernels)
    #[arg(long, default_value_t = 0)]
    gpio_base: u32,

    /// Do not start the interactive console
    #[arg(long)]
    no_console: bool,

    /// Do not start the REST API
    #[arg(long)]
    no_api: bool,

    /// Do not watch the config file for changes
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let paths = AppPaths::detect(args.config.as_deref());

    let _log_guard = init_logging(&args.log_level, args.log_json, args.log_dir.as_deref())?;

    info!("Starting pinrun v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", paths.config.display());
    if args.log_dir.is_none() {
        info!("File logging off (default location: {})", paths.logs_dir.display());
    }

    let store = Arc::new(FileConfigStore::new(&paths.config));
    let initial = store
        .load_or_init()
        .await
        .with_context(|| format!("Failed to load {}", paths.config.display()))?;
    let range = initial.output_range;
    info!(
        "Configuration loaded: {} slots, {} aliases, {} groups",
        initial.gpio_pins.len(),
        initial.aliases.len(),
        initial.groups.len()
    );

    let manager = Arc::new(ConfigManager::new(initial, store));

    let driver: Arc<dyn OutputDriver> = match args.driver {
        DriverKind::Console => Arc::new(ConsoleDriver::new("console")),
        DriverKind::Sysfs => Arc::new(SysfsGpioDriver::new(&args.gpio_root, args.gpio_base)),
    };
    let scheduler = Arc::new(ActivationScheduler::new(driver, range));
    let executor = Arc::new(CommandExecutor::new(manager.shared(), Arc::clone(&scheduler)));

    let api_task = if args.no_api {
        None
    } else {
        let state = Arc::new(ApiState {
            executor: Arc::clone(&executor),
            manager: Arc::clone(&manager),
        });
        let host = args.host.clone();
        let port = args.port;
        Some(tokio::spawn(async move {
            if let Err(e) = api::start_server(state, &host, port).await {
                error!("API server failed: {:#}", e);
            }
        }))
    };

    let mut watcher = if args.no_watch {
        None
    } else {
        match ConfigWatcher::new(&paths.config) {
            Ok(w) => {
                info!("Hot reload enabled");
                Some(w)
            }
            Err(e) => {
                warn!("Config watcher unavailable, hot reload disabled: {:#}", e);
                None
            }
        }
    };

    // The console blocks on stdin; a plain thread is not joined at exit
    let console_rx = if args.no_console {
        None
    } else {
        let (tx, rx) = oneshot::channel();
        let console = Console::new(
            Arc::clone(&executor),
            Arc::clone(&manager),
            tokio::runtime::Handle::current(),
        );
        std::thread::Builder::new()
            .name("console".to_string())
            .spawn(move || {
                if let Err(e) = console.run() {
                    error!("Console failed: {:#}", e);
                }
                let _ = tx.send(());
            })
            .context("Failed to start console thread")?;
        Some(rx)
    };

    let console_done = async move {
        match console_rx {
            Some(rx) => {
                let _ = rx.await;
            }
            None => std::future::pending::<()>().await,
        }
    };
    let shutdown = shutdown_signal();
    tokio::pin!(console_done);
    tokio::pin!(shutdown);

    info!("Ready");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping");
                break;
            }

            _ = &mut console_done => {
                info!("Console closed, stopping");
                break;
            }

            Some(path) = next_change(&mut watcher) => {
                info!("📝 {} changed, reloading...", path.display());
                if let Ok(true) = manager.reload().await {
                    info!("✅ Configuration reloaded");
                }
            }
        }
    }

    // Cleanup
    info!("Shutting down...");
    if let Some(task) = api_task {
        task.abort();
    }
    if let Err(e) = scheduler.shutdown() {
        warn!("Driver release failed: {}", e);
    }
    info!("pinrun shutdown complete");

    Ok(())
}

async fn next_change(watcher: &mut Option<ConfigWatcher>) -> Option<PathBuf> {
    match watcher {
        Some(w) => w.next_change().await,
        None => std::future::pending().await,
    }
}

fn init_logging(level: &str, json: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stdout_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "pinrun.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(filter)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
