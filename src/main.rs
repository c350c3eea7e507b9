//! Delay Daemon - adds (varying) latency to Linux input devices
//!
//! Run as superuser: grabbing `/dev/input/eventX` and creating a uinput
//! device both need root or membership in the `input` group.

use anyhow::{Context, Result};
use clap::Parser;
use delay_daemon::{
    config::{Config, DelayRange},
    delay::Distribution,
    VERSION,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "delaydaemon")]
#[command(version = VERSION)]
#[command(about = "Adds (varying) latency to input devices", long_about = None)]
struct Cli {
    /// Input device, e.g. /dev/input/event3
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Minimum delay for keys/clicks (ms)
    #[arg(long, value_name = "NUM")]
    min_key_delay: Option<u32>,

    /// Maximum delay for keys/clicks (ms)
    #[arg(long, value_name = "NUM")]
    max_key_delay: Option<u32>,

    /// Minimum delay for mouse movement (ms)
    #[arg(long, value_name = "NUM")]
    min_move_delay: Option<u32>,

    /// Maximum delay for mouse movement (ms)
    #[arg(long, value_name = "NUM")]
    max_move_delay: Option<u32>,

    /// Delay distribution: linear (default) or normal
    #[arg(short, long, value_name = "STRING")]
    distribution: Option<Distribution>,

    /// Target mean for the normal distribution (ms)
    #[arg(short, long, value_name = "NUM")]
    mean: Option<f64>,

    /// Target standard deviation for the normal distribution (ms)
    #[arg(short, long, value_name = "NUM")]
    std: Option<f64>,

    /// Named pipe for changing delays at runtime
    #[arg(short, long, value_name = "FILE")]
    fifo: Option<PathBuf>,

    /// Event log written at shutdown
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Write a JSON session summary at shutdown
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Additional event type to drop (e.g. 4 for EV_MSC); repeatable
    #[arg(long = "drop-type", value_name = "NUM")]
    drop_types: Vec<u16>,

    /// TOML config file (default: platform config directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Turn on debug output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Load the config file and apply command line overrides
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => Config::load().context("Failed to load config")?,
        };

        if let Some(input) = self.input {
            config.input.device = Some(input);
        }
        override_range(&mut config.key, self.min_key_delay, self.max_key_delay);
        override_range(&mut config.movement, self.min_move_delay, self.max_move_delay);
        if let Some(mode) = self.distribution {
            config.distribution.mode = mode;
        }
        if self.mean.is_some() {
            config.distribution.mean = self.mean;
        }
        if self.std.is_some() {
            config.distribution.std = self.std;
        }
        if self.fifo.is_some() {
            config.reconfig.fifo = self.fifo;
        }
        if let Some(log_file) = self.log_file {
            config.audit.log_file = log_file;
        }
        if self.summary.is_some() {
            config.audit.summary = self.summary;
        }
        config.filter.drop_types.extend(self.drop_types);

        Ok(config.validated()?)
    }
}

fn override_range(range: &mut DelayRange, min: Option<u32>, max: Option<u32>) {
    if let Some(min) = min {
        range.min_ms = min;
    }
    if let Some(max) = max {
        range.max_ms = max;
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = cli.into_config()?;

    #[cfg(target_os = "linux")]
    return linux::run(config);

    #[cfg(not(target_os = "linux"))]
    {
        let _ = config;
        anyhow::bail!("Delay Daemon needs Linux evdev and uinput support");
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use anyhow::{Context, Result};
    use chrono::Utc;
    use delay_daemon::{
        audit::{AuditLogBuffer, AuditLogFile},
        config::Config,
        delay::ConfigurationStore,
        device::evdev_device,
        engine::{CaptureLoop, Dispatcher, ReconfigChannel, ReconfigListener},
        report::SessionReport,
        shutdown::Shutdown,
    };
    use std::sync::Arc;
    use std::thread;

    pub fn run(config: Config) -> Result<()> {
        let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
        runtime.block_on(serve(config))
    }

    async fn serve(config: Config) -> Result<()> {
        let device_path = config
            .input
            .device
            .clone()
            .context("No input device specified")?;

        log::info!(
            "Key delay: {} - {} ms, move delay: {} - {} ms ({})",
            config.key.min_ms,
            config.key.max_ms,
            config.movement.min_ms,
            config.movement.max_ms,
            config.distribution.mode
        );
        if let (Some(mean), Some(std)) = (config.distribution.mean, config.distribution.std) {
            log::info!("Normal distribution: mean {}, std {}", mean, std);
        }

        // Let the key that started us be released before grabbing
        tokio::time::sleep(config.settle_delay()).await;

        let (source, sink) = evdev_device::open(&device_path)?;

        let store = Arc::new(ConfigurationStore::new(
            config.key_parameters(),
            config.movement_parameters(),
        ));
        let audit = Arc::new(AuditLogBuffer::new());
        let shutdown = Shutdown::new();
        let started_at = Utc::now();

        let listener = match &config.reconfig.fifo {
            Some(path) => {
                let channel = ReconfigChannel::create(path)?;
                let listener = ReconfigListener::new(Arc::clone(&store));
                Some(tokio::spawn(listener.run(channel, shutdown.subscribe())))
            }
            None => None,
        };

        {
            let shutdown = shutdown.clone();
            ctrlc::set_handler(move || shutdown.trigger())
                .context("Failed to install Ctrl-C handler")?;
        }

        let dispatcher = Dispatcher::new(
            tokio::runtime::Handle::current(),
            Arc::clone(&store),
            Arc::new(sink),
            Arc::clone(&audit),
        );
        let capture = CaptureLoop::new(source, config.event_filter(), dispatcher);
        {
            let shutdown = shutdown.clone();
            // Not joined: at shutdown it may still be blocked on a read
            thread::Builder::new()
                .name("capture".to_string())
                .spawn(move || {
                    capture.run();
                    shutdown.trigger();
                })
                .context("Failed to start capture thread")?;
        }

        shutdown.wait().await;
        log::info!("Shutting down");

        if let Some(listener) = listener {
            // Dropping the channel removes the FIFO
            match listener.await {
                Ok(stats) => log::debug!(
                    "Reconfiguration: {} applied, {} rejected",
                    stats.applied,
                    stats.rejected
                ),
                Err(e) => log::warn!("Reconfiguration listener failed: {}", e),
            }
        }

        let report = SessionReport::new(started_at, &audit.snapshot());
        report.log_summary();
        if let Some(path) = &config.audit.summary {
            if let Err(e) = report.export_json(path) {
                log::error!("Failed to write summary {}: {}", path.display(), e);
            }
        }

        let log_file = AuditLogFile::new(&config.audit.log_file);
        let written = audit
            .flush_and_clear(&log_file)
            .with_context(|| format!("Failed to write event log {}", log_file.path().display()))?;
        log::info!("Wrote {} events to {}", written, log_file.path().display());

        Ok(())
    }
}
