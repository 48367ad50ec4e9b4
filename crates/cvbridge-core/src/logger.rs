//! Stderr logging for cvbridge binaries and tests.
//!
//! Records from `cvbridge*` targets pass at the configured level; records
//! from any other crate (image decoders, OpenCV bindings) are capped at
//! `warn`. Lines look like
//! `[  0.012s DEBUG cvbridge] detect_markers took 4.1 ms`.

use std::io::Write as _;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

/// Environment variable read by [`init_from_env`].
pub const LOG_ENV: &str = "CVBRIDGE_LOG";

const FOREIGN_CAP: LevelFilter = LevelFilter::Warn;

struct BridgeLogger {
    own: LevelFilter,
    epoch: Instant,
}

impl BridgeLogger {
    fn limit_for(&self, target: &str) -> LevelFilter {
        if target.starts_with("cvbridge") {
            self.own
        } else {
            self.own.min(FOREIGN_CAP)
        }
    }
}

impl Log for BridgeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.limit_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let crate_name = record
            .target()
            .split("::")
            .next()
            .unwrap_or_default();
        let line = format!(
            "[{:7.3}s {:>5} {crate_name}] {}\n",
            self.epoch.elapsed().as_secs_f64(),
            record.level(),
            record.args()
        );
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<BridgeLogger> = OnceLock::new();

/// Install the stderr logger. Only the first call has an effect.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| BridgeLogger {
        own: level,
        epoch: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    log::debug!("stderr logger installed at {level}");
    Ok(())
}

/// Install the stderr logger at the level named by `CVBRIDGE_LOG`
/// (`off`, `error`, `warn`, `info`, `debug`, `trace`), or `default` when the
/// variable is unset or unparsable.
pub fn init_from_env(default: LevelFilter) -> Result<(), log::SetLoggerError> {
    init_with_level(level_from(std::env::var(LOG_ENV).ok().as_deref(), default))
}

fn level_from(value: Option<&str>, default: LevelFilter) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse::<LevelFilter>().ok())
        .unwrap_or(default)
}

/// Route `tracing` spans and events to stderr, filtered by `RUST_LOG`
/// (default `cvbridge=info`). Span close events carry each operation's
/// duration. `log` records are bridged through `tracing-subscriber`.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cvbridge=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let installed = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(tracing_subscriber::fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
    if installed.is_err() {
        log::warn!("a global tracing subscriber is already installed");
    }
}
