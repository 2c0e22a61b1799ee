//! Unified logging module for the gateway services
//!
//! Console output plus a daily rolling log file per service, written through
//! a non-blocking appender. `RUST_LOG` always wins over the configured level.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{
        self,
        format::{FmtSpan, Writer},
        FmtContext, FormatEvent, FormatFields,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809Z [INFO] Service started`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking writer flushing for the process lifetime
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

/// Log root directory: `PULSE_LOG_DIR` or `logs`
pub fn get_log_root() -> PathBuf {
    std::env::var("PULSE_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("logs"))
}

fn log_file_name(date: &str, service_name: &str) -> String {
    format!("{}_{}.log", date, service_name)
}

// Daily rolling file writer: {YYYYMMDD}_{service}.log
#[derive(Clone)]
struct DailyRollingWriter {
    service_name: String,
    log_dir: PathBuf,
    state: Arc<Mutex<(String, File)>>,
}

impl DailyRollingWriter {
    fn new(service_name: String, log_dir: PathBuf) -> std::io::Result<Self> {
        fs::create_dir_all(&log_dir)?;
        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let file = Self::open(&log_dir, &today, &service_name)?;

        Ok(Self {
            service_name,
            log_dir,
            state: Arc::new(Mutex::new((today, file))),
        })
    }

    fn open(log_dir: &Path, date: &str, service_name: &str) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(log_file_name(date, service_name)))
    }
}

impl Write for DailyRollingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let mut state = self.state.lock();
        let path = self.log_dir.join(log_file_name(&state.0, &self.service_name));

        // Date rolled over or file removed underneath us
        if state.0 != today || !path.exists() {
            fs::create_dir_all(&self.log_dir)?;
            let file = Self::open(&self.log_dir, &today, &self.service_name)?;
            *state = (today, file);
        }
        state.1.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.state.lock().1.flush()
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name (e.g., "iosrv")
    pub service_name: String,
    /// Base directory for logs
    pub log_dir: PathBuf,
    /// Console log level
    pub console_level: Level,
    /// File log level
    pub file_level: Level,
    /// Enable JSON format for the file layer
    pub enable_json: bool,
    /// Enable ANSI colors on the console
    pub enable_ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: get_log_root(),
            console_level: Level::INFO,
            file_level: Level::DEBUG,
            enable_json: false,
            enable_ansi: true,
        }
    }
}

/// Filter string used when `RUST_LOG` is absent
fn default_filter(config: &LogConfig) -> String {
    format!(
        "{},{}=debug",
        config.console_level.as_str().to_lowercase(),
        config.service_name
    )
}

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(&config.log_dir)?;

    let writer = DailyRollingWriter::new(config.service_name.clone(), config.log_dir.clone())?;
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);
    GUARDS.get_or_init(|| Mutex::new(Vec::new())).lock().push(guard);

    // Respect RUST_LOG when present
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(env_str) if !env_str.is_empty() => EnvFilter::try_new(env_str)?,
        _ => EnvFilter::try_new(default_filter(&config))?,
    };

    let console_layer = fmt::layer()
        .with_ansi(config.enable_ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_filter = tracing_subscriber::filter::LevelFilter::from_level(config.file_level);
    let file_layer = if config.enable_json {
        fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_level(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(file_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .event_format(BracketedLevelFormat)
            .with_filter(file_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);
    Ok(())
}

// ==================== Log Compression Support ====================

use tokio::time::{interval, Duration};

const COMPRESS_AFTER: Duration = Duration::from_secs(7 * 86400);
const DELETE_AFTER: Duration = Duration::from_secs(365 * 86400);

/// Start background log compression task.
///
/// Runs once a minute after start, then daily, until `token` is cancelled.
pub fn start_log_compression_task(
    log_dir: PathBuf,
    service_name: String,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(60)) => {}
            _ = token.cancelled() => return,
        }

        let mut interval = interval(Duration::from_secs(86400));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = compress_old_logs(&log_dir, &service_name).await {
                        tracing::error!("Log compression error for {}: {}", service_name, e);
                    }
                }
                _ = token.cancelled() => break,
            }
        }
    })
}

/// Compress log files older than 7 days, delete compressed logs older than 365 days
async fn compress_old_logs(
    log_dir: &Path,
    service_name: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use std::time::SystemTime;

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let suffix = format!("_{}.log", service_name);

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };

        let is_log = file_name.ends_with(&suffix);
        let is_archive = file_name.ends_with(&format!("{}.gz", suffix));
        if !is_log && !is_archive {
            continue;
        }

        let modified = tokio::fs::metadata(&path).await?.modified()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();

        if is_log && age > COMPRESS_AFTER {
            compress_file(&path).await?;
            tokio::fs::remove_file(&path).await?;
            tracing::debug!("Compressed: {}", file_name);
        } else if is_archive && age > DELETE_AFTER {
            tokio::fs::remove_file(&path).await?;
            tracing::debug!("Deleted: {}", file_name);
        }
    }

    Ok(())
}

/// Compress a single file to `<path>.gz`
async fn compress_file(path: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let buffer = tokio::fs::read(path).await?;
    let output_path = format!("{}.gz", path.display());

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let output = File::create(&output_path)?;
        let mut encoder = GzEncoder::new(output, Compression::best());
        encoder.write_all(&buffer)?;
        encoder.finish()?;
        Ok(())
    })
    .await??;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_format_level() {
        assert_eq!(format_level(&Level::WARN), "[WARN]");
        assert_eq!(format_level(&Level::ERROR), "[ERROR]");
    }

    #[test]
    fn test_default_filter_includes_service() {
        let config = LogConfig {
            service_name: "iosrv".into(),
            console_level: Level::WARN,
            ..Default::default()
        };
        assert_eq!(default_filter(&config), "warn,iosrv=debug");
    }

    #[test]
    fn test_rolling_writer_creates_dated_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            DailyRollingWriter::new("iosrv".into(), dir.path().to_path_buf()).unwrap();
        writer.write_all(b"hello\n").unwrap();
        writer.flush().unwrap();

        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let path = dir.path().join(log_file_name(&today, "iosrv"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello\n");
    }

    #[test]
    fn test_rolling_writer_recreates_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            DailyRollingWriter::new("iosrv".into(), dir.path().to_path_buf()).unwrap();
        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let path = dir.path().join(log_file_name(&today, "iosrv"));

        std::fs::remove_file(&path).unwrap();
        writer.write_all(b"again\n").unwrap();
        writer.flush().unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_compress_file_writes_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20240101_iosrv.log");
        std::fs::write(&path, b"old log line\n").unwrap();

        compress_file(&path).await.unwrap();

        let gz = dir.path().join("20240101_iosrv.log.gz");
        let bytes = std::fs::read(gz).unwrap();
        // gzip magic
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }
}
