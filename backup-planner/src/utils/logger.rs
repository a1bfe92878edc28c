//! Logging configuration using tracing.
//!
//! Console output is installed at startup. Once a run knows its snapshot
//! directory, a second plain-text layer writing `log.txt` inside it is
//! attached through [`LogHandle::attach`].

use std::path::Path;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// File name of the per-snapshot log
pub const LOG_FILENAME: &str = "log.txt";

type FileLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Controls the snapshot log file of an installed subscriber
pub struct LogHandle {
    file_layer: reload::Handle<Option<FileLayer>, Registry>,
    guard: Mutex<Option<WorkerGuard>>,
}

impl LogHandle {
    /// Start writing (appending) every log line to `dir/log.txt`
    pub fn attach(&self, dir: &Path) -> anyhow::Result<()> {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(LOG_FILENAME)
            .build(dir)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer: FileLayer = fmt::layer::<Registry>()
            .with_ansi(false)
            .with_target(false)
            .with_writer(writer)
            .boxed();
        self.file_layer.reload(Some(layer))?;

        if let Ok(mut slot) = self.guard.lock() {
            // Replacing the old guard flushes the previous file
            *slot = Some(guard);
        }
        Ok(())
    }

    /// Stop writing to the snapshot log and flush it
    pub fn detach(&self) {
        // The subscriber may already be gone; the guard still has to be flushed
        let _ = self.file_layer.reload(None);
        if let Ok(mut slot) = self.guard.lock() {
            slot.take();
        }
    }
}

/// Initialize logging with the specified level.
///
/// `RUST_LOG` wins over `level` when it is set.
pub fn init(level: &str) -> anyhow::Result<LogHandle> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (subscriber, handle) = build(filter);
    subscriber.try_init()?;

    Ok(handle)
}

fn build(filter: EnvFilter) -> (impl Subscriber + Send + Sync + 'static, LogHandle) {
    let (file_layer, reload_handle) = reload::Layer::new(None::<FileLayer>);

    let subscriber = tracing_subscriber::registry()
        .with(file_layer)
        .with(filter)
        .with(fmt::layer().with_target(false));

    let handle = LogHandle {
        file_layer: reload_handle,
        guard: Mutex::new(None),
    };
    (subscriber, handle)
}
