use anyhow::{Context, Result};
use chrono::Local;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use tracing::{Level, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Tracing target every activity line is emitted under.
pub const ACTIVITY_TARGET: &str = "activity";

const MAX_RETAINED_LINES: usize = 500;

/// Operator log. Each line goes out as a tracing event under
/// [`ACTIVITY_TARGET`] and is kept in a bounded `[HH:MM:SS] message` tail for
/// the display.
pub struct ActivityLog {
    recent: Mutex<VecDeque<String>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            recent: Mutex::new(VecDeque::new()),
        }
    }

    pub fn append(&self, message: &str) {
        tracing::info!(target: ACTIVITY_TARGET, "{}", message);

        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), message);
        let Ok(mut recent) = self.recent.lock() else {
            tracing::warn!("Activity log lock poisoned, dropping line");
            return;
        };
        if recent.len() == MAX_RETAINED_LINES {
            recent.pop_front();
        }
        recent.push_back(line);
    }

    /// Newest lines last.
    pub fn recent(&self, limit: usize) -> Vec<String> {
        let Ok(recent) = self.recent.lock() else {
            return Vec::new();
        };
        let skip = recent.len().saturating_sub(limit);
        recent.iter().skip(skip).cloned().collect()
    }

    #[cfg(test)]
    pub fn lines(&self) -> Vec<String> {
        self.recent(MAX_RETAINED_LINES)
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

/// File sink for activity lines: appends `[HH:MM:SS] message` to `path`,
/// ignoring every event outside [`ACTIVITY_TARGET`].
pub fn file_layer<S>(path: &Path) -> Result<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("Activity log path has no file name: {}", path.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
        .with_context(|| format!("Failed to open activity log: {}", path.display()))?;

    Ok(tracing_subscriber::fmt::layer()
        .with_writer(appender)
        .with_ansi(false)
        .with_level(false)
        .with_target(false)
        .with_timer(ChronoLocal::new("[%H:%M:%S]".to_string()))
        .with_filter(Targets::new().with_target(ACTIVITY_TARGET, Level::INFO)))
}
