use crate::config::{Config, DEFAULT_LOG_FILE, DEFAULT_LOG_LEVEL};
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. Output goes to a file since the terminal
/// belongs to the UI; stderr is only a fallback when the file cannot be opened.
pub fn init(config: &Config) -> Option<WorkerGuard> {
    if !config.log_enabled {
        return None;
    }

    let level = match config.log_level.trim() {
        "" => DEFAULT_LOG_LEVEL,
        level => level,
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let file_name = match config.log_file.trim() {
        "" => DEFAULT_LOG_FILE,
        name => name,
    };
    let path = Path::new(file_name);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let _ = fs::create_dir_all(parent);
        }
    }
    let (writer, guard) = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => tracing_appender::non_blocking(file),
        Err(_) => tracing_appender::non_blocking(std::io::stderr()),
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_level(true)
        .with_target(true)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
    Some(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn disabled_logging_installs_nothing() {
        let config = Config::defaults(PathBuf::from("waterwatch.toml"));
        assert!(init(&config).is_none());
    }
}
