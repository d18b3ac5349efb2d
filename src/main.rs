mod app;
mod config;
mod error;
mod export;
mod filters;
mod hex;
mod locations;
mod logging;
mod model;
mod net;
mod presets;
mod query;
mod runtime;
mod schedule;
mod search;
mod session;
mod ui;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::mpsc;

use app::{App, AppOptions, ThemeMode};
use config::{parse_args, MAX_MAP_ZOOM};
use logging::init as init_logging;
use net::{spawn_api_worker, ApiSettings};
use runtime::{init_terminal, restore_terminal, run_app, ApiChannels};
use tracing::{debug, info, warn};

fn main() -> Result<()> {
    let config = parse_args()?;
    let _log_guard = init_logging(&config);
    info!("waterwatch starting");
    debug!("config path: {}", config.config_path.display());

    let filters = config.initial_filters()?;
    let format = config.format()?;

    let settings = ApiSettings {
        base_url: config.api_base.clone(),
        timeout: config.timeout(),
        insecure: config.insecure,
    };
    let (reply_tx, reply_rx) = mpsc::channel();
    let (directory_tx, directory_rx) = mpsc::channel();
    let (measurement_tx, measurement_rx) = mpsc::channel();
    spawn_api_worker("directory", settings.clone(), reply_tx.clone(), directory_rx);
    spawn_api_worker("measurements", settings, reply_tx, measurement_rx);

    let app = App::new(AppOptions {
        filters,
        format,
        export_dir: PathBuf::from(&config.export_dir),
        theme_mode: ThemeMode::from_str(&config.theme),
        map_zoom: config.map_zoom,
        max_zoom: MAX_MAP_ZOOM,
        debounce: config.debounce(),
        settle: config.settle(),
        blur_grace: config.blur_grace(),
    });

    let mut terminal = init_terminal()?;
    let res = run_app(
        &mut terminal,
        app,
        ApiChannels {
            directory_tx,
            measurement_tx,
            rx: reply_rx,
        },
    );
    restore_terminal(&mut terminal)?;

    if let Err(err) = res {
        warn!("runtime error: {err}");
        eprintln!("{err}");
    }

    info!("waterwatch exited");
    Ok(())
}
