use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::filters::{parse_date, parse_time_slots, FilterState, TempUnit};
use crate::query::ExportFormat;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const DEFAULT_CONFIG_FILE: &str = "waterwatch.toml";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ALLOW_HTTP: bool = true;
pub const DEFAULT_EXPORT_FORMAT: &str = "csv";
pub const DEFAULT_EXPORT_DIR: &str = "exports";
pub const DEFAULT_LOG_FILE: &str = "waterwatch.log";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_THEME: &str = "default";
pub const DEFAULT_DEBOUNCE_MS: u64 = 150;
pub const DEFAULT_SETTLE_MS: u64 = 50;
pub const DEFAULT_BLUR_GRACE_MS: u64 = 200;
pub const DEFAULT_MAP_ZOOM: u8 = 6;
pub const MAX_MAP_ZOOM: u8 = 18;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub timeout_secs: u64,
    pub insecure: bool,
    pub allow_http: bool,
    pub allow_insecure: bool,
    pub config_path: PathBuf,
    pub export_format: String,
    pub export_dir: String,
    pub log_enabled: bool,
    pub log_level: String,
    pub log_file: String,
    pub theme: String,
    pub debounce_ms: u64,
    pub settle_ms: u64,
    pub blur_grace_ms: u64,
    pub map_zoom: u8,
    pub continents: Vec<String>,
    pub countries: Vec<String>,
    pub water_sources: Vec<String>,
    pub temp_from: Option<f64>,
    pub temp_to: Option<f64>,
    pub temp_unit: String,
    pub date_from: String,
    pub date_to: String,
    pub times: String,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    api_base: Option<String>,
    timeout_secs: Option<u64>,
    insecure: Option<bool>,
    allow_http: Option<bool>,
    allow_insecure: Option<bool>,
    export_format: Option<String>,
    export_dir: Option<String>,
    log_enabled: Option<bool>,
    log_level: Option<String>,
    log_file: Option<String>,
    theme: Option<String>,
    debounce_ms: Option<u64>,
    settle_ms: Option<u64>,
    blur_grace_ms: Option<u64>,
    map_zoom: Option<u8>,
    filters: Option<FileFilters>,
}

/// `[filters]` table: the filter state the session starts with.
#[derive(Debug, Default, Deserialize)]
struct FileFilters {
    continents: Option<Vec<String>>,
    countries: Option<Vec<String>>,
    water_sources: Option<Vec<String>>,
    temp_from: Option<f64>,
    temp_to: Option<f64>,
    temp_unit: Option<String>,
    date_from: Option<String>,
    date_to: Option<String>,
    times: Option<String>,
}

impl Config {
    pub fn defaults(config_path: PathBuf) -> Self {
        Config {
            api_base: DEFAULT_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            insecure: false,
            allow_http: DEFAULT_ALLOW_HTTP,
            allow_insecure: false,
            config_path,
            export_format: DEFAULT_EXPORT_FORMAT.to_string(),
            export_dir: DEFAULT_EXPORT_DIR.to_string(),
            log_enabled: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_file: DEFAULT_LOG_FILE.to_string(),
            theme: DEFAULT_THEME.to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            settle_ms: DEFAULT_SETTLE_MS,
            blur_grace_ms: DEFAULT_BLUR_GRACE_MS,
            map_zoom: DEFAULT_MAP_ZOOM,
            continents: Vec::new(),
            countries: Vec::new(),
            water_sources: Vec::new(),
            temp_from: None,
            temp_to: None,
            temp_unit: "C".to_string(),
            date_from: String::new(),
            date_to: String::new(),
            times: String::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn blur_grace(&self) -> Duration {
        Duration::from_millis(self.blur_grace_ms)
    }

    pub fn format(&self) -> Result<ExportFormat> {
        ExportFormat::from_str(&self.export_format)
            .filter(|format| format.is_downloadable())
            .ok_or_else(|| anyhow!("Unknown export format: {}", self.export_format))
    }

    /// Filter state seeded from the command line and config file.
    pub fn initial_filters(&self) -> Result<FilterState> {
        let mut state = FilterState::default();
        state.continents = clean_list(&self.continents).collect();
        state.countries = clean_list(&self.countries).collect();
        state.water_sources = clean_list(&self.water_sources).collect();
        if self.temp_from.is_some() || self.temp_to.is_some() {
            state.temperature.enabled = true;
            state.temperature.from = self.temp_from;
            state.temperature.to = self.temp_to;
            state.temperature.unit = TempUnit::from_str(&self.temp_unit);
        }
        state.date_range.from = parse_seed_date(&self.date_from, "date_from")?;
        state.date_range.to = parse_seed_date(&self.date_to, "date_to")?;
        state.time_slots =
            parse_time_slots(&self.times).with_context(|| format!("Invalid times: {}", self.times))?;
        Ok(state)
    }
}

fn clean_list(values: &[String]) -> impl Iterator<Item = String> + '_ {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_seed_date(value: &str, name: &str) -> Result<Option<chrono::NaiveDate>> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    parse_date(value)
        .map(Some)
        .ok_or_else(|| anyhow!("Invalid {name} (expected YYYY-MM-DD): {value}"))
}

fn truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "yes" | "on")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

pub fn parse_args() -> Result<Config> {
    let args: Vec<String> = env::args().skip(1).collect();
    build_config(&args)
}

fn build_config(args: &[String]) -> Result<Config> {
    let mut explicit_config: Option<PathBuf> = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let value = iter
                .next()
                .ok_or_else(|| anyhow!("--config needs a value"))?;
            explicit_config = Some(PathBuf::from(value));
        }
    }

    let env_config = env::var("WATERWATCH_CONFIG").ok().map(PathBuf::from);
    let config_path = explicit_config
        .clone()
        .or(env_config)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut config = Config::defaults(config_path.clone());

    if config_path.exists() {
        if let Some(file_config) = load_file_config(&config_path)? {
            apply_file_config(&mut config, file_config);
        }
    } else if explicit_config.is_some() {
        return Err(anyhow!("Config file not found: {}", config_path.display()));
    }

    apply_env(&mut config);

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{flag} needs a value"))
        };
        match arg.as_str() {
            "--config" => {
                value("--config")?;
            }
            "--api" => config.api_base = value("--api")?,
            "--timeout" => {
                let secs: u64 = value("--timeout")?.parse()?;
                config.timeout_secs = secs.max(2);
            }
            "--insecure" => config.insecure = true,
            "--allow-http" => config.allow_http = true,
            "--allow-insecure" => config.allow_insecure = true,
            "--format" => config.export_format = value("--format")?,
            "--export-dir" => config.export_dir = value("--export-dir")?,
            "--log" => config.log_enabled = true,
            "--no-log" => config.log_enabled = false,
            "--log-level" => config.log_level = value("--log-level")?,
            "--log-file" => config.log_file = value("--log-file")?,
            "--theme" => config.theme = value("--theme")?,
            "--zoom" => {
                let zoom: u8 = value("--zoom")?.parse()?;
                config.map_zoom = zoom.min(MAX_MAP_ZOOM);
            }
            "--continent" => config.continents.extend(split_list(&value("--continent")?)),
            "--country" => config.countries.extend(split_list(&value("--country")?)),
            "--water-source" => config.water_sources.push(value("--water-source")?),
            "--temp-from" => config.temp_from = Some(value("--temp-from")?.parse()?),
            "--temp-to" => config.temp_to = Some(value("--temp-to")?.parse()?),
            "--temp-unit" => config.temp_unit = value("--temp-unit")?,
            "--date-from" => config.date_from = value("--date-from")?,
            "--date-to" => config.date_to = value("--date-to")?,
            "--times" => config.times = value("--times")?,
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                return Err(anyhow!("Unknown argument: {other}"));
            }
        }
    }

    validate_security(&config)?;
    config.format()?;
    Ok(config)
}

fn apply_env(config: &mut Config) {
    if let Ok(value) = env::var("WATERWATCH_API") {
        config.api_base = value;
    }
    if let Ok(value) = env::var("WATERWATCH_TIMEOUT") {
        if let Ok(secs) = value.parse::<u64>() {
            config.timeout_secs = secs.max(2);
        }
    }
    if let Ok(value) = env::var("WATERWATCH_INSECURE") {
        config.insecure = truthy(&value);
    }
    if let Ok(value) = env::var("WATERWATCH_ALLOW_HTTP") {
        config.allow_http = truthy(&value);
    }
    if let Ok(value) = env::var("WATERWATCH_ALLOW_INSECURE") {
        config.allow_insecure = truthy(&value);
    }
    if let Ok(value) = env::var("WATERWATCH_FORMAT") {
        config.export_format = value;
    }
    if let Ok(value) = env::var("WATERWATCH_EXPORT_DIR") {
        config.export_dir = value;
    }
    if let Ok(value) = env::var("WATERWATCH_LOG_ENABLED") {
        config.log_enabled = truthy(&value);
    }
    if let Ok(value) = env::var("WATERWATCH_LOG_LEVEL") {
        config.log_level = value;
    }
    if let Ok(value) = env::var("WATERWATCH_LOG_FILE") {
        config.log_file = value;
    }
    if let Ok(value) = env::var("WATERWATCH_THEME") {
        config.theme = value;
    }
    if let Ok(value) = env::var("WATERWATCH_CONTINENTS") {
        config.continents = split_list(&value);
    }
    if let Ok(value) = env::var("WATERWATCH_COUNTRIES") {
        config.countries = split_list(&value);
    }
}

fn load_file_config(path: &Path) -> Result<Option<FileConfig>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let cfg: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    Ok(Some(cfg))
}

fn apply_file_config(target: &mut Config, file: FileConfig) {
    if let Some(api_base) = file.api_base {
        target.api_base = api_base;
    }
    if let Some(timeout_secs) = file.timeout_secs {
        target.timeout_secs = timeout_secs.max(2);
    }
    if let Some(insecure) = file.insecure {
        target.insecure = insecure;
    }
    if let Some(allow_http) = file.allow_http {
        target.allow_http = allow_http;
    }
    if let Some(allow_insecure) = file.allow_insecure {
        target.allow_insecure = allow_insecure;
    }
    if let Some(export_format) = file.export_format {
        target.export_format = export_format;
    }
    if let Some(export_dir) = file.export_dir {
        target.export_dir = export_dir;
    }
    if let Some(log_enabled) = file.log_enabled {
        target.log_enabled = log_enabled;
    }
    if let Some(log_level) = file.log_level {
        target.log_level = log_level;
    }
    if let Some(log_file) = file.log_file {
        target.log_file = log_file;
    }
    if let Some(theme) = file.theme {
        target.theme = theme;
    }
    if let Some(debounce_ms) = file.debounce_ms {
        target.debounce_ms = debounce_ms.max(20);
    }
    if let Some(settle_ms) = file.settle_ms {
        target.settle_ms = settle_ms.max(10);
    }
    if let Some(blur_grace_ms) = file.blur_grace_ms {
        target.blur_grace_ms = blur_grace_ms.max(50);
    }
    if let Some(map_zoom) = file.map_zoom {
        target.map_zoom = map_zoom.min(MAX_MAP_ZOOM);
    }
    if let Some(filters) = file.filters {
        if let Some(continents) = filters.continents {
            target.continents = continents;
        }
        if let Some(countries) = filters.countries {
            target.countries = countries;
        }
        if let Some(water_sources) = filters.water_sources {
            target.water_sources = water_sources;
        }
        if filters.temp_from.is_some() {
            target.temp_from = filters.temp_from;
        }
        if filters.temp_to.is_some() {
            target.temp_to = filters.temp_to;
        }
        if let Some(temp_unit) = filters.temp_unit {
            target.temp_unit = temp_unit;
        }
        if let Some(date_from) = filters.date_from {
            target.date_from = date_from;
        }
        if let Some(date_to) = filters.date_to {
            target.date_to = date_to;
        }
        if let Some(times) = filters.times {
            target.times = times;
        }
    }
}

fn print_help() {
    println!("waterwatch-tui");
    println!("Usage: waterwatch-tui [--api URL] [--timeout SECONDS] [--config PATH]");
    println!("       [--insecure] [--allow-http] [--allow-insecure]");
    println!("       [--format csv|xml|json|geojson] [--export-dir PATH]");
    println!("       [--log] [--no-log] [--log-level LEVEL] [--log-file PATH]");
    println!("       [--theme default|ocean|mono] [--zoom LEVEL]");
    println!("       [--continent NAME[,NAME]] [--country NAME[,NAME]] [--water-source NAME]");
    println!("       [--temp-from N] [--temp-to N] [--temp-unit C|F]");
    println!("       [--date-from YYYY-MM-DD] [--date-to YYYY-MM-DD]");
    println!("       [--times \"08:00-10:00;14:00-\"]");
    println!("Environment: WATERWATCH_API overrides the API base URL");
    println!("Environment: WATERWATCH_CONFIG overrides config path");
    println!("Environment: WATERWATCH_TIMEOUT sets the request timeout in seconds");
    println!("Environment: WATERWATCH_INSECURE=1 enables invalid TLS certs");
    println!("Environment: WATERWATCH_ALLOW_HTTP=1 allows http:// URLs");
    println!("Environment: WATERWATCH_ALLOW_INSECURE=1 allows --insecure");
    println!("Environment: WATERWATCH_FORMAT/EXPORT_DIR configure downloads");
    println!("Environment: WATERWATCH_LOG_ENABLED/LEVEL/FILE configure logging");
    println!("Environment: WATERWATCH_CONTINENTS/COUNTRIES seed the location filter");
    println!("Keys: q quit | tab next panel | space toggle | a toggle all | enter search");
    println!("      x export | f cycle format | m map bins | / presets | r reset | ? help");
}

fn validate_security(config: &Config) -> Result<()> {
    let url = config.api_base.trim();
    if url.to_ascii_lowercase().starts_with("http://") && !config.allow_http {
        return Err(anyhow!(
            "Refusing insecure http URL (set allow_http=true or WATERWATCH_ALLOW_HTTP=1 to override)"
        ));
    }
    if config.insecure && !config.allow_insecure {
        return Err(anyhow!(
            "Refusing --insecure without explicit allow_insecure=true or WATERWATCH_ALLOW_INSECURE=1"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterField;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        dir.push(format!("waterwatch-config-test-{suffix}"));
        let _ = fs::create_dir_all(&dir);
        dir.push(name);
        dir
    }

    fn base_config() -> Config {
        Config::defaults(PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn default_allows_http_url() {
        let cfg = base_config();
        assert!(validate_security(&cfg).is_ok());
    }

    #[test]
    fn http_url_rejected_when_disabled() {
        let mut cfg = base_config();
        cfg.allow_http = false;
        let err = validate_security(&cfg).unwrap_err();
        assert!(err.to_string().contains("Refusing insecure http URL"));
    }

    #[test]
    fn insecure_needs_explicit_allow() {
        let mut cfg = base_config();
        cfg.insecure = true;
        assert!(validate_security(&cfg).is_err());
        cfg.allow_insecure = true;
        assert!(validate_security(&cfg).is_ok());
    }

    #[test]
    fn load_file_config_parses_values() {
        let path = temp_file("config.toml");
        let content = r#"
api_base = "https://water.example"
timeout_secs = 4
export_format = "geojson"
export_dir = "downloads"
log_enabled = true
log_level = "debug"
log_file = "waterwatch.log"
debounce_ms = 300
map_zoom = 9

[filters]
continents = ["Europe"]
water_sources = ["Well", "Network"]
temp_from = 4.5
date_from = "2025-01-01"
times = "08:00-10:00;14:00-"
"#;
        fs::write(&path, content).unwrap();
        let cfg = load_file_config(&path).unwrap().unwrap();
        assert_eq!(cfg.api_base.as_deref(), Some("https://water.example"));
        assert_eq!(cfg.timeout_secs, Some(4));
        assert_eq!(cfg.export_format.as_deref(), Some("geojson"));
        assert_eq!(cfg.log_enabled, Some(true));
        assert_eq!(cfg.map_zoom, Some(9));
        let filters = cfg.filters.unwrap();
        assert_eq!(filters.continents, Some(vec!["Europe".to_string()]));
        assert_eq!(filters.temp_from, Some(4.5));
        assert_eq!(filters.times.as_deref(), Some("08:00-10:00;14:00-"));
        let _ = fs::remove_file(&path);
        let _ = fs::remove_dir(path.parent().unwrap());
    }

    #[test]
    fn apply_file_config_overrides_and_clamps() {
        let mut cfg = base_config();
        let file = FileConfig {
            timeout_secs: Some(0),
            debounce_ms: Some(1),
            settle_ms: Some(0),
            blur_grace_ms: Some(5),
            map_zoom: Some(40),
            log_level: Some("trace".to_string()),
            export_dir: Some("out".to_string()),
            filters: Some(FileFilters {
                countries: Some(vec!["Spain".to_string()]),
                temp_unit: Some("F".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        apply_file_config(&mut cfg, file);
        assert_eq!(cfg.timeout_secs, 2);
        assert_eq!(cfg.debounce_ms, 20);
        assert_eq!(cfg.settle_ms, 10);
        assert_eq!(cfg.blur_grace_ms, 50);
        assert_eq!(cfg.map_zoom, MAX_MAP_ZOOM);
        assert_eq!(cfg.log_level, "trace");
        assert_eq!(cfg.export_dir, "out");
        assert_eq!(cfg.countries, vec!["Spain"]);
        assert_eq!(cfg.temp_unit, "F");
    }

    #[test]
    fn cli_flags_seed_filters() {
        let path = temp_file("empty.toml");
        fs::write(&path, "").unwrap();
        let cfg = build_config(&args(&[
            "--config",
            path.to_str().unwrap(),
            "--api",
            "https://water.example",
            "--continent",
            "Europe,Asia",
            "--water-source",
            "Rooftop Tank",
            "--temp-from",
            "5",
            "--temp-to",
            "20",
            "--date-from",
            "2025-01-01",
            "--times",
            "-08:00;13:00-",
            "--format",
            "xml",
        ]))
        .unwrap();
        assert_eq!(cfg.api_base, "https://water.example");
        assert_eq!(cfg.format().unwrap(), ExportFormat::Xml);

        let state = cfg.initial_filters().unwrap();
        assert!(state.continents.contains("Asia"));
        assert!(state.water_sources.contains("Rooftop Tank"));
        assert!(state.temperature.enabled);
        assert_eq!(state.temperature.to, Some(20.0));
        assert_eq!(state.date_range.from, parse_date("2025-01-01"));
        assert_eq!(state.time_slots.len(), 2);
        let _ = fs::remove_file(&path);
        let _ = fs::remove_dir(path.parent().unwrap());
    }

    #[test]
    fn unknown_flag_and_missing_value_are_errors() {
        let path = temp_file("flags.toml");
        fs::write(&path, "").unwrap();
        let config = path.to_str().unwrap();
        assert!(build_config(&args(&["--config", config, "--bogus"])).is_err());
        assert!(build_config(&args(&["--config", config, "--api"])).is_err());
        assert!(build_config(&args(&["--config", config, "--format", "map-format"])).is_err());
        let _ = fs::remove_file(&path);
        let _ = fs::remove_dir(path.parent().unwrap());
    }

    #[test]
    fn bad_seed_values_are_reported() {
        let mut cfg = base_config();
        cfg.date_to = "31/12/2025".to_string();
        assert!(cfg.initial_filters().is_err());

        let mut cfg = base_config();
        cfg.times = "00:00-01:00;02:00-03:00;04:00-05:00;06:00-07:00".to_string();
        let err = cfg.initial_filters().unwrap_err();
        let cause = err.downcast_ref::<crate::error::ValidationError>().unwrap();
        assert_eq!(cause.field, FilterField::TimeSlots);
    }
}
