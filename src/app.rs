use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};

use crate::error::SearchError;
use crate::export;
use crate::filters::{
    format_date, format_time_slots, parse_date, parse_time_slots, toggle_all, FilterState,
    MAX_TIME_SLOTS, WATER_SOURCES,
};
use crate::hex::{bin_points, format_summary, HexBin};
use crate::locations::{LoadState, LocationCascade};
use crate::net::{ApiReply, ApiRequest};
use crate::presets::{PresetEvent, PresetKey, PresetSearch};
use crate::query::ExportFormat;
use crate::search::{MeasurementReply, MeasurementRequest, SearchOutcome, SearchSession};
use crate::session::SessionGate;

pub const STATUS_TTL: Duration = Duration::from_secs(6);
const MIN_ZOOM: u8 = 1;
const PANEL_COUNT: usize = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Edit(EditField),
    Presets,
    Help,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditField {
    TempFrom,
    TempTo,
    DateFrom,
    DateTo,
    TimeSlots,
}

impl EditField {
    pub fn label(self) -> &'static str {
        match self {
            EditField::TempFrom => "Temperature from",
            EditField::TempTo => "Temperature to",
            EditField::DateFrom => "Date from (YYYY-MM-DD)",
            EditField::DateTo => "Date to (YYYY-MM-DD)",
            EditField::TimeSlots => "Time slots (HH:MM-HH:MM; ...)",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Panel {
    Continents,
    Countries,
    WaterSources,
    Temperature,
    Dates,
    TimeSlots,
    Results,
}

impl Panel {
    pub const ALL: [Panel; PANEL_COUNT] = [
        Panel::Continents,
        Panel::Countries,
        Panel::WaterSources,
        Panel::Temperature,
        Panel::Dates,
        Panel::TimeSlots,
        Panel::Results,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Panel::Continents => "Continents",
            Panel::Countries => "Countries",
            Panel::WaterSources => "Water sources",
            Panel::Temperature => "Temperature",
            Panel::Dates => "Dates",
            Panel::TimeSlots => "Time slots",
            Panel::Results => "Results",
        }
    }

    fn index(self) -> usize {
        Panel::ALL.iter().position(|p| *p == self).unwrap_or(0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThemeMode {
    Default,
    Ocean,
    Monochrome,
}

impl ThemeMode {
    pub fn toggle(self) -> Self {
        match self {
            ThemeMode::Default => ThemeMode::Ocean,
            ThemeMode::Ocean => ThemeMode::Monochrome,
            ThemeMode::Monochrome => ThemeMode::Default,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ThemeMode::Default => "DEFAULT",
            ThemeMode::Ocean => "OCEAN",
            ThemeMode::Monochrome => "MONO",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "ocean" => ThemeMode::Ocean,
            "mono" | "monochrome" => ThemeMode::Monochrome,
            _ => ThemeMode::Default,
        }
    }
}

pub struct AppOptions {
    pub filters: FilterState,
    pub format: ExportFormat,
    pub export_dir: PathBuf,
    pub theme_mode: ThemeMode,
    pub map_zoom: u8,
    pub max_zoom: u8,
    pub debounce: Duration,
    pub settle: Duration,
    pub blur_grace: Duration,
}

pub struct App {
    pub(crate) filters: FilterState,
    pub(crate) cascade: LocationCascade,
    pub(crate) presets: PresetSearch,
    pub(crate) search: SearchSession,
    pub(crate) session: SessionGate,
    pub(crate) bins: Vec<HexBin>,
    pub(crate) map_zoom: u8,
    max_zoom: u8,
    pub(crate) export_dir: PathBuf,
    pub(crate) theme_mode: ThemeMode,
    pub(crate) input_mode: InputMode,
    pub(crate) panel: Panel,
    cursors: [usize; PANEL_COUNT],
    pub(crate) edit_buffer: String,
    pub(crate) status: Option<(String, SystemTime)>,
    pub(crate) last_export: Option<(PathBuf, SystemTime)>,
    outbox: Vec<ApiRequest>,
}

impl App {
    pub fn new(options: AppOptions) -> Self {
        Self {
            filters: options.filters,
            cascade: LocationCascade::new().with_delays(options.debounce, options.settle),
            presets: PresetSearch::new(options.blur_grace),
            search: SearchSession::new(options.format),
            session: SessionGate::default(),
            bins: Vec::new(),
            map_zoom: options.map_zoom.clamp(MIN_ZOOM, options.max_zoom),
            max_zoom: options.max_zoom,
            export_dir: options.export_dir,
            theme_mode: options.theme_mode,
            input_mode: InputMode::Normal,
            panel: Panel::Continents,
            cursors: [0; PANEL_COUNT],
            edit_buffer: String::new(),
            status: None,
            last_export: None,
            outbox: Vec::new(),
        }
    }

    /// Queues the first loads: who the user is, and the location directory.
    pub fn start(&mut self, now: Instant) {
        if self.session.request() {
            self.outbox.push(ApiRequest::Session);
        }
        if let Some(request) = self.cascade.load(now) {
            self.outbox.push(ApiRequest::Locations(request));
        }
        if !self.filters.continents.is_empty() {
            self.cascade.on_continents_changed(now);
        }
    }

    /// Requests the runtime still has to hand to a worker.
    pub fn drain_requests(&mut self) -> Vec<ApiRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Advances debounce, settle and blur-grace timers. True when the screen
    /// should be redrawn.
    pub fn tick(&mut self, now: Instant) -> bool {
        let (changed, request) = self.cascade.tick(now, &mut self.filters);
        if let Some(request) = request {
            self.outbox.push(ApiRequest::Locations(request));
        }
        self.clamp_cursor(Panel::Countries);
        let closed = self.presets.tick(now);
        if closed && self.input_mode == InputMode::Presets {
            self.input_mode = InputMode::Normal;
        }
        changed || closed
    }

    pub fn apply_reply(&mut self, reply: ApiReply, now: Instant) {
        match reply {
            ApiReply::Locations(reply) => {
                self.cascade.apply_reply(reply, &mut self.filters, now);
                if let Some(message) = self
                    .cascade
                    .last_error()
                    .map(|err| format!("locations unavailable: {err}"))
                {
                    self.set_status(message);
                }
                self.clamp_cursor(Panel::Continents);
                self.clamp_cursor(Panel::Countries);
            }
            ApiReply::Presets(reply) => {
                self.presets.apply_reply(reply);
                if let Some(message) = self
                    .presets
                    .last_error()
                    .map(|err| format!("presets unavailable: {err}"))
                {
                    self.set_status(message);
                }
            }
            ApiReply::Session(reply) => {
                self.session.apply_reply(reply);
                debug!(
                    "session authenticated={} groups={}",
                    self.session.is_authenticated(),
                    self.session.user_groups().len()
                );
            }
            ApiReply::Measurements(reply) => self.apply_measurements(reply),
        }
    }

    fn apply_measurements(&mut self, reply: MeasurementReply) {
        match self.search.apply_reply(reply) {
            SearchOutcome::Ignored => {}
            SearchOutcome::Summary => {
                if let Some(text) = self.search.summary_text() {
                    self.set_status(text);
                }
                self.bins.clear();
                self.cursors[Panel::Results.index()] = 0;
                self.request_hexbins();
            }
            SearchOutcome::Hexbins => {
                self.rebin();
            }
            SearchOutcome::Exported { format, bytes } => {
                match export::save_export(&self.export_dir, format, &bytes) {
                    Ok(path) => {
                        info!("export saved {}", path.display());
                        self.last_export = Some((path, SystemTime::now()));
                    }
                    Err(err) => {
                        warn!("export save failed: {err:#}");
                        self.set_status(format!("export failed: {err:#}"));
                    }
                }
            }
            SearchOutcome::Failed(err) => self.report_search_error(&err),
        }
    }

    /// Re-issues location and preset loads that ended in an error.
    pub fn retry_loads(&mut self, now: Instant) {
        if self.cascade.state() == LoadState::Error {
            if let Some(request) = self.cascade.load(now) {
                self.outbox.push(ApiRequest::Locations(request));
            }
        }
        if self.presets.last_error().is_some() {
            if let Some(request) = self.presets.load_presets() {
                self.outbox.push(ApiRequest::Presets(request));
            }
        }
    }

    pub fn submit_search(&mut self) {
        let result = self.search.search(&self.filters);
        self.dispatch(result);
    }

    pub fn export(&mut self) {
        let format = self.search.format();
        let result = self.search.export_download(format);
        self.dispatch(result);
    }

    pub fn request_hexbins(&mut self) {
        let result = self.search.fetch_hexbins();
        self.dispatch(result);
    }

    fn dispatch(&mut self, result: Result<MeasurementRequest, SearchError>) {
        match result {
            Ok(request) => self.outbox.push(ApiRequest::Measurements(request)),
            Err(err) => self.report_search_error(&err),
        }
    }

    fn report_search_error(&mut self, err: &SearchError) {
        let message = match err {
            SearchError::Forbidden => "access denied: sign in to search measurements".to_string(),
            _ if err.is_retryable() => format!("{err} (press Enter to retry)"),
            _ => err.to_string(),
        };
        self.set_status(message);
    }

    pub fn cycle_format(&mut self) {
        let format = self.search.cycle_format();
        debug!("export format -> {}", format.as_str());
    }

    pub fn zoom_in(&mut self) {
        if self.map_zoom < self.max_zoom {
            self.map_zoom += 1;
            self.rebin();
        }
    }

    pub fn zoom_out(&mut self) {
        if self.map_zoom > MIN_ZOOM {
            self.map_zoom -= 1;
            self.rebin();
        }
    }

    fn rebin(&mut self) {
        self.bins = bin_points(self.search.points(), self.map_zoom);
        self.clamp_cursor(Panel::Results);
        debug!("binned zoom={} bins={}", self.map_zoom, self.bins.len());
    }

    pub fn set_status(&mut self, message: String) {
        self.status = Some((message, SystemTime::now()));
    }

    pub fn status_text(&self) -> Option<&str> {
        let (message, at) = self.status.as_ref()?;
        let age = SystemTime::now().duration_since(*at).unwrap_or_default();
        (age <= STATUS_TTL).then_some(message.as_str())
    }

    pub fn validation_message(&self) -> Option<String> {
        self.filters.validate().err().map(|err| err.to_string())
    }

    pub fn results_out_of_date(&self) -> bool {
        self.search.summary().is_some() && self.search.filters_out_of_sync(&self.filters)
    }

    pub fn toggle_theme(&mut self) {
        self.theme_mode = self.theme_mode.toggle();
        debug!("theme -> {}", self.theme_mode.label());
    }

    pub fn open_help(&mut self) {
        self.input_mode = InputMode::Help;
    }

    pub fn close_help(&mut self) {
        self.input_mode = InputMode::Normal;
    }

    pub fn next_panel(&mut self) {
        let next = (self.panel.index() + 1) % Panel::ALL.len();
        self.focus_panel(Panel::ALL[next]);
    }

    pub fn prev_panel(&mut self) {
        let len = Panel::ALL.len();
        let prev = (self.panel.index() + len - 1) % len;
        self.focus_panel(Panel::ALL[prev]);
    }

    fn focus_panel(&mut self, panel: Panel) {
        self.panel = panel;
        if panel == Panel::Countries {
            // Touching the country field while it is hidden discards the
            // selections that outlived their continents.
            self.cascade.clear_hidden_countries(&mut self.filters);
        }
        debug!("panel -> {}", panel.title());
    }

    pub fn cursor(&self, panel: Panel) -> usize {
        self.cursors[panel.index()]
    }

    /// Rows shown by a list panel.
    pub fn panel_items(&self, panel: Panel) -> Vec<String> {
        match panel {
            Panel::Continents => self.cascade.index().continents().cloned().collect(),
            Panel::Countries => self.cascade.available_countries().to_vec(),
            Panel::WaterSources => WATER_SOURCES.iter().map(|s| s.to_string()).collect(),
            Panel::Temperature => vec![
                format_temp(self.filters.temperature.from),
                format_temp(self.filters.temperature.to),
            ],
            Panel::Dates => vec![
                format_date(self.filters.date_range.from),
                format_date(self.filters.date_range.to),
            ],
            Panel::TimeSlots => self
                .filters
                .time_slots
                .iter()
                .map(|slot| format_time_slots(std::slice::from_ref(slot)))
                .collect(),
            Panel::Results => self
                .bins
                .iter()
                .map(|bin| format_summary(&bin.summary))
                .collect(),
        }
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let len = self.panel_items(self.panel).len();
        let slot = &mut self.cursors[self.panel.index()];
        if len == 0 {
            *slot = 0;
            return;
        }
        let next = (*slot as isize + delta).clamp(0, len as isize - 1);
        *slot = next as usize;
    }

    fn clamp_cursor(&mut self, panel: Panel) {
        let len = self.panel_items(panel).len();
        let slot = &mut self.cursors[panel.index()];
        if *slot >= len {
            *slot = len.saturating_sub(1);
        }
    }

    fn current_item(&self) -> Option<String> {
        self.panel_items(self.panel)
            .get(self.cursor(self.panel))
            .cloned()
    }

    /// Space: flips the row under the cursor in a multi-select panel.
    pub fn toggle_current(&mut self, now: Instant) {
        match self.panel {
            Panel::Continents => {
                if let Some(item) = self.current_item() {
                    self.filters.toggle_continent(&item);
                    self.cascade.on_continents_changed(now);
                }
            }
            Panel::Countries => {
                if let Some(item) = self.current_item() {
                    self.filters.toggle_country(&item);
                }
            }
            Panel::WaterSources => {
                if let Some(item) = self.current_item() {
                    self.filters.toggle_water_source(&item);
                }
            }
            Panel::Temperature => self.toggle_temperature(),
            _ => {}
        }
    }

    /// Checks every row when nothing is checked, otherwise clears the selection.
    pub fn toggle_all_current(&mut self, now: Instant) {
        match self.panel {
            Panel::Continents => {
                let all: Vec<String> = self.cascade.index().continents().cloned().collect();
                toggle_all(&mut self.filters.continents, all.iter());
                self.cascade.on_continents_changed(now);
            }
            Panel::Countries => {
                if !self.cascade.select_all_ready() {
                    debug!("select all countries ignored: cascade not settled");
                    return;
                }
                let all = self.cascade.available_countries().to_vec();
                toggle_all(&mut self.filters.countries, all.iter());
            }
            Panel::WaterSources => {
                let all = self.panel_items(Panel::WaterSources);
                toggle_all(&mut self.filters.water_sources, all.iter());
            }
            _ => {}
        }
    }

    pub fn toggle_temperature(&mut self) {
        self.filters.temperature.enabled = !self.filters.temperature.enabled;
        debug!("temperature filter enabled={}", self.filters.temperature.enabled);
    }

    pub fn toggle_unit(&mut self) {
        self.filters.temperature.unit = self.filters.temperature.unit.toggle();
    }

    pub fn add_time_slot(&mut self) {
        if self.filters.add_slot() {
            self.cursors[Panel::TimeSlots.index()] = self.filters.time_slots.len() - 1;
        } else {
            self.set_status(format!("at most {MAX_TIME_SLOTS} time slots"));
        }
    }

    pub fn remove_time_slot(&mut self) {
        let index = self.cursor(Panel::TimeSlots);
        if self.filters.remove_slot(index) {
            self.clamp_cursor(Panel::TimeSlots);
        }
    }

    pub fn reset_filters(&mut self, now: Instant) {
        self.filters.reset();
        self.cascade.on_continents_changed(now);
        self.cursors = [0; PANEL_COUNT];
        info!("filters reset");
    }

    /// Opens the inline editor for the field under the cursor.
    pub fn start_edit(&mut self) {
        let row = self.cursor(self.panel);
        let field = match (self.panel, row) {
            (Panel::Temperature, 0) => EditField::TempFrom,
            (Panel::Temperature, _) => EditField::TempTo,
            (Panel::Dates, 0) => EditField::DateFrom,
            (Panel::Dates, _) => EditField::DateTo,
            (Panel::TimeSlots, _) => EditField::TimeSlots,
            _ => return,
        };
        self.edit_buffer = match field {
            EditField::TempFrom => opt_number(self.filters.temperature.from),
            EditField::TempTo => opt_number(self.filters.temperature.to),
            EditField::DateFrom => format_date(self.filters.date_range.from),
            EditField::DateTo => format_date(self.filters.date_range.to),
            EditField::TimeSlots => format_time_slots(&self.filters.time_slots),
        };
        self.input_mode = InputMode::Edit(field);
        debug!("edit start field={field:?}");
    }

    pub fn push_edit_char(&mut self, ch: char) {
        self.edit_buffer.push(ch);
    }

    pub fn backspace_edit(&mut self) {
        self.edit_buffer.pop();
    }

    pub fn cancel_edit(&mut self) {
        self.edit_buffer.clear();
        self.input_mode = InputMode::Normal;
    }

    /// Commits the edit buffer. Unparseable text leaves the filter unchanged.
    pub fn apply_edit(&mut self) {
        let InputMode::Edit(field) = self.input_mode else {
            return;
        };
        let text = std::mem::take(&mut self.edit_buffer);
        let text = text.trim();
        self.input_mode = InputMode::Normal;
        let result = match field {
            EditField::TempFrom => parse_number(text).map(|v| self.filters.temperature.from = v),
            EditField::TempTo => parse_number(text).map(|v| self.filters.temperature.to = v),
            EditField::DateFrom => parse_opt_date(text).map(|v| self.filters.date_range.from = v),
            EditField::DateTo => parse_opt_date(text).map(|v| self.filters.date_range.to = v),
            EditField::TimeSlots => parse_time_slots(text)
                .map(|slots| self.filters.time_slots = slots)
                .map_err(|err| err.to_string()),
        };
        match result {
            Ok(()) => {
                self.clamp_cursor(Panel::TimeSlots);
                debug!("edit applied field={field:?}");
            }
            Err(message) => {
                warn!("edit rejected field={field:?}: {message}");
                self.set_status(message);
            }
        }
    }

    pub fn open_presets(&mut self, now: Instant) {
        self.input_mode = InputMode::Presets;
        if let Some(request) = self.presets.focus(now) {
            self.outbox.push(ApiRequest::Presets(request));
        }
    }

    /// Leaves the search box; the dropdown lingers for the blur grace period.
    pub fn leave_presets(&mut self, now: Instant) {
        self.presets.blur(now);
        self.input_mode = InputMode::Normal;
    }

    pub fn preset_key(&mut self, key: PresetKey, now: Instant) {
        match self.presets.handle_key(key) {
            PresetEvent::Selected(preset) => {
                self.filters.apply_preset(&preset.filters);
                self.cascade.on_continents_changed(now);
                self.leave_presets(now);
                self.set_status(format!("preset applied: {}", preset.name));
                info!("preset applied id={}", preset.id);
            }
            PresetEvent::SearchSubmit => self.submit_search(),
            PresetEvent::Handled => {
                if key == PresetKey::Escape {
                    self.input_mode = InputMode::Normal;
                }
            }
            PresetEvent::Ignored => {}
        }
    }

    pub fn loading_label(&self) -> Option<&'static str> {
        if self.cascade.state() == LoadState::Loading {
            Some("loading locations")
        } else if self.presets.is_loading() {
            Some("loading presets")
        } else if self.search.is_exporting() {
            Some("exporting")
        } else if self.search.is_searching() {
            Some("searching")
        } else {
            None
        }
    }
}

fn format_temp(value: Option<f64>) -> String {
    value.map(|v| format!("{v}")).unwrap_or_default()
}

fn opt_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn parse_number(text: &str) -> Result<Option<f64>, String> {
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| format!("not a number: {text}"))
}

fn parse_opt_date(text: &str) -> Result<Option<chrono::NaiveDate>, String> {
    if text.is_empty() {
        return Ok(None);
    }
    parse_date(text)
        .map(Some)
        .ok_or_else(|| format!("not a date: {text}"))
}
