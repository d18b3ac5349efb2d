use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::model::{de_opt_f64_from_any, de_string_from_any};
use crate::schedule::{Deadline, BLUR_GRACE};

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Preset {
    #[serde(default, deserialize_with = "de_string_from_any")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub filters: PresetFilters,
}

/// Stored filter snapshot, shaped like the server's JSON.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PresetFilters {
    #[serde(default)]
    pub location: Option<PresetLocation>,
    #[serde(default)]
    pub measurements: Option<PresetMeasurements>,
    #[serde(default, rename = "dateRange")]
    pub date_range: Option<PresetDateRange>,
    #[serde(default)]
    pub times: Option<Vec<PresetTimeSlot>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PresetLocation {
    #[serde(default)]
    pub continents: Vec<String>,
    #[serde(default)]
    pub countries: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PresetMeasurements {
    #[serde(default, rename = "waterSources")]
    pub water_sources: Vec<String>,
    #[serde(default)]
    pub temperature: Option<PresetTemperature>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PresetTemperature {
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub from: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub to: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PresetDateRange {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PresetTimeSlot {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresetRequest {
    pub tag: u64,
}

#[derive(Clone, Debug)]
pub struct PresetReply {
    pub tag: u64,
    pub result: Result<Vec<Preset>, FetchError>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchFocus {
    #[default]
    Blurred,
    Focused,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresetKey {
    Up,
    Down,
    Enter,
    Escape,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PresetEvent {
    Ignored,
    Handled,
    SearchSubmit,
    Selected(Preset),
}

#[derive(Debug)]
pub struct PresetSearch {
    presets: Vec<Preset>,
    next_tag: u64,
    in_flight: Option<u64>,
    last_error: Option<FetchError>,
    query: String,
    focus: SearchFocus,
    dropdown_open: bool,
    blur_grace: Deadline,
    highlighted: Option<usize>,
}

impl Default for PresetSearch {
    fn default() -> Self {
        Self::new(BLUR_GRACE)
    }
}

impl PresetSearch {
    pub fn new(blur_grace: Duration) -> Self {
        Self {
            presets: Vec::new(),
            next_tag: 0,
            in_flight: None,
            last_error: None,
            query: String::new(),
            focus: SearchFocus::Blurred,
            dropdown_open: false,
            blur_grace: Deadline::new(blur_grace),
            highlighted: None,
        }
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn focus_state(&self) -> SearchFocus {
        self.focus
    }

    pub fn dropdown_open(&self) -> bool {
        self.dropdown_open
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn load_presets(&mut self) -> Option<PresetRequest> {
        if self.in_flight.is_some() {
            return None;
        }
        if !self.presets.is_empty() && self.last_error.is_none() {
            return None;
        }
        self.next_tag += 1;
        self.in_flight = Some(self.next_tag);
        debug!("preset load issued tag={}", self.next_tag);
        Some(PresetRequest { tag: self.next_tag })
    }

    pub fn apply_reply(&mut self, reply: PresetReply) {
        if self.in_flight != Some(reply.tag) {
            debug!("dropping stale preset reply tag={}", reply.tag);
            return;
        }
        self.in_flight = None;
        match reply.result {
            Ok(presets) => {
                debug!("presets loaded count={}", presets.len());
                self.presets = presets;
                self.last_error = None;
            }
            Err(err) => {
                warn!("preset load failed: {err}");
                self.presets.clear();
                self.last_error = Some(err);
            }
        }
        self.highlighted = None;
    }

    /// Case-insensitive containment on the preset name. A blank query lists
    /// everything only while the dropdown is open.
    pub fn filter_presets(&self, query: &str) -> Vec<&Preset> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            if self.dropdown_open {
                return self.presets.iter().collect();
            }
            return Vec::new();
        }
        self.presets
            .iter()
            .filter(|preset| preset.name.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn visible(&self) -> Vec<&Preset> {
        self.filter_presets(&self.query)
    }

    pub fn show_no_results(&self) -> bool {
        self.dropdown_open && !self.query.trim().is_empty() && self.visible().is_empty()
    }

    pub fn focus(&mut self, _now: Instant) -> Option<PresetRequest> {
        self.focus = SearchFocus::Focused;
        self.dropdown_open = true;
        self.blur_grace.cancel();
        if self.presets.is_empty() {
            self.load_presets()
        } else {
            None
        }
    }

    pub fn blur(&mut self, now: Instant) {
        self.focus = SearchFocus::Blurred;
        self.blur_grace.arm(now);
    }

    /// Closes the dropdown once the blur grace period has passed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.blur_grace.fire(now) && self.focus == SearchFocus::Blurred {
            self.dropdown_open = false;
            self.highlighted = None;
            return true;
        }
        false
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.highlighted = None;
    }

    pub fn push_char(&mut self, ch: char) {
        self.query.push(ch);
        self.highlighted = None;
    }

    pub fn backspace(&mut self) {
        self.query.pop();
        self.highlighted = None;
    }

    pub fn handle_key(&mut self, key: PresetKey) -> PresetEvent {
        match key {
            PresetKey::Escape => {
                self.dropdown_open = false;
                self.blur_grace.cancel();
                self.highlighted = None;
                PresetEvent::Handled
            }
            PresetKey::Enter => match self.highlighted {
                Some(index) if self.dropdown_open => match self.select(index) {
                    Some(preset) => PresetEvent::Selected(preset),
                    None => PresetEvent::SearchSubmit,
                },
                _ => PresetEvent::SearchSubmit,
            },
            PresetKey::Down => {
                let len = self.visible().len();
                if !self.dropdown_open || len == 0 {
                    return PresetEvent::Ignored;
                }
                self.highlighted = Some(match self.highlighted {
                    Some(idx) => (idx + 1).min(len - 1),
                    None => 0,
                });
                PresetEvent::Handled
            }
            PresetKey::Up => {
                if !self.dropdown_open || self.visible().is_empty() {
                    return PresetEvent::Ignored;
                }
                self.highlighted = match self.highlighted {
                    Some(0) | None => None,
                    Some(idx) => Some(idx - 1),
                };
                PresetEvent::Handled
            }
        }
    }

    /// Picks an entry of the visible list and clears the query.
    pub fn select(&mut self, index: usize) -> Option<Preset> {
        let chosen = self.visible().get(index).map(|preset| (*preset).clone())?;
        debug!("preset selected id={} name={}", chosen.id, chosen.name);
        self.query.clear();
        self.highlighted = None;
        Some(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preset(id: &str, name: &str) -> Preset {
        Preset {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            filters: PresetFilters::default(),
        }
    }

    fn loaded() -> PresetSearch {
        let mut search = PresetSearch::default();
        let req = search.load_presets().unwrap();
        search.apply_reply(PresetReply {
            tag: req.tag,
            result: Ok(vec![
                preset("1", "Test Preset 1"),
                preset("2", "Test Preset 2"),
                preset("3", "Another Preset"),
            ]),
        });
        search
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let search = loaded();
        assert_eq!(search.filter_presets("preset").len(), 3);
        let another = search.filter_presets("another");
        assert_eq!(another.len(), 1);
        assert_eq!(another[0].name, "Another Preset");
        assert!(search.filter_presets("winter").is_empty());
    }

    #[test]
    fn blank_query_is_focus_gated() {
        let now = Instant::now();
        let mut search = loaded();
        assert!(search.filter_presets("   ").is_empty());
        search.focus(now);
        assert_eq!(search.filter_presets("").len(), 3);
    }

    #[test]
    fn load_is_noop_while_cached_or_in_flight() {
        let mut search = PresetSearch::default();
        let first = search.load_presets();
        assert!(first.is_some());
        assert!(search.load_presets().is_none());

        let mut cached = loaded();
        assert!(cached.load_presets().is_none());
    }

    #[test]
    fn error_permits_retry() {
        let mut search = PresetSearch::default();
        let req = search.load_presets().unwrap();
        search.apply_reply(PresetReply {
            tag: req.tag,
            result: Err(FetchError::Transport("HTTP 500".to_string())),
        });
        assert!(search.last_error().is_some());
        assert!(search.load_presets().is_some());
    }

    #[test]
    fn stale_reply_is_dropped() {
        let mut search = PresetSearch::default();
        let req = search.load_presets().unwrap();
        search.apply_reply(PresetReply {
            tag: req.tag + 1,
            result: Ok(vec![preset("9", "Ghost")]),
        });
        assert!(search.presets().is_empty());
        assert!(search.is_loading());
    }

    #[test]
    fn focus_on_empty_cache_triggers_load() {
        let now = Instant::now();
        let mut search = PresetSearch::default();
        assert!(search.focus(now).is_some());
        assert_eq!(search.focus_state(), SearchFocus::Focused);
        assert!(search.dropdown_open());
        assert!(search.focus(now).is_none());
    }

    #[test]
    fn blur_hides_after_grace() {
        let now = Instant::now();
        let mut search = loaded();
        search.focus(now);
        search.blur(now);
        assert!(!search.tick(now + Duration::from_millis(199)));
        assert!(search.dropdown_open());
        assert!(search.tick(now + BLUR_GRACE));
        assert!(!search.dropdown_open());
    }

    #[test]
    fn refocus_within_grace_keeps_dropdown() {
        let now = Instant::now();
        let mut search = loaded();
        search.focus(now);
        search.blur(now);
        search.focus(now + Duration::from_millis(100));
        assert!(!search.tick(now + Duration::from_millis(300)));
        assert!(search.dropdown_open());
    }

    #[test]
    fn escape_hides_immediately_and_enter_submits() {
        let now = Instant::now();
        let mut search = loaded();
        search.focus(now);
        assert_eq!(search.handle_key(PresetKey::Escape), PresetEvent::Handled);
        assert!(!search.dropdown_open());
        assert_eq!(search.handle_key(PresetKey::Enter), PresetEvent::SearchSubmit);
    }

    #[test]
    fn keyboard_navigation_selects_and_clears_query() {
        let now = Instant::now();
        let mut search = loaded();
        search.focus(now);
        search.set_query("test");
        assert_eq!(search.handle_key(PresetKey::Down), PresetEvent::Handled);
        assert_eq!(search.handle_key(PresetKey::Down), PresetEvent::Handled);
        assert_eq!(search.handle_key(PresetKey::Down), PresetEvent::Handled);
        assert_eq!(search.highlighted(), Some(1));
        search.handle_key(PresetKey::Up);
        assert_eq!(search.highlighted(), Some(0));

        match search.handle_key(PresetKey::Enter) {
            PresetEvent::Selected(chosen) => assert_eq!(chosen.id, "1"),
            other => panic!("expected selection, got {other:?}"),
        }
        assert_eq!(search.query(), "");
    }

    #[test]
    fn no_results_flag() {
        let now = Instant::now();
        let mut search = loaded();
        search.focus(now);
        search.set_query("zzz");
        assert!(search.show_no_results());
        search.set_query("another");
        assert!(!search.show_no_results());
    }
}
