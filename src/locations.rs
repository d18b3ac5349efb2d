//! Continent to country cascade.
//!
//! The directory is fetched once per process. Continent toggles are debounced;
//! when the window closes the selectable countries are re-derived and checked
//! countries that are still available survive the reload.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::FetchError;
use crate::filters::FilterState;
use crate::schedule::{Deadline, LOCATION_DEBOUNCE, SETTLE_DELAY};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocationIndex(BTreeMap<String, BTreeSet<String>>);

impl LocationIndex {
    pub fn continents(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sorted, de-duplicated union of the countries of `selected`.
    pub fn available_countries(&self, selected: &BTreeSet<String>) -> Vec<String> {
        let mut out = BTreeSet::new();
        for continent in selected {
            if let Some(countries) = self.0.get(continent) {
                out.extend(countries.iter().cloned());
            }
        }
        out.into_iter().collect()
    }
}

impl<C, I, S> FromIterator<(C, I)> for LocationIndex
where
    C: Into<String>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (C, I)>>(iter: T) -> Self {
        LocationIndex(
            iter.into_iter()
                .map(|(continent, countries)| {
                    (
                        continent.into(),
                        countries.into_iter().map(Into::into).collect(),
                    )
                })
                .collect(),
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocationRequest {
    pub tag: u64,
}

#[derive(Clone, Debug)]
pub struct LocationReply {
    pub tag: u64,
    pub result: Result<LocationIndex, FetchError>,
}

#[derive(Debug)]
pub struct LocationCascade {
    state: LoadState,
    index: LocationIndex,
    available: Vec<String>,
    country_field_visible: bool,
    last_error: Option<FetchError>,
    next_tag: u64,
    in_flight: Option<u64>,
    debounce: Deadline,
    settle: Deadline,
    select_all_ready: bool,
}

impl Default for LocationCascade {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationCascade {
    pub fn new() -> Self {
        Self {
            state: LoadState::Idle,
            index: LocationIndex::default(),
            available: Vec::new(),
            country_field_visible: false,
            last_error: None,
            next_tag: 0,
            in_flight: None,
            debounce: Deadline::new(LOCATION_DEBOUNCE),
            settle: Deadline::new(SETTLE_DELAY),
            select_all_ready: false,
        }
    }

    pub fn with_delays(mut self, debounce: Duration, settle: Duration) -> Self {
        self.debounce = Deadline::new(debounce);
        self.settle = Deadline::new(settle);
        self
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn index(&self) -> &LocationIndex {
        &self.index
    }

    pub fn available_countries(&self) -> &[String] {
        &self.available
    }

    pub fn country_field_visible(&self) -> bool {
        self.country_field_visible
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn select_all_ready(&self) -> bool {
        self.select_all_ready
    }

    /// A debounce or settle deadline has not fired yet.
    pub fn is_settling(&self) -> bool {
        self.debounce.is_pending() || self.settle.is_pending()
    }

    /// Starts the directory fetch unless it already succeeded or is in flight.
    pub fn load(&mut self, _now: Instant) -> Option<LocationRequest> {
        if self.in_flight.is_some() {
            debug!("location load attached to in-flight request");
            return None;
        }
        if self.state == LoadState::Ready {
            return None;
        }
        self.next_tag += 1;
        self.in_flight = Some(self.next_tag);
        self.state = LoadState::Loading;
        debug!("location load issued tag={}", self.next_tag);
        Some(LocationRequest { tag: self.next_tag })
    }

    pub fn on_continents_changed(&mut self, now: Instant) {
        self.debounce.arm(now);
        self.select_all_ready = false;
    }

    /// Polls the debounce and settle deadlines. Returns true when the visible
    /// cascade changed. A fetch request is returned when the index is missing.
    pub fn tick(&mut self, now: Instant, filters: &mut FilterState) -> (bool, Option<LocationRequest>) {
        let mut changed = false;
        let mut request = None;
        if self.debounce.fire(now) {
            if self.state != LoadState::Ready && !filters.continents.is_empty() {
                request = self.load(now);
            }
            self.recompute(filters);
            self.settle.arm(now);
            changed = true;
        }
        if self.settle.fire(now) {
            self.select_all_ready = !self.available.is_empty();
            changed = true;
        }
        (changed, request)
    }

    pub fn apply_reply(&mut self, reply: LocationReply, filters: &mut FilterState, now: Instant) {
        if self.in_flight != Some(reply.tag) {
            debug!("dropping stale location reply tag={}", reply.tag);
            return;
        }
        self.in_flight = None;
        match reply.result {
            Ok(index) => {
                debug!("location index loaded continents={}", index.0.len());
                self.index = index;
                self.state = LoadState::Ready;
                self.last_error = None;
                self.recompute(filters);
                self.settle.arm(now);
            }
            Err(err) => {
                warn!("location load failed: {err}");
                self.state = LoadState::Error;
                self.last_error = Some(err);
            }
        }
    }

    /// Drops country selections once no continent is selected. A field that is
    /// only hidden because the directory is still loading keeps them.
    pub fn clear_hidden_countries(&mut self, filters: &mut FilterState) {
        if filters.continents.is_empty() {
            filters.countries.clear();
        }
    }

    fn recompute(&mut self, filters: &mut FilterState) {
        if filters.continents.is_empty() {
            self.available.clear();
            self.country_field_visible = false;
            self.select_all_ready = false;
            return;
        }
        if self.state != LoadState::Ready {
            return;
        }
        let previously_checked = std::mem::take(&mut filters.countries);
        self.available = self.index.available_countries(&filters.continents);
        self.country_field_visible = true;
        filters.countries = previously_checked
            .into_iter()
            .filter(|country| self.available.binary_search(country).is_ok())
            .collect();
        debug!(
            "countries recomputed available={} checked={}",
            self.available.len(),
            filters.countries.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> LocationIndex {
        LocationIndex::from_iter([
            ("Europe", vec!["France", "Spain"]),
            ("Asia", vec!["Japan"]),
        ])
    }

    fn ready_cascade(start: Instant, filters: &mut FilterState) -> LocationCascade {
        let mut cascade = LocationCascade::new();
        let req = cascade.load(start).unwrap();
        cascade.apply_reply(
            LocationReply {
                tag: req.tag,
                result: Ok(sample_index()),
            },
            filters,
            start,
        );
        cascade
    }

    fn settle(cascade: &mut LocationCascade, filters: &mut FilterState, at: Instant) {
        cascade.on_continents_changed(at);
        cascade.tick(at + LOCATION_DEBOUNCE, filters);
    }

    #[test]
    fn union_is_sorted_and_deduplicated() {
        let index = LocationIndex::from_iter([
            ("Europe", vec!["Spain", "France"]),
            ("Transcontinental", vec!["Spain", "Morocco"]),
        ]);
        let selected: BTreeSet<String> =
            ["Europe", "Transcontinental"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            index.available_countries(&selected),
            vec!["France", "Morocco", "Spain"]
        );
        assert!(index.available_countries(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn load_is_issued_once_and_attaches_while_in_flight() {
        let now = Instant::now();
        let mut cascade = LocationCascade::new();
        assert_eq!(cascade.state(), LoadState::Idle);
        assert!(cascade.load(now).is_some());
        assert_eq!(cascade.state(), LoadState::Loading);
        assert!(cascade.load(now).is_none());
    }

    #[test]
    fn empty_selection_hides_country_field() {
        let start = Instant::now();
        let mut filters = FilterState::default();
        let mut cascade = ready_cascade(start, &mut filters);
        settle(&mut cascade, &mut filters, start);
        assert!(!cascade.country_field_visible());
        assert!(cascade.available_countries().is_empty());
    }

    #[test]
    fn europe_lists_france_and_spain() {
        let start = Instant::now();
        let mut filters = FilterState::default();
        let mut cascade = ready_cascade(start, &mut filters);
        filters.toggle_continent("Europe");
        settle(&mut cascade, &mut filters, start);
        assert!(cascade.country_field_visible());
        assert_eq!(cascade.available_countries(), ["France", "Spain"]);
    }

    #[test]
    fn reselecting_restores_still_available_countries() {
        let start = Instant::now();
        let mut filters = FilterState::default();
        let mut cascade = ready_cascade(start, &mut filters);

        filters.toggle_continent("Europe");
        filters.toggle_continent("Asia");
        settle(&mut cascade, &mut filters, start);
        filters.toggle_country("France");
        filters.toggle_country("Japan");

        filters.toggle_continent("Asia");
        settle(&mut cascade, &mut filters, start + Duration::from_secs(1));
        assert!(filters.countries.contains("France"));
        assert!(!filters.countries.contains("Japan"));

        filters.toggle_continent("Asia");
        settle(&mut cascade, &mut filters, start + Duration::from_secs(2));
        assert_eq!(cascade.available_countries(), ["France", "Japan", "Spain"]);
        assert!(filters.countries.contains("France"));
    }

    #[test]
    fn hidden_field_keeps_countries_until_cleared() {
        let start = Instant::now();
        let mut filters = FilterState::default();
        let mut cascade = ready_cascade(start, &mut filters);
        filters.toggle_continent("Europe");
        settle(&mut cascade, &mut filters, start);
        filters.toggle_country("Spain");

        filters.toggle_continent("Europe");
        settle(&mut cascade, &mut filters, start + Duration::from_secs(1));
        assert!(filters.countries.contains("Spain"));

        cascade.clear_hidden_countries(&mut filters);
        assert!(filters.countries.is_empty());
    }

    #[test]
    fn countries_survive_while_directory_loads() {
        let start = Instant::now();
        let mut filters = FilterState::default();
        filters.toggle_continent("Europe");
        filters.toggle_country("Spain");
        let mut cascade = LocationCascade::new();
        assert!(cascade.load(start).is_some());
        cascade.on_continents_changed(start);
        cascade.tick(start + LOCATION_DEBOUNCE, &mut filters);
        assert!(!cascade.country_field_visible());

        cascade.clear_hidden_countries(&mut filters);
        assert!(filters.countries.contains("Spain"));
    }

    #[test]
    fn burst_of_toggles_recomputes_once() {
        let start = Instant::now();
        let mut filters = FilterState::default();
        let mut cascade = ready_cascade(start, &mut filters);

        filters.toggle_continent("Europe");
        cascade.on_continents_changed(start);
        filters.toggle_continent("Asia");
        cascade.on_continents_changed(start + Duration::from_millis(100));

        cascade.tick(start + Duration::from_millis(200), &mut filters);
        assert!(cascade.available_countries().is_empty());
        let (changed, _) = cascade.tick(start + Duration::from_millis(250), &mut filters);
        assert!(changed);
        assert_eq!(cascade.available_countries().len(), 3);
    }

    #[test]
    fn settle_follow_up_enables_select_all() {
        let start = Instant::now();
        let mut filters = FilterState::default();
        let mut cascade = ready_cascade(start, &mut filters);
        filters.toggle_continent("Asia");
        settle(&mut cascade, &mut filters, start);
        assert!(!cascade.select_all_ready());
        cascade.tick(start + LOCATION_DEBOUNCE + SETTLE_DELAY, &mut filters);
        assert!(cascade.select_all_ready());
    }

    #[test]
    fn stale_reply_is_dropped() {
        let now = Instant::now();
        let mut filters = FilterState::default();
        let mut cascade = LocationCascade::new();
        let req = cascade.load(now).unwrap();
        cascade.apply_reply(
            LocationReply {
                tag: req.tag + 7,
                result: Ok(sample_index()),
            },
            &mut filters,
            now,
        );
        assert_eq!(cascade.state(), LoadState::Loading);
        assert!(cascade.index().is_empty());
    }

    #[test]
    fn failure_keeps_old_data_and_allows_retry() {
        let now = Instant::now();
        let mut filters = FilterState::default();
        let mut cascade = LocationCascade::new();
        let req = cascade.load(now).unwrap();
        cascade.apply_reply(
            LocationReply {
                tag: req.tag,
                result: Err(FetchError::Transport("HTTP 502".to_string())),
            },
            &mut filters,
            now,
        );
        assert_eq!(cascade.state(), LoadState::Error);
        assert!(cascade.last_error().is_some());

        filters.toggle_continent("Europe");
        cascade.on_continents_changed(now);
        let (_, retry) = cascade.tick(now + LOCATION_DEBOUNCE, &mut filters);
        let retry = retry.expect("debounce re-attempts the load");
        assert!(retry.tag > req.tag);
    }
}
