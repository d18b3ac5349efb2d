use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime};
use tracing::debug;

use crate::error::{FilterField, ValidationError};
use crate::presets::PresetFilters;

pub const MAX_TIME_SLOTS: usize = 3;

/// Water-source vocabulary offered by the measurement form.
pub const WATER_SOURCES: [&str; 4] = ["Network", "Rooftop Tank", "Well", "Other"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TempUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TempUnit {
    pub fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "F" | "FAHRENHEIT" => TempUnit::Fahrenheit,
            _ => TempUnit::Celsius,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TempUnit::Celsius => "C",
            TempUnit::Fahrenheit => "F",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            TempUnit::Celsius => TempUnit::Fahrenheit,
            TempUnit::Fahrenheit => TempUnit::Celsius,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemperatureFilter {
    pub enabled: bool,
    pub from: Option<f64>,
    pub to: Option<f64>,
    /// Informational only; bounds are sent as entered.
    pub unit: TempUnit,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeSlot {
    pub from: Option<NaiveTime>,
    pub to: Option<NaiveTime>,
}

impl TimeSlot {
    pub fn new(from: Option<NaiveTime>, to: Option<NaiveTime>) -> Self {
        Self { from, to }
    }

    /// Bounds with open ends widened to the whole day.
    fn filled(&self) -> (NaiveTime, NaiveTime) {
        (
            self.from.unwrap_or(NaiveTime::MIN),
            self.to.unwrap_or_else(end_of_day),
        )
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterState {
    pub continents: BTreeSet<String>,
    pub countries: BTreeSet<String>,
    pub water_sources: BTreeSet<String>,
    pub temperature: TemperatureFilter,
    pub date_range: DateRange,
    pub time_slots: Vec<TimeSlot>,
}

pub fn temperature_range_valid(from: Option<f64>, to: Option<f64>) -> bool {
    match (from, to) {
        (Some(from), Some(to)) => to >= from,
        _ => true,
    }
}

pub fn date_range_valid(from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    match (from, to) {
        (Some(from), Some(to)) => to >= from,
        _ => true,
    }
}

pub fn slot_valid(slot: &TimeSlot) -> bool {
    match (slot.from, slot.to) {
        (Some(from), Some(to)) => to >= from,
        _ => true,
    }
}

pub fn all_slots_valid(slots: &[TimeSlot]) -> bool {
    slots.iter().all(slot_valid)
}

/// Checks that no two slots share any minute. Touching boundaries overlap.
pub fn slots_non_overlapping(slots: &[TimeSlot]) -> bool {
    let mut ranges: Vec<(NaiveTime, NaiveTime)> = slots.iter().map(TimeSlot::filled).collect();
    ranges.sort_by_key(|(start, _)| *start);
    ranges
        .windows(2)
        .all(|pair| pair[1].0 > pair[0].1)
}

pub fn toggle_item(set: &mut BTreeSet<String>, item: &str) {
    if !set.remove(item) {
        set.insert(item.to_string());
    }
}

/// Clears a non-empty selection, otherwise selects everything in `all`.
pub fn toggle_all<'a, I>(set: &mut BTreeSet<String>, all: I)
where
    I: IntoIterator<Item = &'a String>,
{
    if set.is_empty() {
        set.extend(all.into_iter().cloned());
    } else {
        set.clear();
    }
}

pub fn selection_text(set: &BTreeSet<String>, plural: &str) -> String {
    let mut iter = set.iter();
    match set.len() {
        0 => String::new(),
        1 => iter.next().cloned().unwrap_or_default(),
        n => format!("{n} {plural} selected"),
    }
}

pub fn water_source_text(set: &BTreeSet<String>) -> String {
    let items: Vec<&String> = set.iter().collect();
    match items.as_slice() {
        [] => String::new(),
        [one] => (*one).clone(),
        [first, second] => format!("{first} and {second}"),
        _ => format!("{} water sources selected", items.len()),
    }
}

pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .ok()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()
}

pub fn format_time(value: Option<NaiveTime>) -> String {
    value
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default()
}

pub fn format_date(value: Option<NaiveDate>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Parses the compact slot form `"08:00-10:00;14:00-"`. Either end may be empty.
pub fn parse_time_slots(text: &str) -> Result<Vec<TimeSlot>, ValidationError> {
    let mut slots = Vec::new();
    for (idx, part) in text
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
    {
        let (from, to) = part.split_once('-').ok_or_else(|| {
            ValidationError::new(FilterField::TimeSlot(idx), format!("expected FROM-TO, got {part:?}"))
        })?;
        let from = parse_bound(from, idx)?;
        let to = parse_bound(to, idx)?;
        slots.push(TimeSlot::new(from, to));
    }
    if slots.len() > MAX_TIME_SLOTS {
        return Err(ValidationError::new(
            FilterField::TimeSlots,
            format!("up to {MAX_TIME_SLOTS} time slots are allowed"),
        ));
    }
    Ok(slots)
}

fn parse_bound(value: &str, idx: usize) -> Result<Option<NaiveTime>, ValidationError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    parse_time(value).map(Some).ok_or_else(|| {
        ValidationError::new(FilterField::TimeSlot(idx), format!("invalid time {:?}", value.trim()))
    })
}

pub fn format_time_slots(slots: &[TimeSlot]) -> String {
    slots
        .iter()
        .map(|slot| format!("{}-{}", format_time(slot.from), format_time(slot.to)))
        .collect::<Vec<_>>()
        .join(";")
}

impl FilterState {
    pub fn toggle_continent(&mut self, continent: &str) {
        toggle_item(&mut self.continents, continent);
    }

    pub fn toggle_country(&mut self, country: &str) {
        toggle_item(&mut self.countries, country);
    }

    pub fn toggle_water_source(&mut self, source: &str) {
        toggle_item(&mut self.water_sources, source);
    }

    pub fn add_slot(&mut self) -> bool {
        if self.time_slots.len() >= MAX_TIME_SLOTS {
            return false;
        }
        self.time_slots.push(TimeSlot::default());
        true
    }

    pub fn remove_slot(&mut self, index: usize) -> bool {
        if index >= self.time_slots.len() {
            return false;
        }
        self.time_slots.remove(index);
        true
    }

    pub fn reset(&mut self) {
        *self = FilterState::default();
        debug!("filters reset");
    }

    /// Runs every leaf validator, reporting the first offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.temperature.enabled
            && !temperature_range_valid(self.temperature.from, self.temperature.to)
        {
            return Err(ValidationError::new(
                FilterField::Temperature,
                "upper bound is below lower bound",
            ));
        }
        if !date_range_valid(self.date_range.from, self.date_range.to) {
            return Err(ValidationError::new(
                FilterField::DateRange,
                "end date is before start date",
            ));
        }
        if self.time_slots.len() > MAX_TIME_SLOTS {
            return Err(ValidationError::new(
                FilterField::TimeSlots,
                format!("up to {MAX_TIME_SLOTS} time slots are allowed"),
            ));
        }
        if let Some(idx) = self.time_slots.iter().position(|slot| !slot_valid(slot)) {
            return Err(ValidationError::new(
                FilterField::TimeSlot(idx),
                "end time is before start time",
            ));
        }
        if !slots_non_overlapping(&self.time_slots) {
            return Err(ValidationError::new(
                FilterField::TimeSlots,
                "time slots must not overlap",
            ));
        }
        Ok(())
    }

    /// Replaces the current state with a preset snapshot.
    pub fn apply_preset(&mut self, filters: &PresetFilters) {
        self.reset();
        if let Some(location) = &filters.location {
            self.continents = location.continents.iter().cloned().collect();
            self.countries = location.countries.iter().cloned().collect();
        }
        if let Some(measurements) = &filters.measurements {
            self.water_sources = measurements.water_sources.iter().cloned().collect();
            if let Some(temp) = &measurements.temperature {
                self.temperature = TemperatureFilter {
                    enabled: true,
                    from: temp.from,
                    to: temp.to,
                    unit: temp
                        .unit
                        .as_deref()
                        .map(TempUnit::from_str)
                        .unwrap_or_default(),
                };
            }
        }
        if let Some(range) = &filters.date_range {
            self.date_range = DateRange {
                from: range.from.as_deref().and_then(parse_date),
                to: range.to.as_deref().and_then(parse_date),
            };
        }
        if let Some(times) = &filters.times {
            self.time_slots = times
                .iter()
                .take(MAX_TIME_SLOTS)
                .map(|slot| {
                    TimeSlot::new(
                        slot.from.as_deref().and_then(parse_time),
                        slot.to.as_deref().and_then(parse_time),
                    )
                })
                .collect();
        }
        debug!(
            "preset applied continents={} countries={} slots={}",
            self.continents.len(),
            self.countries.len(),
            self.time_slots.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::PresetFilters;

    fn t(value: &str) -> Option<NaiveTime> {
        parse_time(value)
    }

    fn slot(from: &str, to: &str) -> TimeSlot {
        TimeSlot::new(t(from), t(to))
    }

    #[test]
    fn ranges_valid_when_a_bound_is_missing() {
        assert!(temperature_range_valid(None, Some(5.0)));
        assert!(temperature_range_valid(Some(5.0), None));
        assert!(temperature_range_valid(None, None));
        assert!(temperature_range_valid(5.0.into(), 5.0.into()));
        assert!(!temperature_range_valid(Some(10.0), Some(-2.5)));

        let jan = parse_date("2025-01-01");
        let dec = parse_date("2025-12-31");
        assert!(date_range_valid(jan, None));
        assert!(date_range_valid(jan, dec));
        assert!(!date_range_valid(dec, jan));
    }

    #[test]
    fn single_slot_validity() {
        assert!(slot_valid(&slot("08:00", "10:00")));
        assert!(slot_valid(&slot("08:00", "08:00")));
        assert!(slot_valid(&slot("", "10:00")));
        assert!(!slot_valid(&slot("10:00", "08:00")));
        assert!(all_slots_valid(&[]));
        assert!(!all_slots_valid(&[slot("08:00", "09:00"), slot("12:00", "11:00")]));
    }

    #[test]
    fn touching_slots_overlap() {
        assert!(!slots_non_overlapping(&[
            slot("08:00", "10:00"),
            slot("10:00", "12:00")
        ]));
        assert!(slots_non_overlapping(&[
            slot("08:00", "09:59"),
            slot("10:00", "12:00")
        ]));
    }

    #[test]
    fn overlap_ignores_input_order() {
        assert!(slots_non_overlapping(&[
            slot("14:00", "15:00"),
            slot("06:00", "07:00"),
            slot("09:00", "10:00"),
        ]));
        assert!(!slots_non_overlapping(&[
            slot("09:30", "11:00"),
            slot("08:00", "10:00"),
        ]));
    }

    #[test]
    fn open_ended_slot_spans_the_day() {
        assert!(slots_non_overlapping(&[slot("", "")]));
        assert!(!slots_non_overlapping(&[slot("13:00", ""), slot("20:00", "21:00")]));
        assert!(!slots_non_overlapping(&[slot("", "08:00"), slot("07:00", "07:30")]));
        assert!(slots_non_overlapping(&[slot("", "08:00"), slot("08:01", "")]));
    }

    #[test]
    fn add_slot_caps_at_three() {
        let mut state = FilterState::default();
        assert!(state.add_slot());
        assert!(state.add_slot());
        assert!(state.add_slot());
        assert!(!state.add_slot());
        assert_eq!(state.time_slots.len(), MAX_TIME_SLOTS);
        assert!(state.remove_slot(1));
        assert!(!state.remove_slot(5));
        assert_eq!(state.time_slots.len(), 2);
    }

    #[test]
    fn validate_names_offending_field() {
        let mut state = FilterState::default();
        state.temperature = TemperatureFilter {
            enabled: false,
            from: Some(30.0),
            to: Some(10.0),
            unit: TempUnit::Celsius,
        };
        assert!(state.validate().is_ok());

        state.temperature.enabled = true;
        assert_eq!(state.validate().unwrap_err().field, FilterField::Temperature);

        state.temperature.to = Some(40.0);
        state.time_slots = vec![slot("08:00", "09:00"), slot("12:00", "11:00")];
        assert_eq!(state.validate().unwrap_err().field, FilterField::TimeSlot(1));

        state.time_slots = vec![slot("08:00", "10:00"), slot("10:00", "11:00")];
        assert_eq!(state.validate().unwrap_err().field, FilterField::TimeSlots);

        state.time_slots.clear();
        state.date_range = DateRange {
            from: parse_date("2025-02-01"),
            to: parse_date("2025-01-01"),
        };
        assert_eq!(state.validate().unwrap_err().field, FilterField::DateRange);
    }

    #[test]
    fn toggles_and_toggle_all() {
        let mut state = FilterState::default();
        state.toggle_continent("Europe");
        state.toggle_continent("Asia");
        state.toggle_continent("Europe");
        assert_eq!(state.continents.iter().collect::<Vec<_>>(), vec!["Asia"]);

        let all: Vec<String> = WATER_SOURCES.iter().map(|s| s.to_string()).collect();
        toggle_all(&mut state.water_sources, &all);
        assert_eq!(state.water_sources.len(), 4);
        toggle_all(&mut state.water_sources, &all);
        assert!(state.water_sources.is_empty());
    }

    #[test]
    fn selection_texts() {
        let mut set = BTreeSet::new();
        assert_eq!(selection_text(&set, "continents"), "");
        set.insert("Europe".to_string());
        assert_eq!(selection_text(&set, "continents"), "Europe");
        set.insert("Asia".to_string());
        assert_eq!(selection_text(&set, "continents"), "2 continents selected");

        let mut sources = BTreeSet::new();
        sources.insert("Well".to_string());
        sources.insert("Other".to_string());
        assert_eq!(water_source_text(&sources), "Other and Well");
        sources.insert("Network".to_string());
        assert_eq!(water_source_text(&sources), "3 water sources selected");
    }

    #[test]
    fn slot_text_form() {
        let slots = parse_time_slots("-08:00;10:00-12:00;13:00-").unwrap();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].from, None);
        assert_eq!(slots[0].to, t("08:00"));
        assert_eq!(slots[2].to, None);
        assert_eq!(format_time_slots(&slots), "-08:00;10:00-12:00;13:00-");

        let too_many = "00:00-00:30;01:00-01:30;02:00-02:30;03:00-03:30";
        assert_eq!(
            parse_time_slots(too_many).unwrap_err().field,
            FilterField::TimeSlots
        );
        assert!(parse_time_slots("bad-format").is_err());
        assert!(parse_time_slots("").unwrap().is_empty());
    }

    #[test]
    fn apply_preset_resets_then_fills() {
        let filters: PresetFilters = serde_json::from_str(
            r#"{
                "location": {"continents": ["Europe"], "countries": ["Netherlands"]},
                "measurements": {
                    "waterSources": ["Well"],
                    "temperature": {"from": 5, "to": "15", "unit": "F"}
                },
                "dateRange": {"from": "2025-01-01", "to": null},
                "times": [{"from": "08:00", "to": "10:00"}, {"from": "", "to": "15:00"}]
            }"#,
        )
        .unwrap();

        let mut state = FilterState::default();
        state.toggle_country("Spain");
        state.add_slot();
        state.apply_preset(&filters);

        assert!(state.countries.contains("Netherlands"));
        assert!(!state.countries.contains("Spain"));
        assert!(state.water_sources.contains("Well"));
        assert!(state.temperature.enabled);
        assert_eq!(state.temperature.from, Some(5.0));
        assert_eq!(state.temperature.to, Some(15.0));
        assert_eq!(state.temperature.unit, TempUnit::Fahrenheit);
        assert_eq!(state.date_range.from, parse_date("2025-01-01"));
        assert_eq!(state.date_range.to, None);
        assert_eq!(state.time_slots.len(), 2);
        assert_eq!(state.time_slots[1].from, None);
    }
}
