use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::filters::{format_date, format_time, FilterState};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Csv,
    Xml,
    Json,
    GeoJson,
    /// Aggregated points for the hex map; never written to disk.
    MapFormat,
}

impl ExportFormat {
    pub const DOWNLOADABLE: [ExportFormat; 4] = [
        ExportFormat::Csv,
        ExportFormat::Xml,
        ExportFormat::Json,
        ExportFormat::GeoJson,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xml => "xml",
            ExportFormat::Json => "json",
            ExportFormat::GeoJson => "geojson",
            ExportFormat::MapFormat => "map-format",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "xml" => Some(ExportFormat::Xml),
            "json" => Some(ExportFormat::Json),
            "geojson" => Some(ExportFormat::GeoJson),
            "map-format" | "map" => Some(ExportFormat::MapFormat),
            _ => None,
        }
    }

    pub fn is_downloadable(self) -> bool {
        self != ExportFormat::MapFormat
    }

    /// Next downloadable format, wrapping around.
    pub fn next(self) -> Self {
        match self {
            ExportFormat::Csv => ExportFormat::Xml,
            ExportFormat::Xml => ExportFormat::Json,
            ExportFormat::Json => ExportFormat::GeoJson,
            ExportFormat::GeoJson | ExportFormat::MapFormat => ExportFormat::Csv,
        }
    }
}

/// Canonical key/value form of a filter state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FlatQuery(BTreeMap<String, String>);

impl FlatQuery {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn format(&self) -> Option<ExportFormat> {
        self.get("format").and_then(ExportFormat::from_str)
    }

    pub fn with_format(&self, format: ExportFormat) -> FlatQuery {
        let mut next = self.clone();
        next.insert("format", format.as_str().to_string());
        next
    }

    fn insert(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }

    /// Joins with `,`. A `,` or `%` inside a value is percent-escaped so that
    /// distinct sets never flatten to the same string.
    fn insert_set(&mut self, key: &str, values: &BTreeSet<String>) {
        if !values.is_empty() {
            let joined = values
                .iter()
                .map(|value| escape_list_item(value))
                .collect::<Vec<_>>()
                .join(",");
            self.insert(key, joined);
        }
    }
}

fn escape_list_item(value: &str) -> String {
    if !value.contains([',', '%']) {
        return value.to_string();
    }
    value.replace('%', "%25").replace(',', "%2C")
}

pub fn flatten(state: &FilterState, format: ExportFormat) -> FlatQuery {
    let mut query = FlatQuery::default();
    query.insert_set("continents", &state.continents);
    query.insert_set("countries", &state.countries);
    query.insert_set("waterSources", &state.water_sources);

    if state.temperature.enabled {
        if let Some(from) = state.temperature.from {
            query.insert("tempFrom", from.to_string());
        }
        if let Some(to) = state.temperature.to {
            query.insert("tempTo", to.to_string());
        }
        query.insert("tempUnit", state.temperature.unit.label().to_string());
    }

    if state.date_range.from.is_some() {
        query.insert("dateFrom", format_date(state.date_range.from));
    }
    if state.date_range.to.is_some() {
        query.insert("dateTo", format_date(state.date_range.to));
    }

    for (idx, slot) in state.time_slots.iter().enumerate() {
        if slot.from.is_some() {
            query.insert(&format!("timeSlot[{idx}][from]"), format_time(slot.from));
        }
        if slot.to.is_some() {
            query.insert(&format!("timeSlot[{idx}][to]"), format_time(slot.to));
        }
    }

    query.insert("format", format.as_str().to_string());
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{parse_date, parse_time, TempUnit, TimeSlot};

    #[test]
    fn empty_state_only_carries_format() {
        let query = flatten(&FilterState::default(), ExportFormat::GeoJson);
        assert_eq!(query.len(), 1);
        assert_eq!(query.get("format"), Some("geojson"));
    }

    #[test]
    fn multi_values_are_sorted_and_joined() {
        let mut state = FilterState::default();
        state.toggle_country("Spain");
        state.toggle_country("France");
        state.toggle_water_source("Well");
        state.toggle_water_source("Rooftop Tank");
        let query = flatten(&state, ExportFormat::Csv);
        assert_eq!(query.get("countries"), Some("France,Spain"));
        assert_eq!(query.get("waterSources"), Some("Rooftop Tank,Well"));
        assert!(!query.contains_key("continents"));
    }

    #[test]
    fn commas_inside_values_stay_distinct() {
        let mut joined = FilterState::default();
        joined.toggle_country("A,B");
        let mut split = FilterState::default();
        split.toggle_country("A");
        split.toggle_country("B");
        let joined = flatten(&joined, ExportFormat::Csv);
        let split = flatten(&split, ExportFormat::Csv);
        assert_eq!(joined.get("countries"), Some("A%2CB"));
        assert_eq!(split.get("countries"), Some("A,B"));
        assert_ne!(joined, split);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut a = FilterState::default();
        a.toggle_continent("Asia");
        a.toggle_continent("Europe");
        let mut b = FilterState::default();
        b.toggle_continent("Europe");
        b.toggle_continent("Asia");
        assert_eq!(flatten(&a, ExportFormat::Csv), flatten(&b, ExportFormat::Csv));
    }

    #[test]
    fn temperature_only_when_enabled() {
        let mut state = FilterState::default();
        state.temperature.from = Some(5.0);
        state.temperature.to = Some(12.5);
        assert!(!flatten(&state, ExportFormat::Csv).contains_key("tempFrom"));

        state.temperature.enabled = true;
        state.temperature.unit = TempUnit::Fahrenheit;
        let query = flatten(&state, ExportFormat::Csv);
        assert_eq!(query.get("tempFrom"), Some("5"));
        assert_eq!(query.get("tempTo"), Some("12.5"));
        assert_eq!(query.get("tempUnit"), Some("F"));
    }

    #[test]
    fn dates_and_slots_use_only_set_bounds() {
        let mut state = FilterState::default();
        state.date_range.from = parse_date("2025-03-01");
        state.time_slots = vec![
            TimeSlot::new(parse_time("08:00"), parse_time("10:00")),
            TimeSlot::new(None, parse_time("13:30")),
        ];
        let query = flatten(&state, ExportFormat::Json);
        assert_eq!(query.get("dateFrom"), Some("2025-03-01"));
        assert!(!query.contains_key("dateTo"));
        assert_eq!(query.get("timeSlot[0][from]"), Some("08:00"));
        assert_eq!(query.get("timeSlot[0][to]"), Some("10:00"));
        assert!(!query.contains_key("timeSlot[1][from]"));
        assert_eq!(query.get("timeSlot[1][to]"), Some("13:30"));
    }

    #[test]
    fn with_format_swaps_only_format() {
        let mut state = FilterState::default();
        state.toggle_continent("Africa");
        let query = flatten(&state, ExportFormat::Csv);
        let swapped = query.with_format(ExportFormat::Xml);
        assert_eq!(swapped.get("format"), Some("xml"));
        assert_eq!(swapped.get("continents"), Some("Africa"));
        assert_eq!(swapped.format(), Some(ExportFormat::Xml));
        assert_eq!(swapped, flatten(&state, ExportFormat::Xml));
    }

    #[test]
    fn format_cycle_skips_map_format() {
        let mut format = ExportFormat::Csv;
        for _ in 0..8 {
            format = format.next();
            assert!(format.is_downloadable());
        }
        assert_eq!(ExportFormat::MapFormat.next(), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_str("GeoJSON"), Some(ExportFormat::GeoJson));
        assert_eq!(ExportFormat::from_str("pdf"), None);
    }
}
