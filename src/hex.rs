//! Hexagonal binning of aggregated measurement points.
//!
//! Points are projected to Web-Mercator pixels at the current zoom and snapped
//! to a flat-top hexagon grid. Each cell's statistics come from [`aggregate`].

use std::collections::BTreeMap;
use std::f64::consts::PI;

use tracing::error;

use crate::error::EmptyBin;
use crate::model::AggregatedPoint;

const TILE_SIZE: f64 = 256.0;
const MAX_LATITUDE: f64 = 85.051_128_78;
const SQRT3: f64 = 1.732_050_807_568_877_2;

/// Default legend domain in degrees Celsius.
pub const LEGEND_DOMAIN: (f64, f64) = (0.0, 40.0);
pub const LEGEND_STEPS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasurementPoint {
    pub temperature: f64,
    pub min: f64,
    pub max: f64,
    pub count: u64,
}

impl MeasurementPoint {
    pub fn new(temperature: f64, min: f64, max: f64, count: u64) -> Self {
        Self {
            temperature,
            min,
            max,
            count,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BinSummary {
    pub count: u64,
    pub avg_temp: f64,
    pub min: f64,
    pub max: f64,
}

/// Count-weighted mean with min of mins and max of maxes.
pub fn aggregate(points: &[MeasurementPoint]) -> Result<BinSummary, EmptyBin> {
    if points.is_empty() {
        return Err(EmptyBin);
    }
    let mut count = 0u64;
    let mut weighted = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for point in points {
        count += point.count;
        weighted += point.temperature * point.count as f64;
        min = min.min(point.min);
        max = max.max(point.max);
    }
    if count == 0 {
        return Err(EmptyBin);
    }
    Ok(BinSummary {
        count,
        avg_temp: weighted / count as f64,
        min,
        max,
    })
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn format_summary(summary: &BinSummary) -> String {
    format!(
        "{} measurements, avg {:.1}°C (min {:.1}, max {:.1})",
        summary.count,
        round1(summary.avg_temp),
        round1(summary.min),
        round1(summary.max)
    )
}

/// Hexagon size in pixels for a map zoom level.
pub fn hexagon_size(zoom: u8) -> f64 {
    16f64.max(2f64.powi(i32::from(zoom) - 6))
}

/// Web-Mercator world pixel for a coordinate.
pub fn project(lat: f64, lon: f64, zoom: u8) -> (f64, f64) {
    let scale = TILE_SIZE * 2f64.powi(i32::from(zoom));
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (lon + 180.0) / 360.0 * scale;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * scale;
    (x, y)
}

pub fn unproject(x: f64, y: f64, zoom: u8) -> (f64, f64) {
    let scale = TILE_SIZE * 2f64.powi(i32::from(zoom));
    let lon = x / scale * 360.0 - 180.0;
    let n = PI - 2.0 * PI * y / scale;
    let lat = n.sinh().atan().to_degrees();
    (lat, lon)
}

/// Flat-top cell in even-q offset coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HexCell {
    pub col: i64,
    pub row: i64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellCenter {
    pub lat: f64,
    pub lon: f64,
}

/// Snaps a world pixel to its hexagon and returns the cell with its center pixel.
pub fn cell_for_pixel(x: f64, y: f64, size: f64) -> (HexCell, (f64, f64)) {
    let xs = x / size;
    let ys = y / size;
    let t = (ys + SQRT3 * xs + 1.0).floor();
    let cell_y = (((2.0 * ys + 1.0).floor() + t) / 3.0).floor();
    let cell_x = ((t + (-ys + SQRT3 * xs + 1.0).floor()) / 3.0).floor();

    let cy = (cell_y - cell_x / 2.0) * size;
    let cx = cell_x / 2.0 * SQRT3 * size;
    let col = cell_x as i64;
    let row = cell_y as i64 - col.div_euclid(2);
    (HexCell { col, row }, (cx, cy))
}

#[derive(Clone, Debug, PartialEq)]
pub struct HexBin {
    pub cell: HexCell,
    pub center: CellCenter,
    pub summary: BinSummary,
}

impl HexBin {
    pub fn legend_step(&self) -> usize {
        legend_step(self.summary.avg_temp, LEGEND_DOMAIN)
    }
}

/// Converts a server point, rejecting ones without a position or count.
pub fn measurement_point(point: &AggregatedPoint) -> Option<(f64, f64, MeasurementPoint)> {
    let lat = point.location.latitude?;
    let lon = point.location.longitude?;
    let count = point.count.filter(|count| *count > 0)?;
    let temperature = point.avg_temperature?;
    Some((
        lat,
        lon,
        MeasurementPoint::new(
            temperature,
            point.min_temperature.unwrap_or(temperature),
            point.max_temperature.unwrap_or(temperature),
            count,
        ),
    ))
}

/// Groups points into hexagons at `zoom`. Output is ordered by cell.
pub fn bin_points(points: &[AggregatedPoint], zoom: u8) -> Vec<HexBin> {
    let size = hexagon_size(zoom);
    let mut cells: BTreeMap<HexCell, ((f64, f64), Vec<MeasurementPoint>)> = BTreeMap::new();
    for point in points {
        let Some((lat, lon, measurement)) = measurement_point(point) else {
            continue;
        };
        let (x, y) = project(lat, lon, zoom);
        let (cell, center) = cell_for_pixel(x, y, size);
        cells
            .entry(cell)
            .or_insert_with(|| (center, Vec::new()))
            .1
            .push(measurement);
    }

    let mut bins = Vec::with_capacity(cells.len());
    for (cell, ((cx, cy), members)) in cells {
        match aggregate(&members) {
            Ok(summary) => {
                let (lat, lon) = unproject(cx, cy, zoom);
                bins.push(HexBin {
                    cell,
                    center: CellCenter { lat, lon },
                    summary,
                });
            }
            Err(err) => error!("hex cell {:?}: {err}", cell),
        }
    }
    bins
}

/// Bucket of the legend colour ramp, clamped to the domain.
pub fn legend_step(value: f64, domain: (f64, f64)) -> usize {
    let (lo, hi) = domain;
    if !value.is_finite() || hi <= lo {
        return 0;
    }
    let ratio = ((value - lo) / (hi - lo)).clamp(0.0, 1.0);
    ((ratio * LEGEND_STEPS as f64) as usize).min(LEGEND_STEPS - 1)
}
