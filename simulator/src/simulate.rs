use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;

use crate::types::{GeoBounds, LocationData, NamedRange, NumericRange, Reading, ValueSpec};

/// Returned for an enum spec with no candidates.
pub const UNKNOWN_VALUE: &str = "unknown";

/// Decimals beyond this are not representable in an `f64` reading anyway.
pub const MAX_PRECISION: u32 = 15;

/// Draws one reading for `spec` using the thread-local generator.
pub fn generate_value(spec: &ValueSpec) -> Reading {
    generate_value_with(spec, &mut rand::thread_rng())
}

pub fn generate_value_with<R: Rng + ?Sized>(spec: &ValueSpec, rng: &mut R) -> Reading {
    match spec {
        ValueSpec::Enum { values } => pick_choice(values, rng),
        ValueSpec::Range(range) => Reading::Number(draw_in_range(range, rng)),
        ValueSpec::Composite { parts } => Reading::Composite(draw_composite(parts, rng)),
        ValueSpec::Area(bounds) => Reading::Location(draw_in_area(bounds, rng)),
    }
}

fn pick_choice<R: Rng + ?Sized>(values: &[Value], rng: &mut R) -> Reading {
    match values.choose(rng) {
        Some(value) => Reading::Choice(value.clone()),
        None => Reading::Choice(Value::String(UNKNOWN_VALUE.to_string())),
    }
}

fn draw_in_range<R: Rng + ?Sized>(range: &NumericRange, rng: &mut R) -> f64 {
    round_within(uniform(rng, range.min, range.max), range)
}

/// Rounds to the configured decimals without leaving `[min, max]`.
pub(crate) fn round_within(value: f64, range: &NumericRange) -> f64 {
    let factor = 10f64.powi(range.precision.min(MAX_PRECISION) as i32);
    let (lo, hi) = (range.min.min(range.max), range.min.max(range.max));
    let rounded = (value * factor).round() / factor;
    let snapped = if rounded > hi {
        (value * factor).floor() / factor
    } else if rounded < lo {
        (value * factor).ceil() / factor
    } else {
        rounded
    };
    snapped.max(lo).min(hi)
}

fn draw_composite<R: Rng + ?Sized>(parts: &[NamedRange], rng: &mut R) -> BTreeMap<String, i64> {
    parts
        .iter()
        .map(|part| (part.name.clone(), uniform_int(rng, part.min, part.max)))
        .collect()
}

// Bounds may arrive unordered from deserialized configs.
fn uniform_int<R: Rng + ?Sized>(rng: &mut R, a: i64, b: i64) -> i64 {
    rng.gen_range(a.min(b)..=a.max(b))
}

fn draw_in_area<R: Rng + ?Sized>(bounds: &GeoBounds, rng: &mut R) -> LocationData {
    LocationData {
        latitude: uniform(rng, bounds.lat_min, bounds.lat_max),
        longitude: uniform(rng, bounds.lon_min, bounds.lon_max),
        accuracy: rng.gen_range(10.0..=30.0),
    }
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, a: f64, b: f64) -> f64 {
    if a < b {
        rng.gen_range(a..=b)
    } else if b < a {
        rng.gen_range(b..=a)
    } else {
        a
    }
}
