//! Built-in value ranges for the data types the fleet knows about.
//!
//! Used when a stored config row carries no usable sample configuration.

use serde_json::{json, Value};

use crate::types::{GeoBounds, NumericRange, ValueSpec};

pub fn default_spec(data_type: &str) -> ValueSpec {
    match data_type {
        "heart_rate" => range(60.0, 100.0),
        "temperature" => range(36.0, 42.0),
        "oxygen_saturation" => range(90.0, 100.0),
        "movement" | "activity" => range(0.0, 100.0),
        "duration" => range(0.0, 1440.0),
        "bmi" => ValueSpec::Range(NumericRange::new(18.5, 30.0, 1)),
        "orientation" => range(0.0, 360.0),
        "door_status" => choices(&[json!("open"), json!("closed")]),
        "movement_detected" | "presence" => choices(&[json!(true), json!(false)]),
        "bed_occupancy" | "seat_occupancy" => choices(&[json!("occupied"), json!("vacant")]),
        "blood_pressure" => ValueSpec::blood_pressure((110, 130), (70, 85)),
        "gps" | "location" => ValueSpec::Area(GeoBounds::default()),
        _ => range(0.0, 100.0),
    }
}

fn range(min: f64, max: f64) -> ValueSpec {
    ValueSpec::Range(NumericRange::new(min, max, 0))
}

fn choices(values: &[Value]) -> ValueSpec {
    ValueSpec::Enum {
        values: values.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types_have_specific_specs() {
        assert_eq!(default_spec("heart_rate"), range(60.0, 100.0));
        assert!(matches!(default_spec("presence"), ValueSpec::Enum { .. }));
        assert!(matches!(default_spec("gps"), ValueSpec::Area(_)));
        assert!(matches!(default_spec("blood_pressure"), ValueSpec::Composite { .. }));
    }

    #[test]
    fn unknown_type_falls_back_to_percent_range() {
        assert_eq!(default_spec("mystery"), range(0.0, 100.0));
    }
}
