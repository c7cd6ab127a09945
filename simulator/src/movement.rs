//! Stateful GPS trace that wanders between a subject's geofence places.
//!
//! The simulator dwells at a place for a few minutes, jittering inside its
//! geofence, then walks toward another randomly chosen place along the
//! great-circle bearing until it arrives and starts dwelling again.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::types::{GeofencePlace, LocationData};

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
/// Roughly 15 km/h.
pub const SPEED_METERS_PER_MINUTE: f64 = 250.0;
pub const ARRIVAL_RADIUS_METERS: f64 = 50.0;

const MIN_JITTER_METERS: f64 = 10.0;
const JITTER_RADIUS_FRACTION: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementPhase {
    Dwelling,
    Transitioning,
}

#[derive(Debug)]
pub struct MovementSimulator {
    places: Vec<GeofencePlace>,
    current: usize,
    destination: Option<usize>,
    latitude: f64,
    longitude: f64,
    minutes_at_place: i64,
    dwell_budget: i64,
    last_update: Instant,
    rng: StdRng,
}

impl MovementSimulator {
    /// Returns `None` when there is nowhere to be.
    pub fn new(places: Vec<GeofencePlace>) -> Option<Self> {
        Self::with_rng(places, Instant::now(), StdRng::from_entropy())
    }

    pub fn with_rng(places: Vec<GeofencePlace>, now: Instant, mut rng: StdRng) -> Option<Self> {
        let first = places.first()?;
        let (latitude, longitude) = (first.latitude, first.longitude);
        let dwell_budget = rng.gen_range(2..=5);
        info!(
            place = %first.name,
            place_type = %first.place_type,
            dwell_minutes = dwell_budget,
            "movement starts dwelling"
        );
        Some(Self {
            places,
            current: 0,
            destination: None,
            latitude,
            longitude,
            minutes_at_place: 0,
            dwell_budget,
            last_update: now,
            rng,
        })
    }

    /// Elapsed time follows the tokio clock, so paused runtimes drive it too.
    pub fn next_location(&mut self) -> LocationData {
        self.advance_to(Instant::now())
    }

    /// Advances the simulation to `now` and returns the resulting fix.
    pub fn advance_to(&mut self, now: Instant) -> LocationData {
        let minutes = (now.saturating_duration_since(self.last_update).as_secs() / 60).max(1) as i64;
        self.last_update = now;
        self.minutes_at_place += minutes;

        if self.minutes_at_place >= self.dwell_budget && self.places.len() > 1 {
            let destination = match self.destination {
                Some(index) => index,
                None => self.depart(),
            };
            self.step_toward(destination, minutes);
        } else {
            self.jitter();
        }

        LocationData {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.rng.gen_range(5.0..=25.0),
        }
    }

    pub fn phase(&self) -> MovementPhase {
        if self.destination.is_some() {
            MovementPhase::Transitioning
        } else {
            MovementPhase::Dwelling
        }
    }

    pub fn current_place(&self) -> &GeofencePlace {
        &self.places[self.current]
    }

    pub fn destination(&self) -> Option<&GeofencePlace> {
        self.destination.map(|index| &self.places[index])
    }

    pub fn position(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    pub fn minutes_at_place(&self) -> i64 {
        self.minutes_at_place
    }

    pub fn dwell_budget(&self) -> i64 {
        self.dwell_budget
    }

    fn depart(&mut self) -> usize {
        // Uniform over every index except the current one.
        let mut index = self.rng.gen_range(0..self.places.len() - 1);
        if index >= self.current {
            index += 1;
        }
        self.destination = Some(index);

        let (from, to) = (&self.places[self.current], &self.places[index]);
        let distance = haversine_distance(self.latitude, self.longitude, to.latitude, to.longitude);
        info!(
            from = %from.name,
            to = %to.name,
            distance_m = distance.round(),
            eta_minutes = (distance / SPEED_METERS_PER_MINUTE).ceil(),
            "movement leaving place"
        );
        index
    }

    fn step_toward(&mut self, index: usize, minutes: i64) {
        let (dest_lat, dest_lon) = (self.places[index].latitude, self.places[index].longitude);
        let distance = haversine_distance(self.latitude, self.longitude, dest_lat, dest_lon);
        let reach = SPEED_METERS_PER_MINUTE * minutes as f64;

        if distance > reach {
            let bearing = initial_bearing(self.latitude, self.longitude, dest_lat, dest_lon);
            (self.latitude, self.longitude) =
                destination_point(self.latitude, self.longitude, bearing, reach);
        } else {
            (self.latitude, self.longitude) = (dest_lat, dest_lon);
        }

        let remaining = haversine_distance(self.latitude, self.longitude, dest_lat, dest_lon);
        if remaining < ARRIVAL_RADIUS_METERS {
            self.arrive(index);
        } else {
            debug!(remaining_m = remaining.round(), "movement in transit");
        }
    }

    fn arrive(&mut self, index: usize) {
        let place = &self.places[index];
        self.current = index;
        self.destination = None;
        self.latitude = place.latitude;
        self.longitude = place.longitude;
        self.minutes_at_place = 0;
        self.dwell_budget = self.rng.gen_range(2..=6);
        info!(
            place = %place.name,
            place_type = %place.place_type,
            dwell_minutes = self.dwell_budget,
            "movement arrived at place"
        );
    }

    fn jitter(&mut self) {
        let place = &self.places[self.current];
        let max_offset = (place.radius_meters * JITTER_RADIUS_FRACTION).max(MIN_JITTER_METERS);
        let (center_lat, center_lon) = (place.latitude, place.longitude);
        let distance = self.rng.gen_range(0.0..max_offset);
        let bearing = self.rng.gen_range(0.0..360.0);
        (self.latitude, self.longitude) = destination_point(center_lat, center_lon, bearing, distance);
    }
}

/// Great-circle distance in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Initial bearing in degrees, normalized to [0, 360).
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_lambda = (lon2 - lon1).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

pub fn destination_point(lat: f64, lon: f64, bearing_deg: f64, meters: f64) -> (f64, f64) {
    let phi1 = lat.to_radians();
    let lambda1 = lon.to_radians();
    let theta = bearing_deg.to_radians();
    let delta = meters / EARTH_RADIUS_METERS;

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());
    (phi2.to_degrees(), lambda2.to_degrees())
}
