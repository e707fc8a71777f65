//! Apparent solar time.
//!
//! Low-order solar position model, accurate to well under a minute for
//! dates within a few centuries of J2000.0.

use chrono::{DateTime, Utc};

/// J2000.0 epoch, 2000-01-01T12:00:00Z, in Unix seconds.
const J2000_UNIX_SECONDS: f64 = 946_728_000.;

/// Seconds in a mean solar day.
pub const DAY_SECONDS: f64 = 86_400.;

/// Seconds of mean solar time per degree of longitude.
pub const SECONDS_PER_DEGREE: f64 = 240.;

/// Length of the anomalistic year in days.
const ANOMALISTIC_YEAR: f64 = 365.259_636;

/// Length of the tropical year in days.
const TROPICAL_YEAR: f64 = 365.242_190;

/// Mean anomaly at J2000.0 in degrees.
const MEAN_ANOMALY_EPOCH: f64 = 357.529;

/// Mean longitude at J2000.0 in degrees.
const MEAN_LONGITUDE_EPOCH: f64 = 280.459;

/// Obliquity of the ecliptic at J2000.0 in degrees.
const OBLIQUITY_EPOCH: f64 = 23.439;

/// Obliquity drift per day in degrees.
const OBLIQUITY_RATE: f64 = 0.000_000_36;

/// Equation of time in seconds.
///
/// Positive values mean the sundial is ahead of mean time.
pub fn equation_of_time(time: DateTime<Utc>) -> f64 {
    let days = (unix_seconds(time) - J2000_UNIX_SECONDS) / DAY_SECONDS;

    let mean_anomaly = (MEAN_ANOMALY_EPOCH + 360. / ANOMALISTIC_YEAR * days).rem_euclid(360.);
    let mean_longitude = (MEAN_LONGITUDE_EPOCH + 360. / TROPICAL_YEAR * days).rem_euclid(360.);

    // Correct for the orbit's eccentricity.
    let anomaly = mean_anomaly.to_radians();
    let ecliptic_longitude =
        (mean_longitude + 1.915 * anomaly.sin() + 0.020 * (2. * anomaly).sin()).to_radians();

    let obliquity = (OBLIQUITY_EPOCH - OBLIQUITY_RATE * days).to_radians();
    let right_ascension = (obliquity.cos() * ecliptic_longitude.sin())
        .atan2(ecliptic_longitude.cos())
        .to_degrees();

    // Wrap the difference to the shortest signed angle.
    let difference = (mean_longitude - right_ascension + 180.).rem_euclid(360.) - 180.;
    difference * SECONDS_PER_DEGREE
}

/// Fraction of the apparent solar day elapsed at a longitude.
///
/// The result is in `[0, 1)`, with 0 at solar midnight.
pub fn day_fraction(time: DateTime<Utc>, longitude: f64) -> f64 {
    let seconds =
        unix_seconds(time) + longitude * SECONDS_PER_DEGREE + equation_of_time(time);
    let fraction = (seconds / DAY_SECONDS).rem_euclid(1.);

    if fraction >= 1. { 0. } else { fraction }
}

/// Unix time with millisecond precision.
pub fn unix_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_millis() as f64 / 1000.
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn equation_of_time_extremes() {
        // Early November the sundial runs about 16 minutes fast.
        let november = Utc.with_ymd_and_hms(2024, 11, 3, 12, 0, 0).unwrap();
        let minutes = equation_of_time(november) / 60.;
        assert!((15.5..17.).contains(&minutes), "{minutes}");

        // Mid February it runs about 14 minutes slow.
        let february = Utc.with_ymd_and_hms(2024, 2, 11, 12, 0, 0).unwrap();
        let minutes = equation_of_time(february) / 60.;
        assert!((-15. ..-13.5).contains(&minutes), "{minutes}");
    }

    #[test]
    fn fraction_in_range() {
        let time = Utc.with_ymd_and_hms(2024, 6, 21, 0, 0, 0).unwrap();
        for longitude in [-180., -75.5, 0., 2.337, 179.9] {
            let fraction = day_fraction(time, longitude);
            assert!((0. ..1.).contains(&fraction), "{fraction}");
        }
    }

    #[test]
    fn longitude_shifts_fraction() {
        let time = Utc.with_ymd_and_hms(2024, 4, 1, 6, 0, 0).unwrap();
        let greenwich = day_fraction(time, 0.);
        let east = day_fraction(time, 90.);
        assert!((east - greenwich - 0.25).abs() < 1e-9);
    }
}
