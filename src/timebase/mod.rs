//! Conversion from civil time to clock hand positions.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::Error;
use crate::geometry::{FULL_TURN, normalize_degrees};
use crate::timebase::solar::{DAY_SECONDS, SECONDS_PER_DEGREE};

pub mod solar;

/// Offset of the Paris meridian from Greenwich in seconds.
const PARIS_MERIDIAN_SECONDS: f64 = 560.921;

/// Heartbeat interval for sexagesimal faces.
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Heartbeat interval for decimal faces, 1/16th of a decimal second.
const DECIMAL_TICK_INTERVAL: Duration = Duration::from_millis(54);

/// Heartbeat interval for hexadecimal faces.
const HEXADECIMAL_TICK_INTERVAL: Duration = Duration::from_millis(60);

/// Counting system of a clock face.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, Debug)]
pub enum NumberingBase {
    /// Twelve hour dial with sixty minutes and seconds.
    #[default]
    Sexagesimal,
    /// Twenty-four hour dial with sixty minutes and seconds.
    TwentyFour,
    /// French revolutionary time: 10 hours of 100 minutes of 100 seconds.
    Decimal,
    /// 16 hours of 16 maximes of 16 minutes of 16 seconds.
    Hexadecimal,
}

impl NumberingBase {
    /// Conversion strategy for this base.
    pub fn strategy(&self) -> &'static dyn TimeBase {
        match self {
            Self::Sexagesimal => &Sexagesimal,
            Self::TwentyFour => &TwentyFour,
            Self::Decimal => &Decimal,
            Self::Hexadecimal => &Hexadecimal,
        }
    }

    /// Configuration name of the base.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sexagesimal => "sexagesimal",
            Self::TwentyFour => "24",
            Self::Decimal => "decimal",
            Self::Hexadecimal => "hexadecimal",
        }
    }
}

impl FromStr for NumberingBase {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "sexagesimal" => Ok(Self::Sexagesimal),
            "24" => Ok(Self::TwentyFour),
            "decimal" => Ok(Self::Decimal),
            "hexadecimal" => Ok(Self::Hexadecimal),
            _ => Err(Error::UnknownBase(name.into())),
        }
    }
}

impl Display for NumberingBase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Deserialize a numbering base from its name, or the number 24.
impl<'de> Deserialize<'de> for NumberingBase {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BaseVisitor;

        impl Visitor<'_> for BaseVisitor {
            type Value = NumberingBase;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("one of \"sexagesimal\", \"24\", \"decimal\" or \"hexadecimal\"")
            }

            fn visit_str<E>(self, value: &str) -> Result<NumberingBase, E>
            where
                E: de::Error,
            {
                value.parse().map_err(E::custom)
            }

            fn visit_i64<E>(self, value: i64) -> Result<NumberingBase, E>
            where
                E: de::Error,
            {
                value.to_string().parse().map_err(E::custom)
            }

            fn visit_u64<E>(self, value: u64) -> Result<NumberingBase, E>
            where
                E: de::Error,
            {
                value.to_string().parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(BaseVisitor)
    }
}

/// Time reference of a clock face.
#[derive(Copy, Clone, Default, PartialEq, Debug)]
pub struct Reckoning {
    /// Fixed UTC offset in seconds, local timezone if `None`.
    pub offset: Option<i32>,
    /// Meridian shift in degrees east.
    pub longitude: Option<f64>,
    /// Use apparent solar time instead of mean time.
    pub true_solar_time: bool,
    /// Move hands continuously instead of once per unit.
    pub smooth: bool,
}

/// Hand positions and display fields for one instant.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct TimeReading {
    pub base: NumberingBase,
    pub hours_angle: f64,
    pub minutes_angle: f64,
    pub seconds_angle: f64,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    /// Index of the smallest displayed unit, changing once per tick.
    pub unit: i64,
}

impl TimeReading {
    /// Digital representation of the reading.
    pub fn display(&self) -> String {
        self.base.strategy().format(self)
    }
}

/// Per-base conversion strategy.
pub trait TimeBase {
    /// Heartbeat interval required for this base's smallest unit.
    fn tick_interval(&self) -> Duration {
        DEFAULT_TICK_INTERVAL
    }

    /// Labels around the hour ring, starting one hour after the top.
    fn hour_digits(&self) -> &'static [&'static str];

    /// Number of hour tick marks.
    fn hour_ticks(&self) -> u32;

    /// Labels around the minute ring, starting one step after the top.
    fn minute_digits(&self) -> &'static [&'static str];

    /// Number of minute tick marks.
    fn minute_ticks(&self) -> u32;

    /// Seconds added to Unix time for the configured zone and meridian.
    fn shift(&self, reckoning: &Reckoning, local_offset: i32) -> f64 {
        let zone = reckoning.offset.unwrap_or(local_offset) as f64;
        zone + reckoning.longitude.map_or(0., |longitude| longitude * SECONDS_PER_DEGREE)
    }

    /// Convert local seconds since the epoch to a reading.
    fn reading(&self, seconds: f64, smooth: bool) -> TimeReading;

    /// Format a reading produced by this base.
    fn format(&self, reading: &TimeReading) -> String {
        format!("{:02}:{:02}:{:02}", reading.hours, reading.minutes, reading.seconds)
    }
}

/// Convert an instant to hand positions.
pub fn convert(
    base: NumberingBase,
    time: DateTime<Utc>,
    reckoning: &Reckoning,
    local_offset: i32,
) -> TimeReading {
    let strategy = base.strategy();

    let seconds = if reckoning.true_solar_time {
        // Without a longitude, the zone's meridian is used.
        let longitude = reckoning.longitude.unwrap_or_else(|| {
            strategy.shift(reckoning, local_offset) / SECONDS_PER_DEGREE
        });
        solar::day_fraction(time, longitude) * DAY_SECONDS
    } else {
        solar::unix_seconds(time) + strategy.shift(reckoning, local_offset)
    };

    strategy.reading(seconds, reckoning.smooth)
}

/// Twelve hour sexagesimal dial.
pub struct Sexagesimal;

impl TimeBase for Sexagesimal {
    fn hour_digits(&self) -> &'static [&'static str] {
        &["1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12"]
    }

    fn hour_ticks(&self) -> u32 {
        12
    }

    fn minute_digits(&self) -> &'static [&'static str] {
        &["5", "10", "15", "20", "25", "30", "35", "40", "45", "50", "55", "0"]
    }

    fn minute_ticks(&self) -> u32 {
        60
    }

    fn reading(&self, seconds: f64, smooth: bool) -> TimeReading {
        sexagesimal_reading(NumberingBase::Sexagesimal, seconds, smooth, 12.)
    }
}

/// Twenty-four hour sexagesimal dial.
pub struct TwentyFour;

impl TimeBase for TwentyFour {
    fn hour_digits(&self) -> &'static [&'static str] {
        &[
            "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16",
            "17", "18", "19", "20", "21", "22", "23", "0",
        ]
    }

    fn hour_ticks(&self) -> u32 {
        24
    }

    fn minute_digits(&self) -> &'static [&'static str] {
        Sexagesimal.minute_digits()
    }

    fn minute_ticks(&self) -> u32 {
        60
    }

    fn reading(&self, seconds: f64, smooth: bool) -> TimeReading {
        sexagesimal_reading(NumberingBase::TwentyFour, seconds, smooth, 24.)
    }
}

/// Shared reading of the 12 and 24 hour dials.
///
/// The hour hand completes one turn every `dial_hours`.
fn sexagesimal_reading(
    base: NumberingBase,
    seconds: f64,
    smooth: bool,
    dial_hours: f64,
) -> TimeReading {
    // Step once per second unless smoothing.
    let seconds = if smooth { seconds } else { seconds.floor() };

    let hours = seconds / 3600.;
    let minutes = seconds / 60.;

    let whole = seconds.floor() as i64;
    let of_day = whole.rem_euclid(DAY_SECONDS as i64);

    TimeReading {
        base,
        hours_angle: turns(hours.rem_euclid(dial_hours * 2.) / dial_hours),
        minutes_angle: turns(minutes.rem_euclid(120.) / 60.),
        seconds_angle: turns(seconds.rem_euclid(120.) / 60.),
        hours: (of_day / 3600) as u32,
        minutes: (of_day / 60 % 60) as u32,
        seconds: (of_day % 60) as u32,
        unit: whole,
    }
}

/// Decimal dial.
pub struct Decimal;

impl TimeBase for Decimal {
    fn tick_interval(&self) -> Duration {
        DECIMAL_TICK_INTERVAL
    }

    fn hour_digits(&self) -> &'static [&'static str] {
        &["1", "2", "3", "4", "5", "6", "7", "8", "9", "10"]
    }

    fn hour_ticks(&self) -> u32 {
        10
    }

    fn minute_digits(&self) -> &'static [&'static str] {
        &["10", "20", "30", "40", "50", "60", "70", "80", "90", "00"]
    }

    fn minute_ticks(&self) -> u32 {
        100
    }

    /// Decimal time has no timezones; it defaults to Paris mean time.
    fn shift(&self, reckoning: &Reckoning, _local_offset: i32) -> f64 {
        match (reckoning.offset, reckoning.longitude) {
            (None, None) => PARIS_MERIDIAN_SECONDS,
            (offset, longitude) => {
                let zone = offset.unwrap_or(0) as f64;
                zone + longitude.map_or(0., |longitude| longitude * SECONDS_PER_DEGREE)
            },
        }
    }

    fn reading(&self, seconds: f64, smooth: bool) -> TimeReading {
        // Decimal seconds are ~0.864s, so sub-second precision is required.
        let (day, fraction) = split_day(seconds);
        let units = day_units(fraction, 100_000);

        let hours = fraction * 10.;
        let minutes = hours.fract() * 100.;

        // Stepping hands follow the displayed second exactly.
        let seconds_angle = if smooth {
            turns((fraction * 100_000.).rem_euclid(100.) / 100.)
        } else {
            (units % 100) as f64 * (FULL_TURN / 100.)
        };

        TimeReading {
            base: NumberingBase::Decimal,
            hours_angle: turns(hours / 10.),
            minutes_angle: turns(minutes / 100.),
            seconds_angle,
            hours: units / 10_000,
            minutes: units / 100 % 100,
            seconds: units % 100,
            unit: day * 100_000 + units as i64,
        }
    }
}

/// Hexadecimal dial.
pub struct Hexadecimal;

impl TimeBase for Hexadecimal {
    fn tick_interval(&self) -> Duration {
        HEXADECIMAL_TICK_INTERVAL
    }

    fn hour_digits(&self) -> &'static [&'static str] {
        &["1", "2", "3", "4", "5", "6", "7", "8", "9", "A", "B", "C", "D", "E", "F", "0"]
    }

    fn hour_ticks(&self) -> u32 {
        16
    }

    fn minute_digits(&self) -> &'static [&'static str] {
        self.hour_digits()
    }

    /// 256 minutes per hour would be unreadable; use half of them.
    fn minute_ticks(&self) -> u32 {
        128
    }

    fn reading(&self, seconds: f64, smooth: bool) -> TimeReading {
        // Hexadecimal seconds are ~1.32s, so sub-second precision is required.
        let (day, fraction) = split_day(seconds);
        let units = day_units(fraction, 0x10000);

        let hours = fraction * 16.;
        let maximes = hours.fract() * 16.;
        let minutes = maximes.fract() * 16.;

        // The seconds hand shows minutes, moving once per second.
        let seconds_angle = if smooth {
            turns(minutes / 16.)
        } else {
            (units & 0xFF) as f64 * (FULL_TURN / 256.)
        };

        TimeReading {
            base: NumberingBase::Hexadecimal,
            hours_angle: turns(hours / 16.),
            minutes_angle: turns(maximes / 16.),
            seconds_angle,
            hours: units >> 12,
            minutes: (units >> 4) & 0xFF,
            seconds: units & 0xF,
            unit: day * 0x10000 + units as i64,
        }
    }

    fn format(&self, reading: &TimeReading) -> String {
        format!("{:X}_{:02X}_{:X}", reading.hours, reading.minutes, reading.seconds)
    }
}

/// Convert a number of turns to a normalized angle.
fn turns(turns: f64) -> f64 {
    normalize_degrees(turns * FULL_TURN)
}

/// Split local seconds since the epoch into whole days and the day's fraction.
fn split_day(seconds: f64) -> (i64, f64) {
    let day = seconds.div_euclid(DAY_SECONDS) as i64;
    let fraction = seconds.rem_euclid(DAY_SECONDS) / DAY_SECONDS;
    (day, fraction)
}

/// Number of whole `units_per_day` elapsed at a fraction of the day.
///
/// Millisecond instants on a unit boundary can land a rounding error below it,
/// which is absorbed by a tolerance far smaller than a millisecond.
fn day_units(fraction: f64, units_per_day: u32) -> u32 {
    const TOLERANCE: f64 = 1e-6;

    let units = (fraction * units_per_day as f64 + TOLERANCE).floor() as u32;
    units.min(units_per_day - 1)
}
