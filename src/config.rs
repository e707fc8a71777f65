//! Configuration options.

use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::result::Result as StdResult;
use std::time::Duration;

use serde::de::Visitor;
use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::Result;
use crate::hand::StepTiming;
use crate::timebase::{NumberingBase, Reckoning};

/// Configuration file name inside the config directory.
const CONFIG_FILE: &str = "borda/borda.toml";

#[derive(Deserialize, Default, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub clock: ClockConfig,
    pub colors: Colors,
    pub output: Output,
}

impl Config {
    /// Load the configuration file.
    ///
    /// Without an explicit path, a missing file in the user's config directory
    /// falls back to the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match dirs::config_dir().map(|dir| dir.join(CONFIG_FILE)) {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = fs::read_to_string(&path)
            .map_err(|err| format!("could not read {}: {err}", path.display()))?;
        let config = Self::from_toml(&content)
            .map_err(|err| format!("invalid config {}: {err}", path.display()))?;

        info!("Loaded config from {}", path.display());

        Ok(config)
    }

    /// Parse the configuration from TOML text.
    pub fn from_toml(content: &str) -> StdResult<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Clock face configuration.
#[derive(Deserialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    /// Numbering base of the dial.
    pub base: NumberingBase,
    /// Face radius in SVG user units.
    pub radius: f64,

    /// Show the hours hand.
    pub hours_hand: bool,
    /// Show the minutes hand.
    pub minutes_hand: bool,
    /// Show the seconds hand.
    pub seconds_hand: bool,

    /// Show hour tick marks.
    pub hours_ticks: bool,
    /// Show minute tick marks.
    pub minutes_ticks: bool,
    /// Show hour digits.
    pub hours_digits: bool,
    /// Show minute digits.
    pub minutes_digits: bool,
    /// Custom hour ring labels replacing the base's own digits.
    pub hour_labels: Option<Vec<String>>,
    /// Rotate digits with the dial instead of keeping them upright.
    pub rotate_digits: bool,

    /// Move hands continuously instead of once per unit.
    pub smooth: bool,
    /// Animate hand movement.
    pub transitions: bool,
    /// Timing of hand animation steps.
    pub step_timing: StepTiming,

    /// UTC offset in seconds; the local timezone is used when absent.
    pub offset: Option<i32>,
    /// Longitude in degrees east, shifting the time by four minutes per degree.
    pub longitude: Option<f64>,
    /// Show apparent solar time.
    pub true_solar_time: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            base: NumberingBase::default(),
            radius: 50.,

            hours_hand: true,
            minutes_hand: true,
            seconds_hand: true,

            hours_ticks: true,
            minutes_ticks: true,
            hours_digits: true,
            minutes_digits: false,
            hour_labels: None,
            rotate_digits: false,

            smooth: false,
            transitions: true,
            step_timing: StepTiming::default(),

            offset: None,
            longitude: None,
            true_solar_time: false,
        }
    }
}

impl ClockConfig {
    /// Time reference described by this configuration.
    pub fn reckoning(&self) -> Reckoning {
        Reckoning {
            offset: self.offset,
            longitude: self.longitude,
            true_solar_time: self.true_solar_time,
            smooth: self.smooth,
        }
    }
}

/// Color configuration.
#[derive(Deserialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct Colors {
    /// Face background.
    pub face: Color,
    /// Face outline.
    pub border: Color,
    /// Tick marks.
    pub ticks: Color,
    /// Dial digits.
    pub digits: Color,

    /// Hours hand.
    pub hours_hand: Color,
    /// Minutes hand.
    pub minutes_hand: Color,
    /// Seconds hand.
    pub seconds_hand: Color,
}

impl Default for Colors {
    fn default() -> Self {
        Self {
            face: Color::new(24, 24, 24),
            border: Color::new(85, 85, 85),
            ticks: Color::new(170, 170, 170),
            digits: Color::new(255, 255, 255),

            hours_hand: Color::new(255, 255, 255),
            minutes_hand: Color::new(255, 255, 255),
            seconds_hand: Color::new(255, 0, 0),
        }
    }
}

/// Output configuration.
#[derive(Deserialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct Output {
    /// Destination file; `.png` files are rasterized.
    pub path: PathBuf,

    /// PNG width and height in pixels.
    pub png_size: u32,

    /// Minimum time between file rewrites while running.
    #[serde(deserialize_with = "duration_ms")]
    pub write_interval: Duration,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            path: PathBuf::from("clock.svg"),
            png_size: 400,
            write_interval: Duration::from_millis(100),
        }
    }
}

/// RGB color.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// CSS hex notation.
impl Display for Color {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Deserialize rgb color from a hex string.
impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ColorVisitor;

        impl Visitor<'_> for ColorVisitor {
            type Value = Color;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("hex color like #ff00ff")
            }

            fn visit_str<E>(self, value: &str) -> StdResult<Color, E>
            where
                E: serde::de::Error,
            {
                let channels = match value.strip_prefix('#') {
                    Some(channels) => channels,
                    None => {
                        return Err(E::custom(format!("color {value:?} is missing leading '#'")));
                    },
                };

                let digits = channels.len();
                if digits != 6 {
                    let msg = format!("color {value:?} has {digits} digits; expected 6");
                    return Err(E::custom(msg));
                }

                match u32::from_str_radix(channels, 16) {
                    Ok(mut color) => {
                        let b = (color & 0xFF) as u8;
                        color >>= 8;
                        let g = (color & 0xFF) as u8;
                        color >>= 8;
                        let r = color as u8;

                        Ok(Color::new(r, g, b))
                    },
                    Err(_) => Err(E::custom(format!("color {value:?} contains non-hex digits"))),
                }
            }
        }

        deserializer.deserialize_str(ColorVisitor)
    }
}

/// Deserialize a duration from milliseconds.
fn duration_ms<'de, D>(deserializer: D) -> StdResult<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let ms = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.clock.base, NumberingBase::Sexagesimal);
        assert_eq!(config.clock.radius, 50.);
        assert_eq!(config.output.path, PathBuf::from("clock.svg"));
        assert_eq!(config.colors.seconds_hand, Color::new(255, 0, 0));

        // Minutes are shown as hand and ticks, but not as digits.
        assert!(config.clock.minutes_hand);
        assert!(config.clock.minutes_ticks);
        assert!(!config.clock.minutes_digits);
        assert_eq!(config.clock.hour_labels, None);
    }

    #[test]
    fn custom_hour_labels() {
        let config = Config::from_toml("[clock]\nhour_labels = [\"I\", \"II\", \"III\"]").unwrap();
        let labels = config.clock.hour_labels.unwrap();
        assert_eq!(labels, ["I", "II", "III"]);
    }

    #[test]
    fn parse_clock_section() {
        let config = Config::from_toml(
            r##"
            [clock]
            base = "hexadecimal"
            radius = 120
            smooth = true
            longitude = 2.35
            step_timing = "frame"

            [colors]
            face = "#ffffff"

            [output]
            path = "face.png"
            write_interval = 250
            "##,
        )
        .unwrap();

        assert_eq!(config.clock.base, NumberingBase::Hexadecimal);
        assert_eq!(config.clock.radius, 120.);
        assert_eq!(config.clock.step_timing, StepTiming::Frame);
        assert_eq!(config.clock.reckoning(), Reckoning {
            offset: None,
            longitude: Some(2.35),
            true_solar_time: false,
            smooth: true,
        });
        assert_eq!(config.colors.face.to_string(), "#ffffff");
        assert_eq!(config.output.write_interval, Duration::from_millis(250));
    }

    #[test]
    fn numeric_twenty_four_base() {
        let config = Config::from_toml("[clock]\nbase = 24").unwrap();
        assert_eq!(config.clock.base, NumberingBase::TwentyFour);
    }

    #[test]
    fn unknown_base_fails() {
        let err = Config::from_toml("[clock]\nbase = \"duodecimal\"").unwrap_err();
        assert!(err.to_string().contains("unknown numbering base"), "{err}");
    }

    #[test]
    fn invalid_colors() {
        assert!(Config::from_toml("[colors]\nface = \"ffffff\"").is_err());
        assert!(Config::from_toml("[colors]\nface = \"#fff\"").is_err());
        assert!(Config::from_toml("[colors]\nface = \"#gggggg\"").is_err());
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(Config::from_toml("[clock]\nhands = true").is_err());
    }
}
