//! Option records for builder operations.
//!
//! These structs describe *what* a step should do. Every field is optional
//! because incomplete options are not an error: the builder checks them when
//! the step is added and skips the step if something required is missing.
//!
//! Deserialization is lenient in the same spirit. A field holding the wrong
//! JSON type (`"width": "wide"`) becomes `None` instead of failing the whole
//! record, and numeric strings (`"quality": "80"`) are accepted as numbers.
//!
//! ## Types
//!
//! - [`Gravity`]: the nine compass/center gravity tokens.
//! - [`ResizeFlag`]: `<`, `>`, `!`, `^` resize constraints.
//! - [`SharpenPreset`] / [`Unsharp`]: fixed unsharp-mask presets.
//! - [`SharpenMode`]: a preset, `off`, or `variable`.
//! - [`ResizeOptions`], [`CropOptions`], [`ExtentOptions`], [`RotateOptions`],
//!   [`SharpenOptions`]: per-operation option records.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placement used by subsequent geometry operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gravity {
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    SouthWest,
    South,
    SouthEast,
}

impl Gravity {
    pub fn as_str(self) -> &'static str {
        match self {
            Gravity::NorthWest => "NorthWest",
            Gravity::North => "North",
            Gravity::NorthEast => "NorthEast",
            Gravity::West => "West",
            Gravity::Center => "Center",
            Gravity::East => "East",
            Gravity::SouthWest => "SouthWest",
            Gravity::South => "South",
            Gravity::SouthEast => "SouthEast",
        }
    }
}

impl FromStr for Gravity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NorthWest" => Ok(Gravity::NorthWest),
            "North" => Ok(Gravity::North),
            "NorthEast" => Ok(Gravity::NorthEast),
            "West" => Ok(Gravity::West),
            "Center" => Ok(Gravity::Center),
            "East" => Ok(Gravity::East),
            "SouthWest" => Ok(Gravity::SouthWest),
            "South" => Ok(Gravity::South),
            "SouthEast" => Ok(Gravity::SouthEast),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Gravity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resize geometry flag, see <http://www.imagemagick.org/Usage/resize/#noaspect>.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeFlag {
    /// `<`: only enlarge smaller images.
    Enlarge,
    /// `>`: only shrink larger images.
    Shrink,
    /// `!`: ignore the aspect ratio.
    IgnoreAspect,
    /// `^`: fill the given area.
    Fill,
}

impl ResizeFlag {
    pub fn parse(flag: &str) -> Option<Self> {
        match flag {
            "<" => Some(ResizeFlag::Enlarge),
            ">" => Some(ResizeFlag::Shrink),
            "!" => Some(ResizeFlag::IgnoreAspect),
            "^" => Some(ResizeFlag::Fill),
            _ => None,
        }
    }

    /// The flag as it must appear on a shell command line.
    ///
    /// `^` has no special meaning to `sh`; the others need a backslash.
    pub fn shell_token(self) -> &'static str {
        match self {
            ResizeFlag::Enlarge => "\\<",
            ResizeFlag::Shrink => "\\>",
            ResizeFlag::IgnoreAspect => "\\!",
            ResizeFlag::Fill => "^",
        }
    }
}

/// Unsharp-mask parameters: `(radius, amount, threshold)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unsharp {
    pub radius: f64,
    pub amount: f64,
    pub threshold: f64,
}

impl Unsharp {
    /// Gaussian sigma: the radius itself below 1, its square root otherwise.
    pub fn sigma(self) -> f64 {
        if self.radius < 1.0 {
            self.radius
        } else {
            self.radius.sqrt()
        }
    }
}

/// Named sharpening strengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharpenPreset {
    Light,
    Moderate,
    Strong,
    Extreme,
}

impl SharpenPreset {
    pub fn unsharp(self) -> Unsharp {
        let (radius, amount, threshold) = match self {
            SharpenPreset::Light => (0.5, 1.0, 0.05),
            SharpenPreset::Moderate => (0.65, 1.1, 0.05),
            SharpenPreset::Strong => (0.8, 1.2, 0.05),
            SharpenPreset::Extreme => (1.0, 1.5, 0.0),
        };
        Unsharp {
            radius,
            amount,
            threshold,
        }
    }
}

/// How the sharpen step picks its preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharpenMode {
    Preset(SharpenPreset),
    /// Choose a preset from the working dimensions.
    Variable,
    Off,
}

impl FromStr for SharpenMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(SharpenMode::Preset(SharpenPreset::Light)),
            "moderate" => Ok(SharpenMode::Preset(SharpenPreset::Moderate)),
            "strong" => Ok(SharpenMode::Preset(SharpenPreset::Strong)),
            "extreme" => Ok(SharpenMode::Preset(SharpenPreset::Extreme)),
            "variable" => Ok(SharpenMode::Variable),
            "off" => Ok(SharpenMode::Off),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResizeOptions {
    #[serde(deserialize_with = "lenient::dimension")]
    pub width: Option<u32>,
    #[serde(deserialize_with = "lenient::dimension")]
    pub height: Option<u32>,
    /// One of `<`, `>`, `!`, `^`; anything else renders no flag.
    #[serde(deserialize_with = "lenient::text")]
    pub flag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropOptions {
    #[serde(deserialize_with = "lenient::dimension")]
    pub width: Option<u32>,
    #[serde(deserialize_with = "lenient::dimension")]
    pub height: Option<u32>,
    #[serde(deserialize_with = "lenient::offset")]
    pub x: Option<i64>,
    #[serde(deserialize_with = "lenient::offset")]
    pub y: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtentOptions {
    #[serde(deserialize_with = "lenient::dimension")]
    pub width: Option<u32>,
    #[serde(deserialize_with = "lenient::dimension")]
    pub height: Option<u32>,
}

/// Scale-rotate-translate around `(x, y)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotateOptions {
    #[serde(deserialize_with = "lenient::number")]
    pub angle: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub x: Option<f64>,
    #[serde(deserialize_with = "lenient::number")]
    pub y: Option<f64>,
    /// Fill color for the corners uncovered by the rotation.
    #[serde(alias = "bgColor", deserialize_with = "lenient::text")]
    pub background: Option<String>,
}

/// `width`/`height` only matter for `variable` mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharpenOptions {
    #[serde(deserialize_with = "lenient::text")]
    pub mode: Option<String>,
    #[serde(deserialize_with = "lenient::dimension")]
    pub width: Option<u32>,
    #[serde(deserialize_with = "lenient::dimension")]
    pub height: Option<u32>,
}

impl SharpenOptions {
    pub fn mode(mode: &str) -> Self {
        Self {
            mode: Some(mode.to_string()),
            ..Self::default()
        }
    }

    pub fn is_variable(&self) -> bool {
        self.mode.as_deref() == Some("variable")
    }
}

/// Field deserializers that turn type mismatches into `None`.
pub(crate) mod lenient {
    use super::*;
    use serde_json::Value;

    /// A finite number, or a string that parses as one.
    pub fn as_number(value: &Value) -> Option<f64> {
        let n = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        n.filter(|n| n.is_finite())
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(as_number(&Value::deserialize(d)?))
    }

    /// Positive whole numbers; zero counts as "not given".
    pub fn dimension<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        let n = as_number(&Value::deserialize(d)?);
        Ok(n.filter(|n| n.fract() == 0.0 && *n >= 1.0 && *n <= u32::MAX as f64)
            .map(|n| n as u32))
    }

    pub fn offset<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        let n = as_number(&Value::deserialize(d)?);
        Ok(n.filter(|n| n.fract() == 0.0 && n.abs() <= i64::MAX as f64)
            .map(|n| n as i64))
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gravity_parses_all_nine_tokens() {
        for token in [
            "NorthWest",
            "North",
            "NorthEast",
            "West",
            "Center",
            "East",
            "SouthWest",
            "South",
            "SouthEast",
        ] {
            let gravity: Gravity = token.parse().unwrap();
            assert_eq!(gravity.as_str(), token);
        }
    }

    #[test]
    fn gravity_is_case_sensitive() {
        assert!("center".parse::<Gravity>().is_err());
        assert!("Invalid".parse::<Gravity>().is_err());
    }

    #[test]
    fn resize_flags_escape_for_shell() {
        assert_eq!(ResizeFlag::parse(">").unwrap().shell_token(), "\\>");
        assert_eq!(ResizeFlag::parse("<").unwrap().shell_token(), "\\<");
        assert_eq!(ResizeFlag::parse("!").unwrap().shell_token(), "\\!");
        assert_eq!(ResizeFlag::parse("^").unwrap().shell_token(), "^");
        assert_eq!(ResizeFlag::parse("f"), None);
    }

    #[test]
    fn sigma_is_radius_below_one() {
        assert_eq!(SharpenPreset::Moderate.unsharp().sigma(), 0.65);
        assert_eq!(SharpenPreset::Light.unsharp().sigma(), 0.5);
    }

    #[test]
    fn sigma_is_square_root_from_one() {
        let unsharp = Unsharp {
            radius: 4.0,
            amount: 1.0,
            threshold: 0.0,
        };
        assert_eq!(unsharp.sigma(), 2.0);
        assert_eq!(SharpenPreset::Extreme.unsharp().sigma(), 1.0);
    }

    #[test]
    fn sharpen_mode_parsing() {
        assert_eq!(
            "strong".parse::<SharpenMode>(),
            Ok(SharpenMode::Preset(SharpenPreset::Strong))
        );
        assert_eq!("variable".parse::<SharpenMode>(), Ok(SharpenMode::Variable));
        assert_eq!("off".parse::<SharpenMode>(), Ok(SharpenMode::Off));
        assert!("foobar".parse::<SharpenMode>().is_err());
    }

    #[test]
    fn lenient_fields_drop_wrong_types() {
        let opts: ResizeOptions =
            serde_json::from_value(json!({"width": "wide", "height": 40, "flag": 3})).unwrap();
        assert_eq!(opts.width, None);
        assert_eq!(opts.height, Some(40));
        assert_eq!(opts.flag, None);
    }

    #[test]
    fn lenient_numbers_accept_numeric_strings() {
        let opts: CropOptions =
            serde_json::from_value(json!({"width": "10", "height": 12, "x": "-3", "y": 0}))
                .unwrap();
        assert_eq!(opts.width, Some(10));
        assert_eq!(opts.x, Some(-3));
        assert_eq!(opts.y, Some(0));
    }

    #[test]
    fn zero_dimension_counts_as_missing() {
        let opts: ExtentOptions =
            serde_json::from_value(json!({"width": 0, "height": 10})).unwrap();
        assert_eq!(opts.width, None);
    }

    #[test]
    fn rotate_accepts_legacy_background_key() {
        let opts: RotateOptions =
            serde_json::from_value(json!({"angle": 1, "x": 1, "y": 2, "bgColor": "blue"}))
                .unwrap();
        assert_eq!(opts.background.as_deref(), Some("blue"));
    }

    #[test]
    fn sharpen_mode_must_be_text() {
        let opts: SharpenOptions = serde_json::from_value(json!({"mode": 0})).unwrap();
        assert_eq!(opts.mode, None);
        assert!(!opts.is_variable());
        assert!(SharpenOptions::mode("variable").is_variable());
    }
}
