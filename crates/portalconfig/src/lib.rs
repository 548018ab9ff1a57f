use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Namespace the host uses for every key this plugin registers.
pub const KEY_PREFIX: &str = "plugin:hypr-portal-effect:";

pub const DEFAULT_DURATION_SECS: f64 = 0.5;
pub const DEFAULT_ROTATION_SPEED: f32 = 2.0;
pub const DEFAULT_WHIRLING: f32 = 1.0;
pub const DEFAULT_COLOR: u32 = 0x9d4edd;

const MAX_DURATION_SECS: f64 = 60.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A 24-bit RGB color packed as `0xRRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PackedColor(pub u32);

impl PackedColor {
    /// Unpacks into normalized `[r, g, b]` channels.
    pub fn to_rgb(self) -> [f32; 3] {
        let value = self.0;
        [
            ((value >> 16) & 0xFF) as f32 / 255.0,
            ((value >> 8) & 0xFF) as f32 / 255.0,
            (value & 0xFF) as f32 / 255.0,
        ]
    }

    /// Parses `#rrggbb`, `0xrrggbb`, `rrggbb` or `rgb(rrggbb)`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(trimmed);
        let digits = inner
            .strip_prefix('#')
            .or_else(|| inner.strip_prefix("0x"))
            .or_else(|| inner.strip_prefix("0X"))
            .unwrap_or(inner);
        if digits.is_empty() || digits.len() > 6 {
            return Err(format!("invalid color '{trimmed}'; expected six hex digits"));
        }
        u32::from_str_radix(digits, 16)
            .map(PackedColor)
            .map_err(|_| format!("invalid color '{trimmed}'; expected six hex digits"))
    }
}

impl Default for PackedColor {
    fn default() -> Self {
        PackedColor(DEFAULT_COLOR)
    }
}

impl fmt::Display for PackedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PortalConfig {
    #[serde(
        default = "default_duration",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub duration: Duration,
    #[serde(default = "default_rotation_speed")]
    pub rotation_speed: f32,
    #[serde(default = "default_whirling")]
    pub whirling: f32,
    #[serde(default, deserialize_with = "deserialize_color")]
    pub color: PackedColor,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            rotation_speed: DEFAULT_ROTATION_SPEED,
            whirling: DEFAULT_WHIRLING,
            color: PackedColor::default(),
        }
    }
}

fn default_duration() -> Duration {
    Duration::from_secs_f64(DEFAULT_DURATION_SECS)
}

fn default_rotation_speed() -> f32 {
    DEFAULT_ROTATION_SPEED
}

fn default_whirling() -> f32 {
    DEFAULT_WHIRLING
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(value.as_secs_f64())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v.trim())
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            seconds_to_duration(v).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn deserialize_color<'de, D>(deserializer: D) -> Result<PackedColor, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Str(String),
        Num(i64),
    }

    match Helper::deserialize(deserializer)? {
        Helper::Str(raw) => PackedColor::parse(&raw).map_err(de::Error::custom),
        Helper::Num(value) => packed_from_int(value).map_err(de::Error::custom),
    }
}

fn packed_from_int(value: i64) -> Result<PackedColor, String> {
    if !(0..=0xFF_FFFF).contains(&value) {
        return Err(format!(
            "color {value:#x} is outside the 24-bit range 0x000000-0xffffff"
        ));
    }
    Ok(PackedColor(value as u32))
}

fn seconds_to_duration(value: f64) -> Result<Duration, String> {
    if !value.is_finite() || value.is_sign_negative() {
        return Err("duration must be a finite, non-negative number of seconds".into());
    }
    if value > MAX_DURATION_SECS {
        return Err(format!(
            "duration {value}s exceeds the {MAX_DURATION_SECS}s maximum"
        ));
    }
    Ok(Duration::from_secs_f64(value))
}

/// A value as stored by the host's configuration store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigValue {
    Float(f64),
    Int(i64),
}

/// Read access to the host's key/value configuration store.
pub trait ConfigSource {
    fn float(&self, key: &str) -> Option<f64>;
    fn int(&self, key: &str) -> Option<i64>;
}

impl ConfigSource for BTreeMap<String, ConfigValue> {
    fn float(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            ConfigValue::Float(value) => Some(*value),
            ConfigValue::Int(value) => Some(*value as f64),
        }
    }

    fn int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            ConfigValue::Int(value) => Some(*value),
            ConfigValue::Float(_) => None,
        }
    }
}

/// Fully qualified host key for a plugin option.
pub fn qualified_key(name: &str) -> String {
    format!("{KEY_PREFIX}{name}")
}

impl PortalConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: PortalConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads every option from the host store, keeping defaults for absent keys.
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(seconds) = source.float(&qualified_key("duration")) {
            config.duration = seconds_to_duration(seconds).map_err(ConfigError::Invalid)?;
        }
        if let Some(speed) = source.float(&qualified_key("rotation_speed")) {
            config.rotation_speed = speed as f32;
        }
        if let Some(whirling) = source.float(&qualified_key("whirling")) {
            config.whirling = whirling as f32;
        }
        if let Some(color) = source.int(&qualified_key("color")) {
            config.color = packed_from_int(color).map_err(ConfigError::Invalid)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Keys and default values the host must register before reading.
    pub fn registrations() -> [(String, ConfigValue); 4] {
        [
            (
                qualified_key("duration"),
                ConfigValue::Float(DEFAULT_DURATION_SECS),
            ),
            (
                qualified_key("rotation_speed"),
                ConfigValue::Float(DEFAULT_ROTATION_SPEED as f64),
            ),
            (
                qualified_key("whirling"),
                ConfigValue::Float(DEFAULT_WHIRLING as f64),
            ),
            (
                qualified_key("color"),
                ConfigValue::Int(DEFAULT_COLOR as i64),
            ),
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.duration.is_zero() {
            return Err(ConfigError::Invalid(
                "duration must be greater than zero".into(),
            ));
        }

        if self.duration.as_secs_f64() > MAX_DURATION_SECS {
            return Err(ConfigError::Invalid(format!(
                "duration must not exceed {MAX_DURATION_SECS}s"
            )));
        }

        if !self.rotation_speed.is_finite() {
            return Err(ConfigError::Invalid(
                "rotation_speed must be a finite number".into(),
            ));
        }

        if !self.whirling.is_finite() {
            return Err(ConfigError::Invalid(
                "whirling must be a finite number".into(),
            ));
        }

        if self.color.0 > 0xFF_FFFF {
            return Err(ConfigError::Invalid(format!(
                "color {:#x} does not fit in 24 bits",
                self.color.0
            )));
        }

        Ok(())
    }
}
