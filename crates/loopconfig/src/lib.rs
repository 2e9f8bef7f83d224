use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 600;
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Order in which the rotation timer walks the registered shaders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationMode {
    #[default]
    RoundRobin,
    Shuffle,
}

/// What the render loop does when hot reload fails to build the current
/// shader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultPolicy {
    /// Keep drawing the last good pipeline and log the fault.
    #[default]
    KeepPrevious,
    /// Stop rendering with the fault as the error.
    Abort,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoopConfig {
    pub version: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shader_dir: Option<PathBuf>,
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub frame_interval: Option<Duration>,
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub rotation_interval: Option<Duration>,
    #[serde(default)]
    pub rotation: RotationMode,
    #[serde(default)]
    pub on_shader_fault: FaultPolicy,
    #[serde(default)]
    pub shaders: Vec<ShaderItem>,
}

/// One `[[shaders]]` entry. `file` is the stem of the `.vert`/`.frag` pair
/// and defaults to the key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ShaderItem {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl ShaderItem {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            file: None,
        }
    }

    pub fn file(&self) -> &str {
        self.file.as_deref().unwrap_or(&self.key)
    }
}

fn default_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

fn default_title() -> String {
    "quadloop".to_string()
}

impl Default for LoopConfig {
    /// The stock pair of shaders rotated in an 800x600 window.
    fn default() -> Self {
        Self {
            version: 1,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            title: default_title(),
            shader_dir: None,
            frame_interval: None,
            rotation_interval: None,
            rotation: RotationMode::default(),
            on_shader_fault: FaultPolicy::default(),
            shaders: vec![ShaderItem::new("basic"), ShaderItem::new("slate-1")],
        }
    }
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            parse_duration(v).map(Some).map_err(E::custom)
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() || v.is_infinite() {
                return Err(E::custom("duration must be a finite non-negative number"));
            }
            Duration::try_from_secs_f64(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

/// Parses "33ms", "5s", "1m 30s" and the like; a bare number means seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let trimmed = raw.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_nan() || seconds.is_sign_negative() || seconds.is_infinite() {
            return Err(format!("invalid duration '{raw}': must be non-negative"));
        }
        return Duration::try_from_secs_f64(seconds)
            .map_err(|err| format!("invalid duration '{raw}': {err}"));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{raw}': {err}"))
}

/// Parses a `WIDTHxHEIGHT` size such as `800x600`.
pub fn parse_size(raw: &str) -> Result<(u32, u32), String> {
    let (width, height) = raw
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{raw}': expected WIDTHxHEIGHT"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|err| format!("invalid width in '{raw}': {err}"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|err| format!("invalid height in '{raw}': {err}"))?;
    if width == 0 || height == 0 {
        return Err(format!("invalid size '{raw}': dimensions must be > 0"));
    }
    Ok((width, height))
}

impl LoopConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: LoopConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval.unwrap_or(DEFAULT_FRAME_INTERVAL)
    }

    pub fn rotation_interval(&self) -> Duration {
        self.rotation_interval.unwrap_or(DEFAULT_ROTATION_INTERVAL)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} must be greater than zero",
                self.width, self.height
            )));
        }

        if self.frame_interval().is_zero() {
            return Err(ConfigError::Invalid(
                "frame_interval must be greater than zero".into(),
            ));
        }

        if self.rotation_interval().is_zero() {
            return Err(ConfigError::Invalid(
                "rotation_interval must be greater than zero".into(),
            ));
        }

        if self.shaders.is_empty() {
            return Err(ConfigError::Invalid(
                "config must list at least one shader".into(),
            ));
        }

        let mut seen = HashSet::new();
        for shader in &self.shaders {
            if shader.key.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "shader entries need a non-empty key".into(),
                ));
            }
            if shader.file().trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "shader '{}' has an empty file name",
                    shader.key
                )));
            }
            if !seen.insert(shader.key.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "shader key '{}' is listed more than once",
                    shader.key
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1
width = 1024
height = 768
title = "bench"
shader_dir = "/opt/shaders"
frame_interval = "16ms"
rotation_interval = 10
rotation = "shuffle"
on_shader_fault = "abort"

[[shaders]]
key = "basic"

[[shaders]]
key = "slate"
file = "slate-1"
"#;

    #[test]
    fn parses_sample_config() {
        let config = LoopConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!((config.width, config.height), (1024, 768));
        assert_eq!(config.title, "bench");
        assert_eq!(config.shader_dir, Some(PathBuf::from("/opt/shaders")));
        assert_eq!(config.frame_interval(), Duration::from_millis(16));
        assert_eq!(config.rotation_interval(), Duration::from_secs(10));
        assert_eq!(config.rotation, RotationMode::Shuffle);
        assert_eq!(config.on_shader_fault, FaultPolicy::Abort);
        assert_eq!(config.shaders[0].file(), "basic");
        assert_eq!(config.shaders[1].file(), "slate-1");
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = LoopConfig::from_toml_str(
            r#"
version = 1

[[shaders]]
key = "basic"
"#,
        )
        .unwrap();
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.frame_interval(), DEFAULT_FRAME_INTERVAL);
        assert_eq!(config.rotation_interval(), DEFAULT_ROTATION_INTERVAL);
        assert_eq!(config.rotation, RotationMode::RoundRobin);
        assert_eq!(config.on_shader_fault, FaultPolicy::KeepPrevious);
    }

    #[test]
    fn builtin_default_is_valid() {
        let config = LoopConfig::default();
        config.validate().unwrap();
        let keys: Vec<_> = config.shaders.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, ["basic", "slate-1"]);
    }

    #[test]
    fn rejects_duplicate_keys() {
        let err = LoopConfig::from_toml_str(
            r#"
version = 1

[[shaders]]
key = "basic"

[[shaders]]
key = "basic"
file = "other"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("more than once")));
    }

    #[test]
    fn rejects_empty_key_and_zero_interval() {
        let empty_key = LoopConfig::from_toml_str(
            r#"
version = 1

[[shaders]]
key = ""
"#,
        )
        .unwrap_err();
        assert!(matches!(empty_key, ConfigError::Invalid(_)));

        let zero_frame = LoopConfig::from_toml_str(
            r#"
version = 1
frame_interval = 0

[[shaders]]
key = "basic"
"#,
        )
        .unwrap_err();
        assert!(matches!(zero_frame, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_rotation_mode() {
        let err = LoopConfig::from_toml_str(
            r#"
version = 1
rotation = "sideways"

[[shaders]]
key = "basic"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_out_of_range_interval() {
        let err = LoopConfig::from_toml_str(
            r#"
version = 1
rotation_interval = 1e30

[[shaders]]
key = "basic"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn parses_sizes_and_durations() {
        assert_eq!(parse_size("800x600"), Ok((800, 600)));
        assert_eq!(parse_size(" 1920X1080 "), Ok((1920, 1080)));
        assert!(parse_size("800").is_err());
        assert!(parse_size("0x600").is_err());

        assert_eq!(parse_duration("33ms"), Ok(Duration::from_millis(33)));
        assert_eq!(parse_duration("2.5"), Ok(Duration::from_millis(2500)));
        assert!(parse_duration("-1").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("1e30").is_err());
    }
}
