use std::collections::BTreeMap;

use crate::error::{EditorError, Result};
use crate::filters::keyframe::KeyframeTrack;
use crate::media::MediaHandle;

/// A numeric stage parameter, fixed or animated
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Constant(f64),
    Keyframed(KeyframeTrack),
}

impl Param {
    /// Value at presentation time `t`
    pub fn evaluate(&self, t: f64) -> f64 {
        match self {
            Param::Constant(value) => *value,
            Param::Keyframed(track) => track.evaluate(t),
        }
    }

    pub fn is_animated(&self) -> bool {
        matches!(self, Param::Keyframed(track) if !track.is_constant())
    }

    /// Smallest and largest value the parameter can take
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            Param::Constant(value) => (*value, *value),
            Param::Keyframed(track) => (track.min_value(), track.max_value()),
        }
    }

    /// Reject values outside `[min, max]` anywhere on the track
    pub fn check_range(&self, stage: &str, name: &str, min: f64, max: f64) -> Result<()> {
        let (lo, hi) = self.bounds();
        if !lo.is_finite() || !hi.is_finite() || lo < min || hi > max {
            return Err(EditorError::invalid_parameter(
                stage,
                name,
                format!("values {}..{} outside [{}, {}]", lo, hi, min, max),
            ));
        }
        Ok(())
    }

    /// Reject values that are not strictly positive anywhere on the track
    pub fn check_positive(&self, stage: &str, name: &str) -> Result<()> {
        let (lo, _) = self.bounds();
        if !(lo > 0.0 && lo.is_finite()) {
            return Err(EditorError::invalid_parameter(stage, name, format!("must be > 0, got {}", lo)));
        }
        Ok(())
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Param::Constant(value)
    }
}

impl From<f32> for Param {
    fn from(value: f32) -> Self {
        Param::Constant(value as f64)
    }
}

impl From<KeyframeTrack> for Param {
    fn from(track: KeyframeTrack) -> Self {
        Param::Keyframed(track)
    }
}

/// Loosely typed value handed to the filter registry
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Integer(i64),
    Bool(bool),
    Text(String),
    Keyframes(KeyframeTrack),
    Media(MediaHandle),
}

impl ParamValue {
    /// Interpret command-line text: numbers, booleans, otherwise plain text
    pub fn parse_loose(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return ParamValue::Integer(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return ParamValue::Float(f);
        }
        match trimmed {
            "true" => ParamValue::Bool(true),
            "false" => ParamValue::Bool(false),
            _ => ParamValue::Text(text.to_string()),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Float(_) => "float",
            ParamValue::Integer(_) => "integer",
            ParamValue::Bool(_) => "bool",
            ParamValue::Text(_) => "text",
            ParamValue::Keyframes(_) => "keyframes",
            ParamValue::Media(_) => "media",
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        ParamValue::Float(value as f64)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Integer(value as i64)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Integer(value as i64)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<KeyframeTrack> for ParamValue {
    fn from(track: KeyframeTrack) -> Self {
        ParamValue::Keyframes(track)
    }
}

impl From<MediaHandle> for ParamValue {
    fn from(handle: MediaHandle) -> Self {
        ParamValue::Media(handle)
    }
}

/// Parameters for building a stage by name
///
/// Stage builders `take_*` what they understand; anything left over when
/// [`ParamMap::finish`] runs is reported as an invalid parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    values: BTreeMap<String, ParamValue>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with<K: Into<String>, V: Into<ParamValue>>(mut self, key: K, value: V) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<K: Into<String>, V: Into<ParamValue>>(&mut self, key: K, value: V) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Numeric parameter; text is accepted when it parses as a keyframe track
    pub fn take_param(&mut self, stage: &str, key: &str, default: f64) -> Result<Param> {
        match self.values.remove(key) {
            None => Ok(Param::Constant(default)),
            Some(ParamValue::Float(f)) => Ok(Param::Constant(f)),
            Some(ParamValue::Integer(i)) => Ok(Param::Constant(i as f64)),
            Some(ParamValue::Keyframes(track)) => Ok(Param::Keyframed(track)),
            Some(ParamValue::Text(text)) => text.parse::<KeyframeTrack>().map(Param::Keyframed).map_err(|_| {
                EditorError::invalid_parameter(stage, key, format!("expected a number or keyframes, got '{}'", text))
            }),
            Some(other) => Err(mismatch(stage, key, "number", &other)),
        }
    }

    pub fn take_text(&mut self, stage: &str, key: &str) -> Result<Option<String>> {
        match self.values.remove(key) {
            None => Ok(None),
            Some(ParamValue::Text(text)) => Ok(Some(text)),
            // Bare numbers typed on a command line are still valid text
            Some(ParamValue::Integer(i)) => Ok(Some(i.to_string())),
            Some(ParamValue::Float(f)) => Ok(Some(f.to_string())),
            Some(other) => Err(mismatch(stage, key, "text", &other)),
        }
    }

    /// Unsigned integer; also accepts `0x` hex text for colours
    pub fn take_u64(&mut self, stage: &str, key: &str) -> Result<Option<u64>> {
        match self.values.remove(key) {
            None => Ok(None),
            Some(ParamValue::Integer(i)) if i >= 0 => Ok(Some(i as u64)),
            Some(ParamValue::Text(text)) => {
                let t = text.trim();
                let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("#")) {
                    Some(hex) => u64::from_str_radix(hex, 16).ok(),
                    None => t.parse::<u64>().ok(),
                };
                parsed.map(Some).ok_or_else(|| {
                    EditorError::invalid_parameter(stage, key, format!("expected an unsigned integer, got '{}'", text))
                })
            }
            Some(other) => Err(mismatch(stage, key, "unsigned integer", &other)),
        }
    }

    pub fn take_media(&mut self, stage: &str, key: &str) -> Result<Option<MediaHandle>> {
        match self.values.remove(key) {
            None => Ok(None),
            Some(ParamValue::Media(handle)) => Ok(Some(handle)),
            Some(other) => Err(mismatch(stage, key, "media", &other)),
        }
    }

    /// Remaining numeric parameters, for custom stages
    pub fn take_all_params(&mut self, stage: &str) -> Result<BTreeMap<String, Param>> {
        let keys: Vec<String> = self.values.keys().cloned().collect();
        let mut params = BTreeMap::new();
        for key in keys {
            let param = self.take_param(stage, &key, 0.0)?;
            params.insert(key, param);
        }
        Ok(params)
    }

    /// Fail on parameters no builder consumed
    pub fn finish(self, stage: &str) -> Result<()> {
        match self.values.keys().next() {
            Some(key) => Err(EditorError::invalid_parameter(stage, key.as_str(), "unknown parameter")),
            None => Ok(()),
        }
    }
}

fn mismatch(stage: &str, key: &str, expected: &str, got: &ParamValue) -> EditorError {
    EditorError::invalid_parameter(stage, key, format!("expected {}, got {}", expected, got.type_name()))
}
