//! Device status snapshots.

use serde::{Deserialize, Serialize};

/// Brightness as reported by the device.
///
/// Firmware versions disagree on whether this is a string or a number, so
/// both are accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReportedBrightness {
    /// Numeric form, e.g. `42`.
    Number(f64),
    /// String form, e.g. `"42"`.
    Text(String),
}

impl ReportedBrightness {
    /// The brightness as a percent in 0-100, if it is a finite number.
    ///
    /// A reported `0` is a real value and is returned as such; only a
    /// missing or unparseable brightness lets callers fall back to a default.
    pub fn percent(&self) -> Option<f64> {
        let raw = match self {
            ReportedBrightness::Number(n) => *n,
            ReportedBrightness::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        raw.is_finite().then(|| raw.clamp(0.0, 100.0))
    }
}

/// A snapshot of the device state as returned by `GET status`.
///
/// Every field is optional; absent fields leave the local state at its
/// fallback.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceStatus {
    /// Current brightness percent.
    pub brightness: Option<ReportedBrightness>,
    /// Name of the running effect.
    pub current_effect: Option<String>,
    /// Position of the running effect in the catalog.
    pub current_effect_index: Option<i64>,
    /// Number of effects the device knows.
    pub total_effects: Option<u32>,
    /// Whether the strip is powered on.
    pub is_running: Option<bool>,
}

impl DeviceStatus {
    /// Brightness percent, if reported and parseable.
    pub fn brightness_percent(&self) -> Option<f64> {
        self.brightness.as_ref().and_then(ReportedBrightness::percent)
    }

    /// The running effect, by name or else by its index into `catalog`.
    pub fn effect_in(&self, catalog: &[String]) -> Option<String> {
        self.current_effect
            .clone()
            .or_else(|| effect_at(catalog, self.current_effect_index))
    }
}

/// The effect catalog as returned by `GET effects`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EffectList {
    /// Effect names in device order.
    pub effects: Vec<String>,
    /// Total count, when the device reports it.
    pub total: Option<u32>,
    /// Index of the running effect, when the device reports it.
    pub current_index: Option<i64>,
}

impl EffectList {
    /// Name of the running effect, if the device reported its index.
    pub fn current(&self) -> Option<String> {
        effect_at(&self.effects, self.current_index)
    }

    /// Whether the reported total disagrees with the listed names.
    pub fn is_truncated(&self) -> bool {
        self.total
            .is_some_and(|total| usize::try_from(total).ok() != Some(self.effects.len()))
    }
}

/// Acknowledgement of an effect switch.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EffectAck {
    /// Effect now running on the device.
    pub current_effect: Option<String>,
    /// Its position in the device catalog.
    pub current_index: Option<i64>,
}

fn effect_at(catalog: &[String], index: Option<i64>) -> Option<String> {
    let index = usize::try_from(index?).ok()?;
    catalog.get(index).cloned()
}

/// Body of a `POST brightness` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrightnessRequest {
    /// Absolute brightness percent (0-100).
    Brightness(u8),
    /// Relative adjustment.
    Delta(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_with_string_brightness() {
        let status: DeviceStatus = serde_json::from_str(
            r#"{"brightness":"30","current_effect":"fire","is_running":true,"total_effects":4}"#,
        )
        .unwrap();
        assert_eq!(status.brightness_percent(), Some(30.0));
        assert_eq!(status.current_effect.as_deref(), Some("fire"));
        assert_eq!(status.is_running, Some(true));
        assert_eq!(status.total_effects, Some(4));
    }

    #[test]
    fn test_status_with_numeric_brightness() {
        let status: DeviceStatus = serde_json::from_str(r#"{"brightness":72}"#).unwrap();
        assert_eq!(status.brightness_percent(), Some(72.0));
        assert_eq!(status.current_effect, None);
    }

    #[test]
    fn test_unparseable_brightness() {
        let status: DeviceStatus = serde_json::from_str(r#"{"brightness":""}"#).unwrap();
        assert_eq!(status.brightness_percent(), None);
    }

    #[test]
    fn test_zero_brightness_is_a_value() {
        let status: DeviceStatus = serde_json::from_str(r#"{"brightness":"0"}"#).unwrap();
        assert_eq!(status.brightness_percent(), Some(0.0));
    }

    #[test]
    fn test_effect_from_index() {
        let catalog: Vec<String> = vec!["rainbow".into(), "fire".into()];
        let status: DeviceStatus = serde_json::from_str(r#"{"current_effect_index":1}"#).unwrap();
        assert_eq!(status.effect_in(&catalog).as_deref(), Some("fire"));

        let named: DeviceStatus =
            serde_json::from_str(r#"{"current_effect":"rainbow","current_effect_index":1}"#)
                .unwrap();
        assert_eq!(named.effect_in(&catalog).as_deref(), Some("rainbow"));

        let stale: DeviceStatus = serde_json::from_str(r#"{"current_effect_index":5}"#).unwrap();
        assert_eq!(stale.effect_in(&catalog), None);
        let negative: DeviceStatus =
            serde_json::from_str(r#"{"current_effect_index":-1}"#).unwrap();
        assert_eq!(negative.effect_in(&catalog), None);
    }

    #[test]
    fn test_effect_list_current_and_total() {
        let list: EffectList = serde_json::from_str(
            r#"{"effects":["rainbow","fire","static"],"total":3,"current_index":2}"#,
        )
        .unwrap();
        assert_eq!(list.current().as_deref(), Some("static"));
        assert!(!list.is_truncated());

        let short: EffectList =
            serde_json::from_str(r#"{"effects":["rainbow"],"total":4}"#).unwrap();
        assert!(short.is_truncated());
        assert_eq!(short.current(), None);
    }

    #[test]
    fn test_brightness_request_shape() {
        let abs = serde_json::to_value(BrightnessRequest::Brightness(55)).unwrap();
        assert_eq!(abs, serde_json::json!({"brightness": 55}));
        let rel = serde_json::to_value(BrightnessRequest::Delta(-5)).unwrap();
        assert_eq!(rel, serde_json::json!({"delta": -5}));
    }
}
