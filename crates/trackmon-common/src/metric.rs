use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::Sha256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MetricError {
    #[error("no such metric type")]
    NoSuchMetricType,
    #[error("signing key is too short")]
    TooShortKey,
    #[error("metric carries no value for its type")]
    MissingValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Gauge => write!(f, "gauge"),
        }
    }
}

impl FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            _ => Err(MetricError::NoSuchMetricType),
        }
    }
}

/// Universal metric record exchanged between agent, server, and storage.
///
/// Exactly one of `delta`/`value` is populated, matching `kind`; the JSON
/// shape omits the inactive field entirely. `hash` is the lowercase hex
/// HMAC-SHA256 over the canonical string and is only present when a
/// signing key is in play.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hash: String,
}

// The decoder reads the `type` tag first and keeps only the matching
// numeric field; unknown tags are rejected.
impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            id: String,
            #[serde(rename = "type")]
            kind: String,
            delta: Option<i64>,
            value: Option<f64>,
            #[serde(default)]
            hash: String,
        }

        let raw = Raw::deserialize(deserializer)?;
        let kind = raw.kind.parse::<MetricKind>().map_err(serde::de::Error::custom)?;
        let (delta, value) = match kind {
            MetricKind::Counter => (raw.delta, None),
            MetricKind::Gauge => (None, raw.value),
        };
        Ok(Metric {
            id: raw.id,
            kind,
            delta,
            value,
            hash: raw.hash,
        })
    }
}

impl Metric {
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Metric {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
            hash: String::new(),
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Metric {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
            hash: String::new(),
        }
    }

    /// Canonical string the MAC is computed over.
    ///
    /// Gauges are rendered with a fixed 6-decimal precision; the verifier
    /// must regenerate the exact same bytes, so this is the one and only
    /// float rendering used for signing.
    fn canonical(&self) -> Result<String, MetricError> {
        match self.kind {
            MetricKind::Counter => {
                let delta = self.delta.ok_or(MetricError::MissingValue)?;
                Ok(format!("{}:counter:{}", self.id, delta))
            }
            MetricKind::Gauge => {
                let value = self.value.ok_or(MetricError::MissingValue)?;
                Ok(format!("{}:gauge:{:.6}", self.id, value))
            }
        }
    }

    /// Computes the HMAC-SHA256 signature and stores it as lowercase hex.
    pub fn sign(&mut self, key: &[u8]) -> Result<(), MetricError> {
        if key.len() < 3 {
            return Err(MetricError::TooShortKey);
        }
        let src = self.canonical()?;
        let mut mac =
            Hmac::<Sha256>::new_from_slice(key).map_err(|_| MetricError::TooShortKey)?;
        mac.update(src.as_bytes());
        self.hash = hex::encode(mac.finalize().into_bytes());
        Ok(())
    }

    /// Re-signs a copy with `key` and compares the result against the
    /// carried hash.
    pub fn verify(&self, key: &[u8]) -> Result<bool, MetricError> {
        let mut probe = self.clone();
        probe.sign(key)?;
        Ok(probe.hash == self.hash)
    }

    /// Listing line: `"<kind> - <id> - <value>[ - <hash>]"`.
    pub fn string_full(&self) -> String {
        let mut out = match (self.kind, self.delta, self.value) {
            (MetricKind::Counter, Some(d), _) => format!("{} - {} - {}", self.kind, self.id, d),
            (MetricKind::Gauge, _, Some(v)) => format!("{} - {} - {}", self.kind, self.id, v),
            _ => format!("{} - {}", self.kind, self.id),
        };
        if !self.hash.is_empty() {
            out.push_str(" - ");
            out.push_str(&self.hash);
        }
        out
    }
}

// Bare value rendering; empty when the numeric field is absent.
impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MetricKind::Counter => match self.delta {
                Some(d) => write!(f, "{d}"),
                None => Ok(()),
            },
            MetricKind::Gauge => match self.value {
                Some(v) => write!(f, "{v}"),
                None => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_json_omits_value_and_hash() {
        let m = Metric::counter("PollCount", 3);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"id":"PollCount","type":"counter","delta":3}"#);
    }

    #[test]
    fn gauge_json_omits_delta() {
        let m = Metric::gauge("Alloc", 819632.0);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["type"], "gauge");
        assert_eq!(json["value"], 819632.0);
        assert!(json.get("delta").is_none());
    }

    #[test]
    fn json_round_trip_preserves_fields() {
        let mut m = Metric::gauge("HeapSys", 1.5);
        m.sign(b"topSecret").unwrap();
        let json = serde_json::to_string(&m).unwrap();
        let back: Metric = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let err = serde_json::from_str::<Metric>(r#"{"id":"x","type":"histogram","value":1}"#)
            .unwrap_err();
        assert!(err.to_string().contains("no such metric type"));
    }

    #[test]
    fn decode_keeps_only_matching_numeric() {
        let m: Metric =
            serde_json::from_str(r#"{"id":"x","type":"counter","delta":2,"value":9.5}"#).unwrap();
        assert_eq!(m.delta, Some(2));
        assert_eq!(m.value, None);
    }

    #[test]
    fn decode_allows_absent_numeric() {
        // value queries carry only id and type
        let m: Metric = serde_json::from_str(r#"{"id":"x","type":"gauge"}"#).unwrap();
        assert_eq!(m.value, None);
        assert_eq!(m.to_string(), "");
    }

    #[test]
    fn sign_is_idempotent_and_key_sensitive() {
        let mut a = Metric::counter("x", 1);
        a.sign(b"topSecret").unwrap();
        let first = a.hash.clone();
        a.sign(b"topSecret").unwrap();
        assert_eq!(a.hash, first);
        assert!(a.verify(b"topSecret").unwrap());
        assert!(!a.verify(b"otherKey").unwrap());
    }

    #[test]
    fn sign_rejects_short_key() {
        let mut m = Metric::counter("x", 1);
        assert_eq!(m.sign(b"ab"), Err(MetricError::TooShortKey));
    }

    #[test]
    fn sign_requires_active_value() {
        let mut m = Metric::counter("x", 1);
        m.delta = None;
        assert_eq!(m.sign(b"topSecret"), Err(MetricError::MissingValue));
    }

    #[test]
    fn gauge_canonical_uses_fixed_precision() {
        // 1.5 and 1.50 must produce the same MAC
        let mut a = Metric::gauge("g", 1.5);
        let mut b = Metric::gauge("g", 1.50);
        a.sign(b"topSecret").unwrap();
        b.sign(b"topSecret").unwrap();
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn rendering() {
        let c = Metric::counter("PollCount", 5);
        assert_eq!(c.to_string(), "5");
        assert_eq!(c.string_full(), "counter - PollCount - 5");

        let mut g = Metric::gauge("Alloc", 0.5);
        g.hash = "abc".to_string();
        assert_eq!(g.to_string(), "0.5");
        assert_eq!(g.string_full(), "gauge - Alloc - 0.5 - abc");
    }

    #[test]
    fn kind_parses_and_displays() {
        assert_eq!("counter".parse::<MetricKind>().unwrap(), MetricKind::Counter);
        assert_eq!("gauge".parse::<MetricKind>().unwrap(), MetricKind::Gauge);
        assert_eq!(
            "histogram".parse::<MetricKind>().unwrap_err(),
            MetricError::NoSuchMetricType
        );
        assert_eq!(MetricKind::Gauge.to_string(), "gauge");
    }
}
