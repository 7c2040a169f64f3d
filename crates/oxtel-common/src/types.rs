use serde::{Deserialize, Serialize};

/// Metric kind, which decides how the collector aggregates repeated samples.
///
/// # Examples
///
/// ```
/// use oxtel_common::types::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(MetricKind::Gauge.to_string(), "gauge");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Gauge => write!(f, "gauge"),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            _ => Err(format!("unknown metric kind: {s}")),
        }
    }
}

/// Sampled value. The variant doubles as the metric kind, so a record can
/// never carry both a delta and a gauge value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(i64),
    Gauge(f64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
        }
    }
}

/// One named sample, the unit that flows through the delivery pipeline.
///
/// On the wire a record is `{"id", "type", "delta" | "value"}`; decoding
/// rejects objects whose populated field does not match their `type`.
///
/// # Examples
///
/// ```
/// use oxtel_common::types::{MetricKind, MetricRecord};
///
/// let poll = MetricRecord::counter("PollCount", 3);
/// assert_eq!(poll.kind(), MetricKind::Counter);
///
/// let json = serde_json::to_string(&poll).unwrap();
/// assert_eq!(json, r#"{"id":"PollCount","type":"counter","delta":3}"#);
///
/// let bad = r#"{"id":"Alloc","type":"gauge","delta":1}"#;
/// assert!(serde_json::from_str::<MetricRecord>(bad).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireMetric", try_from = "WireMetric")]
pub struct MetricRecord {
    pub name: String,
    pub value: MetricValue,
}

impl MetricRecord {
    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Counter(delta),
        }
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// Identity used by the receiving side to combine samples.
    pub fn identity(&self) -> (&str, MetricKind) {
        (&self.name, self.kind())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMetric {
    id: String,
    #[serde(rename = "type")]
    kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
}

impl From<MetricRecord> for WireMetric {
    fn from(record: MetricRecord) -> Self {
        let (delta, value) = match record.value {
            MetricValue::Counter(d) => (Some(d), None),
            MetricValue::Gauge(v) => (None, Some(v)),
        };
        Self {
            id: record.name,
            kind: record.value.kind(),
            delta,
            value,
        }
    }
}

impl TryFrom<WireMetric> for MetricRecord {
    type Error = String;

    fn try_from(wire: WireMetric) -> Result<Self, Self::Error> {
        let value = match (wire.kind, wire.delta, wire.value) {
            (MetricKind::Counter, Some(d), None) => MetricValue::Counter(d),
            (MetricKind::Gauge, None, Some(v)) => MetricValue::Gauge(v),
            (kind, _, _) => {
                return Err(format!(
                    "metric '{}' of type {kind} must carry exactly its own value field",
                    wire.id
                ))
            }
        };
        Ok(Self {
            name: wire.id,
            value,
        })
    }
}

/// Records produced by a single poll tick, in collection order.
pub type Snapshot = Vec<MetricRecord>;

/// A group of records transmitted together in one delivery.
pub type Batch = Vec<MetricRecord>;

/// Per-batch result reported by a delivery worker. Observability only; a
/// failed batch is never requeued.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub worker_id: usize,
    pub batch_len: usize,
    /// Network attempts made, including the successful one.
    pub attempts: u32,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauge_serializes_without_delta() {
        let json = serde_json::to_value(MetricRecord::gauge("Alloc", 1.5)).unwrap();
        assert_eq!(json["id"], "Alloc");
        assert_eq!(json["type"], "gauge");
        assert_eq!(json["value"], 1.5);
        assert!(json.get("delta").is_none());
    }

    #[test]
    fn decode_rejects_both_fields() {
        let raw = r#"{"id":"PollCount","type":"counter","delta":1,"value":2.0}"#;
        assert!(serde_json::from_str::<MetricRecord>(raw).is_err());
    }

    #[test]
    fn decode_rejects_missing_value() {
        let raw = r#"{"id":"PollCount","type":"counter"}"#;
        assert!(serde_json::from_str::<MetricRecord>(raw).is_err());
    }

    #[test]
    fn decode_batch_array() {
        let raw = r#"[{"id":"PollCount","type":"counter","delta":7},{"id":"Sys","type":"gauge","value":0.25}]"#;
        let batch: Batch = serde_json::from_str(raw).unwrap();
        assert_eq!(batch[0], MetricRecord::counter("PollCount", 7));
        assert_eq!(batch[1], MetricRecord::gauge("Sys", 0.25));
    }

    #[test]
    fn identity_pairs_name_and_kind() {
        let a = MetricRecord::gauge("x", 1.0);
        let b = MetricRecord::counter("x", 1);
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.identity(), ("x", MetricKind::Gauge));
    }

    #[test]
    fn outcome_success_follows_error() {
        let ok = DeliveryOutcome {
            worker_id: 0,
            batch_len: 5,
            attempts: 1,
            error: None,
        };
        assert!(ok.is_success());
        let failed = DeliveryOutcome {
            error: Some("boom".into()),
            ..ok
        };
        assert!(!failed.is_success());
    }
}
