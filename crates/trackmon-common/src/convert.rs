//! Conversions between the wire (protobuf) and domain metric forms.

use crate::metric::{Metric, MetricError, MetricKind};
use crate::proto;

pub fn kind_to_proto(kind: MetricKind) -> proto::Type {
    match kind {
        MetricKind::Counter => proto::Type::Counter,
        MetricKind::Gauge => proto::Type::Gauge,
    }
}

pub fn kind_from_proto(t: proto::Type) -> Result<MetricKind, MetricError> {
    match t {
        proto::Type::Counter => Ok(MetricKind::Counter),
        proto::Type::Gauge => Ok(MetricKind::Gauge),
        proto::Type::Unknown => Err(MetricError::NoSuchMetricType),
    }
}

pub fn to_proto(m: &Metric) -> Result<proto::Metric, MetricError> {
    let value = match m.kind {
        MetricKind::Counter => {
            proto::metric::Value::Counter(m.delta.ok_or(MetricError::MissingValue)?)
        }
        MetricKind::Gauge => {
            proto::metric::Value::Gauge(m.value.ok_or(MetricError::MissingValue)?)
        }
    };
    Ok(proto::Metric {
        id: m.id.clone(),
        hash: m.hash.clone(),
        r#type: kind_to_proto(m.kind) as i32,
        value: Some(value),
    })
}

pub fn from_proto(pm: &proto::Metric) -> Result<Metric, MetricError> {
    let kind = kind_from_proto(pm.r#type())?;
    let mut m = match (kind, pm.value.as_ref()) {
        (MetricKind::Counter, Some(proto::metric::Value::Counter(d))) => {
            Metric::counter(pm.id.clone(), *d)
        }
        (MetricKind::Gauge, Some(proto::metric::Value::Gauge(v))) => {
            Metric::gauge(pm.id.clone(), *v)
        }
        _ => return Err(MetricError::MissingValue),
    };
    m.hash = pm.hash.clone();
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proto_round_trip() {
        let mut m = Metric::counter("PollCount", 7);
        m.hash = "deadbeef".to_string();
        let pm = to_proto(&m).unwrap();
        assert_eq!(pm.r#type(), proto::Type::Counter);
        assert_eq!(from_proto(&pm).unwrap(), m);

        let g = Metric::gauge("Alloc", 2.25);
        let pg = to_proto(&g).unwrap();
        assert_eq!(from_proto(&pg).unwrap(), g);
    }

    #[test]
    fn unknown_type_and_missing_value_fail() {
        assert_eq!(
            kind_from_proto(proto::Type::Unknown),
            Err(MetricError::NoSuchMetricType)
        );

        let mut m = Metric::counter("x", 1);
        m.delta = None;
        assert_eq!(to_proto(&m), Err(MetricError::MissingValue));

        // counter tag with a gauge payload
        let pm = proto::Metric {
            id: "x".to_string(),
            hash: String::new(),
            r#type: proto::Type::Counter as i32,
            value: Some(proto::metric::Value::Gauge(1.0)),
        };
        assert_eq!(from_proto(&pm), Err(MetricError::MissingValue));
    }
}
