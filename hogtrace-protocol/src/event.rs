use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::Value;

/// One capture emitted by a probe body, ready for the telemetry sink.
///
/// Positional `capture(...)` arguments are named `arg0..argN` in emission
/// order; named arguments keep their names.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureEvent {
    /// Instrumentation session this probe belongs to.
    pub session_id: String,
    /// Compile-time probe id.
    pub probe_id: String,
    /// Host request this firing was observed in.
    pub request_id: String,
    /// Seconds since the Unix epoch, stamped through the dispatcher's
    /// `timestamp` built-in so replays stay deterministic.
    pub timestamp: f64,
    /// Captured name → value pairs, in name order.
    pub values: BTreeMap<String, Value>,
}

impl fmt::Display for CaptureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "capture [probe: {}, request: {}, t: {:.6}]:",
            self.probe_id, self.request_id, self.timestamp
        )?;
        for (name, value) in &self.values {
            write!(f, " {name}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_for_the_sink() {
        let mut values = BTreeMap::new();
        values.insert("arg0".to_string(), Value::Int(42));
        values.insert("who".to_string(), Value::from("admin"));
        let event = CaptureEvent {
            session_id: "sess-1".into(),
            probe_id: "probe_0_00000000".into(),
            request_id: "req-9".into(),
            timestamp: 1700000000.25,
            values,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["probe_id"], "probe_0_00000000");
        assert_eq!(json["values"]["arg0"], 42);
        assert_eq!(json["values"]["who"], "admin");
    }

    #[test]
    fn display_is_single_line() {
        let event = CaptureEvent {
            session_id: "s".into(),
            probe_id: "p".into(),
            request_id: "r".into(),
            timestamp: 1.0,
            values: BTreeMap::from([("dur".to_string(), Value::Float(0.5))]),
        };
        assert!(event.to_string().contains("dur=0.5"));
    }
}
