use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hogtrace_protocol::{Value, SAMPLE_VERDICT_VAR};

use crate::dispatcher::{DispatchResult, Dispatcher, DispatcherError};

use super::frame::Frame;
use super::object::HostObject;

/// Reference dispatcher binding probe execution to an in-process
/// [`Frame`]. One instance serves one probe invocation.
pub struct FrameDispatcher<'a> {
    frame: &'a Frame,
    sampling: f32,
    rng: StdRng,
}

impl<'a> FrameDispatcher<'a> {
    pub fn new(frame: &'a Frame) -> Self {
        FrameDispatcher {
            frame,
            sampling: 1.0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Cache the program's global rate so the VM can read the
    /// per-request verdict through `__sample_ok__`.
    pub fn with_sampling(mut self, rate: f32) -> Self {
        self.sampling = rate;
        self
    }

    /// Deterministic RNG for tests and replay.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn expect_one(args: &[Value], function: &str) -> DispatchResult<()> {
        if args.len() == 1 {
            Ok(())
        } else {
            Err(DispatcherError::new(format!(
                "{function}() takes exactly one argument, got {}",
                args.len()
            )))
        }
    }
}

impl Dispatcher for FrameDispatcher<'_> {
    fn load_variable(&mut self, name: &str) -> DispatchResult<Value> {
        if name == SAMPLE_VERDICT_VAR {
            let draw: f64 = self.rng.gen();
            return Ok(Value::Bool(draw < f64::from(self.sampling)));
        }
        self.frame
            .lookup(name)
            .ok_or_else(|| DispatcherError::unknown_variable(name))
    }

    fn get_attribute(&mut self, obj: &Value, field: &str) -> DispatchResult<Value> {
        match HostObject::from_value(obj) {
            Some(HostObject::Map(entries)) => entries.get(field).cloned().ok_or_else(|| {
                DispatcherError::new(format!("object has no attribute '{field}'"))
            }),
            Some(HostObject::List(_)) => Err(DispatcherError::new(format!(
                "list has no attribute '{field}'"
            ))),
            None => Err(DispatcherError::new(format!(
                "{} has no attributes",
                obj.type_name()
            ))),
        }
    }

    fn get_item(&mut self, obj: &Value, key: &Value) -> DispatchResult<Value> {
        match (HostObject::from_value(obj), key) {
            (Some(HostObject::List(items)), Value::Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|idx| items.get(idx).cloned())
                .ok_or_else(|| DispatcherError::new(format!("list index {i} out of range"))),
            (Some(HostObject::Map(entries)), Value::String(k)) => entries
                .get(k)
                .cloned()
                .ok_or_else(|| DispatcherError::new(format!("key '{k}' not found"))),
            _ => Err(DispatcherError::new(format!(
                "cannot index {} with {}",
                obj.type_name(),
                key.type_name()
            ))),
        }
    }

    fn call_function(&mut self, name: &str, args: Vec<Value>) -> DispatchResult<Value> {
        match name {
            "timestamp" => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_err(|e| DispatcherError::new(format!("clock error: {e}")))?;
                Ok(Value::Float(now.as_secs_f64()))
            }
            "rand" => Ok(Value::Float(self.rng.gen())),
            "len" => {
                Self::expect_one(&args, "len")?;
                match &args[0] {
                    Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
                    obj @ Value::Object(_) => match HostObject::from_value(obj) {
                        Some(host) => Ok(Value::Int(host.len() as i64)),
                        None => Err(DispatcherError::new("object has no length")),
                    },
                    other => Err(DispatcherError::new(format!(
                        "{} has no length",
                        other.type_name()
                    ))),
                }
            }
            "str" => {
                Self::expect_one(&args, "str")?;
                Ok(Value::String(args[0].to_string()))
            }
            "int" => {
                Self::expect_one(&args, "int")?;
                match &args[0] {
                    Value::Int(i) => Ok(Value::Int(*i)),
                    Value::Float(f) => Ok(Value::Int(*f as i64)),
                    Value::Bool(b) => Ok(Value::Int(*b as i64)),
                    Value::String(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                        DispatcherError::new(format!("cannot convert '{s}' to int"))
                    }),
                    other => Err(DispatcherError::new(format!(
                        "cannot convert {} to int",
                        other.type_name()
                    ))),
                }
            }
            "float" => {
                Self::expect_one(&args, "float")?;
                match &args[0] {
                    Value::Float(f) => Ok(Value::Float(*f)),
                    Value::Int(i) => Ok(Value::Float(*i as f64)),
                    Value::Bool(b) => Ok(Value::Float(*b as i64 as f64)),
                    Value::String(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                        DispatcherError::new(format!("cannot convert '{s}' to float"))
                    }),
                    other => Err(DispatcherError::new(format!(
                        "cannot convert {} to float",
                        other.type_name()
                    ))),
                }
            }
            "bool" => {
                Self::expect_one(&args, "bool")?;
                let truthy = match &args[0] {
                    obj @ Value::Object(_) => self.truthy(obj),
                    other => other.is_truthy(),
                };
                Ok(Value::Bool(truthy))
            }
            _ => Err(DispatcherError::unknown_function(name)),
        }
    }

    /// Host lists and maps follow container truthiness; foreign handles
    /// stay truthy.
    fn truthy(&mut self, obj: &Value) -> bool {
        match HostObject::from_value(obj) {
            Some(host) => !host.is_empty(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_lookup_and_unknowns() {
        let frame = Frame::entry([Value::Int(7)]);
        let mut dispatcher = FrameDispatcher::new(&frame);
        assert_eq!(dispatcher.load_variable("arg0").unwrap(), Value::Int(7));
        assert!(dispatcher.load_variable("user").is_err());
    }

    #[test]
    fn attribute_and_item_access() {
        let payload = HostObject::map([(
            "data",
            HostObject::list([HostObject::map([("v", Value::Int(120))])]),
        )]);
        let frame = Frame::entry([payload]);
        let mut dispatcher = FrameDispatcher::new(&frame);

        let arg0 = dispatcher.load_variable("arg0").unwrap();
        let data = dispatcher.get_attribute(&arg0, "data").unwrap();
        let first = dispatcher.get_item(&data, &Value::Int(0)).unwrap();
        let v = dispatcher.get_item(&first, &Value::from("v")).unwrap();
        assert_eq!(v, Value::Int(120));
    }

    #[test]
    fn item_errors() {
        let frame = Frame::entry([HostObject::list([Value::Int(1)])]);
        let mut dispatcher = FrameDispatcher::new(&frame);
        let arg0 = dispatcher.load_variable("arg0").unwrap();
        assert!(dispatcher.get_item(&arg0, &Value::Int(5)).is_err());
        assert!(dispatcher.get_item(&arg0, &Value::from("x")).is_err());
        assert!(dispatcher.get_item(&Value::Int(3), &Value::Int(0)).is_err());
    }

    #[test]
    fn builtin_len() {
        let frame = Frame::entry([HostObject::list([Value::Int(1), Value::Int(2)])]);
        let mut dispatcher = FrameDispatcher::new(&frame);
        let arg0 = dispatcher.load_variable("arg0").unwrap();
        assert_eq!(
            dispatcher.call_function("len", vec![arg0]).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            dispatcher
                .call_function("len", vec![Value::from("abc")])
                .unwrap(),
            Value::Int(3)
        );
        assert!(dispatcher.call_function("len", vec![Value::Int(1)]).is_err());
    }

    #[test]
    fn builtin_coercions() {
        let frame = Frame::new();
        let mut dispatcher = FrameDispatcher::new(&frame);
        assert_eq!(
            dispatcher
                .call_function("int", vec![Value::from(" 42 ")])
                .unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            dispatcher
                .call_function("float", vec![Value::Int(2)])
                .unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            dispatcher
                .call_function("str", vec![Value::Float(1.5)])
                .unwrap(),
            Value::from("1.5")
        );
        assert_eq!(
            dispatcher
                .call_function("bool", vec![Value::from("")])
                .unwrap(),
            Value::Bool(false)
        );
        assert!(dispatcher
            .call_function("int", vec![Value::from("nope")])
            .is_err());
    }

    #[test]
    fn unknown_function_errors() {
        let frame = Frame::new();
        let mut dispatcher = FrameDispatcher::new(&frame);
        assert!(dispatcher.call_function("open", Vec::new()).is_err());
    }

    #[test]
    fn seeded_rng_is_deterministic() {
        let frame = Frame::new();
        let mut a = FrameDispatcher::new(&frame).with_seed(7);
        let mut b = FrameDispatcher::new(&frame).with_seed(7);
        assert_eq!(
            a.call_function("rand", Vec::new()).unwrap(),
            b.call_function("rand", Vec::new()).unwrap()
        );
    }

    #[test]
    fn sample_verdict_follows_the_rate() {
        let frame = Frame::new();
        let mut always = FrameDispatcher::new(&frame).with_seed(1).with_sampling(1.0);
        assert_eq!(
            always.load_variable(SAMPLE_VERDICT_VAR).unwrap(),
            Value::Bool(true)
        );
        let mut never = FrameDispatcher::new(&frame).with_seed(1).with_sampling(0.0);
        assert_eq!(
            never.load_variable(SAMPLE_VERDICT_VAR).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn container_truthiness() {
        let frame = Frame::new();
        let mut dispatcher = FrameDispatcher::new(&frame);
        let empty = HostObject::list([]);
        let full = HostObject::list([Value::Int(1)]);
        assert!(!dispatcher.truthy(&empty));
        assert!(dispatcher.truthy(&full));
        assert!(dispatcher.truthy(&Value::object(3u8)));
    }
}
