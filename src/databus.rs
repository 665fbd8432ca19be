//! Key-path data bus: hierarchical values addressed by `/` separated keys.
//!
//! The first segment of a key selects a namespace, every following segment a member of the
//! current value: a map key, a list index or a record field, decided by the kind of the value
//! the segment is applied to.
//!
//! ```
//! use rs_wholebody_model::databus::{DataBus, Value};
//!
//! let mut bus = DataBus::new();
//! bus.set_data("goal", Value::map([("joints", Value::List(vec![0.1.into(), 0.2.into()]))])).unwrap();
//! bus.set_data("goal/joints/1", 0.5.into()).unwrap();
//! assert_eq!(bus.get_data("goal/joints/1").unwrap().as_f64(), Some(0.5));
//! ```

use std::collections::BTreeMap;
use crate::joint_state::JointState;
use crate::model_error::ModelError;

pub const SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Named structure with a fixed set of fields
    Record {
        type_name: String,
        fields: BTreeMap<String, Value>,
    },
}

impl Value {
    pub fn map<'a, I: IntoIterator<Item=(&'a str, Value)>>(entries: I) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    pub fn record<'a, I: IntoIterator<Item=(&'a str, Value)>>(type_name: &str, fields: I) -> Self {
        Value::Record {
            type_name: type_name.to_string(),
            fields: fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Record { .. } => "record",
        }
    }

    /// Member of this value addressed by one key segment.
    pub fn resolve(&self, segment: &str) -> Result<&Value, ModelError> {
        let missing = || ModelError::KeyPath(format!("no member '{}' in {}", segment, self.kind()));
        match self {
            Value::Map(entries) => entries.get(segment).ok_or_else(missing),
            Value::List(items) => items.get(parse_index(segment)?).ok_or_else(missing),
            Value::Record { fields, .. } => fields.get(segment).ok_or_else(missing),
            _ => Err(missing()),
        }
    }

    pub fn resolve_mut(&mut self, segment: &str) -> Result<&mut Value, ModelError> {
        let missing = ModelError::KeyPath(format!("no member '{}' in {}", segment, self.kind()));
        let member = match self {
            Value::Map(entries) => entries.get_mut(segment),
            Value::List(items) => items.get_mut(parse_index(segment)?),
            Value::Record { fields, .. } => fields.get_mut(segment),
            _ => None,
        };
        member.ok_or(missing)
    }

    /// Sets the member addressed by the segment. Maps accept new keys, list indices and record
    /// fields must exist.
    pub fn assign(&mut self, segment: &str, value: Value) -> Result<(), ModelError> {
        if let Value::Map(entries) = self {
            entries.insert(segment.to_string(), value);
            return Ok(());
        }
        *self.resolve_mut(segment)? = value;
        Ok(())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

fn parse_index(segment: &str) -> Result<usize, ModelError> {
    segment.parse::<usize>()
        .map_err(|_| ModelError::KeyPath(format!("'{}' is not a list index", segment)))
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

/// Joint name to a `SingleJointState` record with position and velocity.
impl From<&JointState> for Value {
    fn from(state: &JointState) -> Self {
        Value::Map(state.iter()
            .map(|(name, joint)| (name.to_string(), Value::record("SingleJointState", [
                ("position", Value::Float(joint.position)),
                ("velocity", Value::Float(joint.velocity)),
            ])))
            .collect())
    }
}

/// Shared store of the values passed between processing stages.
#[derive(Debug, Clone, Default)]
pub struct DataBus {
    data: BTreeMap<String, Value>,
}

impl DataBus {
    pub fn new() -> Self {
        DataBus::default()
    }

    pub fn get_data(&self, key: &str) -> Result<&Value, ModelError> {
        let mut segments = key.split(SEPARATOR);
        let namespace = segments.next().unwrap_or_default();
        let mut value = self.data.get(namespace)
            .ok_or_else(|| ModelError::KeyPath(format!("unknown namespace '{}'", namespace)))?;
        for segment in segments {
            value = value.resolve(segment)?;
        }
        Ok(value)
    }

    /// Sets the value at the key. A bare namespace is created or replaced. Members can only
    /// be set inside an existing namespace, along a path of existing values.
    pub fn set_data(&mut self, key: &str, value: Value) -> Result<(), ModelError> {
        let segments: Vec<&str> = key.split(SEPARATOR).collect();
        let (namespace, members) = match segments.split_first() {
            Some((namespace, members)) => (*namespace, members),
            None => return Err(ModelError::KeyPath("empty key".into())),
        };
        let Some((last, path)) = members.split_last() else {
            self.data.insert(namespace.to_string(), value);
            return Ok(());
        };
        let mut target = self.data.get_mut(namespace)
            .ok_or_else(|| ModelError::KeyPath(format!(
                "cannot set member of unknown namespace '{}'", namespace)))?;
        for segment in path {
            target = target.resolve_mut(segment)?;
        }
        target.assign(last, value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get_data(key).is_ok()
    }

    /// Publishes the joint state under the namespace.
    pub fn set_joint_state(&mut self, namespace: &str, state: &JointState) {
        self.data.insert(namespace.to_string(), Value::from(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn robot_bus() -> DataBus {
        let mut bus = DataBus::new();
        bus.set_data("robot", Value::map([
            ("name", "pr2".into()),
            ("base", Value::record("Pose", [("x", 1.0.into()), ("y", 2.0.into())])),
            ("goals", Value::List(vec![Value::Int(3), Value::Int(4)])),
        ])).unwrap();
        bus
    }

    #[test]
    fn test_get_nested() {
        let bus = robot_bus();
        assert_eq!(bus.get_data("robot/name").unwrap().as_str(), Some("pr2"));
        assert_eq!(bus.get_data("robot/base/y").unwrap().as_f64(), Some(2.0));
        assert_eq!(bus.get_data("robot/goals/1").unwrap(), &Value::Int(4));
        assert!(matches!(bus.get_data("robot/goals/2"), Err(ModelError::KeyPath(_))));
        assert!(matches!(bus.get_data("robot/goals/first"), Err(ModelError::KeyPath(_))));
        assert!(matches!(bus.get_data("robot/name/0"), Err(ModelError::KeyPath(_))));
        assert!(matches!(bus.get_data("world"), Err(ModelError::KeyPath(_))));
    }

    #[test]
    fn test_set_rules() {
        let mut bus = robot_bus();
        // Unknown namespace cannot get members
        assert!(bus.set_data("world/gravity", 9.81.into()).is_err());
        // but can be created
        bus.set_data("world", Value::map([])).unwrap();
        bus.set_data("world/gravity", 9.81.into()).unwrap();
        assert_eq!(bus.get_data("world/gravity").unwrap().as_f64(), Some(9.81));

        bus.set_data("robot/goals/0", Value::Int(7)).unwrap();
        assert_eq!(bus.get_data("robot/goals/0").unwrap(), &Value::Int(7));
        assert!(bus.set_data("robot/goals/5", Value::Int(7)).is_err());

        bus.set_data("robot/base/x", 0.5.into()).unwrap();
        assert_eq!(bus.get_data("robot/base/x").unwrap().as_f64(), Some(0.5));
        assert!(bus.set_data("robot/base/z", 0.5.into()).is_err());

        bus.set_data("robot", Value::Null).unwrap();
        assert_eq!(bus.get_data("robot").unwrap(), &Value::Null);
    }

    #[test]
    fn test_joint_state() {
        let mut state = JointState::new();
        state.set_position("elbow", 0.25);
        let mut bus = DataBus::new();
        bus.set_joint_state("js", &state);
        assert_eq!(bus.get_data("js/elbow/position").unwrap().as_f64(), Some(0.25));
        assert_eq!(bus.get_data("js/elbow/velocity").unwrap().as_f64(), Some(0.0));
    }
}
