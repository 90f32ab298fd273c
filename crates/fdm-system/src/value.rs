//! Named-field aggregates used for outputs (Y), inputs (U) and discrete state (S).
//!
//! A [`Value`] is a small tree: scalar leaves, flat numeric vectors and
//! order-preserving [`Record`]s. The shape of a value is fixed when a system is
//! built; afterwards only the numbers inside change. All mutating helpers in
//! this module either write in place or fail with
//! [`SystemError::ShapeMismatch`], so a container is never resized by an update.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{SystemError, SystemResult};

/// A dynamically shaped, statically sized value.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Scalar(f64),
    Vector(Vec<f64>),
    Record(Record),
}

/// Order-preserving name → value aggregate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    names: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a field, replacing an existing one with the same name in place.
    ///
    /// Returns the field's index.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> usize {
        let name = name.into();
        let value = value.into();
        match self.index_of(&name) {
            Some(i) => {
                self.values[i] = value;
                i
            }
            None => {
                self.names.push(name);
                self.values.push(value);
                self.values.len() - 1
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of a field by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.index_of(name).map(|i| &self.values[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.index_of(name).map(move |i| &mut self.values[i])
    }

    /// Field by position (the hot-path accessor; resolve the index once).
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut Value> {
        self.values.get_mut(index)
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Value)> {
        self.names.iter().map(String::as_str).zip(self.values.iter_mut())
    }
}

impl<N: Into<String>, V: Into<Value>> FromIterator<(N, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Value {
    /// Short shape description used in error messages.
    pub fn kind_name(&self) -> String {
        match self {
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Scalar(_) => "scalar".to_string(),
            Value::Vector(v) => format!("vector[{}]", v.len()),
            Value::Record(r) => {
                let names: Vec<&str> = r.names().collect();
                format!("record{{{}}}", names.join(","))
            }
        }
    }

    /// True if both values have the same variant, lengths and field names,
    /// recursively. Numbers are ignored.
    pub fn same_shape(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(_), Value::Bool(_))
            | (Value::Int(_), Value::Int(_))
            | (Value::Scalar(_), Value::Scalar(_)) => true,
            (Value::Vector(a), Value::Vector(b)) => a.len() == b.len(),
            (Value::Record(a), Value::Record(b)) => {
                a.names == b.names
                    && a.values
                        .iter()
                        .zip(b.values.iter())
                        .all(|(x, y)| x.same_shape(y))
            }
            _ => false,
        }
    }

    /// Copy `other` into `self` without reallocating.
    pub fn assign_from(&mut self, other: &Value) -> SystemResult<()> {
        if !self.same_shape(other) {
            return Err(SystemError::shape(
                "value assignment",
                self.kind_name(),
                other.kind_name(),
            ));
        }
        self.copy_same_shape(other);
        Ok(())
    }

    fn copy_same_shape(&mut self, other: &Value) {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => *a = *b,
            (Value::Int(a), Value::Int(b)) => *a = *b,
            (Value::Scalar(a), Value::Scalar(b)) => *a = *b,
            (Value::Vector(a), Value::Vector(b)) => a.copy_from_slice(b),
            (Value::Record(a), Value::Record(b)) => {
                for (x, y) in a.values.iter_mut().zip(b.values.iter()) {
                    x.copy_same_shape(y);
                }
            }
            _ => {}
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric leaf as a slice (a scalar is a one-element slice).
    pub fn as_slice(&self) -> Option<&[f64]> {
        match self {
            Value::Scalar(v) => Some(std::slice::from_ref(v)),
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_slice_mut(&mut self) -> Option<&mut [f64]> {
        match self {
            Value::Scalar(v) => Some(std::slice::from_mut(v)),
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Element `j` of a numeric leaf.
    pub fn component(&self, j: usize) -> Option<f64> {
        self.as_slice().and_then(|s| s.get(j).copied())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_record().and_then(|r| r.get(name))
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.as_record_mut().and_then(|r| r.get_mut(name))
    }

    /// Look up a dotted path such as `"servo.actuator.throttle"`.
    ///
    /// The empty path addresses `self`.
    pub fn lookup(&self, dotted: &str) -> Option<&Value> {
        if dotted.is_empty() {
            return Some(self);
        }
        dotted.split('.').try_fold(self, |cur, name| cur.field(name))
    }

    pub fn lookup_mut(&mut self, dotted: &str) -> Option<&mut Value> {
        if dotted.is_empty() {
            return Some(self);
        }
        let mut cur = self;
        for name in dotted.split('.') {
            cur = cur.field_mut(name)?;
        }
        Some(cur)
    }

    /// Convert a dotted path into positional indices, for hot-path access.
    pub fn index_path(&self, dotted: &str) -> Option<Vec<usize>> {
        let mut out = Vec::new();
        if dotted.is_empty() {
            return Some(out);
        }
        let mut cur = self;
        for name in dotted.split('.') {
            let record = cur.as_record()?;
            let i = record.index_of(name)?;
            out.push(i);
            cur = &record.values[i];
        }
        Some(out)
    }

    /// Follow positional indices.
    pub fn resolve(&self, path: &[usize]) -> Option<&Value> {
        path.iter()
            .try_fold(self, |cur, &i| cur.as_record().and_then(|r| r.at(i)))
    }

    pub fn resolve_mut(&mut self, path: &[usize]) -> Option<&mut Value> {
        let mut cur = self;
        for &i in path {
            cur = match cur {
                Value::Record(r) => r.values.get_mut(i)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    /// Overwrite a scalar leaf in place.
    pub fn set_f64(&mut self, v: f64) -> SystemResult<()> {
        match self {
            Value::Scalar(x) => {
                *x = v;
                Ok(())
            }
            other => Err(SystemError::shape("scalar write", "scalar", other.kind_name())),
        }
    }

    pub fn set_int(&mut self, v: i64) -> SystemResult<()> {
        match self {
            Value::Int(x) => {
                *x = v;
                Ok(())
            }
            other => Err(SystemError::shape("int write", "int", other.kind_name())),
        }
    }

    pub fn set_bool(&mut self, v: bool) -> SystemResult<()> {
        match self {
            Value::Bool(x) => {
                *x = v;
                Ok(())
            }
            other => Err(SystemError::shape("bool write", "bool", other.kind_name())),
        }
    }

    /// Copy a numeric slice into a vector or scalar leaf of equal length.
    pub fn set_slice(&mut self, v: &[f64]) -> SystemResult<()> {
        if let Some(dst) = self.as_slice_mut() {
            if dst.len() == v.len() {
                dst.copy_from_slice(v);
                return Ok(());
            }
        }
        Err(SystemError::shape(
            "slice write",
            self.kind_name(),
            format!("vector[{}]", v.len()),
        ))
    }

    /// Set a scalar field of a record, addressed by dotted path.
    pub fn set_path_f64(&mut self, dotted: &str, v: f64) -> SystemResult<()> {
        self.lookup_mut(dotted)
            .ok_or_else(|| SystemError::FieldNotFound {
                path: dotted.to_string(),
            })?
            .set_f64(v)
    }

    /// Read a scalar field of a record, addressed by dotted path.
    pub fn get_path_f64(&self, dotted: &str) -> SystemResult<f64> {
        let value = self.lookup(dotted).ok_or_else(|| SystemError::FieldNotFound {
            path: dotted.to_string(),
        })?;
        value
            .as_f64()
            .ok_or_else(|| SystemError::shape(dotted, "scalar", value.kind_name()))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

impl<const N: usize> From<[f64; N]> for Value {
    fn from(v: [f64; N]) -> Self {
        Value::Vector(v.to_vec())
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Value {
        Record::new()
            .with("osc", Record::new().with("pos", 1.0).with("vel", 0.0))
            .with("counter", Record::new().with("count", 0_i64))
            .with("gains", [1.0, 2.0, 3.0])
            .into()
    }

    #[test]
    fn record_preserves_insertion_order() {
        let r = Record::new().with("b", 1.0).with("a", 2.0).with("c", 3.0);
        let names: Vec<&str> = r.names().collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn record_insert_replaces_in_place() {
        let mut r = Record::new().with("a", 1.0).with("b", 2.0);
        let idx = r.insert("a", 5.0);
        assert_eq!(idx, 0);
        assert_eq!(r.len(), 2);
        assert_eq!(r.get("a"), Some(&Value::Scalar(5.0)));
    }

    #[test]
    fn lookup_and_index_path_agree() {
        let v = sample();
        let path = v.index_path("osc.vel").unwrap();
        assert_eq!(path, vec![0, 1]);
        assert_eq!(v.resolve(&path), v.lookup("osc.vel"));
        assert!(v.lookup("osc.missing").is_none());
        assert!(v.index_path("gains.x").is_none());
        assert_eq!(v.lookup(""), Some(&v));
    }

    #[test]
    fn assign_from_rejects_shape_change() {
        let mut v = sample();
        let mut other = sample();
        other.set_path_f64("osc.pos", 7.0).unwrap();
        v.assign_from(&other).unwrap();
        assert_eq!(v.get_path_f64("osc.pos").unwrap(), 7.0);

        let wrong: Value = Record::new().with("osc", 1.0).into();
        let err = v.assign_from(&wrong).unwrap_err();
        assert!(matches!(err, SystemError::ShapeMismatch { .. }));
    }

    #[test]
    fn typed_setters_keep_variant() {
        let mut v = Value::Scalar(1.0);
        assert!(v.set_int(3).is_err());
        v.set_f64(2.0).unwrap();
        assert_eq!(v, Value::Scalar(2.0));

        let mut vec = Value::from([0.0, 0.0]);
        assert!(vec.set_slice(&[1.0]).is_err());
        vec.set_slice(&[1.0, 2.0]).unwrap();
        assert_eq!(vec.component(1), Some(2.0));
    }

    #[test]
    fn record_serializes_as_object() {
        let v = sample();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(
            json,
            r#"{"osc":{"pos":1.0,"vel":0.0},"counter":{"count":0},"gains":[1.0,2.0,3.0]}"#
        );
    }

    proptest! {
        #[test]
        fn assign_preserves_shape(data in prop::collection::vec(-1e3_f64..1e3, 1..8)) {
            let mut target = Value::Vector(vec![0.0; data.len()]);
            let source = Value::Vector(data.clone());
            target.assign_from(&source).unwrap();
            prop_assert!(target.same_shape(&source));
            prop_assert_eq!(target.as_slice().unwrap(), data.as_slice());
        }
    }
}
