//! Dynamic, mapping-shaped derived props.

use super::equality::{Identical, ShallowEq};
use crate::error::{Result, StoreError};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A single derived-prop value.
///
/// Scalars and strings compare by value. `List`, `Map` and `Opaque` are
/// shared references and compare by pointer under [`Identical`].
#[derive(Clone, Debug)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Arc<Vec<PropValue>>),
    Map(Arc<Props>),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl PropValue {
    /// Wrap an arbitrary value behind a fresh shared reference.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        PropValue::Opaque(Arc::new(value))
    }

    /// Share an existing reference without changing its identity.
    pub fn shared<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        PropValue::Opaque(value)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the opaque payload as `T`, if that is what it holds.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            PropValue::Opaque(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl Identical for PropValue {
    fn identical(&self, other: &Self) -> bool {
        use PropValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a.identical(b),
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64).identical(b),
            (Str(a), Str(b)) => a == b,
            (List(a), List(b)) => Arc::ptr_eq(a, b),
            (Map(a), Map(b)) => Arc::ptr_eq(a, b),
            (Opaque(a), Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl ShallowEq for PropValue {
    /// Identity first; only top-level maps fall back to key-by-key.
    fn shallow_eq(&self, other: &Self) -> bool {
        if self.identical(other) {
            return true;
        }
        match (self, other) {
            (PropValue::Map(a), PropValue::Map(b)) => a.shallow_eq(b),
            _ => false,
        }
    }
}

macro_rules! prop_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PropValue {
                fn from(value: $ty) -> Self {
                    PropValue::$variant(value.into())
                }
            }
        )*
    };
}

prop_value_from!(
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    &str => Str,
    String => Str,
    Arc<str> => Str,
    Arc<Vec<PropValue>> => List,
    Arc<Props> => Map,
);

impl From<usize> for PropValue {
    fn from(value: usize) -> Self {
        match i64::try_from(value) {
            Ok(i) => PropValue::Int(i),
            Err(_) => PropValue::Float(value as f64),
        }
    }
}

impl From<Vec<PropValue>> for PropValue {
    fn from(items: Vec<PropValue>) -> Self {
        PropValue::List(Arc::new(items))
    }
}

impl From<Props> for PropValue {
    fn from(props: Props) -> Self {
        PropValue::Map(Arc::new(props))
    }
}

impl<T: Into<PropValue>> From<Option<T>> for PropValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(PropValue::Null, Into::into)
    }
}

/// Each conversion allocates fresh references for nested arrays and objects,
/// so two conversions of equal JSON are shallow-equal only at the top level.
impl From<serde_json::Value> for PropValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => PropValue::Null,
            Value::Bool(b) => PropValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PropValue::Int(i),
                None => PropValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => PropValue::Str(s.into()),
            Value::Array(items) => {
                PropValue::List(Arc::new(items.into_iter().map(PropValue::from).collect()))
            }
            Value::Object(map) => PropValue::Map(Arc::new(
                map.into_iter().map(|(k, v)| (k, PropValue::from(v))).collect(),
            )),
        }
    }
}

impl Serialize for PropValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            PropValue::Null | PropValue::Opaque(_) => serializer.serialize_none(),
            PropValue::Bool(b) => serializer.serialize_bool(*b),
            PropValue::Int(i) => serializer.serialize_i64(*i),
            PropValue::Float(f) => serializer.serialize_f64(*f),
            PropValue::Str(s) => serializer.serialize_str(s),
            PropValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            PropValue::Map(props) => props.serialize(serializer),
        }
    }
}

/// String-keyed derived props.
#[derive(Clone, Debug, Default)]
pub struct Props {
    entries: BTreeMap<String, PropValue>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Option<PropValue> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert a JSON object into props.
    ///
    /// Anything but an object is rejected: shallow comparison is only
    /// meaningful for mappings.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, PropValue::from(v)))
                .collect()),
            other => Err(StoreError::InvalidProps(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl<K: Into<String>, V: Into<PropValue>> FromIterator<(K, V)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ShallowEq for Props {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(key, value)| other.entries.get(key).is_some_and(|o| value.identical(o)))
    }
}

impl Serialize for Props {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Build [`Props`] from `key => value` pairs.
///
/// ```ignore
/// let props = props! { "todos" => todos.clone(), "count" => 2 };
/// ```
#[macro_export]
macro_rules! props {
    () => {
        $crate::Props::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut props = $crate::Props::new();
        $( props.insert($key, $value); )+
        props
    }};
}
