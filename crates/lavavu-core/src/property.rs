//! Property schema, values and validation
//!
//! The backend publishes a dictionary of every property it understands with
//! its default, type, documentation and scope. Reads of a property that is
//! not set on a target resolve to a fresh copy of the schema default, so
//! callers can never mutate the shared default.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{LavaVuResult, ValidationError, ValidationResult};

/// Where a property applies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyScope {
    Global,
    View,
    Object,
    ColourMap,
}

/// One schema entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub default: Value,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub doc: String,
    #[serde(default = "default_scope")]
    pub scope: PropertyScope,
}

fn default_scope() -> PropertyScope {
    PropertyScope::Object
}

/// A property value: scalar, vector, string or arbitrary JSON
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    Vector(Vec<f64>),
    String(String),
    Json(Value),
}

impl PropertyValue {
    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Null => Value::Null,
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            PropertyValue::Vector(v) => Value::from(v.clone()),
            PropertyValue::String(s) => Value::String(s.clone()),
            PropertyValue::Json(v) => v.clone(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            PropertyValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::Number(n) => Some(*n != 0.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            PropertyValue::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(b),
            Value::Number(n) => n
                .as_f64()
                .map(PropertyValue::Number)
                .unwrap_or(PropertyValue::Json(Value::Number(n))),
            Value::String(s) => PropertyValue::String(s),
            Value::Array(items) => {
                let numbers: Option<Vec<f64>> = items.iter().map(Value::as_f64).collect();
                match numbers {
                    Some(v) if !items.is_empty() => PropertyValue::Vector(v),
                    _ => PropertyValue::Json(Value::Array(items)),
                }
            }
            other => PropertyValue::Json(other),
        }
    }
}

impl From<&Value> for PropertyValue {
    fn from(value: &Value) -> Self {
        PropertyValue::from(value.clone())
    }
}

impl From<PropertyValue> for Value {
    fn from(value: PropertyValue) -> Self {
        value.to_json()
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Number(n)
    }
}

impl From<f32> for PropertyValue {
    fn from(n: f32) -> Self {
        PropertyValue::Number(n as f64)
    }
}

impl From<i32> for PropertyValue {
    fn from(n: i32) -> Self {
        PropertyValue::Number(n as f64)
    }
}

impl From<u32> for PropertyValue {
    fn from(n: u32) -> Self {
        PropertyValue::Number(n as f64)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<Vec<f64>> for PropertyValue {
    fn from(v: Vec<f64>) -> Self {
        PropertyValue::Vector(v)
    }
}

impl<const N: usize> From<[f64; N]> for PropertyValue {
    fn from(v: [f64; N]) -> Self {
        PropertyValue::Vector(v.to_vec())
    }
}

impl<const N: usize> From<[u32; N]> for PropertyValue {
    fn from(v: [u32; N]) -> Self {
        PropertyValue::Vector(v.iter().map(|&x| x as f64).collect())
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Format a `name=<json>` assignment for the backend property parser
pub fn assignment(name: &str, value: &PropertyValue) -> String {
    format!("{}={}", name, value.to_json())
}

/// The published property dictionary
#[derive(Clone, Debug, Default)]
pub struct PropertySchema {
    defs: BTreeMap<String, PropertyDef>,
    validate: bool,
}

impl PropertySchema {
    /// Parse the backend's property list JSON
    pub fn from_json(text: &str) -> LavaVuResult<Self> {
        let raw: BTreeMap<String, PropertyDef> = serde_json::from_str(text)?;
        let defs = raw
            .into_iter()
            .map(|(name, mut def)| {
                def.name = name.clone();
                (name, def)
            })
            .collect();
        Ok(Self {
            defs,
            validate: true,
        })
    }

    /// Enable or disable rejection of unknown names
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn validates(&self) -> bool {
        self.validate
    }

    pub fn get(&self, name: &str) -> Option<&PropertyDef> {
        self.defs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }

    pub fn in_scope(&self, scope: PropertyScope) -> impl Iterator<Item = &PropertyDef> {
        self.defs.values().filter(move |d| d.scope == scope)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Reject unknown names when validation is enabled
    pub fn check(&self, name: &str) -> ValidationResult<()> {
        if self.validate && !self.defs.contains_key(name) {
            return Err(ValidationError::UnknownProperty {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// A fresh copy of the default for `name`
    pub fn default_of(&self, name: &str) -> ValidationResult<PropertyValue> {
        self.check(name)?;
        Ok(self
            .defs
            .get(name)
            .map(|d| PropertyValue::from(d.default.clone()))
            .unwrap_or(PropertyValue::Null))
    }

    /// Resolve `name` through `layers` in order, falling back to the default
    pub fn resolve(
        &self,
        name: &str,
        layers: &[Option<&Map<String, Value>>],
    ) -> ValidationResult<PropertyValue> {
        self.check(name)?;
        for layer in layers.iter().flatten() {
            if let Some(value) = layer.get(name) {
                return Ok(PropertyValue::from(value));
            }
        }
        self.default_of(name)
    }

    /// Documentation line for `name`
    pub fn doc(&self, name: &str) -> Option<String> {
        self.defs.get(name).map(|d| {
            format!(
                "{} ({}, {:?}): {} [default: {}]",
                d.name, d.kind, d.scope, d.doc, d.default
            )
        })
    }
}

/// Validated key/value set, only holding names the schema knows
#[derive(Clone, Debug)]
pub struct PropertyBag {
    schema: Arc<PropertySchema>,
    values: BTreeMap<String, PropertyValue>,
}

impl PropertyBag {
    pub fn new(schema: Arc<PropertySchema>) -> Self {
        Self {
            schema,
            values: BTreeMap::new(),
        }
    }

    /// Set a value, rejecting unknown names
    pub fn set(&mut self, name: &str, value: impl Into<PropertyValue>) -> ValidationResult<()> {
        self.schema.check(name)?;
        self.values.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Bag holding the entries of `map` that the schema knows, dropping the rest
    pub fn from_map(schema: Arc<PropertySchema>, map: &Map<String, Value>) -> Self {
        let values = map
            .iter()
            .filter(|(k, _)| schema.contains(k))
            .map(|(k, v)| (k.clone(), PropertyValue::from(v)))
            .collect();
        Self { schema, values }
    }

    /// Builder form of [`PropertyBag::set`]
    pub fn with(mut self, name: &str, value: impl Into<PropertyValue>) -> ValidationResult<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Stored value or a copy of the default
    pub fn get(&self, name: &str) -> ValidationResult<PropertyValue> {
        match self.values.get(name) {
            Some(v) => Ok(v.clone()),
            None => self.schema.default_of(name),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        self.values.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// JSON object of the stored values
    pub fn to_json(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> PropertySchema {
        PropertySchema::from_json(
            r#"{
                "pointsize": {
                    "default": 1.0, "type": "real", "doc": "Point size", "scope": "object"
                },
                "translate": {
                    "default": [0, 0, 0], "type": "real[3]", "doc": "Translation", "scope": "view"
                },
                "filters": {"default": [], "type": "object", "doc": "Filters", "scope": "object"},
                "background": {
                    "default": "black", "type": "colour", "doc": "Background", "scope": "global"
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_unknown_property() {
        let s = schema();
        assert!(matches!(
            s.default_of("bogus"),
            Err(ValidationError::UnknownProperty { .. })
        ));
        let lax = schema().with_validation(false);
        assert_eq!(lax.default_of("bogus").unwrap(), PropertyValue::Null);
    }

    #[test]
    fn test_default_is_copy() {
        let s = schema();
        let mut first = s.default_of("translate").unwrap();
        if let PropertyValue::Vector(v) = &mut first {
            v[0] = 99.0;
        }
        assert_eq!(s.default_of("translate").unwrap(), PropertyValue::Vector(vec![0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_resolve_layers() {
        let s = schema();
        let view = json!({"translate": [1, 2, 3]});
        let props = json!({"background": "white"});
        let layers = [view.as_object(), None, props.as_object()];
        assert_eq!(
            s.resolve("translate", &layers).unwrap(),
            PropertyValue::Vector(vec![1.0, 2.0, 3.0])
        );
        assert_eq!(s.resolve("background", &layers).unwrap(), PropertyValue::from("white"));
        assert_eq!(s.resolve("pointsize", &layers).unwrap(), PropertyValue::Number(1.0));
        assert_eq!(s.resolve("filters", &layers).unwrap(), PropertyValue::Json(json!([])));
    }

    #[test]
    fn test_property_bag() {
        let bag = PropertyBag::new(Arc::new(schema()))
            .with("pointsize", 5.0)
            .unwrap();
        assert_eq!(bag.get("pointsize").unwrap().as_f64(), Some(5.0));
        assert_eq!(bag.get("background").unwrap().as_str(), Some("black"));
        assert!(bag.clone().with("nope", 1.0).is_err());
        assert_eq!(bag.to_json().get("pointsize"), Some(&json!(5.0)));
    }

    #[test]
    fn test_assignment() {
        assert_eq!(assignment("opacity", &PropertyValue::from(0.5)), "opacity=0.5");
        assert_eq!(assignment("colour", &PropertyValue::from("red")), "colour=\"red\"");
    }
}
