//! Component attribute maps and subscriptions
//!
//! A component's attributes are a flat map from [`AttributePath`] to either a
//! literal JSON value or a [`Subscription`] (a reference to another
//! component's attribute). Subscriptions are recognized structurally: any
//! object of the shape `{ "$source": { "component": .., "path": .. } }`.

use crate::path::AttributePath;
use crate::ModelError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Path carrying a component's name
pub const NAME_PATH: &str = "/si/name";

/// Key that marks a subscription object
pub const SOURCE_KEY: &str = "$source";

/// Where a subscribed value comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSource {
    /// Canonical id, component name, or search query
    pub component: String,
    /// Attribute path on the source component
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Restrict resolution to components of this schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

/// An attribute whose value is supplied by another component's attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(rename = "$source")]
    pub source: SubscriptionSource,
}

impl Subscription {
    /// Subscribe to `path` on `component`
    #[must_use]
    pub fn new(component: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            source: SubscriptionSource {
                component: component.into(),
                path: path.into(),
                func: None,
                name: None,
                schema: None,
            },
        }
    }

    /// Restrict resolution to a schema
    #[inline]
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.source.schema = Some(schema.into());
        self
    }
}

/// Structural subscription predicate
///
/// True for an object whose only key is `$source`, holding an object with
/// string `component` and `path` fields.
#[must_use]
pub fn is_subscription(value: &Value) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    if map.len() != 1 {
        return false;
    }
    let Some(Value::Object(source)) = map.get(SOURCE_KEY) else {
        return false;
    };
    source.get("component").is_some_and(Value::is_string)
        && source.get("path").is_some_and(Value::is_string)
}

/// Value stored at one attribute path
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Plain JSON value
    Literal(Value),
    /// Reference to another component's attribute
    Subscription(Subscription),
}

impl AttributeValue {
    /// Classify a JSON value
    ///
    /// # Errors
    /// Returns an error if the value is subscription-shaped but its source
    /// cannot be decoded.
    pub fn from_json(value: Value) -> Result<Self, ModelError> {
        if is_subscription(&value) {
            let subscription: Subscription = serde_json::from_value(value)
                .map_err(|e| ModelError::InvalidSubscription(e.to_string()))?;
            Ok(Self::Subscription(subscription))
        } else {
            Ok(Self::Literal(value))
        }
    }

    /// Render as JSON
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Subscription(subscription) => {
                serde_json::to_value(subscription).unwrap_or(Value::Null)
            }
        }
    }

    /// Subscription, if this is one
    #[inline]
    #[must_use]
    pub fn as_subscription(&self) -> Option<&Subscription> {
        match self {
            Self::Subscription(s) => Some(s),
            Self::Literal(_) => None,
        }
    }

    /// Literal value, if this is one
    #[inline]
    #[must_use]
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal(v) => Some(v),
            Self::Subscription(_) => None,
        }
    }
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        Self::from_json(value.clone()).unwrap_or(Self::Literal(value))
    }
}

impl From<Subscription> for AttributeValue {
    fn from(value: Subscription) -> Self {
        Self::Subscription(value)
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Literal(value) => value.serialize(serializer),
            Self::Subscription(subscription) => subscription.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(value).map_err(serde::de::Error::custom)
    }
}

/// Flat map of attribute paths to values
///
/// Built fresh from an input document or a fetched component on every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<AttributePath, AttributeValue>);

impl AttributeMap {
    /// Create empty map
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-flat `"/path" → value` entries
    ///
    /// # Errors
    /// Returns an error for a malformed path or subscription.
    pub fn from_flat<I, K>(entries: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut map = Self::new();
        for (key, value) in entries {
            let path: AttributePath = key.as_ref().parse()?;
            map.0.insert(path, AttributeValue::from_json(value)?);
        }
        Ok(map)
    }

    /// Build from a document that may mix flat and nested keys
    ///
    /// Top-level keys starting with `/` are absolute leaf paths. Other keys
    /// are nested segments: objects recurse, while arrays, scalars, empty
    /// objects and subscription-shaped objects are leaves.
    ///
    /// # Errors
    /// Returns an error if the document is not an object, a path is given
    /// twice, or a nested key contains `/`.
    pub fn from_document(document: &Value) -> Result<Self, ModelError> {
        let Some(root) = document.as_object() else {
            return Err(ModelError::InvalidDocument(
                "attributes must be an object".to_string(),
            ));
        };

        let mut map = Self::new();
        for (key, value) in root {
            if key.starts_with('/') {
                let path: AttributePath = key.parse()?;
                map.insert_unique(path, value)?;
            } else {
                map.flatten_into(AttributePath::root().child(checked_segment(key)?), value)?;
            }
        }
        Ok(map)
    }

    fn flatten_into(&mut self, prefix: AttributePath, value: &Value) -> Result<(), ModelError> {
        match value {
            Value::Object(children) if !children.is_empty() && !is_subscription(value) => {
                for (key, child) in children {
                    self.flatten_into(prefix.child(checked_segment(key)?), child)?;
                }
                Ok(())
            }
            _ => self.insert_unique(prefix, value),
        }
    }

    fn insert_unique(&mut self, path: AttributePath, value: &Value) -> Result<(), ModelError> {
        if self.0.contains_key(&path) {
            return Err(ModelError::DuplicatePath(path));
        }
        if !value.is_string() && !is_subscription(value) && path.to_string() == NAME_PATH {
            return Err(ModelError::InvalidDocument(format!(
                "{NAME_PATH} must be a string, got {value}"
            )));
        }
        self.0.insert(path, AttributeValue::from_json(value.clone())?);
        Ok(())
    }

    /// Insert or replace a value
    pub fn insert(&mut self, path: AttributePath, value: impl Into<AttributeValue>) {
        self.0.insert(path, value.into());
    }

    /// With a value at a path given as a string
    ///
    /// # Panics
    /// Panics if `path` is not a valid attribute path. Intended for literals
    /// in tests and fixtures.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with(mut self, path: &str, value: impl Into<AttributeValue>) -> Self {
        let path: AttributePath = path.parse().expect("valid attribute path");
        self.0.insert(path, value.into());
        self
    }

    /// Remove a value
    pub fn remove(&mut self, path: &AttributePath) -> Option<AttributeValue> {
        self.0.remove(path)
    }

    /// Value at a path
    #[inline]
    #[must_use]
    pub fn get(&self, path: &AttributePath) -> Option<&AttributeValue> {
        self.0.get(path)
    }

    /// Value at a path given as a string
    #[must_use]
    pub fn get_str(&self, path: &str) -> Option<&AttributeValue> {
        path.parse::<AttributePath>()
            .ok()
            .and_then(|p| self.0.get(&p))
    }

    /// Check if a path is present
    #[inline]
    #[must_use]
    pub fn contains(&self, path: &AttributePath) -> bool {
        self.0.contains_key(path)
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&AttributePath, &AttributeValue)> {
        self.0.iter()
    }

    /// Mutable access to every subscription
    pub fn subscriptions_mut(&mut self) -> impl Iterator<Item = (&AttributePath, &mut Subscription)> {
        self.0.iter_mut().filter_map(|(path, value)| match value {
            AttributeValue::Subscription(s) => Some((path, s)),
            AttributeValue::Literal(_) => None,
        })
    }

    /// Render as a flat JSON object
    #[must_use]
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .0
            .iter()
            .map(|(path, value)| (path.to_string(), value.to_json()))
            .collect();
        Value::Object(map)
    }
}

impl FromIterator<(AttributePath, AttributeValue)> for AttributeMap {
    fn from_iter<T: IntoIterator<Item = (AttributePath, AttributeValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn checked_segment(key: &str) -> Result<&str, ModelError> {
    if key.is_empty() || key.contains('/') {
        return Err(ModelError::InvalidDocument(format!(
            "nested attribute key '{key}' must be a single non-empty segment"
        )));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn subscription_predicate_is_structural() {
        assert!(is_subscription(&json!({"$source": {"component": "db", "path": "/domain/host"}})));
        assert!(is_subscription(
            &json!({"$source": {"component": "db", "path": "/x", "func": "f"}})
        ));
        assert!(!is_subscription(&json!({"$source": {"component": "db"}})));
        assert!(!is_subscription(&json!({"$source": null})));
        assert!(!is_subscription(
            &json!({"$source": {"component": "db", "path": "/x"}, "extra": 1})
        ));
        assert!(!is_subscription(&json!("db")));
    }

    #[test]
    fn attribute_value_classifies() {
        let literal = AttributeValue::from_json(json!({"a": 1})).unwrap();
        assert!(literal.as_literal().is_some());

        let sub = AttributeValue::from_json(
            json!({"$source": {"component": "db", "path": "/domain/host"}}),
        )
        .unwrap();
        assert_eq!(
            sub.as_subscription(),
            Some(&Subscription::new("db", "/domain/host"))
        );
        assert_eq!(
            sub.to_json(),
            json!({"$source": {"component": "db", "path": "/domain/host"}})
        );
    }

    #[test]
    fn from_flat_parses_paths() {
        let map = AttributeMap::from_flat([
            ("/domain/a", json!(1)),
            ("/domain/b", json!({"$source": {"component": "x", "path": "/y"}})),
        ])
        .unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.get_str("/domain/b").unwrap().as_subscription().is_some());

        let bad = AttributeMap::from_flat([("domain/a", json!(1))]);
        assert!(matches!(bad, Err(ModelError::Path(_))));
    }

    #[test]
    fn from_document_flattens_nested() {
        let doc = json!({
            "si": {"name": "web"},
            "domain": {
                "region": "us-east-1",
                "tags": ["a", "b"],
                "empty": {},
                "host": {"$source": {"component": "db", "path": "/domain/host"}}
            },
            "/domain/port": 80
        });
        let map = AttributeMap::from_document(&doc).unwrap();

        let expected = AttributeMap::new()
            .with("/si/name", json!("web"))
            .with("/domain/region", json!("us-east-1"))
            .with("/domain/tags", json!(["a", "b"]))
            .with("/domain/empty", json!({}))
            .with("/domain/host", Subscription::new("db", "/domain/host"))
            .with("/domain/port", json!(80));
        assert_eq!(map, expected);
    }

    #[test]
    fn from_document_rejects_duplicates() {
        let doc = json!({
            "domain": {"a": 1},
            "/domain/a": 2
        });
        let result = AttributeMap::from_document(&doc);
        assert!(matches!(
            result,
            Err(ModelError::DuplicatePath(_))
        ));
    }

    #[test]
    fn from_document_rejects_non_string_name() {
        for doc in [
            json!({"/si/name": 5}),
            json!({"si": {"name": null}}),
            json!({"si": {"name": {}}}),
        ] {
            assert!(
                matches!(
                    AttributeMap::from_document(&doc),
                    Err(ModelError::InvalidDocument(_))
                ),
                "{doc}"
            );
        }
        assert!(AttributeMap::from_document(&json!({"si": {"name": "web"}})).is_ok());
    }

    #[test]
    fn from_document_requires_object() {
        assert!(AttributeMap::from_document(&json!([1, 2])).is_err());
    }

    #[test]
    fn subscriptions_mut_rewrites_sources() {
        let mut map = AttributeMap::new()
            .with("/domain/a", json!(1))
            .with("/domain/b", Subscription::new("db", "/x"));
        for (_, sub) in map.subscriptions_mut() {
            sub.source.component = "01ABC".to_string();
        }
        assert_eq!(
            map.get_str("/domain/b").unwrap().as_subscription().unwrap().source.component,
            "01ABC"
        );
    }

    #[test]
    fn to_json_is_flat() {
        let map = AttributeMap::new()
            .with("/domain/a", json!(1))
            .with("/si/name", json!("x"));
        assert_eq!(map.to_json(), json!({"/domain/a": 1, "/si/name": "x"}));
    }
}
