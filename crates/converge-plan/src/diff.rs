//! Attribute diff engine
//!
//! Compares a desired [`AttributeMap`] against a component's current one.
//! Subscriptions are never compared by value: every desired subscription is
//! re-asserted.

use converge_model::{AttributeMap, AttributePath, AttributeValue, Subscription, NAME_PATH};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Changes needed to bring a component's attributes to the desired state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDiff {
    /// Literals that are new or changed
    pub set: BTreeMap<AttributePath, Value>,
    /// Paths to clear
    pub unset: Vec<AttributePath>,
    /// Subscriptions to assert
    pub subscriptions: BTreeMap<AttributePath, Subscription>,
    /// New component name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename: Option<String>,
}

impl AttributeDiff {
    /// Whether there is nothing to apply
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && self.unset.is_empty()
            && self.subscriptions.is_empty()
            && self.rename.is_none()
    }

    /// Number of attribute changes, counting a rename as one
    #[must_use]
    pub fn len(&self) -> usize {
        self.set.len() + self.unset.len() + self.subscriptions.len() + usize::from(self.rename.is_some())
    }
}

/// Diff `desired` against `current`
///
/// `current_name` is the component's name as reported by the remote; when
/// absent the current `/si/name` attribute is used instead. A current path
/// is only unset when neither it nor any ancestor is desired, since
/// assigning an ancestor replaces the whole subtree.
#[must_use]
pub fn diff_attributes(
    desired: &AttributeMap,
    current: &AttributeMap,
    current_name: Option<&str>,
) -> AttributeDiff {
    let name_path = name_path();
    let mut diff = AttributeDiff::default();

    for (path, value) in desired.iter() {
        match value {
            AttributeValue::Subscription(subscription) => {
                diff.subscriptions.insert(path.clone(), subscription.clone());
            }
            AttributeValue::Literal(literal) if *path == name_path => {
                diff.rename = rename(literal, current, current_name);
            }
            AttributeValue::Literal(literal) => {
                let unchanged = matches!(
                    current.get(path),
                    Some(AttributeValue::Literal(existing)) if existing == literal
                );
                if !unchanged {
                    diff.set.insert(path.clone(), literal.clone());
                }
            }
        }
    }

    for (path, _) in current.iter() {
        if *path == name_path {
            continue;
        }
        let covered = desired.iter().any(|(wanted, _)| wanted.is_prefix_of(path));
        if !covered {
            diff.unset.push(path.clone());
        }
    }

    diff
}

fn rename(desired: &Value, current: &AttributeMap, current_name: Option<&str>) -> Option<String> {
    let wanted = desired.as_str()?;
    let existing = current_name.or_else(|| match current.get_str(NAME_PATH) {
        Some(AttributeValue::Literal(Value::String(name))) => Some(name.as_str()),
        _ => None,
    });
    (existing != Some(wanted)).then(|| wanted.to_string())
}

fn name_path() -> AttributePath {
    AttributePath::new(vec!["si".to_string(), "name".to_string()])
}
