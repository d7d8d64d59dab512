//! Component operations
//!
//! Reads run against HEAD. Every mutation runs inside its own change set,
//! abandoned if the mutation fails. An update that changes nothing opens no
//! change set at all.

use crate::changeset::ChangeSet;
use crate::error::{ConvergeError, ConvergeResult, ResolveError};
use crate::resolve::{resolve_component, resolve_subscriptions};
use converge_api::{ComponentUpdate, ComponentView, RemoteApi};
use converge_model::{
    AttributeMap, AttributeValue, ChangeSetId, ComponentId, ComponentSummary,
};
use converge_plan::{diff_attributes, AttributeDiff};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Desired state of one component, as read from an input document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDocument {
    /// Canonical id, name, or search query
    #[serde(alias = "componentId")]
    pub component: String,
    /// Flat `"/a/b"` keys, nested objects, or both
    #[serde(default = "empty_object")]
    pub attributes: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ComponentDocument {
    /// Read a JSON or YAML document; `.yaml`/`.yml` selects YAML
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or decoded.
    pub async fn load(path: &Path) -> ConvergeResult<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConvergeError::io_error(path, e))?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if is_yaml {
            Self::from_yaml(&raw).map_err(|m| ConvergeError::document(path, m))
        } else {
            Self::from_json(&raw).map_err(|m| ConvergeError::document(path, m))
        }
    }

    /// Decode a JSON document
    ///
    /// # Errors
    /// Returns the decoder message.
    pub fn from_json(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|e| e.to_string())
    }

    /// Decode a YAML document
    ///
    /// # Errors
    /// Returns the decoder message.
    pub fn from_yaml(raw: &str) -> Result<Self, String> {
        serde_yaml::from_str(raw).map_err(|e| e.to_string())
    }

    /// Flattened desired attributes
    ///
    /// # Errors
    /// Returns an error for malformed paths, duplicate paths, or broken
    /// subscriptions.
    pub fn attribute_map(&self) -> ConvergeResult<AttributeMap> {
        Ok(AttributeMap::from_document(&self.attributes)?)
    }
}

/// Outcome of a component update
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentChange {
    pub component_id: ComponentId,
    pub name: String,
    pub diff: AttributeDiff,
    /// Change set the update was staged in, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_set: Option<ChangeSetId>,
    pub dry_run: bool,
}

impl ComponentChange {
    /// Whether anything was sent to the remote
    #[inline]
    #[must_use]
    pub fn applied(&self) -> bool {
        self.change_set.is_some()
    }
}

/// Wire body for an attribute diff
#[must_use]
pub fn update_from_diff(diff: &AttributeDiff) -> ComponentUpdate {
    let mut update = ComponentUpdate::new();
    if let Some(name) = &diff.rename {
        update = update.with_name(name.clone());
    }
    for path in &diff.unset {
        update.unset(path);
    }
    for (path, value) in &diff.set {
        update.set(path, &AttributeValue::Literal(value.clone()));
    }
    for (path, subscription) in &diff.subscriptions {
        update.set(path, &AttributeValue::Subscription(subscription.clone()));
    }
    update
}

/// Fetch a component by id, name, or query
///
/// # Errors
/// Resolution or remote failure.
pub async fn get_component(api: &dyn RemoteApi, reference: &str) -> ConvergeResult<ComponentView> {
    let head = api.head_change_set().await?;
    let id = resolve_component(api, &head, reference, None).await?;
    fetch_view(api, &head, reference, &id).await
}

/// Search components at HEAD
///
/// # Errors
/// Remote failure.
pub async fn search_components(
    api: &dyn RemoteApi,
    query: &str,
    schema: Option<&str>,
) -> ConvergeResult<Vec<ComponentSummary>> {
    let head = api.head_change_set().await?;
    let hits = api.search_components(&head, query, schema).await?;
    tracing::debug!(query = %query, hits = hits.len(), "searched components");
    Ok(hits)
}

/// Bring a component's attributes in line with a document
///
/// Every reference is resolved and the diff computed before any change set
/// is opened.
///
/// # Errors
/// Invalid document, resolution failure, or remote failure. A remote failure
/// during the update abandons its change set.
pub async fn update_component(
    api: &dyn RemoteApi,
    change_set_prefix: &str,
    document: &ComponentDocument,
    dry_run: bool,
) -> ConvergeResult<ComponentChange> {
    let mut desired = document.attribute_map()?;
    let head = api.head_change_set().await?;

    let id = resolve_component(api, &head, &document.component, None).await?;
    let current = fetch_view(api, &head, &document.component, &id).await?;
    resolve_subscriptions(api, &head, &mut desired).await?;

    let diff = diff_attributes(&desired, &current.attributes, Some(&current.name));
    let mut change = ComponentChange {
        component_id: id,
        name: current.name,
        diff,
        change_set: None,
        dry_run,
    };

    if change.diff.is_empty() {
        tracing::info!(component = %change.component_id, "component already up to date");
        return Ok(change);
    }
    if dry_run {
        tracing::info!(component = %change.component_id, changes = change.diff.len(), "dry run, not applying");
        return Ok(change);
    }

    let update = update_from_diff(&change.diff);
    let component = &change.component_id;
    let change_set = ChangeSet::open(api, change_set_prefix).await?;
    let staged = change_set
        .run(|cs| async move {
            let result = api.update_component(&cs, component, &update).await;
            result.map(|()| cs).map_err(ConvergeError::from)
        })
        .await?;

    tracing::info!(component = %change.component_id, change_set = %staged, changes = change.diff.len(), "component updated");
    change.change_set = Some(staged);
    Ok(change)
}

/// Delete a component
///
/// # Errors
/// Resolution or remote failure.
pub async fn delete_component(
    api: &dyn RemoteApi,
    change_set_prefix: &str,
    reference: &str,
) -> ConvergeResult<ComponentId> {
    let head = api.head_change_set().await?;
    let id = resolve_component(api, &head, reference, None).await?;
    let target = &id;

    ChangeSet::open(api, change_set_prefix)
        .await?
        .run(|cs| async move {
            api.delete_component(&cs, target)
                .await
                .map_err(ConvergeError::from)
        })
        .await?;
    tracing::info!(component = %id, "component deleted");
    Ok(id)
}

/// Upgrade a component to its schema's latest variant
///
/// # Errors
/// Resolution or remote failure.
pub async fn upgrade_component(
    api: &dyn RemoteApi,
    change_set_prefix: &str,
    reference: &str,
) -> ConvergeResult<ComponentId> {
    let head = api.head_change_set().await?;
    let id = resolve_component(api, &head, reference, None).await?;
    let target = &id;

    ChangeSet::open(api, change_set_prefix)
        .await?
        .run(|cs| async move {
            api.upgrade_component(&cs, target)
                .await
                .map_err(ConvergeError::from)
        })
        .await?;
    tracing::info!(component = %id, "component upgraded");
    Ok(id)
}

async fn fetch_view(
    api: &dyn RemoteApi,
    change_set: &ChangeSetId,
    reference: &str,
    id: &ComponentId,
) -> ConvergeResult<ComponentView> {
    api.get_component(change_set, id).await?.ok_or_else(|| {
        ConvergeError::from(ResolveError::Unresolvable {
            reference: reference.to_string(),
        })
    })
}
