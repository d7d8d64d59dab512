//! Subscription resolver
//!
//! A component reference may be a canonical id, a component name, or a free
//! text query. Resolution rules:
//!
//! 1. A ULID-shaped reference is looked up by id; if found it is used as is.
//! 2. Otherwise the remote is searched (restricted to a schema if given).
//!    Exactly one component whose name equals the reference wins; several
//!    exact matches are ambiguous.
//! 3. With no exact match, a single search hit wins; several are ambiguous
//!    and none is unresolvable.
//!
//! A reference never falls back to being used as a raw id.

use crate::error::{ConvergeResult, ResolveError};
use converge_api::{ApiError, RemoteApi};
use converge_model::{AttributeMap, ChangeSetId, ComponentId};
use std::collections::HashMap;
use ulid::Ulid;

/// Whether a reference has the shape of a canonical component id
#[must_use]
pub fn is_canonical_id(reference: &str) -> bool {
    Ulid::from_string(reference).is_ok()
}

/// Resolve a component reference to its canonical id
///
/// # Errors
/// [`ResolveError::Unresolvable`] for no match, [`ResolveError::Ambiguous`]
/// for more than one, [`ResolveError::Lookup`] if the remote fails.
pub async fn resolve_component(
    api: &dyn RemoteApi,
    change_set: &ChangeSetId,
    reference: &str,
    schema: Option<&str>,
) -> Result<ComponentId, ResolveError> {
    let lookup = |source: ApiError| ResolveError::Lookup {
        reference: reference.to_string(),
        source,
    };

    if is_canonical_id(reference) {
        let id = ComponentId::new(reference);
        if api.get_component(change_set, &id).await.map_err(lookup)?.is_some() {
            tracing::debug!(reference = %reference, "reference is a component id");
            return Ok(id);
        }
    }

    let hits = api
        .search_components(change_set, reference, schema)
        .await
        .map_err(lookup)?;

    let (exact, fuzzy): (Vec<_>, Vec<_>) = hits.into_iter().partition(|c| c.name == reference);
    let candidates = if exact.is_empty() { fuzzy } else { exact };

    match candidates.len() {
        0 => Err(ResolveError::Unresolvable {
            reference: reference.to_string(),
        }),
        1 => {
            let id = candidates
                .into_iter()
                .next()
                .map(|c| c.id)
                .ok_or_else(|| ResolveError::Unresolvable {
                    reference: reference.to_string(),
                })?;
            tracing::debug!(reference = %reference, component = %id, "resolved reference");
            Ok(id)
        }
        _ => Err(ResolveError::Ambiguous {
            reference: reference.to_string(),
            candidates,
        }),
    }
}

/// Rewrite every subscription source in `attributes` to a canonical id
///
/// Each distinct reference is resolved once. Nothing is rewritten unless
/// every reference resolves.
///
/// # Errors
/// The first resolution failure.
pub async fn resolve_subscriptions(
    api: &dyn RemoteApi,
    change_set: &ChangeSetId,
    attributes: &mut AttributeMap,
) -> ConvergeResult<usize> {
    let mut references: Vec<(String, Option<String>)> = attributes
        .iter()
        .filter_map(|(_, value)| value.as_subscription())
        .map(|s| (s.source.component.clone(), s.source.schema.clone()))
        .collect();
    references.sort();
    references.dedup();

    let mut resolved = HashMap::with_capacity(references.len());
    for (reference, schema) in references {
        let id = resolve_component(api, change_set, &reference, schema.as_deref()).await?;
        resolved.insert((reference, schema), id);
    }

    let mut rewritten = 0;
    for (path, subscription) in attributes.subscriptions_mut() {
        let key = (
            subscription.source.component.clone(),
            subscription.source.schema.clone(),
        );
        if let Some(id) = resolved.get(&key) {
            if subscription.source.component != id.as_str() {
                tracing::debug!(path = %path, from = %key.0, to = %id, "rewrote subscription source");
                subscription.source.component = id.to_string();
                rewritten += 1;
            }
        }
    }
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_model::Subscription;
    use converge_test_utils::InMemoryRemote;
    use serde_json::json;

    #[test]
    fn ulid_shape_detection() {
        assert!(is_canonical_id("01HZX3Q2J8R6V5W4T3S2K1M0N9"));
        assert!(!is_canonical_id("database"));
        assert!(!is_canonical_id(""));
    }

    #[tokio::test]
    async fn exact_name_beats_substring_hits() {
        let remote = InMemoryRemote::new();
        let db = remote.seed_component("db", Some("Postgres"), AttributeMap::new());
        remote.seed_component("db-replica", Some("Postgres"), AttributeMap::new());
        let head = remote.head_id();

        let id = resolve_component(&remote, &head, "db", None).await.unwrap();
        assert_eq!(id, db);
    }

    #[tokio::test]
    async fn several_partial_hits_are_ambiguous() {
        let remote = InMemoryRemote::new();
        remote.seed_component("db-a", None, AttributeMap::new());
        remote.seed_component("db-b", None, AttributeMap::new());
        let head = remote.head_id();

        let err = resolve_component(&remote, &head, "db", None).await.unwrap_err();
        assert!(matches!(err, ResolveError::Ambiguous { ref candidates, .. } if candidates.len() == 2));
    }

    #[tokio::test]
    async fn duplicate_exact_names_are_ambiguous() {
        let remote = InMemoryRemote::new();
        remote.seed_component("db", None, AttributeMap::new());
        remote.seed_component("db", None, AttributeMap::new());
        remote.seed_component("db-replica", None, AttributeMap::new());
        let head = remote.head_id();

        let err = resolve_component(&remote, &head, "db", None).await.unwrap_err();
        match err {
            ResolveError::Ambiguous { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates.iter().all(|c| c.name == "db"));
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_id_shaped_reference_is_not_used_raw() {
        let remote = InMemoryRemote::new();
        let head = remote.head_id();
        let err = resolve_component(&remote, &head, "01HZX3Q2J8R6V5W4T3S2K1M0N9", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Unresolvable { .. }));
    }

    #[tokio::test]
    async fn schema_restricts_candidates() {
        let remote = InMemoryRemote::new();
        remote.seed_component("main", Some("Postgres"), AttributeMap::new());
        let redis = remote.seed_component("main", Some("Redis"), AttributeMap::new());
        let head = remote.head_id();

        assert!(resolve_component(&remote, &head, "main", None).await.is_err());
        let id = resolve_component(&remote, &head, "main", Some("Redis"))
            .await
            .unwrap();
        assert_eq!(id, redis);
    }

    #[tokio::test]
    async fn subscriptions_are_rewritten_to_ids() {
        let remote = InMemoryRemote::new();
        let db = remote.seed_component("db", None, AttributeMap::new());
        let head = remote.head_id();

        let mut attrs = AttributeMap::new()
            .with("/domain/host", Subscription::new("db", "/domain/address"))
            .with("/domain/port", Subscription::new("db", "/domain/port"))
            .with("/domain/name", json!("web"));

        let rewritten = resolve_subscriptions(&remote, &head, &mut attrs).await.unwrap();
        assert_eq!(rewritten, 2);
        let host = attrs.get_str("/domain/host").and_then(|v| v.as_subscription()).unwrap();
        assert_eq!(host.source.component, db.as_str());
    }
}
