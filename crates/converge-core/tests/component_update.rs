//! Functional tests for component operations against an in-memory remote.
//!
//! Core guarantees exercised here:
//! - References are resolved to canonical ids before anything is diffed.
//! - Subscriptions are always re-asserted; literals only when they changed.
//! - Nothing to apply means no change set; a failed update abandons its own.

use converge_core::{
    ComponentDocument, ConvergeConfig, ConvergeError, Reconciler, ResolveError,
};
use converge_model::{AttributeMap, AttributeValue, ComponentId, ModelError, Subscription};
use converge_test_utils::{InMemoryRemote, Operation};
use pretty_assertions::assert_eq;
use serde_json::json;

struct Fixture {
    remote: InMemoryRemote,
    db: ComponentId,
    web: ComponentId,
}

fn fixture() -> Fixture {
    let remote = InMemoryRemote::new();
    let db = remote.seed_component(
        "db",
        Some("Postgres"),
        AttributeMap::new().with("/domain/address", json!("10.0.0.5")),
    );
    let web = remote.seed_component(
        "web",
        Some("Server"),
        AttributeMap::new()
            .with("/domain/host", Subscription::new(db.as_str(), "/domain/address"))
            .with("/domain/port", json!(80))
            .with("/domain/legacy", json!(true)),
    );
    Fixture { remote, db, web }
}

fn document(value: serde_json::Value) -> ComponentDocument {
    serde_json::from_value(value).unwrap()
}

/// Tenet: a nested document is flattened, its subscriptions resolved by
/// name, and the diff applied in one change set.
#[tokio::test]
async fn update_resolves_and_applies_diff() {
    let Fixture { remote, db, web } = fixture();
    let reconciler = Reconciler::new(&remote, ConvergeConfig::new());

    let doc = document(json!({
        "component": "web",
        "attributes": {
            "domain": {
                "host": { "$source": { "component": "db", "path": "/domain/address" } },
                "port": 8080
            }
        }
    }));
    let change = reconciler.update_component(&doc, false).await.unwrap();

    assert!(change.applied());
    assert_eq!(change.component_id, web);
    assert_eq!(change.diff.set.len(), 1);
    assert_eq!(change.diff.unset.len(), 1);
    assert_eq!(change.diff.subscriptions.len(), 1);

    remote.merge_open_change_sets();
    let view = remote.head_component(&web).unwrap();
    assert_eq!(
        view.attributes.get_str("/domain/port"),
        Some(&AttributeValue::Literal(json!(8080)))
    );
    assert!(view.attributes.get_str("/domain/legacy").is_none());
    let host = view
        .attributes
        .get_str("/domain/host")
        .and_then(AttributeValue::as_subscription)
        .unwrap();
    assert_eq!(host.source.component, db.as_str());
}

/// Tenet: an unchanged subscription is still sent; a document with only
/// unchanged literals opens no change set.
#[tokio::test]
async fn subscriptions_are_reasserted_and_noop_skips_change_set() {
    let Fixture { remote, db, .. } = fixture();
    let reconciler = Reconciler::new(&remote, ConvergeConfig::new());

    let literals_only = document(json!({
        "component": "db",
        "attributes": { "/domain/address": "10.0.0.5" }
    }));
    let change = reconciler.update_component(&literals_only, false).await.unwrap();
    assert!(change.diff.is_empty());
    assert!(!change.applied());
    assert_eq!(remote.call_count(Operation::CreateChangeSet), 0);

    let same_subscription = document(json!({
        "component": "web",
        "attributes": {
            "/domain/host": { "$source": { "component": db.as_str(), "path": "/domain/address" } },
            "/domain/port": 80,
            "/domain/legacy": true
        }
    }));
    let change = reconciler
        .update_component(&same_subscription, false)
        .await
        .unwrap();
    assert!(change.diff.set.is_empty());
    assert!(change.diff.unset.is_empty());
    assert_eq!(change.diff.subscriptions.len(), 1);
    assert!(change.applied());

    let updates = remote.component_updates();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].1.attributes.contains_key("/domain/host"));
}

/// Tenet: an unresolvable subscription aborts before any change set exists.
#[tokio::test]
async fn unresolvable_subscription_aborts_before_mutation() {
    let Fixture { remote, .. } = fixture();
    let reconciler = Reconciler::new(&remote, ConvergeConfig::new());

    let doc = document(json!({
        "component": "web",
        "attributes": {
            "/domain/host": { "$source": { "component": "nope", "path": "/domain/address" } }
        }
    }));
    let err = reconciler.update_component(&doc, false).await.unwrap_err();

    assert!(matches!(
        err,
        ConvergeError::Resolve(ResolveError::Unresolvable { ref reference }) if reference == "nope"
    ));
    assert_eq!(remote.call_count(Operation::CreateChangeSet), 0);
    assert_eq!(remote.mutation_count(), 0);
}

/// Tenet: a component reference matching several components is an error,
/// not a guess.
#[tokio::test]
async fn ambiguous_component_reference_is_rejected() {
    let Fixture { remote, .. } = fixture();
    remote.seed_component("web", Some("Server"), AttributeMap::new());
    let reconciler = Reconciler::new(&remote, ConvergeConfig::new());

    let err = reconciler.get_component("web").await.unwrap_err();
    assert!(matches!(
        err,
        ConvergeError::Resolve(ResolveError::Ambiguous { ref candidates, .. }) if candidates.len() == 2
    ));
}

/// Tenet: `/si/name` is sent as a rename, not as an attribute assignment.
#[tokio::test]
async fn name_path_renames_component() {
    let Fixture { remote, db, .. } = fixture();
    let reconciler = Reconciler::new(&remote, ConvergeConfig::new());

    let doc = document(json!({
        "componentId": db.as_str(),
        "attributes": { "/si/name": "db-primary", "/domain/address": "10.0.0.5" }
    }));
    let change = reconciler.update_component(&doc, false).await.unwrap();
    assert_eq!(change.diff.rename.as_deref(), Some("db-primary"));
    assert!(change.diff.set.is_empty());

    remote.merge_open_change_sets();
    assert_eq!(remote.head_component(&db).unwrap().name, "db-primary");
}

/// Tenet: a rename to a non-string is rejected instead of silently dropped.
#[tokio::test]
async fn non_string_name_is_rejected() {
    let Fixture { remote, .. } = fixture();
    let reconciler = Reconciler::new(&remote, ConvergeConfig::new());

    let doc = document(json!({ "component": "db", "attributes": { "/si/name": 5 } }));
    let err = reconciler.update_component(&doc, false).await.unwrap_err();

    assert!(matches!(
        err,
        ConvergeError::Model(ModelError::InvalidDocument(_))
    ));
    assert_eq!(remote.call_count(Operation::CreateChangeSet), 0);
}

/// Tenet: a dry run computes the diff and stops.
#[tokio::test]
async fn dry_run_update_opens_nothing() {
    let Fixture { remote, .. } = fixture();
    let reconciler = Reconciler::new(&remote, ConvergeConfig::new());

    let doc = document(json!({ "component": "db", "attributes": { "/domain/address": "10.0.0.9" } }));
    let change = reconciler.update_component(&doc, true).await.unwrap();

    assert!(change.dry_run);
    assert_eq!(change.diff.len(), 1);
    assert!(!change.applied());
    assert_eq!(remote.call_count(Operation::CreateChangeSet), 0);
}

/// Tenet: a failed update abandons its change set and surfaces the error.
#[tokio::test]
async fn failed_update_abandons_change_set() {
    let Fixture { remote, .. } = fixture();
    remote.fail_on(Operation::UpdateComponent, 1);
    let reconciler = Reconciler::new(&remote, ConvergeConfig::new());

    let doc = document(json!({ "component": "db", "attributes": { "/domain/address": "10.0.0.9" } }));
    let err = reconciler.update_component(&doc, false).await.unwrap_err();

    assert!(matches!(err, ConvergeError::Api(_)));
    assert_eq!(remote.abandoned_change_sets().len(), 1);
    assert!(remote.open_change_sets().is_empty());
}

/// Tenet: delete and upgrade each resolve the reference and run in their own
/// change set.
#[tokio::test]
async fn delete_and_upgrade_by_name() {
    let Fixture { remote, db, web } = fixture();
    let reconciler = Reconciler::new(&remote, ConvergeConfig::new());

    assert_eq!(reconciler.upgrade_component("db").await.unwrap(), db);
    assert_eq!(remote.call_count(Operation::UpgradeComponent), 1);
    assert_eq!(remote.merge_open_change_sets(), 1);

    assert_eq!(reconciler.delete_component("web").await.unwrap(), web);
    assert_eq!(remote.merge_open_change_sets(), 1);
    assert!(remote.head_component(&web).is_none());
    assert!(remote.head_component(&db).is_some());
}

/// Tenet: search passes the schema filter through.
#[tokio::test]
async fn search_filters_by_schema() {
    let Fixture { remote, db, .. } = fixture();
    let reconciler = Reconciler::new(&remote, ConvergeConfig::new());

    let hits = reconciler.search_components("", Some("Postgres")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, db);
}

/// Tenet: documents load from YAML and JSON files alike.
#[tokio::test]
async fn document_loads_from_yaml_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("web.yaml");
    std::fs::write(
        &path,
        "component: web\nattributes:\n  domain:\n    port: 8080\n",
    )
    .unwrap();

    let doc = ComponentDocument::load(&path).await.unwrap();
    assert_eq!(doc.component, "web");
    let map = doc.attribute_map().unwrap();
    assert_eq!(
        map.get_str("/domain/port").and_then(AttributeValue::as_literal),
        Some(&json!(8080))
    );

    let missing = ComponentDocument::load(&dir.path().join("nope.json")).await;
    assert!(matches!(missing, Err(ConvergeError::Io { .. })));
}
