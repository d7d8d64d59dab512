//! Property tests for the planner and the attribute diff.
//!
//! Core guarantees exercised here:
//! - Planning is deterministic for fixed inputs.
//! - Applying a plan and re-planning against the result yields an empty plan.
//! - Applying an attribute diff to the current map reproduces the desired map.

use converge_model::{
    ActionKind, AttributeMap, AttributePath, AttributeValue, FuncId, FunctionBody, FunctionClass,
    FunctionDefinition, FunctionKind, ObservedState, RemoteSchemaState, SchemaDefinition,
    SchemaFields, SchemaId, Subscription, VariantId,
};
use converge_plan::{diff_attributes, plan, Plan, PlanOptions, SchemaTarget};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;

const NAMES: &[&str] = &["create", "destroy", "check", "render", "import", "auth"];

fn arb_class() -> impl Strategy<Value = FunctionClass> {
    prop_oneof![
        prop::sample::select(vec![
            ActionKind::Create,
            ActionKind::Destroy,
            ActionKind::Refresh,
            ActionKind::Update,
            ActionKind::Manual,
        ])
        .prop_map(|action_kind| FunctionClass::Action { action_kind }),
        Just(FunctionClass::Qualification),
        Just(FunctionClass::CodeGeneration),
        Just(FunctionClass::Management),
        Just(FunctionClass::Authentication),
    ]
}

fn arb_functions() -> impl Strategy<Value = Vec<(String, FunctionClass, String)>> {
    prop::collection::btree_map(
        prop::sample::select(NAMES.to_vec()),
        (arb_class(), prop::sample::select(vec!["a", "b", "c"])),
        0..NAMES.len(),
    )
    .prop_map(|map| {
        map.into_iter()
            .map(|(name, (class, code))| (name.to_string(), class, code.to_string()))
            .collect()
    })
}

fn arb_schema() -> impl Strategy<Value = SchemaDefinition> {
    (prop::sample::select(vec!["x", "y"]), arb_functions()).prop_map(|(code, functions)| {
        functions.into_iter().fold(
            SchemaDefinition::new(SchemaFields::new("Widget", code)),
            |schema, (name, class, code)| {
                schema.with_function(FunctionDefinition::new(name, class, code))
            },
        )
    })
}

fn arb_observed() -> impl Strategy<Value = ObservedState> {
    (
        any::<bool>(),
        prop::sample::select(vec!["x", "y"]),
        arb_functions(),
    )
        .prop_map(|(exists, code, functions)| {
            if !exists {
                return ObservedState::new();
            }
            let state = functions.into_iter().enumerate().fold(
                RemoteSchemaState::new(
                    SchemaId::new("s1"),
                    VariantId::new("v1"),
                    SchemaFields::new("Widget", code),
                ),
                |state, (i, (name, class, code))| {
                    state.with_function(body(&format!("r{i}"), &name, class, &code))
                },
            );
            ObservedState::new().with("Widget", state)
        })
}

fn body(id: &str, name: &str, class: FunctionClass, code: &str) -> FunctionBody {
    FunctionBody {
        func_id: FuncId::new(id),
        name: name.to_string(),
        display_name: None,
        description: None,
        code: code.to_string(),
        kind: class.kind(),
        action_kind: class.action_kind(),
        is_overlay: false,
    }
}

/// Apply a plan to observed state the way the remote would
fn simulate(plan: &Plan, mut observed: ObservedState) -> ObservedState {
    let mut next_id = 0usize;
    let mut fresh_id = || {
        next_id += 1;
        format!("new{next_id}")
    };

    for schema in &plan.schemas {
        let mut state = match &schema.target {
            SchemaTarget::New => RemoteSchemaState::new(
                SchemaId::new(fresh_id()),
                VariantId::new(fresh_id()),
                schema.fields.clone(),
            ),
            SchemaTarget::Existing { .. } => match observed.get(&schema.name) {
                Some(state) => state.clone(),
                None => continue,
            },
        };
        if schema.variant_data_changed {
            state.fields = schema.fields.clone();
        }
        for unbind in &schema.unbind {
            state.bound.retain(|f| f.func_id != unbind.func_id);
            state.bodies.remove(&unbind.func_id);
        }
        for function in &schema.create {
            state = state.with_function(body(&fresh_id(), &function.name, function.class, &function.code));
        }
        for update in &schema.update {
            if let Some(existing) = state.bodies.get_mut(&update.func_id) {
                existing.code = update.function.code.clone();
                existing.name = update.function.name.clone();
                existing.display_name = update.function.display_name.clone();
                existing.description = update.function.description.clone();
            }
        }
        observed.insert(&schema.name, state);
    }
    observed
}

proptest! {
    #[test]
    fn prop_plan_is_deterministic(schema in arb_schema(), observed in arb_observed()) {
        let desired = vec![schema];
        let first = plan(&desired, &observed, PlanOptions::default());
        let second = plan(&desired, &observed, PlanOptions::default());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_apply_then_replan_is_empty(schema in arb_schema(), observed in arb_observed()) {
        let desired = vec![schema];
        let first = plan(&desired, &observed, PlanOptions::default());
        let after = simulate(&first, observed);
        let second = plan(&desired, &after, PlanOptions::default());
        prop_assert!(second.is_empty(), "second plan not empty: {:?}", second);
    }

    #[test]
    fn prop_unbind_never_targets_matched_function(schema in arb_schema(), observed in arb_observed()) {
        let desired = vec![schema];
        let plan = plan(&desired, &observed, PlanOptions::default());
        for schema in &plan.schemas {
            for update in &schema.update {
                prop_assert!(schema.unbind.iter().all(|u| u.func_id != update.func_id));
            }
        }
    }
}

const SEGMENTS: &[&str] = &["a", "b", "c", "d", "e"];

fn arb_attribute_value() -> impl Strategy<Value = AttributeValue> {
    prop_oneof![
        (0..3i64).prop_map(|n| AttributeValue::Literal(json!(n))),
        prop::sample::select(vec!["p", "q"])
            .prop_map(|s| AttributeValue::Literal(json!({ "nested": s }))),
        prop::sample::select(vec!["db", "cache"])
            .prop_map(|c| AttributeValue::Subscription(Subscription::new(c, "/domain/host"))),
    ]
}

fn arb_attributes() -> impl Strategy<Value = AttributeMap> {
    prop::collection::btree_map(
        prop::sample::select(SEGMENTS.to_vec()),
        arb_attribute_value(),
        0..SEGMENTS.len(),
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .map(|(segment, value)| {
                (
                    AttributePath::new(vec!["domain".to_string(), segment.to_string()]),
                    value,
                )
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_self_diff_only_reasserts_subscriptions(attrs in arb_attributes()) {
        let diff = diff_attributes(&attrs, &attrs, None);
        prop_assert!(diff.set.is_empty());
        prop_assert!(diff.unset.is_empty());
        prop_assert!(diff.rename.is_none());
        let expected = attrs.iter().filter(|(_, v)| v.as_subscription().is_some()).count();
        prop_assert_eq!(diff.subscriptions.len(), expected);
    }

    #[test]
    fn prop_applied_diff_reproduces_desired(desired in arb_attributes(), current in arb_attributes()) {
        let diff = diff_attributes(&desired, &current, None);

        let mut result: BTreeMap<AttributePath, AttributeValue> =
            current.iter().map(|(p, v)| (p.clone(), v.clone())).collect();
        for path in &diff.unset {
            result.remove(path);
        }
        for (path, value) in &diff.set {
            result.insert(path.clone(), AttributeValue::Literal(value.clone()));
        }
        for (path, subscription) in &diff.subscriptions {
            result.insert(path.clone(), AttributeValue::Subscription(subscription.clone()));
        }

        let expected: BTreeMap<AttributePath, AttributeValue> =
            desired.iter().map(|(p, v)| (p.clone(), v.clone())).collect();
        prop_assert_eq!(result, expected);
    }
}

#[test]
fn second_run_against_created_schema_is_empty() {
    let desired = vec![SchemaDefinition::new(SchemaFields::new("Widget", "x")).with_function(
        FunctionDefinition::new("check", FunctionClass::Qualification, "a"),
    )];
    let first = plan(&desired, &ObservedState::new(), PlanOptions::default());
    assert_eq!(first.schemas.len(), 1);

    let after = simulate(&first, ObservedState::new());
    assert!(plan(&desired, &after, PlanOptions::default()).is_empty());
    assert_eq!(
        after.get("widget").map(|s| s.bound.len()),
        Some(1),
        "created function should be bound"
    );
    assert_eq!(FunctionKind::Qualification, after.get("Widget").unwrap().bound[0].kind);
}
