//! Remote state fetcher
//!
//! Read-only: resolves schemas by name and loads the default variant with the
//! full body of every bound function. Nothing is cached between runs.

use converge_api::{ApiResult, RemoteApi};
use converge_model::{ChangeSetId, ObservedState, RemoteSchemaState, SchemaDefinition};

/// Fetch one schema, or `None` if the remote does not have it
///
/// # Errors
/// Any failure other than a 404 on the name lookup.
pub async fn fetch_schema(
    api: &dyn RemoteApi,
    change_set: &ChangeSetId,
    name: &str,
) -> ApiResult<Option<RemoteSchemaState>> {
    let Some(summary) = api.find_schema(change_set, name).await? else {
        tracing::debug!(schema = %name, "schema not found remotely");
        return Ok(None);
    };

    let variant = api.default_variant(change_set, &summary.schema_id).await?;
    let mut state = RemoteSchemaState::new(summary.schema_id, variant.variant_id, variant.fields);
    state.installed_from_upstream = variant.installed_from_upstream;

    for bound in &variant.variant_funcs {
        let body = api.get_function(change_set, &bound.func_id).await?;
        state.bodies.insert(bound.func_id.clone(), body);
    }
    state.bound = variant.variant_funcs;

    tracing::debug!(
        schema = %name,
        schema_id = %state.schema_id,
        builtin = state.installed_from_upstream,
        bound = state.bound.len(),
        "fetched schema"
    );
    Ok(Some(state))
}

/// Fetch the observed state of every desired schema
///
/// # Errors
/// Fails on the first lookup that fails for a reason other than 404.
pub async fn fetch_observed(
    api: &dyn RemoteApi,
    change_set: &ChangeSetId,
    desired: &[SchemaDefinition],
) -> ApiResult<ObservedState> {
    let mut observed = ObservedState::new();
    for schema in desired {
        if let Some(state) = fetch_schema(api, change_set, schema.name()).await? {
            observed.insert(schema.name(), state);
        }
    }
    Ok(observed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_model::{FunctionKind, SchemaFields};
    use converge_test_utils::{function, InMemoryRemote};

    #[tokio::test]
    async fn missing_schema_is_none() {
        let remote = InMemoryRemote::new();
        let head = remote.head_id();
        assert!(fetch_schema(&remote, &head, "Ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fetch_loads_bound_bodies() {
        let remote = InMemoryRemote::new();
        remote.seed_schema(
            SchemaFields::new("Widget", "code"),
            true,
            &[function("check", FunctionKind::Qualification, "return true")],
        );
        let head = remote.head_id();

        let state = fetch_schema(&remote, &head, "widget").await.unwrap().unwrap();
        assert!(state.installed_from_upstream);
        assert_eq!(state.bound.len(), 1);
        let body = state.body(&state.bound[0].func_id).unwrap();
        assert_eq!(body.code, "return true");
    }
}
