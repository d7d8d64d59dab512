//! Transactional apply engine
//!
//! Executes a [`Plan`] inside an already-open change set. The first failing
//! call stops the batch; the caller's [`crate::ChangeSet`] guard abandons
//! the change set.

use crate::error::ConvergeResult;
use converge_api::{CreateFunction, RemoteApi, UpdateFunction};
use converge_model::{ChangeSetId, SchemaId, VariantId};
use converge_plan::{Plan, SchemaPlan, SchemaTarget};
use serde::Serialize;

/// What an apply did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub schemas_created: usize,
    pub schemas_updated: usize,
    pub functions_created: usize,
    pub functions_updated: usize,
    pub functions_unbound: usize,
}

impl ApplyReport {
    /// Total mutations performed, excluding unlocks
    #[must_use]
    pub fn total(&self) -> usize {
        self.schemas_created
            + self.schemas_updated
            + self.functions_created
            + self.functions_updated
            + self.functions_unbound
    }
}

/// Apply every schema plan, in order
///
/// # Errors
/// Returns the first remote error. No further calls are made after it.
pub async fn apply_plan(
    api: &dyn RemoteApi,
    change_set: &ChangeSetId,
    plan: &Plan,
) -> ConvergeResult<ApplyReport> {
    let mut report = ApplyReport::default();
    for schema in &plan.schemas {
        apply_schema(api, change_set, schema, &mut report).await?;
    }
    tracing::info!(
        change_set = %change_set,
        mutations = report.total(),
        "applied plan"
    );
    Ok(report)
}

async fn apply_schema(
    api: &dyn RemoteApi,
    change_set: &ChangeSetId,
    schema: &SchemaPlan,
    report: &mut ApplyReport,
) -> ConvergeResult<()> {
    let (schema_id, variant_id) = schema_handle(api, change_set, schema, report).await?;

    for unbind in &schema.unbind {
        tracing::debug!(schema = %schema.name, function = %unbind.name, kind = %unbind.kind, "unbinding");
        api.unbind_function(change_set, &schema_id, &variant_id, &unbind.func_id, unbind.kind)
            .await?;
        report.functions_unbound += 1;
    }

    for function in &schema.create {
        tracing::debug!(schema = %schema.name, function = %function.name, kind = %function.kind(), "creating function");
        api.create_function(
            change_set,
            &schema_id,
            &variant_id,
            &CreateFunction::from(function),
        )
        .await?;
        report.functions_created += 1;
    }

    for update in &schema.update {
        tracing::debug!(schema = %schema.name, function = %update.function.name, "updating function");
        let editable = api.unlock_function(change_set, &update.func_id).await?;
        api.update_function(change_set, &editable, &UpdateFunction::from(&update.function))
            .await?;
        report.functions_updated += 1;
    }

    tracing::info!(schema = %schema.name, new = schema.is_new(), "schema applied");
    Ok(())
}

/// Create the schema or unlock the existing one, pushing changed fields
async fn schema_handle(
    api: &dyn RemoteApi,
    change_set: &ChangeSetId,
    schema: &SchemaPlan,
    report: &mut ApplyReport,
) -> ConvergeResult<(SchemaId, VariantId)> {
    match &schema.target {
        SchemaTarget::New => {
            let created = api.create_schema(change_set, &schema.fields).await?;
            report.schemas_created += 1;
            Ok((created.schema_id, created.variant_id))
        }
        SchemaTarget::Existing { schema_id, .. } => {
            let variant_id = api.unlock_schema(change_set, schema_id).await?;
            if schema.variant_data_changed {
                api.update_variant(change_set, schema_id, &variant_id, &schema.fields)
                    .await?;
                report.schemas_updated += 1;
            }
            Ok((schema_id.clone(), variant_id))
        }
    }
}
