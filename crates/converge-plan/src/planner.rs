//! Schema and function reconciliation planner
//!
//! Compares desired schemas against observed remote state and produces the
//! minimal ordered set of mutations. Planning performs no I/O: the same
//! inputs always yield the same [`Plan`].

use converge_model::{
    FuncId, FunctionDefinition, FunctionKind, ObservedState, RemoteFunction, RemoteSchemaState,
    SchemaDefinition, SchemaFields, SchemaId, VariantId,
};
use serde::Serialize;
use std::collections::HashSet;

/// Planner modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOptions {
    /// Desired state comes from the overlays tree: never touch schema fields,
    /// only plan overlay functions, and require the schema to exist remotely
    pub overlay_only: bool,
    /// Allow updating the fields of builtin schemas
    pub builtin_override: bool,
}

impl PlanOptions {
    /// Options for an overlay push
    #[inline]
    #[must_use]
    pub fn overlays() -> Self {
        Self {
            overlay_only: true,
            builtin_override: false,
        }
    }

    /// With builtin override
    #[inline]
    #[must_use]
    pub fn with_builtin_override(mut self, builtin_override: bool) -> Self {
        self.builtin_override = builtin_override;
        self
    }
}

/// Where a planned schema's mutations go
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SchemaTarget {
    /// Schema does not exist remotely and will be created
    New,
    /// Schema exists; its variant will be unlocked first
    #[serde(rename_all = "camelCase")]
    Existing {
        schema_id: SchemaId,
        variant_id: VariantId,
    },
}

/// A bound function to detach
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionUnbind {
    pub func_id: FuncId,
    pub name: String,
    pub kind: FunctionKind,
}

impl From<&RemoteFunction> for FunctionUnbind {
    fn from(remote: &RemoteFunction) -> Self {
        Self {
            func_id: remote.func_id.clone(),
            name: remote.name.clone(),
            kind: remote.kind,
        }
    }
}

/// A bound function whose content changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionUpdate {
    /// Id of the existing remote function
    pub func_id: FuncId,
    pub function: FunctionDefinition,
}

/// Mutations for one schema, in apply order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaPlan {
    pub name: String,
    pub target: SchemaTarget,
    /// Desired fields, used for create and for field updates
    pub fields: SchemaFields,
    /// Existing schema fields differ and are eligible for update
    pub variant_data_changed: bool,
    pub unbind: Vec<FunctionUnbind>,
    pub create: Vec<FunctionDefinition>,
    pub update: Vec<FunctionUpdate>,
}

impl SchemaPlan {
    /// Whether the schema is created rather than updated
    #[inline]
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self.target, SchemaTarget::New)
    }

    /// Whether applying this plan would change nothing
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.is_new()
            && !self.variant_data_changed
            && self.unbind.is_empty()
            && self.create.is_empty()
            && self.update.is_empty()
    }

    /// Number of remote mutations, not counting the unlock
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        usize::from(self.is_new() || self.variant_data_changed)
            + self.unbind.len()
            + self.create.len()
            + self.update.len()
    }
}

/// Why part of the desired state was left out of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum PlanError {
    /// Desired schema failed validation
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },

    /// Overlays target a schema the remote does not have
    #[error("overlays require an existing remote schema")]
    MissingRemoteSchema,

    /// Non-overlay function on a builtin schema without override
    #[error("function '{function}' is not an overlay and the schema is builtin")]
    ProtectedFunction { function: String },

    /// Builtin schema fields differ but override is off
    #[error("schema is builtin; its fields differ but are left unchanged")]
    ProtectedFields,
}

/// A non-fatal planning problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanIssue {
    pub schema: String,
    pub error: PlanError,
}

/// Ordered mutations for a batch of schemas
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Schemas with at least one mutation, in desired order
    pub schemas: Vec<SchemaPlan>,
    pub issues: Vec<PlanIssue>,
}

impl Plan {
    /// Check if there is nothing to apply
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Total number of remote mutations
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.schemas.iter().map(SchemaPlan::mutation_count).sum()
    }

    fn issue(&mut self, schema: &str, error: PlanError) {
        push_issue(&mut self.issues, schema, error);
    }
}

/// Plan the mutations that bring `observed` in line with `desired`
///
/// A schema missing from `observed` is treated as not found remotely.
#[must_use]
pub fn plan(desired: &[SchemaDefinition], observed: &ObservedState, options: PlanOptions) -> Plan {
    let mut out = Plan::default();

    for schema in desired {
        if let Err(e) = schema.validate() {
            out.issue(schema.name(), PlanError::InvalidSchema {
                message: e.to_string(),
            });
            continue;
        }

        let schema_plan = match observed.get(schema.name()) {
            None if options.overlay_only => {
                out.issue(schema.name(), PlanError::MissingRemoteSchema);
                continue;
            }
            None => plan_new(schema),
            Some(remote) => plan_existing(schema, remote, options, &mut out.issues),
        };

        if schema_plan.is_noop() {
            tracing::debug!(schema = %schema.name(), "schema unchanged");
            continue;
        }
        tracing::debug!(
            schema = %schema.name(),
            new = schema_plan.is_new(),
            unbind = schema_plan.unbind.len(),
            create = schema_plan.create.len(),
            update = schema_plan.update.len(),
            "planned schema"
        );
        out.schemas.push(schema_plan);
    }

    out
}

fn push_issue(issues: &mut Vec<PlanIssue>, schema: &str, error: PlanError) {
    tracing::warn!(schema = %schema, error = %error, "skipping part of desired state");
    issues.push(PlanIssue {
        schema: schema.to_string(),
        error,
    });
}

fn plan_new(schema: &SchemaDefinition) -> SchemaPlan {
    SchemaPlan {
        name: schema.fields.name.clone(),
        target: SchemaTarget::New,
        fields: schema.fields.clone(),
        variant_data_changed: false,
        unbind: Vec::new(),
        create: schema.functions.iter().cloned().collect(),
        update: Vec::new(),
    }
}

fn plan_existing(
    schema: &SchemaDefinition,
    remote: &RemoteSchemaState,
    options: PlanOptions,
    issues: &mut Vec<PlanIssue>,
) -> SchemaPlan {
    let builtin_locked = remote.installed_from_upstream && !options.builtin_override;
    let fields_eligible = !options.overlay_only && !builtin_locked;

    let fields_differ = schema.fields.differs_from(&remote.fields);
    let variant_data_changed = fields_eligible && fields_differ;
    if fields_differ && builtin_locked && !options.overlay_only {
        push_issue(issues, schema.name(), PlanError::ProtectedFields);
    }

    // With fields locked, only overlays are ours to match or remove.
    let candidates: Vec<&RemoteFunction> = remote
        .bound
        .iter()
        .filter(|f| fields_eligible || f.is_overlay)
        .collect();

    let mut matched: HashSet<&FuncId> = HashSet::new();
    let mut create = Vec::new();
    let mut update = Vec::new();

    for function in schema.functions.iter() {
        if !fields_eligible && !function.is_overlay {
            push_issue(
                issues,
                schema.name(),
                PlanError::ProtectedFunction {
                    function: function.name.clone(),
                },
            );
            continue;
        }

        let existing = candidates.iter().find(|r| {
            r.name == function.name
                && !matched.contains(&r.func_id)
                && function.class.matches_remote(r.kind, r.action_kind)
        });

        match existing {
            None => create.push(function.clone()),
            Some(remote_fn) => {
                matched.insert(&remote_fn.func_id);
                let changed = remote
                    .body(&remote_fn.func_id)
                    .map_or(true, |body| function.differs_from(body));
                if changed {
                    update.push(FunctionUpdate {
                        func_id: remote_fn.func_id.clone(),
                        function: function.clone(),
                    });
                }
            }
        }
    }

    let owns_unbind = fields_eligible || options.overlay_only;
    let unbind = if owns_unbind {
        candidates
            .iter()
            .filter(|r| !matched.contains(&r.func_id))
            .map(|r| FunctionUnbind::from(*r))
            .collect()
    } else {
        Vec::new()
    };

    SchemaPlan {
        name: schema.fields.name.clone(),
        target: SchemaTarget::Existing {
            schema_id: remote.schema_id.clone(),
            variant_id: remote.variant_id.clone(),
        },
        fields: schema.fields.clone(),
        variant_data_changed,
        unbind,
        create,
        update,
    }
}
