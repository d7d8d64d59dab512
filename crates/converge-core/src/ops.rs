//! Top-level operations
//!
//! Each operation wires the scanner, fetcher, planner and apply engine
//! together for one invocation. Observed state is always fetched from HEAD
//! before a change set is opened, and exactly one change set covers a whole
//! push.

use crate::apply::{apply_plan, ApplyReport};
use crate::changeset::ChangeSet;
use crate::component::{self, ComponentChange, ComponentDocument};
use crate::config::ConvergeConfig;
use crate::error::{ConvergeError, ConvergeResult};
use crate::fetch::{fetch_observed, fetch_schema};
use converge_api::{ComponentView, RemoteApi};
use converge_model::{
    ChangeSetId, ComponentId, ComponentSummary, FunctionBody, FunctionClass, FunctionDefinition,
    FunctionKind, RemoteSchemaState, SchemaDefinition,
};
use converge_plan::{plan, Plan, PlanOptions};
use converge_scan::{scaffold_overlay, OverlayScaffold, ScanIssue, TreeScanner, TreeWriter};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A unit skipped because it failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedUnit {
    /// Schema name or path
    pub unit: String,
    /// Validation message
    pub reason: String,
}

impl From<&ScanIssue> for SkippedUnit {
    fn from(issue: &ScanIssue) -> Self {
        Self {
            unit: issue.path.display().to_string(),
            reason: issue.error.to_string(),
        }
    }
}

/// Outcome of a schema or overlay push
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    /// Mutations computed against HEAD
    pub plan: Plan,
    /// Scanner validation problems
    pub skipped: Vec<SkippedUnit>,
    /// Change set the plan was applied in, left open for review
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_set: Option<ChangeSetId>,
    /// Calls made, when the plan was applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<ApplyReport>,
    /// Whether this was a dry run
    pub dry_run: bool,
}

/// Outcome of a schema pull
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    /// Schema directories written
    pub written: Vec<PathBuf>,
    /// Requested names the remote does not have
    pub missing: Vec<String>,
}

/// Entry point for every operation against one workspace
pub struct Reconciler<'a> {
    api: &'a dyn RemoteApi,
    config: ConvergeConfig,
}

impl std::fmt::Debug for Reconciler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler over a remote
    #[inline]
    #[must_use]
    pub fn new(api: &'a dyn RemoteApi, config: ConvergeConfig) -> Self {
        Self { api, config }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ConvergeConfig {
        &self.config
    }

    /// Push the schema tree
    ///
    /// # Errors
    /// Fatal scan errors, remote failures, or apply failures. An apply
    /// failure abandons the change set.
    pub async fn push_schemas(&self, dry_run: bool) -> ConvergeResult<PushReport> {
        let options = PlanOptions::default().with_builtin_override(self.config.builtin_override);
        self.push_tree(TreeScanner::new(), &self.config.schemas_root, options, dry_run)
            .await
    }

    /// Push the overlay tree
    ///
    /// # Errors
    /// Same as [`Reconciler::push_schemas`].
    pub async fn push_overlays(&self, dry_run: bool) -> ConvergeResult<PushReport> {
        self.push_tree(
            TreeScanner::overlays(),
            &self.config.overlays_root,
            PlanOptions::overlays(),
            dry_run,
        )
        .await
    }

    async fn push_tree(
        &self,
        scanner: TreeScanner,
        root: &Path,
        options: PlanOptions,
        dry_run: bool,
    ) -> ConvergeResult<PushReport> {
        let scanned = scanner.scan(root).await?;
        let skipped: Vec<SkippedUnit> = scanned.issues.iter().map(SkippedUnit::from).collect();
        tracing::info!(
            root = %root.display(),
            schemas = scanned.schemas.len(),
            skipped = skipped.len(),
            "scanned tree"
        );

        let head = self.api.head_change_set().await?;
        let observed = fetch_observed(self.api, &head, &scanned.schemas).await?;
        let plan = plan(&scanned.schemas, &observed, options);
        let mut report = PushReport {
            plan,
            skipped,
            change_set: None,
            applied: None,
            dry_run,
        };

        if report.plan.is_empty() {
            tracing::info!("nothing to apply");
            return Ok(report);
        }
        if dry_run {
            tracing::info!(mutations = report.plan.mutation_count(), "dry run, not applying");
            return Ok(report);
        }

        let api = self.api;
        let planned = &report.plan;
        let (change_set, applied) = ChangeSet::open(api, &self.config.change_set_prefix)
            .await?
            .run(|cs| async move {
                let result = apply_plan(api, &cs, planned).await;
                result.map(|applied| (cs, applied))
            })
            .await?;

        report.change_set = Some(change_set);
        report.applied = Some(applied);
        Ok(report)
    }

    /// Write remote schemas into the schema tree
    ///
    /// Overlay functions are left out; they belong to the overlay tree.
    ///
    /// # Errors
    /// Remote failures, or an existing schema directory without `force`.
    pub async fn pull_schemas(&self, names: &[String], force: bool) -> ConvergeResult<PullReport> {
        let head = self.api.head_change_set().await?;
        let writer = TreeWriter::new(&self.config.schemas_root).with_force(force);
        let mut report = PullReport::default();

        for name in names {
            match fetch_schema(self.api, &head, name).await? {
                None => {
                    tracing::warn!(schema = %name, "schema not found remotely");
                    report.missing.push(name.clone());
                }
                Some(state) => {
                    let definition = definition_from_remote(&state);
                    let path = writer.write_schema(&definition).await?;
                    tracing::info!(schema = %definition.name(), path = %path.display(), "pulled schema");
                    report.written.push(path);
                }
            }
        }
        Ok(report)
    }

    /// Scaffold a new overlay function
    ///
    /// # Errors
    /// The files already exist, or cannot be written.
    pub async fn generate_overlay(
        &self,
        schema: &str,
        kind: FunctionKind,
        function_name: &str,
    ) -> ConvergeResult<OverlayScaffold> {
        generate_overlay(&self.config.overlays_root, schema, kind, function_name).await
    }

    /// Fetch a component
    ///
    /// # Errors
    /// See [`component::get_component`].
    pub async fn get_component(&self, reference: &str) -> ConvergeResult<ComponentView> {
        component::get_component(self.api, reference).await
    }

    /// Search components
    ///
    /// # Errors
    /// See [`component::search_components`].
    pub async fn search_components(
        &self,
        query: &str,
        schema: Option<&str>,
    ) -> ConvergeResult<Vec<ComponentSummary>> {
        component::search_components(self.api, query, schema).await
    }

    /// Update a component from a document
    ///
    /// # Errors
    /// See [`component::update_component`].
    pub async fn update_component(
        &self,
        document: &ComponentDocument,
        dry_run: bool,
    ) -> ConvergeResult<ComponentChange> {
        component::update_component(self.api, &self.config.change_set_prefix, document, dry_run)
            .await
    }

    /// Delete a component
    ///
    /// # Errors
    /// See [`component::delete_component`].
    pub async fn delete_component(&self, reference: &str) -> ConvergeResult<ComponentId> {
        component::delete_component(self.api, &self.config.change_set_prefix, reference).await
    }

    /// Upgrade a component
    ///
    /// # Errors
    /// See [`component::upgrade_component`].
    pub async fn upgrade_component(&self, reference: &str) -> ConvergeResult<ComponentId> {
        component::upgrade_component(self.api, &self.config.change_set_prefix, reference).await
    }
}

/// Scaffold a new overlay function under `overlays_root`
///
/// Local only; no remote is contacted.
///
/// # Errors
/// Empty function name, existing files, or IO failure.
pub async fn generate_overlay(
    overlays_root: &Path,
    schema: &str,
    kind: FunctionKind,
    function_name: &str,
) -> ConvergeResult<OverlayScaffold> {
    if schema.trim().is_empty() || function_name.trim().is_empty() {
        return Err(ConvergeError::Config(
            "overlay schema and function names must not be empty".to_string(),
        ));
    }
    let scaffold = scaffold_overlay(overlays_root, schema, kind, function_name).await?;
    tracing::info!(schema = %schema, kind = %kind, path = %scaffold.code_path.display(), "generated overlay");
    Ok(scaffold)
}

/// Desired-state form of an observed schema, without overlay functions
#[must_use]
pub fn definition_from_remote(state: &RemoteSchemaState) -> SchemaDefinition {
    let mut definition = SchemaDefinition::new(state.fields.clone());
    for bound in state.bound.iter().filter(|f| !f.is_overlay) {
        if let Some(body) = state.body(&bound.func_id) {
            definition.functions.push(definition_from_body(body));
        }
    }
    definition
}

fn definition_from_body(body: &FunctionBody) -> FunctionDefinition {
    let class = FunctionClass::from_parts(body.kind, body.action_kind)
        .unwrap_or_else(|_| FunctionClass::classify(body.kind, &body.name));
    let mut function = FunctionDefinition::new(body.name.clone(), class, body.code.clone());
    function.display_name.clone_from(&body.display_name);
    function.description.clone_from(&body.description);
    function
}
