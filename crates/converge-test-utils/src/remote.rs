//! In-memory implementation of the remote API
//!
//! Models the remote's change-set staging: HEAD holds committed state, each
//! open change set holds a private copy that is discarded on abandon and
//! only becomes visible at HEAD when a test merges it.

use async_trait::async_trait;
use converge_api::{
    is_unset_marker, ApiError, ApiResult, ChangeSetSummary, ComponentUpdate, ComponentView,
    CreateFunction, CreatedSchema, DefaultVariant, RemoteApi, SchemaSummary, UpdateFunction,
};
use converge_model::{
    AttributeMap, AttributePath, AttributeValue, ChangeSetId, ComponentId, ComponentSummary,
    FuncId, FunctionBody, FunctionDefinition, FunctionKind, RemoteFunction, SchemaFields,
    SchemaId, VariantId,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use ulid::Ulid;

/// Remote operations, for call counting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListChangeSets,
    CreateChangeSet,
    AbandonChangeSet,
    FindSchema,
    DefaultVariant,
    CreateSchema,
    UnlockSchema,
    UpdateVariant,
    GetFunction,
    CreateFunction,
    UnlockFunction,
    UpdateFunction,
    UnbindFunction,
    GetComponent,
    SearchComponents,
    UpdateComponent,
    DeleteComponent,
    UpgradeComponent,
}

impl Operation {
    /// Whether the operation changes remote state
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Operation::CreateSchema
                | Operation::UnlockSchema
                | Operation::UpdateVariant
                | Operation::CreateFunction
                | Operation::UnlockFunction
                | Operation::UpdateFunction
                | Operation::UnbindFunction
                | Operation::UpdateComponent
                | Operation::DeleteComponent
                | Operation::UpgradeComponent
        )
    }
}

#[derive(Debug, Clone)]
struct StoredSchema {
    variant_id: VariantId,
    installed_from_upstream: bool,
    fields: SchemaFields,
    bound: Vec<FuncId>,
}

#[derive(Debug, Clone, Default)]
struct Workspace {
    schemas: BTreeMap<SchemaId, StoredSchema>,
    functions: HashMap<FuncId, FunctionBody>,
    components: BTreeMap<ComponentId, ComponentView>,
}

impl Workspace {
    fn schema_by_name(&self, name: &str) -> Option<(&SchemaId, &StoredSchema)> {
        let key = name.to_lowercase();
        self.schemas
            .iter()
            .find(|(_, s)| s.fields.name.to_lowercase() == key)
    }

    fn schema_mut(&mut self, id: &SchemaId, path: &str) -> ApiResult<&mut StoredSchema> {
        self.schemas
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found("GET", path))
    }
}

#[derive(Debug)]
struct OpenChangeSet {
    name: String,
    workspace: Workspace,
}

#[derive(Debug)]
struct State {
    head_id: ChangeSetId,
    head: Workspace,
    open: BTreeMap<ChangeSetId, OpenChangeSet>,
    abandoned: Vec<ChangeSetId>,
    calls: Vec<Operation>,
    counts: HashMap<Operation, usize>,
    failures: HashMap<Operation, usize>,
    component_updates: Vec<(ComponentId, ComponentUpdate)>,
}

impl State {
    fn workspace(&self, cs: &ChangeSetId) -> ApiResult<&Workspace> {
        if *cs == self.head_id {
            return Ok(&self.head);
        }
        self.open
            .get(cs)
            .map(|open| &open.workspace)
            .ok_or_else(|| ApiError::not_found("GET", format!("/change-sets/{cs}")))
    }

    fn workspace_mut(&mut self, cs: &ChangeSetId) -> ApiResult<&mut Workspace> {
        if *cs == self.head_id {
            return Err(ApiError::status(
                409,
                "POST",
                format!("/change-sets/{cs}"),
                "HEAD cannot be modified directly",
            ));
        }
        self.open
            .get_mut(cs)
            .map(|open| &mut open.workspace)
            .ok_or_else(|| ApiError::not_found("POST", format!("/change-sets/{cs}")))
    }
}

/// Remote API fake backed by in-memory state
#[derive(Debug)]
pub struct InMemoryRemote {
    state: Mutex<State>,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn new_id() -> String {
    Ulid::new().to_string()
}

impl InMemoryRemote {
    /// Create an empty remote with a HEAD change set
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                head_id: ChangeSetId::new(new_id()),
                head: Workspace::default(),
                open: BTreeMap::new(),
                abandoned: Vec::new(),
                calls: Vec::new(),
                counts: HashMap::new(),
                failures: HashMap::new(),
                component_updates: Vec::new(),
            }),
        }
    }

    // Seeding

    /// Add a schema with bound functions directly to HEAD
    pub fn seed_schema(
        &self,
        fields: SchemaFields,
        installed_from_upstream: bool,
        functions: &[FunctionDefinition],
    ) -> SchemaId {
        let mut state = self.state.lock();
        let schema_id = SchemaId::new(new_id());
        let mut bound = Vec::new();
        for function in functions {
            let func_id = FuncId::new(new_id());
            state
                .head
                .functions
                .insert(func_id.clone(), body_from_definition(func_id.clone(), function));
            bound.push(func_id);
        }
        state.head.schemas.insert(
            schema_id.clone(),
            StoredSchema {
                variant_id: VariantId::new(new_id()),
                installed_from_upstream,
                fields,
                bound,
            },
        );
        schema_id
    }

    /// Add a component directly to HEAD
    pub fn seed_component(
        &self,
        name: &str,
        schema_name: Option<&str>,
        attributes: AttributeMap,
    ) -> ComponentId {
        self.seed_component_with_id(ComponentId::new(new_id()), name, schema_name, attributes)
    }

    /// Add a component with a fixed id directly to HEAD
    pub fn seed_component_with_id(
        &self,
        id: ComponentId,
        name: &str,
        schema_name: Option<&str>,
        attributes: AttributeMap,
    ) -> ComponentId {
        let view = ComponentView {
            id: id.clone(),
            name: name.to_string(),
            schema_name: schema_name.map(str::to_string),
            attributes,
        };
        self.state.lock().head.components.insert(id.clone(), view);
        id
    }

    // Failure injection

    /// Fail the `nth` call (1-based) of `operation` with a 500
    pub fn fail_on(&self, operation: Operation, nth: usize) {
        self.state.lock().failures.insert(operation, nth);
    }

    // Change-set control

    /// HEAD change set id
    #[must_use]
    pub fn head_id(&self) -> ChangeSetId {
        self.state.lock().head_id.clone()
    }

    /// Ids of change sets that are open
    #[must_use]
    pub fn open_change_sets(&self) -> Vec<ChangeSetId> {
        self.state.lock().open.keys().cloned().collect()
    }

    /// Name of an open change set
    #[must_use]
    pub fn change_set_name(&self, id: &ChangeSetId) -> Option<String> {
        self.state.lock().open.get(id).map(|cs| cs.name.clone())
    }

    /// Ids of change sets that were abandoned
    #[must_use]
    pub fn abandoned_change_sets(&self) -> Vec<ChangeSetId> {
        self.state.lock().abandoned.clone()
    }

    /// Commit an open change set to HEAD
    ///
    /// Returns `false` if no such change set is open.
    pub fn merge_change_set(&self, id: &ChangeSetId) -> bool {
        let mut state = self.state.lock();
        match state.open.remove(id) {
            Some(open) => {
                state.head = open.workspace;
                true
            }
            None => false,
        }
    }

    /// Commit every open change set to HEAD, in id order
    pub fn merge_open_change_sets(&self) -> usize {
        let ids = self.open_change_sets();
        ids.iter().filter(|id| self.merge_change_set(id)).count()
    }

    // Inspection

    /// Every call made, in order
    #[must_use]
    pub fn calls(&self) -> Vec<Operation> {
        self.state.lock().calls.clone()
    }

    /// Number of calls made to `operation`
    #[must_use]
    pub fn call_count(&self, operation: Operation) -> usize {
        self.state.lock().counts.get(&operation).copied().unwrap_or(0)
    }

    /// Number of mutating calls made
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.state.lock().calls.iter().filter(|op| op.is_mutation()).count()
    }

    /// Schema names at HEAD, sorted
    #[must_use]
    pub fn head_schema_names(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<_> = state.head.schemas.values().map(|s| s.fields.name.clone()).collect();
        names.sort();
        names
    }

    /// Fields of a schema at HEAD
    #[must_use]
    pub fn head_schema_fields(&self, name: &str) -> Option<SchemaFields> {
        let state = self.state.lock();
        state.head.schema_by_name(name).map(|(_, s)| s.fields.clone())
    }

    /// Bodies of the functions bound to a schema at HEAD, sorted by name
    #[must_use]
    pub fn head_functions(&self, schema_name: &str) -> Vec<FunctionBody> {
        let state = self.state.lock();
        let Some((_, schema)) = state.head.schema_by_name(schema_name) else {
            return Vec::new();
        };
        let mut bodies: Vec<_> = schema
            .bound
            .iter()
            .filter_map(|id| state.head.functions.get(id).cloned())
            .collect();
        bodies.sort_by(|a, b| a.name.cmp(&b.name));
        bodies
    }

    /// A component at HEAD
    #[must_use]
    pub fn head_component(&self, id: &ComponentId) -> Option<ComponentView> {
        self.state.lock().head.components.get(id).cloned()
    }

    /// Component update bodies received, in order
    #[must_use]
    pub fn component_updates(&self) -> Vec<(ComponentId, ComponentUpdate)> {
        self.state.lock().component_updates.clone()
    }

    fn record(&self, state: &mut State, operation: Operation) -> ApiResult<()> {
        state.calls.push(operation);
        let count = state.counts.entry(operation).or_default();
        *count += 1;
        let count = *count;
        if state.failures.get(&operation) == Some(&count) {
            return Err(ApiError::status(
                500,
                format!("{operation:?}"),
                "/injected",
                "injected failure",
            ));
        }
        Ok(())
    }
}

fn body_from_definition(func_id: FuncId, function: &FunctionDefinition) -> FunctionBody {
    FunctionBody {
        func_id,
        name: function.name.clone(),
        display_name: function.display_name.clone(),
        description: function.description.clone(),
        code: function.code.clone(),
        kind: function.kind(),
        action_kind: function.action_kind(),
        is_overlay: function.is_overlay,
    }
}

fn apply_component_update(view: &mut ComponentView, update: &ComponentUpdate) -> ApiResult<()> {
    if let Some(name) = &update.name {
        view.name.clone_from(name);
    }
    for (raw, value) in &update.attributes {
        let path: AttributePath = raw
            .parse()
            .map_err(|e| ApiError::status(400, "PUT", "/components", format!("{e}")))?;
        if is_unset_marker(value) {
            view.attributes.remove(&path);
            continue;
        }
        let value = AttributeValue::from_json(value.clone())
            .map_err(|e| ApiError::status(400, "PUT", "/components", e.to_string()))?;
        view.attributes.insert(path, value);
    }
    Ok(())
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    async fn list_change_sets(&self) -> ApiResult<Vec<ChangeSetSummary>> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::ListChangeSets)?;
        let mut list = vec![ChangeSetSummary {
            id: state.head_id.clone(),
            name: "HEAD".to_string(),
            is_head: true,
        }];
        list.extend(state.open.iter().map(|(id, open)| ChangeSetSummary {
            id: id.clone(),
            name: open.name.clone(),
            is_head: false,
        }));
        Ok(list)
    }

    async fn create_change_set(&self, name: &str) -> ApiResult<ChangeSetId> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::CreateChangeSet)?;
        let id = ChangeSetId::new(new_id());
        let workspace = state.head.clone();
        state.open.insert(
            id.clone(),
            OpenChangeSet {
                name: name.to_string(),
                workspace,
            },
        );
        Ok(id)
    }

    async fn abandon_change_set(&self, change_set: &ChangeSetId) -> ApiResult<()> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::AbandonChangeSet)?;
        if state.open.remove(change_set).is_none() {
            return Err(ApiError::not_found(
                "DELETE",
                format!("/change-sets/{change_set}"),
            ));
        }
        state.abandoned.push(change_set.clone());
        Ok(())
    }

    async fn find_schema(
        &self,
        change_set: &ChangeSetId,
        name: &str,
    ) -> ApiResult<Option<SchemaSummary>> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::FindSchema)?;
        let workspace = state.workspace(change_set)?;
        Ok(workspace
            .schema_by_name(name)
            .map(|(id, schema)| SchemaSummary {
                schema_id: id.clone(),
                schema_name: schema.fields.name.clone(),
            }))
    }

    async fn default_variant(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
    ) -> ApiResult<DefaultVariant> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::DefaultVariant)?;
        let workspace = state.workspace(change_set)?;
        let stored = workspace
            .schemas
            .get(schema)
            .ok_or_else(|| ApiError::not_found("GET", format!("/schemas/{schema}")))?;
        let variant_funcs = stored
            .bound
            .iter()
            .filter_map(|id| workspace.functions.get(id))
            .map(|body| RemoteFunction {
                func_id: body.func_id.clone(),
                name: body.name.clone(),
                kind: body.kind,
                action_kind: body.action_kind,
                is_overlay: body.is_overlay,
            })
            .collect();
        Ok(DefaultVariant {
            variant_id: stored.variant_id.clone(),
            installed_from_upstream: stored.installed_from_upstream,
            fields: stored.fields.clone(),
            variant_funcs,
        })
    }

    async fn create_schema(
        &self,
        change_set: &ChangeSetId,
        fields: &SchemaFields,
    ) -> ApiResult<CreatedSchema> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::CreateSchema)?;
        let workspace = state.workspace_mut(change_set)?;
        if workspace.schema_by_name(&fields.name).is_some() {
            return Err(ApiError::status(
                409,
                "POST",
                "/schemas",
                format!("schema '{}' already exists", fields.name),
            ));
        }
        let created = CreatedSchema {
            schema_id: SchemaId::new(new_id()),
            variant_id: VariantId::new(new_id()),
        };
        workspace.schemas.insert(
            created.schema_id.clone(),
            StoredSchema {
                variant_id: created.variant_id.clone(),
                installed_from_upstream: false,
                fields: fields.clone(),
                bound: Vec::new(),
            },
        );
        Ok(created)
    }

    async fn unlock_schema(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
    ) -> ApiResult<VariantId> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::UnlockSchema)?;
        let workspace = state.workspace_mut(change_set)?;
        let stored = workspace.schema_mut(schema, "/schemas/unlock")?;
        Ok(stored.variant_id.clone())
    }

    async fn update_variant(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
        variant: &VariantId,
        fields: &SchemaFields,
    ) -> ApiResult<()> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::UpdateVariant)?;
        let workspace = state.workspace_mut(change_set)?;
        let stored = workspace.schema_mut(schema, "/schemas/variant")?;
        if stored.variant_id != *variant {
            return Err(ApiError::not_found("PUT", format!("/variant/{variant}")));
        }
        stored.fields = fields.clone();
        Ok(())
    }

    async fn get_function(
        &self,
        change_set: &ChangeSetId,
        func: &FuncId,
    ) -> ApiResult<FunctionBody> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::GetFunction)?;
        state
            .workspace(change_set)?
            .functions
            .get(func)
            .cloned()
            .ok_or_else(|| ApiError::not_found("GET", format!("/funcs/{func}")))
    }

    async fn create_function(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
        variant: &VariantId,
        function: &CreateFunction,
    ) -> ApiResult<FuncId> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::CreateFunction)?;
        let workspace = state.workspace_mut(change_set)?;
        let func_id = FuncId::new(new_id());
        let stored = workspace.schema_mut(schema, "/schemas/funcs")?;
        if stored.variant_id != *variant {
            return Err(ApiError::not_found("POST", format!("/variant/{variant}")));
        }
        stored.bound.push(func_id.clone());
        workspace.functions.insert(
            func_id.clone(),
            FunctionBody {
                func_id: func_id.clone(),
                name: function.name.clone(),
                display_name: function.display_name.clone(),
                description: function.description.clone(),
                code: function.code.clone(),
                kind: function.kind,
                action_kind: function.action_kind,
                is_overlay: function.is_overlay,
            },
        );
        Ok(func_id)
    }

    async fn unlock_function(&self, change_set: &ChangeSetId, func: &FuncId) -> ApiResult<FuncId> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::UnlockFunction)?;
        let workspace = state.workspace_mut(change_set)?;
        if !workspace.functions.contains_key(func) {
            return Err(ApiError::not_found("POST", format!("/funcs/{func}/unlock")));
        }
        Ok(func.clone())
    }

    async fn update_function(
        &self,
        change_set: &ChangeSetId,
        func: &FuncId,
        update: &UpdateFunction,
    ) -> ApiResult<()> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::UpdateFunction)?;
        let workspace = state.workspace_mut(change_set)?;
        let body = workspace
            .functions
            .get_mut(func)
            .ok_or_else(|| ApiError::not_found("PUT", format!("/funcs/{func}")))?;
        body.name.clone_from(&update.name);
        body.display_name.clone_from(&update.display_name);
        body.description.clone_from(&update.description);
        body.code.clone_from(&update.code);
        Ok(())
    }

    async fn unbind_function(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
        variant: &VariantId,
        func: &FuncId,
        kind: FunctionKind,
    ) -> ApiResult<()> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::UnbindFunction)?;
        let workspace = state.workspace_mut(change_set)?;
        match workspace.functions.get(func) {
            Some(body) if body.kind == kind => {}
            Some(body) => {
                return Err(ApiError::status(
                    400,
                    "DELETE",
                    format!("/funcs/{}/{func}", kind.endpoint_segment()),
                    format!("function is a {}, not a {kind}", body.kind),
                ))
            }
            None => return Err(ApiError::not_found("DELETE", format!("/funcs/{func}"))),
        }
        let stored = workspace.schema_mut(schema, "/schemas/funcs")?;
        if stored.variant_id != *variant {
            return Err(ApiError::not_found("DELETE", format!("/variant/{variant}")));
        }
        let before = stored.bound.len();
        stored.bound.retain(|id| id != func);
        if stored.bound.len() == before {
            return Err(ApiError::not_found("DELETE", format!("/funcs/{func}")));
        }
        Ok(())
    }

    async fn get_component(
        &self,
        change_set: &ChangeSetId,
        component: &ComponentId,
    ) -> ApiResult<Option<ComponentView>> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::GetComponent)?;
        Ok(state.workspace(change_set)?.components.get(component).cloned())
    }

    async fn search_components(
        &self,
        change_set: &ChangeSetId,
        query: &str,
        schema: Option<&str>,
    ) -> ApiResult<Vec<ComponentSummary>> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::SearchComponents)?;
        let needle = query.to_lowercase();
        Ok(state
            .workspace(change_set)?
            .components
            .values()
            .filter(|c| c.name.to_lowercase().contains(&needle) || c.id.as_str() == query)
            .filter(|c| match schema {
                Some(schema) => c.schema_name.as_deref() == Some(schema),
                None => true,
            })
            .map(|c| ComponentSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                schema_name: c.schema_name.clone(),
            })
            .collect())
    }

    async fn update_component(
        &self,
        change_set: &ChangeSetId,
        component: &ComponentId,
        update: &ComponentUpdate,
    ) -> ApiResult<()> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::UpdateComponent)?;
        let workspace = state.workspace_mut(change_set)?;
        let view = workspace
            .components
            .get_mut(component)
            .ok_or_else(|| ApiError::not_found("PUT", format!("/components/{component}")))?;
        apply_component_update(view, update)?;
        state
            .component_updates
            .push((component.clone(), update.clone()));
        Ok(())
    }

    async fn delete_component(
        &self,
        change_set: &ChangeSetId,
        component: &ComponentId,
    ) -> ApiResult<()> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::DeleteComponent)?;
        let workspace = state.workspace_mut(change_set)?;
        workspace
            .components
            .remove(component)
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found("DELETE", format!("/components/{component}")))
    }

    async fn upgrade_component(
        &self,
        change_set: &ChangeSetId,
        component: &ComponentId,
    ) -> ApiResult<()> {
        let mut state = self.state.lock();
        self.record(&mut state, Operation::UpgradeComponent)?;
        let workspace = state.workspace_mut(change_set)?;
        if !workspace.components.contains_key(component) {
            return Err(ApiError::not_found(
                "POST",
                format!("/components/{component}/upgrade"),
            ));
        }
        Ok(())
    }
}
