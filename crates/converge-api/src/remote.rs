//! The remote API seam
//!
//! Everything the reconciler needs from the service, expressed against the
//! model types. [`crate::HttpClient`] talks to a live service; tests use an
//! in-memory implementation.

use crate::error::{ApiError, ApiResult};
use crate::types::{
    ChangeSetSummary, ComponentUpdate, ComponentView, CreateFunction, CreatedSchema,
    DefaultVariant, SchemaSummary, UpdateFunction,
};
use async_trait::async_trait;
use converge_model::{
    ChangeSetId, ComponentId, ComponentSummary, FuncId, FunctionBody, FunctionKind, SchemaFields,
    SchemaId, VariantId,
};

/// Operations offered by the remote service
///
/// Every read and write is scoped to a change set. Lookups with "not found"
/// semantics return `Ok(None)` only for a genuine 404.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    // Change sets

    /// List open change sets, including the HEAD marker
    async fn list_change_sets(&self) -> ApiResult<Vec<ChangeSetSummary>>;

    /// Open a new change set
    async fn create_change_set(&self, name: &str) -> ApiResult<ChangeSetId>;

    /// Discard a change set and everything staged in it
    async fn abandon_change_set(&self, change_set: &ChangeSetId) -> ApiResult<()>;

    /// Resolve the HEAD change set
    async fn head_change_set(&self) -> ApiResult<ChangeSetId> {
        self.list_change_sets()
            .await?
            .into_iter()
            .find(|cs| cs.is_head)
            .map(|cs| cs.id)
            .ok_or(ApiError::NoHeadChangeSet)
    }

    // Schemas

    /// Find a schema by name
    async fn find_schema(
        &self,
        change_set: &ChangeSetId,
        name: &str,
    ) -> ApiResult<Option<SchemaSummary>>;

    /// Default variant of a schema, with its bound functions
    async fn default_variant(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
    ) -> ApiResult<DefaultVariant>;

    /// Create a schema and its first variant
    async fn create_schema(
        &self,
        change_set: &ChangeSetId,
        fields: &SchemaFields,
    ) -> ApiResult<CreatedSchema>;

    /// Unlock a schema for editing; returns the editable variant
    async fn unlock_schema(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
    ) -> ApiResult<VariantId>;

    /// Replace the fields of an unlocked variant
    async fn update_variant(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
        variant: &VariantId,
        fields: &SchemaFields,
    ) -> ApiResult<()>;

    // Functions

    /// Full body of a function
    async fn get_function(
        &self,
        change_set: &ChangeSetId,
        func: &FuncId,
    ) -> ApiResult<FunctionBody>;

    /// Create a function and bind it to a variant
    async fn create_function(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
        variant: &VariantId,
        function: &CreateFunction,
    ) -> ApiResult<FuncId>;

    /// Unlock a function for editing; returns the editable function
    async fn unlock_function(&self, change_set: &ChangeSetId, func: &FuncId) -> ApiResult<FuncId>;

    /// Replace the editable fields of an unlocked function
    async fn update_function(
        &self,
        change_set: &ChangeSetId,
        func: &FuncId,
        update: &UpdateFunction,
    ) -> ApiResult<()>;

    /// Detach a function from a variant
    async fn unbind_function(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
        variant: &VariantId,
        func: &FuncId,
        kind: FunctionKind,
    ) -> ApiResult<()>;

    // Components

    /// Component by canonical id
    async fn get_component(
        &self,
        change_set: &ChangeSetId,
        component: &ComponentId,
    ) -> ApiResult<Option<ComponentView>>;

    /// Search components, optionally restricted to a schema
    async fn search_components(
        &self,
        change_set: &ChangeSetId,
        query: &str,
        schema: Option<&str>,
    ) -> ApiResult<Vec<ComponentSummary>>;

    /// Apply attribute changes and an optional rename
    async fn update_component(
        &self,
        change_set: &ChangeSetId,
        component: &ComponentId,
        update: &ComponentUpdate,
    ) -> ApiResult<()>;

    /// Delete a component
    async fn delete_component(
        &self,
        change_set: &ChangeSetId,
        component: &ComponentId,
    ) -> ApiResult<()>;

    /// Upgrade a component to its schema's latest variant
    async fn upgrade_component(
        &self,
        change_set: &ChangeSetId,
        component: &ComponentId,
    ) -> ApiResult<()>;
}
