//! HTTP implementation of [`RemoteApi`]
//!
//! All routes live under `{base_url}/v1/w/{workspace_id}` and authenticate
//! with an opaque bearer token.

use crate::error::{optional, ApiError, ApiResult};
use crate::remote::RemoteApi;
use crate::types::{
    ChangeSetSummary, ComponentUpdate, ComponentView, CreateFunction, CreatedSchema,
    DefaultVariant, SchemaSummary, UpdateFunction,
};
use async_trait::async_trait;
use converge_model::{
    ChangeSetId, ComponentId, ComponentSummary, FuncId, FunctionBody, FunctionKind, SchemaFields,
    SchemaId, VariantId,
};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Connection settings for [`HttpClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub workspace_id: String,
    pub api_token: String,
    pub timeout: Duration,
}

/// Remote API client over HTTP
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    workspace_url: String,
    token: String,
}

impl HttpClient {
    /// Build a client
    ///
    /// # Errors
    /// Returns [`ApiError::Config`] if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("converge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        Ok(Self {
            client,
            workspace_url: workspace_url(&config.base_url, &config.workspace_id),
            token: config.api_token,
        })
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> ApiResult<reqwest::Response> {
        let url = format!("{}{}", self.workspace_url, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        tracing::debug!(%method, %path, "remote request");
        let response = request.send().await.map_err(|source| ApiError::Transport {
            method: method.to_string(),
            path: path.to_string(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(%method, %path, status = status.as_u16(), "remote request failed");
        Err(ApiError::status(status.as_u16(), method.as_str(), path, body))
    }

    async fn json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> ApiResult<T> {
        let response = self.execute(method.clone(), path, query, body).await?;
        let bytes = response.bytes().await.map_err(|source| ApiError::Transport {
            method: method.to_string(),
            path: path.to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode {
            method: method.to_string(),
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    async fn empty(&self, method: Method, path: &str, body: Option<Value>) -> ApiResult<()> {
        self.execute(method, path, &[], body).await.map(|_| ())
    }
}

fn workspace_url(base_url: &str, workspace_id: &str) -> String {
    format!("{}/v1/w/{}", base_url.trim_end_matches('/'), workspace_id)
}

fn encode<B: Serialize>(path: &str, body: &B) -> ApiResult<Value> {
    serde_json::to_value(body).map_err(|e| ApiError::Encode {
        path: path.to_string(),
        message: e.to_string(),
    })
}

fn cs_path(change_set: &ChangeSetId, rest: &str) -> String {
    format!("/change-sets/{change_set}{rest}")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeSetList {
    change_sets: Vec<ChangeSetSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedChangeSet {
    change_set: ChangeSetSummary,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnlockedVariant {
    unlocked_variant_id: VariantId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnlockedFunc {
    unlocked_func_id: FuncId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedFunc {
    func_id: FuncId,
}

#[derive(Deserialize)]
struct SearchResults {
    components: Vec<ComponentSummary>,
}

#[async_trait]
impl RemoteApi for HttpClient {
    async fn list_change_sets(&self) -> ApiResult<Vec<ChangeSetSummary>> {
        let list: ChangeSetList = self.json(Method::GET, "/change-sets", &[], None).await?;
        Ok(list.change_sets)
    }

    async fn create_change_set(&self, name: &str) -> ApiResult<ChangeSetId> {
        let created: CreatedChangeSet = self
            .json(
                Method::POST,
                "/change-sets",
                &[],
                Some(json!({ "changeSetName": name })),
            )
            .await?;
        Ok(created.change_set.id)
    }

    async fn abandon_change_set(&self, change_set: &ChangeSetId) -> ApiResult<()> {
        self.empty(Method::DELETE, &format!("/change-sets/{change_set}"), None)
            .await
    }

    async fn find_schema(
        &self,
        change_set: &ChangeSetId,
        name: &str,
    ) -> ApiResult<Option<SchemaSummary>> {
        let path = cs_path(change_set, "/schemas/find");
        optional(
            self.json(Method::GET, &path, &[("schema", name)], None)
                .await,
        )
    }

    async fn default_variant(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
    ) -> ApiResult<DefaultVariant> {
        let path = cs_path(change_set, &format!("/schemas/{schema}/variant/default"));
        self.json(Method::GET, &path, &[], None).await
    }

    async fn create_schema(
        &self,
        change_set: &ChangeSetId,
        fields: &SchemaFields,
    ) -> ApiResult<CreatedSchema> {
        let path = cs_path(change_set, "/schemas");
        let body = encode(&path, fields)?;
        self.json(Method::POST, &path, &[], Some(body)).await
    }

    async fn unlock_schema(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
    ) -> ApiResult<VariantId> {
        let path = cs_path(change_set, &format!("/schemas/{schema}/unlock"));
        let unlocked: UnlockedVariant = self.json(Method::POST, &path, &[], None).await?;
        Ok(unlocked.unlocked_variant_id)
    }

    async fn update_variant(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
        variant: &VariantId,
        fields: &SchemaFields,
    ) -> ApiResult<()> {
        let path = cs_path(change_set, &format!("/schemas/{schema}/variant/{variant}"));
        let body = encode(&path, fields)?;
        self.empty(Method::PUT, &path, Some(body)).await
    }

    async fn get_function(
        &self,
        change_set: &ChangeSetId,
        func: &FuncId,
    ) -> ApiResult<FunctionBody> {
        let path = cs_path(change_set, &format!("/funcs/{func}"));
        self.json(Method::GET, &path, &[], None).await
    }

    async fn create_function(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
        variant: &VariantId,
        function: &CreateFunction,
    ) -> ApiResult<FuncId> {
        let path = cs_path(
            change_set,
            &format!(
                "/schemas/{schema}/variant/{variant}/funcs/{}",
                function.kind.endpoint_segment()
            ),
        );
        let body = encode(&path, function)?;
        let created: CreatedFunc = self.json(Method::POST, &path, &[], Some(body)).await?;
        Ok(created.func_id)
    }

    async fn unlock_function(&self, change_set: &ChangeSetId, func: &FuncId) -> ApiResult<FuncId> {
        let path = cs_path(change_set, &format!("/funcs/{func}/unlock"));
        let unlocked: UnlockedFunc = self.json(Method::POST, &path, &[], None).await?;
        Ok(unlocked.unlocked_func_id)
    }

    async fn update_function(
        &self,
        change_set: &ChangeSetId,
        func: &FuncId,
        update: &UpdateFunction,
    ) -> ApiResult<()> {
        let path = cs_path(change_set, &format!("/funcs/{func}"));
        let body = encode(&path, update)?;
        self.empty(Method::PUT, &path, Some(body)).await
    }

    async fn unbind_function(
        &self,
        change_set: &ChangeSetId,
        schema: &SchemaId,
        variant: &VariantId,
        func: &FuncId,
        kind: FunctionKind,
    ) -> ApiResult<()> {
        let path = cs_path(
            change_set,
            &format!(
                "/schemas/{schema}/variant/{variant}/funcs/{}/{func}",
                kind.endpoint_segment()
            ),
        );
        self.empty(Method::DELETE, &path, None).await
    }

    async fn get_component(
        &self,
        change_set: &ChangeSetId,
        component: &ComponentId,
    ) -> ApiResult<Option<ComponentView>> {
        let path = cs_path(change_set, &format!("/components/{component}"));
        optional(self.json(Method::GET, &path, &[], None).await)
    }

    async fn search_components(
        &self,
        change_set: &ChangeSetId,
        query: &str,
        schema: Option<&str>,
    ) -> ApiResult<Vec<ComponentSummary>> {
        let path = cs_path(change_set, "/components/search");
        let mut body = json!({ "queryString": query });
        if let Some(schema) = schema {
            body["schemaName"] = json!(schema);
        }
        let results: SearchResults = self.json(Method::POST, &path, &[], Some(body)).await?;
        Ok(results.components)
    }

    async fn update_component(
        &self,
        change_set: &ChangeSetId,
        component: &ComponentId,
        update: &ComponentUpdate,
    ) -> ApiResult<()> {
        let path = cs_path(change_set, &format!("/components/{component}"));
        let body = encode(&path, update)?;
        self.empty(Method::PUT, &path, Some(body)).await
    }

    async fn delete_component(
        &self,
        change_set: &ChangeSetId,
        component: &ComponentId,
    ) -> ApiResult<()> {
        let path = cs_path(change_set, &format!("/components/{component}"));
        self.empty(Method::DELETE, &path, None).await
    }

    async fn upgrade_component(
        &self,
        change_set: &ChangeSetId,
        component: &ComponentId,
    ) -> ApiResult<()> {
        let path = cs_path(change_set, &format!("/components/{component}/upgrade"));
        self.empty(Method::POST, &path, None).await
    }
}
