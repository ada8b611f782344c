//! Engine backed by an OpenSearch cluster.

use super::SearchEngine;
use crate::{
    bulk::{index_lines, BulkResponse},
    config::SearchConfig,
    error::{Result, SearchError},
};
use async_trait::async_trait;
use catalog_log::{debug, info};
use opensearch::{
    auth::Credentials,
    http::{
        request::JsonBody,
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
        StatusCode, Url,
    },
    indices::{
        IndicesCreateParts, IndicesExistsParts, IndicesPutMappingParts, IndicesRefreshParts,
    },
    params::Refresh,
    BulkParts, CountParts, GetParts, IndexParts, OpenSearch, SearchParts,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// [`SearchEngine`] talking to OpenSearch over HTTP.
#[derive(Clone)]
pub struct OpenSearchEngine {
    client: Arc<OpenSearch>,
    urls: Vec<String>,
}

impl OpenSearchEngine {
    /// Build a client for the first node in `config`.
    pub fn new(config: &SearchConfig) -> Result<Self> {
        config.validate()?;
        info!("Initializing OpenSearch engine for: {:?}", config.urls);

        let url = config
            .urls
            .first()
            .ok_or_else(|| SearchError::Validation("No URLs provided".to_string()))?;
        if config.urls.len() > 1 {
            debug!("Using {} of {} configured nodes", url, config.urls.len());
        }

        let url = Url::parse(url)
            .map_err(|e| SearchError::Validation(format!("Invalid URL: {}", e)))?;

        let mut builder = TransportBuilder::new(SingleNodeConnectionPool::new(url))
            .timeout(config.request_timeout)
            .disable_proxy();

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.auth(Credentials::Basic(user.clone(), pass.clone()));
        }

        let transport = builder
            .build()
            .map_err(|e| SearchError::EngineUnavailable(e.to_string()))?;

        Ok(Self {
            client: Arc::new(OpenSearch::new(transport)),
            urls: config.urls.clone(),
        })
    }

    /// The underlying client.
    pub fn inner(&self) -> &OpenSearch {
        &self.client
    }
}

impl std::fmt::Debug for OpenSearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSearchEngine")
            .field("urls", &self.urls)
            .finish()
    }
}

fn refresh_param(refresh: bool) -> Refresh {
    if refresh { Refresh::True } else { Refresh::False }
}

fn error_type(body: &Value) -> &str {
    body["error"]["type"].as_str().unwrap_or("")
}

fn error_reason(body: &Value) -> String {
    body["error"]["reason"]
        .as_str()
        .or_else(|| body["error"].as_str())
        .unwrap_or("Unknown error")
        .to_string()
}

// The window check fails every shard, so the message sits in the root causes
// rather than the top-level reason.
fn result_window_error(body: &Value) -> Option<String> {
    let causes = body["error"]["root_cause"].as_array()?;
    causes
        .iter()
        .filter_map(|cause| cause["reason"].as_str())
        .find(|reason| reason.starts_with("Result window is too large"))
        .map(String::from)
}

/// Turn a non-2xx response into an error; pass successful bodies through.
async fn json_body(index: &str, response: Response) -> Result<Value> {
    let status = response.status_code();
    let body: Value = response.json().await?;

    if status.is_success() {
        return Ok(body);
    }
    if status == StatusCode::NOT_FOUND && error_type(&body) == "index_not_found_exception" {
        return Err(SearchError::IndexNotFound(index.to_string()));
    }
    if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(SearchError::EngineUnavailable(error_reason(&body)));
    }
    if status == StatusCode::BAD_REQUEST {
        if let Some(reason) = result_window_error(&body) {
            return Err(SearchError::ResultWindowTooLarge(reason));
        }
    }
    Err(SearchError::Internal(error_reason(&body)))
}

#[async_trait]
impl SearchEngine for OpenSearchEngine {
    async fn create_index(&self, index: &str, settings: &Value) -> Result<()> {
        debug!("Creating index: {}", index);

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(settings)
            .send()
            .await?;

        if response.status_code() == StatusCode::BAD_REQUEST {
            let body: Value = response.json().await?;
            if error_type(&body) == "resource_already_exists_exception" {
                return Err(SearchError::AlreadyExists(index.to_string()));
            }
            return Err(SearchError::Internal(error_reason(&body)));
        }

        json_body(index, response).await.map(|_| ())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await?;

        Ok(response.status_code().is_success())
    }

    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<()> {
        debug!("Updating mapping for index: {}", index);

        let response = self
            .client
            .indices()
            .put_mapping(IndicesPutMappingParts::Index(&[index]))
            .body(mapping)
            .send()
            .await?;

        json_body(index, response).await.map(|_| ())
    }

    async fn index_document(&self, index: &str, id: &str, doc: &Value, refresh: bool) -> Result<()> {
        let response = self
            .client
            .index(IndexParts::IndexId(index, id))
            .refresh(refresh_param(refresh))
            .body(doc)
            .send()
            .await?;

        json_body(index, response).await.map(|_| ())
    }

    async fn bulk_index(
        &self,
        index: &str,
        docs: &[(String, Value)],
        refresh: bool,
    ) -> Result<BulkResponse> {
        let body: Vec<JsonBody<Value>> = index_lines(index, docs)
            .into_iter()
            .map(JsonBody::from)
            .collect();

        let response = self
            .client
            .bulk(BulkParts::None)
            .refresh(refresh_param(refresh))
            .body(body)
            .send()
            .await?;

        let body = json_body(index, response).await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>> {
        let response = self
            .client
            .get(GetParts::IndexId(index, id))
            .send()
            .await?;

        let status = response.status_code();
        let body: Value = response.json().await?;

        if status == StatusCode::NOT_FOUND {
            if error_type(&body) == "index_not_found_exception" {
                return Err(SearchError::IndexNotFound(index.to_string()));
            }
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SearchError::Internal(error_reason(&body)));
        }
        if !body["found"].as_bool().unwrap_or(false) {
            return Ok(None);
        }

        body.get("_source")
            .cloned()
            .map(Some)
            .ok_or_else(|| SearchError::Decode("No _source in response".to_string()))
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(body)
            .send()
            .await?;

        json_body(index, response).await
    }

    async fn count(&self, index: &str, query: &Value) -> Result<u64> {
        let response = self
            .client
            .count(CountParts::Index(&[index]))
            .body(json!({ "query": query }))
            .send()
            .await?;

        let body = json_body(index, response).await?;
        body["count"]
            .as_u64()
            .ok_or_else(|| SearchError::Decode("count response has no 'count'".to_string()))
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        debug!("Refreshing index {}", index);

        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await?;

        json_body(index, response).await.map(|_| ())
    }
}
