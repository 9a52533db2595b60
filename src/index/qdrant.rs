//! Remote index backend (Qdrant REST API).
//!
//! Point representation on the wire is `{id, vector, payload}`; the scope
//! filter is pushed down as a server-side `must` match condition so
//! out-of-scope candidates never leave the index service.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use super::{FragmentPayload, ScopeFilter, SearchHit};
use crate::core::config::IndexConfig;
use crate::core::errors::RagError;

pub struct QdrantIndex {
    base_url: String,
    collection: String,
    client: Client,
}

impl QdrantIndex {
    /// Connect and idempotently ensure the collection exists
    /// (create-if-missing, fixed vector size, cosine distance).
    pub async fn connect(
        url: &str,
        collection: &str,
        config: &IndexConfig,
    ) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RagError::internal)?;

        let index = Self {
            base_url: url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            client,
        };
        index.ensure_collection(config.vector_size).await?;
        Ok(index)
    }

    async fn ensure_collection(&self, vector_size: usize) -> Result<(), RagError> {
        let url = format!("{}/collections/{}", self.base_url, self.collection);

        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RagError::IndexUnavailable(e.to_string()))?;
        if res.status().is_success() {
            return Ok(());
        }
        if res.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(RagError::IndexUnavailable(format!(
                "collection probe failed: {}",
                res.status()
            )));
        }

        let body = json!({
            "vectors": { "size": vector_size, "distance": "Cosine" }
        });
        let res = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::IndexUnavailable(e.to_string()))?;
        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::IndexUnavailable(format!(
                "collection create failed: {}",
                text
            )));
        }

        tracing::info!("Created index collection {}", self.collection);
        Ok(())
    }

    pub async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        payload: &FragmentPayload,
    ) -> Result<(), RagError> {
        let url = format!(
            "{}/collections/{}/points?wait=true",
            self.base_url, self.collection
        );
        let body = json!({
            "points": [{
                "id": id,
                "vector": vector,
                "payload": payload,
            }]
        });

        let res = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::internal)?;
        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Internal(format!("point upsert failed: {}", text)));
        }
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), RagError> {
        let url = format!(
            "{}/collections/{}/points/delete?wait=true",
            self.base_url, self.collection
        );
        let body = json!({ "points": [id] });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::internal)?;
        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Internal(format!("point delete failed: {}", text)));
        }
        Ok(())
    }

    pub async fn delete_by_filter(&self, filter: &ScopeFilter) -> Result<(), RagError> {
        let url = format!(
            "{}/collections/{}/points/delete?wait=true",
            self.base_url, self.collection
        );
        let body = json!({ "filter": build_filter(filter) });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::internal)?;
        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Internal(format!(
                "filtered delete failed: {}",
                text
            )));
        }
        Ok(())
    }

    pub async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: &ScopeFilter,
    ) -> Result<Vec<SearchHit>, RagError> {
        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        );
        let mut body = json!({
            "vector": query_vector,
            "limit": top_k,
            "with_payload": true,
        });
        if !filter.is_empty() {
            body["filter"] = build_filter(filter);
        }

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::internal)?;
        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Internal(format!("search failed: {}", text)));
        }

        let payload: Value = res.json().await.map_err(RagError::internal)?;
        let results = payload["result"].as_array().cloned().unwrap_or_default();

        let mut hits = Vec::with_capacity(results.len());
        for entry in results {
            let score = entry["score"].as_f64().unwrap_or(0.0) as f32;
            match serde_json::from_value::<FragmentPayload>(entry["payload"].clone()) {
                Ok(fragment) => hits.push(SearchHit {
                    payload: fragment,
                    score,
                }),
                Err(err) => {
                    tracing::warn!("Skipping point with malformed payload: {}", err);
                }
            }
        }
        Ok(hits)
    }

    pub async fn count(&self) -> Result<usize, RagError> {
        let url = format!(
            "{}/collections/{}/points/count",
            self.base_url, self.collection
        );
        let res = self
            .client
            .post(&url)
            .json(&json!({ "exact": true }))
            .send()
            .await
            .map_err(RagError::internal)?;
        if !res.status().is_success() {
            return Err(RagError::Internal(format!("count failed: {}", res.status())));
        }

        let payload: Value = res.json().await.map_err(RagError::internal)?;
        Ok(payload["result"]["count"].as_u64().unwrap_or(0) as usize)
    }
}

/// Render a scope filter as a Qdrant `must` conjunction.
fn build_filter(filter: &ScopeFilter) -> Value {
    let mut must = Vec::new();
    for (key, value) in [
        ("collection_id", &filter.collection_id),
        ("website_id", &filter.website_id),
        ("file_id", &filter.file_id),
    ] {
        if let Some(value) = value {
            must.push(json!({ "key": key, "match": { "value": value } }));
        }
    }
    json!({ "must": must })
}
