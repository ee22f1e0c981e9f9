//! Vector store client.
//!
//! Wraps a schema-on-write document/vector database (Weaviate-style REST
//! + GraphQL API). The store owns ANN search; this client owns schema
//! bootstrap, mapped writes with a bounded retry, filtered semantic
//! search, and a stats probe that never fails.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::config::VectorSettings;
use crate::telemetry;
use crate::types::{CallRecord, SearchFilters, StoreHit};
use crate::{CallsiftError, Result};

const BACKEND_NAME: &str = "vector-store";

/// Collection holding call transcriptions.
const COLLECTION: &str = "CallTranscription";

/// Transient write failures are retried this many times in total.
const INSERT_ATTEMPTS: usize = 3;

/// Fixed pause between insert attempts.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Aggregate result of a batch insert. Per-item failures never abort
/// the batch.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchInsertReport {
    pub total: usize,
    pub successful: usize,
    pub errors: usize,
}

/// Connectivity/stats descriptor. `connected: false` rather than an
/// error when the store is unreachable.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub connected: bool,
    pub total_objects: u64,
    pub collections: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Client for the vector database.
pub struct VectorStoreClient {
    base_url: String,
    http: Client,
}

impl VectorStoreClient {
    /// Create a client from the vector settings.
    pub fn new(settings: &VectorSettings) -> Self {
        Self::with_base_url(settings.base_url.clone(), settings.timeout())
    }

    /// Create a client with an explicit base URL (for wiremock tests).
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        let client = Self {
            base_url: base_url.into(),
            http,
        };
        info!(base_url = %client.base_url, "vector store client initialized");
        client
    }

    /// Check whether the store answers its meta endpoint.
    pub async fn health_check(&self) -> bool {
        match self
            .http
            .get(format!("{}/v1/meta", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(error = %e, "vector store health check failed");
                false
            }
        }
    }

    /// Create the transcription collection if it does not exist yet.
    /// Idempotent: an already-present collection is success, not an error.
    pub async fn ensure_schema(&self) -> Result<()> {
        let check = self
            .http
            .get(format!("{}/v1/schema/{COLLECTION}", self.base_url))
            .send()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;
        if check.status().is_success() {
            debug!("collection schema already present");
            return Ok(());
        }

        let response = self
            .http
            .post(format!("{}/v1/schema", self.base_url))
            .json(&collection_schema())
            .send()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;
        if response.status().is_success() {
            info!("collection schema created");
            Ok(())
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(CallsiftError::BackendError {
                backend: BACKEND_NAME.to_string(),
                status,
                message,
            })
        }
    }

    /// Insert one call record.
    ///
    /// Transient failures (connection errors, 5xx) are retried up to
    /// [`INSERT_ATTEMPTS`] times with a fixed backoff; permanent (4xx)
    /// failures surface immediately.
    #[instrument(skip(self, record), fields(operation = "insert", call_id = %record.call_id))]
    pub async fn insert(&self, record: &CallRecord) -> Result<()> {
        self.ensure_schema().await?;
        let object = store_object(record);

        let mut last_err = None;
        for attempt in 0..INSERT_ATTEMPTS {
            if attempt > 0 {
                metrics::counter!(telemetry::STORE_RETRIES_TOTAL).increment(1);
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            match self.try_insert(&object).await {
                Ok(()) => {
                    debug!(attempt = attempt + 1, "record stored");
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = INSERT_ATTEMPTS,
                        error = %e,
                        "transient vector store failure"
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.expect("at least one attempt was made"))
    }

    /// Insert many records in one batch call. Reports per-item counts;
    /// a failed item never fails the batch.
    #[instrument(skip(self, records), fields(operation = "batch_insert", batch_size = records.len()))]
    pub async fn batch_insert(&self, records: &[CallRecord]) -> Result<BatchInsertReport> {
        self.ensure_schema().await?;
        let objects: Vec<Value> = records.iter().map(store_object).collect();

        let response = self
            .http
            .post(format!("{}/v1/batch/objects", self.base_url))
            .json(&json!({ "objects": objects }))
            .send()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CallsiftError::BackendError {
                backend: BACKEND_NAME.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let results: Vec<Value> = response
            .json()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;
        let successful = results
            .iter()
            .filter(|obj| obj["result"]["status"] == "SUCCESS")
            .count();

        info!(successful, total = records.len(), "batch insert complete");
        Ok(BatchInsertReport {
            total: records.len(),
            successful,
            errors: records.len() - successful,
        })
    }

    /// Nearest-by-meaning search with optional conjunctive filters.
    /// Customer scoping is optional: without it the search spans all
    /// tenants.
    #[instrument(skip(self, query, filters), fields(operation = "semantic_search"))]
    pub async fn semantic_search(
        &self,
        query: &str,
        customer_id: Option<&str>,
        limit: usize,
        certainty: f64,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<StoreHit>> {
        let graphql = search_query(query, customer_id, limit, certainty, filters);

        let response = self
            .http
            .post(format!("{}/v1/graphql", self.base_url))
            .json(&json!({ "query": graphql }))
            .send()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CallsiftError::BackendError {
                backend: BACKEND_NAME.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;
        if let Some(errors) = body.get("errors") {
            return Err(CallsiftError::BackendError {
                backend: BACKEND_NAME.to_string(),
                status: status.as_u16(),
                message: format!("GraphQL errors: {errors}"),
            });
        }

        let hits = body["data"]["Get"][COLLECTION]
            .as_array()
            .cloned()
            .unwrap_or_default();
        Ok(hits.into_iter().filter_map(parse_hit).collect())
    }

    /// Fetch a record by call id, optionally scoped to a tenant.
    pub async fn get_by_call_id(
        &self,
        call_id: &str,
        customer_id: Option<&str>,
    ) -> Result<Option<CallRecord>> {
        let mut operands = vec![format!(
            "{{path: [\"callId\"], operator: Equal, valueString: {}}}",
            graphql_string(call_id)
        )];
        if let Some(customer) = customer_id {
            operands.push(format!(
                "{{path: [\"customerId\"], operator: Equal, valueString: {}}}",
                graphql_string(customer)
            ));
        }
        let graphql = format!(
            "{{ Get {{ {COLLECTION}({} limit: 1) {{ {RECORD_FIELDS} }} }} }}",
            where_clause(&operands)
        );

        let response = self
            .http
            .post(format!("{}/v1/graphql", self.base_url))
            .json(&json!({ "query": graphql }))
            .send()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;

        let record = body["data"]["Get"][COLLECTION]
            .as_array()
            .and_then(|hits| hits.first().cloned())
            .and_then(|value| serde_json::from_value(value).ok());
        Ok(record)
    }

    /// Connectivity and object counts. Never errors: an unreachable
    /// store reports `connected: false`.
    pub async fn get_stats(&self) -> StoreStats {
        let objects = async {
            let response = self
                .http
                .get(format!("{}/v1/objects?limit=0", self.base_url))
                .send()
                .await?;
            response.json::<Value>().await
        };
        let schema = async {
            let response = self
                .http
                .get(format!("{}/v1/schema", self.base_url))
                .send()
                .await?;
            response.json::<Value>().await
        };

        match tokio::join!(objects, schema) {
            (Ok(objects), Ok(schema)) => StoreStats {
                connected: true,
                total_objects: objects["totalResults"].as_u64().unwrap_or(0),
                collections: schema["classes"]
                    .as_array()
                    .map(|classes| {
                        classes
                            .iter()
                            .filter_map(|c| c["class"].as_str().map(str::to_owned))
                            .collect()
                    })
                    .unwrap_or_default(),
                error: None,
            },
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "vector store stats unavailable");
                StoreStats {
                    connected: false,
                    total_objects: 0,
                    collections: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn try_insert(&self, object: &Value) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/v1/objects", self.base_url))
            .json(object)
            .send()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(CallsiftError::BackendError {
                backend: BACKEND_NAME.to_string(),
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Fields requested for every record hit.
const RECORD_FIELDS: &str = "callId customerId subscriberId transcriptionText language callDate \
                             durationSeconds agentId callType sentiment productsMentioned keyPoints";

/// The `CallTranscription` collection schema posted to `/v1/schema`.
/// Mirrors the store's schema-on-write contract: a transformer
/// vectorizer over the transcription text and key points, with the
/// scalar/identifier properties skipped from vectorization.
fn collection_schema() -> Value {
    let skip = json!({ "text2vec-transformers": { "skip": true } });
    json!({
        "class": COLLECTION,
        "description": "Call transcription with embeddings for semantic search",
        "vectorizer": "text2vec-transformers",
        "moduleConfig": {
            "text2vec-transformers": {
                "poolingStrategy": "masked_mean",
                "vectorizeClassName": false
            }
        },
        "properties": [
            {
                "name": "callId",
                "dataType": ["string"],
                "description": "Unique call identifier",
                "moduleConfig": skip
            },
            {
                "name": "customerId",
                "dataType": ["string"],
                "description": "Customer identifier for isolation",
                "moduleConfig": skip
            },
            {
                "name": "subscriberId",
                "dataType": ["string"],
                "description": "Subscriber identifier",
                "moduleConfig": skip
            },
            {
                "name": "transcriptionText",
                "dataType": ["text"],
                "description": "Call transcription content",
                "moduleConfig": {
                    "text2vec-transformers": { "vectorizePropertyName": false }
                }
            },
            {
                "name": "language",
                "dataType": ["string"],
                "description": "Transcription language",
                "moduleConfig": skip
            },
            {
                "name": "callDate",
                "dataType": ["date"],
                "description": "Call timestamp",
                "moduleConfig": skip
            },
            {
                "name": "durationSeconds",
                "dataType": ["int"],
                "description": "Call duration in seconds",
                "moduleConfig": skip
            },
            {
                "name": "agentId",
                "dataType": ["string"],
                "description": "Agent identifier",
                "moduleConfig": skip
            },
            {
                "name": "callType",
                "dataType": ["string"],
                "description": "Type of call",
                "moduleConfig": skip
            },
            {
                "name": "sentiment",
                "dataType": ["string"],
                "description": "Call sentiment analysis",
                "moduleConfig": skip
            },
            {
                "name": "productsMentioned",
                "dataType": ["string[]"],
                "description": "Products mentioned in call",
                "moduleConfig": skip
            },
            {
                "name": "keyPoints",
                "dataType": ["string[]"],
                "description": "Key points from call summary",
                "moduleConfig": {
                    "text2vec-transformers": { "vectorizePropertyName": false }
                }
            }
        ]
    })
}

/// Map a call record onto the store's object model. The record's own
/// camelCase serialization is the property map.
fn store_object(record: &CallRecord) -> Value {
    json!({
        "class": COLLECTION,
        "properties": serde_json::to_value(record).expect("record serialization is infallible"),
    })
}

fn parse_hit(mut value: Value) -> Option<StoreHit> {
    let additional = value
        .as_object_mut()
        .and_then(|obj| obj.remove("_additional"))
        .unwrap_or(Value::Null);
    let record: CallRecord = serde_json::from_value(value).ok()?;
    Some(StoreHit {
        record,
        certainty: additional["certainty"].as_f64().unwrap_or(0.0),
        distance: additional["distance"].as_f64().unwrap_or(1.0),
    })
}

/// Build the GraphQL search query: conjunctive `where` filters plus a
/// `nearText` clause.
fn search_query(
    query: &str,
    customer_id: Option<&str>,
    limit: usize,
    certainty: f64,
    filters: Option<&SearchFilters>,
) -> String {
    let mut operands = Vec::new();
    if let Some(customer) = customer_id {
        operands.push(format!(
            "{{path: [\"customerId\"], operator: Equal, valueString: {}}}",
            graphql_string(customer)
        ));
    }
    if let Some(filters) = filters {
        if let Some(language) = &filters.language {
            operands.push(format!(
                "{{path: [\"language\"], operator: Equal, valueString: {}}}",
                graphql_string(language)
            ));
        }
        if let Some(call_type) = &filters.call_type {
            operands.push(format!(
                "{{path: [\"callType\"], operator: Equal, valueString: {}}}",
                graphql_string(call_type)
            ));
        }
        if let Some(from) = &filters.date_from {
            operands.push(format!(
                "{{path: [\"callDate\"], operator: GreaterThanEqual, valueDate: {}}}",
                graphql_string(from)
            ));
        }
        if let Some(to) = &filters.date_to {
            operands.push(format!(
                "{{path: [\"callDate\"], operator: LessThanEqual, valueDate: {}}}",
                graphql_string(to)
            ));
        }
    }

    format!(
        "{{ Get {{ {COLLECTION}({} nearText: {{concepts: [{}], certainty: {certainty}}} limit: {limit}) \
         {{ {RECORD_FIELDS} _additional {{ certainty distance }} }} }} }}",
        where_clause(&operands),
        graphql_string(query),
    )
}

/// Render the conjunctive `where:` prefix, empty when unfiltered.
fn where_clause(operands: &[String]) -> String {
    match operands.len() {
        0 => String::new(),
        1 => format!("where: {}", operands[0]),
        _ => format!(
            "where: {{operator: And, operands: [{}]}}",
            operands.join(", ")
        ),
    }
}

/// Quote a string for inline GraphQL (JSON string escaping rules).
fn graphql_string(s: &str) -> String {
    serde_json::to_string(s).expect("string serialization is infallible")
}
