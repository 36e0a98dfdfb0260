//! Cursor-based pagination over a GraphQL endpoint.
//!
//! Requests carry `{"first": 100, "after": <cursor|null>}`. Each response
//! contributes the record list found at a caller-supplied path; the
//! `pageInfo` block (`hasNextPage`, `endCursor`) decides whether to continue.
//! Pages are fetched one at a time and any transport failure aborts the
//! whole fetch without returning what was collected so far.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::contract::QueryTransport;
use crate::error::{FetchError, TransportError};

/// Records requested per round trip.
pub const PAGE_SIZE: u32 = 100;

/// Key of the pagination block when its path is inferred.
pub const PAGE_INFO_KEY: &str = "pageInfo";

/// Accumulator for one paginated fetch.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PaginationState {
    pub cursor: Option<String>,
    pub accumulated: Vec<Value>,
    pub exhausted: bool,
}

impl PaginationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables for the next request.
    pub fn variables(&self) -> Value {
        json!({ "first": PAGE_SIZE, "after": self.cursor })
    }

    /// Append one page of records and advance according to `page_info`.
    pub fn absorb(&mut self, records: Vec<Value>, page_info: &Value) {
        self.accumulated.extend(records);
        let has_next = page_info
            .get("hasNextPage")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if has_next {
            self.cursor = page_info
                .get("endCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if self.cursor.is_none() {
                warn!("hasNextPage without endCursor, next request restarts from the first page");
            }
        } else {
            self.exhausted = true;
        }
    }
}

/// Follow `path` through nested objects.
pub fn value_at<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, key| node.get(*key))
}

fn records_at(response: &Value, data_path: &[&str]) -> Result<Vec<Value>, FetchError> {
    let joined = data_path.join(".");
    match value_at(response, data_path) {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(FetchError::NotAList(joined)),
        None => Err(FetchError::MissingPath(joined)),
    }
}

fn page_info_at<'a>(
    response: &'a Value,
    data_path: &[&str],
    page_info_path: Option<&[&str]>,
) -> Result<&'a Value, FetchError> {
    match page_info_path {
        Some(path) => {
            value_at(response, path).ok_or_else(|| FetchError::MissingPath(path.join(".")))
        }
        None => {
            let parent = &data_path[..data_path.len().saturating_sub(1)];
            value_at(response, parent)
                .and_then(|node| node.get(PAGE_INFO_KEY))
                .ok_or(FetchError::PageInfoNotFound)
        }
    }
}

/// Fetch every page of `query` and return the concatenated records.
///
/// `data_path` locates the record list in each response. `page_info_path`
/// locates the pagination block; when `None` it is the sibling `pageInfo`
/// of the record list, and its absence is [`FetchError::PageInfoNotFound`].
pub async fn paged_query(
    transport: &dyn QueryTransport,
    query: &str,
    data_path: &[&str],
    page_info_path: Option<&[&str]>,
) -> Result<Vec<Value>, FetchError> {
    let mut state = PaginationState::new();

    while !state.exhausted {
        let response = transport.execute(query, state.variables()).await?;
        let records = records_at(&response, data_path)?;
        let page_info = page_info_at(&response, data_path, page_info_path)?;
        debug!(page_records = records.len(), cursor = ?state.cursor, "Page fetched");
        state.absorb(records, page_info);
    }

    info!(records = state.accumulated.len(), "Fetched all pages");
    Ok(state.accumulated)
}

/// Simplified form for the `{data_key: {edges: [{node}], pageInfo}}` shape.
///
/// `extra_variables` (an object) is sent with every request; the pagination
/// variables take precedence on key clashes.
pub async fn fetch_paginated(
    transport: &dyn QueryTransport,
    query: &str,
    data_key: &str,
    extra_variables: Option<&Map<String, Value>>,
) -> Result<Vec<Value>, FetchError> {
    let mut state = PaginationState::new();

    while !state.exhausted {
        let mut variables = extra_variables.cloned().unwrap_or_default();
        if let Value::Object(page_vars) = state.variables() {
            variables.extend(page_vars);
        }

        let response = transport.execute(query, Value::Object(variables)).await?;
        let page = response
            .get(data_key)
            .ok_or_else(|| FetchError::MissingPath(data_key.to_string()))?;
        let edges = page
            .get("edges")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::NotAList(format!("{data_key}.edges")))?;
        let nodes = edges
            .iter()
            .map(|edge| edge.get("node").cloned())
            .collect::<Option<Vec<Value>>>()
            .ok_or_else(|| FetchError::MissingPath(format!("{data_key}.edges[].node")))?;
        let page_info = page.get(PAGE_INFO_KEY).cloned().unwrap_or(Value::Null);
        state.absorb(nodes, &page_info);
    }

    info!(records = state.accumulated.len(), data_key, "Fetched all records");
    Ok(state.accumulated)
}

/// Log a transport failure against `resource`.
///
/// A 403 is expected while access is pending: it is logged as a warning
/// and turned into a message. Anything else is returned unchanged.
pub fn handle_transport_error(err: TransportError, resource: &str) -> Result<String, TransportError> {
    match &err {
        e if e.is_forbidden() => {
            warn!(resource, "{resource} access not yet enabled (403 Forbidden).");
            return Ok(format!("{resource} access not yet granted"));
        }
        TransportError::Server { status, .. } => {
            error!(resource, status, error = %err, "Server error while accessing {resource}")
        }
        TransportError::Query(_) => {
            error!(resource, error = %err, "GraphQL query error while accessing {resource}")
        }
        TransportError::Protocol(_) => {
            error!(resource, error = %err, "Transport protocol error during {resource} query")
        }
        TransportError::Request(_) => {
            error!(resource, error = %err, "Unexpected error during {resource} query")
        }
    }
    Err(err)
}

/// HTTP transport with bearer authentication.
pub struct GraphQLClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl GraphQLClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Pull `data` out of a GraphQL response body.
fn unwrap_data(body: Value) -> Result<Value, TransportError> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| e.to_string())
                })
                .collect();
            return Err(TransportError::Query(messages.join("; ")));
        }
    }
    match body {
        Value::Object(mut map) => map
            .remove("data")
            .filter(|d| !d.is_null())
            .ok_or_else(|| TransportError::Protocol("response has no data".to_string())),
        _ => Err(TransportError::Protocol(
            "response is not a JSON object".to_string(),
        )),
    }
}

#[async_trait]
impl QueryTransport for GraphQLClient {
    async fn execute(&self, query: &str, variables: Value) -> Result<Value, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await?;
        let body: Value =
            serde_json::from_str(&text).map_err(|e| TransportError::Protocol(e.to_string()))?;
        unwrap_data(body)
    }
}
