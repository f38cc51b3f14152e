//! PostgREST table client for atlas
//!
//! Builds `select`, `insert`, `update` and `delete` requests against
//! `<project>/rest/v1/<table>`. Row-level security is enforced by the server
//! based on the bearer token attached with [`PostgrestClient::with_auth`].

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Error body returned by PostgREST
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PostgrestApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for PostgrestApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Errors returned by the table client
#[derive(Error, Debug)]
pub enum PostgrestError {
    #[error("API error: {details} (Status: {status})")]
    ApiError {
        details: PostgrestApiErrorDetails,
        status: StatusCode,
    },

    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApiError { message: String, status: StatusCode },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl PostgrestError {
    /// The message a user should see, without status or code decorations.
    pub fn user_message(&self) -> String {
        match self {
            PostgrestError::ApiError { details, .. } => details
                .message
                .clone()
                .unwrap_or_else(|| details.to_string()),
            PostgrestError::UnparsedApiError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Request builder for one table
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    base_url: String,
    table: String,
    http_client: Client,
    headers: HeaderMap,
    query_params: Vec<(String, String)>,
}

impl PostgrestClient {
    pub fn new(base_url: &str, api_key: &str, table: &str, http_client: Client) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(api_key) {
            headers.insert("apikey", value);
        }
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            http_client,
            headers,
            query_params: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Add a request header
    pub fn with_header(mut self, key: &str, value: &str) -> Result<Self, PostgrestError> {
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header value: {}", value))
        })?;
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            PostgrestError::InvalidParameters(format!("Invalid header name: {}", key))
        })?;

        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Attach the caller's access token
    pub fn with_auth(self, token: &str) -> Result<Self, PostgrestError> {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    /// Columns to return
    pub fn select(self, columns: &str) -> Self {
        self.set_param("select", columns.to_string())
    }

    /// `column = value`
    pub fn eq(self, column: &str, value: &str) -> Self {
        self.set_param(column, format!("eq.{}", value))
    }

    /// Sort the result
    pub fn order(self, column: &str, order: SortOrder) -> Self {
        let order_str = match order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        self.set_param("order", format!("{}.{}", column, order_str))
    }

    /// Maximum number of rows
    pub fn limit(self, count: u32) -> Self {
        self.set_param("limit", count.to_string())
    }

    /// Fetch matching rows
    pub async fn execute<T: for<'de> Deserialize<'de>>(&self) -> Result<Vec<T>, PostgrestError> {
        let response = self
            .http_client
            .get(self.build_url()?)
            .headers(self.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    /// Insert rows, returning the stored representation
    pub async fn insert<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        self.write(Method::POST, Some(serde_json::to_value(values)?))
            .await
    }

    /// Patch the rows matched by the filters
    pub async fn update<T: Serialize>(&self, values: T) -> Result<Value, PostgrestError> {
        self.write(Method::PATCH, Some(serde_json::to_value(values)?))
            .await
    }

    /// Delete the rows matched by the filters
    pub async fn delete(&self) -> Result<Value, PostgrestError> {
        self.write(Method::DELETE, None).await
    }

    async fn write(&self, method: Method, body: Option<Value>) -> Result<Value, PostgrestError> {
        let mut headers = self.headers.clone();
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("return=representation"),
        );

        let mut request = self
            .http_client
            .request(method, self.build_url()?)
            .headers(headers);
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let body_text = response.text().await.map_err(|e| {
            PostgrestError::DeserializationError(format!("Failed to read response body: {}", e))
        })?;

        // 204 No Content and friends
        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str::<Value>(&body_text)
            .map_err(|e| PostgrestError::DeserializationError(e.to_string()))
    }

    fn set_param(mut self, key: &str, value: String) -> Self {
        self.query_params.retain(|(existing, _)| existing != key);
        self.query_params.push((key.to_string(), value));
        self
    }

    fn build_url(&self) -> Result<Url, PostgrestError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, self.table))?;

        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

async fn error_from_response(response: reqwest::Response) -> PostgrestError {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());

    match serde_json::from_str::<PostgrestApiErrorDetails>(&error_text) {
        Ok(details) => {
            log::debug!("postgrest error {}: {}", status, details);
            PostgrestError::ApiError { details, status }
        }
        Err(_) => PostgrestError::UnparsedApiError {
            message: error_text,
            status,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(uri: &str) -> PostgrestClient {
        PostgrestClient::new(uri, "fake-key", "items", reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_select_with_order() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/items"))
            .and(query_param("select", "*"))
            .and(query_param("order", "created_at.desc"))
            .and(header("apikey", "fake-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "b", "title": "Newer" },
                { "id": "a", "title": "Older" }
            ])))
            .mount(&mock_server)
            .await;

        let rows = client(&mock_server.uri())
            .select("*")
            .order("created_at", SortOrder::Descending)
            .execute::<Value>()
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["title"], "Newer");
    }

    #[tokio::test]
    async fn test_insert_asks_for_representation() {
        let mock_server = MockServer::start().await;
        let row = json!({ "title": "Buy milk", "description": null, "user_id": "u1" });

        Mock::given(method("POST"))
            .and(path("/rest/v1/items"))
            .and(header("prefer", "return=representation"))
            .and(body_json(&row))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                { "id": "i1", "title": "Buy milk", "is_complete": false }
            ])))
            .mount(&mock_server)
            .await;

        let inserted = client(&mock_server.uri()).insert(&row).await.unwrap();
        assert_eq!(inserted[0]["id"], "i1");
    }

    #[tokio::test]
    async fn test_update_filters_by_id() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/items"))
            .and(query_param("id", "eq.i1"))
            .and(body_json(json!({ "is_complete": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "i1", "is_complete": true }
            ])))
            .mount(&mock_server)
            .await;

        let updated = client(&mock_server.uri())
            .eq("id", "i1")
            .update(json!({ "is_complete": true }))
            .await
            .unwrap();
        assert_eq!(updated[0]["is_complete"], true);
    }

    #[tokio::test]
    async fn test_delete_with_empty_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/rest/v1/items"))
            .and(query_param("id", "eq.i1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let deleted = client(&mock_server.uri()).eq("id", "i1").delete().await.unwrap();
        assert_eq!(deleted, Value::Null);
    }

    #[tokio::test]
    async fn test_error_details_are_parsed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/items"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": "42501",
                "message": "permission denied for table items",
                "details": null,
                "hint": null
            })))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server.uri())
            .select("*")
            .execute::<Value>()
            .await
            .unwrap_err();

        match &err {
            PostgrestError::ApiError { details, status } => {
                assert_eq!(*status, StatusCode::UNAUTHORIZED);
                assert_eq!(details.code.as_deref(), Some("42501"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.user_message(), "permission denied for table items");
    }

    #[test]
    fn test_repeated_filter_replaces_previous() {
        let url = client("http://localhost:54321")
            .eq("id", "a")
            .eq("id", "b")
            .limit(5)
            .build_url()
            .unwrap();
        assert_eq!(url.query(), Some("id=eq.b&limit=5"));
    }
}
