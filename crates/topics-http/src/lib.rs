//! `reqwest` implementation of [`TopicsApi`] against a JSON REST collection.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, Method, RequestBuilder, Response, StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::{Serialize, de::DeserializeOwned};
use topics_core::{
    RetryPolicy, Topic, TopicInput, TopicsApi, TopicsError, TopicsErrorCategory,
};
use tracing::{debug, warn};
use url::Url;

const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";
const DEFAULT_COLLECTION: &str = "posts";
const DEFAULT_LIMIT_PARAM: &str = "_limit";
const DEFAULT_LIST_LIMIT: u16 = 20;
const DEFAULT_OWNER_ID: u64 = 1;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTopicsConfig {
    /// Service root, for example `https://jsonplaceholder.typicode.com`.
    pub base_url: String,
    /// Collection path segment under the base URL.
    pub collection: String,
    /// Bearer token; requests are unauthenticated when absent.
    pub auth_token: Option<String>,
    /// Upper bound for a single request, connection included.
    pub request_timeout: Duration,
    /// Page size requested by `list`.
    pub list_limit: u16,
    /// Query parameter carrying the page size.
    pub limit_param: String,
    /// Owner reference attached to created and updated topics.
    pub owner_id: u64,
    pub retry: RetryPolicy,
}

impl HttpTopicsConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for HttpTopicsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            collection: DEFAULT_COLLECTION.to_owned(),
            auth_token: None,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            list_limit: DEFAULT_LIST_LIMIT,
            limit_param: DEFAULT_LIMIT_PARAM.to_owned(),
            owner_id: DEFAULT_OWNER_ID,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TopicPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    title: &'a str,
    body: &'a str,
    user_id: u64,
}

/// Remote topics collection reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTopicsClient {
    http: Client,
    collection_url: Url,
    list_limit: u16,
    limit_param: String,
    owner_id: u64,
    retry: RetryPolicy,
}

impl HttpTopicsClient {
    pub fn new(config: HttpTopicsConfig) -> Result<Self, TopicsError> {
        let collection_url = collection_url(&config.base_url, &config.collection)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = config.auth_token.as_deref() {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                TopicsError::new(
                    TopicsErrorCategory::Config,
                    "invalid_auth_token",
                    "auth token contains characters not allowed in a header",
                )
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| {
                TopicsError::new(
                    TopicsErrorCategory::Config,
                    "http_client_build_failed",
                    err.to_string(),
                )
            })?;

        Ok(Self {
            http,
            collection_url,
            list_limit: config.list_limit.max(1),
            limit_param: config.limit_param,
            owner_id: config.owner_id,
            retry: config.retry,
        })
    }

    pub fn collection_url(&self) -> &Url {
        &self.collection_url
    }

    fn item_url(&self, id: u64) -> Url {
        let mut url = self.collection_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&id.to_string());
        }
        url
    }

    fn payload<'a>(&self, id: Option<u64>, input: &'a TopicInput) -> TopicPayload<'a> {
        TopicPayload {
            id,
            title: &input.title,
            body: &input.body,
            user_id: self.owner_id,
        }
    }

    /// Send a freshly built request per attempt under the retry policy.
    async fn execute<T, B>(&self, build: B) -> Result<T, TopicsError>
    where
        T: DeserializeOwned,
        B: Fn() -> RequestBuilder,
    {
        self.retry
            .run(|| send_json(build()), TopicsError::is_transient)
            .await
    }

    async fn execute_empty<B>(&self, build: B) -> Result<(), TopicsError>
    where
        B: Fn() -> RequestBuilder,
    {
        self.retry
            .run(|| send_empty(build()), TopicsError::is_transient)
            .await
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, path = url.path(), "topics request");
        self.http.request(method, url)
    }
}

#[async_trait]
impl TopicsApi for HttpTopicsClient {
    async fn list(&self) -> Result<Vec<Topic>, TopicsError> {
        let limit = self.list_limit.to_string();
        self.execute(|| {
            self.request(Method::GET, self.collection_url.clone())
                .query(&[(self.limit_param.as_str(), limit.as_str())])
        })
        .await
        .inspect_err(|err| warn!(error = %err, "listing topics failed"))
    }

    async fn get(&self, id: u64) -> Result<Topic, TopicsError> {
        self.execute(|| self.request(Method::GET, self.item_url(id)))
            .await
            .inspect_err(|err| warn!(topic_id = id, error = %err, "fetching topic failed"))
    }

    async fn create(&self, input: &TopicInput) -> Result<Topic, TopicsError> {
        let payload = self.payload(None, input);
        self.execute(|| {
            self.request(Method::POST, self.collection_url.clone())
                .json(&payload)
        })
        .await
        .inspect_err(|err| warn!(error = %err, "creating topic failed"))
    }

    async fn update(&self, id: u64, input: &TopicInput) -> Result<Topic, TopicsError> {
        let payload = self.payload(Some(id), input);
        self.execute(|| self.request(Method::PUT, self.item_url(id)).json(&payload))
            .await
            .inspect_err(|err| warn!(topic_id = id, error = %err, "updating topic failed"))
    }

    async fn remove(&self, id: u64) -> Result<(), TopicsError> {
        self.execute_empty(|| self.request(Method::DELETE, self.item_url(id)))
            .await
            .inspect_err(|err| warn!(topic_id = id, error = %err, "deleting topic failed"))
    }
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, TopicsError> {
    let response = checked(request).await?;
    response.json::<T>().await.map_err(map_reqwest_error)
}

async fn send_empty(request: RequestBuilder) -> Result<(), TopicsError> {
    checked(request).await.map(|_| ())
}

async fn checked(request: RequestBuilder) -> Result<Response, TopicsError> {
    let response = request.send().await.map_err(map_reqwest_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(map_status_error(status, &body))
}

fn collection_url(base_url: &str, collection: &str) -> Result<Url, TopicsError> {
    let invalid = |reason: String| {
        TopicsError::new(
            TopicsErrorCategory::Config,
            "invalid_base_url",
            format!("invalid base url '{base_url}': {reason}"),
        )
    };

    let mut url = Url::parse(base_url.trim()).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https".to_owned()));
    }
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| invalid("url cannot be a base".to_owned()))?;
        segments.pop_if_empty();
        for part in collection.split('/').filter(|part| !part.is_empty()) {
            segments.push(part);
        }
    }
    Ok(url)
}

fn map_status_error(status: StatusCode, body: &str) -> TopicsError {
    let snippet: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    let message = if snippet.is_empty() {
        format!("server responded with {status}")
    } else {
        format!("server responded with {status}: {snippet}")
    };
    TopicsError::from_status(status.as_u16(), message)
}

fn map_reqwest_error(err: reqwest::Error) -> TopicsError {
    if err.is_timeout() {
        return TopicsError::new(TopicsErrorCategory::Network, "timeout", err.to_string());
    }
    if err.is_decode() {
        return TopicsError::new(
            TopicsErrorCategory::Serialization,
            "decode_failed",
            err.to_string(),
        );
    }
    if let Some(status) = err.status() {
        return map_status_error(status, "");
    }
    if err.is_builder() {
        return TopicsError::new(
            TopicsErrorCategory::Internal,
            "request_build_failed",
            err.to_string(),
        );
    }
    TopicsError::new(
        TopicsErrorCategory::Network,
        "network_unreachable",
        err.to_string(),
    )
}
