//! Loki HTTP client and wire types.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};

use crate::config::LokiConfig;
use crate::domain::Labels;
use crate::error::HistorianError;

const PUSH_PATH: &str = "/loki/api/v1/push";
const QUERY_RANGE_PATH: &str = "/loki/api/v1/query_range";
const LABELS_PATH: &str = "/loki/api/v1/labels";
const TENANT_HEADER: &str = "X-Scope-OrgID";

/// Entries returned per query when the caller sets no limit.
pub const DEFAULT_PAGE_SIZE: usize = 1000;
/// Upper bound on entries returned per query.
pub const MAX_PAGE_SIZE: usize = 5000;

const MAX_ERROR_BODY: usize = 1024;

/// One log line: a timestamp and its payload.
///
/// On the wire a sample is a two element array of strings:
/// `["<unix nanos>", "<line>"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(String, String)", into = "(String, String)")]
pub struct Sample {
    /// Timestamp of the line.
    pub t: DateTime<Utc>,
    /// The line itself.
    pub v: String,
}

impl TryFrom<(String, String)> for Sample {
    type Error = String;

    fn try_from((ts, line): (String, String)) -> Result<Self, Self::Error> {
        let nanos = ts
            .parse::<i64>()
            .map_err(|err| format!("invalid sample timestamp {ts:?}: {err}"))?;
        Ok(Self {
            t: DateTime::from_timestamp_nanos(nanos),
            v: line,
        })
    }
}

impl From<Sample> for (String, String) {
    fn from(sample: Sample) -> Self {
        (unix_nanos(sample.t).to_string(), sample.v)
    }
}

/// A set of samples sharing one label set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    /// Stream labels.
    pub stream: Labels,
    /// Samples, ordered by time.
    pub values: Vec<Sample>,
}

/// Body of a push request.
#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    streams: &'a [Stream],
}

/// Response of a range query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRes {
    /// Result payload.
    pub data: QueryData,
}

/// Data section of a range query response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryData {
    /// Matching streams.
    #[serde(default)]
    pub result: Vec<Stream>,
}

/// Operations the history backend needs from Loki.
#[async_trait]
pub trait LokiClient: Send + Sync + fmt::Debug {
    /// Checks that the read path answers.
    ///
    /// # Errors
    ///
    /// Returns an error if Loki is unreachable or answers with a failure.
    async fn ping(&self) -> Result<(), HistorianError>;

    /// Pushes streams, returning the number of payload bytes sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the push fails.
    async fn push(&self, streams: &[Stream]) -> Result<usize, HistorianError>;

    /// Runs a LogQL range query between `from` and `to`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the response is malformed.
    async fn range_query(
        &self,
        logql: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<QueryRes, HistorianError>;

    /// Maximum accepted LogQL query size, in bytes.
    fn max_query_size(&self) -> usize;
}

/// [`LokiClient`] talking to Loki's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpLokiClient {
    client: Client,
    read_url: Url,
    write_url: Url,
    tenant_id: Option<String>,
    basic_auth: Option<(String, String)>,
    max_query_size: usize,
}

impl HttpLokiClient {
    /// Builds a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HistorianError::Config`] if a URL is invalid or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &LokiConfig) -> Result<Self, HistorianError> {
        let read_url = Url::parse(&config.read_url)
            .map_err(|err| HistorianError::Config(format!("invalid Loki read URL: {err}")))?;
        let write_url = Url::parse(&config.write_url)
            .map_err(|err| HistorianError::Config(format!("invalid Loki write URL: {err}")))?;
        let client = Client::builder()
            .timeout(config.client_timeout)
            .build()
            .map_err(|err| HistorianError::Config(format!("failed to build HTTP client: {err}")))?;
        let basic_auth = match (&config.basic_auth_user, &config.basic_auth_password) {
            (Some(user), password) => Some((user.clone(), password.clone().unwrap_or_default())),
            (None, _) => None,
        };

        Ok(Self {
            client,
            read_url,
            write_url,
            tenant_id: config.tenant_id.clone(),
            basic_auth,
            max_query_size: config.max_query_size,
        })
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        let request = match &self.basic_auth {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        };
        match &self.tenant_id {
            Some(tenant) => request.header(TENANT_HEADER, tenant),
            None => request,
        }
    }
}

#[async_trait]
impl LokiClient for HttpLokiClient {
    async fn ping(&self) -> Result<(), HistorianError> {
        let url = endpoint(&self.read_url, LABELS_PATH);
        let response = self.with_auth(self.client.get(url)).send().await?;
        check_status(response).await?;
        tracing::debug!(url = %self.read_url, "ping to Loki succeeded");
        Ok(())
    }

    async fn push(&self, streams: &[Stream]) -> Result<usize, HistorianError> {
        let body = serde_json::to_vec(&PushRequest { streams })?;
        let bytes = body.len();
        let url = endpoint(&self.write_url, PUSH_PATH);
        let response = self
            .with_auth(self.client.post(url))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(bytes)
    }

    async fn range_query(
        &self,
        logql: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<QueryRes, HistorianError> {
        let limit = match limit {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };
        let mut url = endpoint(&self.read_url, QUERY_RANGE_PATH);
        url.query_pairs_mut()
            .append_pair("query", logql)
            .append_pair("start", &unix_nanos(from).to_string())
            .append_pair("end", &unix_nanos(to).to_string())
            .append_pair("limit", &limit.to_string())
            .append_pair("direction", "forward");

        tracing::debug!(query = logql, %from, %to, limit, "sending range query to Loki");
        let response = self.with_auth(self.client.get(url)).send().await?;
        let response = check_status(response).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn max_query_size(&self) -> usize {
        self.max_query_size
    }
}

/// Appends an API path to a base URL, keeping any path prefix of the base.
fn endpoint(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let prefix = base.path().trim_end_matches('/');
    url.set_path(&format!("{prefix}{path}"));
    url
}

async fn check_status(response: Response) -> Result<Response, HistorianError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    Err(HistorianError::Remote {
        status: status.as_u16(),
        body,
    })
}

/// Nanoseconds since the Unix epoch, saturating outside the representable range.
pub(crate) fn unix_nanos(t: DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt().unwrap_or(if t.timestamp() < 0 { i64::MIN } else { i64::MAX })
}
