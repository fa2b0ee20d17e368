use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

use super::{Backend, DbError, Result, Row, SqlValue};
use crate::http;

/// Remote libSQL database reached over the Hrana HTTP pipeline endpoint.
pub struct TursoBackend {
    client: ClientWithMiddleware,
    pipeline_url: String,
    auth_token: String,
}

#[derive(Serialize)]
struct PipelineRequest<'a> {
    requests: Vec<StreamRequest<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamRequest<'a> {
    Execute { stmt: Statement<'a> },
    Close,
}

#[derive(Serialize)]
struct Statement<'a> {
    sql: &'a str,
    args: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Value {
    Null,
    // Hrana carries 64-bit integers as strings.
    Integer { value: String },
    Float { value: f64 },
    Text { value: String },
    Blob { base64: String },
}

#[derive(Deserialize)]
struct PipelineResponse {
    results: Vec<StreamResult>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamResult {
    Ok { response: StreamResponse },
    Error { error: RemoteError },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamResponse {
    Execute { result: StatementResult },
    Close,
}

#[derive(Deserialize)]
struct StatementResult {
    #[serde(default)]
    rows: Vec<Vec<Value>>,
    #[serde(default)]
    affected_row_count: u64,
}

#[derive(Deserialize)]
struct RemoteError {
    message: String,
}

impl From<&SqlValue> for Value {
    fn from(value: &SqlValue) -> Self {
        match value {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::Integer {
                value: i.to_string(),
            },
            SqlValue::Text(s) => Value::Text { value: s.clone() },
        }
    }
}

impl TryFrom<Value> for SqlValue {
    type Error = DbError;

    fn try_from(value: Value) -> Result<Self> {
        Ok(match value {
            Value::Null => SqlValue::Null,
            Value::Integer { value } => {
                SqlValue::Integer(value.parse().map_err(|_| DbError::InvalidValue {
                    column: "integer",
                    value,
                })?)
            }
            Value::Float { value } => SqlValue::Text(value.to_string()),
            Value::Text { value } => SqlValue::Text(value),
            Value::Blob { base64 } => SqlValue::Text(base64),
        })
    }
}

/// Maps `libsql://host` to the HTTPS pipeline endpoint. Explicit http(s)
/// URLs are kept as given.
fn pipeline_url(url: &str) -> String {
    let base = match url.strip_prefix("libsql://") {
        Some(host) => format!("https://{host}"),
        None => url.to_string(),
    };
    format!("{}/v2/pipeline", base.trim_end_matches('/'))
}

impl TursoBackend {
    pub fn new(url: &str, auth_token: &str) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(DbError::Remote("database URL is empty".to_string()));
        }
        Ok(Self {
            client: http::build_client_without_retries(http::DEFAULT_TIMEOUT)?,
            pipeline_url: pipeline_url(url),
            auth_token: auth_token.to_string(),
        })
    }

    async fn run(&self, sql: &str, params: &[SqlValue]) -> Result<StatementResult> {
        let body = PipelineRequest {
            requests: vec![
                StreamRequest::Execute {
                    stmt: Statement {
                        sql,
                        args: params.iter().map(Value::from).collect(),
                    },
                },
                StreamRequest::Close,
            ],
        };

        let mut request = self.client.post(&self.pipeline_url).json(&body);
        if !self.auth_token.is_empty() {
            request = request.bearer_auth(&self.auth_token);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DbError::Remote(format!("HTTP {status}: {}", text.trim())));
        }

        let pipeline: PipelineResponse = response.json().await?;
        match pipeline.results.into_iter().next() {
            Some(StreamResult::Ok {
                response: StreamResponse::Execute { result },
            }) => Ok(result),
            Some(StreamResult::Error { error }) => Err(DbError::Remote(error.message)),
            _ => Err(DbError::Remote(
                "pipeline response has no statement result".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Backend for TursoBackend {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        Ok(self.run(sql, params).await?.affected_row_count)
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.run(sql, params)
            .await?
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(SqlValue::try_from)
                    .collect::<Result<Vec<_>>>()
                    .map(Row)
            })
            .collect()
    }
}
