//! HTTP Request node executor.

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{HttpAuth, HttpBodyType, HttpMethod, HttpRequestNodeData, NodeRunResult};
use crate::error::NodeError;
use crate::nodes::executor::NodeExecutor;
use crate::nodes::utils::parse_config;
use crate::template::{render_template, resolve_value_spec, value_to_text};

const ERROR_BODY_LIMIT: usize = 2048;

/// Sends one request with the runtime's shared client.
///
/// Output is `{status, headers, body}`; a JSON response body is decoded. A
/// non-2xx status fails the node (5xx and 429 are retryable).
pub struct HttpRequestExecutor;

#[async_trait]
impl NodeExecutor for HttpRequestExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        _input: &Value,
        ctx: &ExecutionContext,
        runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let data: HttpRequestNodeData = parse_config("http_request", config)?;

        let url = render_template(&data.url, ctx);
        if url.trim().is_empty() {
            return Err(NodeError::ConfigError("http_request url is empty".to_string()));
        }
        let url = reqwest::Url::parse(url.trim())
            .map_err(|e| NodeError::InputValidationError(format!("invalid url '{}': {}", url, e)))?;

        let mut headers = HeaderMap::new();
        for (key, value) in &data.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| NodeError::ConfigError(format!("invalid header name '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(&render_template(value, ctx))
                .map_err(|e| NodeError::ConfigError(format!("invalid header value for '{}': {}", key, e)))?;
            headers.insert(name, value);
        }
        if let Some(value) = auth_header(data.auth.as_ref(), ctx)? {
            headers.insert(AUTHORIZATION, value);
        }

        let params: Vec<(String, String)> = data
            .params
            .iter()
            .map(|(k, v)| (k.clone(), render_template(v, ctx)))
            .collect();

        let mut builder = runtime
            .http
            .request(method(data.method), url.clone())
            .headers(headers);
        if !params.is_empty() {
            builder = builder.query(&params);
        }

        if let Some(body) = data.body.as_ref().filter(|b| !b.is_null()) {
            builder = match data.body_type {
                HttpBodyType::Json => {
                    let resolved = match resolve_value_spec(body, ctx) {
                        // A JSON document written as a template string.
                        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
                        other => other,
                    };
                    builder.json(&resolved)
                }
                HttpBodyType::Raw => {
                    let text = value_to_text(Some(&resolve_value_spec(body, ctx)));
                    builder.header(CONTENT_TYPE, "text/plain").body(text)
                }
            };
        }

        debug!(node_id, method = ?data.method, url = %url, "sending http request");
        let response = builder.send().await.map_err(|e| NodeError::HttpError(e.to_string()))?;

        let status = response.status();
        let response_headers: Map<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), Value::String(v.to_str().unwrap_or_default().to_string())))
            .collect();
        let text = response.text().await.map_err(|e| NodeError::HttpError(e.to_string()))?;

        if !status.is_success() {
            let mut body = text;
            if body.len() > ERROR_BODY_LIMIT {
                let mut cut = ERROR_BODY_LIMIT;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(NodeError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Ok(NodeRunResult::output(json!({
            "status": status.as_u16(),
            "headers": response_headers,
            "body": body,
        })))
    }
}

fn method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Head => reqwest::Method::HEAD,
    }
}

fn auth_header(auth: Option<&HttpAuth>, ctx: &ExecutionContext) -> Result<Option<HeaderValue>, NodeError> {
    let raw = match auth {
        None | Some(HttpAuth::NoAuth) => return Ok(None),
        Some(HttpAuth::BearerToken { token }) => format!("Bearer {}", render_template(token, ctx)),
        Some(HttpAuth::BasicAuth { username, password }) => {
            let pair = format!("{}:{}", render_template(username, ctx), render_template(password, ctx));
            format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(pair))
        }
    };
    HeaderValue::from_str(&raw)
        .map(Some)
        .map_err(|e| NodeError::ConfigError(format!("invalid authorization value: {}", e)))
}
