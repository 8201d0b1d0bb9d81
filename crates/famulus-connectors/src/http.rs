//! HTTP connector for web request actions.

use std::time::Duration;

use famulus_core::action::HttpMethod;
use famulus_core::connector::HttpConnectorParams;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;

use crate::error::ConnectorError;

/// Captured response of a web request, appended to items as `webResponse`.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed JSON when the body is JSON, the raw text otherwise.
    pub body: Value,
}

/// Shared HTTP client handle.
///
/// The underlying client pools its connections, so one handle is safely
/// shared across concurrent runs.
#[derive(Debug)]
pub struct HttpConnector {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpConnector {
    pub fn new(params: &HttpConnectorParams) -> Result<Self, ConnectorError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &params.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConnectorError::Configuration(format!("invalid header name '{name}': {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ConnectorError::Configuration(format!("invalid header value: {e}"))
            })?;
            headers.insert(name, value);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(params.timeout_secs))
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            base_url: params.base_url.clone(),
        })
    }

    /// Probe the configured base url. Without one there is nothing to reach
    /// and the client construction already validated the parameters.
    pub async fn test(&self) -> Result<(), ConnectorError> {
        if let Some(base_url) = &self.base_url {
            self.client.head(base_url).send().await?;
        }
        Ok(())
    }

    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        match &self.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                url.trim_start_matches('/')
            ),
            None => url.to_string(),
        }
    }

    pub async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> Result<HttpResponse, ConnectorError> {
        let url = self.absolute_url(url);
        let mut request = self.client.request(to_method(method), &url);
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if !body.is_empty() {
            // JSON bodies get the matching content type, everything else is
            // sent verbatim.
            match serde_json::from_str::<Value>(body) {
                Ok(json) => request = request.json(&json),
                Err(_) => request = request.body(body.to_string()),
            }
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(HttpResponse { status, body })
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Head => Method::HEAD,
    }
}
