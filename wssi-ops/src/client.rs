//! JSON client for the WSSI API operator endpoints

use reqwest::header::ACCEPT;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpsError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API answered {status}: {body}")]
    Status { status: u16, body: String },
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OpsError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("wssi-ops/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get_json(&self, path: &str) -> Result<Value, OpsError> {
        let response = self.http.get(self.url(path)).header(ACCEPT, "application/json").send().await?;
        Self::parse(response).await
    }

    pub async fn post_json(&self, path: &str, headers: &[(&str, &str)], body: &Value) -> Result<Value, OpsError> {
        let mut request = self
            .http
            .post(self.url(path))
            .header(ACCEPT, "application/json")
            .json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        Self::parse(request.send().await?).await
    }

    async fn parse(response: reqwest::Response) -> Result<Value, OpsError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpsError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}
