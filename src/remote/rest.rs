use std::sync::RwLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value as JsonValue;
use url::Url;

use super::error::{
    not_found, rejected, timeout_error, transport_error, unauthorized, RemoteResult,
};
use super::{Filter, RowBackend};
use crate::platform::runtime;

/// Connection settings for a PostgREST-style row API.
#[derive(Clone, Debug)]
pub struct RestOptions {
    /// Base URL of the row API, e.g. `https://acme.example.co/rest/v1/`.
    pub base_url: Url,
    /// Project API key, sent as `apikey` and as the default bearer.
    pub api_key: String,
    /// Health endpoint probed by `refresh_session`; `None` skips the probe.
    pub session_url: Option<Url>,
    /// Deadline applied to every request.
    pub request_timeout: Duration,
}

impl RestOptions {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            base_url,
            api_key: api_key.into(),
            session_url: None,
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Row backend speaking HTTP with JSON rows.
pub struct RestRowBackend {
    client: reqwest::Client,
    options: RestOptions,
    bearer: RwLock<Option<String>>,
}

impl RestRowBackend {
    pub fn new(options: RestOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            options,
            bearer: RwLock::new(None),
        }
    }

    /// Installs (or clears) the authenticated user's access token. With
    /// no token, requests fall back to the project API key.
    pub fn set_bearer_token(&self, token: Option<String>) {
        *self.bearer.write().unwrap() = token;
    }

    fn table_url(&self, table: &str) -> RemoteResult<Url> {
        self.options
            .base_url
            .join(table)
            .map_err(|err| transport_error(format!("invalid table endpoint '{table}': {err}")))
    }

    fn headers(&self) -> RemoteResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.options.api_key)
                .map_err(|err| transport_error(err.to_string()))?,
        );
        let bearer = self
            .bearer
            .read()
            .unwrap()
            .clone()
            .unwrap_or_else(|| self.options.api_key.clone());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {bearer}"))
                .map_err(|err| transport_error(err.to_string()))?,
        );
        Ok(headers)
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = runtime::timeout(self.options.request_timeout, request.send())
            .await
            .map_err(|_| timeout_error("request exceeded its deadline"))?
            .map_err(|err| {
                if err.is_timeout() {
                    timeout_error(err.to_string())
                } else {
                    transport_error(err.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            format!("request failed with status {status}")
        } else {
            body
        };
        Err(match status {
            StatusCode::UNAUTHORIZED => unauthorized(message),
            StatusCode::NOT_FOUND => not_found(message),
            other => rejected(other.as_u16(), message),
        })
    }

    async fn rows(&self, response: Response) -> RemoteResult<Vec<JsonValue>> {
        let value: JsonValue = response
            .json()
            .await
            .map_err(|err| transport_error(format!("response is not JSON: {err}")))?;
        match value {
            JsonValue::Array(rows) => Ok(rows),
            other => Ok(vec![other]),
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl RowBackend for RestRowBackend {
    async fn insert(&self, table: &str, row: JsonValue) -> RemoteResult<JsonValue> {
        let url = self.table_url(table)?;
        let mut headers = self.headers()?;
        // The persisted row comes back in the response body; the server
        // id is learned from it.
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let response = self
            .send(
                self.client
                    .request(Method::POST, url)
                    .headers(headers)
                    .json(&row),
            )
            .await?;

        let mut rows = self.rows(response).await?;
        if rows.is_empty() {
            return Err(transport_error(format!(
                "insert into '{table}' returned no representation"
            )));
        }
        Ok(rows.swap_remove(0))
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        changes: JsonValue,
    ) -> RemoteResult<Vec<JsonValue>> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        let mut headers = self.headers()?;
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let response = self
            .send(
                self.client
                    .request(Method::PATCH, url)
                    .headers(headers)
                    .json(&changes),
            )
            .await?;

        self.rows(response).await
    }

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<()> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));

        self.send(
            self.client
                .request(Method::DELETE, url)
                .headers(self.headers()?),
        )
        .await?;
        Ok(())
    }

    async fn select(&self, table: &str, filter: Option<&Filter>) -> RemoteResult<Vec<JsonValue>> {
        let mut url = self.table_url(table)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "*");
            if let Some(filter) = filter {
                pairs.append_pair(&filter.column, &format!("eq.{}", filter.equals));
            }
        }

        let response = self
            .send(self.client.request(Method::GET, url).headers(self.headers()?))
            .await?;
        self.rows(response).await
    }

    async fn refresh_session(&self) -> RemoteResult<()> {
        let Some(session_url) = self.options.session_url.clone() else {
            return Ok(());
        };
        self.send(
            self.client
                .request(Method::GET, session_url)
                .headers(self.headers()?),
        )
        .await?;
        Ok(())
    }
}
