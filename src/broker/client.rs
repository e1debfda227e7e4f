/// Shared REST client for provider driver APIs
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::models::ErrorResponse;
use crate::error::{Error, Result};

/// Thin JSON client bound to one provider endpoint
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
}

impl ApiClient {
    /// Create a client for `base_url`, sending `authorization` on every request
    pub fn new(base_url: &str, authorization: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(auth) = authorization {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(auth)
                    .map_err(|_| Error::Configuration("Invalid API token format".to_string()))?,
            );
        }
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        // Url::join drops the last path segment unless it ends with a slash
        let base = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{}/", base_url))?
        };

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve path `segments` below the base URL. Each segment is
    /// percent-encoded, so names cannot leave their resource.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(Error::InvalidRequest(format!(
                "invalid path segment '{}'",
                bad
            )));
        }

        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Configuration(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Transport failures carry the endpoint they happened on
    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| Error::transient(self.base.as_str(), e))
    }

    /// Make a GET request to the API
    pub(crate) async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.url(segments)?;
        debug!("GET {}", url);

        let response = self.send(self.client.get(url)).await?;
        Self::handle_response(response).await
    }

    /// Make a GET request and return the raw body
    pub(crate) async fn get_text(&self, segments: &[&str]) -> Result<String> {
        let url = self.url(segments)?;
        debug!("GET {}", url);

        let response = self.send(self.client.get(url)).await?;
        Self::handle_text(response).await
    }

    /// Make a POST request to the API
    pub(crate) async fn post<T: Serialize, R: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &T,
    ) -> Result<R> {
        let url = self.url(segments)?;
        debug!("POST {}", url);

        let response = self.send(self.client.post(url).json(body)).await?;
        Self::handle_response(response).await
    }

    /// Make a POST request and return the raw body
    pub(crate) async fn post_text<T: Serialize>(&self, segments: &[&str], body: &T) -> Result<String> {
        let url = self.url(segments)?;
        debug!("POST {}", url);

        let response = self.send(self.client.post(url).json(body)).await?;
        Self::handle_text(response).await
    }

    /// Make a PATCH request to the API
    pub(crate) async fn patch<T: Serialize, R: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &T,
    ) -> Result<R> {
        let url = self.url(segments)?;
        debug!("PATCH {}", url);

        let response = self.send(self.client.patch(url).json(body)).await?;
        Self::handle_response(response).await
    }

    /// Make a DELETE request and return the raw body, which may be empty
    pub(crate) async fn delete(&self, segments: &[&str]) -> Result<String> {
        let url = self.url(segments)?;
        debug!("DELETE {}", url);

        let response = self.send(self.client.delete(url)).await?;
        Self::handle_text(response).await
    }

    /// Handle API response, checking for errors
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let text = Self::handle_text(response).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn handle_text(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            return Ok(text);
        }

        Err(Self::api_error(status, &text))
    }

    fn api_error(status: StatusCode, text: &str) -> Error {
        // Try to parse as error response
        let message = match serde_json::from_str::<ErrorResponse>(text) {
            Ok(error_response) => format!(
                "{} - {}",
                error_response.error.code, error_response.error.message
            ),
            Err(_) => text.to_string(),
        };

        Error::Api {
            status: status.as_u16(),
            message,
        }
    }
}
