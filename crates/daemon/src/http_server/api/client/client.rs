use bytes::Bytes;
use reqwest::{header::HeaderMap, header::HeaderValue, Client, Response};
use url::Url;

use super::error::ApiError;
use super::ApiRequest;
use crate::http_server::api::v0::files::recover::RecoverRequest;

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self {
            remote: remote.clone(),
            client,
        })
    }

    pub async fn call<T: ApiRequest>(&self, request: T) -> Result<T::Response, ApiError> {
        let request_builder = request.build_request(&self.remote, &self.client)?;
        let response = check_status(request_builder.send().await?).await?;
        Ok(response.json::<T::Response>().await?)
    }

    /// Fetch a recovered document; the body is the plaintext, not JSON
    pub async fn recover(&self, request: RecoverRequest) -> Result<Bytes, ApiError> {
        let request_builder = request.build_request(&self.remote, &self.client)?;
        let response = check_status(request_builder.send().await?).await?;
        Ok(response.bytes().await?)
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    /// Get the underlying HTTP client for custom requests
    pub fn http_client(&self) -> &Client {
        &self.client
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await?;
    Err(ApiError::from_response(status, body))
}
