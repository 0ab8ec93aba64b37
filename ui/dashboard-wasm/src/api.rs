//! HTTP client for the platform REST API (`gloo-net` over `fetch`).

use crate::config::ClientConfig;
use async_trait::async_trait;
use gloo_net::http::{Request, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::rc::Rc;
use sv_api_types::{ApiError, PublicSettings, SettingsResponse, User};
use sv_auth::ProfileApi;
use sv_theme::SettingsSource;

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    if !response.ok() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status { status, body });
    }
    response
        .json::<T>()
        .await
        .map_err(|err| ApiError::Decode(err.to_string()))
}

fn network(err: gloo_net::Error) -> ApiError {
    ApiError::Network(err.to_string())
}

pub struct HttpSettingsSource {
    config: Rc<ClientConfig>,
}

impl HttpSettingsSource {
    pub fn new(config: Rc<ClientConfig>) -> Self {
        Self { config }
    }
}

#[async_trait(?Send)]
impl SettingsSource for HttpSettingsSource {
    /// Public and unauthenticated.
    async fn fetch_public_settings(&self) -> Result<PublicSettings, ApiError> {
        let url = self.config.endpoint("/v1/settings/public");
        let response = Request::get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(network)?;
        read_json::<SettingsResponse>(response).await?.into_settings()
    }
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    #[serde(alias = "user")]
    data: User,
}

pub struct HttpProfileApi {
    config: Rc<ClientConfig>,
}

impl HttpProfileApi {
    pub fn new(config: Rc<ClientConfig>) -> Self {
        Self { config }
    }
}

#[async_trait(?Send)]
impl ProfileApi for HttpProfileApi {
    async fn current_user(&self, bearer: &str) -> Result<User, ApiError> {
        let url = self.config.endpoint("/v1/auth/me");
        let response = Request::get(&url)
            .header("Accept", "application/json")
            .header("Authorization", bearer)
            .send()
            .await
            .map_err(network)?;
        Ok(read_json::<UserEnvelope>(response).await?.data)
    }
}
