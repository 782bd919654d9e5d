//! Client for the compute service flavor API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::{Flavor, FlavorApi, NewFlavor, Session};
use crate::error::ApiError;

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

#[derive(Deserialize)]
struct FlavorList {
    flavors: Vec<Flavor>,
}

#[derive(Deserialize)]
struct FlavorBody {
    flavor: Flavor,
}

#[derive(Deserialize)]
struct ExtraSpecsBody {
    #[serde(default)]
    extra_specs: BTreeMap<String, String>,
}

/// Client for the compute service, bound to one authenticated session.
#[derive(Clone)]
pub struct ComputeClient {
    http: reqwest::Client,
    session: Session,
}

impl ComputeClient {
    pub fn new(http: reqwest::Client, session: Session) -> Self {
        Self { http, session }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.session.compute_url, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(AUTH_TOKEN_HEADER, &self.session.token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.url(path);
        debug!("{} {}", method, url);

        let mut request = self.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|source| ApiError::Transport {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            method: method.to_string(),
            url,
            status: status.as_u16(),
            message: error_message(&text),
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ApiError> {
        let response = self.send(method, path, body).await?;
        let url = response.url().to_string();
        response.json().await.map_err(|e| ApiError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

/// Extract the human-readable message from a compute fault body, e.g.
/// `{"conflictingRequest": {"code": 409, "message": "..."}}`.
fn error_message(body: &str) -> String {
    let trimmed = body.trim();
    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|value| {
            value
                .as_object()?
                .values()
                .find_map(|fault| fault.get("message")?.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| trimmed.to_string())
}

#[async_trait]
impl FlavorApi for ComputeClient {
    async fn list_flavors(&self) -> Result<Vec<Flavor>, ApiError> {
        let list: FlavorList = self
            .send_json(Method::GET, "/flavors/detail?is_public=None", None)
            .await?;
        Ok(list.flavors)
    }

    async fn create_flavor(&self, flavor: &NewFlavor) -> Result<Flavor, ApiError> {
        let body: FlavorBody = self
            .send_json(Method::POST, "/flavors", Some(json!({ "flavor": flavor })))
            .await?;
        Ok(body.flavor)
    }

    async fn delete_flavor(&self, id: &str) -> Result<(), ApiError> {
        self.send(Method::DELETE, &format!("/flavors/{}", id), None)
            .await?;
        Ok(())
    }

    async fn get_extra_specs(&self, id: &str) -> Result<BTreeMap<String, String>, ApiError> {
        let body: ExtraSpecsBody = self
            .send_json(Method::GET, &format!("/flavors/{}/os-extra_specs", id), None)
            .await?;
        Ok(body.extra_specs)
    }

    async fn set_extra_specs(
        &self,
        id: &str,
        specs: &BTreeMap<String, String>,
    ) -> Result<(), ApiError> {
        if specs.is_empty() {
            return Ok(());
        }
        self.send(
            Method::POST,
            &format!("/flavors/{}/os-extra_specs", id),
            Some(json!({ "extra_specs": specs })),
        )
        .await?;
        Ok(())
    }

    async fn unset_extra_spec(&self, id: &str, key: &str) -> Result<(), ApiError> {
        self.send(
            Method::DELETE,
            &format!("/flavors/{}/os-extra_specs/{}", id, key),
            None,
        )
        .await?;
        Ok(())
    }
}
