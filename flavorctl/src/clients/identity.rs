//! Client for the identity service.
//!
//! Supports the v2.0 and v3 token APIs. The API version is taken from the
//! last path segment of the auth URL (`/v3` selects v3, anything else v2.0).

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::FlavorError;
use crate::params::Credentials;

const COMPUTE_SERVICE_TYPE: &str = "compute";
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Identity API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityVersion {
    V2,
    V3,
}

impl IdentityVersion {
    pub fn detect(auth_url: &str) -> Self {
        match auth_url.trim_end_matches('/').rsplit('/').next() {
            Some("v3") => IdentityVersion::V3,
            _ => IdentityVersion::V2,
        }
    }
}

/// An authenticated session: token plus the resolved compute endpoint.
#[derive(Clone)]
pub struct Session {
    pub token: String,
    pub compute_url: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("compute_url", &self.compute_url)
            .finish()
    }
}

/// One service endpoint from a catalog, normalized across API versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub region: Option<String>,
    pub url: String,
}

/// One catalog entry, normalized across API versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub service_type: String,
    pub endpoints: Vec<Endpoint>,
}

// v2.0 response body

#[derive(Deserialize)]
struct V2Response {
    access: V2Access,
}

#[derive(Deserialize)]
struct V2Access {
    token: V2Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<V2Service>,
}

#[derive(Deserialize)]
struct V2Token {
    id: String,
}

#[derive(Deserialize)]
struct V2Service {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<V2Endpoint>,
}

#[derive(Deserialize)]
struct V2Endpoint {
    region: Option<String>,
    #[serde(rename = "publicURL")]
    public_url: String,
}

// v3 response body

#[derive(Deserialize)]
struct V3Response {
    token: V3Token,
}

#[derive(Deserialize)]
struct V3Token {
    #[serde(default)]
    catalog: Vec<V3Service>,
}

#[derive(Deserialize)]
struct V3Service {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<V3Endpoint>,
}

#[derive(Deserialize)]
struct V3Endpoint {
    interface: String,
    region: Option<String>,
    region_id: Option<String>,
    url: String,
}

/// Client for the identity service.
pub struct IdentityClient {
    http: reqwest::Client,
    auth_url: String,
    version: IdentityVersion,
}

impl IdentityClient {
    pub fn new(http: reqwest::Client, auth_url: &str) -> Self {
        let auth_url = auth_url.trim_end_matches('/').to_string();
        let version = IdentityVersion::detect(&auth_url);
        Self {
            http,
            auth_url,
            version,
        }
    }

    pub fn version(&self) -> IdentityVersion {
        self.version
    }

    /// Obtain a token and resolve the compute endpoint for the requested
    /// region. No retry on failure.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Session, FlavorError> {
        debug!(
            "Authenticating {} against {} ({:?})",
            credentials.username, self.auth_url, self.version
        );

        let (token, catalog) = match self.version {
            IdentityVersion::V2 => self.authenticate_v2(credentials).await?,
            IdentityVersion::V3 => self.authenticate_v3(credentials).await?,
        };

        let compute_url = select_endpoint(
            &catalog,
            COMPUTE_SERVICE_TYPE,
            credentials.region_name.as_deref(),
        )?;

        Ok(Session {
            token,
            compute_url: compute_url.trim_end_matches('/').to_string(),
        })
    }

    async fn authenticate_v2(
        &self,
        credentials: &Credentials,
    ) -> Result<(String, Vec<CatalogEntry>), FlavorError> {
        let url = format!("{}/tokens", self.auth_url);
        let body = json!({
            "auth": {
                "passwordCredentials": {
                    "username": credentials.username,
                    "password": credentials.password,
                },
                "tenantName": credentials.tenant_name,
            }
        });

        let response = self.post(&url, &body).await?;
        let parsed: V2Response = response
            .json()
            .await
            .map_err(|e| auth_error(format!("malformed token response from {}: {}", url, e)))?;

        let catalog = parsed
            .access
            .service_catalog
            .into_iter()
            .map(|service| CatalogEntry {
                service_type: service.service_type,
                endpoints: service
                    .endpoints
                    .into_iter()
                    .map(|e| Endpoint {
                        region: e.region,
                        url: e.public_url,
                    })
                    .collect(),
            })
            .collect();

        Ok((parsed.access.token.id, catalog))
    }

    async fn authenticate_v3(
        &self,
        credentials: &Credentials,
    ) -> Result<(String, Vec<CatalogEntry>), FlavorError> {
        let url = format!("{}/auth/tokens", self.auth_url);
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": credentials.username,
                            "domain": { "id": "default" },
                            "password": credentials.password,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": credentials.tenant_name,
                        "domain": { "id": "default" },
                    }
                }
            }
        });

        let response = self.post(&url, &body).await?;
        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| auth_error(format!("{} missing from {}", SUBJECT_TOKEN_HEADER, url)))?;

        let parsed: V3Response = response
            .json()
            .await
            .map_err(|e| auth_error(format!("malformed token response from {}: {}", url, e)))?;

        let catalog = parsed
            .token
            .catalog
            .into_iter()
            .map(|service| CatalogEntry {
                service_type: service.service_type,
                endpoints: service
                    .endpoints
                    .into_iter()
                    .filter(|e| e.interface == "public")
                    .map(|e| Endpoint {
                        region: e.region_id.or(e.region),
                        url: e.url,
                    })
                    .collect(),
            })
            .collect();

        Ok((token, catalog))
    }

    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, FlavorError> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| auth_error(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(auth_error(format!(
                "identity service returned {}: {}",
                status,
                text.trim()
            )));
        }
        Ok(response)
    }
}

fn auth_error(message: String) -> FlavorError {
    FlavorError::Authentication(message)
}

/// Pick the first endpoint of `service_type`, restricted to `region` when set.
pub fn select_endpoint(
    catalog: &[CatalogEntry],
    service_type: &str,
    region: Option<&str>,
) -> Result<String, FlavorError> {
    catalog
        .iter()
        .filter(|entry| entry.service_type == service_type)
        .flat_map(|entry| entry.endpoints.iter())
        .find(|endpoint| match region {
            Some(region) => endpoint.region.as_deref() == Some(region),
            None => true,
        })
        .map(|endpoint| endpoint.url.clone())
        .ok_or_else(|| match region {
            Some(region) => auth_error(format!(
                "no {} endpoint in region '{}' found in service catalog",
                service_type, region
            )),
            None => auth_error(format!(
                "no {} endpoint found in service catalog",
                service_type
            )),
        })
}
