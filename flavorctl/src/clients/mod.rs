//! Clients for the OpenStack services the reconciler talks to:
//! - identity: token issuance and service catalog lookup
//! - compute: flavor listing, creation, deletion and extra specs

pub mod compute;
pub mod identity;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::error::{ApiError, FlavorError};
use crate::params::Credentials;

pub use compute::ComputeClient;
pub use identity::{IdentityClient, Session};

/// Flavor record as reported by the compute service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
    pub ram: u64,
    pub vcpus: u64,
    pub disk: u64,
    #[serde(rename = "OS-FLV-EXT-DATA:ephemeral", default)]
    pub ephemeral: u64,
    /// The compute service reports a swap of zero as an empty string.
    #[serde(default, deserialize_with = "deserialize_swap")]
    pub swap: u64,
    #[serde(rename = "os-flavor-access:is_public", default = "default_true")]
    pub is_public: bool,
}

fn default_true() -> bool {
    true
}

fn deserialize_swap<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Swap {
        Int(u64),
        Str(String),
    }

    match Option::<Swap>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Swap::Int(n)) => Ok(n),
        Some(Swap::Str(s)) if s.trim().is_empty() => Ok(0),
        Some(Swap::Str(s)) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid swap value '{}'", s))),
    }
}

/// Body of a flavor create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewFlavor {
    pub name: String,
    pub ram: u64,
    pub vcpus: u64,
    pub disk: u64,
    #[serde(rename = "OS-FLV-EXT-DATA:ephemeral")]
    pub ephemeral: u64,
    pub swap: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "os-flavor-access:is_public")]
    pub is_public: bool,
}

/// Flavor operations of the compute service.
#[async_trait]
pub trait FlavorApi: Send + Sync {
    /// List every flavor visible to the caller, public and private.
    async fn list_flavors(&self) -> Result<Vec<Flavor>, ApiError>;

    async fn create_flavor(&self, flavor: &NewFlavor) -> Result<Flavor, ApiError>;

    async fn delete_flavor(&self, id: &str) -> Result<(), ApiError>;

    async fn get_extra_specs(&self, id: &str) -> Result<BTreeMap<String, String>, ApiError>;

    /// Add or overwrite the given keys. Keys not mentioned are left alone.
    async fn set_extra_specs(
        &self,
        id: &str,
        specs: &BTreeMap<String, String>,
    ) -> Result<(), ApiError>;

    async fn unset_extra_spec(&self, id: &str, key: &str) -> Result<(), ApiError>;
}

/// HTTP client settings shared by the identity and compute clients.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub insecure: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            insecure: false,
        }
    }
}

/// Authenticate and return a compute client bound to the issued token.
///
/// Any failure here, including building the HTTP client, is reported as
/// [`FlavorError::Authentication`].
pub async fn connect(
    credentials: &Credentials,
    options: &ClientOptions,
) -> Result<ComputeClient, FlavorError> {
    let http = reqwest::Client::builder()
        .timeout(options.timeout)
        .danger_accept_invalid_certs(options.insecure)
        .build()
        .map_err(|e| FlavorError::Authentication(format!("failed to build HTTP client: {}", e)))?;

    let identity = IdentityClient::new(http.clone(), &credentials.auth_url);
    let session = identity.authenticate(credentials).await?;
    info!("Authenticated, compute endpoint: {}", session.compute_url);

    Ok(ComputeClient::new(http, session))
}
