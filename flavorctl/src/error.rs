//! Error types for flavor reconciliation.

use thiserror::Error;

/// Errors that terminate a reconciliation run.
#[derive(Debug, Error)]
pub enum FlavorError {
    /// Identity service rejected the credentials, or no compute endpoint
    /// could be resolved from the catalog.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// An existing flavor differs from the desired one in a field that
    /// cannot be changed in place.
    #[error(
        "flavor '{name}' already exists with different {fields}; refusing to modify an existing flavor"
    )]
    Conflict { name: String, fields: String },

    /// The compute service rejected a create call.
    #[error("failed to create flavor '{name}': {message}")]
    Creation { name: String, message: String },

    /// The compute service rejected a delete call.
    #[error("failed to delete flavor '{name}' ({id}): {message}")]
    Deletion {
        name: String,
        id: String,
        message: String,
    },

    /// The flavor exists (it may have just been created) but its extra specs
    /// could not be brought to the desired state.
    #[error("failed to set extra specs on flavor '{name}' ({id}): {message}")]
    ExtraSpecs {
        name: String,
        id: String,
        message: String,
    },

    /// Any other compute API failure (listing, extra specs).
    #[error("compute API error: {0}")]
    Compute(#[from] ApiError),
}

/// Failure of a single call against an OpenStack REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure (connect, TLS, timeout).
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status.
    #[error("{method} {url} returned {status}: {message}")]
    Status {
        method: String,
        url: String,
        status: u16,
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, FlavorError>;
