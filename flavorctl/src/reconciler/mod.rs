//! Flavor reconciliation.
//!
//! Compares the desired flavor (from parameters) with the actual flavors
//! reported by the compute service and takes the actions needed to converge.
//!
//! Lookup and mutation are separate calls with no locking in between: two
//! runs reconciling the same flavor name concurrently can race (both see it
//! missing and both try to create it). The compute service's own uniqueness
//! checks are the only guard.

pub mod flavor;

use serde::Serialize;

pub use flavor::FlavorReconciler;

/// Result of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub changed: bool,
    pub name: String,
    /// Resolved flavor id; set when reconciling to present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Outcome {
    pub fn changed(name: &str, id: Option<String>) -> Self {
        Self {
            changed: true,
            name: name.to_string(),
            id,
        }
    }

    pub fn unchanged(name: &str, id: Option<String>) -> Self {
        Self {
            changed: false,
            name: name.to_string(),
            id,
        }
    }
}
