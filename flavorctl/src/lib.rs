//! flavorctl: declarative management of OpenStack compute flavors.
//!
//! A run authenticates against the identity service, looks up flavors by
//! name, and creates, updates (extra specs only) or deletes them so the cloud
//! matches the desired state.

pub mod clients;
pub mod error;
pub mod output;
pub mod params;
pub mod reconciler;

pub use clients::{ClientOptions, ComputeClient, FlavorApi};
pub use error::{ApiError, FlavorError, Result};
pub use output::ModuleResult;
pub use params::{Desired, FlavorParams, FlavorSpec, RawParams, State};
pub use reconciler::{FlavorReconciler, Outcome};

/// Authenticate, then reconcile the desired state. Strictly sequential: one
/// lookup and at most one mutating call sequence.
pub async fn run(params: &FlavorParams, options: &ClientOptions) -> Result<Outcome> {
    let compute = clients::connect(&params.credentials, options).await?;
    let reconciler = FlavorReconciler::new(compute);
    reconciler.apply(&params.desired).await
}
