//! Flavor reconciler - reconciles a desired flavor with the compute service.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::Outcome;
use crate::clients::{Flavor, FlavorApi, NewFlavor};
use crate::error::{ApiError, FlavorError, Result};
use crate::params::{Desired, FlavorSpec};

/// Flavor reconciler over an injected compute client.
pub struct FlavorReconciler<C> {
    compute: C,
}

impl<C: FlavorApi> FlavorReconciler<C> {
    pub fn new(compute: C) -> Self {
        Self { compute }
    }

    pub fn compute(&self) -> &C {
        &self.compute
    }

    /// Dispatch on the desired state.
    pub async fn apply(&self, desired: &Desired) -> Result<Outcome> {
        match desired {
            Desired::Present(spec) => self.reconcile(spec).await,
            Desired::Absent { name } => self.finalize(name).await,
        }
    }

    /// Find flavors with exactly this name and, when given, exactly this id.
    pub async fn lookup(&self, name: &str, id: Option<&str>) -> Result<Vec<Flavor>> {
        let flavors = self.compute.list_flavors().await?;
        let total = flavors.len();
        let matches: Vec<Flavor> = flavors
            .into_iter()
            .filter(|f| f.name == name)
            .filter(|f| id.is_none_or(|id| f.id == id))
            .collect();
        debug!(
            "Lookup {} (id {:?}): {} of {} flavors match",
            name,
            id,
            matches.len(),
            total
        );
        Ok(matches)
    }

    /// Ensure the flavor exists as specified.
    ///
    /// Sizing fields and visibility of an existing flavor are never changed;
    /// a difference there is a conflict. Only extra specs are updated in place.
    pub async fn reconcile(&self, spec: &FlavorSpec) -> Result<Outcome> {
        info!("Reconciling flavor {}", spec.name);

        let matches = self.lookup(&spec.name, spec.id.as_deref()).await?;
        let Some(existing) = matches.into_iter().next() else {
            return self.create(spec).await;
        };

        let differing = sizing_differences(&existing, spec);
        if !differing.is_empty() {
            warn!(
                "Flavor {} ({}) differs in {}",
                spec.name,
                existing.id,
                differing.join(", ")
            );
            return Err(FlavorError::Conflict {
                name: spec.name.clone(),
                fields: differing.join(", "),
            });
        }

        let current = self.compute.get_extra_specs(&existing.id).await?;
        if current == spec.extra_specs {
            debug!("Flavor {} ({}) is up to date", spec.name, existing.id);
            return Ok(Outcome::unchanged(&spec.name, Some(existing.id)));
        }

        self.replace_extra_specs(&existing.id, &current, &spec.extra_specs)
            .await
            .map_err(|e| FlavorError::ExtraSpecs {
                name: spec.name.clone(),
                id: existing.id.clone(),
                message: e.to_string(),
            })?;
        Ok(Outcome::changed(&spec.name, Some(existing.id)))
    }

    /// Ensure no flavor with this name exists. Deletes every match, in
    /// listing order, and stops at the first failure. Flavors deleted before
    /// the failure stay deleted.
    pub async fn finalize(&self, name: &str) -> Result<Outcome> {
        info!("Finalizing (deleting) flavor {}", name);

        let matches = self.lookup(name, None).await?;
        if matches.is_empty() {
            debug!("No flavor named {}, nothing to delete", name);
            return Ok(Outcome::unchanged(name, None));
        }

        for flavor in &matches {
            info!("Deleting flavor {} ({})", flavor.name, flavor.id);
            self.compute
                .delete_flavor(&flavor.id)
                .await
                .map_err(|e| FlavorError::Deletion {
                    name: flavor.name.clone(),
                    id: flavor.id.clone(),
                    message: e.to_string(),
                })?;
        }

        Ok(Outcome::changed(name, None))
    }

    async fn create(&self, spec: &FlavorSpec) -> Result<Outcome> {
        info!("Creating flavor {}", spec.name);

        let request = NewFlavor {
            name: spec.name.clone(),
            ram: spec.ram,
            vcpus: spec.vcpus,
            disk: spec.disk,
            ephemeral: spec.ephemeral,
            swap: spec.swap,
            id: spec.id.clone(),
            is_public: spec.is_public,
        };

        let created = self
            .compute
            .create_flavor(&request)
            .await
            .map_err(|e| FlavorError::Creation {
                name: spec.name.clone(),
                message: e.to_string(),
            })?;

        self.compute
            .set_extra_specs(&created.id, &spec.extra_specs)
            .await
            .map_err(|e| {
                warn!(
                    "Flavor {} ({}) created without its extra specs",
                    spec.name, created.id
                );
                FlavorError::ExtraSpecs {
                    name: spec.name.clone(),
                    id: created.id.clone(),
                    message: e.to_string(),
                }
            })?;

        info!("Created flavor {} ({})", spec.name, created.id);
        Ok(Outcome::changed(&spec.name, Some(created.id)))
    }

    /// Make the flavor's extra specs exactly `desired`.
    async fn replace_extra_specs(
        &self,
        id: &str,
        current: &BTreeMap<String, String>,
        desired: &BTreeMap<String, String>,
    ) -> std::result::Result<(), ApiError> {
        for key in current.keys().filter(|k| !desired.contains_key(*k)) {
            info!("Unsetting extra spec {} on flavor {}", key, id);
            self.compute.unset_extra_spec(id, key).await?;
        }

        let updates: BTreeMap<String, String> = desired
            .iter()
            .filter(|(k, v)| current.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !updates.is_empty() {
            info!(
                "Setting extra specs {:?} on flavor {}",
                updates.keys().collect::<Vec<_>>(),
                id
            );
            self.compute.set_extra_specs(id, &updates).await?;
        }
        Ok(())
    }
}

/// Names of the immutable fields where `existing` differs from `spec`.
fn sizing_differences(existing: &Flavor, spec: &FlavorSpec) -> Vec<&'static str> {
    [
        ("ram", existing.ram == spec.ram),
        ("vcpus", existing.vcpus == spec.vcpus),
        ("root", existing.disk == spec.disk),
        ("ephemeral", existing.ephemeral == spec.ephemeral),
        ("swap", existing.swap == spec.swap),
        ("is_public", existing.is_public == spec.is_public),
    ]
    .into_iter()
    .filter(|(_, equal)| !equal)
    .map(|(field, _)| field)
    .collect()
}
