// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Mutation of workloads at admission time.
//!
//! The webhook transport calls [`admission_settings`] to find out whether the namespace
//! has an active Lumigo instance, and [`mutate_on_admission`] to rewrite the workload.
//! The latter is pure and fast; it never talks to the cluster.

use kube::ResourceExt;
use tracing::debug;

use super::{engine, planner, ApplyError, InjectionSettings};
use crate::conditions;
use crate::config::Config;
use crate::error::Result;
use crate::kubernetes::ClusterApi;
use crate::registry::NamespaceRegistry;
use crate::types::Workload;

/// Instrument `workload` before it is persisted.
///
/// Returns the workload unchanged when `settings` is `None` (no active Lumigo instance
/// or injection disabled), when the workload opted out or when its owner is
/// instrumented instead.
pub fn mutate_on_admission(
    mut workload: Workload,
    settings: Option<&InjectionSettings>,
) -> std::result::Result<Workload, ApplyError> {
    let Some(settings) = settings else {
        return Ok(workload);
    };
    if workload.is_owned() {
        return Ok(workload);
    }
    let Some(template) = workload.pod_template() else {
        return Err(ApplyError::MissingPodTemplate(workload.to_string()));
    };

    let plan = planner::plan(template, settings);
    let outcome = engine::apply(&mut workload, &plan)?;
    debug!(workload = %workload, ?outcome, "Admission mutation");
    Ok(workload)
}

/// The injection settings for workloads admitted in `namespace`, if any.
pub async fn admission_settings(
    api: &dyn ClusterApi,
    registry: &NamespaceRegistry,
    config: &Config,
    namespace: &str,
) -> Result<Option<InjectionSettings>> {
    let candidates = api.list_lumigos(namespace).await?;
    let Some(name) = registry.resolve_authoritative(namespace, &candidates) else {
        return Ok(None);
    };

    let settings = candidates
        .iter()
        .find(|l| l.name_any() == name)
        .filter(|l| l.injection_enabled() && conditions::is_active(l.status.as_ref()))
        .map(|l| InjectionSettings::new(config, l.token_secret().clone()));
    Ok(settings)
}
