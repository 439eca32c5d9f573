// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Instrumentation of the existing workloads of a namespace.
//!
//! Every workload is planned, mutated in memory and persisted with a single
//! version-checked update. On a conflict the workload is re-read and re-planned.
//! Failures are counted per workload and never abort the others.

use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::kubernetes::ClusterApi;
use crate::mutation::{self, marker, ApplyError, ApplyOutcome, InjectionSettings};
use crate::retry::Backoff;
use crate::types::Workload;

/// Which workloads get instrumented
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InjectionMode {
    /// Every eligible workload in the namespace
    All,
    /// Only workloads instrumented before, so they follow upgrades of the operator
    MarkedOnly,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkloadReport {
    pub mutated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl WorkloadReport {
    fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Mutated => self.mutated += 1,
            ApplyOutcome::Unchanged => self.unchanged += 1,
            ApplyOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Whether the reconciler may rewrite this workload at all
fn is_eligible(workload: &Workload) -> bool {
    if !workload.kind().supports_update() {
        return false;
    }
    if workload.is_owned() {
        debug!(workload = %workload, "Skipping workload managed by its owner");
        return false;
    }
    true
}

fn is_marked(workload: &Workload) -> bool {
    workload.pod_template().is_some_and(marker::is_present)
}

fn inject(
    workload: &mut Workload,
    settings: &InjectionSettings,
    mode: InjectionMode,
) -> std::result::Result<ApplyOutcome, ApplyError> {
    let Some(template) = workload.pod_template() else {
        return Err(ApplyError::MissingPodTemplate(workload.to_string()));
    };
    if mode == InjectionMode::MarkedOnly && !marker::is_present(template) {
        return Ok(ApplyOutcome::Unchanged);
    }
    let plan = mutation::plan(template, settings);
    mutation::apply(workload, &plan)
}

/// Instrument the workloads of `namespace` with `settings`.
#[instrument(skip(api, settings, max_conflict_retries))]
pub async fn instrument_namespace(
    api: &dyn ClusterApi,
    settings: &InjectionSettings,
    namespace: &str,
    mode: InjectionMode,
    max_conflict_retries: u32,
) -> Result<WorkloadReport> {
    let mut report = WorkloadReport::default();

    for workload in api.list_workloads(namespace).await? {
        if !is_eligible(&workload) {
            continue;
        }
        if mode == InjectionMode::MarkedOnly && !is_marked(&workload) {
            continue;
        }

        let name = workload.to_string();
        let result = update_with_retries(api, workload, max_conflict_retries, |w| {
            inject(w, settings, mode)
        })
        .await;
        match result {
            Ok(outcome) => {
                if outcome == ApplyOutcome::Mutated {
                    info!("Injected Lumigo into {}", name);
                }
                report.record(outcome);
            }
            Err(e) => {
                warn!("Failed to inject Lumigo into {}: {}", name, e);
                report.failed += 1;
            }
        }
    }

    debug!(?report, "Instrumentation pass complete");
    Ok(report)
}

/// Remove all instrumentation from the marked workloads of `namespace`.
#[instrument(skip(api, max_conflict_retries))]
pub async fn revert_namespace(
    api: &dyn ClusterApi,
    namespace: &str,
    max_conflict_retries: u32,
) -> Result<WorkloadReport> {
    let mut report = WorkloadReport::default();

    for workload in api.list_workloads(namespace).await? {
        if !is_eligible(&workload) || !is_marked(&workload) {
            continue;
        }

        let name = workload.to_string();
        match update_with_retries(api, workload, max_conflict_retries, mutation::revert).await {
            Ok(outcome) => {
                if outcome == ApplyOutcome::Mutated {
                    info!("Removed Lumigo from {}", name);
                }
                report.record(outcome);
            }
            Err(e) => {
                warn!("Failed to remove Lumigo from {}: {}", name, e);
                report.failed += 1;
            }
        }
    }

    debug!(?report, "Removal pass complete");
    Ok(report)
}

/// Apply `mutate` and persist the result, re-reading the workload on conflicts.
async fn update_with_retries<F>(
    api: &dyn ClusterApi,
    mut workload: Workload,
    max_conflict_retries: u32,
    mutate: F,
) -> Result<ApplyOutcome>
where
    F: Fn(&mut Workload) -> std::result::Result<ApplyOutcome, ApplyError>,
{
    let namespace = workload.namespace().to_string();
    let name = workload.name().to_string();
    let kind = workload.kind();
    let mut backoff = Backoff::for_conflicts();
    let mut attempt = 0;

    loop {
        let outcome = mutate(&mut workload)?;
        if outcome != ApplyOutcome::Mutated {
            return Ok(outcome);
        }

        match api.update_workload(&workload).await {
            Ok(_) => return Ok(outcome),
            Err(e) if e.is_conflict() && attempt < max_conflict_retries => {
                attempt += 1;
                debug!(
                    "Conflict updating {} {}/{}, retrying (attempt {})",
                    kind, namespace, name, attempt
                );
                backoff.wait().await;
                match api.get_workload(&namespace, kind, &name).await? {
                    Some(fresh) => workload = fresh,
                    None => return Ok(ApplyOutcome::Unchanged),
                }
            }
            Err(e) => return Err(e),
        }
    }
}
