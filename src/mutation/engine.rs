// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Applies injection plans to in-memory workloads.
//!
//! A plan is applied to a copy of the pod template, which replaces the original only
//! once every step succeeded. On error the workload is left untouched.

use k8s_openapi::api::core::v1::{Container, PodTemplateSpec};
use tracing::debug;

use super::marker;
use super::planner::{self, is_reserved, InjectionPlan, PlanKind};
use super::ApplyError;
use crate::constants::injection::RESERVED_ENV_NAMES;
use crate::constants::labels;
use crate::types::Workload;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Mutated,
    Unchanged,
    /// Opted out through `lumigo.auto-trace=false`
    Skipped,
}

/// Whether the workload opted out of instrumentation, by label or annotation
pub fn is_opted_out(workload: &Workload) -> bool {
    workload.label(labels::AUTO_TRACE) == Some("false")
        || workload.annotation(labels::AUTO_TRACE) == Some("false")
}

/// Apply `plan` to `workload`, all or nothing.
pub fn apply(workload: &mut Workload, plan: &InjectionPlan) -> Result<ApplyOutcome, ApplyError> {
    if plan.kind != PlanKind::Remove && is_opted_out(workload) {
        debug!(workload = %workload, "Workload opted out of Lumigo injection");
        return Ok(ApplyOutcome::Skipped);
    }
    if plan.is_noop() {
        return Ok(ApplyOutcome::Unchanged);
    }

    let Some(current) = workload.pod_template() else {
        return Err(ApplyError::MissingPodTemplate(workload.to_string()));
    };

    let mut updated = current.clone();
    apply_to_template(&mut updated, plan)?;

    if &updated == current {
        return Ok(ApplyOutcome::Unchanged);
    }
    workload.set_pod_template(updated);
    Ok(ApplyOutcome::Mutated)
}

/// Remove all instrumentation from `workload`, whatever settings injected it.
pub fn revert(workload: &mut Workload) -> Result<ApplyOutcome, ApplyError> {
    let Some(template) = workload.pod_template() else {
        return Err(ApplyError::MissingPodTemplate(workload.to_string()));
    };
    let plan = planner::plan_removal(template);
    apply(workload, &plan)
}

pub fn apply_to_template(
    template: &mut PodTemplateSpec,
    plan: &InjectionPlan,
) -> Result<(), ApplyError> {
    if plan.kind == PlanKind::Inject && !marker::is_present(template) {
        ensure_reserved_names_free(template)?;
    }

    let adds_anything = !plan.add_init_containers.is_empty()
        || !plan.add_containers.is_empty()
        || !plan.add_volumes.is_empty();

    if let Some(spec) = template.spec.as_mut() {
        spec.containers
            .retain(|c| !plan.remove_container_names.contains(&c.name));
        retain_or_clear(&mut spec.init_containers, |c| {
            !plan.remove_container_names.contains(&c.name)
        });
        retain_or_clear(&mut spec.volumes, |v| !plan.remove_volume_names.contains(&v.name));

        for container in spec.containers.iter_mut() {
            retain_or_clear(&mut container.env, |e| !plan.remove_env_names.contains(&e.name));
            retain_or_clear(&mut container.volume_mounts, |m| {
                !plan.remove_volume_mount_names.contains(&m.name)
            });
        }
    } else if adds_anything {
        return Err(ApplyError::MissingPodTemplate("pod template".to_string()));
    }

    if adds_anything {
        if let Some(spec) = template.spec.as_mut() {
            for container in spec.containers.iter_mut() {
                add_to_application_container(container, plan);
            }
            spec.init_containers
                .get_or_insert_with(Vec::new)
                .extend(plan.add_init_containers.iter().cloned());
            spec.containers.extend(plan.add_containers.iter().cloned());
            spec.volumes
                .get_or_insert_with(Vec::new)
                .extend(plan.add_volumes.iter().cloned());
        }
    }

    // The marker goes last, so an interrupted removal still shows as instrumented
    match &plan.marker {
        Some(desired) => marker::stamp(template, desired)?,
        None if plan.kind == PlanKind::Remove => marker::remove(template),
        None => {}
    }

    Ok(())
}

fn add_to_application_container(container: &mut Container, plan: &InjectionPlan) {
    if !plan.env_vars.is_empty() {
        container
            .env
            .get_or_insert_with(Vec::new)
            .extend(plan.env_vars.iter().cloned());
    }
    if !plan.volume_mounts.is_empty() {
        container
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .extend(plan.volume_mounts.iter().cloned());
    }
}

/// Keep matching items; an emptied list becomes `None`, like the API server stores it
fn retain_or_clear<T>(items: &mut Option<Vec<T>>, keep: impl FnMut(&T) -> bool) {
    if let Some(list) = items.as_mut() {
        list.retain(keep);
        if list.is_empty() {
            *items = None;
        }
    }
}

/// An uninstrumented template must not already use names the injection owns;
/// removing instrumentation later would take the user's items with it.
fn ensure_reserved_names_free(template: &PodTemplateSpec) -> Result<(), ApplyError> {
    let Some(spec) = template.spec.as_ref() else {
        return Ok(());
    };

    let containers = spec.init_containers.iter().flatten().chain(spec.containers.iter());
    for container in containers {
        if is_reserved(&container.name) {
            return Err(ApplyError::ReservedNameInUse(container.name.clone()));
        }
        if let Some(env) = container
            .env
            .iter()
            .flatten()
            .find(|e| RESERVED_ENV_NAMES.contains(&e.name.as_str()))
        {
            return Err(ApplyError::ReservedNameInUse(env.name.clone()));
        }
        if let Some(mount) = container
            .volume_mounts
            .iter()
            .flatten()
            .find(|m| is_reserved(&m.name))
        {
            return Err(ApplyError::ReservedNameInUse(mount.name.clone()));
        }
    }

    if let Some(volume) = spec.volumes.iter().flatten().find(|v| is_reserved(&v.name)) {
        return Err(ApplyError::ReservedNameInUse(volume.name.clone()));
    }

    Ok(())
}
