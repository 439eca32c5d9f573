// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Computes what injection or removal has to change in a pod template.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, PodTemplateSpec, SecretKeySelector,
    SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use super::marker::{self, ProvenanceMarker};
use super::InjectionSettings;
use crate::constants::injection::*;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlanKind {
    /// Already converged
    #[default]
    Noop,
    /// Not instrumented yet
    Inject,
    /// Instrumented with different settings; removal and injection in one pass
    Replace,
    /// Strip all instrumentation
    Remove,
}

/// The changes to make to one pod template.
///
/// Removals are applied before additions. Added containers, volumes and env vars
/// are sorted by name so the same input always yields the same template.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InjectionPlan {
    pub kind: PlanKind,
    pub add_init_containers: Vec<Container>,
    pub add_containers: Vec<Container>,
    /// Init and regular containers
    pub remove_container_names: BTreeSet<String>,
    pub add_volumes: Vec<Volume>,
    pub remove_volume_names: BTreeSet<String>,
    /// Added to every application container
    pub env_vars: Vec<EnvVar>,
    pub remove_env_names: BTreeSet<String>,
    /// Added to every application container
    pub volume_mounts: Vec<VolumeMount>,
    pub remove_volume_mount_names: BTreeSet<String>,
    /// Stamped after injection; `None` means the marker goes away
    pub marker: Option<ProvenanceMarker>,
}

impl InjectionPlan {
    pub fn is_noop(&self) -> bool {
        self.kind == PlanKind::Noop
    }
}

/// Plan the injection of `settings` into `template`.
pub fn plan(template: &PodTemplateSpec, settings: &InjectionSettings) -> InjectionPlan {
    let desired = settings.marker();

    let kind = if !marker::is_present(template) {
        PlanKind::Inject
    } else if marker::read(template).as_ref() == Some(&desired) {
        return InjectionPlan::default();
    } else {
        PlanKind::Replace
    };

    let mut plan = injection(settings);
    plan.kind = kind;

    // Upsert semantics: whatever gets added is removed first, so applying twice
    // converges on the same template.
    plan.remove_container_names.extend(
        plan.add_init_containers
            .iter()
            .chain(plan.add_containers.iter())
            .map(|c| c.name.clone()),
    );
    plan.remove_volume_names
        .extend(plan.add_volumes.iter().map(|v| v.name.clone()));
    plan.remove_env_names
        .extend(plan.env_vars.iter().map(|e| e.name.clone()));
    plan.remove_volume_mount_names
        .extend(plan.volume_mounts.iter().map(|m| m.name.clone()));

    if kind == PlanKind::Replace {
        let leftovers = plan_removal(template);
        plan.remove_container_names
            .extend(leftovers.remove_container_names);
        plan.remove_volume_names.extend(leftovers.remove_volume_names);
        plan.remove_env_names.extend(leftovers.remove_env_names);
        plan.remove_volume_mount_names
            .extend(leftovers.remove_volume_mount_names);
    }

    plan
}

/// Plan the removal of all instrumentation from `template`.
///
/// Works from the template alone: the marker and the reserved names say what was
/// injected, whatever the settings were at the time.
pub fn plan_removal(template: &PodTemplateSpec) -> InjectionPlan {
    let mut plan = InjectionPlan::default();

    if let Some(spec) = template.spec.as_ref() {
        let init = spec.init_containers.iter().flatten();
        plan.remove_container_names = init
            .chain(spec.containers.iter())
            .map(|c| c.name.as_str())
            .filter(|name| is_reserved(name))
            .map(str::to_string)
            .collect();

        plan.remove_volume_names = spec
            .volumes
            .iter()
            .flatten()
            .map(|v| v.name.as_str())
            .filter(|name| is_reserved(name))
            .map(str::to_string)
            .collect();

        for container in spec.containers.iter().filter(|c| !is_reserved(&c.name)) {
            plan.remove_env_names.extend(
                container
                    .env
                    .iter()
                    .flatten()
                    .filter(|e| RESERVED_ENV_NAMES.contains(&e.name.as_str()))
                    .map(|e| e.name.clone()),
            );
            plan.remove_volume_mount_names.extend(
                container
                    .volume_mounts
                    .iter()
                    .flatten()
                    .filter(|m| is_reserved(&m.name))
                    .map(|m| m.name.clone()),
            );
        }
    }

    let anything_to_remove = marker::is_present(template)
        || !plan.remove_container_names.is_empty()
        || !plan.remove_volume_names.is_empty()
        || !plan.remove_env_names.is_empty()
        || !plan.remove_volume_mount_names.is_empty();
    if anything_to_remove {
        plan.kind = PlanKind::Remove;
    }

    plan
}

pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

fn injection(settings: &InjectionSettings) -> InjectionPlan {
    let token_env = EnvVar {
        name: ENV_TRACER_TOKEN.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: settings.token_secret.name.clone(),
                key: settings.token_secret.key.clone(),
                optional: Some(true),
            }),
            ..Default::default()
        }),
    };

    let injector = Container {
        name: INJECTOR_CONTAINER.to_string(),
        image: Some(settings.injector_image.to_string()),
        env: Some(vec![plain_env(ENV_TARGET_DIRECTORY, INJECTOR_TARGET_DIR)]),
        volume_mounts: Some(vec![VolumeMount {
            name: INJECTOR_VOLUME.to_string(),
            mount_path: INJECTOR_TARGET_DIR.to_string(),
            ..Default::default()
        }]),
        security_context: Some(restricted_security_context()),
        ..Default::default()
    };

    let proxy = Container {
        name: PROXY_CONTAINER.to_string(),
        image: Some(settings.proxy_image.to_string()),
        env: Some(vec![
            plain_env(ENV_ENDPOINT, &settings.proxy_endpoint),
            token_env.clone(),
        ]),
        security_context: Some(restricted_security_context()),
        ..Default::default()
    };

    let volume = Volume {
        name: INJECTOR_VOLUME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource {
            medium: None,
            size_limit: Some(Quantity(INJECTOR_VOLUME_SIZE_LIMIT.to_string())),
        }),
        ..Default::default()
    };

    let mut env_vars = vec![
        plain_env(ENV_LD_PRELOAD, LD_PRELOAD_PATH),
        plain_env(
            ENV_ENDPOINT,
            &format!("{}{}", settings.proxy_endpoint, OTLP_TRACES_PATH),
        ),
        token_env,
    ];
    env_vars.sort_by(|a, b| a.name.cmp(&b.name));

    let mut add_containers = vec![proxy];
    add_containers.sort_by(|a, b| a.name.cmp(&b.name));

    InjectionPlan {
        kind: PlanKind::Inject,
        add_init_containers: vec![injector],
        add_containers,
        add_volumes: vec![volume],
        env_vars,
        volume_mounts: vec![VolumeMount {
            name: INJECTOR_VOLUME.to_string(),
            mount_path: INJECTOR_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }],
        marker: Some(settings.marker()),
        ..Default::default()
    }
}

fn plain_env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

fn restricted_security_context() -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        read_only_root_filesystem: Some(true),
        ..Default::default()
    }
}
