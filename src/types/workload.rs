// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The workload kinds the operator can instrument, behind one tagged variant.

use std::fmt;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::api::ObjectMeta;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorkloadKind {
    Deployment,
    DaemonSet,
    ReplicaSet,
    StatefulSet,
    Job,
    CronJob,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 6] = [
        WorkloadKind::Deployment,
        WorkloadKind::DaemonSet,
        WorkloadKind::ReplicaSet,
        WorkloadKind::StatefulSet,
        WorkloadKind::Job,
        WorkloadKind::CronJob,
    ];

    /// Pod templates of existing Jobs are immutable; Jobs are only instrumented at admission.
    pub fn supports_update(&self) -> bool {
        !matches!(self, WorkloadKind::Job)
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A workload with a mutable pod template
#[derive(Clone, Debug, PartialEq)]
pub enum Workload {
    Deployment(Deployment),
    DaemonSet(DaemonSet),
    ReplicaSet(ReplicaSet),
    StatefulSet(StatefulSet),
    Job(Job),
    CronJob(CronJob),
}

impl Workload {
    pub fn kind(&self) -> WorkloadKind {
        match self {
            Workload::Deployment(_) => WorkloadKind::Deployment,
            Workload::DaemonSet(_) => WorkloadKind::DaemonSet,
            Workload::ReplicaSet(_) => WorkloadKind::ReplicaSet,
            Workload::StatefulSet(_) => WorkloadKind::StatefulSet,
            Workload::Job(_) => WorkloadKind::Job,
            Workload::CronJob(_) => WorkloadKind::CronJob,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Workload::Deployment(w) => &w.metadata,
            Workload::DaemonSet(w) => &w.metadata,
            Workload::ReplicaSet(w) => &w.metadata,
            Workload::StatefulSet(w) => &w.metadata,
            Workload::Job(w) => &w.metadata,
            Workload::CronJob(w) => &w.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Workload::Deployment(w) => &mut w.metadata,
            Workload::DaemonSet(w) => &mut w.metadata,
            Workload::ReplicaSet(w) => &mut w.metadata,
            Workload::StatefulSet(w) => &mut w.metadata,
            Workload::Job(w) => &mut w.metadata,
            Workload::CronJob(w) => &mut w.metadata,
        }
    }

    pub fn pod_template(&self) -> Option<&PodTemplateSpec> {
        match self {
            Workload::Deployment(w) => w.spec.as_ref().map(|s| &s.template),
            Workload::DaemonSet(w) => w.spec.as_ref().map(|s| &s.template),
            Workload::ReplicaSet(w) => w.spec.as_ref().and_then(|s| s.template.as_ref()),
            Workload::StatefulSet(w) => w.spec.as_ref().map(|s| &s.template),
            Workload::Job(w) => w.spec.as_ref().map(|s| &s.template),
            Workload::CronJob(w) => w
                .spec
                .as_ref()
                .and_then(|s| s.job_template.spec.as_ref())
                .map(|s| &s.template),
        }
    }

    pub fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec> {
        match self {
            Workload::Deployment(w) => w.spec.as_mut().map(|s| &mut s.template),
            Workload::DaemonSet(w) => w.spec.as_mut().map(|s| &mut s.template),
            Workload::ReplicaSet(w) => w.spec.as_mut().and_then(|s| s.template.as_mut()),
            Workload::StatefulSet(w) => w.spec.as_mut().map(|s| &mut s.template),
            Workload::Job(w) => w.spec.as_mut().map(|s| &mut s.template),
            Workload::CronJob(w) => w
                .spec
                .as_mut()
                .and_then(|s| s.job_template.spec.as_mut())
                .map(|s| &mut s.template),
        }
    }

    /// Replace the pod template; returns false if the workload has no spec to hold one
    pub fn set_pod_template(&mut self, template: PodTemplateSpec) -> bool {
        match self.pod_template_mut() {
            Some(current) => {
                *current = template;
                true
            }
            None => false,
        }
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    /// Workloads controlled by another object (e.g. a ReplicaSet of a Deployment)
    /// are instrumented through their owner.
    pub fn is_owned(&self) -> bool {
        self.meta()
            .owner_references
            .as_ref()
            .is_some_and(|refs| refs.iter().any(|r| r.controller == Some(true)))
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.meta()
            .labels
            .as_ref()
            .and_then(|l| l.get(key))
            .map(|v| v.as_str())
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.meta()
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(|v| v.as_str())
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind(), self.namespace(), self.name())
    }
}
