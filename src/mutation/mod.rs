// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Injection and removal of the Lumigo tracer in workload pod templates.
//!
//! The planner computes what has to change by looking only at the live pod template
//! and the desired settings. The engine applies that plan atomically on an in-memory
//! workload; persisting the result is up to the caller.

pub mod admission;
pub mod engine;
pub mod marker;
pub mod planner;

use thiserror::Error;

use crate::config::Config;
use crate::types::{ImageReference, SecretReference};

pub use admission::{admission_settings, mutate_on_admission};
pub use engine::{apply, revert, ApplyOutcome};
pub use marker::ProvenanceMarker;
pub use planner::{plan, plan_removal, InjectionPlan, PlanKind};

/// Everything needed to instrument a workload
#[derive(Clone, Debug, PartialEq)]
pub struct InjectionSettings {
    pub operator_version: String,
    pub injector_image: ImageReference,
    pub proxy_image: ImageReference,
    pub proxy_endpoint: String,
    pub token_secret: SecretReference,
}

impl InjectionSettings {
    pub fn new(config: &Config, token_secret: SecretReference) -> Self {
        Self {
            operator_version: config.operator_version.clone(),
            injector_image: config.injector_image.clone(),
            proxy_image: config.proxy_image.clone(),
            proxy_endpoint: config.proxy_endpoint.clone(),
            token_secret,
        }
    }

    /// The marker a workload converged on these settings carries
    pub fn marker(&self) -> ProvenanceMarker {
        ProvenanceMarker {
            operator_version: self.operator_version.clone(),
            injector_image: self.injector_image.to_string(),
            proxy_image: self.proxy_image.to_string(),
            proxy_endpoint: self.proxy_endpoint.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("{0} has no pod template")]
    MissingPodTemplate(String),

    #[error("'{0}' is reserved for Lumigo injection and already in use")]
    ReservedNameInUse(String),

    #[error("cannot record provenance marker: {0}")]
    Marker(#[from] serde_json::Error),
}
