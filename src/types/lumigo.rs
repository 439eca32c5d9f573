// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

use crate::constants::FINALIZER;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, schemars::JsonSchema)]
#[kube(group = "operator.lumigo.io", version = "v1alpha1", kind = "Lumigo")]
#[kube(namespaced)]
#[kube(status = "LumigoStatus")]
#[serde(rename_all = "camelCase")]
pub struct LumigoSpec {
    pub lumigo_token: Credentials,
    #[serde(default)]
    pub tracing: TracingSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub secret_ref: SecretReference,
}

/// Reference to a key of a Secret in the same namespace as the Lumigo instance
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub struct SecretReference {
    pub name: String,
    pub key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TracingSpec {
    #[serde(default)]
    pub injection: InjectionSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InjectionSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inject_lumigo_into_existing_resources_on_creation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_lumigo_from_resources_on_deletion: Option<bool>,
}

impl Lumigo {
    /// Injection is on unless explicitly disabled
    pub fn injection_enabled(&self) -> bool {
        self.spec.tracing.injection.enabled.unwrap_or(true)
    }

    pub fn inject_into_existing_on_creation(&self) -> bool {
        self.spec
            .tracing
            .injection
            .inject_lumigo_into_existing_resources_on_creation
            .unwrap_or(true)
    }

    pub fn remove_on_deletion(&self) -> bool {
        self.spec
            .tracing
            .injection
            .remove_lumigo_from_resources_on_deletion
            .unwrap_or(true)
    }

    pub fn token_secret(&self) -> &SecretReference {
        &self.spec.lumigo_token.secret_ref
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    /// `namespace/name`, for log lines and error messages
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or_default(), self.name_any())
    }
}

/// Status of a Lumigo instance.
///
/// The Active and Error conditions live in dedicated fields, so there can never be
/// more than one condition of a given type. Both fields serialize as `null` when
/// unset, which lets a merge patch clear a condition.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LumigoStatus {
    #[serde(default)]
    pub active_condition: Option<Condition>,
    #[serde(default)]
    pub error_condition: Option<Condition>,
    /// Derived from `active_condition`
    #[serde(default)]
    pub active: bool,
    /// Set once the workloads that existed when the instance became active have all
    /// been instrumented (or there was nothing to instrument)
    #[serde(default)]
    pub existing_resources_instrumented: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionState,
    pub reason: String,
    pub message: String,
    pub last_update_time: DateTime<Utc>,
    pub last_transition_time: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum ConditionType {
    Active,
    Error,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, schemars::JsonSchema)]
pub enum ConditionState {
    True,
    False,
    Unknown,
}
