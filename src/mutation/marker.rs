// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Provenance marker stamped on instrumented pod templates.

use k8s_openapi::api::core::v1::PodTemplateSpec;
use serde::{Deserialize, Serialize};

use crate::constants::{annotations, labels};

/// Records which operator build instrumented a pod template
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceMarker {
    pub operator_version: String,
    pub injector_image: String,
    #[serde(default)]
    pub proxy_image: String,
    pub proxy_endpoint: String,
}

/// Whether any part of the marker is on the template, readable or not
pub fn is_present(template: &PodTemplateSpec) -> bool {
    let Some(meta) = template.metadata.as_ref() else {
        return false;
    };
    meta.labels
        .as_ref()
        .is_some_and(|l| l.contains_key(labels::INSTRUMENTED))
        || meta
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(annotations::INSTRUMENTATION))
}

/// The marker, if present and readable
pub fn read(template: &PodTemplateSpec) -> Option<ProvenanceMarker> {
    template
        .metadata
        .as_ref()
        .and_then(|m| m.annotations.as_ref())
        .and_then(|a| a.get(annotations::INSTRUMENTATION))
        .and_then(|raw| serde_json::from_str(raw).ok())
}

pub fn stamp(template: &mut PodTemplateSpec, marker: &ProvenanceMarker) -> serde_json::Result<()> {
    let encoded = serde_json::to_string(marker)?;
    let meta = template.metadata.get_or_insert_with(Default::default);
    meta.labels
        .get_or_insert_with(Default::default)
        .insert(labels::INSTRUMENTED.to_string(), "true".to_string());
    meta.annotations
        .get_or_insert_with(Default::default)
        .insert(annotations::INSTRUMENTATION.to_string(), encoded);
    Ok(())
}

/// Remove the marker, leaving no empty maps behind
pub fn remove(template: &mut PodTemplateSpec) {
    let Some(meta) = template.metadata.as_mut() else {
        return;
    };
    if let Some(l) = meta.labels.as_mut() {
        l.remove(labels::INSTRUMENTED);
        if l.is_empty() {
            meta.labels = None;
        }
    }
    if let Some(a) = meta.annotations.as_mut() {
        a.remove(annotations::INSTRUMENTATION);
        if a.is_empty() {
            meta.annotations = None;
        }
    }
}
