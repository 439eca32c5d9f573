// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resolution of the single authoritative Lumigo instance per namespace.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::info;

use crate::types::Lumigo;

/// Resolves which Lumigo instance of a namespace is authoritative.
///
/// Resolution is recomputed from the candidates on every call. The last answer per
/// namespace is kept only to log hand-overs.
#[derive(Debug, Default)]
pub struct NamespaceRegistry {
    last_resolved: Mutex<HashMap<String, String>>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the authoritative instance among `candidates`, if any.
    ///
    /// The earliest creation timestamp wins, ties are broken by name. Instances that
    /// are being deleted never win.
    pub fn resolve_authoritative(&self, namespace: &str, candidates: &[Lumigo]) -> Option<String> {
        let winner = candidates
            .iter()
            .filter(|l| l.namespace().as_deref() == Some(namespace))
            .filter(|l| !l.is_being_deleted())
            .min_by(|a, b| sort_key(a).cmp(&sort_key(b)))
            .map(|l| l.name_any());

        let mut last = self
            .last_resolved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match &winner {
            Some(name) => {
                let previous = last.insert(namespace.to_string(), name.clone());
                if previous.as_ref() != Some(name) {
                    info!(
                        namespace = %namespace,
                        previous = ?previous,
                        authoritative = %name,
                        "Authoritative Lumigo instance changed"
                    );
                }
            }
            None => {
                last.remove(namespace);
            }
        }

        winner
    }

    pub fn is_authoritative(&self, lumigo: &Lumigo, candidates: &[Lumigo]) -> bool {
        let namespace = lumigo.namespace().unwrap_or_default();
        self.resolve_authoritative(&namespace, candidates)
            .is_some_and(|name| name == lumigo.name_any())
    }

    /// Whether another instance that is not being deleted takes precedence over
    /// `lumigo`, whatever the state of `lumigo` itself.
    pub fn has_live_predecessor(&self, lumigo: &Lumigo, candidates: &[Lumigo]) -> bool {
        let own_key = sort_key(lumigo);
        candidates
            .iter()
            .filter(|l| l.namespace() == lumigo.namespace())
            .filter(|l| l.name_any() != lumigo.name_any() && !l.is_being_deleted())
            .any(|l| sort_key(l) < own_key)
    }
}

/// Missing timestamps sort after every real one
fn sort_key(lumigo: &Lumigo) -> (bool, Option<DateTime<Utc>>, String) {
    let created = lumigo.metadata.creation_timestamp.as_ref().map(|t| t.0);
    (created.is_none(), created, lumigo.name_any())
}
