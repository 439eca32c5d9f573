// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for mocking Kubernetes API responses and an in-memory cluster.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use http::{Request, Response};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, Time};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::client::Body;
use kube::core::ErrorResponse;
use kube::{Client, ResourceExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tower::Service;

use crate::error::{OperatorError, Result};
use crate::kubernetes::ClusterApi;
use crate::token::SecretLookup;
use crate::types::lumigo::Credentials;
use crate::types::{Lumigo, LumigoSpec, LumigoStatus, SecretReference, Workload, WorkloadKind};

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    /// Add a response for PATCH requests matching the exact path
    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, status, body)
    }

    /// Add a response for PUT requests matching the exact path
    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PUT", path, status, body)
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
        self
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "https://kubernetes.default.svc")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();
        responses
            .get(&(method.to_string(), path.to_string()))
            .cloned()
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let response = self.find_response(&method, &path);

        Box::pin(async move {
            let (status, body) = response.unwrap_or_else(|| {
                // Default 404 for unmatched requests
                (404, not_found_json("resource", &path))
            });
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

pub fn secret_json(namespace: &str, name: &str, key: &str, value: &str) -> String {
    serde_json::to_string(&secret(namespace, name, key, value)).unwrap()
}

pub fn lumigo_json(namespace: &str, name: &str) -> String {
    let mut lumigo = lumigo(namespace, name);
    lumigo.metadata.resource_version = Some("1".to_string());
    serde_json::to_string(&lumigo).unwrap()
}

pub fn secret(namespace: &str, name: &str, key: &str, value: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            key.to_string(),
            ByteString(value.as_bytes().to_vec()),
        )])),
        ..Default::default()
    }
}

/// A Lumigo instance referencing the `token` key of the `lumigo-credentials` secret
pub fn lumigo(namespace: &str, name: &str) -> Lumigo {
    let mut lumigo = Lumigo::new(
        name,
        LumigoSpec {
            lumigo_token: Credentials {
                secret_ref: SecretReference {
                    name: "lumigo-credentials".to_string(),
                    key: "token".to_string(),
                },
            },
            tracing: Default::default(),
        },
    );
    lumigo.metadata.namespace = Some(namespace.to_string());
    lumigo
}

/// A single-container deployment
pub fn deployment(namespace: &str, name: &str) -> Workload {
    let labels = BTreeMap::from([("deployment".to_string(), name.to_string())]);
    Workload::Deployment(Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "myapp".to_string(),
                        image: Some("busybox".to_string()),
                        command: Some(vec!["sh".to_string(), "-c".to_string()]),
                        args: Some(vec!["echo \"Hello, world!\"; sleep 60".to_string()]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    })
}

type Key = (String, String);

#[derive(Default)]
struct ClusterState {
    lumigos: BTreeMap<Key, Lumigo>,
    secrets: BTreeMap<Key, Secret>,
    workloads: BTreeMap<(String, WorkloadKind, String), Workload>,
    version: u64,
    injected_conflicts: u32,
    workload_updates: u32,
}

impl ClusterState {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// In-memory [`ClusterApi`] with resource versions and finalizer semantics.
///
/// Writes carrying a stale resource version fail with a conflict, like the API server.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap()
    }

    /// Store a Lumigo instance; instances are created one second apart unless a
    /// creation timestamp is set already.
    pub fn create_lumigo(&self, mut lumigo: Lumigo) -> Lumigo {
        let mut state = self.state();
        let version = state.next_version();
        lumigo.metadata.resource_version = Some(version.clone());
        lumigo.metadata.uid = Some(format!("uid-{}", version));
        if lumigo.metadata.creation_timestamp.is_none() {
            let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
            lumigo.metadata.creation_timestamp =
                Some(Time(base + chrono::Duration::seconds(state.version as i64)));
        }
        let key = (lumigo.namespace().unwrap_or_default(), lumigo.name_any());
        state.lumigos.insert(key, lumigo.clone());
        lumigo
    }

    pub fn lumigo(&self, namespace: &str, name: &str) -> Option<Lumigo> {
        self.state()
            .lumigos
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn lumigo_status(&self, namespace: &str, name: &str) -> Option<LumigoStatus> {
        self.lumigo(namespace, name).and_then(|l| l.status)
    }

    /// Delete like the API server: objects with finalizers only get a deletion timestamp
    pub fn delete_lumigo(&self, namespace: &str, name: &str) {
        let mut state = self.state();
        let version = state.next_version();
        let key = (namespace.to_string(), name.to_string());
        let Some(lumigo) = state.lumigos.get_mut(&key) else {
            return;
        };
        if lumigo.finalizers().is_empty() {
            state.lumigos.remove(&key);
        } else {
            lumigo.metadata.deletion_timestamp = Some(Time(Utc::now()));
            lumigo.metadata.resource_version = Some(version);
        }
    }

    pub fn put_secret(&self, namespace: &str, name: &str, key: &str, value: &str) {
        self.state().secrets.insert(
            (namespace.to_string(), name.to_string()),
            secret(namespace, name, key, value),
        );
    }

    pub fn put_workload(&self, mut workload: Workload) -> Workload {
        let mut state = self.state();
        workload.meta_mut().resource_version = Some(state.next_version());
        let key = (
            workload.namespace().to_string(),
            workload.kind(),
            workload.name().to_string(),
        );
        state.workloads.insert(key, workload.clone());
        workload
    }

    pub fn workload(&self, namespace: &str, kind: WorkloadKind, name: &str) -> Option<Workload> {
        self.state()
            .workloads
            .get(&(namespace.to_string(), kind, name.to_string()))
            .cloned()
    }

    /// Make the next `count` workload updates fail as if another writer got there first
    pub fn inject_workload_conflicts(&self, count: u32) {
        self.state().injected_conflicts = count;
    }

    /// Number of successful workload updates so far
    pub fn workload_updates(&self) -> u32 {
        self.state().workload_updates
    }
}

fn not_found(what: &str) -> OperatorError {
    OperatorError::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} not found", what),
        reason: "NotFound".to_string(),
        code: 404,
    }))
}

fn check_version(current: Option<&String>, requested: Option<&String>, what: &str) -> Result<()> {
    match requested {
        Some(requested) if Some(requested) != current => {
            Err(OperatorError::Conflict(what.to_string()))
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl SecretLookup for FakeCluster {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self
            .state()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_lumigo(&self, namespace: &str, name: &str) -> Result<Option<Lumigo>> {
        Ok(self.lumigo(namespace, name))
    }

    async fn list_lumigos(&self, namespace: &str) -> Result<Vec<Lumigo>> {
        Ok(self
            .state()
            .lumigos
            .values()
            .filter(|l| l.namespace().as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn update_status(&self, lumigo: &Lumigo, status: &LumigoStatus) -> Result<Lumigo> {
        let mut state = self.state();
        let version = state.next_version();
        let stored = state
            .lumigos
            .get_mut(&(lumigo.namespace().unwrap_or_default(), lumigo.name_any()))
            .ok_or_else(|| not_found(&lumigo.key()))?;
        check_version(
            stored.metadata.resource_version.as_ref(),
            lumigo.metadata.resource_version.as_ref(),
            &lumigo.key(),
        )?;

        stored.status = Some(status.clone());
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn set_finalizers(&self, lumigo: &Lumigo, finalizers: Vec<String>) -> Result<Lumigo> {
        let mut state = self.state();
        let version = state.next_version();
        let key = (lumigo.namespace().unwrap_or_default(), lumigo.name_any());
        let stored = state
            .lumigos
            .get_mut(&key)
            .ok_or_else(|| not_found(&lumigo.key()))?;
        check_version(
            stored.metadata.resource_version.as_ref(),
            lumigo.metadata.resource_version.as_ref(),
            &lumigo.key(),
        )?;

        stored.metadata.finalizers = (!finalizers.is_empty()).then_some(finalizers);
        stored.metadata.resource_version = Some(version);
        let updated = stored.clone();
        if updated.is_being_deleted() && updated.finalizers().is_empty() {
            state.lumigos.remove(&key);
        }
        Ok(updated)
    }

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<Workload>> {
        Ok(self
            .state()
            .workloads
            .values()
            .filter(|w| w.namespace() == namespace)
            .cloned()
            .collect())
    }

    async fn get_workload(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> Result<Option<Workload>> {
        Ok(self.workload(namespace, kind, name))
    }

    async fn update_workload(&self, workload: &Workload) -> Result<Workload> {
        let mut state = self.state();
        let version = state.next_version();
        let conflict = state.injected_conflicts > 0;
        let key = (
            workload.namespace().to_string(),
            workload.kind(),
            workload.name().to_string(),
        );
        let stored = state
            .workloads
            .get_mut(&key)
            .ok_or_else(|| not_found(&workload.to_string()))?;

        if conflict {
            // Someone else updated the workload in the meantime
            stored.meta_mut().resource_version = Some(version);
            state.injected_conflicts -= 1;
            return Err(OperatorError::Conflict(workload.to_string()));
        }
        check_version(
            stored.meta().resource_version.as_ref(),
            workload.meta().resource_version.as_ref(),
            &workload.to_string(),
        )?;

        let mut updated = workload.clone();
        updated.meta_mut().resource_version = Some(version);
        *stored = updated.clone();
        state.workload_updates += 1;
        Ok(updated)
    }
}
