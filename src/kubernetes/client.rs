// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster access used by the reconciler and the admission hook

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::Secret;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::constants::OPERATOR_NAME;
use crate::error::{OperatorError, Result};
use crate::token::SecretLookup;
use crate::types::{Lumigo, LumigoStatus, Workload, WorkloadKind};

/// Everything the operator reads and writes in the cluster.
///
/// Writes are conditional on the resource version of the object passed in; a stale
/// version fails with [`OperatorError::Conflict`].
#[async_trait]
pub trait ClusterApi: SecretLookup {
    async fn get_lumigo(&self, namespace: &str, name: &str) -> Result<Option<Lumigo>>;

    async fn list_lumigos(&self, namespace: &str) -> Result<Vec<Lumigo>>;

    async fn update_status(&self, lumigo: &Lumigo, status: &LumigoStatus) -> Result<Lumigo>;

    async fn set_finalizers(&self, lumigo: &Lumigo, finalizers: Vec<String>) -> Result<Lumigo>;

    /// All workloads of every supported kind in the namespace
    async fn list_workloads(&self, namespace: &str) -> Result<Vec<Workload>>;

    async fn get_workload(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> Result<Option<Workload>>;

    async fn update_workload(&self, workload: &Workload) -> Result<Workload>;
}

/// [`ClusterApi`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn lumigos(&self, namespace: &str) -> Api<Lumigo> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn list_kind<K>(&self, namespace: &str, wrap: fn(K) -> Workload) -> Result<Vec<Workload>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.into_iter().map(wrap).collect())
    }

    async fn get_kind<K>(
        &self,
        namespace: &str,
        name: &str,
        wrap: fn(K) -> Workload,
    ) -> Result<Option<Workload>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.map(wrap))
    }

    async fn replace_kind<K>(&self, object: &K, wrap: fn(K) -> Workload) -> Result<Workload>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let namespace = object.namespace().unwrap_or_default();
        let name = object.name_any();
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        let params = PostParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        };

        api.replace(&name, &params, object)
            .await
            .map(wrap)
            .map_err(|e| conflict_or(e, format!("{}/{}", namespace, name)))
    }
}

#[async_trait]
impl SecretLookup for KubeClusterApi {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get_lumigo(&self, namespace: &str, name: &str) -> Result<Option<Lumigo>> {
        Ok(self.lumigos(namespace).get_opt(name).await?)
    }

    async fn list_lumigos(&self, namespace: &str) -> Result<Vec<Lumigo>> {
        Ok(self
            .lumigos(namespace)
            .list(&ListParams::default())
            .await?
            .items)
    }

    #[instrument(skip(self, lumigo, status), fields(lumigo = %lumigo.key()))]
    async fn update_status(&self, lumigo: &Lumigo, status: &LumigoStatus) -> Result<Lumigo> {
        let patch = json!({
            "metadata": { "resourceVersion": lumigo.resource_version() },
            "status": status,
        });
        debug!("Patching Lumigo status");

        self.lumigos(&lumigo.namespace().unwrap_or_default())
            .patch_status(
                &lumigo.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| conflict_or(e, lumigo.key()))
    }

    #[instrument(skip(self, lumigo), fields(lumigo = %lumigo.key()))]
    async fn set_finalizers(&self, lumigo: &Lumigo, finalizers: Vec<String>) -> Result<Lumigo> {
        let patch = json!({
            "metadata": {
                "resourceVersion": lumigo.resource_version(),
                "finalizers": finalizers,
            },
        });

        self.lumigos(&lumigo.namespace().unwrap_or_default())
            .patch(
                &lumigo.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| conflict_or(e, lumigo.key()))
    }

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<Workload>> {
        let mut workloads = Vec::new();
        for kind in WorkloadKind::ALL {
            let mut found = match kind {
                WorkloadKind::Deployment => {
                    self.list_kind::<Deployment>(namespace, Workload::Deployment)
                        .await?
                }
                WorkloadKind::DaemonSet => {
                    self.list_kind::<DaemonSet>(namespace, Workload::DaemonSet)
                        .await?
                }
                WorkloadKind::ReplicaSet => {
                    self.list_kind::<ReplicaSet>(namespace, Workload::ReplicaSet)
                        .await?
                }
                WorkloadKind::StatefulSet => {
                    self.list_kind::<StatefulSet>(namespace, Workload::StatefulSet)
                        .await?
                }
                WorkloadKind::Job => self.list_kind::<Job>(namespace, Workload::Job).await?,
                WorkloadKind::CronJob => {
                    self.list_kind::<CronJob>(namespace, Workload::CronJob)
                        .await?
                }
            };
            workloads.append(&mut found);
        }
        Ok(workloads)
    }

    async fn get_workload(
        &self,
        namespace: &str,
        kind: WorkloadKind,
        name: &str,
    ) -> Result<Option<Workload>> {
        match kind {
            WorkloadKind::Deployment => {
                self.get_kind::<Deployment>(namespace, name, Workload::Deployment)
                    .await
            }
            WorkloadKind::DaemonSet => {
                self.get_kind::<DaemonSet>(namespace, name, Workload::DaemonSet)
                    .await
            }
            WorkloadKind::ReplicaSet => {
                self.get_kind::<ReplicaSet>(namespace, name, Workload::ReplicaSet)
                    .await
            }
            WorkloadKind::StatefulSet => {
                self.get_kind::<StatefulSet>(namespace, name, Workload::StatefulSet)
                    .await
            }
            WorkloadKind::Job => self.get_kind::<Job>(namespace, name, Workload::Job).await,
            WorkloadKind::CronJob => {
                self.get_kind::<CronJob>(namespace, name, Workload::CronJob)
                    .await
            }
        }
    }

    #[instrument(skip(self, workload), fields(workload = %workload))]
    async fn update_workload(&self, workload: &Workload) -> Result<Workload> {
        debug!("Replacing workload");
        match workload {
            Workload::Deployment(w) => self.replace_kind(w, Workload::Deployment).await,
            Workload::DaemonSet(w) => self.replace_kind(w, Workload::DaemonSet).await,
            Workload::ReplicaSet(w) => self.replace_kind(w, Workload::ReplicaSet).await,
            Workload::StatefulSet(w) => self.replace_kind(w, Workload::StatefulSet).await,
            Workload::Job(w) => self.replace_kind(w, Workload::Job).await,
            Workload::CronJob(w) => self.replace_kind(w, Workload::CronJob).await,
        }
    }
}

/// Map HTTP 409 to [`OperatorError::Conflict`], keep anything else as a kube error
fn conflict_or(err: kube::Error, object: String) -> OperatorError {
    match err {
        kube::Error::Api(ref response) if response.code == 409 => OperatorError::Conflict(object),
        other => other.into(),
    }
}
