// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Lumigo reconciler - owns the lifecycle and status of Lumigo instances and drives
//! instrumentation of the workloads in their namespace.

use crate::conditions;
use crate::config::Config;
use crate::constants::{reasons, FINALIZER};
use crate::error::{OperatorError, Result};
use crate::kubernetes::{ClusterApi, KubeClusterApi};
use crate::mutation::InjectionSettings;
use crate::reconcilers::workloads::{self, InjectionMode};
use crate::registry::NamespaceRegistry;
use crate::retry::Backoff;
use crate::token::{self, TokenError};
use crate::types::{Lumigo, LumigoStatus};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::Secret;
use kube::{
    runtime::{
        controller::Action,
        reflector::{ObjectRef, Store},
        Controller,
    },
    Api, Client, Resource, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// Shared state of all reconciles
pub struct Context {
    pub api: Arc<dyn ClusterApi>,
    pub config: Config,
    pub registry: NamespaceRegistry,
}

impl Context {
    pub fn new(api: Arc<dyn ClusterApi>, config: Config) -> Self {
        Self {
            api,
            config,
            registry: NamespaceRegistry::new(),
        }
    }
}

pub struct LumigoReconciler {
    client: Client,
    config: Config,
}

impl LumigoReconciler {
    pub fn new(client: Client, config: Config) -> Self {
        Self { client, config }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let lumigos: Api<Lumigo> = Api::all(self.client.clone());
        let controller = Controller::new(lumigos.clone(), WatcherConfig::default());
        let store = controller.store();
        let context = Arc::new(Context::new(
            Arc::new(KubeClusterApi::new(self.client.clone())),
            self.config,
        ));

        let secret_store = store.clone();
        let sibling_store = store.clone();

        controller
            .watches(
                Api::<Secret>::all(self.client.clone()),
                WatcherConfig::default(),
                move |secret| referencing_secret(&secret_store.state(), &secret),
            )
            .watches(lumigos, WatcherConfig::default(), move |lumigo| {
                siblings(&sibling_store.state(), &lumigo)
            })
            .watches(
                Api::<Deployment>::all(self.client.clone()),
                WatcherConfig::default(),
                in_namespace_of::<Deployment>(store.clone()),
            )
            .watches(
                Api::<DaemonSet>::all(self.client.clone()),
                WatcherConfig::default(),
                in_namespace_of::<DaemonSet>(store.clone()),
            )
            .watches(
                Api::<ReplicaSet>::all(self.client.clone()),
                WatcherConfig::default(),
                in_namespace_of::<ReplicaSet>(store.clone()),
            )
            .watches(
                Api::<StatefulSet>::all(self.client.clone()),
                WatcherConfig::default(),
                in_namespace_of::<StatefulSet>(store.clone()),
            )
            .watches(
                Api::<Job>::all(self.client.clone()),
                WatcherConfig::default(),
                in_namespace_of::<Job>(store.clone()),
            )
            .watches(
                Api::<CronJob>::all(self.client.clone()),
                WatcherConfig::default(),
                in_namespace_of::<CronJob>(store),
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled Lumigo: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

/// Lumigo instances whose token lives in `secret`
fn referencing_secret(lumigos: &[Arc<Lumigo>], secret: &Secret) -> Vec<ObjectRef<Lumigo>> {
    lumigos
        .iter()
        .filter(|l| l.namespace() == secret.namespace())
        .filter(|l| l.token_secret().name == secret.name_any())
        .map(|l| ObjectRef::from_obj(l.as_ref()))
        .collect()
}

/// The other Lumigo instances in the namespace of `lumigo`
fn siblings(lumigos: &[Arc<Lumigo>], lumigo: &Lumigo) -> Vec<ObjectRef<Lumigo>> {
    lumigos
        .iter()
        .filter(|l| l.namespace() == lumigo.namespace() && l.name_any() != lumigo.name_any())
        .map(|l| ObjectRef::from_obj(l.as_ref()))
        .collect()
}

fn in_namespace(lumigos: &[Arc<Lumigo>], namespace: Option<String>) -> Vec<ObjectRef<Lumigo>> {
    lumigos
        .iter()
        .filter(|l| l.namespace() == namespace)
        .map(|l| ObjectRef::from_obj(l.as_ref()))
        .collect()
}

/// Maps a workload event to the Lumigo instances of its namespace
fn in_namespace_of<K>(
    store: Store<Lumigo>,
) -> impl Fn(K) -> Vec<ObjectRef<Lumigo>> + Send + Sync + 'static
where
    K: Resource + 'static,
{
    move |workload: K| in_namespace(&store.state(), workload.meta().namespace.clone())
}

/// Reconcile one Lumigo instance, bounded by the configured timeout.
#[instrument(skip(lumigo, ctx), fields(lumigo = %lumigo.key()))]
pub async fn reconcile(lumigo: Arc<Lumigo>, ctx: Arc<Context>) -> Result<Action> {
    let limit = ctx.config.reconcile_timeout;
    timeout(limit, reconcile_lumigo(&lumigo, &ctx))
        .await
        .map_err(|_| OperatorError::Timeout(limit))?
}

async fn reconcile_lumigo(lumigo: &Lumigo, ctx: &Context) -> Result<Action> {
    let namespace = lumigo.namespace().unwrap_or_default();
    let name = lumigo.name_any();

    // The event may be stale; act on the live object only
    let Some(lumigo) = ctx.api.get_lumigo(&namespace, &name).await? else {
        debug!("Lumigo instance is gone, nothing to do");
        return Ok(Action::await_change());
    };

    if lumigo.is_being_deleted() {
        return handle_deletion(lumigo, ctx).await;
    }
    let lumigo = ensure_finalizer(lumigo, ctx).await?;

    let candidates = ctx.api.list_lumigos(&namespace).await?;
    if !ctx.registry.is_authoritative(&lumigo, &candidates) {
        debug!("Another Lumigo instance is authoritative in namespace {}", namespace);
        write_status(ctx, lumigo, |status, now| {
            conditions::set_error(
                status,
                reasons::MULTIPLE_INSTANCES,
                reasons::MULTIPLE_INSTANCES_MESSAGE,
                now,
            )
        })
        .await?;
        return Ok(Action::requeue(ctx.config.error_requeue));
    }

    let validation = token::validate(&*ctx.api, &namespace, lumigo.token_secret()).await;
    match validation {
        Ok(_) => {}
        Err(TokenError::Transient(e)) => return Err(e),
        Err(invalid) => {
            info!("Lumigo token of {} is invalid: {}", lumigo.key(), invalid);
            let message = invalid.to_string();
            write_status(ctx, lumigo, |status, now| {
                conditions::set_error(status, reasons::INVALID_CREDENTIALS, &message, now)
            })
            .await?;
            return Ok(Action::requeue(ctx.config.error_requeue));
        }
    }

    let activating = !conditions::is_active(lumigo.status.as_ref());
    let inject_existing = lumigo.injection_enabled() && lumigo.inject_into_existing_on_creation();
    let lumigo = write_status(ctx, lumigo, |status, now| {
        if !conditions::is_active(Some(&*status)) {
            // Workloads already in the namespace get instrumented once per activation
            status.existing_resources_instrumented = !inject_existing;
        }
        conditions::set_active(status, now);
    })
    .await?;
    if activating {
        info!("Lumigo instance {} is active", lumigo.key());
    }

    if !lumigo.injection_enabled() {
        return Ok(Action::requeue(ctx.config.resync_interval));
    }

    let full_injection = lumigo.inject_into_existing_on_creation()
        && !lumigo
            .status
            .as_ref()
            .is_some_and(|s| s.existing_resources_instrumented);
    if full_injection && predecessor_finalizing(&candidates, &lumigo) {
        debug!("Waiting for the previous Lumigo instance to finish removal");
        return Ok(Action::requeue(ctx.config.error_requeue));
    }

    let mode = if full_injection {
        InjectionMode::All
    } else {
        InjectionMode::MarkedOnly
    };
    let settings = InjectionSettings::new(&ctx.config, lumigo.token_secret().clone());
    let report = workloads::instrument_namespace(
        &*ctx.api,
        &settings,
        &namespace,
        mode,
        ctx.config.max_conflict_retries,
    )
    .await?;

    if report.failed > 0 {
        warn!(
            "Failed to instrument {} workloads in namespace {}",
            report.failed, namespace
        );
        return Ok(Action::requeue(ctx.config.error_requeue));
    }
    if full_injection {
        write_status(ctx, lumigo, |status, _| {
            status.existing_resources_instrumented = true;
        })
        .await?;
    }

    Ok(Action::requeue(ctx.config.resync_interval))
}

/// Whether another instance of the namespace is still removing its instrumentation
fn predecessor_finalizing(candidates: &[Lumigo], lumigo: &Lumigo) -> bool {
    candidates.iter().any(|l| {
        l.name_any() != lumigo.name_any() && l.is_being_deleted() && l.has_finalizer()
    })
}

#[instrument(skip(lumigo, ctx), fields(lumigo = %lumigo.key()))]
async fn handle_deletion(lumigo: Lumigo, ctx: &Context) -> Result<Action> {
    if !lumigo.has_finalizer() {
        return Ok(Action::await_change());
    }

    let namespace = lumigo.namespace().unwrap_or_default();
    let candidates = ctx.api.list_lumigos(&namespace).await?;
    // An instance preceded by a live sibling never owned the namespace's instrumentation
    let superseded = ctx.registry.has_live_predecessor(&lumigo, &candidates);
    if superseded {
        debug!("Another Lumigo instance owns the instrumentation, leaving workloads as they are");
    } else if lumigo.remove_on_deletion() {
        info!("Removing Lumigo from workloads in namespace {}", namespace);
        let report =
            workloads::revert_namespace(&*ctx.api, &namespace, ctx.config.max_conflict_retries)
                .await?;
        if report.failed > 0 {
            // Keep the finalizer until every workload is clean
            warn!("Failed to remove Lumigo from {} workloads", report.failed);
            return Ok(Action::requeue(ctx.config.error_requeue));
        }
    }

    remove_finalizer(lumigo, ctx).await?;
    Ok(Action::await_change())
}

async fn reload(ctx: &Context, lumigo: &Lumigo) -> Result<Lumigo> {
    ctx.api
        .get_lumigo(&lumigo.namespace().unwrap_or_default(), &lumigo.name_any())
        .await?
        .ok_or_else(|| OperatorError::Conflict(format!("{} was deleted", lumigo.key())))
}

async fn ensure_finalizer(mut lumigo: Lumigo, ctx: &Context) -> Result<Lumigo> {
    let mut backoff = Backoff::for_conflicts();
    let mut attempt = 0;

    while !lumigo.has_finalizer() {
        let mut finalizers = lumigo.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());

        match ctx.api.set_finalizers(&lumigo, finalizers).await {
            Ok(updated) => {
                debug!("Added finalizer to {}", updated.key());
                lumigo = updated;
            }
            Err(e) if e.is_conflict() && attempt < ctx.config.max_conflict_retries => {
                attempt += 1;
                backoff.wait().await;
                lumigo = reload(ctx, &lumigo).await?;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(lumigo)
}

async fn remove_finalizer(mut lumigo: Lumigo, ctx: &Context) -> Result<()> {
    let mut backoff = Backoff::for_conflicts();
    let mut attempt = 0;
    let key = lumigo.key();

    loop {
        let finalizers: Vec<String> = lumigo
            .finalizers()
            .iter()
            .filter(|f| *f != FINALIZER)
            .cloned()
            .collect();

        match ctx.api.set_finalizers(&lumigo, finalizers).await {
            Ok(_) => break,
            Err(e) if e.is_conflict() && attempt < ctx.config.max_conflict_retries => {
                attempt += 1;
                backoff.wait().await;
                match ctx
                    .api
                    .get_lumigo(&lumigo.namespace().unwrap_or_default(), &lumigo.name_any())
                    .await?
                {
                    Some(fresh) if fresh.has_finalizer() => lumigo = fresh,
                    _ => break,
                }
            }
            Err(e) => return Err(e),
        }
    }

    info!("Lumigo instance {} released", key);
    Ok(())
}

/// Apply `update` to the status and persist it, re-reading the instance on conflicts.
///
/// A status that only differs in `lastUpdateTime` is written at most once per
/// refresh interval on purpose: every status write triggers the Lumigo watch, and
/// refreshing it on each reconcile would keep the instance reconciling in a loop.
async fn write_status<F>(ctx: &Context, mut lumigo: Lumigo, update: F) -> Result<Lumigo>
where
    F: Fn(&mut LumigoStatus, DateTime<Utc>),
{
    let mut backoff = Backoff::for_conflicts();
    let mut attempt = 0;

    loop {
        let current = lumigo.status.clone().unwrap_or_default();
        let mut desired = current.clone();
        let now = Utc::now();
        update(&mut desired, now);

        if conditions::same_state(&current, &desired) && !refresh_due(ctx, &current, now) {
            return Ok(lumigo);
        }

        match ctx.api.update_status(&lumigo, &desired).await {
            Ok(updated) => return Ok(updated),
            Err(e) if e.is_conflict() && attempt < ctx.config.max_conflict_retries => {
                attempt += 1;
                backoff.wait().await;
                lumigo = reload(ctx, &lumigo).await?;
            }
            Err(e) => return Err(e),
        }
    }
}

fn refresh_due(ctx: &Context, status: &LumigoStatus, now: DateTime<Utc>) -> bool {
    match conditions::last_update(status) {
        Some(last) => (now - last)
            .to_std()
            .is_ok_and(|age| age >= ctx.config.status_refresh_interval),
        None => true,
    }
}

pub fn error_policy(lumigo: Arc<Lumigo>, error: &OperatorError, ctx: Arc<Context>) -> Action {
    error!("Reconciliation error for Lumigo {}: {}", lumigo.key(), error);
    Action::requeue(ctx.config.error_requeue)
}
