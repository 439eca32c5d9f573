// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{GROUP, KIND, POLL_INTERVAL_SECS, VERSION};
use crate::error::{OperatorError, Result};
use crate::retry::poll_until;
use kube::{discovery::Discovery, Client};
use std::time::Duration;
use tracing::{info, warn};

/// Wait for the Lumigo CRD to become available in the cluster, for at most `timeout`.
pub async fn wait_for_lumigo_crd(client: &Client, timeout: Duration) -> Result<()> {
    let available = poll_until(timeout, Duration::from_secs(POLL_INTERVAL_SECS), || async move {
        match check_lumigo_crd_exists(client).await {
            Ok(true) => true,
            Ok(false) => {
                info!(
                    "Lumigo CRD ({}/{}) not yet available, retrying in {} seconds...",
                    GROUP, VERSION, POLL_INTERVAL_SECS
                );
                false
            }
            Err(e) => {
                warn!(
                    "Error checking for Lumigo CRD: {}, retrying in {} seconds...",
                    e, POLL_INTERVAL_SECS
                );
                false
            }
        }
    })
    .await;

    if !available {
        return Err(OperatorError::Timeout(timeout));
    }
    info!("Lumigo CRD ({}/{}) is available", GROUP, VERSION);
    Ok(())
}

/// Check if the Lumigo CRD exists by attempting to discover it.
async fn check_lumigo_crd_exists(client: &Client) -> Result<bool> {
    let discovery = Discovery::new(client.clone())
        .filter(&[GROUP])
        .run()
        .await?;

    for group in discovery.groups() {
        if group.name() == GROUP {
            for (ar, _) in group.recommended_resources() {
                if ar.kind == KIND && ar.version == VERSION {
                    return Ok(true);
                }
            }
        }
    }

    Ok(false)
}
