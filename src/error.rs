// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use thiserror::Error;

use crate::mutation::ApplyError;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Conflicting update: {0}")]
    Conflict(String),

    #[error("Reconcile did not complete within {0:?}")]
    Timeout(Duration),

    #[error("Injection failed: {0}")]
    InjectionError(#[from] ApplyError),
}

impl OperatorError {
    /// Optimistic-concurrency failures are resolved by re-reading and retrying.
    pub fn is_conflict(&self) -> bool {
        match self {
            OperatorError::Conflict(_) => true,
            OperatorError::KubeError(kube::Error::Api(err)) => err.code == 409,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, OperatorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> OperatorError {
        OperatorError::KubeError(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Conflict".to_string(),
            code,
        }))
    }

    #[test]
    fn test_is_conflict_for_conflict_variant() {
        assert!(OperatorError::Conflict("deployments ns/app".to_string()).is_conflict());
    }

    #[test]
    fn test_is_conflict_for_409_api_error() {
        assert!(api_error(409).is_conflict());
    }

    #[test]
    fn test_is_conflict_false_for_other_api_errors() {
        assert!(!api_error(500).is_conflict());
        assert!(!OperatorError::Timeout(Duration::from_secs(1)).is_conflict());
    }
}
