// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource, workload and image types.

pub mod image;
pub mod lumigo;
pub mod workload;

pub use image::ImageReference;
pub use lumigo::{
    Condition, ConditionState, ConditionType, Lumigo, LumigoSpec, LumigoStatus, SecretReference,
};
pub use workload::{Workload, WorkloadKind};
