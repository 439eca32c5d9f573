// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod conditions;
pub mod config;
pub mod constants;
pub mod error;
pub mod kubernetes;
pub mod mutation;
pub mod reconcilers;
pub mod registry;
pub mod retry;
pub mod token;
pub mod types;

#[cfg(test)]
pub mod test_utils;
