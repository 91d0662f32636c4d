// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Veil Core
//!
//! Access control groups (ACGs) for the Veil content platform: the policy data
//! model, the containment-graph propagation engine and the permission
//! evaluator that content controllers consult on every request.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Implements the privacy engine consumed by content controllers

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
