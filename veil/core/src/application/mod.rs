// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod lifecycle;
pub mod propagation;
pub mod containment;
pub mod permission;
pub mod privacy_service;

// Re-export services for convenience
pub use permission::PermissionEvaluator;
pub use privacy_service::{PrivacyService, StandardPrivacyService};
