// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Telemetry
//!
//! Metric names emitted by the propagation engine and the permission
//! evaluator. Recording is a no-op until the host process installs a
//! `metrics` recorder (e.g. a Prometheus exporter).

use metrics::counter;

pub const MEMBERSHIPS_ADDED: &str = "veil_acg_memberships_added_total";
pub const MEMBERSHIPS_REMOVED: &str = "veil_acg_memberships_removed_total";
pub const EDGES_LINKED: &str = "veil_acg_edges_linked_total";
pub const EDGES_UNLINKED: &str = "veil_acg_edges_unlinked_total";
pub const PERMISSION_CHECKS: &str = "veil_permission_checks_total";

pub fn record_memberships_added(count: u64, direct: bool) {
    if count > 0 {
        counter!(MEMBERSHIPS_ADDED, "direct" => direct.to_string()).increment(count);
    }
}

pub fn record_memberships_removed(count: u64, direct: bool) {
    if count > 0 {
        counter!(MEMBERSHIPS_REMOVED, "direct" => direct.to_string()).increment(count);
    }
}

pub fn record_edge_linked() {
    counter!(EDGES_LINKED).increment(1);
}

pub fn record_edge_unlinked() {
    counter!(EDGES_UNLINKED).increment(1);
}

pub fn record_permission_check(check: &'static str, allowed: bool) {
    let outcome = if allowed { "allow" } else { "deny" };
    counter!(PERMISSION_CHECKS, "check" => check, "outcome" => outcome).increment(1);
}
