// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Veil CLI

pub mod config;
pub mod group;
pub mod update;

pub use self::config::ConfigCommand;
pub use self::group::GroupCommand;
pub use self::update::UpdateCommand;
