//! Matrix transport for the alias bot.
//!
//! Provides the client-server API client that backs the provisioner's room
//! store and the long-poll sync runtime that feeds room events to the command
//! processor and the room-upgrade migration flow.

mod matrix_helpers;
pub mod matrix_runtime;

pub use matrix_runtime::{
    run_matrix_bridge, MatrixApiClient, MatrixBridgeRuntime, MatrixBridgeRuntimeConfig,
    MatrixClientSettings,
};
