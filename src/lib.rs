//! The Promise/ResourceRequest reconciliation and Work-scheduling brain.

pub mod conditions;
pub mod config;
pub mod promise_controller;
pub mod registry;
pub mod requirements;
pub mod resource_controller;
pub mod webhook;
pub mod workflow;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{BuiltinDefaults, CliOverrides, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use promise_controller::{PromiseControllerContext, PromiseControllerError};
pub use registry::{DynamicControllerHandle, DynamicControllerRegistry, EnsureOutcome, RegistryError};
pub use resource_controller::{ResourceControllerContext, ResourceControllerError};
pub use workflow::WorkflowError;
