//! Built-in defaults (layer 1 of [`super::EffectiveConfig`]).

use kratix_types::constants::DEFAULT_SYSTEM_NAMESPACE;
use std::time::Duration;

/// Built-in default configuration values.
#[derive(Debug, Clone)]
pub struct BuiltinDefaults {
    pub system_namespace: String,
    pub webhook_port: u16,
    pub health_port: u16,
    pub default_requeue: Duration,
    pub fast_requeue: Duration,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            system_namespace: DEFAULT_SYSTEM_NAMESPACE.to_string(),
            webhook_port: 8443,
            health_port: 8080,
            default_requeue: Duration::from_secs(5),
            fast_requeue: Duration::from_millis(200),
        }
    }
}
