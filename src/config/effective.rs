//! Layers built-in defaults under environment variables under CLI flags into
//! one [`EffectiveConfig`], recording the [`ConfigOrigin`] of each field.

use std::time::Duration;

use kratix_types::constants::env;
use thiserror::Error;

use super::defaults::BuiltinDefaults;

/// Where a given field's effective value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    Builtin,
    Env,
    Cli,
}

/// A value paired with the layer that produced it.
#[derive(Debug, Clone)]
pub struct ConfigSource<T> {
    pub value: T,
    pub origin: ConfigOrigin,
}

impl<T> ConfigSource<T> {
    fn builtin(value: T) -> Self {
        Self { value, origin: ConfigOrigin::Builtin }
    }
}

/// CLI overrides, as parsed by `clap` in `main.rs`. `None` means "not passed".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub namespace: Option<String>,
    pub webhook_port: Option<u16>,
    pub health_port: Option<u16>,
    pub work_creator_image: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no work-creator image configured: pass --work-creator-image or set {}", env::WORK_CREATOR_IMAGE)]
    MissingWorkCreatorImage,
}

/// Fully layered configuration for the manager process.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub system_namespace: ConfigSource<String>,
    pub webhook_port: ConfigSource<u16>,
    pub health_port: ConfigSource<u16>,
    pub work_creator_image: ConfigSource<String>,
    pub default_requeue: ConfigSource<Duration>,
    pub fast_requeue: ConfigSource<Duration>,
}

impl EffectiveConfig {
    /// Layer defaults < env vars < CLI flags.
    pub fn build(cli: CliOverrides) -> Result<Self, ConfigError> {
        let defaults = BuiltinDefaults::default();

        let mut system_namespace = ConfigSource::builtin(defaults.system_namespace);
        if let Ok(v) = std::env::var(env::SYSTEM_NAMESPACE) {
            system_namespace = ConfigSource { value: v, origin: ConfigOrigin::Env };
        }
        if let Some(v) = cli.namespace {
            system_namespace = ConfigSource { value: v, origin: ConfigOrigin::Cli };
        }

        let mut webhook_port = ConfigSource::builtin(defaults.webhook_port);
        if let Some(v) = cli.webhook_port {
            webhook_port = ConfigSource { value: v, origin: ConfigOrigin::Cli };
        }

        let mut health_port = ConfigSource::builtin(defaults.health_port);
        if let Some(v) = cli.health_port {
            health_port = ConfigSource { value: v, origin: ConfigOrigin::Cli };
        }

        let mut work_creator_image: Option<ConfigSource<String>> = std::env::var(env::WORK_CREATOR_IMAGE)
            .ok()
            .map(|v| ConfigSource { value: v, origin: ConfigOrigin::Env });
        if let Some(v) = cli.work_creator_image {
            work_creator_image = Some(ConfigSource { value: v, origin: ConfigOrigin::Cli });
        }
        let work_creator_image = work_creator_image.ok_or(ConfigError::MissingWorkCreatorImage)?;

        Ok(Self {
            system_namespace,
            webhook_port,
            health_port,
            work_creator_image,
            default_requeue: ConfigSource::builtin(defaults.default_requeue),
            fast_requeue: ConfigSource::builtin(defaults.fast_requeue),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_work_creator_image_is_an_error() {
        std::env::remove_var(env::WORK_CREATOR_IMAGE);
        let err = EffectiveConfig::build(CliOverrides::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingWorkCreatorImage));
    }

    #[test]
    fn cli_overrides_win_over_defaults() {
        let cli = CliOverrides {
            namespace: Some("custom-ns".to_string()),
            work_creator_image: Some("example.com/wc:latest".to_string()),
            ..Default::default()
        };
        let cfg = EffectiveConfig::build(cli).unwrap();
        assert_eq!(cfg.system_namespace.value, "custom-ns");
        assert_eq!(cfg.system_namespace.origin, ConfigOrigin::Cli);
        assert_eq!(cfg.work_creator_image.value, "example.com/wc:latest");
    }
}
