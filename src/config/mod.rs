mod defaults;
mod effective;

pub use defaults::BuiltinDefaults;
pub use effective::{CliOverrides, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
