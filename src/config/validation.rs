use std::path::Path;

use figment::{Figment, providers::{Env, Format, Serialized, Toml}};
use garde::Validate;

use super::GateConfig;
use crate::error::AppError;

/// Prefix for environment overrides, e.g. `GATE_CACHE__TTL_SECONDS=60`
pub const ENV_PREFIX: &str = "GATE_";

/// Build the layered configuration source
///
/// Precedence, lowest first: embedded defaults, the TOML file when given,
/// then `GATE_`-prefixed environment variables.
pub fn config_figment(path: Option<&Path>) -> Figment {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(GateConfig::default()));

    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }

    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate configuration
pub fn load_config(path: Option<&Path>) -> Result<GateConfig, AppError> {
    let config: GateConfig = config_figment(path).extract()?;

    config.validate()?;

    Ok(config)
}
