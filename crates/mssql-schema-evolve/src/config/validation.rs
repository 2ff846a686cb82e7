//! Configuration validation.

use super::Config;
use crate::core::identifier::MAX_IDENTIFIER_LENGTH;
use crate::error::{EvolveError, Result};

/// Shortest identifier limit that leaves room for a truncation suffix.
const MIN_IDENTIFIER_LENGTH: usize = 16;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.target.host.is_empty() {
        return Err(EvolveError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(EvolveError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(EvolveError::Config("target.user is required".into()));
    }
    if config.target.schema.is_empty() {
        return Err(EvolveError::Config("target.schema is required".into()));
    }
    if config.target.pool_size == 0 {
        return Err(EvolveError::Config(
            "target.pool_size must be at least 1".into(),
        ));
    }

    let limit = config.evolve.max_identifier_length;
    if !(MIN_IDENTIFIER_LENGTH..=MAX_IDENTIFIER_LENGTH).contains(&limit) {
        return Err(EvolveError::Config(format!(
            "evolve.max_identifier_length must be between {} and {}, got {}",
            MIN_IDENTIFIER_LENGTH, MAX_IDENTIFIER_LENGTH, limit
        )));
    }

    if let Some(locale) = &config.evolve.default_locale {
        if locale.is_invariant() {
            return Err(EvolveError::Config(
                "evolve.default_locale cannot be empty".into(),
            ));
        }
    }

    for (alias, target) in &config.evolve.aliases {
        if alias.trim().is_empty() || target.trim().is_empty() {
            return Err(EvolveError::Config(format!(
                "evolve.aliases entry '{}: {}' is incomplete",
                alias, target
            )));
        }
    }

    Ok(())
}
