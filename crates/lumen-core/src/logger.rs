//! Logger subsystem.
//!
//! Everything in the engine logs through the `log` facade. This module only
//! decides which backend receives the records.

use crate::error::LmError;
use crate::json::{self, Json};
use anyhow::Result;
use log::LevelFilter;

pub const DEFAULT_TYPE: &str = "logger::default";

pub fn init(kind: &str, prop: &Json) -> Result<()> {
    match kind {
        DEFAULT_TYPE => {
            let level: String = json::value_or(prop, "level", "info".to_string())?;
            let filter = parse_level(&level)?;
            let installed = env_logger::Builder::new()
                .filter_level(filter)
                .format_target(false)
                .try_init()
                .is_ok();
            if !installed {
                log::debug!("logger backend already installed; only adjusting level");
            }
            log::set_max_level(filter);
            Ok(())
        }
        _ => Err(LmError::NotFound(format!("logger [{kind}]")).into()),
    }
}

pub fn shutdown() {
    log::set_max_level(LevelFilter::Off);
}

pub fn parse_level(level: &str) -> Result<LevelFilter> {
    level
        .parse::<LevelFilter>()
        .map_err(|_| LmError::InvalidArgument(format!("unknown log level [{level}]")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_level_names() {
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level("WARN").unwrap(), LevelFilter::Warn);
        assert!(parse_level("loud").is_err());
    }

    #[test]
    fn unknown_logger_is_rejected() {
        assert!(init("logger::jupyter", &json!({})).is_err());
    }
}
