/// `load_config` module: Loads a static YAML config and validates it into the core's [`Config`].
///
/// This module is the only place where untrusted YAML is parsed and mapped to strongly-typed
/// internal structs.
///
/// # Responsibilities
/// - Parse the user-supplied YAML configuration file into type-safe Rust structs
/// - Fill in defaults for the optional `api` and `settings` sections
/// - Reject configs the core cannot run (see [`Config::validate`])
///
/// Secrets never live in the YAML file. The access token is read from the environment by
/// [`crate::gateway::HttpGateway::new_from_env`], and only by commands that need it.
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich diagnostics, and are surfaced at the CLI boundary.
use anyhow::Result;
use diversion_sync_core::config::Config;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: Config = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Err(e) = config.validate() {
        error!(error = %e, config_path = ?path_ref, "Config failed validation");
        return Err(anyhow::anyhow!("Invalid config {:?}: {e}", path_ref));
    }

    config.trace_loaded();
    Ok(config)
}
