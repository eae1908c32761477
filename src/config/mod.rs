use serde::Deserialize;
use std::env;

use crate::error::Error;
use crate::models::ValidationMode;
use crate::store::Dsn;

/// Store configuration, loaded from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Connection descriptor, e.g. `sqlite3://identity.db?readonly=false`.
    pub uri: String,
    pub environment: Environment,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    /// OIDC redirect-URI strictness implied by the environment.
    pub fn validation_mode(&self) -> ValidationMode {
        match self {
            Environment::Dev => ValidationMode::Debug,
            Environment::Prod => ValidationMode::Production,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, Error> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| Error::Config(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = StoreConfig {
            environment,
            uri: get_env("STORE_URI", Some("sqlite3://identity.db"), is_prod)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Configuration for an explicit URI, defaulting to the dev environment.
    pub fn new(uri: impl Into<String>) -> Self {
        StoreConfig {
            uri: uri.into(),
            environment: Environment::Dev,
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    fn validate(&self) -> Result<(), Error> {
        // Fail at load time rather than on first use.
        let dsn = Dsn::parse(&self.uri)?;
        if self.environment == Environment::Prod && dsn.is_memory() {
            tracing::error!(
                "In-memory store configured in production - data will not survive a restart"
            );
        }
        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, Error> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(Error::Config(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(Error::Config(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!("DEV".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Prod);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn validation_mode_follows_environment() {
        assert_eq!(Environment::Dev.validation_mode(), ValidationMode::Debug);
        assert_eq!(Environment::Prod.validation_mode(), ValidationMode::Production);
    }

    #[test]
    fn new_config_keeps_the_uri() {
        let config = StoreConfig::new("mock://");
        assert_eq!(config.uri, "mock://");
        assert_eq!(config.environment, Environment::Dev);
    }

    #[test]
    fn validate_rejects_malformed_uris() {
        assert!(StoreConfig::new("not a uri").validate().is_err());
        assert!(StoreConfig::new("sqlite3://identity.db").validate().is_ok());
    }
}
