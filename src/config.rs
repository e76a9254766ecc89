use crate::domain::Decimal;
use crate::marketdata::moex::DEFAULT_BASE_URL;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub moex_api_url: String,
    pub moex_enabled: bool,
    pub market_data_timeout: Duration,
    /// Flat rate applied to taxable income, as a fraction (0.13 = 13%).
    pub tax_rate: Decimal,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let moex_api_url = env_map
            .get("MOEX_API_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let moex_enabled = match env_map
            .get("MOEX_ENABLED")
            .map(|s| s.as_str())
            .unwrap_or("true")
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "MOEX_ENABLED".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        let timeout_secs = env_map
            .get("MARKET_DATA_TIMEOUT_SECS")
            .map(|s| s.as_str())
            .unwrap_or("30")
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "MARKET_DATA_TIMEOUT_SECS".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let tax_rate = env_map
            .get("TAX_RATE")
            .map(|s| s.as_str())
            .unwrap_or("0.13")
            .parse::<Decimal>()
            .ok()
            .filter(|rate| !rate.is_negative() && *rate <= Decimal::one())
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "TAX_RATE".to_string(),
                    "must be a decimal between 0 and 1".to_string(),
                )
            })?;

        Ok(Config {
            port,
            database_path,
            moex_api_url,
            moex_enabled,
            market_data_timeout: Duration::from_secs(timeout_secs),
            tax_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.moex_api_url, "https://iss.moex.com/iss");
        assert!(config.moex_enabled);
        assert_eq!(config.market_data_timeout, Duration::from_secs(30));
        assert_eq!(config.tax_rate, Decimal::from_str_canonical("0.13").unwrap());
    }

    #[test]
    fn test_overrides() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "9000".to_string());
        env_map.insert("MOEX_ENABLED".to_string(), "false".to_string());
        env_map.insert("MARKET_DATA_TIMEOUT_SECS".to_string(), "5".to_string());
        env_map.insert("TAX_RATE".to_string(), "0.15".to_string());

        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.port, 9000);
        assert!(!config.moex_enabled);
        assert_eq!(config.market_data_timeout, Duration::from_secs(5));
        assert_eq!(config.tax_rate, Decimal::from_str_canonical("0.15").unwrap());
    }

    #[test]
    fn test_missing_database_path() {
        let result = Config::from_env_map(HashMap::new());
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_port() {
        let mut env_map = setup_required_env();
        env_map.insert("PORT".to_string(), "not_a_number".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "PORT"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_invalid_tax_rate() {
        for bad in ["13", "-0.1", "abc"] {
            let mut env_map = setup_required_env();
            env_map.insert("TAX_RATE".to_string(), bad.to_string());
            match Config::from_env_map(env_map) {
                Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "TAX_RATE"),
                other => panic!("Expected InvalidValue error for {bad}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_invalid_timeout_and_flag() {
        let mut env_map = setup_required_env();
        env_map.insert("MARKET_DATA_TIMEOUT_SECS".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(k, _)) if k == "MARKET_DATA_TIMEOUT_SECS"
        ));

        let mut env_map = setup_required_env();
        env_map.insert("MOEX_ENABLED".to_string(), "maybe".to_string());
        assert!(matches!(
            Config::from_env_map(env_map),
            Err(ConfigError::InvalidValue(k, _)) if k == "MOEX_ENABLED"
        ));
    }
}
