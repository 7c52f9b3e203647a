use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::fs;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["/etc/starshop/starshop.toml", "./starshop.toml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Clone, Deserialize)]
pub struct BotConfig {
    pub bot_token: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Sees the admin menu.
    #[serde(default)]
    pub admin_ids: Vec<i64>,
    /// May approve or reject payments. Falls back to `admin_ids` when empty.
    #[serde(default)]
    pub reviewer_ids: Vec<i64>,
    #[serde(default)]
    pub bot_username: Option<String>,
    #[serde(default = "default_support_contact")]
    pub support_contact: String,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub fulfillment: Option<FulfillmentConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    /// Price of one star in `currency`.
    pub star_rate: Decimal,
    pub currency: String,
    pub min_stars: i64,
    pub max_stars: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            star_rate: Decimal::new(145, 2),
            currency: "RUB".to_string(),
            min_stars: 50,
            max_stars: 100_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    #[serde(default = "default_manual_details")]
    pub manual_details: String,
    #[serde(default)]
    pub instant: InstantConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            manual_details: default_manual_details(),
            instant: InstantConfig::default(),
            crypto: CryptoConfig::default(),
        }
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct InstantConfig {
    pub api_url: Option<String>,
    pub shop_id: Option<String>,
    pub secret: Option<String>,
}

impl InstantConfig {
    pub fn is_configured(&self) -> bool {
        self.api_url.is_some() && self.shop_id.is_some() && self.secret.is_some()
    }
}

impl std::fmt::Debug for InstantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstantConfig")
            .field("api_url", &self.api_url)
            .field("shop_id", &self.shop_id)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct CryptoConfig {
    pub api_url: Option<String>,
    pub status_url: Option<String>,
    pub shop_id: Option<String>,
    pub api_key: Option<String>,
}

impl CryptoConfig {
    /// Crypto invoices are settled by polling, so the status endpoint is required.
    pub fn is_configured(&self) -> bool {
        self.api_url.is_some()
            && self.status_url.is_some()
            && self.shop_id.is_some()
            && self.api_key.is_some()
    }
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("api_url", &self.api_url)
            .field("status_url", &self.status_url)
            .field("shop_id", &self.shop_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct FulfillmentConfig {
    pub api_url: String,
    pub api_key: String,
}

fn default_database_url() -> String {
    "sqlite://data/starshop.db".to_string()
}

fn default_support_contact() -> String {
    "@support".to_string()
}

fn default_manual_details() -> String {
    "Bank transfer details are provided by the support team.".to_string()
}

impl BotConfig {
    /// Config file first (`STARSHOP_CONFIG`, then the default paths), then
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = env::var("STARSHOP_CONFIG") {
            let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            tracing::info!("Loading config from {}", path);
            return Self::from_toml_str(&contents);
        }

        for path in DEFAULT_CONFIG_PATHS {
            if let Ok(contents) = fs::read_to_string(path) {
                tracing::info!("Loading config from {}", path);
                return Self::from_toml_str(&contents);
            }
        }

        tracing::info!("Loading config from environment");
        Self::from_env()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: BotConfig = toml::from_str(contents)?;
        config.validate()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let defaults = PricingConfig::default();
        let pricing = PricingConfig {
            star_rate: parse_or("STAR_RATE", get("STAR_RATE"), defaults.star_rate)?,
            currency: get("CURRENCY").unwrap_or(defaults.currency),
            min_stars: parse_or("MIN_STARS", get("MIN_STARS"), defaults.min_stars)?,
            max_stars: parse_or("MAX_STARS", get("MAX_STARS"), defaults.max_stars)?,
        };

        let payments = PaymentsConfig {
            manual_details: get("MANUAL_PAYMENT_DETAILS").unwrap_or_else(default_manual_details),
            instant: InstantConfig {
                api_url: get("INSTANT_API_URL"),
                shop_id: get("INSTANT_SHOP_ID"),
                secret: get("INSTANT_SECRET"),
            },
            crypto: CryptoConfig {
                api_url: get("CRYPTO_API_URL"),
                status_url: get("CRYPTO_STATUS_URL"),
                shop_id: get("CRYPTO_SHOP_ID"),
                api_key: get("CRYPTO_API_KEY"),
            },
        };

        let fulfillment = match (get("FULFILLMENT_API_URL"), get("FULFILLMENT_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(FulfillmentConfig { api_url, api_key }),
            _ => None,
        };

        let config = BotConfig {
            bot_token: get("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?,
            database_url: get("DATABASE_URL").unwrap_or_else(default_database_url),
            admin_ids: parse_id_list("ADMIN_IDS", get("ADMIN_IDS").as_deref())?,
            reviewer_ids: parse_id_list("REVIEWER_IDS", get("REVIEWER_IDS").as_deref())?,
            bot_username: get("BOT_USERNAME").map(|u| u.trim_start_matches('@').to_string()),
            support_contact: get("SUPPORT_CONTACT").unwrap_or_else(default_support_contact),
            pricing,
            payments,
            fulfillment,
        };

        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::Missing("BOT_TOKEN"));
        }
        if self.pricing.star_rate <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                key: "STAR_RATE",
                value: self.pricing.star_rate.to_string(),
            });
        }
        if self.pricing.min_stars <= 0 || self.pricing.min_stars > self.pricing.max_stars {
            return Err(ConfigError::Invalid {
                key: "MIN_STARS",
                value: format!("{}..{}", self.pricing.min_stars, self.pricing.max_stars),
            });
        }
        if self.admin_ids.is_empty() && self.reviewer_ids.is_empty() {
            tracing::warn!("No ADMIN_IDS or REVIEWER_IDS configured; orders cannot be reviewed");
        }
        Ok(self)
    }

    pub fn effective_reviewers(&self) -> &[i64] {
        if self.reviewer_ids.is_empty() {
            &self.admin_ids
        } else {
            &self.reviewer_ids
        }
    }
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

/// Comma or whitespace separated Telegram ids.
pub fn parse_id_list(key: &'static str, raw: Option<&str>) -> Result<Vec<i64>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>().map_err(|_| ConfigError::Invalid {
                key,
                value: part.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_config_uses_defaults() {
        let config = BotConfig::from_lookup(lookup(&[("BOT_TOKEN", "123:abc")])).unwrap();
        assert_eq!(config.pricing.star_rate, Decimal::new(145, 2));
        assert_eq!(config.pricing.min_stars, 50);
        assert_eq!(config.pricing.max_stars, 100_000);
        assert_eq!(config.database_url, "sqlite://data/starshop.db");
        assert!(config.fulfillment.is_none());
        assert!(!config.payments.instant.is_configured());
    }

    #[test]
    fn env_config_reads_ids_and_gateways() {
        let config = BotConfig::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:abc"),
            ("ADMIN_IDS", "1, 2 3"),
            ("STAR_RATE", "1.6"),
            ("CRYPTO_API_URL", "https://crypto.example/invoice"),
            ("CRYPTO_STATUS_URL", "https://crypto.example/status"),
            ("CRYPTO_SHOP_ID", "shop"),
            ("CRYPTO_API_KEY", "key"),
            ("FULFILLMENT_API_URL", "https://stars.example/send"),
            ("FULFILLMENT_API_KEY", "k"),
            ("BOT_USERNAME", "@star_shop_bot"),
        ]))
        .unwrap();
        assert_eq!(config.admin_ids, vec![1, 2, 3]);
        assert_eq!(config.effective_reviewers(), &[1, 2, 3]);
        assert_eq!(config.pricing.star_rate, Decimal::new(16, 1));
        assert!(config.payments.crypto.is_configured());
        assert!(config.fulfillment.is_some());
        assert_eq!(config.bot_username.as_deref(), Some("star_shop_bot"));
    }

    #[test]
    fn reviewers_override_admins() {
        let config = BotConfig::from_lookup(lookup(&[
            ("BOT_TOKEN", "t"),
            ("ADMIN_IDS", "1,2"),
            ("REVIEWER_IDS", "2"),
        ]))
        .unwrap();
        assert_eq!(config.effective_reviewers(), &[2]);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            BotConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("BOT_TOKEN"))
        ));
        assert!(matches!(
            BotConfig::from_lookup(lookup(&[("BOT_TOKEN", "t"), ("ADMIN_IDS", "1,x")])),
            Err(ConfigError::Invalid { key: "ADMIN_IDS", .. })
        ));
        assert!(matches!(
            BotConfig::from_lookup(lookup(&[("BOT_TOKEN", "t"), ("MIN_STARS", "500"), ("MAX_STARS", "100")])),
            Err(ConfigError::Invalid { key: "MIN_STARS", .. })
        ));
        assert!(matches!(
            BotConfig::from_lookup(lookup(&[("BOT_TOKEN", "t"), ("STAR_RATE", "0")])),
            Err(ConfigError::Invalid { key: "STAR_RATE", .. })
        ));
    }

    #[test]
    fn toml_config_parses_sections() {
        let config = BotConfig::from_toml_str(
            r#"
            bot_token = "123:abc"
            admin_ids = [10]

            [pricing]
            star_rate = "1.45"
            currency = "KZT"
            min_stars = 100
            max_stars = 5000

            [payments]
            manual_details = "Card 0000"

            [payments.instant]
            api_url = "https://qr.example/api/invoice"
            shop_id = "42"
            secret = "s3cret"
            "#,
        )
        .unwrap();
        assert_eq!(config.pricing.currency, "KZT");
        assert_eq!(config.pricing.min_stars, 100);
        assert_eq!(config.payments.manual_details, "Card 0000");
        assert!(config.payments.instant.is_configured());
        assert!(!config.payments.crypto.is_configured());
    }
}
