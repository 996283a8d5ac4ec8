use std::{net::SocketAddr, str::FromStr};

use rust_decimal::Decimal;

use crate::load::LoadPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("environment variable {name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// How bearer tokens are signed.
#[derive(Debug, Clone)]
pub enum JwtKeys {
    /// Base64 encoded RSA PEM pair, signed with RS256.
    Rsa {
        private_pem_base64: String,
        public_pem_base64: String,
    },
    /// Shared secret, signed with HS256.
    Secret(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mongodb_uri: String,
    pub database_name: String,
    pub bind_addr: SocketAddr,
    pub jwt_keys: JwtKeys,
    pub load_policy: LoadPolicy,
    /// Support messages are POSTed here; logged only when unset.
    pub support_webhook_url: Option<String>,
}

impl Config {
    pub fn new(mongodb_uri: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            mongodb_uri: mongodb_uri.into(),
            database_name: database_name.into(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            jwt_keys: JwtKeys::Secret(b"development-secret".to_vec()),
            load_policy: LoadPolicy::default(),
            support_webhook_url: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mongodb_uri = required("MONGODB_URI")?;
        let database_name = optional("DATABASE_NAME").unwrap_or_else(|| "ecocollect".into());

        let mut config = Self::new(mongodb_uri, database_name);

        if let Some(addr) = optional("BIND_ADDR") {
            config.bind_addr = parse("BIND_ADDR", &addr)?;
        }

        let secret = required("JWT_SECRET_KEY")?;
        config.jwt_keys = match optional("JWT_PUBLIC_KEY") {
            Some(public_pem_base64) => JwtKeys::Rsa {
                private_pem_base64: secret,
                public_pem_base64,
            },
            None => JwtKeys::Secret(secret.into_bytes()),
        };

        if let Some(capacity) = optional("TRUCK_CAPACITY") {
            config.load_policy.capacity = parse_non_negative("TRUCK_CAPACITY", &capacity)?;
        }

        if let Some(rate) = optional("EARNING_RATE") {
            config.load_policy.rate = parse_non_negative("EARNING_RATE", &rate)?;
        }

        config.support_webhook_url = optional("SUPPORT_WEBHOOK_URL");

        Ok(config)
    }
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|it| !it.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        name,
        reason: err.to_string(),
    })
}

fn parse_non_negative(name: &'static str, value: &str) -> Result<Decimal, ConfigError> {
    let value: Decimal = parse(name, value)?;

    if value.is_sign_negative() {
        return Err(ConfigError::Invalid {
            name,
            reason: "must not be negative".to_string(),
        });
    }

    Ok(value)
}
