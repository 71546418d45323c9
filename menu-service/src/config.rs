use anyhow::{anyhow, Context, Result};
use common_auth::JwtConfig;
use jsonwebtoken::Algorithm;
use std::env;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DOMAIN: &str = "udacity-fsnd.auth0.com";
const DEFAULT_AUDIENCE: &str = "dev";
const DEFAULT_DATABASE_URL: &str = "sqlite://drinks.db?mode=rwc";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: IpAddr,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub seed_demo: bool,
    pub jwt: JwtConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).and_then(|value| normalize_optional(&value));

        let host = var("HOST")
            .unwrap_or_else(|| "0.0.0.0".to_string())
            .parse::<IpAddr>()
            .context("Failed to parse HOST")?;
        let port = var("PORT")
            .map(|value| value.parse::<u16>())
            .transpose()
            .context("Failed to parse PORT")?
            .unwrap_or(8080);

        let database_url = var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let database_max_connections = var("DATABASE_MAX_CONNECTIONS")
            .map(|value| value.parse::<u32>())
            .transpose()
            .context("Failed to parse DATABASE_MAX_CONNECTIONS")?
            .unwrap_or(5);
        let seed_demo = var("MENU_SEED_DEMO").map(|value| is_truthy(&value)).unwrap_or(false);

        let domain = var("AUTH0_DOMAIN").unwrap_or_else(|| DEFAULT_DOMAIN.to_string());
        let audience = var("AUTH0_API_AUDIENCE").unwrap_or_else(|| DEFAULT_AUDIENCE.to_string());
        let algorithms = var("AUTH0_ALGORITHM")
            .map(|value| parse_algorithms(&value))
            .transpose()
            .context("Failed to parse AUTH0_ALGORITHM")?
            .unwrap_or_else(|| vec![Algorithm::RS256]);

        let mut jwt = JwtConfig::new(domain, audience).with_algorithms(algorithms);
        if let Some(url) = var("AUTH0_JWKS_URL") {
            jwt = jwt.with_jwks_url(url);
        }
        if let Some(secs) = parse_seconds(var("AUTH0_JWKS_TIMEOUT_SECONDS"), "AUTH0_JWKS_TIMEOUT_SECONDS")? {
            jwt = jwt.with_jwks_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_seconds(var("AUTH0_JWKS_CACHE_SECONDS"), "AUTH0_JWKS_CACHE_SECONDS")? {
            jwt = jwt.with_jwks_cache_ttl(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_seconds(var("AUTH0_LEEWAY_SECONDS"), "AUTH0_LEEWAY_SECONDS")? {
            let leeway = u32::try_from(secs).context("AUTH0_LEEWAY_SECONDS is out of range")?;
            jwt = jwt.with_leeway(leeway);
        }

        Ok(ServiceConfig {
            host,
            port,
            database_url,
            database_max_connections,
            seed_demo,
            jwt,
        })
    }
}

fn parse_algorithms(value: &str) -> Result<Vec<Algorithm>> {
    let mut algorithms = Vec::new();
    for item in value.split(',') {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        let algorithm = Algorithm::from_str(trimmed)
            .map_err(|err| anyhow!("Unsupported algorithm '{trimmed}': {err}"))?;
        algorithms.push(algorithm);
    }
    if algorithms.is_empty() {
        return Err(anyhow!("At least one algorithm is required"));
    }
    Ok(algorithms)
}

fn parse_seconds(value: Option<String>, key: &str) -> Result<Option<u64>> {
    value
        .map(|raw| {
            raw.parse::<u64>()
                .with_context(|| format!("Failed to parse {key} as whole seconds"))
        })
        .transpose()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
