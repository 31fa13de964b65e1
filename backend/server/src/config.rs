use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{info, warn};

const DEFAULT_JWT_EXPIRES_IN: &str = "7d";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    /// Seconds.
    pub jwt_expires_in: i64,
    pub frontend_url: String,
    pub mail: Option<MailConfig>,
    pub auto_migrate: bool,
    pub password_memory_kib: u32,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let port = match var("RUST_PORT").or_else(|_| var("PORT")) {
            Ok(port) => port.parse().context("Invalid port")?,
            Err(_) => {
                info!("Port not set, using default: 5000");
                5000
            }
        };

        Ok(Self {
            port,
            database_url: database_url()?,
            jwt_secret: read_secret("JWT_SECRET")?,
            jwt_expires_in: parse_duration(&try_load::<String>(
                "JWT_EXPIRES_IN",
                DEFAULT_JWT_EXPIRES_IN,
            )?)?,
            frontend_url: try_load::<String>("FRONTEND_URL", "http://localhost:3000")?
                .trim_end_matches('/')
                .to_string(),
            mail: mail_config()?,
            auto_migrate: try_load("AUTO_MIGRATE", "true")?,
            password_memory_kib: try_load("PASSWORD_MEMORY_KIB", "19456")?,
        })
    }
}

fn database_url() -> Result<String> {
    if let Ok(url) = read_secret("DATABASE_URL") {
        return Ok(url);
    }

    let host: String = try_load("DB_HOST", "localhost")?;
    let port: u16 = try_load("DB_PORT", "5432")?;
    let name = var("DB_NAME").map_err(|_| anyhow!("DATABASE_URL or DB_NAME must be set"))?;
    let user = var("DB_USER").map_err(|_| anyhow!("DB_USER must be set"))?;
    let password = read_secret("DB_PASSWORD").unwrap_or_default();

    Ok(format!("postgres://{user}:{password}@{host}:{port}/{name}"))
}

fn mail_config() -> Result<Option<MailConfig>> {
    let Ok(host) = var("EMAIL_HOST") else {
        info!("EMAIL_HOST not set, mail disabled");
        return Ok(None);
    };

    Ok(Some(MailConfig {
        host,
        port: try_load("EMAIL_PORT", "587")?,
        user: var("EMAIL_USER").unwrap_or_default(),
        password: read_secret("EMAIL_PASS").unwrap_or_default(),
    }))
}

/// Parses `7d`, `12h`, `30m`, `45s` or plain seconds into seconds.
pub fn parse_duration(value: &str) -> Result<i64> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(split);

    let amount: i64 = amount
        .parse()
        .with_context(|| format!("Invalid duration: {value}"))?;
    let scale = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => bail!("Invalid duration unit in {value}"),
    };

    if amount == 0 {
        bail!("Duration must be positive: {value}");
    }

    Ok(amount * scale)
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            anyhow!("Environment misconfigured: {key}")
        })
}

/// Docker secrets win over the environment.
fn read_secret(secret_name: &str) -> Result<String> {
    let path = format!("/run/secrets/{secret_name}");

    match read_to_string(&path) {
        Ok(secret) => Ok(secret.trim().to_string()),
        Err(_) => var(secret_name).map_err(|_| {
            warn!("{secret_name} not found in /run/secrets or the environment");
            anyhow!("Secrets misconfigured: {secret_name}")
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_duration;

    #[test]
    fn test_duration_units() {
        assert_eq!(parse_duration("7d").unwrap(), 604_800);
        assert_eq!(parse_duration("12h").unwrap(), 43_200);
        assert_eq!(parse_duration("30m").unwrap(), 1_800);
        assert_eq!(parse_duration("45s").unwrap(), 45);
        assert_eq!(parse_duration("3600").unwrap(), 3_600);
    }

    #[test]
    fn test_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("d").is_err());
        assert!(parse_duration("7w").is_err());
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("-5").is_err());
    }
}
