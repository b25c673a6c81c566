use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{FixedOffset, Offset, Utc};
use url::Url;

use super::{
    config_model::{Database, DotEnvyConfig, Events, Payments, Razorpay, Server, Sweeper},
    stage::Stage,
};

const DEFAULT_RAZORPAY_BASE_URL: &str = "https://api.razorpay.com";

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    from_lookup(|key| std::env::var(key).ok())
}

/// Builds the config from any key lookup, so parsing can be exercised without
/// touching the process environment.
pub fn from_lookup<F>(lookup: F) -> Result<DotEnvyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup };

    let server = Server {
        port: env.parse("SERVER_PORT")?,
        body_limit: env.parse_or("SERVER_BODY_LIMIT", 1)?,
        timeout: env.parse_or("SERVER_TIMEOUT", 30)?,
    };

    let database = Database {
        url: env.required("DATABASE_URL")?,
        pool_max_size: env.parse_or("DATABASE_POOL_MAX_SIZE", 10)?,
        pool_timeout_secs: env.parse_or("DATABASE_POOL_TIMEOUT_SECS", 5)?,
        lock_timeout_ms: env.parse_or("DATABASE_LOCK_TIMEOUT_MS", 5000)?,
    };
    if database.lock_timeout_ms == 0 {
        bail!("DATABASE_LOCK_TIMEOUT_MS must be positive");
    }

    let razorpay = Razorpay {
        key_id: env.required("RAZORPAY_KEY_ID")?,
        key_secret: env.required("RAZORPAY_KEY_SECRET")?,
        webhook_secret: env.required("RAZORPAY_WEBHOOK_SECRET")?,
        base_url: env
            .optional("RAZORPAY_BASE_URL")
            .unwrap_or_else(|| DEFAULT_RAZORPAY_BASE_URL.to_string()),
        timeout_secs: env.parse_or("RAZORPAY_TIMEOUT_SECS", 10)?,
    };

    let order_ttl_minutes: i64 = env.parse_or("PAYMENT_ORDER_TTL_MINUTES", 30)?;
    if order_ttl_minutes <= 0 {
        bail!("PAYMENT_ORDER_TTL_MINUTES must be positive");
    }

    let payments = Payments {
        order_ttl_minutes,
        display_offset: match env.optional("DISPLAY_UTC_OFFSET") {
            Some(raw) => parse_utc_offset(&raw).context("DISPLAY_UTC_OFFSET is invalid")?,
            None => utc(),
        },
    };

    let events = Events {
        webhook_url: env
            .optional("EVENTS_WEBHOOK_URL")
            .map(|raw| Url::parse(&raw))
            .transpose()
            .context("EVENTS_WEBHOOK_URL is invalid")?,
        queue_capacity: env.parse_or("EVENTS_QUEUE_CAPACITY", 256)?,
    };

    let sweeper = Sweeper {
        interval_secs: env.parse_or("SWEEP_INTERVAL_SECS", 60)?,
    };

    let stage = env
        .optional("STAGE")
        .and_then(|raw| Stage::try_from(&raw).ok())
        .unwrap_or_default();

    Ok(DotEnvyConfig {
        server,
        database,
        razorpay,
        payments,
        events,
        sweeper,
        stage,
    })
}

/// Parses `Z`, `+HH:MM`, `-HH:MM` or `+HHMM`.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return Ok(utc());
    }

    let (sign, rest) = match raw.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => bail!("offset must start with '+' or '-': {raw}"),
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        bail!("offset must look like +HH:MM: {raw}");
    }

    let hours: i32 = digits[..2].parse()?;
    let minutes: i32 = digits[2..].parse()?;
    if minutes >= 60 {
        bail!("offset minutes out of range: {raw}");
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| anyhow!("offset out of range: {raw}"))
}

fn utc() -> FixedOffset {
    Utc.fix()
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)
            .ok_or_else(|| anyhow!("{key} is missing"))
    }

    fn parse<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.required(key)?
            .parse()
            .with_context(|| format!("{key} is invalid"))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.optional(key) {
            Some(raw) => raw.parse().with_context(|| format!("{key} is invalid")),
            None => Ok(default),
        }
    }
}
