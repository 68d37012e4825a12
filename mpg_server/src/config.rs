//! Server configuration, read from `MPG_*` environment variables.
//!
//! Invalid values are logged and replaced by their defaults, so the server always starts. Check the log output at
//! start-up if a setting does not seem to take effect.
use std::{env, fmt::Display, str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use log::*;
use mpg_engine::{
    engine_api::config::{DEFAULT_CLOSE_ATTEMPTS, DEFAULT_ORDER_TTL_MINUTES, DEFAULT_RECONCILE_GRACE_MINUTES},
    FlowConfig,
};
use mpg_providers::{AlipayConfig, WechatPayConfig, DEFAULT_PROVIDER_TIMEOUT};

const DEFAULT_MPG_HOST: &str = "127.0.0.1";
const DEFAULT_MPG_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/mpg_store.db";
const DEFAULT_ALIPAY_RECONCILE_SECS: u64 = 20;
const DEFAULT_WX_RECONCILE_SECS: u64 = 25;
const DEFAULT_RETENTION_DAYS: i64 = 15;
const DEFAULT_JANITOR_HOUR: u32 = 2;
const DEFAULT_LOCK_LEASE_SECS: i64 = 300;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// Order lifetime, reconciliation grace, janitor retention and provider close retries
    pub flow: FlowConfig,
    pub alipay_reconcile_interval: StdDuration,
    pub wx_reconcile_interval: StdDuration,
    /// The janitor runs once a day at this hour (UTC)
    pub janitor_hour: u32,
    /// Locks held by a crashed instance become free again after this long
    pub lock_lease: Duration,
    pub provider_timeout: StdDuration,
    pub receipt_webhook_url: Option<String>,
    pub alipay: Option<AlipayConfig>,
    pub wechat: Option<WechatPayConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MPG_HOST.to_string(),
            port: DEFAULT_MPG_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            use_x_forwarded_for: false,
            flow: FlowConfig::default(),
            alipay_reconcile_interval: StdDuration::from_secs(DEFAULT_ALIPAY_RECONCILE_SECS),
            wx_reconcile_interval: StdDuration::from_secs(DEFAULT_WX_RECONCILE_SECS),
            janitor_hour: DEFAULT_JANITOR_HOUR,
            lock_lease: Duration::seconds(DEFAULT_LOCK_LEASE_SECS),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            receipt_webhook_url: None,
            alipay: None,
            wechat: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MPG_HOST").ok().unwrap_or_else(|| DEFAULT_MPG_HOST.into());
        let port = env_or_default("MPG_PORT", DEFAULT_MPG_PORT);
        let database_url = env::var("MPG_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ MPG_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let use_x_forwarded_for =
            env::var("MPG_USE_X_FORWARDED_FOR").map(|s| &s == "1" || &s == "true").unwrap_or(false);
        let flow = configure_flow();
        let alipay_reconcile_interval =
            StdDuration::from_secs(env_or_default("MPG_ALIPAY_RECONCILE_SECS", DEFAULT_ALIPAY_RECONCILE_SECS).max(1));
        let wx_reconcile_interval =
            StdDuration::from_secs(env_or_default("MPG_WX_RECONCILE_SECS", DEFAULT_WX_RECONCILE_SECS).max(1));
        let janitor_hour = match env_or_default("MPG_JANITOR_HOUR", DEFAULT_JANITOR_HOUR) {
            h if h < 24 => h,
            h => {
                warn!("🪛️ MPG_JANITOR_HOUR must be between 0 and 23, not {h}. Using {DEFAULT_JANITOR_HOUR}.");
                DEFAULT_JANITOR_HOUR
            },
        };
        let lock_lease = Duration::seconds(env_or_default("MPG_LOCK_LEASE_SECS", DEFAULT_LOCK_LEASE_SECS).max(1));
        let provider_timeout =
            StdDuration::from_secs(env_or_default("MPG_PROVIDER_TIMEOUT_SECS", DEFAULT_PROVIDER_TIMEOUT.as_secs()));
        let receipt_webhook_url = env::var("MPG_RECEIPT_WEBHOOK_URL").ok().filter(|s| !s.trim().is_empty());
        if receipt_webhook_url.is_none() {
            info!("🪛️ MPG_RECEIPT_WEBHOOK_URL is not set. Receipts will only be logged.");
        }
        let alipay = AlipayConfig::from_env(provider_timeout);
        let wechat = WechatPayConfig::from_env(provider_timeout);
        if alipay.is_none() && wechat.is_none() {
            warn!("🚨️ No payment provider is configured. Orders cannot be issued.");
        }
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            flow,
            alipay_reconcile_interval,
            wx_reconcile_interval,
            janitor_hour,
            lock_lease,
            provider_timeout,
            receipt_webhook_url,
            alipay,
            wechat,
        }
    }
}

fn configure_flow() -> FlowConfig {
    let defaults = FlowConfig::default();
    let order_ttl = Duration::minutes(env_or_default("MPG_ORDER_TTL_MINUTES", DEFAULT_ORDER_TTL_MINUTES).max(1));
    let reconcile_grace =
        Duration::minutes(env_or_default("MPG_RECONCILE_GRACE_MINUTES", DEFAULT_RECONCILE_GRACE_MINUTES).max(0));
    let retention = Duration::days(env_or_default("MPG_JANITOR_RETENTION_DAYS", DEFAULT_RETENTION_DAYS).max(1));
    let close_attempts = env_or_default("MPG_CLOSE_RETRY_ATTEMPTS", DEFAULT_CLOSE_ATTEMPTS).max(1);
    FlowConfig { order_ttl, reconcile_grace, retention, close_attempts, ..defaults }
}

/// Parses `name`, falling back to `default` (with a log message) if it is unset or invalid.
fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default, {default}.");
            default
        },
    }
}
