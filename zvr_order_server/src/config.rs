use std::{env, io::Write, time::Duration as StdDuration};

use chrono::Duration;
use log::*;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use tempfile::NamedTempFile;
use zvr_common::{parse_boolean_flag, Secret};
use zvr_gateways::{MailerConfig, MidtransConfig, ShippingConfig};
use zvr_order_engine::{GatewayDeadlines, JobConfig, OrderFlowConfig};

const DEFAULT_ZVR_HOST: &str = "127.0.0.1";
const DEFAULT_ZVR_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/zvr_store.db";
const ADMIN_KEY_LENGTH: usize = 40;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Bearer key that grants access to the `/admin` routes.
    pub admin_api_key: Secret<String>,
    pub order_flow: OrderFlowConfig,
    pub jobs: JobConfig,
    pub deadlines: GatewayDeadlines,
    /// Tax in basis points applied to the item subtotal at checkout.
    pub tax_rate_bps: i64,
    /// If true, the expiry, payment sync and reconciliation workers are not started. Jobs can still be triggered via
    /// the admin routes.
    pub disable_workers: bool,
    pub midtrans: MidtransConfig,
    pub shipping: ShippingConfig,
    pub mailer: MailerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ZVR_HOST.to_string(),
            port: DEFAULT_ZVR_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            admin_api_key: Secret::default(),
            order_flow: OrderFlowConfig::default(),
            jobs: JobConfig::default(),
            deadlines: GatewayDeadlines::default(),
            tax_rate_bps: 0,
            disable_workers: false,
            midtrans: MidtransConfig::default(),
            shipping: ShippingConfig::default(),
            mailer: MailerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("ZVR_HOST").ok().unwrap_or_else(|| DEFAULT_ZVR_HOST.into());
        let port = env::var("ZVR_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for ZVR_PORT. {e} Using the default, {DEFAULT_ZVR_PORT}, instead."
                    );
                    DEFAULT_ZVR_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_ZVR_PORT);
        let database_url = env::var("ZVR_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ ZVR_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let admin_api_key = env::var("ZVR_ADMIN_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(Secret::new)
            .unwrap_or_else(session_admin_key);
        let order_flow = OrderFlowConfig {
            order_ttl: Duration::hours(env_number("ZVR_ORDER_TTL_HOURS", 24)),
            expiry_batch_size: env_number("ZVR_EXPIRY_BATCH_SIZE", 100),
        };
        let defaults = JobConfig::default();
        let jobs = JobConfig {
            payment_stale_threshold: Duration::minutes(env_number("ZVR_PAYMENT_STALE_MINUTES", 15)),
            payment_expiry_grace: Duration::minutes(env_number("ZVR_PAYMENT_EXPIRY_GRACE_MINUTES", 5)),
            reconcile_window_start_hour: env_number("ZVR_RECONCILE_WINDOW_START_HOUR", 1),
            reconcile_window_end_hour: env_number("ZVR_RECONCILE_WINDOW_END_HOUR", 4),
            ..defaults
        };
        if jobs.reconcile_window_start_hour >= jobs.reconcile_window_end_hour || jobs.reconcile_window_end_hour > 24 {
            warn!(
                "🪛️ The reconciliation window {}..{} is empty or invalid. Daily reconciliation will only run when \
                 triggered by hand.",
                jobs.reconcile_window_start_hour, jobs.reconcile_window_end_hour
            );
        }
        let deadlines = GatewayDeadlines {
            charge: StdDuration::from_secs(env_number("ZVR_CHARGE_TIMEOUT_SECS", 10)),
            refund: StdDuration::from_secs(env_number("ZVR_REFUND_TIMEOUT_SECS", 30)),
            status: StdDuration::from_secs(env_number("ZVR_STATUS_TIMEOUT_SECS", 5)),
            ..GatewayDeadlines::default()
        };
        let tax_rate_bps = env_number("ZVR_TAX_RATE_BPS", 0i64);
        let tax_rate_bps = if (0..=10_000).contains(&tax_rate_bps) {
            tax_rate_bps
        } else {
            warn!("🪛️ ZVR_TAX_RATE_BPS must be between 0 and 10000. Using 0.");
            0
        };
        let disable_workers = parse_boolean_flag(env::var("ZVR_DISABLE_WORKERS").ok(), false);
        Self {
            host,
            port,
            database_url,
            admin_api_key,
            order_flow,
            jobs,
            deadlines,
            tax_rate_bps,
            disable_workers,
            midtrans: MidtransConfig::new_from_env_or_default(),
            shipping: ShippingConfig::new_from_env_or_default(),
            mailer: MailerConfig::new_from_env_or_default(),
        }
    }

    pub fn options(&self) -> ServerOptions {
        ServerOptions { tax_rate_bps: self.tax_rate_bps, deadlines: self.deadlines }
    }
}

/// Reads a numeric variable, falling back to `default` if it is missing or cannot be parsed.
fn env_number<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {name} ({s}). {e}. Using the default value of {default}.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}

/// Generates an admin key for this session only. The key is written to a temporary file rather than the log.
fn session_admin_key() -> Secret<String> {
    warn!(
        "🚨️🚨️🚨️ ZVR_ADMIN_API_KEY has not been set. I'm using a random value for this session. DO NOT operate on \
         production like this. 🚨️🚨️🚨️"
    );
    let key = thread_rng().sample_iter(&Alphanumeric).take(ADMIN_KEY_LENGTH).map(char::from).collect::<String>();
    match NamedTempFile::new().ok().and_then(|f| f.keep().ok()) {
        Some((mut f, p)) => match writeln!(f, "{key}") {
            Ok(()) => warn!(
                "🚨️🚨️🚨️ The admin API key for this session was written to {}. Set ZVR_ADMIN_API_KEY instead. 🚨️🚨️🚨️",
                p.to_str().unwrap_or("???")
            ),
            Err(e) => warn!("🪛️ Could not write the admin API key to the temporary file. {e}"),
        },
        None => warn!("🪛️ Could not create a temporary file to store the admin API key."),
    }
    Secret::new(key)
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that the request handlers need. It holds no secrets, so it can be handed to
/// every worker as app data.
#[derive(Clone, Copy, Debug)]
pub struct ServerOptions {
    pub tax_rate_bps: i64,
    pub deadlines: GatewayDeadlines,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerConfig::default().options()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn numbers_fall_back_to_defaults() {
        env::set_var("ZVR_TEST_NUMBER_OK", "42");
        env::set_var("ZVR_TEST_NUMBER_BAD", "forty-two");
        assert_eq!(env_number("ZVR_TEST_NUMBER_OK", 7i64), 42);
        assert_eq!(env_number("ZVR_TEST_NUMBER_BAD", 7i64), 7);
        assert_eq!(env_number("ZVR_TEST_NUMBER_MISSING", 7u32), 7);
    }

    #[test]
    fn session_keys_are_random() {
        let a = session_admin_key();
        let b = session_admin_key();
        assert_eq!(a.reveal().len(), ADMIN_KEY_LENGTH);
        assert_ne!(a.reveal(), b.reveal());
    }

    #[test]
    fn default_options() {
        let options = ServerOptions::default();
        assert_eq!(options.tax_rate_bps, 0);
        assert_eq!(options.deadlines.charge, StdDuration::from_secs(10));
        assert_eq!(options.deadlines.status, StdDuration::from_secs(5));
    }
}
