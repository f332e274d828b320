use log::*;
use zvr_common::{parse_boolean_flag, Secret};

const MIDTRANS_SANDBOX_URL: &str = "https://api.sandbox.midtrans.com";
const MIDTRANS_PRODUCTION_URL: &str = "https://api.midtrans.com";

#[derive(Debug, Clone, Default)]
pub struct MidtransConfig {
    pub base_url: String,
    pub server_key: Secret<String>,
    pub is_production: bool,
}

impl MidtransConfig {
    pub fn new_from_env_or_default() -> Self {
        let is_production = parse_boolean_flag(std::env::var("ZVR_MIDTRANS_IS_PRODUCTION").ok(), false);
        let base_url = std::env::var("ZVR_MIDTRANS_BASE_URL").unwrap_or_else(|_| {
            let url = if is_production { MIDTRANS_PRODUCTION_URL } else { MIDTRANS_SANDBOX_URL };
            info!("🪛️ ZVR_MIDTRANS_BASE_URL not set, using {url}");
            url.to_string()
        });
        let server_key = Secret::new(std::env::var("ZVR_MIDTRANS_SERVER_KEY").unwrap_or_else(|_| {
            warn!("🪛️ ZVR_MIDTRANS_SERVER_KEY not set, using (probably useless) default");
            "SB-Mid-server-00000000000000".to_string()
        }));
        Self { base_url, server_key, is_production }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShippingConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
}

impl ShippingConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("ZVR_SHIPPING_BASE_URL").unwrap_or_else(|_| {
            warn!("🪛️ ZVR_SHIPPING_BASE_URL not set, using (probably useless) default");
            "http://localhost:8370".to_string()
        });
        let api_key = Secret::new(std::env::var("ZVR_SHIPPING_API_KEY").unwrap_or_else(|_| {
            warn!("🪛️ ZVR_SHIPPING_API_KEY not set, using (probably useless) default");
            "shipping_00000000000000".to_string()
        }));
        Self { base_url, api_key }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MailerConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
    pub sender: String,
}

impl MailerConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("ZVR_MAILER_BASE_URL").unwrap_or_else(|_| {
            warn!("🪛️ ZVR_MAILER_BASE_URL not set, using (probably useless) default");
            "http://localhost:8380".to_string()
        });
        let api_key = Secret::new(std::env::var("ZVR_MAILER_API_KEY").unwrap_or_else(|_| {
            warn!("🪛️ ZVR_MAILER_API_KEY not set, using (probably useless) default");
            "mailer_00000000000000".to_string()
        }));
        let sender = std::env::var("ZVR_MAILER_SENDER").unwrap_or_else(|_| {
            info!("🪛️ ZVR_MAILER_SENDER not set, using orders@zvr.id");
            "orders@zvr.id".to_string()
        });
        Self { base_url, api_key, sender }
    }
}
