use std::{collections::BTreeMap, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde::{Deserialize, Serialize};

use crate::{config::MailerConfig, rest::RestClient, GatewayApiError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub template: String,
    pub variables: BTreeMap<String, String>,
}

/// Client for the transactional mail provider.
#[derive(Clone)]
pub struct MailerApi {
    rest: RestClient,
    sender: String,
}

impl MailerApi {
    pub fn new(config: MailerConfig) -> Result<Self, GatewayApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(&format!("Bearer {}", config.api_key.reveal()))
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        headers.insert("Authorization", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let rest = RestClient::new(&config.base_url, headers, REQUEST_TIMEOUT)?;
        Ok(Self { rest, sender: config.sender })
    }

    pub fn message(&self, template: &str, to: &str, variables: BTreeMap<String, String>) -> MailMessage {
        MailMessage { from: self.sender.clone(), to: to.to_string(), template: template.to_string(), variables }
    }

    pub async fn send(&self, message: &MailMessage) -> Result<(), GatewayApiError> {
        if !message.to.contains('@') {
            return Err(GatewayApiError::InvalidRequest(format!("Invalid recipient {}", message.to)));
        }
        self.rest.send(Method::POST, "/v1/send", &[], Some(message)).await?;
        debug!("📧️ Sent {} email to {}", message.template, message.to);
        Ok(())
    }
}
