use zvr_gateways::MailerApi;
use zvr_order_engine::collaborators::{GatewayError, Mailer, TemplateVariables};

use super::map_gateway_error;

#[derive(Clone)]
pub struct MailerClient {
    api: MailerApi,
}

impl MailerClient {
    pub fn new(api: MailerApi) -> Self {
        Self { api }
    }
}

impl Mailer for MailerClient {
    async fn send(&self, template_key: &str, recipient: &str, variables: &TemplateVariables) -> Result<(), GatewayError> {
        let message = self.api.message(template_key, recipient, variables.clone());
        self.api.send(&message).await.map_err(map_gateway_error)
    }
}
