use std::collections::BTreeMap;

use super::GatewayError;

/// Sent once per order when its payment settles.
pub const ORDER_PAID_TEMPLATE: &str = "order_paid";

pub type TemplateVariables = BTreeMap<String, String>;

/// Template rendering happens on the mail provider's side; the engine only supplies the key and variables.
#[allow(async_fn_in_trait)]
pub trait Mailer {
    async fn send(&self, template_key: &str, recipient: &str, variables: &TemplateVariables) -> Result<(), GatewayError>;
}
