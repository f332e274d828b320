use std::{collections::HashMap, fmt::Debug};

use cucumber::World;
use zvr_order_engine::{
    db_types::{Order, OrderCode, Refund},
    traits::TransitionResult,
    EngineError,
};

use crate::support::TestSystem;

#[derive(Default, World)]
pub struct StoreWorld {
    pub system: Option<TestSystem>,
    pub products: HashMap<String, i64>,
    pub order_code: Option<OrderCode>,
    pub external_id: Option<String>,
    pub refund: Option<Refund>,
    pub race: Vec<Result<TransitionResult, EngineError>>,
}

impl Debug for StoreWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StoreWorld (order: {:?}, payment: {:?})", self.order_code, self.external_id)
    }
}

impl StoreWorld {
    pub fn sys(&self) -> &TestSystem {
        self.system.as_ref().expect("The store has not been set up")
    }

    pub fn product(&self, name: &str) -> i64 {
        *self.products.get(name).unwrap_or_else(|| panic!("No product named {name}"))
    }

    pub fn code(&self) -> &OrderCode {
        self.order_code.as_ref().expect("No order has been placed")
    }

    pub fn external_id(&self) -> &str {
        self.external_id.as_deref().expect("No payment has been opened")
    }

    pub async fn order(&self) -> Order {
        self.sys().order(self.code()).await
    }
}
