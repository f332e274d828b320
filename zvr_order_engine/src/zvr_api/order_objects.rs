use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderCode, OrderItem};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Result of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirySummary {
    pub expired: Vec<OrderCode>,
    /// Orders that changed status between being selected and being locked.
    pub skipped: usize,
    pub errors: usize,
}
