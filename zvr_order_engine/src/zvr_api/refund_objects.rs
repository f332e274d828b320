use serde::{Deserialize, Serialize};

use crate::db_types::{Refund, RefundItem, StatusHistoryEntry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundDetail {
    pub refund: Refund,
    pub items: Vec<RefundItem>,
    pub history: Vec<StatusHistoryEntry>,
}
