use serde::{Deserialize, Serialize};

use crate::db_types::{Order, UserAccount};

/// Published once, after an order's success transition has been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
    pub account: UserAccount,
    pub transaction_id: String,
}

impl OrderPaidEvent {
    pub fn new(order: Order, account: UserAccount, transaction_id: String) -> Self {
        Self { order, account, transaction_id }
    }
}

/// Published when an unpaid order is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderClosedEvent {
    pub order: Order,
}

impl OrderClosedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}
