use crate::db_types::{Order, UserAccount};

/// Outcome of applying a verified payment to the ledger.
#[derive(Debug, Clone)]
pub enum ApplyPaymentResult {
    /// The order moved from `NOT_PAID` to `SUCCESS` and the credit grant was applied to `account`.
    Applied { order: Order, account: UserAccount },
    /// The order was already `SUCCESS`. Nothing was changed.
    AlreadyApplied(Order),
}

impl ApplyPaymentResult {
    pub fn order(&self) -> &Order {
        match self {
            ApplyPaymentResult::Applied { order, .. } => order,
            ApplyPaymentResult::AlreadyApplied(order) => order,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, ApplyPaymentResult::Applied { .. })
    }
}

/// Outcome of a local `NOT_PAID → CLOSED` transition.
#[derive(Debug, Clone)]
pub enum CloseOrderResult {
    Closed(Order),
    AlreadyClosed(Order),
}

impl CloseOrderResult {
    pub fn order(&self) -> &Order {
        match self {
            CloseOrderResult::Closed(order) => order,
            CloseOrderResult::AlreadyClosed(order) => order,
        }
    }
}
