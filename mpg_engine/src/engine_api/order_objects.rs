use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderNo, OrderStatusType, PaymentMethod, PaymentRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQueryFilter {
    pub order_no: Option<OrderNo>,
    pub user_id: Option<i64>,
    pub product_id: Option<i64>,
    pub pay_type: Option<PaymentMethod>,
    pub statuses: Vec<OrderStatusType>,
    pub created_before: Option<DateTime<Utc>>,
    pub expired_before: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn with_order_no(mut self, order_no: OrderNo) -> Self {
        self.order_no = Some(order_no);
        self
    }

    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_product_id(mut self, product_id: i64) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn with_pay_type(mut self, pay_type: PaymentMethod) -> Self {
        self.pay_type = Some(pay_type);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.statuses.push(status);
        self
    }

    /// Only orders created at or before `cutoff`
    pub fn created_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_before = Some(cutoff);
        self
    }

    /// Only orders whose expiration time is at or before `cutoff`
    pub fn expired_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.expired_before = Some(cutoff);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_no.is_none() &&
            self.user_id.is_none() &&
            self.product_id.is_none() &&
            self.pay_type.is_none() &&
            self.statuses.is_empty() &&
            self.created_before.is_none() &&
            self.expired_before.is_none()
    }
}

/// An order together with its receipt, if it has been paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWithPayment {
    pub order: Order,
    pub payment: Option<PaymentRecord>,
}

/// Summary of a single reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub examined: usize,
    pub settled: Vec<OrderNo>,
    pub closed: Vec<OrderNo>,
    pub left_pending: Vec<OrderNo>,
    pub failed: Vec<OrderNo>,
}

impl ReconciliationReport {
    pub fn summary(&self) -> String {
        format!(
            "{} examined, {} settled, {} closed, {} left pending, {} failed",
            self.examined,
            self.settled.len(),
            self.closed.len(),
            self.left_pending.len(),
            self.failed.len()
        )
    }
}

/// What happened to a single order during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileOutcome {
    Settled,
    Closed,
    LeftPending,
    /// The order had already reached a terminal state by the time it was examined.
    AlreadyTerminal,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_filter() {
        assert!(OrderQueryFilter::default().is_empty());
        assert!(!OrderQueryFilter::default().with_status(OrderStatusType::Closed).is_empty());
        assert!(!OrderQueryFilter::default().expired_before(Utc::now()).is_empty());
    }
}
