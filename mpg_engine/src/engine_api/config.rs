use chrono::Duration;

pub const DEFAULT_ORDER_TTL_MINUTES: i64 = 5;
pub const DEFAULT_RECONCILE_GRACE_MINUTES: i64 = 5;
pub const DEFAULT_RETENTION_DAYS: i64 = 15;
pub const DEFAULT_CLOSE_ATTEMPTS: u32 = 3;
pub const DEFAULT_CLOSE_BACKOFF_MS: u64 = 500;

/// Timing and retry parameters shared by the order flow APIs.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// How long a newly issued order stays payable.
    pub order_ttl: Duration,
    /// How old an unpaid order must be before the reconciliation poller looks at it.
    pub reconcile_grace: Duration,
    /// How long closed orders are kept before the janitor deletes them.
    pub retention: Duration,
    /// Maximum number of provider close attempts per reconciliation pass.
    pub close_attempts: u32,
    /// Delay before the second close attempt. Doubles after every failure.
    pub close_backoff: std::time::Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            order_ttl: Duration::minutes(DEFAULT_ORDER_TTL_MINUTES),
            reconcile_grace: Duration::minutes(DEFAULT_RECONCILE_GRACE_MINUTES),
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
            close_attempts: DEFAULT_CLOSE_ATTEMPTS,
            close_backoff: std::time::Duration::from_millis(DEFAULT_CLOSE_BACKOFF_MS),
        }
    }
}
