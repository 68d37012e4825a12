use rand::Rng;

use crate::db_types::OrderNo;

pub const ORDER_NO_PREFIX: &str = "order_";
const ORDER_NO_DIGITS: usize = 20;

/// Mints a fresh order number: `order_` followed by 20 random decimal digits.
pub fn new_order_no() -> OrderNo {
    let mut rng = rand::thread_rng();
    let digits: String = (0..ORDER_NO_DIGITS).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect();
    OrderNo(format!("{ORDER_NO_PREFIX}{digits}"))
}
