use serde::{Deserialize, Serialize};

use crate::utils::format_price;

#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: i64,
    pub quantity: u32,
}

impl OrderItem {
    pub fn new(product_id: i64, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Body of `POST /orders/`.
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
    pub items: Vec<OrderItem>,
}

/// What the server returns once an order is placed.
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: i64,
    pub total_cents: i64,
    pub status: String,
}

impl OrderReceipt {
    pub fn total_display(&self) -> String {
        format_price(self.total_cents)
    }
}

/// A stored order as returned by `GET /orders/{id}`.
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Order {
    pub fn is_paid(&self) -> bool {
        self.status == "paid"
    }
}
