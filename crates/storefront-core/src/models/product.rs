use serde::{Deserialize, Serialize};

use crate::utils::format_price;

#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Price in minor currency units.
    pub price_cents: i64,
    #[serde(default)]
    pub inventory: i64,
}

impl Product {
    pub fn price_display(&self) -> String {
        format_price(self.price_cents)
    }

    pub fn in_stock(&self) -> bool {
        self.inventory > 0
    }

    pub fn inventory_display(&self) -> String {
        if self.in_stock() {
            format!("{} in stock", self.inventory)
        } else {
            "Out of stock".to_string()
        }
    }
}
