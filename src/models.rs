use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;

// ============================================================================
// Order Aggregate
// ============================================================================
//
// An order is always persisted and read as one unit: the header plus exactly
// one Delivery, exactly one Payment and an ordered list of Items.
//
// The JSON shape matches the payload published on the orders topic and
// accepted by POST /create-order. Every field is required; unknown fields are
// ignored so producers can add fields without breaking ingestion.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Unix timestamp, seconds
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    /// Discount percentage, 0..=100
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

/// Longest identifier the `orders.order_uid` column accepts
pub const MAX_ORDER_UID_LEN: usize = 64;

impl Order {
    /// Decode and validate an inbound payload.
    ///
    /// This is the only way untrusted bytes become an `Order`; both the
    /// subscriber and the HTTP create endpoint go through it.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let order: Order = serde_json::from_slice(payload)?;
        order.validate()?;
        Ok(order)
    }

    /// Field-level checks serde cannot express.
    pub fn validate(&self) -> Result<(), DecodeError> {
        self.reject_nul_bytes()?;

        let uid = self.order_uid.trim();
        if uid.is_empty() {
            return Err(DecodeError::invalid("order_uid", "must not be empty"));
        }
        if uid.len() != self.order_uid.len() {
            return Err(DecodeError::invalid("order_uid", "must not have surrounding whitespace"));
        }
        if self.order_uid.len() > MAX_ORDER_UID_LEN {
            return Err(DecodeError::invalid(
                "order_uid",
                format!("longer than {} bytes", MAX_ORDER_UID_LEN),
            ));
        }
        if self.track_number.trim().is_empty() {
            return Err(DecodeError::invalid("track_number", "must not be empty"));
        }

        self.payment.validate()?;

        for (index, item) in self.items.iter().enumerate() {
            item.validate()
                .map_err(|reason| DecodeError::invalid(format!("items[{}]", index), reason))?;
        }

        Ok(())
    }

    /// PostgreSQL text columns cannot store U+0000; such a payload would
    /// fail on every insert attempt.
    fn reject_nul_bytes(&self) -> Result<(), DecodeError> {
        let header = [
            ("order_uid", &self.order_uid),
            ("track_number", &self.track_number),
            ("entry", &self.entry),
            ("customer_id", &self.customer_id),
            ("delivery_service", &self.delivery_service),
            ("shardkey", &self.shardkey),
            ("oof_shard", &self.oof_shard),
        ];
        let delivery = [
            ("delivery.name", &self.delivery.name),
            ("delivery.phone", &self.delivery.phone),
            ("delivery.zip", &self.delivery.zip),
            ("delivery.city", &self.delivery.city),
            ("delivery.address", &self.delivery.address),
            ("delivery.region", &self.delivery.region),
            ("delivery.email", &self.delivery.email),
        ];
        let payment = [
            ("payment.transaction", &self.payment.transaction),
            ("payment.request_id", &self.payment.request_id),
            ("payment.currency", &self.payment.currency),
            ("payment.provider", &self.payment.provider),
            ("payment.bank", &self.payment.bank),
        ];

        for (field, value) in header.iter().chain(&delivery).chain(&payment) {
            if value.contains('\0') {
                return Err(DecodeError::invalid(*field, "contains a NUL character"));
            }
        }

        for (index, item) in self.items.iter().enumerate() {
            let texts = [
                ("track_number", &item.track_number),
                ("rid", &item.rid),
                ("name", &item.name),
                ("size", &item.size),
                ("brand", &item.brand),
            ];
            for (field, value) in texts {
                if value.contains('\0') {
                    return Err(DecodeError::invalid(
                        format!("items[{}].{}", index, field),
                        "contains a NUL character",
                    ));
                }
            }
        }

        Ok(())
    }
}

impl Payment {
    fn validate(&self) -> Result<(), DecodeError> {
        if self.currency.trim().is_empty() {
            return Err(DecodeError::invalid("payment.currency", "must not be empty"));
        }

        let amounts = [
            ("payment.amount", self.amount),
            ("payment.delivery_cost", self.delivery_cost),
            ("payment.goods_total", self.goods_total),
            ("payment.custom_fee", self.custom_fee),
        ];
        for (field, value) in amounts {
            if value < 0 {
                return Err(DecodeError::invalid(field, format!("negative value {}", value)));
            }
        }

        Ok(())
    }
}

impl Item {
    fn validate(&self) -> Result<(), String> {
        if self.price < 0 {
            return Err(format!("negative price {}", self.price));
        }
        if self.total_price < 0 {
            return Err(format!("negative total_price {}", self.total_price));
        }
        if !(0..=100).contains(&self.sale) {
            return Err(format!("sale {} outside 0..=100", self.sale));
        }
        Ok(())
    }
}

// ============================================================================
// Test fixtures
// ============================================================================


// ============================================================================
// Unit Tests
// ============================================================================
