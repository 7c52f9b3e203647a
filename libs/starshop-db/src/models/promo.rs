use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PromoCode {
    pub id: i64,
    pub code: String,
    /// Percent off.
    pub discount: i64,
    /// Flat amount in minor currency units.
    pub amount_money: i64,
    pub max_uses: i64,
    pub uses: i64,
    pub is_used: bool,
}

impl PromoCode {
    pub fn usage_pct(&self) -> f32 {
        if self.max_uses == 0 {
            return 0.0;
        }
        (self.uses as f32 / self.max_uses as f32) * 100.0
    }

    pub fn remaining(&self) -> i64 {
        (self.max_uses - self.uses).max(0)
    }
}
