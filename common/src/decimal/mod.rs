//! Decimal type utilities for precise money calculations

use rust_decimal::Decimal;
pub use rust_decimal_macros::dec;

/// Monetary amount with high precision
pub type Amount = Decimal;

/// Percentage value (risk per trade, win rates)
pub type Percent = Decimal;

/// Precision helpers for common operations
pub mod precision {
    use super::*;

    /// Default money precision (2 decimal places)
    pub const MONEY_PRECISION: u32 = 2;

    /// Round an amount to standard money precision
    pub fn round_money(amount: Amount) -> Amount {
        amount.round_dp(MONEY_PRECISION)
    }
}
