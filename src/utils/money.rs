use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::utils::error::AppError;

/// Converts a decimal major-unit amount to the minor units (cents) the
/// payment processor expects. Sub-cent precision is rejected rather than
/// silently rounded.
pub fn to_minor_units(amount: Decimal) -> Result<i64, AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::ValidationError(
            "Amount must be positive".to_string(),
        ));
    }

    let scaled = amount * Decimal::from(100);
    if !scaled.fract().is_zero() {
        return Err(AppError::ValidationError(
            "Amount cannot have sub-cent precision".to_string(),
        ));
    }

    scaled
        .trunc()
        .to_i64()
        .ok_or_else(|| AppError::ValidationError("Amount is out of range".to_string()))
}

/// Marketplace cut for a sale, rounded to whole cents.
pub fn platform_fee(amount: Decimal, fee_bps: u32) -> Decimal {
    (amount * Decimal::from(fee_bps) / Decimal::from(10_000u32)).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_whole_dollar_amounts_convert() {
        assert_eq!(to_minor_units(dec("120.00")).unwrap(), 12_000);
        assert_eq!(to_minor_units(dec("0.01")).unwrap(), 1);
    }

    #[test]
    fn test_sub_cent_precision_rejected() {
        assert!(to_minor_units(dec("10.005")).is_err());
    }

    #[test]
    fn test_zero_and_negative_rejected() {
        assert!(to_minor_units(Decimal::ZERO).is_err());
        assert!(to_minor_units(dec("-5.00")).is_err());
    }

    #[test]
    fn test_platform_fee_five_percent() {
        assert_eq!(platform_fee(dec("100.00"), 500), dec("5.00"));
    }

    #[test]
    fn test_platform_fee_rounds_to_cents() {
        // 3.33% of 99.99 = 3.329667
        assert_eq!(platform_fee(dec("99.99"), 333), dec("3.33"));
    }

    #[test]
    fn test_fee_stays_below_amount_for_sane_bps() {
        let amount = dec("25.00");
        assert!(platform_fee(amount, 500) < amount);
    }
}
