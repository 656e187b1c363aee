//! Escrow lifecycle rules.
//!
//! Money states: `pending -> succeeded (held) -> released | disputed`,
//! `held | disputed -> refunded`, `disputed -> released` when a dispute is
//! rejected. Every transition is a conditional update keyed on the prior
//! state, so replayed webhooks and concurrent triggers degrade to no-ops.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::models::{EscrowStatus, Transaction, TransactionStatus};
use crate::stripe::StripeClient;
use crate::utils::error::AppError;
use crate::utils::money;

/// When held funds become eligible for payout.
pub fn hold_deadline(succeeded_at: DateTime<Utc>, hold_hours: i64) -> DateTime<Utc> {
    succeeded_at + Duration::hours(hold_hours)
}

/// Funds can be paid out once the charge succeeded, escrow is still held,
/// and the hold window has elapsed.
pub fn is_release_eligible(tx: &Transaction, now: DateTime<Utc>) -> bool {
    tx.status == TransactionStatus::Succeeded
        && tx.escrow_status == Some(EscrowStatus::Held)
        && tx.hold_until.map(|deadline| deadline <= now).unwrap_or(false)
}

/// Buyers can only dispute while their money is still held.
pub fn can_open_dispute(tx: &Transaction) -> bool {
    tx.status == TransactionStatus::Succeeded && tx.escrow_status == Some(EscrowStatus::Held)
}

/// Pays out seller proceeds for one transaction.
///
/// The row is claimed with a conditional update before any money moves, so
/// two concurrent triggers can never both transfer. If the processor call
/// then fails, the claim is rolled back and the row is left for the next
/// trigger; the failure is logged by the caller.
pub async fn release_to_seller(
    pool: &PgPool,
    stripe: &StripeClient,
    tx: &Transaction,
    destination_account: &str,
    from: EscrowStatus,
) -> Result<bool, AppError> {
    let amount_minor = money::to_minor_units(tx.seller_proceeds())?;

    let claimed = sqlx::query(
        "UPDATE transactions
         SET escrow_status = 'released', released_at = now(), updated_at = now()
         WHERE id = $1 AND escrow_status = $2",
    )
    .bind(tx.id)
    .bind(from)
    .execute(pool)
    .await?;

    if claimed.rows_affected() == 0 {
        return Ok(false);
    }

    let transfer = match stripe
        .create_transfer(
            amount_minor,
            &tx.currency,
            destination_account,
            &tx.id.to_string(),
        )
        .await
    {
        Ok(transfer) => transfer,
        Err(e) => {
            // Roll the claim back so the row is retried on the next trigger
            sqlx::query(
                "UPDATE transactions
                 SET escrow_status = $2, released_at = NULL, updated_at = now()
                 WHERE id = $1 AND escrow_status = 'released' AND transfer_id IS NULL",
            )
            .bind(tx.id)
            .bind(from)
            .execute(pool)
            .await?;
            return Err(e);
        }
    };

    sqlx::query(
        "UPDATE transactions SET transfer_id = $2, updated_at = now() WHERE id = $1",
    )
    .bind(tx.id)
    .bind(&transfer.id)
    .execute(pool)
    .await?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn transaction(
        status: TransactionStatus,
        escrow_status: Option<EscrowStatus>,
        hold_until: Option<DateTime<Utc>>,
    ) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            ticket_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            amount: "100.00".parse().unwrap(),
            platform_fee: "5.00".parse().unwrap(),
            currency: "usd".to_string(),
            payment_intent_id: "pi_test".to_string(),
            transfer_id: None,
            refund_id: None,
            status,
            escrow_status,
            hold_until,
            released_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_hold_deadline_adds_window() {
        let start = Utc::now();
        assert_eq!(hold_deadline(start, 72), start + Duration::hours(72));
    }

    #[test]
    fn test_held_past_deadline_is_eligible() {
        let now = Utc::now();
        let tx = transaction(
            TransactionStatus::Succeeded,
            Some(EscrowStatus::Held),
            Some(now - Duration::hours(1)),
        );
        assert!(is_release_eligible(&tx, now));
    }

    #[test]
    fn test_not_eligible_before_deadline() {
        let now = Utc::now();
        let tx = transaction(
            TransactionStatus::Succeeded,
            Some(EscrowStatus::Held),
            Some(now + Duration::hours(24)),
        );
        assert!(!is_release_eligible(&tx, now));
    }

    #[test]
    fn test_released_and_disputed_rows_not_eligible() {
        let now = Utc::now();
        let past = Some(now - Duration::hours(1));
        let released = transaction(
            TransactionStatus::Succeeded,
            Some(EscrowStatus::Released),
            past,
        );
        let disputed = transaction(
            TransactionStatus::Succeeded,
            Some(EscrowStatus::Disputed),
            past,
        );
        assert!(!is_release_eligible(&released, now));
        assert!(!is_release_eligible(&disputed, now));
    }

    #[test]
    fn test_pending_payment_never_eligible() {
        let now = Utc::now();
        let tx = transaction(TransactionStatus::Pending, None, None);
        assert!(!is_release_eligible(&tx, now));
    }

    #[test]
    fn test_dispute_only_while_held() {
        let held = transaction(TransactionStatus::Succeeded, Some(EscrowStatus::Held), None);
        let released = transaction(
            TransactionStatus::Succeeded,
            Some(EscrowStatus::Released),
            None,
        );
        let refunded = transaction(
            TransactionStatus::Refunded,
            Some(EscrowStatus::Refunded),
            None,
        );
        assert!(can_open_dispute(&held));
        assert!(!can_open_dispute(&released));
        assert!(!can_open_dispute(&refunded));
    }

    #[test]
    fn test_seller_proceeds_nets_out_fee() {
        let tx = transaction(TransactionStatus::Succeeded, Some(EscrowStatus::Held), None);
        assert_eq!(tx.seller_proceeds(), "95.00".parse().unwrap());
    }
}
