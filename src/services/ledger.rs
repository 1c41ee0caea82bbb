//! Credit ledger: every balance mutation goes through here, always inside a
//! caller-owned SQLite transaction so paired debit/credit either both land
//! or neither does.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{CreditTransaction, TransactionKind, TransactionStatus};

/// Earmark credits for a pending booking: spendable -> held.
pub fn hold(conn: &Connection, user_id: &str, amount: i64) -> Result<(), AppError> {
    check_amount(amount)?;

    let count = conn.execute(
        "UPDATE users
         SET time_credits = time_credits - ?1,
             held_credits = held_credits + ?1,
             updated_at = ?2
         WHERE id = ?3 AND time_credits >= ?1",
        params![amount, now_ts(), user_id],
    )?;

    if count == 0 {
        return Err(match queries::get_user(conn, user_id)? {
            Some(_) => AppError::InsufficientCredits,
            None => AppError::NotFound("user".to_string()),
        });
    }
    Ok(())
}

/// Inverse of [`hold`]: held -> spendable, used on rejection and on
/// mediation resolution before the final transfer.
pub fn release(conn: &Connection, user_id: &str, amount: i64) -> Result<(), AppError> {
    check_amount(amount)?;

    let count = conn.execute(
        "UPDATE users
         SET time_credits = time_credits + ?1,
             held_credits = held_credits - ?1,
             updated_at = ?2
         WHERE id = ?3 AND held_credits >= ?1",
        params![amount, now_ts(), user_id],
    )?;

    if count == 0 {
        return Err(match queries::get_user(conn, user_id)? {
            Some(_) => AppError::InvalidState(format!(
                "held balance lower than release amount {amount}"
            )),
            None => AppError::NotFound("user".to_string()),
        });
    }
    Ok(())
}

/// Atomic debit+credit between two users, with an audit record in the same
/// transaction. The debit is guarded; a failure on the credit side leaves
/// the caller's transaction to roll the debit back.
pub fn transfer(
    conn: &Connection,
    from_user_id: &str,
    to_user_id: &str,
    amount: i64,
    kind: TransactionKind,
    details: Option<&str>,
) -> Result<CreditTransaction, AppError> {
    check_amount(amount)?;
    if from_user_id == to_user_id {
        return Err(AppError::Validation(
            "cannot transfer credits to the same user".to_string(),
        ));
    }

    debit(conn, from_user_id, amount)?;
    credit(conn, to_user_id, amount)?;

    let now = Utc::now().naive_utc();
    let record = CreditTransaction {
        id: uuid::Uuid::new_v4().to_string(),
        sender_id: Some(from_user_id.to_string()),
        recipient_id: Some(to_user_id.to_string()),
        amount,
        kind,
        status: TransactionStatus::Completed,
        details: details.map(|d| d.to_string()),
        reference_id: None,
        created_at: now,
        updated_at: now,
    };
    queries::insert_transaction(conn, &record)?;

    Ok(record)
}

/// Add purchased credits to a user's spendable balance.
pub fn top_up(conn: &Connection, user_id: &str, amount: i64) -> Result<(), AppError> {
    check_amount(amount)?;
    credit(conn, user_id, amount)
}

/// Guarded spendable-balance debit. Fails without touching the row when the
/// balance cannot cover the amount.
pub fn debit(conn: &Connection, user_id: &str, amount: i64) -> Result<(), AppError> {
    check_amount(amount)?;

    let count = conn.execute(
        "UPDATE users SET time_credits = time_credits - ?1, updated_at = ?2
         WHERE id = ?3 AND time_credits >= ?1",
        params![amount, now_ts(), user_id],
    )?;

    if count == 0 {
        return Err(match queries::get_user(conn, user_id)? {
            Some(_) => AppError::InsufficientCredits,
            None => AppError::NotFound("user".to_string()),
        });
    }
    Ok(())
}

pub fn credit(conn: &Connection, user_id: &str, amount: i64) -> Result<(), AppError> {
    check_amount(amount)?;

    let count = conn.execute(
        "UPDATE users SET time_credits = time_credits + ?1, updated_at = ?2 WHERE id = ?3",
        params![amount, now_ts(), user_id],
    )?;

    if count == 0 {
        return Err(AppError::NotFound("user".to_string()));
    }
    Ok(())
}

fn check_amount(amount: i64) -> Result<(), AppError> {
    if amount < 0 {
        return Err(AppError::Validation("amount must not be negative".to_string()));
    }
    Ok(())
}

fn now_ts() -> String {
    queries::fmt_ts(&Utc::now().naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Role, User};

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn make_user(conn: &Connection, id: &str, balance: i64) {
        let now = Utc::now().naive_utc();
        queries::create_user(
            conn,
            &User {
                id: id.to_string(),
                name: id.to_string(),
                role: Role::User,
                time_credits: balance,
                held_credits: 0,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
    }

    fn balances(conn: &Connection, id: &str) -> (i64, i64) {
        let user = queries::get_user(conn, id).unwrap().unwrap();
        (user.time_credits, user.held_credits)
    }

    #[test]
    fn test_hold_moves_spendable_to_held() {
        let conn = setup_db();
        make_user(&conn, "alice", 1000);

        hold(&conn, "alice", 400).unwrap();
        assert_eq!(balances(&conn, "alice"), (600, 400));
    }

    #[test]
    fn test_hold_insufficient_leaves_balances_untouched() {
        let conn = setup_db();
        make_user(&conn, "alice", 300);

        let err = hold(&conn, "alice", 400).unwrap_err();
        assert!(matches!(err, AppError::InsufficientCredits));
        assert_eq!(balances(&conn, "alice"), (300, 0));
    }

    #[test]
    fn test_hold_unknown_user() {
        let conn = setup_db();
        let err = hold(&conn, "ghost", 100).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_release_is_inverse_of_hold() {
        let conn = setup_db();
        make_user(&conn, "alice", 1000);

        hold(&conn, "alice", 400).unwrap();
        release(&conn, "alice", 400).unwrap();
        assert_eq!(balances(&conn, "alice"), (1000, 0));
    }

    #[test]
    fn test_release_more_than_held_fails() {
        let conn = setup_db();
        make_user(&conn, "alice", 1000);
        hold(&conn, "alice", 200).unwrap();

        let err = release(&conn, "alice", 300).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(balances(&conn, "alice"), (800, 200));
    }

    #[test]
    fn test_transfer_debits_and_credits_together() {
        let conn = setup_db();
        make_user(&conn, "alice", 1000);
        make_user(&conn, "bob", 0);

        let record = transfer(
            &conn,
            "alice",
            "bob",
            250,
            TransactionKind::BookingPayment,
            Some("test"),
        )
        .unwrap();

        assert_eq!(balances(&conn, "alice"), (750, 0));
        assert_eq!(balances(&conn, "bob"), (250, 0));

        let stored = queries::get_transaction(&conn, &record.id).unwrap().unwrap();
        assert_eq!(stored.amount, 250);
        assert_eq!(stored.sender_id.as_deref(), Some("alice"));
        assert_eq!(stored.recipient_id.as_deref(), Some("bob"));
    }

    #[test]
    fn test_transfer_insufficient_applies_nothing() {
        let conn = setup_db();
        make_user(&conn, "alice", 100);
        make_user(&conn, "bob", 0);

        let err = transfer(&conn, "alice", "bob", 250, TransactionKind::BookingPayment, None)
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientCredits));
        assert_eq!(balances(&conn, "alice"), (100, 0));
        assert_eq!(balances(&conn, "bob"), (0, 0));
    }

    // Failure injected after the debit (missing recipient): rolling back the
    // surrounding transaction must undo the half-applied transfer.
    #[test]
    fn test_transfer_atomicity_on_midway_failure() {
        let mut conn = setup_db();
        make_user(&conn, "alice", 1000);

        {
            let tx = conn.transaction().unwrap();
            let err =
                transfer(&tx, "alice", "ghost", 300, TransactionKind::BookingPayment, None)
                    .unwrap_err();
            assert!(matches!(err, AppError::NotFound(_)));
            // dropped without commit -> rollback
        }

        assert_eq!(balances(&conn, "alice"), (1000, 0));
    }

    #[test]
    fn test_transfer_to_self_rejected() {
        let conn = setup_db();
        make_user(&conn, "alice", 1000);

        let err = transfer(&conn, "alice", "alice", 100, TransactionKind::BookingPayment, None)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(balances(&conn, "alice"), (1000, 0));
    }

    #[test]
    fn test_zero_amount_transfer_is_a_recorded_noop() {
        let conn = setup_db();
        make_user(&conn, "alice", 100);
        make_user(&conn, "bob", 0);

        transfer(&conn, "alice", "bob", 0, TransactionKind::MediationSettlement, None).unwrap();
        assert_eq!(balances(&conn, "alice"), (100, 0));
        assert_eq!(balances(&conn, "bob"), (0, 0));
    }

    #[test]
    fn test_negative_amount_rejected() {
        let conn = setup_db();
        make_user(&conn, "alice", 100);

        assert!(matches!(
            hold(&conn, "alice", -5).unwrap_err(),
            AppError::Validation(_)
        ));
        assert!(matches!(
            top_up(&conn, "alice", -5).unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[test]
    fn test_top_up_adds_spendable_credits() {
        let conn = setup_db();
        make_user(&conn, "alice", 100);

        top_up(&conn, "alice", 900).unwrap();
        assert_eq!(balances(&conn, "alice"), (1000, 0));
    }
}
