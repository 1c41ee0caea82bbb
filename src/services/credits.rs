//! Credit purchase (gateway top-up) and cashout flows. A completed top-up
//! re-runs the mediation settlement scan for the buyer, so resolved cases
//! settle as soon as funds allow.

use std::sync::Arc;

use chrono::Utc;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{CreditTransaction, TransactionKind, TransactionStatus, User};
use crate::services::gateway::{PaymentSession, PaymentStatus};
use crate::services::ledger;
use crate::services::mediation;
use crate::services::notify::{self, NotifyCategory};
use crate::state::AppState;

pub struct PurchaseStart {
    pub transaction: CreditTransaction,
    pub session: PaymentSession,
}

/// Open a payment session for a credit purchase. The pending transaction is
/// the audit anchor; the gateway reference ties callbacks back to it.
pub async fn start_purchase(
    state: &Arc<AppState>,
    user: &User,
    amount: i64,
) -> Result<PurchaseStart, AppError> {
    if amount <= 0 {
        return Err(AppError::Validation("amount must be positive".to_string()));
    }

    let now = Utc::now().naive_utc();
    let mut transaction = CreditTransaction {
        id: uuid::Uuid::new_v4().to_string(),
        sender_id: None,
        recipient_id: Some(user.id.clone()),
        amount,
        kind: TransactionKind::Purchase,
        status: TransactionStatus::Pending,
        details: None,
        reference_id: None,
        created_at: now,
        updated_at: now,
    };

    {
        let db = state.db.lock().unwrap();
        queries::insert_transaction(&db, &transaction)?;
    }

    let session = match state.gateway.initiate(amount, &transaction.id, &user.id).await {
        Ok(session) => session,
        Err(e) => {
            let db = state.db.lock().unwrap();
            queries::finalize_transaction(
                &db,
                &transaction.id,
                TransactionStatus::Failed,
                Some("gateway initiation failed"),
            )?;
            return Err(AppError::Gateway(e.to_string()));
        }
    };

    {
        let db = state.db.lock().unwrap();
        queries::set_transaction_reference(&db, &transaction.id, &session.reference_id)?;
    }
    transaction.reference_id = Some(session.reference_id.clone());

    tracing::info!(
        transaction = %transaction.id,
        reference = %session.reference_id,
        amount,
        "purchase initiated"
    );

    Ok(PurchaseStart {
        transaction,
        session,
    })
}

/// Gateway callback for a purchase. The gateway is re-queried
/// server-to-server before anything is applied; a replayed callback for an
/// already-finalized record is a no-op reporting the stored status.
pub async fn handle_purchase_callback(
    state: &Arc<AppState>,
    reference_id: &str,
) -> Result<TransactionStatus, AppError> {
    let transaction = {
        let db = state.db.lock().unwrap();
        queries::get_transaction_by_reference(&db, reference_id)?
            .ok_or_else(|| AppError::NotFound("purchase".to_string()))?
    };

    if transaction.status != TransactionStatus::Pending {
        return Ok(transaction.status);
    }

    let verification = state
        .gateway
        .verify(reference_id)
        .await
        .map_err(|e| AppError::Gateway(e.to_string()))?;

    match verification.status {
        PaymentStatus::Pending => return Ok(TransactionStatus::Pending),
        PaymentStatus::Failed => {
            let db = state.db.lock().unwrap();
            queries::finalize_transaction(
                &db,
                &transaction.id,
                TransactionStatus::Failed,
                Some("payment failed at gateway"),
            )?;
            return Ok(TransactionStatus::Failed);
        }
        PaymentStatus::Completed => {}
    }

    if verification.amount != transaction.amount {
        tracing::warn!(
            transaction = %transaction.id,
            expected = transaction.amount,
            paid = verification.amount,
            "purchase amount mismatch"
        );
        let db = state.db.lock().unwrap();
        queries::finalize_transaction(
            &db,
            &transaction.id,
            TransactionStatus::Failed,
            Some("paid amount does not match purchase"),
        )?;
        return Ok(TransactionStatus::Failed);
    }

    let user_id = transaction
        .recipient_id
        .clone()
        .ok_or_else(|| AppError::InvalidState("purchase without a recipient".to_string()))?;

    let applied = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;
        // The pending guard wins any race between duplicate callbacks: only
        // the first one applies the top-up.
        let applied =
            queries::finalize_transaction(&tx, &transaction.id, TransactionStatus::Completed, None)?;
        if applied {
            ledger::top_up(&tx, &user_id, transaction.amount)?;
        }
        tx.commit()?;
        applied
    };

    if !applied {
        let db = state.db.lock().unwrap();
        let current = queries::get_transaction(&db, &transaction.id)?
            .map(|t| t.status)
            .unwrap_or(TransactionStatus::Failed);
        return Ok(current);
    }

    tracing::info!(transaction = %transaction.id, amount = transaction.amount, "top-up applied");

    notify::dispatch(
        state,
        &user_id,
        &format!("{} credits were added to your balance", transaction.amount),
        NotifyCategory::CreditsPurchased,
        serde_json::json!({ "transaction_id": transaction.id, "amount": transaction.amount }),
        None,
    )
    .await;

    // Funds became available: settle what now fits.
    mediation::settle_pending(state, &user_id).await?;

    Ok(TransactionStatus::Completed)
}

/// Debit credits out of the platform into a pending cashout, awaiting an
/// admin decision.
pub async fn request_cashout(
    state: &Arc<AppState>,
    user: &User,
    amount: i64,
) -> Result<CreditTransaction, AppError> {
    if amount <= 0 {
        return Err(AppError::Validation("amount must be positive".to_string()));
    }

    let (transaction, admin_ids) = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        ledger::debit(&tx, &user.id, amount)?;

        let now = Utc::now().naive_utc();
        let transaction = CreditTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id: Some(user.id.clone()),
            recipient_id: None,
            amount,
            kind: TransactionKind::Cashout,
            status: TransactionStatus::Pending,
            details: None,
            reference_id: None,
            created_at: now,
            updated_at: now,
        };
        queries::insert_transaction(&tx, &transaction)?;

        let admin_ids = queries::get_admin_ids(&tx)?;
        tx.commit()?;
        (transaction, admin_ids)
    };

    for admin_id in &admin_ids {
        notify::dispatch(
            state,
            admin_id,
            &format!("{} requested a cashout of {} credits", user.name, amount),
            NotifyCategory::CashoutRequested,
            serde_json::json!({ "transaction_id": transaction.id, "amount": amount }),
            Some(&user.id),
        )
        .await;
    }

    Ok(transaction)
}

/// Admin decision on a pending cashout. Denial returns the debited credits.
pub async fn resolve_cashout(
    state: &Arc<AppState>,
    admin: &User,
    transaction_id: &str,
    approve: bool,
) -> Result<CreditTransaction, AppError> {
    if !admin.is_admin() {
        return Err(AppError::Unauthorized);
    }

    let transaction = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        let transaction = queries::get_transaction(&tx, transaction_id)?
            .ok_or_else(|| AppError::NotFound("cashout".to_string()))?;
        if transaction.kind != TransactionKind::Cashout {
            return Err(AppError::Validation("not a cashout transaction".to_string()));
        }

        let status = if approve {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Rejected
        };
        if !queries::finalize_transaction(&tx, &transaction.id, status, None)? {
            return Err(AppError::InvalidTransition(
                "cashout was already resolved".to_string(),
            ));
        }

        if !approve {
            let user_id = transaction.sender_id.clone().ok_or_else(|| {
                AppError::InvalidState("cashout without a sender".to_string())
            })?;
            ledger::credit(&tx, &user_id, transaction.amount)?;
        }
        tx.commit()?;

        CreditTransaction {
            status,
            ..transaction
        }
    };

    if let Some(user_id) = &transaction.sender_id {
        let outcome = if approve { "approved" } else { "rejected and refunded" };
        notify::dispatch(
            state,
            user_id,
            &format!(
                "Your cashout of {} credits was {outcome}",
                transaction.amount
            ),
            NotifyCategory::CashoutResolved,
            serde_json::json!({ "transaction_id": transaction.id, "approved": approve }),
            None,
        )
        .await;
    }

    Ok(transaction)
}
