use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::MutexGuard;
use tracing::{debug, error, info};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{PaymentKind, PaymentRequest, RecordMeta, TransactionRecord, TransactionStatus};
use crate::processor::{LedgerState, TransactionProcessor};
use crate::store::LedgerStore;
use crate::validator::{PaymentValidator, ValidatedPayment};

/// Lifecycle of a submitted payment
///
/// ```text
/// Received -> Validating -> Rejected
///                        -> Applying -> Committed
///                                    -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    Received,
    Validating,
    Rejected,
    Applying,
    Committed,
    Failed,
}

impl PaymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentState::Rejected | PaymentState::Committed | PaymentState::Failed
        )
    }

    pub fn can_advance_to(&self, next: PaymentState) -> bool {
        use PaymentState::*;
        matches!(
            (self, next),
            (Received, Validating)
                | (Received, Rejected)
                | (Validating, Rejected)
                | (Validating, Applying)
                | (Applying, Committed)
                | (Applying, Failed)
        )
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentState::Received => "received",
            PaymentState::Validating => "validating",
            PaymentState::Rejected => "rejected",
            PaymentState::Applying => "applying",
            PaymentState::Committed => "committed",
            PaymentState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A payment that ended in `Rejected` or `Failed`
///
/// Rejections are ordinary outcomes of validation and never leave any trace
/// in the balances. Failures happened after the ledger was touched; the
/// processor has already undone the mutation when this error is returned.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("payment {state}: {error}")]
pub struct PaymentError {
    pub state: PaymentState,
    #[source]
    pub error: LedgerError,
}

impl PaymentError {
    pub fn is_rejection(&self) -> bool {
        self.state == PaymentState::Rejected
    }

    pub fn code(&self) -> &'static str {
        self.error.code()
    }
}

/// Tracks the state of one payment and refuses illegal transitions
struct Lifecycle {
    state: PaymentState,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: PaymentState::Received,
        }
    }

    fn advance(&mut self, next: PaymentState) -> Result<(), PaymentError> {
        if !self.state.can_advance_to(next) {
            return Err(PaymentError {
                state: PaymentState::Failed,
                error: LedgerError::InternalInvariantViolation(format!(
                    "illegal payment transition {} -> {}",
                    self.state, next
                )),
            });
        }
        debug!(from = %self.state, to = %next, "payment state");
        self.state = next;
        Ok(())
    }

    fn end(&mut self, terminal: PaymentState, error: LedgerError) -> PaymentError {
        if let Err(illegal) = self.advance(terminal) {
            return illegal;
        }
        PaymentError {
            state: terminal,
            error,
        }
    }

    fn reject(&mut self, error: LedgerError) -> PaymentError {
        info!(code = error.code(), %error, "payment rejected");
        self.end(PaymentState::Rejected, error)
    }

    fn fail(&mut self, error: LedgerError) -> PaymentError {
        info!(code = error.code(), %error, "payment failed");
        self.end(PaymentState::Failed, error)
    }
}

/// Validated payment submission on top of a [`TransactionProcessor`]
///
/// A submission holds the ledger lock from validation until the record is
/// persisted, so no other operation can observe or change a balance between
/// the sufficiency check and the mutation. The store is called after the
/// in-memory mutation and before the record is returned; if it fails the
/// mutation is compensated.
///
/// The store is the processor's own, so the directory the validator reads is
/// the one [`TransactionProcessor::add_account`] and
/// [`TransactionProcessor::set_status`] keep up to date.
pub struct PaymentProcessor {
    processor: Arc<TransactionProcessor>,
    store: Arc<dyn LedgerStore>,
    validator: PaymentValidator,
}

impl PaymentProcessor {
    pub fn new(processor: Arc<TransactionProcessor>, config: &LedgerConfig) -> Self {
        let store = processor.store().clone();
        let validator = PaymentValidator::new(store.clone(), config);
        Self {
            processor,
            store,
            validator,
        }
    }

    pub fn processor(&self) -> &Arc<TransactionProcessor> {
        &self.processor
    }

    pub fn validator(&self) -> &PaymentValidator {
        &self.validator
    }

    /// Run a payment through validation, mutation and persistence
    ///
    /// Returns the committed record, or a [`PaymentError`] whose state tells
    /// whether the payment was rejected up front or failed while applying.
    pub async fn submit(&self, request: PaymentRequest) -> Result<TransactionRecord, PaymentError> {
        let mut lifecycle = Lifecycle::new();

        let mut ledger = match self.lock(request.timeout).await {
            Ok(ledger) => ledger,
            Err(err) => return Err(lifecycle.reject(err)),
        };

        lifecycle.advance(PaymentState::Validating)?;
        if let Some(reference) = &request.reference {
            if ledger.has_reference(reference) {
                return Err(lifecycle.reject(LedgerError::DuplicateSubmission(reference.clone())));
            }
        }
        let payment = match self.validator.validate(&request, &ledger).await {
            Ok(payment) => payment,
            Err(err) => return Err(lifecycle.reject(err)),
        };

        lifecycle.advance(PaymentState::Applying)?;
        let meta = RecordMeta {
            narration: request.narration.clone(),
            initiator: request.initiator.clone(),
        };
        let pending = match apply(&mut ledger, &payment, meta) {
            Ok(record) => record,
            Err(err) => return Err(lifecycle.fail(err)),
        };

        let mut fee_credited = false;
        if pending.fee.is_positive() {
            if let Err(err) = self.store.credit_fee(pending.fee).await {
                let err = self.compensate(&mut ledger, &pending, false, err.into()).await;
                return Err(lifecycle.fail(err));
            }
            fee_credited = true;
        }

        let mut committed = pending.clone();
        if let Err(err) = committed.settle(TransactionStatus::Completed) {
            let err = self.compensate(&mut ledger, &pending, fee_credited, err).await;
            return Err(lifecycle.fail(err));
        }
        if let Err(err) = self.store.persist(&committed).await {
            let err = self.compensate(&mut ledger, &pending, fee_credited, err.into()).await;
            return Err(lifecycle.fail(err));
        }

        let record = match ledger.settle(pending.id, TransactionStatus::Completed) {
            Ok(record) => record,
            Err(err) => return Err(lifecycle.fail(err)),
        };
        if let Some(reference) = request.reference {
            ledger.remember_reference(reference);
        }
        lifecycle.advance(PaymentState::Committed)?;

        info!(
            tx = %record.id,
            kind = ?payment.kind,
            sender = %payment.sender,
            receiver = %payment.receiver,
            amount = %record.amount,
            fee = %record.fee,
            "payment committed"
        );
        Ok(record)
    }

    /// Undo an applied payment after a later step failed
    ///
    /// Returns the error to report: the original cause, or an invariant
    /// violation if the ledger or the fee could not be restored.
    async fn compensate(
        &self,
        ledger: &mut LedgerState,
        pending: &TransactionRecord,
        fee_credited: bool,
        cause: LedgerError,
    ) -> LedgerError {
        if let Err(err) = ledger.revert(pending.id) {
            error!(
                tx = %pending.id,
                %cause,
                %err,
                "compensation failed, ledger needs operator attention"
            );
            return LedgerError::InternalInvariantViolation(format!(
                "could not revert {} after {}: {}",
                pending.id, cause, err
            ));
        }

        if fee_credited {
            if let Err(err) = self.store.refund_fee(pending.fee).await {
                error!(
                    tx = %pending.id,
                    fee = %pending.fee,
                    %err,
                    "fee refund failed, fee collector needs operator attention"
                );
                return LedgerError::InternalInvariantViolation(format!(
                    "could not refund fee {} of {}: {}",
                    pending.fee, pending.id, err
                ));
            }
        }

        debug!(tx = %pending.id, %cause, "payment compensated");
        cause
    }

    async fn lock(&self, timeout: Option<Duration>) -> LedgerResult<MutexGuard<'_, LedgerState>> {
        let timeout = timeout.or(self.processor.lock_timeout());
        self.processor.lock(timeout).await
    }
}

fn apply(
    ledger: &mut LedgerState,
    payment: &ValidatedPayment,
    meta: RecordMeta,
) -> LedgerResult<TransactionRecord> {
    match (&payment.kind, &payment.payer) {
        (PaymentKind::Deposit, _) | (_, None) => {
            ledger.apply_deposit(&payment.payee, payment.amount, meta)
        }
        (_, Some(payer)) => {
            ledger.apply_transfer(payer, &payment.payee, payment.amount, payment.fee, meta)
        }
    }
}

impl fmt::Debug for PaymentProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentProcessor")
            .field("processor", &self.processor)
            .finish_non_exhaustive()
    }
}
