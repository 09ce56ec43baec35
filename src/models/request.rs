use std::time::Duration;

use serde::Deserialize;

/// The kind of payment being initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// Sender pushes funds to the receiver and pays the fee
    Credit,
    /// Sender pulls funds from the receiver, who pays the fee
    Debit,
    /// Transfer under a full-access mandate, no fee
    FullAccessTransfer,
    /// External funds paid into the receiver, no fee
    Deposit,
}

impl PaymentKind {
    pub fn charges_fee(&self) -> bool {
        matches!(self, PaymentKind::Credit | PaymentKind::Debit)
    }
}

/// A payment as submitted by a caller, before any validation
///
/// Participants are compound identifiers such as `alice@bank01`; the amount
/// is kept raw so that parsing failures surface in validation order.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub kind: PaymentKind,
    pub sender: String,
    pub receiver: String,
    pub amount: String,
    pub narration: String,
    pub initiator: String,
    /// Caller-chosen idempotency key
    pub reference: Option<String>,
    /// Deadline for acquiring the ledger lock
    pub timeout: Option<Duration>,
}

impl PaymentRequest {
    pub fn new(
        kind: PaymentKind,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            sender: sender.into(),
            receiver: receiver.into(),
            amount: amount.into(),
            narration: String::new(),
            initiator: String::new(),
            reference: None,
            timeout: None,
        }
    }

    pub fn with_narration(mut self, narration: impl Into<String>) -> Self {
        self.narration = narration.into();
        self
    }

    pub fn with_initiator(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = initiator.into();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
