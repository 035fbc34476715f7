//! Payment session state machine and the per-bill intent registry.
//!
//! Everything here is plain state: the modal component feeds events in
//! (intent arrived, user submitted, processor answered, user walked away)
//! and acts on the [`FlowEffect`] that comes back. Keeping the decisions
//! out of the component makes the money-handling rules testable without a
//! browser.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::api::IntentSecret;
use crate::model::{AmountError, Bill};
use crate::processor::ConfirmationOutcome;

/// Where a payment session currently stands.
///
/// `Failed` is terminal for the attempt, not the session: with a secret
/// still in hand the user may retry back into `Collecting`.
#[derive(Clone, Debug, PartialEq)]
pub enum PaymentPhase {
    Idle,
    /// Intent requested; the secret is not back yet.
    AwaitingSecret,
    /// Secret present; the user is entering payment details.
    Collecting,
    /// Submission on the wire. A second submission is rejected locally.
    Confirming,
    Succeeded,
    Failed(String),
    /// The processor needs additional authentication before this attempt
    /// can reach a terminal state.
    RequiresAction,
}

/// What the UI layer must do after feeding an event into the flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowEffect {
    /// Nothing beyond re-rendering the current phase.
    None,
    /// Close the modal, acknowledge success, refresh the bill store once.
    CloseAndReconcile,
    /// The session was abandoned mid-confirmation and the outcome arrived
    /// anyway: refresh the bill store without touching the closed modal.
    ReconcileSilently,
    /// Hand control back to the processor for additional authentication.
    ResolveAction,
}

/// How an abandon request lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbandonMode {
    /// Session fully closed; nothing outstanding.
    Closed,
    /// The modal closes now, but a confirmation is still on the wire and
    /// its outcome will be applied when it arrives.
    OutcomePending,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("this bill is already settled")]
    AlreadyPaid,
    #[error(transparent)]
    Amount(#[from] AmountError),
}

/// Why a submission was turned away without reaching the processor.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SubmitRejection {
    #[error("a confirmation is already in flight")]
    InFlight,
    #[error("payment details are not ready for submission")]
    NotReady,
}

/// One bill's trip through the payment workflow. UI-session scoped;
/// dropped when the modal closes.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentFlow {
    bill_id: String,
    amount_pence: i64,
    phase: PaymentPhase,
    secret: Option<IntentSecret>,
    abandoned: bool,
}

impl PaymentFlow {
    /// Open a session for a payable bill. Settled bills are rejected up
    /// front; the pay action should never have been offered.
    pub fn open(bill: &Bill) -> Result<Self, SessionError> {
        if !bill.is_payable() {
            return Err(SessionError::AlreadyPaid);
        }
        let amount_pence = bill.amount_pence()?;
        Ok(Self {
            bill_id: bill.id.clone(),
            amount_pence,
            phase: PaymentPhase::AwaitingSecret,
            secret: None,
            abandoned: false,
        })
    }

    pub fn bill_id(&self) -> &str {
        &self.bill_id
    }

    /// Amount the intent must be created for: the bill's outstanding
    /// amount as displayed when the session opened.
    pub fn amount_pence(&self) -> i64 {
        self.amount_pence
    }

    pub fn phase(&self) -> &PaymentPhase {
        &self.phase
    }

    pub fn secret(&self) -> Option<&IntentSecret> {
        self.secret.as_ref()
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    /// A failed attempt can be retried only while a secret is in hand;
    /// intent-creation failures need a fresh session instead.
    pub fn can_retry(&self) -> bool {
        matches!(self.phase, PaymentPhase::Failed(_)) && self.secret.is_some()
    }

    /// The intent arrived: collection may begin.
    pub fn secret_received(&mut self, secret: IntentSecret) {
        if self.phase == PaymentPhase::AwaitingSecret {
            self.secret = Some(secret);
            self.phase = PaymentPhase::Collecting;
        }
    }

    /// Intent creation failed. Surfaced as a failed phase the user can
    /// see and dismiss, never a silent retry or an indefinite spinner.
    pub fn intent_failed(&mut self, message: impl Into<String>) {
        self.phase = PaymentPhase::Failed(message.into());
    }

    /// Explicit user submission. Only legal from `Collecting`; while a
    /// confirmation is outstanding a repeat submission is rejected here
    /// and never forwarded to the processor.
    pub fn begin_submit(&mut self) -> Result<(), SubmitRejection> {
        match self.phase {
            PaymentPhase::Collecting => {
                self.phase = PaymentPhase::Confirming;
                Ok(())
            }
            PaymentPhase::Confirming => Err(SubmitRejection::InFlight),
            _ => Err(SubmitRejection::NotReady),
        }
    }

    /// After a failed attempt, return to collection with the same secret.
    pub fn retry(&mut self) {
        if self.can_retry() {
            self.phase = PaymentPhase::Collecting;
        }
    }

    /// Apply the processor's answer for the outstanding attempt.
    pub fn apply_outcome(&mut self, outcome: ConfirmationOutcome) -> FlowEffect {
        match self.phase {
            PaymentPhase::Confirming | PaymentPhase::RequiresAction => {}
            // No attempt outstanding; a stale or duplicate report changes
            // nothing.
            _ => return FlowEffect::None,
        }
        match outcome {
            ConfirmationOutcome::Succeeded => {
                self.phase = PaymentPhase::Succeeded;
                if self.abandoned {
                    FlowEffect::ReconcileSilently
                } else {
                    FlowEffect::CloseAndReconcile
                }
            }
            ConfirmationOutcome::Failed(err) => {
                self.phase = PaymentPhase::Failed(err.message);
                FlowEffect::None
            }
            ConfirmationOutcome::RequiresAction => {
                self.phase = PaymentPhase::RequiresAction;
                if self.abandoned {
                    // Nobody is there to authenticate; drop the attempt.
                    FlowEffect::None
                } else {
                    FlowEffect::ResolveAction
                }
            }
        }
    }

    /// The user walks away. From `Confirming` (or while an action is
    /// being resolved) the in-flight call is not cancelled: the modal
    /// closes now and the outcome is applied silently when it lands.
    pub fn abandon(&mut self) -> AbandonMode {
        self.abandoned = true;
        match self.phase {
            PaymentPhase::Confirming | PaymentPhase::RequiresAction => AbandonMode::OutcomePending,
            _ => AbandonMode::Closed,
        }
    }
}

/// State of one bill's slot in the [`IntentRegistry`].
#[derive(Clone, Debug, PartialEq)]
enum IntentSlot {
    /// createIntent is on the wire.
    Requested,
    /// A live intent whose secret is reused until the session closes.
    Created(IntentSecret),
}

/// Answer to [`IntentRegistry::claim`].
#[derive(Clone, Debug, PartialEq)]
pub enum IntentClaim {
    /// Caller owns the slot and must request the intent.
    New,
    /// An intent already exists for this bill; reuse its secret instead
    /// of minting a duplicate the user could pay twice.
    Existing(IntentSecret),
    /// A request for this bill is already on the wire; wait, don't issue
    /// another.
    Pending,
}

/// Guards the one-chargeable-intent-per-bill invariant for the lifetime
/// of the UI session. The slot is claimed before the network call goes
/// out and released only when the payment session closes.
#[derive(Clone, Default)]
pub struct IntentRegistry {
    slots: Rc<RefCell<HashMap<String, IntentSlot>>>,
}

impl IntentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, bill_id: &str) -> IntentClaim {
        let mut slots = self.slots.borrow_mut();
        match slots.get(bill_id) {
            Some(IntentSlot::Created(secret)) => IntentClaim::Existing(secret.clone()),
            Some(IntentSlot::Requested) => IntentClaim::Pending,
            None => {
                slots.insert(bill_id.to_string(), IntentSlot::Requested);
                IntentClaim::New
            }
        }
    }

    /// The backend answered: keep the secret for reuse within this
    /// session.
    pub fn fulfilled(&self, bill_id: &str, secret: IntentSecret) {
        self.slots
            .borrow_mut()
            .insert(bill_id.to_string(), IntentSlot::Created(secret));
    }

    /// Free the slot, on session close or when intent creation failed.
    /// A stale secret is never reused past its session.
    pub fn release(&self, bill_id: &str) {
        self.slots.borrow_mut().remove(bill_id);
    }
}

// Handle identity for prop diffing.
impl PartialEq for IntentRegistry {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slots, &other.slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BillStatus;
    use crate::processor::ProcessorError;

    fn pending_bill(id: &str, amount: &str) -> Bill {
        Bill {
            id: id.into(),
            period_start: "2025-06-01".into(),
            period_end: "2025-06-30".into(),
            total_amount: amount.into(),
            status: BillStatus::Pending,
            generated_at: "2025-07-01T00:00:00Z".into(),
        }
    }

    fn declined() -> ConfirmationOutcome {
        ConfirmationOutcome::Failed(ProcessorError {
            message: "Your card was declined.".into(),
            error_type: Some("card_error".into()),
            code: Some("card_declined".into()),
        })
    }

    #[test]
    fn settled_bills_cannot_open_a_session() {
        let mut bill = pending_bill("b1", "42.50");
        bill.status = BillStatus::Paid;
        assert_eq!(PaymentFlow::open(&bill), Err(SessionError::AlreadyPaid));
    }

    #[test]
    fn happy_path_closes_and_reconciles_exactly_once() {
        // bill b1, 42.50, PENDING → open → secret → submit → success.
        let bill = pending_bill("b1", "42.50");
        let mut flow = PaymentFlow::open(&bill).unwrap();
        assert_eq!(flow.phase(), &PaymentPhase::AwaitingSecret);
        assert_eq!(flow.amount_pence(), 4250);

        flow.secret_received(IntentSecret::new("sec_1"));
        assert_eq!(flow.phase(), &PaymentPhase::Collecting);

        flow.begin_submit().unwrap();
        assert_eq!(flow.phase(), &PaymentPhase::Confirming);

        assert_eq!(
            flow.apply_outcome(ConfirmationOutcome::Succeeded),
            FlowEffect::CloseAndReconcile
        );
        assert_eq!(flow.phase(), &PaymentPhase::Succeeded);

        // A duplicate report must not trigger a second reconciliation.
        assert_eq!(
            flow.apply_outcome(ConfirmationOutcome::Succeeded),
            FlowEffect::None
        );
    }

    #[test]
    fn a_second_submission_is_rejected_while_one_is_outstanding() {
        let bill = pending_bill("b1", "42.50");
        let mut flow = PaymentFlow::open(&bill).unwrap();
        flow.secret_received(IntentSecret::new("sec_1"));
        flow.begin_submit().unwrap();
        assert_eq!(flow.begin_submit(), Err(SubmitRejection::InFlight));
    }

    #[test]
    fn submission_is_unreachable_without_a_secret() {
        let bill = pending_bill("b1", "42.50");
        let mut flow = PaymentFlow::open(&bill).unwrap();
        assert_eq!(flow.begin_submit(), Err(SubmitRejection::NotReady));
    }

    #[test]
    fn intent_failure_surfaces_and_blocks_collection() {
        // Scenario: createIntent for b2 fails with "already paid".
        let bill = pending_bill("b2", "10.00");
        let mut flow = PaymentFlow::open(&bill).unwrap();
        flow.intent_failed("Bill already paid.");

        assert_eq!(flow.phase(), &PaymentPhase::Failed("Bill already paid.".into()));
        assert_eq!(flow.secret(), None);
        assert!(!flow.can_retry());
        assert_eq!(flow.begin_submit(), Err(SubmitRejection::NotReady));
    }

    #[test]
    fn declined_attempt_can_retry_with_the_same_secret() {
        let bill = pending_bill("b1", "42.50");
        let mut flow = PaymentFlow::open(&bill).unwrap();
        flow.secret_received(IntentSecret::new("sec_1"));
        flow.begin_submit().unwrap();

        assert_eq!(flow.apply_outcome(declined()), FlowEffect::None);
        assert!(matches!(flow.phase(), PaymentPhase::Failed(_)));
        assert!(flow.can_retry());

        flow.retry();
        assert_eq!(flow.phase(), &PaymentPhase::Collecting);
        assert_eq!(flow.secret().map(|s| s.as_str()), Some("sec_1"));
        flow.begin_submit().unwrap();
    }

    #[test]
    fn requires_action_waits_and_then_resolves_either_way() {
        let bill = pending_bill("b1", "42.50");
        let mut flow = PaymentFlow::open(&bill).unwrap();
        flow.secret_received(IntentSecret::new("sec_1"));
        flow.begin_submit().unwrap();

        assert_eq!(
            flow.apply_outcome(ConfirmationOutcome::RequiresAction),
            FlowEffect::ResolveAction
        );
        assert_eq!(flow.phase(), &PaymentPhase::RequiresAction);

        // Resolution may still fail…
        let mut failed = flow.clone();
        assert_eq!(failed.apply_outcome(declined()), FlowEffect::None);
        assert!(matches!(failed.phase(), PaymentPhase::Failed(_)));

        // …or succeed, with the usual reconciliation.
        assert_eq!(
            flow.apply_outcome(ConfirmationOutcome::Succeeded),
            FlowEffect::CloseAndReconcile
        );
    }

    #[test]
    fn abandoning_mid_confirmation_still_reconciles_silently() {
        let bill = pending_bill("b1", "42.50");
        let mut flow = PaymentFlow::open(&bill).unwrap();
        flow.secret_received(IntentSecret::new("sec_1"));
        flow.begin_submit().unwrap();

        assert_eq!(flow.abandon(), AbandonMode::OutcomePending);

        // The in-flight call resolves after the modal is gone: the store
        // still gets refreshed, the closed modal does not reopen.
        assert_eq!(
            flow.apply_outcome(ConfirmationOutcome::Succeeded),
            FlowEffect::ReconcileSilently
        );
    }

    #[test]
    fn abandoning_before_submission_closes_outright() {
        let bill = pending_bill("b1", "42.50");
        let mut flow = PaymentFlow::open(&bill).unwrap();
        assert_eq!(flow.abandon(), AbandonMode::Closed);

        let mut collecting = PaymentFlow::open(&bill).unwrap();
        collecting.secret_received(IntentSecret::new("sec_1"));
        assert_eq!(collecting.abandon(), AbandonMode::Closed);
    }

    #[test]
    fn opening_twice_creates_exactly_one_intent() {
        let registry = IntentRegistry::new();

        // First open: the caller must request the intent.
        assert_eq!(registry.claim("b1"), IntentClaim::New);
        // Reopening while the request is on the wire does not issue
        // another.
        assert_eq!(registry.claim("b1"), IntentClaim::Pending);

        registry.fulfilled("b1", IntentSecret::new("sec_1"));
        match registry.claim("b1") {
            IntentClaim::Existing(secret) => assert_eq!(secret.as_str(), "sec_1"),
            other => panic!("expected the existing intent, got {other:?}"),
        }

        // Closing the session frees the slot; the next open starts fresh.
        registry.release("b1");
        assert_eq!(registry.claim("b1"), IntentClaim::New);
    }

    #[test]
    fn registry_slots_are_per_bill() {
        let registry = IntentRegistry::new();
        assert_eq!(registry.claim("b1"), IntentClaim::New);
        assert_eq!(registry.claim("b2"), IntentClaim::New);
        registry.release("b1");
        assert_eq!(registry.claim("b2"), IntentClaim::Pending);
    }
}
