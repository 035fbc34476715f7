//! Drop-in payment modal for one bill.
//!
//! The modal drives the whole payment session: it claims the per-bill
//! intent slot, requests the intent, mounts the processor's
//! card-collection widget once the SDK and the secret are both in hand,
//! submits on explicit user action, and dispatches the resulting
//! [`FlowEffect`]: closing, reconciling the bill store, resolving
//! additional authentication, or surfacing a retryable error. All
//! decisions live in [`PaymentFlow`]; this component only renders phases
//! and runs effects.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen_futures::spawn_local;
use yew::prelude::*;

use crate::api::{with_deadline, ApiClient, ApiError};
use crate::components::Button;
use crate::config::BillingConfig;
use crate::interop::use_stripe_sdk;
use crate::model::Bill;
use crate::processor::{
    confirm_payment, mount_payment_widget, resolve_next_action, unmount_payment_widget,
    ConfirmParams, ConfirmationOutcome, ElementsOptions, ProcessorError,
};
use crate::session::{
    AbandonMode, FlowEffect, IntentClaim, IntentRegistry, PaymentFlow, PaymentPhase, SessionError,
};
use crate::store::BillStore;

const WIDGET_SELECTOR: &str = "#ybp-payment-element";

/// Bounded waits: a call that never resolves surfaces as a retryable
/// failure instead of wedging the modal.
const INTENT_TIMEOUT_MS: u32 = 15_000;
const CONFIRM_TIMEOUT_MS: u32 = 90_000;

// An attempt that keeps asking for further action is going nowhere.
const MAX_ACTION_ROUNDS: u32 = 3;

const TIMEOUT_MESSAGE: &str = "The payment service did not respond. Please try again.";
const AUTH_EXPIRED_MESSAGE: &str = "Your session has expired. Please sign in again.";
const ACTION_STALLED_MESSAGE: &str =
    "Additional authentication did not complete. Please try again.";

/// Why the modal closed. `Paid` means a success acknowledgment is in
/// order; the bill store refresh has already been issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    Paid,
    Cancelled,
    Dismissed,
}

#[derive(Properties, PartialEq)]
pub struct PaymentModalProps {
    pub bill: Bill,
    pub config: BillingConfig,
    pub api: ApiClient,
    pub store: BillStore,
    pub registry: IntentRegistry,
    pub on_close: Callback<CloseReason>,
    /// The credential died underneath us; the shell must re-authenticate.
    #[prop_or_default]
    pub on_auth_expired: Callback<()>,
}

type Flow = Rc<RefCell<Result<PaymentFlow, SessionError>>>;
type WidgetHandles = Option<(
    crate::bindings::JsStripe,
    crate::bindings::JsElements,
    crate::bindings::JsPaymentElement,
)>;

#[function_component(PaymentModal)]
pub fn payment_modal(props: &PaymentModalProps) -> Html {
    let sdk_ready = use_stripe_sdk();
    let flow: Flow = use_mut_ref(|| PaymentFlow::open(&props.bill));
    let handles = use_mut_ref(|| WidgetHandles::None);
    let widget_mounted = use_state(|| false);
    let phase = use_state(|| match &*flow.borrow() {
        Ok(f) => f.phase().clone(),
        Err(e) => PaymentPhase::Failed(e.to_string()),
    });

    // Claim the intent slot and, if this session owns it, request the
    // intent. Reopening for the same bill reuses the registered intent
    // rather than minting a duplicate.
    {
        let flow = flow.clone();
        let phase = phase.clone();
        let api = props.api.clone();
        let registry = props.registry.clone();
        let on_auth_expired = props.on_auth_expired.clone();
        let bill_id = props.bill.id.clone();
        use_effect_with((), move |_| {
            let amount_pence = match &*flow.borrow() {
                Ok(f) => Some(f.amount_pence()),
                Err(_) => None,
            };
            if let Some(amount_pence) = amount_pence {
                match registry.claim(&bill_id) {
                    IntentClaim::Existing(secret) => {
                        // Drop the borrow before setting state; a set can
                        // re-enter render.
                        let next = match flow.borrow_mut().as_mut() {
                            Ok(f) => {
                                f.secret_received(secret);
                                Some(f.phase().clone())
                            }
                            Err(_) => None,
                        };
                        if let Some(next) = next {
                            phase.set(next);
                        }
                    }
                    IntentClaim::Pending => {
                        log::warn!("intent request already on the wire for bill {bill_id}");
                    }
                    IntentClaim::New => {
                        spawn_local(async move {
                            let result = with_deadline(
                                api.create_intent(&bill_id, amount_pence),
                                INTENT_TIMEOUT_MS,
                            )
                            .await;
                            let mut auth_expired = false;
                            let next = {
                                let mut flow_ref = flow.borrow_mut();
                                let Ok(f) = flow_ref.as_mut() else { return };
                                if f.is_abandoned() {
                                    // The session closed while we waited;
                                    // a reopen must start fresh.
                                    registry.release(&bill_id);
                                    return;
                                }
                                match result {
                                    Some(Ok(created)) => {
                                        if let Some(hint) = &created.expires_hint {
                                            log::debug!("intent for bill {bill_id} expires {hint}");
                                        }
                                        registry.fulfilled(&bill_id, created.secret.clone());
                                        f.secret_received(created.secret);
                                    }
                                    Some(Err(ApiError::Auth)) => {
                                        registry.release(&bill_id);
                                        f.intent_failed(AUTH_EXPIRED_MESSAGE);
                                        auth_expired = true;
                                    }
                                    Some(Err(err)) => {
                                        registry.release(&bill_id);
                                        f.intent_failed(err.to_string());
                                    }
                                    None => {
                                        registry.release(&bill_id);
                                        f.intent_failed(TIMEOUT_MESSAGE);
                                    }
                                }
                                f.phase().clone()
                            };
                            if auth_expired {
                                on_auth_expired.emit(());
                            }
                            phase.set(next);
                        });
                    }
                }
            }
            || ()
        });
    }

    // Mount the card-collection widget once the SDK is loaded and the
    // secret is in hand. Collection is not enabled before that.
    let secret_ready = flow
        .borrow()
        .as_ref()
        .ok()
        .and_then(|f| f.secret().cloned());
    {
        let flow = flow.clone();
        let phase = phase.clone();
        let handles = handles.clone();
        let widget_mounted = widget_mounted.clone();
        let publishable_key = props.config.publishable_key.clone();
        use_effect_with((sdk_ready, secret_ready), move |(ready, secret)| {
            if *ready && handles.borrow().is_none() {
                if let Some(secret) = secret.clone() {
                    spawn_local(async move {
                        let mounted = mount_payment_widget(
                            &publishable_key,
                            ElementsOptions::for_secret(&secret),
                            WIDGET_SELECTOR,
                            None,
                        )
                        .await;
                        match mounted {
                            Ok(h) => {
                                *handles.borrow_mut() = Some(h);
                                widget_mounted.set(true);
                            }
                            Err(e) => {
                                let next = match flow.borrow_mut().as_mut() {
                                    Ok(f) if !f.is_abandoned() => {
                                        f.intent_failed(e.message);
                                        Some(f.phase().clone())
                                    }
                                    _ => None,
                                };
                                if let Some(next) = next {
                                    phase.set(next);
                                }
                            }
                        }
                    });
                }
            }
            || ()
        });
    }

    // Tear the widget down with the modal so a reopened session mounts a
    // fresh one.
    {
        let handles = handles.clone();
        use_effect_with((), move |_| {
            move || {
                if let Some((_, _, widget)) = handles.borrow_mut().take() {
                    if let Err(e) = unmount_payment_widget(&widget) {
                        log::debug!("payment widget unmount failed: {}", e.message);
                    }
                }
            }
        });
    }

    let on_pay = {
        let flow = flow.clone();
        let phase = phase.clone();
        let handles = handles.clone();
        let store = props.store.clone();
        let registry = props.registry.clone();
        let on_close = props.on_close.clone();
        let bill_id = props.bill.id.clone();
        Callback::from(move |_: MouseEvent| {
            let Some((stripe, elements, _)) = handles.borrow().clone() else {
                return;
            };
            let (next, secret) = {
                let mut flow_ref = flow.borrow_mut();
                let Ok(f) = flow_ref.as_mut() else { return };
                match f.begin_submit() {
                    Ok(()) => {}
                    Err(rejection) => {
                        log::debug!("submission rejected: {rejection}");
                        return;
                    }
                }
                (f.phase().clone(), f.secret().cloned())
            };
            phase.set(next);

            let flow = flow.clone();
            let phase = phase.clone();
            let store = store.clone();
            let registry = registry.clone();
            let on_close = on_close.clone();
            let bill_id = bill_id.clone();
            spawn_local(async move {
                let mut outcome = bounded_confirm(
                    confirm_payment(&stripe, &elements, ConfirmParams::default()),
                )
                .await;
                let mut action_rounds = 0;
                loop {
                    let (effect, abandoned) = {
                        let mut flow_ref = flow.borrow_mut();
                        match flow_ref.as_mut() {
                            Ok(f) => (f.apply_outcome(outcome.clone()), f.is_abandoned()),
                            Err(_) => (FlowEffect::None, true),
                        }
                    };
                    match effect {
                        FlowEffect::ResolveAction => {
                            action_rounds += 1;
                            if action_rounds > MAX_ACTION_ROUNDS {
                                outcome = ConfirmationOutcome::Failed(ProcessorError {
                                    message: ACTION_STALLED_MESSAGE.to_string(),
                                    error_type: None,
                                    code: None,
                                });
                                continue;
                            }
                            if !abandoned {
                                phase.set(PaymentPhase::RequiresAction);
                            }
                            let Some(secret) = secret.clone() else { break };
                            outcome =
                                bounded_confirm(resolve_next_action(&stripe, &secret)).await;
                        }
                        FlowEffect::CloseAndReconcile => {
                            registry.release(&bill_id);
                            on_close.emit(CloseReason::Paid);
                            // The refreshed status is whatever the backend
                            // says; settlement may still be catching up.
                            store.refresh().await;
                            break;
                        }
                        FlowEffect::ReconcileSilently => {
                            store.refresh().await;
                            break;
                        }
                        FlowEffect::None => {
                            if !abandoned {
                                let current = flow
                                    .borrow()
                                    .as_ref()
                                    .map(|f| f.phase().clone())
                                    .unwrap_or(PaymentPhase::Idle);
                                phase.set(current);
                            }
                            break;
                        }
                    }
                }
            });
        })
    };

    let close_with = |reason: CloseReason| {
        let flow = flow.clone();
        let registry = props.registry.clone();
        let on_close = props.on_close.clone();
        let bill_id = props.bill.id.clone();
        Callback::from(move |_: MouseEvent| {
            if let Ok(f) = flow.borrow_mut().as_mut() {
                if f.abandon() == AbandonMode::OutcomePending {
                    log::info!("payment session closed with a confirmation still in flight");
                }
            }
            // The session is over either way; a reopen starts fresh.
            registry.release(&bill_id);
            on_close.emit(reason);
        })
    };
    let on_cancel = close_with(CloseReason::Cancelled);
    let on_dismiss = close_with(CloseReason::Dismissed);

    let on_retry = {
        let flow = flow.clone();
        let phase = phase.clone();
        Callback::from(move |_: MouseEvent| {
            let next = match flow.borrow_mut().as_mut() {
                Ok(f) => {
                    f.retry();
                    Some(f.phase().clone())
                }
                Err(_) => None,
            };
            if let Some(next) = next {
                phase.set(next);
            }
        })
    };

    let can_retry = flow.borrow().as_ref().map(|f| f.can_retry()).unwrap_or(false);
    let widget_visible = matches!(
        *phase,
        PaymentPhase::Collecting | PaymentPhase::Confirming | PaymentPhase::RequiresAction
    ) || (matches!(*phase, PaymentPhase::Failed(_)) && can_retry);

    let body = match &*phase {
        PaymentPhase::AwaitingSecret => html! {
            <>
                <div class="ybp-loading">{ "Loading payment details…" }</div>
                <div class="ybp-modal-actions">
                    <Button label="Cancel" onclick={on_cancel.clone()} />
                </div>
            </>
        },
        PaymentPhase::Collecting => html! {
            <div class="ybp-modal-actions">
                <Button label="Cancel" onclick={on_cancel.clone()} />
                <Button
                    label="Pay Now"
                    onclick={on_pay.clone()}
                    disabled={!sdk_ready || !*widget_mounted}
                />
            </div>
        },
        PaymentPhase::Confirming => html! {
            <div class="ybp-modal-actions">
                <Button label="Cancel" onclick={on_cancel.clone()} />
                <Button label="Processing…" onclick={on_pay.clone()} disabled={true} />
            </div>
        },
        PaymentPhase::RequiresAction => html! {
            <>
                <div class="ybp-loading">{ "Waiting for additional authentication…" }</div>
                <div class="ybp-modal-actions">
                    <Button label="Cancel" onclick={on_cancel.clone()} />
                </div>
            </>
        },
        PaymentPhase::Failed(message) => html! {
            <>
                <div class="ybp-error">{ message.clone() }</div>
                <div class="ybp-modal-actions">
                    <Button label="Close" onclick={on_dismiss.clone()} />
                    if can_retry {
                        <Button label="Try again" onclick={on_retry.clone()} />
                    }
                </div>
            </>
        },
        // Terminal and pre-open phases render nothing; the modal is on
        // its way out.
        PaymentPhase::Succeeded | PaymentPhase::Idle => Html::default(),
    };

    html! {
        <div class="ybp-modal-overlay">
            <div class="ybp-modal-card">
                <h2 class="ybp-modal-title">{ "Pay Bill" }</h2>
                <p class="ybp-modal-amount">
                    { "Total to pay: " }
                    <strong>{ format!("£{}", props.bill.total_amount) }</strong>
                </p>
                <div
                    id="ybp-payment-element"
                    style={ if widget_visible { "" } else { "display:none" } }
                />
                { body }
            </div>
        </div>
    }
}

/// Wrap a confirmation-side future in the bounded wait.
async fn bounded_confirm<F>(fut: F) -> ConfirmationOutcome
where
    F: std::future::Future<Output = ConfirmationOutcome>,
{
    match with_deadline(fut, CONFIRM_TIMEOUT_MS).await {
        Some(outcome) => outcome,
        None => ConfirmationOutcome::Failed(ProcessorError {
            message: TIMEOUT_MESSAGE.to_string(),
            error_type: None,
            code: Some("timeout".to_string()),
        }),
    }
}
