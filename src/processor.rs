//! High-level, typed API over the payment processor's JS SDK.
//!
//! The rest of the crate never touches `JsValue` directly: it mounts the
//! card-collection widget with [`mount_payment_widget`], submits with
//! [`confirm_payment`], and receives a [`ConfirmationOutcome`], the
//! three-way result the session state machine consumes. `requires_action`
//! is a first-class outcome here, not a failure; [`resolve_next_action`]
//! finishes it off.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;
use web_sys::js_sys::{Object, Promise, Reflect};

use crate::api::IntentSecret;
use crate::bindings::{new_stripe, JsElements, JsPaymentElement, JsStripe};

/// Structured error reported by the processor. Retryable within the same
/// session; the secret stays valid until consumed or expired.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ProcessorError {
    /// Human-readable message, shown to the user as-is.
    pub message: String,
    /// Processor error class, e.g. `"card_error"`.
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    /// Machine code, e.g. `"card_declined"`.
    #[serde(default)]
    pub code: Option<String>,
}

impl ProcessorError {
    fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            code: None,
        }
    }
}

/// Tagged result of one confirmation attempt. Consumed immediately by the
/// session state machine; never persisted.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfirmationOutcome {
    /// Client-side confirmation completed. Settlement may still be
    /// catching up on the backend.
    Succeeded,
    /// The processor rejected the attempt.
    Failed(ProcessorError),
    /// Additional authentication is needed before this attempt can reach
    /// a terminal state.
    RequiresAction,
}

/// Configuration for `stripe.elements(...)`.
#[derive(Serialize, Clone, Debug)]
pub struct ElementsOptions {
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appearance: Option<JsonValue>,
}

impl ElementsOptions {
    pub fn for_secret(secret: &IntentSecret) -> Self {
        Self {
            client_secret: secret.as_str().to_string(),
            appearance: None,
        }
    }
}

/// Customization for the mounted widget.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct PaymentWidgetOptions {
    /// `"tabs"` or `"accordion"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    #[serde(flatten)]
    pub extra: Option<JsonValue>,
}

/// Extra parameters for the confirmation call.
#[derive(Serialize, Clone, Debug, Default)]
pub struct ConfirmParams {
    /// Only needed for redirect-based methods; card flows resolve inline.
    #[serde(rename = "return_url", skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(flatten)]
    pub extra: Option<JsonValue>,
}

/// Initialize the SDK, create an Elements group for the intent secret,
/// and mount the card-collection widget at `mount_selector`.
pub async fn mount_payment_widget(
    publishable_key: &str,
    elements_options: ElementsOptions,
    mount_selector: &str,
    widget_options: Option<PaymentWidgetOptions>,
) -> Result<(JsStripe, JsElements, JsPaymentElement), ProcessorError> {
    let stripe = new_stripe(publishable_key);

    let elements_js = to_value(&elements_options)
        .map_err(|e| ProcessorError::from_message(e.to_string()))?;
    let elements = stripe.elements(elements_js).map_err(error_from_js)?;

    let widget_js = match widget_options {
        Some(opts) => to_value(&opts).map_err(|e| ProcessorError::from_message(e.to_string()))?,
        None => JsValue::undefined(),
    };
    let widget = elements
        .create_element("payment", widget_js)
        .map_err(error_from_js)?;
    widget.mount(mount_selector).map_err(error_from_js)?;

    Ok((stripe, elements, widget))
}

/// Tear a mounted widget down so the container can be reused.
pub fn unmount_payment_widget(widget: &JsPaymentElement) -> Result<(), ProcessorError> {
    widget.unmount().map_err(error_from_js)
}

/// Submit the collected payment details for confirmation.
///
/// Uses `redirect: "if_required"` so card flows resolve in place; the
/// returned outcome distinguishes success, rejection, and
/// requires-further-action.
pub async fn confirm_payment(
    stripe: &JsStripe,
    elements: &JsElements,
    params: ConfirmParams,
) -> ConfirmationOutcome {
    let opts = Object::new();
    let set = |key: &str, value: &JsValue| {
        // Reflect::set only fails on non-objects; `opts` is one.
        let _ = Reflect::set(&opts, &JsValue::from_str(key), value);
    };
    set("elements", elements.as_ref());
    match to_value(&params) {
        Ok(params_js) => set("confirmParams", &params_js),
        Err(e) => return ConfirmationOutcome::Failed(ProcessorError::from_message(e.to_string())),
    }
    set("redirect", &JsValue::from_str("if_required"));

    let promise = match stripe.confirm_payment(opts.into()) {
        Ok(p) => p,
        Err(e) => return ConfirmationOutcome::Failed(error_from_js(e)),
    };
    outcome_from_promise(promise).await
}

/// Resolve a `RequiresAction` outcome by handing control back to the
/// processor, then report how the attempt actually ended.
pub async fn resolve_next_action(stripe: &JsStripe, secret: &IntentSecret) -> ConfirmationOutcome {
    let opts = Object::new();
    let _ = Reflect::set(
        &opts,
        &JsValue::from_str("clientSecret"),
        &JsValue::from_str(secret.as_str()),
    );
    let promise = match stripe.handle_next_action(opts.into()) {
        Ok(p) => p,
        Err(e) => return ConfirmationOutcome::Failed(error_from_js(e)),
    };
    outcome_from_promise(promise).await
}

async fn outcome_from_promise(promise: Promise) -> ConfirmationOutcome {
    match JsFuture::from(promise).await {
        Ok(result) => outcome_from_confirm_result(&result),
        Err(e) => ConfirmationOutcome::Failed(error_from_js(e)),
    }
}

/// Map the `{ error } | { paymentIntent }` shape of a confirm result onto
/// the outcome type.
fn outcome_from_confirm_result(result: &JsValue) -> ConfirmationOutcome {
    if let Ok(error_js) = Reflect::get(result, &JsValue::from_str("error")) {
        if !error_js.is_undefined() && !error_js.is_null() {
            return ConfirmationOutcome::Failed(error_from_js(error_js));
        }
    }
    let status = Reflect::get(result, &JsValue::from_str("paymentIntent"))
        .ok()
        .and_then(|pi| Reflect::get(&pi, &JsValue::from_str("status")).ok())
        .and_then(|v| v.as_string());
    // No error and no intent status: the processor reports nothing left
    // to do, which is how a one-step confirm signals completion.
    match status {
        Some(status) => outcome_for_status(&status),
        None => ConfirmationOutcome::Succeeded,
    }
}

/// Classify an intent status string from the processor.
///
/// `processing` counts as client-side success: the submission is out of
/// our hands and settlement is asynchronous either way.
pub fn outcome_for_status(status: &str) -> ConfirmationOutcome {
    match status {
        "succeeded" | "processing" => ConfirmationOutcome::Succeeded,
        "requires_action" | "requires_confirmation" => ConfirmationOutcome::RequiresAction,
        other => ConfirmationOutcome::Failed(ProcessorError::from_message(format!(
            "Payment not completed (status: {other}). Please try again."
        ))),
    }
}

/// Best-effort conversion of a JS exception or rejection into a
/// [`ProcessorError`].
fn error_from_js(value: JsValue) -> ProcessorError {
    from_value::<ProcessorError>(value.clone()).unwrap_or_else(|_| {
        ProcessorError::from_message(
            value.as_string().unwrap_or_else(|| format!("{value:?}")),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_map_to_outcomes() {
        assert_eq!(outcome_for_status("succeeded"), ConfirmationOutcome::Succeeded);
        assert_eq!(outcome_for_status("processing"), ConfirmationOutcome::Succeeded);
        assert_eq!(
            outcome_for_status("requires_action"),
            ConfirmationOutcome::RequiresAction
        );
        assert_eq!(
            outcome_for_status("requires_confirmation"),
            ConfirmationOutcome::RequiresAction
        );
        assert!(matches!(
            outcome_for_status("requires_payment_method"),
            ConfirmationOutcome::Failed(_)
        ));
    }

    #[test]
    fn requires_action_is_not_a_failure() {
        // The waiting state must never be conflated with rejection just
        // because it was not an immediate success.
        assert_ne!(
            outcome_for_status("requires_action"),
            outcome_for_status("requires_payment_method")
        );
        assert_ne!(
            outcome_for_status("requires_action"),
            ConfirmationOutcome::Succeeded
        );
    }

    #[test]
    fn processor_errors_deserialize_from_sdk_shape() {
        let err: ProcessorError = serde_json::from_str(
            r#"{"message": "Your card was declined.", "type": "card_error", "code": "card_declined"}"#,
        )
        .unwrap();
        assert_eq!(err.code.as_deref(), Some("card_declined"));
        assert_eq!(err.error_type.as_deref(), Some("card_error"));
    }
}
