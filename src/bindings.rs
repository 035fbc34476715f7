//! Low-level wasm-bindgen bindings to the Stripe.js v3 surface this crate
//! actually drives.
//!
//! Only raw handles and `js_sys::Promise`-returning methods live here;
//! typed wrappers and outcome mapping are in `processor.rs`.

use wasm_bindgen::prelude::*;
use web_sys::js_sys::Promise;

#[wasm_bindgen]
extern "C" {
    /// Stripe client handle, `window.Stripe(pk)`.
    #[wasm_bindgen(js_name = Stripe, js_namespace = window)]
    #[derive(Debug, Clone)]
    pub type JsStripe;

    /// Elements factory created from a client secret.
    #[wasm_bindgen(js_name = Elements)]
    #[derive(Debug, Clone)]
    pub type JsElements;

    /// The mounted card-collection widget.
    #[wasm_bindgen(js_name = PaymentElement)]
    #[derive(Debug, Clone)]
    pub type JsPaymentElement;

    #[wasm_bindgen(js_name = Stripe, js_namespace = window)]
    pub fn new_stripe(publishable_key: &str) -> JsStripe;

    /// `stripe.elements({ clientSecret, appearance })`
    #[wasm_bindgen(method, catch, js_name = elements)]
    pub fn elements(this: &JsStripe, options: JsValue) -> Result<JsElements, JsValue>;

    /// `elements.create("payment", options)`
    #[wasm_bindgen(method, catch, js_name = create)]
    pub fn create_element(
        this: &JsElements,
        element_type: &str,
        options: JsValue,
    ) -> Result<JsPaymentElement, JsValue>;

    /// `paymentElement.mount(selector)`
    #[wasm_bindgen(method, catch, js_name = mount)]
    pub fn mount(this: &JsPaymentElement, selector: &str) -> Result<(), JsValue>;

    /// `paymentElement.unmount()`
    #[wasm_bindgen(method, catch, js_name = unmount)]
    pub fn unmount(this: &JsPaymentElement) -> Result<(), JsValue>;

    /// `stripe.confirmPayment(opts)`. Resolves to `{ error }` or
    /// `{ paymentIntent }` when `redirect: "if_required"` is set.
    #[wasm_bindgen(method, catch, js_name = confirmPayment)]
    pub fn confirm_payment(this: &JsStripe, options: JsValue) -> Result<Promise, JsValue>;

    /// `stripe.handleNextAction({ clientSecret })`. Drives additional
    /// authentication (3DS and friends) for an intent that came back
    /// `requires_action`.
    #[wasm_bindgen(method, catch, js_name = handleNextAction)]
    pub fn handle_next_action(this: &JsStripe, options: JsValue) -> Result<Promise, JsValue>;
}
