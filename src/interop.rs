//! Runtime loading of the payment processor's JS SDK.
//!
//! [`use_stripe_sdk`] injects a single
//! `<script id="stripe-js-sdk" src="https://js.stripe.com/v3/" defer>`
//! into the document head the first time any component asks for it, and
//! reports readiness so callers can hold off mounting the widget until
//! `window.Stripe` exists.

use gloo_utils::{document, window};
use wasm_bindgen::{prelude::Closure, JsCast, JsValue};
use web_sys::js_sys::Reflect;
use web_sys::HtmlScriptElement;
use yew::functional::hook;
use yew::prelude::*;

const SCRIPT_ID: &str = "stripe-js-sdk";
const SDK_URL: &str = "https://js.stripe.com/v3/";

/// Load the processor SDK exactly once and track readiness.
///
/// Returns `false` until the script's `load` event has fired (or
/// immediately `true` when `window.Stripe` is already present), then
/// `true` for the rest of the page's life. Every component using this
/// hook shares the one script tag.
#[hook]
pub fn use_stripe_sdk() -> bool {
    let loaded = use_state(|| {
        Reflect::has(&window(), &JsValue::from_str("Stripe")).unwrap_or(false)
    });

    {
        let loaded = loaded.clone();
        use_effect(move || {
            if !*loaded && document().get_element_by_id(SCRIPT_ID).is_none() {
                inject_sdk_script(move || loaded.set(true));
            }
            || ()
        });
    }

    *loaded
}

fn inject_sdk_script(on_load: impl Fn() + 'static) {
    let document = document();
    let script: HtmlScriptElement = match document
        .create_element("script")
        .ok()
        .and_then(|el| el.dyn_into().ok())
    {
        Some(script) => script,
        None => {
            log::error!("could not create the payment SDK script element");
            return;
        }
    };
    script.set_id(SCRIPT_ID);
    script.set_src(SDK_URL);
    script.set_defer(true);

    let onload = Closure::wrap(Box::new(on_load) as Box<dyn Fn()>);
    script.set_onload(Some(onload.as_ref().unchecked_ref()));
    // The closure must outlive this scope to catch the load event.
    onload.forget();

    if let Some(head) = document.head() {
        if let Err(e) = head.append_child(&script) {
            log::error!("could not append the payment SDK script: {e:?}");
        }
    }
}
