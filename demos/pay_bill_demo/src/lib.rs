//! Minimal dashboard shell around the billing page.
//!
//! Run the mock backend first (`demos/mock_billing_server`), then serve
//! this crate with Trunk. The shell fakes a login so the page has a
//! bearer credential to attach.

use wasm_bindgen::prelude::*;
use yew::prelude::*;
use yew_billpay::{ApiClient, AuthSession, BillingConfig, BillingPage};

const API_BASE_URL: &str = "http://127.0.0.1:2718/api";
const PUBLISHABLE_KEY: &str = "pk_test_51KUI60DEw04PTNScWne4kC3RDrpxnydTfgx0B4b4EsBJajLDmqT2t79nEj8kZjeMGx2bfI9BZN1zqo2NX6HrGp4u00Rv0S1OYT";

#[wasm_bindgen(start)]
pub fn start() {
    wasm_logger::init(wasm_logger::Config::default());
    yew::Renderer::<DemoShell>::new().render();
}

#[function_component(DemoShell)]
fn demo_shell() -> Html {
    let auth = use_memo((), |_| {
        let auth = AuthSession::load();
        if !auth.is_authenticated() {
            // The mock backend accepts any bearer token.
            auth.login("demo-token", "demo");
        }
        auth
    });

    let signed_out = use_state(|| false);
    let on_auth_expired = {
        let auth = (*auth).clone();
        let signed_out = signed_out.clone();
        Callback::from(move |_| {
            auth.logout();
            signed_out.set(true);
        })
    };

    if *signed_out {
        return html! {
            <p>{ "Signed out. Reload the page to start a fresh demo session." }</p>
        };
    }

    let config = BillingConfig::new(API_BASE_URL, PUBLISHABLE_KEY);
    let api = ApiClient::new(API_BASE_URL, (*auth).clone());

    html! {
        <main style="max-width:48rem;margin:2rem auto;font-family:sans-serif;">
            <BillingPage {config} {api} {on_auth_expired} />
        </main>
    }
}
