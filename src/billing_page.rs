//! Billing history page: the bill table plus the payment entry point.
//!
//! Rendering stays thin: every decision (who may pay, when to refresh,
//! what an error means) is delegated to the core types. The page owns the
//! [`BillStore`] and the [`IntentRegistry`] for the UI session and is the
//! place where a `Paid` close turns into a success acknowledgment.

use std::rc::Rc;

use wasm_bindgen_futures::spawn_local;
use yew::prelude::*;

use crate::api::{ApiClient, ApiError};
use crate::components::{Button, StatusBadge};
use crate::config::BillingConfig;
use crate::model::Bill;
use crate::payment_modal::{CloseReason, PaymentModal};
use crate::session::IntentRegistry;
use crate::store::{BillStore, BillsSnapshot};

#[derive(Properties, PartialEq)]
pub struct BillingPageProps {
    pub config: BillingConfig,
    pub api: ApiClient,
    /// Bubbled when a refresh or an intent request dies on an expired
    /// credential; the shell handles logout/redirect.
    #[prop_or_default]
    pub on_auth_expired: Callback<()>,
}

#[function_component(BillingPage)]
pub fn billing_page(props: &BillingPageProps) -> Html {
    let store = {
        let api = props.api.clone();
        use_memo((), move |_| BillStore::new(Rc::new(api)))
    };
    let store = (*store).clone();
    let registry = use_mut_ref(IntentRegistry::new);
    let snapshot = use_state(BillsSnapshot::default);
    let selected = use_state(|| None::<Bill>);
    let show_success = use_state(|| false);

    // Subscribe for every completed refresh (including the ones the
    // payment modal issues) and kick off the initial load.
    {
        let store = store.clone();
        let snapshot = snapshot.clone();
        let on_auth_expired = props.on_auth_expired.clone();
        use_effect_with((), move |_| {
            {
                let snapshot = snapshot.clone();
                let on_auth_expired = on_auth_expired.clone();
                store.subscribe(Callback::from(move |snap: BillsSnapshot| {
                    if snap.error == Some(ApiError::Auth) {
                        on_auth_expired.emit(());
                    }
                    snapshot.set(snap);
                }));
            }
            let store = store.clone();
            spawn_local(async move {
                store.refresh().await;
            });
            || ()
        });
    }

    let on_retry = {
        let store = store.clone();
        Callback::from(move |_: MouseEvent| {
            let store = store.clone();
            spawn_local(async move {
                store.refresh().await;
            });
        })
    };

    let on_modal_close = {
        let selected = selected.clone();
        let show_success = show_success.clone();
        Callback::from(move |reason: CloseReason| {
            if reason == CloseReason::Paid {
                show_success.set(true);
            }
            selected.set(None);
        })
    };

    let on_dismiss_success = {
        let show_success = show_success.clone();
        Callback::from(move |_: MouseEvent| show_success.set(false))
    };

    let rows = snapshot.bills.iter().map(|bill| {
        let pay = {
            let selected = selected.clone();
            let show_success = show_success.clone();
            let bill = bill.clone();
            Callback::from(move |_: MouseEvent| {
                show_success.set(false);
                selected.set(Some(bill.clone()));
            })
        };
        html! {
            <tr key={bill.id.clone()}>
                <td>{ format!("{} – {}", bill.period_start, bill.period_end) }</td>
                <td class="ybp-amount">{ format!("£{}", bill.total_amount) }</td>
                <td><StatusBadge status={bill.status} /></td>
                <td>{ bill.generated_at.split('T').next().unwrap_or_default().to_string() }</td>
                <td class="ybp-actions">
                    <a
                        href={props.api.bill_pdf_url(&bill.id)}
                        target="_blank"
                        rel="noopener noreferrer"
                    >
                        { "PDF" }
                    </a>
                    if bill.is_payable() {
                        <Button label="Pay" onclick={pay} />
                    }
                </td>
            </tr>
        }
    });

    html! {
        <div class="ybp-billing">
            <h1>{ "Billing History" }</h1>
            <p class="ybp-subtitle">{ "View all your past and current electricity bills." }</p>

            if *show_success {
                <div class="ybp-success" role="status">
                    { "Payment submitted. Your bill will update shortly." }
                    <Button label="✕" onclick={on_dismiss_success} class={classes!("ybp-dismiss")} />
                </div>
            }

            if let Some(err) = &snapshot.error {
                <div class="ybp-error" role="alert">
                    { err.to_string() }
                    <Button label="Retry" onclick={on_retry.clone()} />
                </div>
            }

            if !snapshot.loaded && snapshot.error.is_none() {
                <div class="ybp-loading">{ "Loading bills…" }</div>
            } else {
                <table class="ybp-table">
                    <thead>
                        <tr>
                            <th>{ "Period" }</th>
                            <th>{ "Amount" }</th>
                            <th>{ "Status" }</th>
                            <th>{ "Date" }</th>
                            <th>{ "Actions" }</th>
                        </tr>
                    </thead>
                    <tbody>
                        { for rows }
                        if snapshot.bills.is_empty() {
                            <tr>
                                <td colspan="5" class="ybp-empty">{ "No bills found." }</td>
                            </tr>
                        }
                    </tbody>
                </table>
            }

            if let Some(bill) = (*selected).clone() {
                <PaymentModal
                    bill={bill}
                    config={props.config.clone()}
                    api={props.api.clone()}
                    store={store.clone()}
                    registry={(*registry.borrow()).clone()}
                    on_close={on_modal_close.clone()}
                    on_auth_expired={props.on_auth_expired.clone()}
                />
            }
        </div>
    }
}
