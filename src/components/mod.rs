use yew::prelude::*;

use crate::model::BillStatus;

/// A simple, styled button.
#[derive(Properties, PartialEq)]
pub struct ButtonProps {
    pub label: String,
    pub onclick: Callback<MouseEvent>,
    #[prop_or_default]
    pub disabled: bool,
    /// Extra classes appended to the base style.
    #[prop_or_default]
    pub class: Classes,
}

#[function_component(Button)]
pub fn button(props: &ButtonProps) -> Html {
    html! {
        <button
            type="button"
            onclick={props.onclick.clone()}
            disabled={props.disabled}
            class={classes!("ybp-button", props.class.clone())}
        >
            { &props.label }
        </button>
    }
}

#[derive(Properties, PartialEq)]
pub struct StatusBadgeProps {
    pub status: BillStatus,
}

/// Colored pill for a bill's lifecycle status.
#[function_component(StatusBadge)]
pub fn status_badge(props: &StatusBadgeProps) -> Html {
    let tone = match props.status {
        BillStatus::Paid => "ybp-badge-paid",
        BillStatus::Overdue => "ybp-badge-overdue",
        BillStatus::Pending => "ybp-badge-pending",
    };
    html! {
        <span class={classes!("ybp-badge", tone)}>
            { props.status.as_str() }
        </span>
    }
}
