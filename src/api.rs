//! Typed client for the billing backend.
//!
//! Two endpoints matter here: `GET /billing/bills/` for the bill list and
//! `POST /billing/payments/create-intent/{billId}/` to open a payment
//! intent. Every request carries the bearer credential from the
//! [`AuthSession`] handed in at construction.

use std::future::Future;

use futures::future::{select, Either};
use futures::pin_mut;
use gloo_net::http::Request;
use gloo_timers::future::TimeoutFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthSession;
use crate::model::Bill;

/// How a backend call can go wrong.
///
/// `Auth` invalidates everything in flight and must bubble to the session
/// boundary; the other variants are surfaced where they happen.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a usable response. Retryable.
    #[error("network error: {0}")]
    Network(String),
    /// Credential missing, invalid, or expired. Not retryable here.
    #[error("authentication required")]
    Auth,
    /// The backend refused to open an intent for this bill; it may
    /// already be settled. Terminal for the payment session.
    #[error("{0}")]
    Intent(String),
}

/// Opaque single-use PaymentIntent client secret.
///
/// Never persisted and never logged; the redacting `Debug` keeps it out
/// of accidental formatting.
#[derive(Clone, PartialEq, Eq)]
pub struct IntentSecret(String);

impl IntentSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for IntentSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IntentSecret(…)")
    }
}

#[derive(Serialize)]
struct CreateIntentRequest {
    /// The amount the user is looking at, so the backend can reject a
    /// bill that changed underneath the page.
    amount_pence: i64,
}

#[derive(Deserialize)]
struct CreateIntentResponse {
    #[serde(rename = "clientSecret")]
    client_secret: String,
    #[serde(rename = "expiresAt", default)]
    expires_at: Option<String>,
}

/// A freshly opened payment intent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedIntent {
    pub secret: IntentSecret,
    /// Server-side expiry hint, when the backend provides one. The
    /// secret is never reused past its session regardless.
    pub expires_hint: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    auth: AuthSession,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, auth: AuthSession) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, auth }
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    /// Link-out target for a bill's PDF rendition.
    pub fn bill_pdf_url(&self, bill_id: &str) -> String {
        format!("{}/billing/bills/{}/pdf/", self.base_url, bill_id)
    }

    fn bearer(&self) -> Result<String, ApiError> {
        match self.auth.token() {
            Some(token) => Ok(format!("Bearer {token}")),
            None => Err(ApiError::Auth),
        }
    }

    /// Fetch the ordered bill list.
    pub async fn list_bills(&self) -> Result<Vec<Bill>, ApiError> {
        let url = format!("{}/billing/bills/", self.base_url);
        let response = Request::get(&url)
            .header("Authorization", &self.bearer()?)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if let Some(err) = classify_bills_status(response.status()) {
            return Err(err);
        }
        response
            .json::<Vec<Bill>>()
            .await
            .map_err(|e| ApiError::Network(format!("bad bill list payload: {e}")))
    }

    /// Open a payment intent for one bill, attaching the displayed amount.
    pub async fn create_intent(
        &self,
        bill_id: &str,
        amount_pence: i64,
    ) -> Result<CreatedIntent, ApiError> {
        let url = format!("{}/billing/payments/create-intent/{}/", self.base_url, bill_id);
        let response = Request::post(&url)
            .header("Authorization", &self.bearer()?)
            .json(&CreateIntentRequest { amount_pence })
            .map_err(|e| ApiError::Network(e.to_string()))?
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if !(200..300).contains(&status) {
            let detail = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.detail.or(b.error));
            return Err(classify_intent_status(status, detail.as_deref()));
        }

        let body = response
            .json::<CreateIntentResponse>()
            .await
            .map_err(|e| ApiError::Network(format!("bad intent payload: {e}")))?;
        Ok(CreatedIntent {
            secret: IntentSecret::new(body.client_secret),
            expires_hint: body.expires_at,
        })
    }
}

// Handle identity for prop diffing, like the session handle itself.
impl PartialEq for ApiClient {
    fn eq(&self, other: &Self) -> bool {
        self.base_url == other.base_url && self.auth == other.auth
    }
}

fn classify_bills_status(status: u16) -> Option<ApiError> {
    match status {
        200..=299 => None,
        401 | 403 => Some(ApiError::Auth),
        other => Some(ApiError::Network(format!("server returned {other}"))),
    }
}

fn classify_intent_status(status: u16, detail: Option<&str>) -> ApiError {
    match status {
        401 | 403 => ApiError::Auth,
        400..=499 => ApiError::Intent(
            detail
                .unwrap_or("This bill cannot be paid right now. It may already be settled.")
                .to_string(),
        ),
        other => ApiError::Network(format!("server returned {other}")),
    }
}

/// Race a request against a deadline so a stalled call cannot wedge the
/// UI. `None` means the deadline won.
pub async fn with_deadline<F>(fut: F, millis: u32) -> Option<F::Output>
where
    F: Future,
{
    let clock = TimeoutFuture::new(millis);
    pin_mut!(fut);
    pin_mut!(clock);
    match select(fut, clock).await {
        Either::Left((out, _)) => Some(out),
        Either::Right(((), _)) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bill_list_statuses_map_to_the_taxonomy() {
        assert_eq!(classify_bills_status(200), None);
        assert_eq!(classify_bills_status(401), Some(ApiError::Auth));
        assert_eq!(classify_bills_status(403), Some(ApiError::Auth));
        assert!(matches!(
            classify_bills_status(502),
            Some(ApiError::Network(_))
        ));
    }

    #[test]
    fn intent_statuses_map_to_the_taxonomy() {
        assert_eq!(classify_intent_status(401, None), ApiError::Auth);
        assert_eq!(
            classify_intent_status(400, Some("Bill already paid.")),
            ApiError::Intent("Bill already paid.".into())
        );
        assert!(matches!(classify_intent_status(404, None), ApiError::Intent(_)));
        assert!(matches!(
            classify_intent_status(500, None),
            ApiError::Network(_)
        ));
    }

    #[test]
    fn missing_credential_is_an_auth_error() {
        let client = ApiClient::new("https://api.example.test/api/", AuthSession::new());
        assert_eq!(client.bearer(), Err(ApiError::Auth));
    }

    #[test]
    fn pdf_links_are_built_from_the_base_url() {
        let client = ApiClient::new(
            "https://api.example.test/api/",
            AuthSession::with_credentials("tok", "ada"),
        );
        assert_eq!(
            client.bill_pdf_url("b1"),
            "https://api.example.test/api/billing/bills/b1/pdf/"
        );
    }

    #[test]
    fn secrets_do_not_leak_through_debug() {
        let secret = IntentSecret::new("pi_1_secret_xyz");
        assert_eq!(format!("{secret:?}"), "IntentSecret(…)");
        assert_eq!(secret.as_str(), "pi_1_secret_xyz");
    }
}
