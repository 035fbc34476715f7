//! Deployment configuration handed to the billing components.

use serde::Deserialize;

/// Everything the payment surface needs from the embedding app.
///
/// The publishable key is configuration, never compiled in; the shell
/// typically deserializes this from a bootstrap JSON blob.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct BillingConfig {
    /// Base URL of the backend API, e.g. `https://api.example.com/api`.
    pub api_base_url: String,
    /// Payment processor publishable key (`pk_…`).
    pub publishable_key: String,
}

impl BillingConfig {
    pub fn new(api_base_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            publishable_key: publishable_key.into(),
        }
    }
}
