//! Stand-in billing backend for the demo app.
//!
//! Serves a fixed bill list and creates real Stripe test-mode
//! PaymentIntents for the create-intent route, so the demo exercises the
//! full confirmation flow. Needs `STRIPE_SECRET_KEY` (an `sk_test_…` key)
//! in the environment.

use std::io::Read;
use std::{env, sync::Mutex};

use serde::Deserialize;
use serde_json::{json, Value};
use tiny_http::{Header, Method, Response, Server};

#[derive(Deserialize)]
struct StripeIntent {
    client_secret: String,
}

#[derive(Deserialize)]
struct CreateIntentBody {
    amount_pence: i64,
}

fn seed_bills() -> Vec<Value> {
    vec![
        json!({
            "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "period_start": "2025-05-01",
            "period_end": "2025-05-31",
            "total_amount": "38.20",
            "status": "PAID",
            "generated_at": "2025-06-01T08:00:00Z"
        }),
        json!({
            "id": "9b2d7a51-3f04-4c1b-9a6e-2d8f0b6c1e42",
            "period_start": "2025-06-01",
            "period_end": "2025-06-30",
            "total_amount": "42.50",
            "status": "PENDING",
            "generated_at": "2025-07-01T08:00:00Z"
        }),
        json!({
            "id": "f47ac10b-58cc-4372-a567-0e02b2c3d479",
            "period_start": "2025-04-01",
            "period_end": "2025-04-30",
            "total_amount": "55.75",
            "status": "OVERDUE",
            "generated_at": "2025-05-01T08:00:00Z"
        }),
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let secret_key =
        env::var("STRIPE_SECRET_KEY").expect("Set STRIPE_SECRET_KEY in your environment");

    let port = env::var("MOCK_BILLING_SERVER_PORT").unwrap_or_else(|_| "2718".to_string());
    let addr = format!("127.0.0.1:{}", port);
    let server = Server::http(&addr)?;
    println!("Running on http://{}", addr);

    let bills = Mutex::new(seed_bills());

    let cors_headers = || {
        vec![
            Header::from_bytes("Access-Control-Allow-Origin", "*").unwrap(),
            Header::from_bytes("Access-Control-Allow-Methods", "GET, POST, OPTIONS").unwrap(),
            Header::from_bytes("Access-Control-Allow-Headers", "Content-Type, Authorization")
                .unwrap(),
        ]
    };

    let respond_json = |request: tiny_http::Request, status: u16, body: String| {
        let mut resp = Response::from_string(body)
            .with_status_code(status)
            .with_header(Header::from_bytes("Content-Type", "application/json").unwrap());
        for h in cors_headers() {
            resp.add_header(h);
        }
        request.respond(resp)
    };

    for mut request in server.incoming_requests() {
        if request.method() == &Method::Options {
            let mut resp = Response::empty(204);
            for h in cors_headers() {
                resp.add_header(h);
            }
            request.respond(resp)?;
            continue;
        }

        let url = request.url().to_string();
        match (request.method(), url.as_str()) {
            (&Method::Get, "/api/billing/bills/") => {
                let body = serde_json::to_string(&*bills.lock().unwrap())?;
                respond_json(request, 200, body)?;
            }

            (&Method::Post, path) if path.starts_with("/api/billing/payments/create-intent/") => {
                let bill_id = path
                    .trim_start_matches("/api/billing/payments/create-intent/")
                    .trim_end_matches('/')
                    .to_string();

                let mut raw = String::new();
                request.as_reader().read_to_string(&mut raw)?;
                let requested: Option<CreateIntentBody> = serde_json::from_str(&raw).ok();

                let bill = bills
                    .lock()
                    .unwrap()
                    .iter()
                    .find(|b| b["id"] == bill_id.as_str())
                    .cloned();

                let Some(bill) = bill else {
                    respond_json(request, 404, json!({"detail": "Not found."}).to_string())?;
                    continue;
                };
                if bill["status"] == "PAID" {
                    respond_json(
                        request,
                        400,
                        json!({"detail": "Bill already paid."}).to_string(),
                    )?;
                    continue;
                }

                let amount_pence: i64 = {
                    let pounds = bill["total_amount"].as_str().unwrap_or("0");
                    let normalized = pounds.replace('.', "");
                    normalized.parse().unwrap_or(0)
                };
                // Reject a request whose displayed amount went stale.
                if let Some(body) = requested {
                    if body.amount_pence != amount_pence {
                        respond_json(
                            request,
                            409,
                            json!({"detail": "Bill amount has changed. Refresh and try again."})
                                .to_string(),
                        )?;
                        continue;
                    }
                }

                let client = reqwest::blocking::Client::new();
                let intent = client
                    .post("https://api.stripe.com/v1/payment_intents")
                    .basic_auth(&secret_key, Some(""))
                    .form(&[
                        ("amount", amount_pence.to_string()),
                        ("currency", "gbp".to_string()),
                        ("metadata[bill_id]", bill_id.clone()),
                        ("automatic_payment_methods[enabled]", "true".to_string()),
                    ])
                    .send()?
                    .error_for_status()?
                    .json::<StripeIntent>()?;

                respond_json(
                    request,
                    200,
                    json!({ "clientSecret": intent.client_secret }).to_string(),
                )?;
            }

            _ => {
                let mut resp = Response::from_string("Not Found").with_status_code(404);
                for h in cors_headers() {
                    resp.add_header(h);
                }
                request.respond(resp)?;
            }
        }
    }

    Ok(())
}
