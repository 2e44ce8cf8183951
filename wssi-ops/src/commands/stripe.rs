//! `stripe-readiness` and `stripe-verify`

use anyhow::Result;
use std::io::Write;
use wssi_common::stripe::{mask, StripeClient, StripeConfig, StripeReadiness, StripeVar};

use super::{yes_no, Exit};

/// Local environment report; secret values are never printed
pub fn readiness_report(readiness: &StripeReadiness) -> String {
    let mut lines = vec!["STRIPE_READINESS_START".to_string()];
    for var in StripeVar::ALL {
        if let Some(check) = readiness.env.get(var.key()) {
            lines.push(format!(
                "{}: present={} format_ok={} len={}",
                var.env_name(),
                yes_no(check.present),
                yes_no(check.format_ok),
                check.len
            ));
        }
    }
    lines.push(format!("stripe_module_available: {}", yes_no(readiness.stripe_module_available)));
    lines.push(format!("ready_for_checkout: {}", yes_no(readiness.ready_for_checkout)));
    lines.push(format!("ready_for_webhook: {}", yes_no(readiness.ready_for_webhook)));
    lines.push("STRIPE_READINESS_END".to_string());
    lines.join("\n") + "\n"
}

pub fn readiness(config: &StripeConfig, out: &mut impl Write) -> Result<Exit> {
    let readiness = config.readiness();
    out.write_all(readiness_report(&readiness).as_bytes())?;
    Ok(if readiness.fully_ready() { Exit::Success } else { Exit::Failure })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    Price,
    Coupon,
}

const REMOTE_OBJECTS: [(StripeVar, ObjectKind); 4] = [
    (StripeVar::PriceBasic, ObjectKind::Price),
    (StripeVar::PricePro, ObjectKind::Price),
    (StripeVar::CouponBasic, ObjectKind::Coupon),
    (StripeVar::CouponPro, ObjectKind::Coupon),
];

/// Retrieve each configured price and coupon from Stripe
///
/// Uses `client` when given, otherwise one built from the secret key.
pub async fn verify(config: &StripeConfig, client: Option<StripeClient>, out: &mut impl Write) -> Result<Exit> {
    let client = match client {
        Some(client) => client,
        None => match config.client() {
            Ok(Some(client)) => client,
            Ok(None) => {
                eprintln!("ERROR: STRIPE_SECRET_KEY is not set");
                return Ok(Exit::Failure);
            }
            Err(e) => {
                eprintln!("ERROR: cannot build Stripe client: {}", e);
                return Ok(Exit::Failure);
            }
        },
    };

    writeln!(out, "STRIPE_REMOTE_VERIFY_START")?;
    let mut failed = false;
    for (var, kind) in REMOTE_OBJECTS {
        let Some(id) = config.get(var) else {
            writeln!(out, "{}: missing", var.key())?;
            failed = true;
            continue;
        };
        let result = match kind {
            ObjectKind::Price => client.retrieve_price(id).await,
            ObjectKind::Coupon => client.retrieve_coupon(id).await,
        };
        match result {
            Ok(_) => writeln!(out, "{}: ok ({})", var.key(), mask(id))?,
            Err(e) => {
                writeln!(out, "{}: error ({}) [{}]", var.key(), mask(id), e)?;
                failed = true;
            }
        }
    }
    let webhook_secret = config.get(StripeVar::WebhookSecret).is_some();
    writeln!(out, "webhook_secret_present: {}", yes_no(webhook_secret))?;
    writeln!(out, "STRIPE_REMOTE_VERIFY_END")?;

    Ok(if failed || !webhook_secret { Exit::Failure } else { Exit::Success })
}
