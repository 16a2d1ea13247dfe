//! Payment gateway seam.
//!
//! The gateway is an external collaborator consumed as a black box. The
//! sandbox implementation below approves everything and is meant for
//! development and tests; swap in a real provider client for production.

use async_trait::async_trait;
use billboard_core::error::FleetResult;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub reference: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone)]
pub struct PaymentVerification {
    pub success: bool,
    pub amount: f64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize_payment(
        &self,
        amount: f64,
        payer: &str,
        reference: &str,
    ) -> FleetResult<PaymentSession>;
    async fn verify_payment(&self, reference: &str) -> FleetResult<PaymentVerification>;
    async fn process_refund(&self, reference: &str, amount: f64) -> FleetResult<()>;
    async fn process_payout(&self, recipient: &str, amount: f64) -> FleetResult<()>;
}

/// Development gateway: every payment verifies, every refund and payout
/// succeeds.
pub struct SandboxGateway;

fn sandbox_ref() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("sbx_{}", suffix)
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn initialize_payment(
        &self,
        amount: f64,
        payer: &str,
        reference: &str,
    ) -> FleetResult<PaymentSession> {
        info!(amount, payer = %payer, reference = %reference, "Sandbox payment initialized");
        Ok(PaymentSession {
            reference: reference.to_string(),
            redirect_url: format!("https://pay.sandbox.local/checkout/{}", sandbox_ref()),
        })
    }

    async fn verify_payment(&self, reference: &str) -> FleetResult<PaymentVerification> {
        info!(reference = %reference, "Sandbox payment verified");
        Ok(PaymentVerification {
            success: true,
            amount: 0.0,
        })
    }

    async fn process_refund(&self, reference: &str, amount: f64) -> FleetResult<()> {
        info!(reference = %reference, amount, "Sandbox refund processed");
        Ok(())
    }

    async fn process_payout(&self, recipient: &str, amount: f64) -> FleetResult<()> {
        info!(recipient = %recipient, amount, "Sandbox payout processed");
        Ok(())
    }
}
