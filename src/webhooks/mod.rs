//! Inbound payment-provider webhooks: authenticity, parsing, reconciliation.

pub mod event;
pub mod reconciliation;
pub mod signature;

pub use event::{PaymentEntity, ProviderEvent};
pub use reconciliation::{PaymentReconciler, ReconcileOutcome};
pub use signature::{SignatureError, SignatureVerifier};

/// Header carrying the hex HMAC-SHA256 of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";
