pub mod cart;
pub mod checkout;
pub mod orders;
pub mod payment_webhooks;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
