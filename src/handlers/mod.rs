pub mod checkout;
pub mod paypal;
pub mod webhooks;
