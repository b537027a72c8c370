//! WhatsApp Cloud API I/O: outbound transport and inbound webhook.

pub mod webhook;
pub mod whatsapp;

pub use webhook::{AppState, webhook_routes};
pub use whatsapp::WhatsAppChannel;
