//! Food Lens: meal photo → nutrition summary over WhatsApp.

pub mod channels;
pub mod config;
pub mod error;
pub mod nutrition;
pub mod pipeline;
pub mod vision;
