pub mod handlers;
pub mod models;
pub mod prompts;
pub mod service;
pub mod source;

pub use service::{TailoringService, TailoringSettings};
