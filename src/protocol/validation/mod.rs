//! Validation rules and the default validator service.

pub mod rules;
pub mod service;

pub use service::DefaultMessageValidator;
