pub mod auth;
pub mod decoder;
pub mod relay;
