pub mod curriculum;
pub mod health;
