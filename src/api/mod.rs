pub mod analytics;
pub mod auth;
pub mod category;
pub mod health;
pub mod requests;
pub mod user;
