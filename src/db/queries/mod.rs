pub mod analytics;
pub mod category;
pub mod requests;
pub mod user;
