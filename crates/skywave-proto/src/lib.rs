pub mod config;
pub mod country;
pub mod favorites;
pub mod history;
pub mod metadata;
pub mod platform;
pub mod protocol;
pub mod state;
