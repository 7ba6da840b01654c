pub mod activity;
pub mod addresses;
pub mod error;
pub mod models;
pub mod rotation;
pub mod settings;
pub mod stats;
pub mod store;
