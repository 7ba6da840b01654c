pub mod addresses;
pub mod status;
