pub mod env;
pub mod kea;
