pub mod claims;
pub mod config;
pub mod resolve;
pub mod server;
pub mod stats;
pub mod status;
