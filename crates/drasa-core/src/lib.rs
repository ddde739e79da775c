pub mod error;
pub mod types;
pub mod config;
pub mod provider;
pub mod chat;
pub mod store;
pub mod util;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const LOGO: &str = "✦";
