pub mod channel;
pub mod config;
pub mod error;
pub mod m3u;
pub mod platform;
pub mod protocol;
