pub mod client;
pub mod lease;
