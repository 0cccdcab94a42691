pub mod app;
pub mod common;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod modules;
pub mod state;
pub mod workers;

#[cfg(test)]
mod test_helpers;
