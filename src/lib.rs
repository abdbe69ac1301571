#![warn(clippy::all)]

pub mod attach;
pub mod config;

pub use config::Config;
