pub mod analysis;
pub mod config;
pub mod error;
pub mod quota;
pub mod resolver;
pub mod web;
pub mod youtube;

pub use error::{Result, ScanError};
