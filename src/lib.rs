#[macro_use]
extern crate tracing;

pub mod config;
pub mod error;
pub mod mirror;
pub mod output;
pub mod poll;
pub mod readiness;
pub mod status;
pub mod wait;

pub use error::Error;
