pub mod errors;
pub mod history;
pub mod models;
pub mod ports;
pub mod service;
mod service_helpers;

#[cfg(test)]
mod tests;

pub use errors::{ChatError, TurnError};
pub use models::*;
pub use ports::ChatServiceTrait;
pub use service::ChatServiceImpl;
