#![deny(missing_docs)]
#![doc = "Core error and configuration types shared by the pickup sweep engine."]

pub mod config;
pub mod errors;

pub use config::{Configuration, ParamValue};
pub use errors::{ErrorInfo, PickupError};
