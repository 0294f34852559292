//! The hardware module contains the [crate::channel::SerialChannel] implementations
//! for talking to ELM327 style adapters, either for real or simulated.

#[cfg(feature = "serial")]
pub mod serial;
pub mod simulation;
