//! # ESP-AT MQTT client
//!
//! Drives the MQTT client of an ESP-AT modem over a serial AT-command channel.
//!
//! * [adapter]: request/response driver for the supported AT commands
//! * [gate]: waits for the WIFI association with backoff and cancellation
//! * [session]: state machine for configuring and connecting the MQTT client
//! * [device]: status, discovery and uptime topics of the device
//! * [bridge]: cooperative main loop incl. console passthrough
#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

pub mod adapter;
pub mod bridge;
pub mod buffer;
pub(crate) mod commands;
pub mod config;
pub mod device;
pub mod gate;
pub mod session;
pub mod transport;

pub use commands::ConnectionScheme;

#[cfg(test)]
mod tests;
