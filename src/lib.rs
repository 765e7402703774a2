//! flocksquawk library: surveillance hardware signature detection engine.
//!
//! Passive WiFi and BLE sightings are reduced to observations, matched
//! against vendor signature tables, debounced per address and folded into a
//! single detection session with heartbeat and timeout. Everything here is
//! `no_std`, allocation-free and clock-free (callers pass timestamps), so
//! the whole engine is testable on any host with `cargo test`. The ESP32
//! firmware in `main.rs` only provides radio access and output transports.
//!
//! Data flow: `scanner` → `filter` (+ `raven`) → `debounce` → `lifecycle`,
//! owned together by `detector`, with records defined in `protocol` and
//! encoded for the wire by `comm`.

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod comm;
pub mod debounce;
pub mod defaults;
pub mod detector;
pub mod filter;
pub mod lifecycle;
pub mod protocol;
pub mod raven;
pub mod scanner;
