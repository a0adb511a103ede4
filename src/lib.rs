//! Self-healing remote control client for desktop media servers.
//!
//! The client keeps one logical connection to a media server, lets callers
//! send `play`, `pause`, `next` and `previous`, and republishes the server's
//! connection status and now-playing information to observers. See
//! [`remote::Client`] to get started.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

mod controller;

pub mod config;
pub mod dispatch;
pub mod error;
pub mod probe;
pub mod protocol;
pub mod remote;
pub mod signal;
pub mod state;
pub mod store;
pub mod target;
pub mod transport;
