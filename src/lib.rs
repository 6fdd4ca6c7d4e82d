//! A TDS 5.0 (Sybase/ASE) client protocol engine: packet framing over a
//! single TCP connection, logical channel multiplexing, the typed
//! package layer, RSA-backed login, and the field-format/field-data
//! codec that moves database types to and from wire bytes.
//!
//! The thin consumer surface ([`client::Client`]) is the intended
//! entry point for most callers; everything below it ([`connection`],
//! [`channel`], [`package`], [`types`]) is available directly for a
//! caller that wants to drive the protocol itself.

pub mod byte_channel;
pub mod cancel;
pub mod capability;
pub mod channel;
pub mod client;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod dynamic;
pub mod error;
pub mod hooks;
pub mod login;
pub mod package;
pub mod packet;
pub mod types;

pub use client::{Client, ExecResult, Rows, Stmt};
pub use config::{ConnectionInfo, RemoteServer};
pub use connection::Connection;
pub use error::{Error, Result};
