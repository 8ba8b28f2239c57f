// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client
//
//! # envisalink-tpi
//!
//! Client engine for the Envisalink Terminal Protocol Interface (TPI), the
//! line-oriented TCP protocol spoken by Envisalink modules attached to DSC
//! alarm panels.
//!
//! The engine frames and checksums messages, logs in, keeps the session
//! alive, and routes inbound traffic: correlated replies go to the caller
//! that is waiting for them, unsolicited events go to registered listeners.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use envisalink_tpi::{ClientCode, ServerCode, TpiClient, TpiConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TpiConfig::builder()
//!         .host("192.168.0.50")
//!         .password("user")
//!         .build();
//!
//!     let client = TpiClient::connect(config).await?;
//!
//!     client.on(ServerCode::ZoneOpen, |msg| {
//!         println!("Zone open: {}", msg.data_str());
//!     });
//!
//!     let ack = client
//!         .send(ClientCode::StatusReport, b"", Some(ServerCode::Ack), Duration::from_secs(5))
//!         .await?;
//!     println!("Acknowledged: {:?}", ack);
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod codes;
pub mod config;
pub mod error;
pub mod event;
pub mod frame;
pub mod message;
pub mod status;
pub mod transport;

// Re-exports for convenience
pub use client::TpiClient;
pub use codes::{ClientCode, Code, CodeRegistry, Registries, ServerCode};
pub use config::{TpiConfig, TpiConfigBuilder};
pub use error::{Result, SystemErrorCode, TpiError};
pub use event::{ConnectionState, StateReceiver};
pub use message::{ClientMessage, Message, MessageId, ServerMessage};
pub use status::{KeypadLedState, LoginResult, PanicTarget, SystemTroubleStatus};
pub use transport::dispatcher::{ListenerId, ReplyFilter};
