//! # Server Query Library
//!
//! Client side of the A2S query protocol: a paced, deadline-bound UDP
//! channel and the per-server querier built on top of it.
//!
//! ## Module Organization
//!
//! ### Channel Module (`channel`)
//! [`DatagramChannel`] owns one connected UDP socket:
//! - every send and receive is bounded by the configured timeout
//! - consecutive sends are spaced by `60s / rate + 1s` when a rate limit is set
//! - receives read exactly one datagram of at most 1400 bytes
//!
//! ### Querier Module (`querier`)
//! [`ServerQuerier`] issues info and player requests, transparently
//! answering the challenge handshake servers use against reflection abuse.
//!
//! ### Error Module (`error`)
//! [`TransportError`] and [`QueryError`] keep raw causes for logging, while
//! [`ErrorCategory`] is the user-safe classification reported in results.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use query::ServerQuerier;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let addr = "127.0.0.1:27015".parse()?;
//!     let mut querier = ServerQuerier::connect(addr, Duration::from_secs(3)).await?;
//!
//!     let info = querier.fetch_info().await?;
//!     println!("{} on {} ({}/{})", info.name, info.map, info.players, info.max_players);
//!
//!     if info.players > 0 {
//!         for player in querier.fetch_players().await? {
//!             println!("  {} {}", player.name, player.score);
//!         }
//!     }
//!
//!     querier.close();
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod querier;

pub use channel::DatagramChannel;
pub use error::{ErrorCategory, QueryError, TransportError};
pub use querier::ServerQuerier;
