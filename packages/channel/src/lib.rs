//! Bounded, in-memory, asynchronous message channel.
//!
//! A [`Channel`] is a FIFO mailbox. Producers [`send`](Channel::send) without
//! waiting; consumers [`take`](Channel::take) or [`receive`](Channel::receive)
//! with an optional timeout and [`CancellationToken`]. A full queue rejects
//! sends with [`Signal::BackPressure`], and [`close`](Channel::close) is a
//! one-way transition.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use switchy_channel::{Channel, ChannelOptions, Message, ReceiveOptions, Signal};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let channel = Channel::new(ChannelOptions::new().with_max_queue_size(3));
//!
//! channel.try_send("one").unwrap();
//! channel.try_send("two").unwrap();
//! channel.try_send("three").unwrap();
//! assert_eq!(channel.try_send("four"), Err(Signal::BackPressure));
//!
//! channel.close();
//!
//! let mut received = vec![];
//! let result = channel
//!     .receive(
//!         ReceiveOptions::new().with_timeout(Duration::from_secs(1)),
//!         |message| {
//!             if let Message::Value(value) = message {
//!                 received.push(value);
//!             }
//!         },
//!     )
//!     .await;
//!
//! assert_eq!(result, Err(Signal::Close));
//! assert_eq!(received, vec!["one", "two", "three"]);
//! # }
//! ```

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

mod cancel;
mod channel;
mod options;
mod signal;

pub use cancel::CancellationToken;
pub use channel::{Channel, ChannelState};
pub use options::{
    ChannelOptions, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_QUEUE_SIZE,
    DEFAULT_MIN_QUEUE_LENGTH_FOR_PROCESSING, OptionsError, ReceiveOptions,
};
pub use signal::{Message, Signal};
