#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Basic usage example for `switchy_channel`
//!
//! A producer task pushes a message into the channel on a fixed interval while
//! the main task consumes them through [`Channel::receive`]. Once the producer
//! runs out of messages it closes the channel, which ends the receive loop.
//!
//! Tuning through environment variables:
//!
//! * `CHANNEL_MAX_QUEUE_SIZE` (default `10`)
//! * `CHANNEL_BUFFER_SIZE` (default `0`)
//! * `PRODUCE_INTERVAL_MS` (default `500`)

use std::time::Duration;

use switchy_channel::{Channel, ChannelOptions, Message, ReceiveOptions, Signal};
use thiserror::Error;

const MESSAGES: &[&str] = &[
    "The quick brown fox jumps over the lazy dog",
    "Channels hand values from producers to consumers",
    "A full queue pushes back on the producer",
    "Closing a channel wakes every waiting receiver",
    "FIFO: first in, first out",
];

#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Channel(#[from] Signal),
    #[error(transparent)]
    Env(#[from] DefaultEnvUsizeError),
}

#[derive(Debug, Error)]
enum DefaultEnvUsizeError {
    #[error("Invalid value for {name}: {source}")]
    ParseInt {
        name: &'static str,
        source: std::num::ParseIntError,
    },
}

/// # Errors
///
/// * If the variable is set but is not a valid `usize`
fn default_env_usize(name: &'static str, default: usize) -> Result<usize, DefaultEnvUsizeError> {
    parse_usize_or(name, std::env::var(name).ok().as_deref(), default)
}

fn parse_usize_or(
    name: &'static str,
    value: Option<&str>,
    default: usize,
) -> Result<usize, DefaultEnvUsizeError> {
    match value {
        Some(value) => value
            .parse::<usize>()
            .map_err(|source| DefaultEnvUsizeError::ParseInt { name, source }),
        None => Ok(default),
    }
}

fn options_from_env() -> Result<ChannelOptions, Error> {
    Ok(ChannelOptions::new()
        .with_max_queue_size(default_env_usize("CHANNEL_MAX_QUEUE_SIZE", 10)?)
        .with_buffer_size(default_env_usize("CHANNEL_BUFFER_SIZE", 0)?))
}

async fn produce(channel: Channel<String>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);

    for message in MESSAGES {
        ticker.tick().await;

        match channel.try_send((*message).to_string()) {
            Ok(()) => log::debug!("produce: sent message"),
            Err(Signal::BackPressure) => log::warn!("produce: channel is full, dropping message"),
            Err(e) => {
                log::error!("produce: {e}");
                return;
            }
        }
    }

    log::debug!("produce: done, closing channel");
    channel.close();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let options = options_from_env()?;
    let interval = Duration::from_millis(default_env_usize("PRODUCE_INTERVAL_MS", 500)? as u64);

    log::info!("Starting channel with {options:?}");

    let channel = Channel::new(options);
    let producer = tokio::spawn(produce(channel.clone(), interval));

    let result = channel
        .receive(
            ReceiveOptions::new().with_timeout(interval * 4),
            |message| match message {
                Message::Value(value) => println!("📨 {value}"),
                Message::Signal(signal) => println!("🔒 {signal}"),
            },
        )
        .await;

    if let Err(e) = producer.await {
        log::error!("Producer task failed: {e:?}");
    }

    match result {
        Ok(()) | Err(Signal::Close) => {
            println!("Channel closed, all messages received");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
