#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Backpressure example for `switchy_channel`
//!
//! Walks through the failure outcomes of a channel: a full queue, a cancelled
//! token, a receive timeout and a closed channel.

use std::time::Duration;

use switchy_channel::{CancellationToken, Channel, ChannelOptions, ReceiveOptions, Signal};
use thiserror::Error;

#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Channel(#[from] Signal),
    #[error(transparent)]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error("Expected {expected:?}, got {actual:?}")]
    Unexpected {
        expected: Signal,
        actual: Result<(), Signal>,
    },
}

fn expect_signal(expected: Signal, actual: Result<(), Signal>) -> Result<(), Error> {
    if actual == Err(expected) {
        println!("   -> {expected}");
        Ok(())
    } else {
        Err(Error::Unexpected { expected, actual })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    // Only the capacity is configured, the rest falls back to the defaults.
    let options: ChannelOptions = serde_json::from_str(r#"{ "maxQueueSize": 3 }"#)?;
    log::info!("Channel options: {options:?}");

    let channel = Channel::new(options);

    println!("1. Filling the queue");
    for i in 1..=3 {
        channel.try_send(format!("message {i}"))?;
    }
    expect_signal(
        Signal::BackPressure,
        channel.try_send("message 4".to_string()),
    )?;

    println!("2. Draining one value makes room again");
    let first = channel.take(&ReceiveOptions::new()).await?;
    println!("   -> took {first:?}");
    channel.try_send("message 4".to_string())?;

    println!("3. A cancelled token stops a send before it touches the queue");
    let token = CancellationToken::new();
    token.cancel();
    channel.take(&ReceiveOptions::new()).await?;
    expect_signal(
        Signal::Cancelled,
        channel.send("message 5".to_string(), Some(&token)),
    )?;
    println!("   queue length is still {}", channel.len());

    println!("4. Waiting on an empty channel times out");
    while channel.try_take()?.is_some() {}
    let timeout = ReceiveOptions::new().with_timeout(Duration::from_millis(250));
    expect_signal(Signal::Timeout, channel.take(&timeout).await.map(|_| ()))?;

    println!("5. Closing wakes parked receivers and refuses new values");
    let receiver = tokio::spawn({
        let channel = channel.clone();
        async move { channel.take(&ReceiveOptions::new()).await }
    });
    tokio::task::yield_now().await;
    channel.close();
    channel.close();
    expect_signal(Signal::Close, receiver.await?.map(|_| ()))?;
    expect_signal(Signal::Close, channel.try_send("too late".to_string()))?;

    Ok(())
}
