//! Out-of-band outcomes of channel operations.
//!
//! A [`Signal`] is never a payload value. It is returned as the error side of
//! [`Channel::send`](crate::Channel::send) and
//! [`Channel::take`](crate::Channel::take), and forwarded to receive callbacks
//! wrapped in a [`Message`].

use thiserror::Error;

/// The reason a channel operation did not produce or accept a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Signal {
    /// A receive wait exceeded its configured timeout before a value arrived.
    #[error("Receiving data is taking longer than expected.")]
    Timeout,
    /// The channel has been closed.
    #[error("Channel is closed.")]
    Close,
    /// The queue is at capacity and the value was rejected.
    #[error("Channel is full")]
    BackPressure,
    /// The caller's [`CancellationToken`](crate::CancellationToken) was
    /// cancelled before the operation started.
    #[error("Receiving new messages are cancelled")]
    Cancelled,
}

impl Signal {
    /// Whether the caller may retry the same operation on the same channel.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        !self.is_terminal()
    }

    /// Whether the channel will never accept or produce values again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Close)
    }
}

/// What a receive callback is handed: a delivered value or a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<T> {
    Value(T),
    Signal(Signal),
}

impl<T> Message<T> {
    /// Returns the delivered value, if this message carries one.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Signal(_) => None,
        }
    }

    #[must_use]
    pub const fn is_signal(&self) -> bool {
        matches!(self, Self::Signal(_))
    }
}

impl<T> From<Result<T, Signal>> for Message<T> {
    fn from(value: Result<T, Signal>) -> Self {
        match value {
            Ok(value) => Self::Value(value),
            Err(signal) => Self::Signal(signal),
        }
    }
}
