//! Channel configuration and per-receive options.

use std::time::Duration;

use thiserror::Error;

use crate::CancellationToken;

pub const DEFAULT_MIN_QUEUE_LENGTH_FOR_PROCESSING: usize = 1;
pub const DEFAULT_BUFFER_SIZE: usize = 0;
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("min_queue_length_for_processing must be at least 1")]
    MinQueueLengthForProcessing,
    #[error("max_queue_size must be at least 1")]
    MaxQueueSize,
    #[error("buffer_size must be smaller than max_queue_size")]
    BufferSize,
}

/// Immutable configuration of a [`Channel`](crate::Channel).
///
/// Any field left out of a deserialized document takes its default, so a
/// partial configuration merges over [`ChannelOptions::default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct ChannelOptions {
    /// Queue length required before a send releases values to parked
    /// receivers.
    pub min_queue_length_for_processing: usize,
    /// Number of values the queue retains before releasing to a receiver.
    pub buffer_size: usize,
    /// Capacity bound. A send into a queue this long fails with
    /// [`Signal::BackPressure`](crate::Signal::BackPressure).
    pub max_queue_size: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelOptions {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min_queue_length_for_processing: DEFAULT_MIN_QUEUE_LENGTH_FOR_PROCESSING,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
        }
    }

    #[must_use]
    pub const fn with_min_queue_length_for_processing(mut self, value: usize) -> Self {
        self.min_queue_length_for_processing = value;
        self
    }

    #[must_use]
    pub const fn with_buffer_size(mut self, value: usize) -> Self {
        self.buffer_size = value;
        self
    }

    #[must_use]
    pub const fn with_max_queue_size(mut self, value: usize) -> Self {
        self.max_queue_size = value;
        self
    }

    /// # Errors
    ///
    /// * If `min_queue_length_for_processing` is `0`
    /// * If `max_queue_size` is `0`
    /// * If `buffer_size` is not smaller than `max_queue_size`, which would
    ///   leave a send no room to release anything before back-pressure
    pub const fn validate(&self) -> Result<(), OptionsError> {
        if self.min_queue_length_for_processing == 0 {
            return Err(OptionsError::MinQueueLengthForProcessing);
        }
        if self.max_queue_size == 0 {
            return Err(OptionsError::MaxQueueSize);
        }
        if self.buffer_size >= self.max_queue_size {
            return Err(OptionsError::BufferSize);
        }
        Ok(())
    }

    /// Replace out-of-range values with the smallest valid value.
    #[must_use]
    pub(crate) fn clamped(mut self) -> Self {
        if self.min_queue_length_for_processing == 0 {
            log::warn!("min_queue_length_for_processing=0 is invalid, using 1");
            self.min_queue_length_for_processing = 1;
        }
        if self.max_queue_size == 0 {
            log::warn!("max_queue_size=0 is invalid, using 1");
            self.max_queue_size = 1;
        }
        if self.buffer_size >= self.max_queue_size {
            let buffer_size = self.max_queue_size - 1;
            log::warn!(
                "buffer_size={} must be smaller than max_queue_size={}, using {buffer_size}",
                self.buffer_size,
                self.max_queue_size,
            );
            self.buffer_size = buffer_size;
        }
        self
    }
}

/// Options for a single [`Channel::take`](crate::Channel::take) or a whole
/// [`Channel::receive`](crate::Channel::receive) loop.
#[derive(Debug, Clone, Default)]
pub struct ReceiveOptions {
    /// How long one wait may last before failing with
    /// [`Signal::Timeout`](crate::Signal::Timeout). `None` waits forever.
    pub timeout: Option<Duration>,
    pub cancel_token: Option<CancellationToken>,
}

impl ReceiveOptions {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout: None,
            cancel_token: None,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}
