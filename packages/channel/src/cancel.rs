//! Cooperative cancellation for channel operations.

/// A shared flag a caller sets to ask its own channel operations to abort.
///
/// Clones observe the same flag, so one token can guard several sends and
/// receives at once. The channel only reads it, at the entry of
/// [`Channel::send`](crate::Channel::send) and
/// [`Channel::take`](crate::Channel::take). Cancelling does not wake a
/// receiver that is already parked; give the receive a timeout for that.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(tokio_util::sync::CancellationToken);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. It stays set; cancelling again changes nothing.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}
