//! The bounded FIFO mailbox.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use futures::Stream;
use tokio::sync::oneshot;

use crate::{CancellationToken, ChannelOptions, Message, OptionsError, ReceiveOptions, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Open,
    Closed,
}

type Delivery<T> = Result<T, Signal>;

/// A receiver parked until a send or close resolves it.
struct Waiter<T> {
    id: u64,
    tx: oneshot::Sender<Delivery<T>>,
}

struct State<T> {
    queue: VecDeque<T>,
    pending_receivers: VecDeque<Waiter<T>>,
    status: ChannelState,
    next_waiter_id: u64,
}

impl<T> State<T> {
    const fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            pending_receivers: VecDeque::new(),
            status: ChannelState::Open,
            next_waiter_id: 0,
        }
    }

    fn is_closed(&self) -> bool {
        self.status == ChannelState::Closed
    }

    fn register(&mut self) -> (u64, oneshot::Receiver<Delivery<T>>) {
        let id = self.next_waiter_id;
        self.next_waiter_id = self.next_waiter_id.wrapping_add(1);

        let (tx, rx) = oneshot::channel();
        self.pending_receivers.push_back(Waiter { id, tx });

        log::trace!(
            "register: waiter={id} pending_receivers={}",
            self.pending_receivers.len()
        );

        (id, rx)
    }

    /// Returns `false` if the waiter was already resolved.
    fn unregister(&mut self, id: u64) -> bool {
        let Some(index) = self.pending_receivers.iter().position(|x| x.id == id) else {
            return false;
        };
        self.pending_receivers.remove(index);
        log::trace!("unregister: waiter={id}");
        true
    }

    /// Hand the oldest queued values to the oldest waiters while more than
    /// `retain` values are queued.
    ///
    /// A waiter whose receiving half is gone gets skipped and its value goes
    /// back to the head of the queue.
    fn pair_off(&mut self, retain: usize) {
        while self.queue.len() > retain
            && let Some(Waiter { id, tx }) = self.pending_receivers.pop_front()
            && let Some(value) = self.queue.pop_front()
        {
            match tx.send(Ok(value)) {
                Ok(()) => {
                    log::trace!(
                        "pair_off: delivered to waiter={id} queue_len={} pending_receivers={}",
                        self.queue.len(),
                        self.pending_receivers.len()
                    );
                }
                Err(undelivered) => {
                    log::trace!("pair_off: waiter={id} was abandoned");
                    if let Ok(value) = undelivered {
                        self.queue.push_front(value);
                    }
                }
            }
        }
    }
}

/// Bounded, asynchronous hand-off between producers and consumers.
///
/// `Channel` is a handle: clones share the same queue, waiters and state, so
/// one clone can be moved into a producer task and another into a consumer.
pub struct Channel<T> {
    options: ChannelOptions,
    inner: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            options: self.options,
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new(ChannelOptions::default())
    }
}

impl<T> Channel<T> {
    /// Create a channel. Zero `min_queue_length_for_processing` or
    /// `max_queue_size` are raised to `1`, and a `buffer_size` that would
    /// fill the whole queue is lowered to `max_queue_size - 1`.
    #[must_use]
    pub fn new(options: ChannelOptions) -> Self {
        Self {
            options: options.clamped(),
            inner: Arc::new(Mutex::new(State::new())),
        }
    }

    /// # Errors
    ///
    /// * If the `options` are out of range. See [`ChannelOptions::validate`]
    pub fn try_new(options: ChannelOptions) -> Result<Self, OptionsError> {
        options.validate()?;
        Ok(Self::new(options))
    }

    #[must_use]
    pub const fn options(&self) -> &ChannelOptions {
        &self.options
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.inner.lock().unwrap()
    }

    /// Enqueue `value`, or hand it straight to the oldest parked receiver.
    ///
    /// Never waits.
    ///
    /// # Errors
    ///
    /// * [`Signal::Close`] if the channel is closed
    /// * [`Signal::BackPressure`] if the queue is at `max_queue_size`
    /// * [`Signal::Cancelled`] if `cancel_token` is cancelled. The queue is
    ///   left untouched
    ///
    /// # Panics
    ///
    /// * If the channel's `Mutex` is poisoned
    pub fn send(&self, value: T, cancel_token: Option<&CancellationToken>) -> Result<(), Signal> {
        let mut state = self.lock();

        if state.is_closed() {
            return Err(Signal::Close);
        }
        if state.queue.len() >= self.options.max_queue_size {
            return Err(Signal::BackPressure);
        }
        if cancel_token.is_some_and(CancellationToken::is_cancelled) {
            return Err(Signal::Cancelled);
        }

        state.queue.push_back(value);

        if state.queue.len() >= self.options.min_queue_length_for_processing
            && !state.pending_receivers.is_empty()
        {
            state.pair_off(self.options.buffer_size);
        }

        drop(state);

        Ok(())
    }

    /// Shorthand for [`Channel::send`] without a cancellation token.
    ///
    /// # Errors
    ///
    /// * [`Signal::Close`] if the channel is closed
    /// * [`Signal::BackPressure`] if the queue is at `max_queue_size`
    ///
    /// # Panics
    ///
    /// * If the channel's `Mutex` is poisoned
    pub fn try_send(&self, value: T) -> Result<(), Signal> {
        self.send(value, None)
    }

    /// Wait for the next value.
    ///
    /// Returns straight away when more than `buffer_size` values are queued,
    /// even after the channel has been closed. Otherwise the caller is parked
    /// until a [`Channel::send`] pairs a value with it or [`Channel::close`]
    /// runs. A timed-out or dropped wait is unregistered so no later send can
    /// deliver into it.
    ///
    /// # Errors
    ///
    /// * [`Signal::Close`] if the channel is closed and nothing is releasable,
    ///   or if it closes while waiting
    /// * [`Signal::Cancelled`] if the token in `opts` is already cancelled
    ///   and nothing is releasable
    /// * [`Signal::Timeout`] if `opts.timeout` elapses first
    ///
    /// # Panics
    ///
    /// * If the channel's `Mutex` is poisoned
    pub async fn take(&self, opts: &ReceiveOptions) -> Result<T, Signal> {
        self.take_parked(opts).await.0
    }

    /// [`Channel::take`], also reporting whether the caller had to park.
    async fn take_parked(&self, opts: &ReceiveOptions) -> (Result<T, Signal>, bool) {
        let (id, rx) = {
            let mut state = self.lock();

            if state.queue.len() > self.options.buffer_size
                && let Some(value) = state.queue.pop_front()
            {
                return (Ok(value), false);
            }
            if state.is_closed() {
                return (Err(Signal::Close), false);
            }
            if opts.is_cancelled() {
                return (Err(Signal::Cancelled), false);
            }

            state.register()
        };

        let mut guard = WaiterGuard {
            inner: &*self.inner,
            options: self.options,
            id,
            rx,
            armed: true,
        };

        let delivery = match opts.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, &mut guard.rx).await {
                Ok(received) => received.ok(),
                Err(_elapsed) => {
                    if self.lock().unregister(id) {
                        guard.disarm();
                        log::trace!("take: waiter={id} timed out after {timeout:?}");
                        return (Err(Signal::Timeout), true);
                    }
                    // Paired before the timer won the lock; the value is already sent.
                    guard.rx.try_recv().ok()
                }
            },
            None => (&mut guard.rx).await.ok(),
        };

        guard.disarm();

        (delivery.unwrap_or(Err(Signal::Close)), true)
    }

    /// Take a releasable value without waiting.
    ///
    /// Returns `Ok(None)` while the channel is open and nothing is
    /// releasable.
    ///
    /// # Errors
    ///
    /// * [`Signal::Close`] if the channel is closed and nothing is releasable
    ///
    /// # Panics
    ///
    /// * If the channel's `Mutex` is poisoned
    pub fn try_take(&self) -> Result<Option<T>, Signal> {
        let mut state = self.lock();

        if state.queue.len() > self.options.buffer_size {
            return Ok(state.queue.pop_front());
        }
        if state.is_closed() {
            return Err(Signal::Close);
        }

        Ok(None)
    }

    /// Repeatedly [`Channel::take`] and hand each value to `on_message`.
    ///
    /// When the channel closes while this loop is parked, `on_message` gets
    /// `Message::Signal(Signal::Close)` before the loop ends with
    /// [`Signal::Close`]. If the channel is already closed and drained when a
    /// wait would start, the loop ends with [`Signal::Close`] without reaching
    /// `on_message`. A timeout or cancellation also ends the whole call
    /// without reaching `on_message`.
    ///
    /// # Errors
    ///
    /// * [`Signal::Close`] once the channel is closed and drained
    /// * [`Signal::Timeout`] if any single wait exceeds `opts.timeout`
    /// * [`Signal::Cancelled`] if the token in `opts` is cancelled when a
    ///   wait would start
    ///
    /// # Panics
    ///
    /// * If the channel's `Mutex` is poisoned
    pub async fn receive(
        &self,
        opts: ReceiveOptions,
        mut on_message: impl FnMut(Message<T>),
    ) -> Result<(), Signal> {
        loop {
            match self.take_parked(&opts).await {
                (Ok(value), _) => on_message(Message::Value(value)),
                (Err(Signal::Close), true) => {
                    on_message(Message::Signal(Signal::Close));
                    return Err(Signal::Close);
                }
                (Err(signal), _) => return Err(signal),
            }
        }
    }

    /// [`Channel::receive`] without a callback: values are discarded.
    ///
    /// # Errors
    ///
    /// * Same as [`Channel::receive`]
    ///
    /// # Panics
    ///
    /// * If the channel's `Mutex` is poisoned
    pub async fn drain(&self, opts: ReceiveOptions) -> Result<(), Signal> {
        self.receive(opts, |_| {}).await
    }

    /// Turn this handle into a stream of received values.
    ///
    /// The stream ends once the channel is closed and drained. A timeout or
    /// cancellation is yielded once as an `Err` and then the stream ends.
    pub fn into_stream(self, opts: ReceiveOptions) -> impl Stream<Item = Result<T, Signal>> {
        futures::stream::unfold(Some((self, opts)), |state| async move {
            let (channel, opts) = state?;
            match channel.take(&opts).await {
                Ok(value) => Some((Ok(value), Some((channel, opts)))),
                Err(Signal::Close) => None,
                Err(signal) => Some((Err(signal), None)),
            }
        })
    }

    /// Close the channel.
    ///
    /// Parked receivers are paired with queued values first, oldest with
    /// oldest; the rest are resolved with [`Signal::Close`]. Values left in
    /// the queue stay readable through [`Channel::take`]. Closing twice is a
    /// no-op.
    ///
    /// # Panics
    ///
    /// * If the channel's `Mutex` is poisoned
    pub fn close(&self) {
        let mut state = self.lock();

        if state.is_closed() {
            return;
        }

        state.status = ChannelState::Closed;
        state.pair_off(0);

        log::debug!(
            "close: notifying pending_receivers={} queue_len={}",
            state.pending_receivers.len(),
            state.queue.len()
        );

        while let Some(Waiter { id, tx }) = state.pending_receivers.pop_front() {
            if tx.send(Err(Signal::Close)).is_err() {
                log::trace!("close: waiter={id} was abandoned");
            }
        }
    }

    /// # Panics
    ///
    /// * If the channel's `Mutex` is poisoned
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.lock().status
    }

    /// # Panics
    ///
    /// * If the channel's `Mutex` is poisoned
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }

    /// Number of queued values.
    ///
    /// # Panics
    ///
    /// * If the channel's `Mutex` is poisoned
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// # Panics
    ///
    /// * If the channel's `Mutex` is poisoned
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Number of receivers currently parked.
    ///
    /// # Panics
    ///
    /// * If the channel's `Mutex` is poisoned
    #[must_use]
    pub fn pending_receivers(&self) -> usize {
        self.lock().pending_receivers.len()
    }
}

/// Unregisters a parked waiter if its `take` future is dropped mid-wait.
///
/// If a send already paired the waiter, the delivered value goes back to the
/// head of the queue and is offered to the next parked receiver.
struct WaiterGuard<'a, T> {
    inner: &'a Mutex<State<T>>,
    options: ChannelOptions,
    id: u64,
    rx: oneshot::Receiver<Delivery<T>>,
    armed: bool,
}

impl<T> WaiterGuard<'_, T> {
    const fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<T> Drop for WaiterGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(mut state) = self.inner.lock() else {
            return;
        };
        if state.unregister(self.id) {
            return;
        }
        if let Ok(Ok(value)) = self.rx.try_recv() {
            log::trace!("drop: waiter={} returning undelivered value", self.id);
            state.queue.push_front(value);
            if state.is_closed() {
                state.pair_off(0);
            } else if state.queue.len() >= self.options.min_queue_length_for_processing {
                state.pair_off(self.options.buffer_size);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    /// Let spawned tasks run up to their next suspension point.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[test_log::test]
    fn send_then_try_take_is_fifo() {
        let channel = Channel::default();

        channel.try_send(1).unwrap();
        channel.try_send(2).unwrap();
        channel.try_send(3).unwrap();

        assert_eq!(channel.try_take(), Ok(Some(1)));
        assert_eq!(channel.try_take(), Ok(Some(2)));
        assert_eq!(channel.try_take(), Ok(Some(3)));
        assert_eq!(channel.try_take(), Ok(None));
    }

    #[test_log::test]
    fn send_fails_with_back_pressure_at_capacity() {
        let channel = Channel::new(ChannelOptions::new().with_max_queue_size(3));

        channel.try_send("a").unwrap();
        channel.try_send("b").unwrap();
        channel.try_send("c").unwrap();

        assert_eq!(channel.try_send("d"), Err(Signal::BackPressure));
        assert_eq!(channel.len(), 3);
    }

    #[test_log::test]
    fn closed_check_comes_before_back_pressure() {
        let channel = Channel::new(ChannelOptions::new().with_max_queue_size(1));

        channel.try_send(1).unwrap();
        channel.close();

        assert_eq!(channel.try_send(2), Err(Signal::Close));
    }

    #[test_log::test]
    fn back_pressure_check_comes_before_cancellation() {
        let channel = Channel::new(ChannelOptions::new().with_max_queue_size(1));
        let token = CancellationToken::new();
        token.cancel();

        channel.try_send(1).unwrap();

        assert_eq!(channel.send(2, Some(&token)), Err(Signal::BackPressure));
    }

    #[test_log::test]
    fn cancelled_send_leaves_queue_untouched() {
        let channel = Channel::default();
        let token = CancellationToken::new();

        channel.send(1, Some(&token)).unwrap();
        token.cancel();

        assert_eq!(channel.send(2, Some(&token)), Err(Signal::Cancelled));
        assert_eq!(channel.len(), 1);
    }

    #[test_log::test]
    fn close_is_idempotent() {
        let channel = Channel::default();
        channel.try_send(1).unwrap();

        channel.close();
        let after_first = (channel.state(), channel.len(), channel.pending_receivers());
        channel.close();
        let after_second = (channel.state(), channel.len(), channel.pending_receivers());

        assert_eq!(after_first, (ChannelState::Closed, 1, 0));
        assert_eq!(after_first, after_second);
    }

    #[test_log::test]
    fn try_take_after_close_drains_then_reports_close() {
        let channel = Channel::default();
        channel.try_send(1).unwrap();
        channel.close();

        assert_eq!(channel.try_take(), Ok(Some(1)));
        assert_eq!(channel.try_take(), Err(Signal::Close));
    }

    #[test_log::test]
    fn try_new_rejects_invalid_options() {
        let result = Channel::<u8>::try_new(ChannelOptions::new().with_max_queue_size(0));
        assert_eq!(result.unwrap_err(), OptionsError::MaxQueueSize);

        let result = Channel::<u8>::try_new(
            ChannelOptions::new()
                .with_buffer_size(3)
                .with_max_queue_size(3),
        );
        assert_eq!(result.unwrap_err(), OptionsError::BufferSize);
    }

    #[test_log::test(tokio::test)]
    async fn new_shrinks_buffer_so_a_full_queue_still_releases() {
        let channel = Channel::new(
            ChannelOptions::new()
                .with_buffer_size(3)
                .with_max_queue_size(3),
        );
        assert_eq!(channel.options().buffer_size, 2);

        channel.try_send(1).unwrap();
        channel.try_send(2).unwrap();
        channel.try_send(3).unwrap();

        assert_eq!(channel.take(&ReceiveOptions::new()).await, Ok(1));
        assert_eq!(channel.try_send(4), Ok(()));
    }

    #[test_log::test]
    fn new_clamps_invalid_options() {
        let channel = Channel::<u8>::new(
            ChannelOptions::new()
                .with_min_queue_length_for_processing(0)
                .with_max_queue_size(0),
        );

        assert_eq!(channel.options().min_queue_length_for_processing, 1);
        assert_eq!(channel.options().max_queue_size, 1);
    }

    #[test_log::test]
    fn clones_share_state() {
        let channel = Channel::default();
        let producer = channel.clone();

        producer.try_send(5).unwrap();

        assert_eq!(channel.try_take(), Ok(Some(5)));
    }

    #[test_log::test(tokio::test)]
    async fn take_returns_buffered_value_immediately() {
        let channel = Channel::default();
        channel.try_send("hello").unwrap();

        assert_eq!(channel.take(&ReceiveOptions::new()).await, Ok("hello"));
    }

    #[test_log::test(tokio::test)]
    async fn take_with_cancelled_token_never_parks() {
        let channel = Channel::<u8>::default();
        let token = CancellationToken::new();
        token.cancel();

        let opts = ReceiveOptions::new().with_cancel_token(token);

        assert_eq!(channel.take(&opts).await, Err(Signal::Cancelled));
        assert_eq!(channel.pending_receivers(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn buffered_value_wins_over_cancelled_token() {
        let channel = Channel::default();
        let token = CancellationToken::new();
        token.cancel();
        channel.try_send(1).unwrap();

        let opts = ReceiveOptions::new().with_cancel_token(token);

        assert_eq!(channel.take(&opts).await, Ok(1));
    }

    #[test_log::test(tokio::test)]
    async fn send_wakes_parked_receiver() {
        let channel = Channel::default();
        let consumer = channel.clone();

        let handle = tokio::spawn(async move { consumer.take(&ReceiveOptions::new()).await });
        settle().await;
        assert_eq!(channel.pending_receivers(), 1);

        channel.try_send(42).unwrap();

        assert_eq!(handle.await.unwrap(), Ok(42));
        assert_eq!(channel.pending_receivers(), 0);
        assert!(channel.is_empty());
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn timed_out_waiter_is_unregistered() {
        let channel = Channel::default();
        let opts = ReceiveOptions::new().with_timeout(Duration::from_millis(100));

        assert_eq!(channel.take(&opts).await, Err(Signal::Timeout));
        assert_eq!(channel.pending_receivers(), 0);

        channel.try_send(1).unwrap();
        assert_eq!(channel.len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn dropped_take_is_unregistered() {
        let channel = Channel::<u8>::default();

        let opts = ReceiveOptions::new();

        {
            let take = channel.take(&opts);
            let mut take = std::pin::pin!(take);
            assert!(futures::poll!(take.as_mut()).is_pending());
            assert_eq!(channel.pending_receivers(), 1);
        }

        assert_eq!(channel.pending_receivers(), 0);

        channel.try_send(7).unwrap();
        assert_eq!(channel.try_take(), Ok(Some(7)));
    }

    #[test_log::test]
    fn pairing_skips_abandoned_waiters() {
        let channel = Channel::default();

        {
            let mut state = channel.lock();
            let (_id, rx) = state.register();
            drop(rx);
        }

        channel.try_send(3).unwrap();

        assert_eq!(channel.pending_receivers(), 0);
        assert_eq!(channel.try_take(), Ok(Some(3)));
    }

    #[test_log::test(tokio::test)]
    async fn close_resolves_parked_receiver_with_close() {
        let channel = Channel::<u8>::default();
        let consumer = channel.clone();

        let handle = tokio::spawn(async move { consumer.take(&ReceiveOptions::new()).await });
        settle().await;

        channel.close();

        assert_eq!(handle.await.unwrap(), Err(Signal::Close));
        assert_eq!(channel.pending_receivers(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn close_pairs_held_back_values_before_signalling() {
        let channel = Channel::new(ChannelOptions::new().with_min_queue_length_for_processing(3));

        let first = tokio::spawn({
            let channel = channel.clone();
            async move { channel.take(&ReceiveOptions::new()).await }
        });
        settle().await;
        let second = tokio::spawn({
            let channel = channel.clone();
            async move { channel.take(&ReceiveOptions::new()).await }
        });
        settle().await;
        assert_eq!(channel.pending_receivers(), 2);

        channel.try_send("only").unwrap();
        assert_eq!(channel.pending_receivers(), 2);

        channel.close();

        assert_eq!(first.await.unwrap(), Ok("only"));
        assert_eq!(second.await.unwrap(), Err(Signal::Close));
    }

    #[test_log::test(tokio::test)]
    async fn dropping_a_paired_take_returns_its_value_to_the_queue() {
        let channel = Channel::default();
        let opts = ReceiveOptions::new();

        {
            let take = channel.take(&opts);
            let mut take = std::pin::pin!(take);
            assert!(futures::poll!(take.as_mut()).is_pending());

            channel.try_send(7).unwrap();
            assert_eq!(channel.pending_receivers(), 0);
            assert!(channel.is_empty());
        }

        assert_eq!(channel.try_take(), Ok(Some(7)));
    }

    #[test_log::test(tokio::test)]
    async fn dropping_a_paired_take_hands_its_value_to_the_next_waiter() {
        let channel = Channel::default();
        let opts = ReceiveOptions::new();

        let mut take = Box::pin(channel.take(&opts));
        assert!(futures::poll!(take.as_mut()).is_pending());

        let next = tokio::spawn({
            let channel = channel.clone();
            async move { channel.take(&ReceiveOptions::new()).await }
        });
        settle().await;
        assert_eq!(channel.pending_receivers(), 2);

        channel.try_send("first").unwrap();
        assert_eq!(channel.pending_receivers(), 1);

        drop(take);

        assert_eq!(next.await.unwrap(), Ok("first"));
        assert!(channel.is_empty());
        assert_eq!(channel.pending_receivers(), 0);
    }
}
