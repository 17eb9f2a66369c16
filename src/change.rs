//! Pending pixel changes and the bounded channel that carries them to the coordinator.

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{Channel, TryReceiveError, TrySendError},
};
use portable_atomic::{AtomicBool, Ordering};

use crate::shared_constants::CHANGE_CHANNEL_CAPACITY;

/// One pending pixel write: turn `(x, y)` on or off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    pub x: usize,
    pub y: usize,
    pub on: bool,
}

impl ChangeEvent {
    #[must_use]
    pub const fn new(x: usize, y: usize, on: bool) -> Self {
        Self { x, y, on }
    }
}

impl From<(usize, usize, bool)> for ChangeEvent {
    fn from((x, y, on): (usize, usize, bool)) -> Self {
        Self::new(x, y, on)
    }
}

/// Outcome of [`ChangeChannel::try_enqueue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    /// The event is queued.
    Queued,
    /// The channel is shut down; the event was dropped.
    Closed,
    /// The channel is at capacity; the event is handed back.
    Full(ChangeEvent),
}

/// FIFO of [`ChangeEvent`]s with an explicit, one-way closed state.
///
/// Open channels accept and yield events. Once [`shut_down`](Self::shut_down) is called,
/// sends become no-ops, pops report empty, and the channel never reopens.
pub struct ChangeChannel {
    channel: Channel<CriticalSectionRawMutex, ChangeEvent, CHANGE_CHANNEL_CAPACITY>,
    closed: AtomicBool,
}

impl ChangeChannel {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Non-blocking insert.
    pub fn try_enqueue(&self, event: ChangeEvent) -> Enqueued {
        if self.is_shut_down() {
            return Enqueued::Closed;
        }
        match self.channel.try_send(event) {
            Ok(()) => Enqueued::Queued,
            Err(TrySendError::Full(event)) => Enqueued::Full(event),
        }
    }

    /// Non-blocking pop. `None` when empty or shut down.
    pub fn try_pop(&self) -> Option<ChangeEvent> {
        if self.is_shut_down() {
            return None;
        }
        match self.channel.try_receive() {
            Ok(event) => Some(event),
            Err(TryReceiveError::Empty) => None,
        }
    }

    /// Close the channel for good and discard anything still queued.
    pub fn shut_down(&self) {
        self.closed.store(true, Ordering::Release);
        self.channel.clear();
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl Default for ChangeChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ChangeChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangeChannel")
            .field("len", &self.len())
            .field("closed", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeChannel, ChangeEvent, Enqueued};
    use crate::shared_constants::CHANGE_CHANNEL_CAPACITY;

    #[test]
    fn events_come_out_in_order() {
        let channel = ChangeChannel::new();
        for x in 0..5 {
            assert_eq!(
                channel.try_enqueue(ChangeEvent::new(x, 0, true)),
                Enqueued::Queued
            );
        }
        let popped: Vec<_> = core::iter::from_fn(|| channel.try_pop()).map(|e| e.x).collect();
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
        assert!(channel.is_empty());
    }

    #[test]
    fn shut_down_drops_backlog_and_refuses_sends() {
        let channel = ChangeChannel::new();
        channel.try_enqueue(ChangeEvent::new(0, 0, true));
        channel.shut_down();
        assert!(channel.is_shut_down());
        assert!(channel.is_empty());
        assert_eq!(
            channel.try_enqueue(ChangeEvent::new(1, 1, true)),
            Enqueued::Closed
        );
        assert_eq!(channel.try_pop(), None);
    }

    #[test]
    fn full_channel_hands_the_event_back() {
        let channel = ChangeChannel::new();
        for index in 0..CHANGE_CHANNEL_CAPACITY {
            assert_eq!(
                channel.try_enqueue(ChangeEvent::new(index, 0, true)),
                Enqueued::Queued
            );
        }
        let extra = ChangeEvent::new(0, 1, false);
        assert_eq!(channel.try_enqueue(extra), Enqueued::Full(extra));
        assert_eq!(channel.len(), CHANGE_CHANNEL_CAPACITY);
    }
}
