//! Per-channel request sequence numbers
//!
//! Every asynchronous request is tagged with the epoch issued for its channel.
//! When the response arrives it is applied only if no later request on the
//! same channel has been issued in the meantime.

/// Logical request class. Each has an independent counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Candidates,
    Beam,
}

#[derive(Debug, Default)]
pub struct EpochTracker {
    candidates: u64,
    beam: u64,
}

impl EpochTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next epoch for `channel`. Never returns the same value twice.
    pub fn next_epoch(&mut self, channel: Channel) -> u64 {
        let counter = self.counter_mut(channel);
        *counter += 1;
        *counter
    }

    /// True if `epoch` is the latest one issued on `channel`
    pub fn is_current(&self, channel: Channel, epoch: u64) -> bool {
        self.latest(channel) == epoch
    }

    pub fn latest(&self, channel: Channel) -> u64 {
        match channel {
            Channel::Candidates => self.candidates,
            Channel::Beam => self.beam,
        }
    }

    fn counter_mut(&mut self, channel: Channel) -> &mut u64 {
        match channel {
            Channel::Candidates => &mut self.candidates,
            Channel::Beam => &mut self.beam,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epochs_increase() {
        let mut tracker = EpochTracker::new();
        let first = tracker.next_epoch(Channel::Candidates);
        let second = tracker.next_epoch(Channel::Candidates);
        assert!(second > first);
        assert!(!tracker.is_current(Channel::Candidates, first));
        assert!(tracker.is_current(Channel::Candidates, second));
    }

    #[test]
    fn test_channels_are_independent() {
        let mut tracker = EpochTracker::new();
        let beam = tracker.next_epoch(Channel::Beam);
        tracker.next_epoch(Channel::Candidates);
        tracker.next_epoch(Channel::Candidates);

        assert!(tracker.is_current(Channel::Beam, beam));
        assert_eq!(tracker.latest(Channel::Candidates), 2);
    }
}
