//! Readiness coordinator (spec §4.4).
//!
//! Tracks a bitset over `{META, BULK, IPC, RPC}` and models the crossings as
//! an explicit state machine (spec §9 design note) so ordering is testable
//! independent of the bitset representation.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subsystems(u8);

impl Subsystems {
    pub const META: Subsystems = Subsystems(1 << 0);
    pub const BULK: Subsystems = Subsystems(1 << 1);
    pub const IPC: Subsystems = Subsystems(1 << 2);
    pub const RPC: Subsystems = Subsystems(1 << 3);
    const BACKEND_READY_MASK: u8 = Self::META.0 | Self::BULK.0;
    const READY_MASK: u8 = Self::BACKEND_READY_MASK | Self::IPC.0 | Self::RPC.0;

    fn contains_all(self, mask: u8) -> bool {
        self.0 & mask == mask
    }
}

/// Lifecycle state. Transitions only move down this list, never back up,
/// except that `Stop` can be called from any state and always lands on
/// `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Starting,
    BackendReady,
    Ready,
    Stopping,
    Stopped,
}

/// Owns the bitset and publishes [`ReadinessState`] transitions to anyone
/// holding a `watch::Receiver` (dispatcher, connection acceptors, tests).
pub struct ReadinessCoordinator {
    bits: Subsystems,
    tx: watch::Sender<ReadinessState>,
}

impl ReadinessCoordinator {
    pub fn new() -> (Self, watch::Receiver<ReadinessState>) {
        let (tx, rx) = watch::channel(ReadinessState::Starting);
        (
            ReadinessCoordinator {
                bits: Subsystems(0),
                tx,
            },
            rx,
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<ReadinessState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ReadinessState {
        *self.tx.borrow()
    }

    /// Sets a subsystem bit. Bits are never cleared by this method — only
    /// `stop` moves the state machine backward. Returns the state after
    /// applying the signal.
    pub fn signal(&mut self, subsystem: Subsystems) -> ReadinessState {
        if matches!(self.current(), ReadinessState::Stopping | ReadinessState::Stopped) {
            return self.current();
        }
        self.bits.0 |= subsystem.0;
        let next = if self.bits.contains_all(Subsystems::READY_MASK) {
            ReadinessState::Ready
        } else if self.bits.contains_all(Subsystems::BACKEND_READY_MASK) {
            ReadinessState::BackendReady
        } else {
            ReadinessState::Starting
        };
        if next != self.current() {
            let _ = self.tx.send(next);
        }
        next
    }

    pub fn begin_stop(&mut self) {
        let _ = self.tx.send(ReadinessState::Stopping);
    }

    pub fn finish_stop(&mut self) {
        let _ = self.tx.send(ReadinessState::Stopped);
    }

    pub fn is_backend_ready(&self) -> bool {
        matches!(
            self.current(),
            ReadinessState::BackendReady | ReadinessState::Ready
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crosses_backend_ready_only_once_meta_and_bulk_are_both_set() {
        let (mut coord, _rx) = ReadinessCoordinator::new();
        assert_eq!(coord.current(), ReadinessState::Starting);
        assert_eq!(coord.signal(Subsystems::META), ReadinessState::Starting);
        assert!(!coord.is_backend_ready());
        assert_eq!(coord.signal(Subsystems::BULK), ReadinessState::BackendReady);
        assert!(coord.is_backend_ready());
    }

    #[test]
    fn crosses_ready_only_once_all_four_subsystems_are_set() {
        let (mut coord, _rx) = ReadinessCoordinator::new();
        coord.signal(Subsystems::META);
        coord.signal(Subsystems::BULK);
        coord.signal(Subsystems::IPC);
        assert_eq!(coord.current(), ReadinessState::BackendReady);
        assert_eq!(coord.signal(Subsystems::RPC), ReadinessState::Ready);
    }

    #[test]
    fn bits_are_monotone_repeated_signals_do_not_regress() {
        let (mut coord, _rx) = ReadinessCoordinator::new();
        coord.signal(Subsystems::META);
        coord.signal(Subsystems::BULK);
        assert_eq!(coord.signal(Subsystems::META), ReadinessState::BackendReady);
    }

    #[test]
    fn stop_moves_straight_to_stopped_and_further_signals_are_ignored() {
        let (mut coord, _rx) = ReadinessCoordinator::new();
        coord.signal(Subsystems::META);
        coord.begin_stop();
        assert_eq!(coord.current(), ReadinessState::Stopping);
        assert_eq!(coord.signal(Subsystems::BULK), ReadinessState::Stopping);
        coord.finish_stop();
        assert_eq!(coord.current(), ReadinessState::Stopped);
    }
}
