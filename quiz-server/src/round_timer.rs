use dashmap::DashMap;
use quiz_types::LobbyId;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Closes the round when its deadline passes.
    RoundDeadline,
    /// Advances after the reveal has been shown for a while.
    RevealHold,
}

struct ScheduledTimer {
    timer_id: u64,
    round_index: u32,
    kind: TimerKind,
    handle: AbortHandle,
}

/// One pending timer per lobby. Scheduling replaces whatever was pending,
/// so a stale deadline can never fire against a newer round.
#[derive(Default)]
pub struct RoundTimers {
    timers: Arc<DashMap<LobbyId, ScheduledTimer>>,
    next_id: AtomicU64,
}

impl RoundTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` after `delay`. The task is spawned separately once the
    /// delay elapses, so cancelling afterwards never interrupts it midway.
    pub fn schedule<F>(
        &self,
        lobby_id: LobbyId,
        round_index: u32,
        kind: TimerKind,
        delay: Duration,
        task: F,
    ) where
        F: Future<Output = ()> + Send + 'static,
    {
        let timer_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timers = self.timers.clone();
        let key = lobby_id.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            timers.remove_if(&key, |_, timer| timer.timer_id == timer_id);
            tokio::spawn(task);
        });

        let scheduled = ScheduledTimer {
            timer_id,
            round_index,
            kind,
            handle: handle.abort_handle(),
        };
        if let Some(previous) = self.timers.insert(lobby_id, scheduled) {
            previous.handle.abort();
        }
    }

    pub fn cancel(&self, lobby_id: &LobbyId) {
        if let Some((_, timer)) = self.timers.remove(lobby_id) {
            timer.handle.abort();
        }
    }

    pub fn pending(&self, lobby_id: &LobbyId) -> Option<(u32, TimerKind)> {
        self.timers
            .get(lobby_id)
            .map(|timer| (timer.round_index, timer.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_timer_fires_and_clears() {
        let timers = RoundTimers::new();
        let lobby_id = LobbyId::new("ABC123");
        let (tx, mut rx) = mpsc::unbounded_channel();

        timers.schedule(
            lobby_id.clone(),
            0,
            TimerKind::RoundDeadline,
            Duration::from_millis(10),
            async move {
                let _ = tx.send(0u32);
            },
        );
        assert_eq!(
            timers.pending(&lobby_id),
            Some((0, TimerKind::RoundDeadline))
        );

        assert_eq!(rx.recv().await, Some(0));
        assert_eq!(timers.pending(&lobby_id), None);
    }

    #[tokio::test]
    async fn test_rescheduling_replaces_pending_timer() {
        let timers = RoundTimers::new();
        let lobby_id = LobbyId::new("ABC123");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let stale = tx.clone();
        timers.schedule(
            lobby_id.clone(),
            0,
            TimerKind::RoundDeadline,
            Duration::from_millis(10),
            async move {
                let _ = stale.send(0u32);
            },
        );
        timers.schedule(
            lobby_id.clone(),
            0,
            TimerKind::RevealHold,
            Duration::from_millis(30),
            async move {
                let _ = tx.send(1u32);
            },
        );

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_cancel_prevents_firing() {
        let timers = RoundTimers::new();
        let lobby_id = LobbyId::new("ABC123");
        let (tx, mut rx) = mpsc::unbounded_channel::<u32>();

        timers.schedule(
            lobby_id.clone(),
            2,
            TimerKind::RoundDeadline,
            Duration::from_millis(10),
            async move {
                let _ = tx.send(2);
            },
        );
        timers.cancel(&lobby_id);

        assert_eq!(rx.recv().await, None);
        assert_eq!(timers.pending(&lobby_id), None);
    }
}
