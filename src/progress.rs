//! Progress reporting and cancellation for long-running work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

/// Phases of a single import or export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    ReadingFile,
    DecodingRecords,
    /// Import only: decoded records wait for the caller to pick what to keep.
    AwaitingUserSelection,
    WritingToStore,
    Done,
    Failed,
}

impl TransferState {
    /// Whether a run may move from `self` to `next`.
    pub fn can_advance_to(&self, next: TransferState) -> bool {
        use TransferState::*;

        if next == Failed {
            return !matches!(self, Done | Failed);
        }

        matches!(
            (self, next),
            (Idle, ReadingFile)
                | (Idle, DecodingRecords)
                | (ReadingFile, DecodingRecords)
                | (DecodingRecords, AwaitingUserSelection)
                | (DecodingRecords, WritingToStore)
                | (AwaitingUserSelection, WritingToStore)
                | (WritingToStore, Done)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    State(TransferState),
    /// `index` is 1-based.
    Record { index: usize, total: usize },
    Iteration { current: u32, total: u32 },
}

/// Optional progress sink. Send failures mean the receiver went away and
/// are ignored.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    tx: Option<Sender<Progress>>,
}

impl Reporter {
    pub fn new(tx: Sender<Progress>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn send(&self, event: Progress) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Shared flag a caller raises to abandon an in-progress run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn import_path_is_allowed() {
        use TransferState::*;
        let path = [
            Idle,
            ReadingFile,
            DecodingRecords,
            AwaitingUserSelection,
            WritingToStore,
            Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn failed_reachable_until_finished() {
        use TransferState::*;
        for state in [Idle, ReadingFile, DecodingRecords, AwaitingUserSelection, WritingToStore] {
            assert!(state.can_advance_to(Failed));
        }
        assert!(!Done.can_advance_to(Failed));
        assert!(!Done.can_advance_to(Idle));
        assert!(!Idle.can_advance_to(Done));
    }

    #[test]
    fn reporter_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        let reporter = Reporter::new(tx);
        reporter.send(Progress::State(TransferState::Idle));
        assert_eq!(rx.recv().unwrap(), Progress::State(TransferState::Idle));
        drop(rx);
        reporter.send(Progress::State(TransferState::Done));
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
