use crate::error::{Error, Result};

/// The orchestrator's explicit session state machine (`spec.md` §4.5):
/// `init → planning → executing → recording → learning-scheduled → done |
/// error`. Grounded in `memory-core/src/memory/mod.rs`'s
/// `SelfLearningMemory` facade sequencing (start→log→complete→retrieve),
/// generalized here into a named enum with guarded transitions instead of
/// the teacher's implicit call-order contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Init,
    Planning,
    Executing,
    Recording,
    LearningScheduled,
    Done,
    Error,
}

impl SessionState {
    /// Whether `to` is a legal next state from `self`. `Error` is reachable
    /// from any non-terminal state (the orchestrator's failure semantics:
    /// "any exception ... is caught ... and the error is surfaced").
    #[must_use]
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::{Done, Error, Executing, Init, LearningScheduled, Planning, Recording};
        if matches!(self, Done | Error) {
            return false;
        }
        if to == Error {
            return true;
        }
        matches!(
            (self, to),
            (Init, Planning)
                | (Planning, Executing)
                | (Executing, Recording)
                | (Recording, LearningScheduled)
                | (LearningScheduled, Done)
        )
    }

    /// Attempt the transition, returning [`Error::IllegalTransition`] if
    /// `to` is not reachable from the current state.
    pub fn transition(&mut self, to: SessionState) -> Result<()> {
        if !self.can_transition_to(to) {
            return Err(Error::IllegalTransition(*self, to));
        }
        *self = to;
        Ok(())
    }
}
