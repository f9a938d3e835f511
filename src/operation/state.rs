/// Lifecycle state of an [`Operation`](super::Operation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationState {
    Created,
    Queued,
    /// Next in line; the native call is about to fire.
    Armed,
    /// Native call issued, awaiting its callback.
    Executing,
    Succeeded,
    Failed,
    TimedOut,
    SoftlyCancelled,
}

impl OperationState {
    /// True for the ending states; an operation leaves the scheduler on reaching one.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationState::Succeeded
                | OperationState::Failed
                | OperationState::TimedOut
                | OperationState::SoftlyCancelled
        )
    }

    pub fn as_label(self) -> &'static str {
        match self {
            OperationState::Created => "created",
            OperationState::Queued => "queued",
            OperationState::Armed => "armed",
            OperationState::Executing => "executing",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
            OperationState::TimedOut => "timed_out",
            OperationState::SoftlyCancelled => "softly_cancelled",
        }
    }
}
