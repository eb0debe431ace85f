use thiserror::Error;

/// The closed set of failure modes a [`crate::block::Block`] or the runtime
/// itself can report.
///
/// Variants split into two classes, queried with [`Error::is_fatal`]:
/// non-fatal conditions a runner simply backs off and retries on, and fatal
/// conditions that stop the owning [`crate::flowgraph::FlowGraph`] runner.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An input channel did not have enough samples available for this call.
    #[error("not enough samples available")]
    NotEnoughSamples,
    /// An output channel did not have enough free space for this call.
    #[error("not enough space available")]
    NotEnoughSpace,
    /// A block's own processing logic failed for a reason unrelated to
    /// channel occupancy (non-fatal: the runner keeps retrying).
    #[error("block procedure reported a non-fatal error")]
    ProcedureError,
    /// An I/O failure that the block considers unrecoverable.
    #[error("unrecoverable I/O error")]
    TermIoError,
    /// A block's own processing logic failed in a way it considers
    /// unrecoverable.
    #[error("unrecoverable procedure error")]
    TermProcedureError,
    /// A channel's peer endpoint has been dropped.
    #[error("channel closed")]
    TermChannelClosed,
    /// The flowgraph's composition of runners and channels is not coherent
    /// (e.g. an output channel with no reachable consumer).
    #[error("invalid flowgraph topology")]
    InvalidTopology,
    /// The task policy failed to create a task/thread for a runner.
    #[error("task creation failed")]
    TaskCreationFailed,
    /// A backing allocation (inline buffer or doubly-mapped region) failed.
    #[error("allocation failed")]
    AllocationFailed,
    /// The doubly-mapped virtual-memory backend is not available on this
    /// platform.
    #[error("doubly mapped buffers are not supported on this platform")]
    UnsupportedPlatform,
}

impl Error {
    /// Whether this error should terminate the owning runner, as opposed to
    /// a transient condition that a caller backs off and retries on.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Error::TermIoError
                | Error::TermProcedureError
                | Error::TermChannelClosed
                | Error::InvalidTopology
                | Error::TaskCreationFailed
                | Error::AllocationFailed
                | Error::UnsupportedPlatform
        )
    }
}

/// The success type returned by [`crate::block::Block::procedure`]: conduit's
/// rendition of the original source's `Empty` success marker.
pub type BlockResult = Result<(), Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification_matches_taxonomy() {
        assert!(!Error::NotEnoughSamples.is_fatal());
        assert!(!Error::NotEnoughSpace.is_fatal());
        assert!(!Error::ProcedureError.is_fatal());
        assert!(Error::TermIoError.is_fatal());
        assert!(Error::TermProcedureError.is_fatal());
        assert!(Error::TermChannelClosed.is_fatal());
        assert!(Error::InvalidTopology.is_fatal());
        assert!(Error::TaskCreationFailed.is_fatal());
        assert!(Error::AllocationFailed.is_fatal());
        assert!(Error::UnsupportedPlatform.is_fatal());
    }

    #[test]
    fn display_messages_are_non_empty() {
        for err in [
            Error::NotEnoughSamples,
            Error::NotEnoughSpace,
            Error::ProcedureError,
            Error::TermIoError,
            Error::TermProcedureError,
            Error::TermChannelClosed,
            Error::InvalidTopology,
            Error::TaskCreationFailed,
            Error::AllocationFailed,
            Error::UnsupportedPlatform,
        ] {
            assert!(!err.to_string().is_empty());
        }
    }
}
