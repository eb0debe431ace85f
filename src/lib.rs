//! conduit: a portable streaming-DSP runtime.
//!
//! conduit provides the scheduling and data-movement primitives a
//! real-time streaming pipeline needs, independent of the signal
//! processing those blocks perform: lock-free single-producer/
//! single-consumer channels (with an optional doubly-mapped backend for
//! zero-copy, always-contiguous windows), a minimal [`block::Block`]
//! contract, and a [`flowgraph::FlowGraph`] scheduler generic over how its
//! runners map onto units of concurrency.
//!
//! Concrete signal-processing blocks are not part of this crate; conduit
//! only supplies the contract ([`block::Block`]) and the channels and
//! scheduler that connect them.

#![cfg_attr(doc, warn(missing_docs))]

pub mod block;
pub mod channel;
pub mod error;
pub mod flowgraph;
pub mod pod;
pub mod runner;
pub mod util;
pub mod vmem;

/// Re-exports of the types most callers need to wire up a flowgraph.
pub mod prelude {
    pub use crate::block::Block;
    pub use crate::channel::{channel_dbf, channel_inline, Consumer, Producer};
    pub use crate::error::{BlockResult, Error};
    pub use crate::flowgraph::{
        BlockStatsSnapshot, CooperativeTaskPolicy, FlowGraph, HostedPolicy, NonePolicy,
        TaskPolicy,
    };
    pub use crate::runner::{BlockRunner, RunnerHandle};
}
