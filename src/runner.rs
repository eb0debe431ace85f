use crate::block::{Block, ChannelFullness, OutputsFullness};
use crate::error::BlockResult;

/// Pairs a [`Block`] with the output channel handles its `procedure` call
/// writes into.
///
/// Grounded directly on the original source's `BlockRunner<Block,
/// Channels...>`, which bundles a block pointer with a tuple of output
/// channel pointers; `Outputs` here plays the role of that tuple.
pub struct BlockRunner<B: Block> {
    block: B,
    outputs: B::Outputs,
}

impl<B: Block> BlockRunner<B> {
    /// Creates a runner for `block`, to drive its output channels through
    /// `outputs` on every call.
    pub fn new(block: B, outputs: B::Outputs) -> Self {
        BlockRunner { block, outputs }
    }

    /// Runs one `procedure` call.
    pub fn poll_once(&mut self) -> BlockResult {
        self.block.procedure(&mut self.outputs)
    }

    /// The underlying block's name.
    pub fn name(&self) -> &str {
        self.block.name()
    }

    /// This runner's last-observed input and output channel occupancy.
    pub fn fullness(&self) -> ChannelFullness {
        ChannelFullness {
            inputs: self.block.input_fullness(),
            outputs: self.outputs.output_fullness(),
        }
    }
}

/// Object-safe erasure of a [`BlockRunner`], letting
/// [`crate::flowgraph::FlowGraph`] hold a heterogeneous collection of
/// runners behind a single `Vec<Box<dyn RunnerHandle>>`.
///
/// The per-call dispatch this erases is one call per scheduling iteration,
/// not per sample, so the cost of virtual dispatch here is immaterial; the
/// hot, per-sample path inside `procedure` itself stays statically typed.
pub trait RunnerHandle: Send {
    /// Runs one `procedure` call on the wrapped block.
    fn poll_once(&mut self) -> BlockResult;

    /// The wrapped block's name.
    fn name(&self) -> &str;

    /// The wrapped runner's last-observed input and output channel
    /// occupancy.
    fn fullness(&self) -> ChannelFullness;
}

impl<B: Block> RunnerHandle for BlockRunner<B> {
    fn poll_once(&mut self) -> BlockResult {
        BlockRunner::poll_once(self)
    }

    fn name(&self) -> &str {
        BlockRunner::name(self)
    }

    fn fullness(&self) -> ChannelFullness {
        BlockRunner::fullness(self)
    }
}
