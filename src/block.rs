use crate::error::BlockResult;
use crate::util::short_type_name;

/// A point-in-time `(size, capacity)` reading of one channel.
pub type ChannelReading = (usize, usize);

/// A block's last-observed input and output channel occupancy, as reported
/// by [`Block::input_fullness`] and [`Block::Outputs`]'s
/// [`OutputsFullness`] impl. Feeds `BlockStats`'s "last observed
/// input/output fullness" field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelFullness {
    pub inputs: Vec<ChannelReading>,
    pub outputs: Vec<ChannelReading>,
}

/// Self-reporting of channel occupancy for a [`Block::Outputs`] value,
/// implemented for every shape `Outputs` can take: a single
/// [`crate::channel::Producer<T>`], `()` for a sink, `Vec<Producer<T>>` for
/// a dynamic fan-out, and tuples of any of those for a block with several
/// distinctly typed outputs.
pub trait OutputsFullness {
    /// This value's channels, as `(size, capacity)` pairs in field order.
    fn output_fullness(&self) -> Vec<ChannelReading>;
}

impl OutputsFullness for () {
    fn output_fullness(&self) -> Vec<ChannelReading> {
        Vec::new()
    }
}

impl<T: crate::pod::Pod> OutputsFullness for crate::channel::Producer<T> {
    fn output_fullness(&self) -> Vec<ChannelReading> {
        vec![(self.size(), self.capacity())]
    }
}

impl<T: crate::pod::Pod> OutputsFullness for Vec<crate::channel::Producer<T>> {
    fn output_fullness(&self) -> Vec<ChannelReading> {
        self.iter().map(|p| (p.size(), p.capacity())).collect()
    }
}

impl<A: OutputsFullness, B: OutputsFullness> OutputsFullness for (A, B) {
    fn output_fullness(&self) -> Vec<ChannelReading> {
        let mut readings = self.0.output_fullness();
        readings.extend(self.1.output_fullness());
        readings
    }
}

impl<A: OutputsFullness, B: OutputsFullness, C: OutputsFullness> OutputsFullness for (A, B, C) {
    fn output_fullness(&self) -> Vec<ChannelReading> {
        let mut readings = self.0.output_fullness();
        readings.extend(self.1.output_fullness());
        readings.extend(self.2.output_fullness());
        readings
    }
}

impl<A: OutputsFullness, B: OutputsFullness, C: OutputsFullness, D: OutputsFullness> OutputsFullness
    for (A, B, C, D)
{
    fn output_fullness(&self) -> Vec<ChannelReading> {
        let mut readings = self.0.output_fullness();
        readings.extend(self.1.output_fullness());
        readings.extend(self.2.output_fullness());
        readings.extend(self.3.output_fullness());
        readings
    }
}

/// A unit of streaming work: owns its input [`crate::channel::Consumer`]
/// handles as fields, and is driven once per scheduling iteration by a
/// [`crate::runner::BlockRunner`], which supplies the block's output
/// [`crate::channel::Producer`] handles.
///
/// A block is never called concurrently with itself: the runner that owns
/// it invokes `procedure` from a single task, one call at a time. A block
/// does not need to be `Sync` for this reason, but must be `Send` so its
/// runner can move it onto a worker thread.
pub trait Block: Send + 'static {
    /// Owned storage for this block's output channel handles: a single
    /// [`crate::channel::Producer<T>`], a tuple of several, `Vec<Producer<T>>`
    /// for a fan-out block with a dynamic output count, or `()` for a sink
    /// with no outputs. Held by the block's [`crate::runner::BlockRunner`]
    /// and lent mutably into `procedure` on every call, mirroring the
    /// original source's separation between a block's input fields and the
    /// output channels its runner supplies.
    type Outputs: Send + 'static + OutputsFullness;

    /// Identifies this block in logs and diagnostics. Defaults to a short,
    /// de-mangled form of the block's type name.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    /// This block's own input channels, as `(size, capacity)` pairs, for
    /// `BlockStats`'s "last observed input fullness" field. Defaults to
    /// empty; a block with input channel fields overrides it to report
    /// them, since they are plain fields with no generic introspection.
    fn input_fullness(&self) -> Vec<ChannelReading> {
        Vec::new()
    }

    /// Does one unit of work, reading from this block's own input channel
    /// fields and writing to `outputs`.
    ///
    /// Returns `Ok(())` on progress, or an [`crate::error::Error`]
    /// describing why no progress was made this call. Non-fatal errors
    /// (`NotEnoughSamples`, `NotEnoughSpace`, `ProcedureError`) are expected
    /// during normal operation whenever upstream or downstream channels are
    /// temporarily not ready; the owning runner backs off and retries.
    /// Fatal errors stop the runner.
    fn procedure(&mut self, outputs: &mut Self::Outputs) -> BlockResult;
}
