//! A tiny source -> gain -> sink chain, run under [`HostedPolicy`] for a
//! fixed window and then stopped cooperatively.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use conduit::prelude::*;

struct CountingSource {
    next: f32,
}

impl Block for CountingSource {
    type Outputs = Producer<f32>;

    fn procedure(&mut self, out: &mut Producer<f32>) -> BlockResult {
        if out.push(self.next) {
            self.next += 1.0;
            Ok(())
        } else {
            Err(Error::NotEnoughSpace)
        }
    }
}

struct Gain {
    gain: f32,
    input: Consumer<f32>,
}

impl Block for Gain {
    type Outputs = Producer<f32>;

    fn procedure(&mut self, out: &mut Producer<f32>) -> BlockResult {
        match self.input.try_pop() {
            Some(sample) => {
                if out.push(sample * self.gain) {
                    Ok(())
                } else {
                    Err(Error::NotEnoughSpace)
                }
            }
            None => Err(Error::NotEnoughSamples),
        }
    }
}

struct PrintingSink {
    input: Consumer<f32>,
    collected: Arc<Mutex<Vec<f32>>>,
}

impl Block for PrintingSink {
    type Outputs = ();

    fn procedure(&mut self, _outputs: &mut ()) -> BlockResult {
        match self.input.try_pop() {
            Some(sample) => {
                self.collected.lock().unwrap().push(sample);
                Ok(())
            }
            None => Err(Error::NotEnoughSamples),
        }
    }
}

fn main() {
    env_logger::init();

    let (src_tx, src_rx) = channel_inline::<f32>(64);
    let (gain_tx, gain_rx) = channel_inline::<f32>(64);
    let collected = Arc::new(Mutex::new(Vec::new()));

    let source = BlockRunner::new(CountingSource { next: 0.0 }, src_tx);
    let gain = BlockRunner::new(
        Gain {
            gain: 2.0,
            input: src_rx,
        },
        gain_tx,
    );
    let sink = BlockRunner::new(
        PrintingSink {
            input: gain_rx,
            collected: collected.clone(),
        },
        (),
    );

    let mut graph =
        FlowGraph::<HostedPolicy>::new(vec![Box::new(source), Box::new(gain), Box::new(sink)])
            .expect("non-empty runner set");
    graph.run().expect("spawning the hosted runners");

    std::thread::sleep(Duration::from_millis(50));
    if let Some(err) = graph.stop() {
        eprintln!("a runner failed fatally: {err}");
    }

    let samples = collected.lock().unwrap();
    println!("collected {} samples, last = {:?}", samples.len(), samples.last());
}
