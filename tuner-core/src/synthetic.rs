//! Synthetic capture source for running the pipeline without audio hardware.
//!
//! [`SignalSource`] generates a waveform on its own timing thread and
//! delivers it in driver-sized chunks, just like a real input stream. It
//! backs the integration tests and the `--simulate` mode of the CLI.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::TunerError;
use crate::source::{
    BlockAssembler, BlockCallback, CaptureSource, CaptureStream, FaultCallback, OpenedStream,
    StreamFault, StreamFormat, StreamInfo,
};

/// The signal a [`SignalSource`] produces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    Sine { frequency: f32, amplitude: f32 },
    Silence,
    /// Deterministic white noise.
    Noise { amplitude: f32 },
}

/// A capture source that synthesizes its input.
#[derive(Debug, Clone)]
pub struct SignalSource {
    waveform: Waveform,
    chunk_frames: usize,
    realtime: bool,
    fail_after_chunks: Option<u64>,
    transient_after_chunks: Option<u64>,
    fail_on_open: bool,
}

impl SignalSource {
    pub fn new(waveform: Waveform) -> Self {
        Self {
            waveform,
            chunk_frames: 512,
            realtime: true,
            fail_after_chunks: None,
            transient_after_chunks: None,
            fail_on_open: false,
        }
    }

    pub fn sine(frequency: f32) -> Self {
        Self::new(Waveform::Sine {
            frequency,
            amplitude: 0.5,
        })
    }

    /// Frames per simulated driver callback.
    pub fn chunk_frames(mut self, frames: usize) -> Self {
        self.chunk_frames = frames.max(1);
        self
    }

    /// When false, chunks are generated as fast as the callback consumes them.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Reports a fatal fault after delivering `chunks` chunks.
    pub fn fail_after(mut self, chunks: u64) -> Self {
        self.fail_after_chunks = Some(chunks);
        self
    }

    /// Reports one non-fatal fault after `chunks` chunks and keeps delivering.
    pub fn fail_transient_after(mut self, chunks: u64) -> Self {
        self.transient_after_chunks = Some(chunks);
        self
    }

    /// Makes `open` fail as if no device were present.
    pub fn fail_on_open(mut self) -> Self {
        self.fail_on_open = true;
        self
    }
}

impl CaptureSource for SignalSource {
    fn open(
        &self,
        format: &StreamFormat,
        mut on_block: BlockCallback,
        mut on_fault: FaultCallback,
    ) -> Result<OpenedStream, TunerError> {
        if self.fail_on_open {
            return Err(TunerError::NoInputDevice);
        }

        let active = Arc::new(AtomicBool::new(true));
        let paused = Arc::new(AtomicBool::new(false));
        let source = self.clone();
        let sample_rate = format.sample_rate;
        let block_size = format.block_size;

        let thread_active = Arc::clone(&active);
        let thread_paused = Arc::clone(&paused);
        let handle = thread::Builder::new()
            .name("tuner-signal".into())
            .spawn(move || {
                let mut oscillator = Oscillator::new(source.waveform, sample_rate);
                let mut assembler = BlockAssembler::new(block_size, 1, sample_rate);
                let mut chunk = vec![0.0f32; source.chunk_frames];
                let chunk_duration =
                    Duration::from_secs_f64(source.chunk_frames as f64 / sample_rate as f64);
                let started = Instant::now();
                let mut delivered: u64 = 0;

                while thread_active.load(Ordering::Acquire) {
                    if thread_paused.load(Ordering::Acquire) {
                        thread::sleep(chunk_duration);
                        continue;
                    }
                    if source.fail_after_chunks == Some(delivered) {
                        on_fault(StreamFault::fatal("simulated device loss"));
                        // A dead device delivers nothing more
                        break;
                    }
                    if source.transient_after_chunks == Some(delivered) {
                        on_fault(StreamFault::transient("simulated input overflow"));
                    }

                    oscillator.fill(&mut chunk);
                    assembler.push(&chunk[..], |block| on_block(block));
                    delivered += 1;

                    if source.realtime {
                        let due = started + chunk_duration.mul_f64(delivered as f64);
                        if let Some(wait) = due.checked_duration_since(Instant::now()) {
                            thread::sleep(wait);
                        }
                    } else {
                        thread::yield_now();
                    }
                }
            })?;

        Ok(OpenedStream {
            stream: Box::new(SignalStream {
                active,
                paused,
                handle: Some(handle),
            }),
            info: StreamInfo {
                device: "synthetic".to_string(),
                sample_rate,
                channels: 1,
            },
        })
    }
}

struct SignalStream {
    active: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureStream for SignalStream {
    fn pause(&self) -> Result<(), TunerError> {
        self.paused.store(true, Ordering::Release);
        Ok(())
    }
}

impl Drop for SignalStream {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            // Joining guarantees no callback runs after the stream is gone
            if handle.join().is_err() {
                log::error!("synthetic signal thread panicked");
            }
        }
    }
}

struct Oscillator {
    waveform: Waveform,
    phase: f64,
    step: f64,
    seed: u32,
}

impl Oscillator {
    fn new(waveform: Waveform, sample_rate: u32) -> Self {
        let step = match waveform {
            Waveform::Sine { frequency, .. } => frequency as f64 / sample_rate as f64,
            _ => 0.0,
        };
        Self {
            waveform,
            phase: 0.0,
            step,
            seed: 12345,
        }
    }

    fn fill(&mut self, out: &mut [f32]) {
        match self.waveform {
            Waveform::Silence => out.fill(0.0),
            Waveform::Sine { amplitude, .. } => {
                for sample in out.iter_mut() {
                    *sample = amplitude * (std::f64::consts::TAU * self.phase).sin() as f32;
                    self.phase = (self.phase + self.step).fract();
                }
            }
            Waveform::Noise { amplitude } => {
                // Simple LCG for deterministic "random" noise
                for sample in out.iter_mut() {
                    self.seed = self.seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                    let unit = (self.seed >> 16) as f32 / 32768.0 - 1.0;
                    *sample = amplitude * unit;
                }
            }
        }
    }
}
