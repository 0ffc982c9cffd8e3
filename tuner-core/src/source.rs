//! # Capture Source Module
//!
//! The seam between the audio subsystem and the analysis pipeline. A
//! [`CaptureSource`] opens a stream that delivers fixed-size mono
//! [`AudioBlock`]s on its own timing thread. The microphone implementation
//! lives in [`crate::audio`], a hardware-free one in [`crate::synthetic`].

use std::fmt;
use std::time::Duration;

use cpal::{FromSample, Sample};

use crate::error::TunerError;

/// A fixed-length chunk of consecutive mono samples.
///
/// Blocks are immutable once built; the capture thread moves them into the
/// analysis handler.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    samples: Vec<f32>,
    sample_rate: u32,
    index: u64,
}

impl AudioBlock {
    /// Wraps `samples` captured at `sample_rate`.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::with_index(samples, sample_rate, 0)
    }

    /// Wraps `samples` as the `index`-th block of a stream.
    pub fn with_index(samples: Vec<f32>, sample_rate: u32, index: u64) -> Self {
        Self {
            samples,
            sample_rate,
            index,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Position of this block in its stream, starting at 0.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Wall-clock length of the block.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Accumulates callback-sized chunks of interleaved samples and emits
/// fixed-size mono blocks.
///
/// Audio drivers deliver whatever buffer size they like; the analysis
/// needs exactly `block_size` samples. Multi-channel frames are averaged
/// down to one channel.
#[derive(Debug)]
pub struct BlockAssembler {
    block_size: usize,
    channels: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    next_index: u64,
}

impl BlockAssembler {
    pub fn new(block_size: usize, channels: u16, sample_rate: u32) -> Self {
        Self {
            block_size,
            channels: usize::from(channels.max(1)),
            sample_rate,
            pending: Vec::with_capacity(block_size * 2),
            next_index: 0,
        }
    }

    /// Appends interleaved `data` and calls `emit` once per completed block.
    ///
    /// A trailing partial frame is ignored; drivers always deliver whole frames.
    pub fn push<T>(&mut self, data: &[T], mut emit: impl FnMut(AudioBlock))
    where
        T: Sample,
        f32: FromSample<T>,
    {
        if self.channels == 1 {
            self.pending
                .extend(data.iter().map(|&sample| sample.to_sample::<f32>()));
        } else {
            let scale = 1.0 / self.channels as f32;
            self.pending.extend(data.chunks_exact(self.channels).map(|frame| {
                frame
                    .iter()
                    .map(|&sample| sample.to_sample::<f32>())
                    .sum::<f32>()
                    * scale
            }));
        }

        while self.pending.len() >= self.block_size {
            let samples: Vec<f32> = self.pending.drain(..self.block_size).collect();
            let block = AudioBlock::with_index(samples, self.sample_rate, self.next_index);
            self.next_index += 1;
            emit(block);
        }
    }

    /// Samples waiting for the next block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// What the caller asks a source to open.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub block_size: usize,
    /// Device name; `None` picks the default.
    pub device: Option<String>,
}

/// What the source actually opened.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub device: String,
    pub sample_rate: u32,
    /// Channels captured before downmixing.
    pub channels: u16,
}

/// Severity of a stream fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The stream cannot continue; capture ends.
    Fatal,
    /// The backend recovered on its own (e.g. an overrun); capture continues.
    Transient,
}

/// A runtime error reported by the audio subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFault {
    pub kind: FaultKind,
    pub message: String,
}

impl StreamFault {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Fatal,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Transient,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == FaultKind::Fatal
    }
}

impl fmt::Display for StreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Per-block handler invoked on the source's timing thread.
pub type BlockCallback = Box<dyn FnMut(AudioBlock) + Send + 'static>;

/// Fault handler invoked on the source's timing thread.
pub type FaultCallback = Box<dyn FnMut(StreamFault) + Send + 'static>;

/// A running stream.
///
/// Dropping the stream closes it. Once `drop` returns, the source must not
/// invoke the block callback again.
pub trait CaptureStream {
    /// Stops delivery without releasing the device.
    fn pause(&self) -> Result<(), TunerError>;
}

/// An opened stream together with the format it runs at.
pub struct OpenedStream {
    pub stream: Box<dyn CaptureStream>,
    pub info: StreamInfo,
}

impl fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedStream")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Something that can deliver mono blocks at a fixed rate.
///
/// `open` is called on the capture thread, so the returned stream does not
/// need to be `Send` (cpal streams are not on every platform).
pub trait CaptureSource: Send + Sync {
    /// Opens and starts a stream.
    fn open(
        &self,
        format: &StreamFormat,
        on_block: BlockCallback,
        on_fault: FaultCallback,
    ) -> Result<OpenedStream, TunerError>;
}
