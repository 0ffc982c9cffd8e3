//! # Engine Module
//!
//! [`TunerEngine`] owns the capture thread. `start` spawns it and waits until
//! the stream is open; `stop` tears it down and does not return before the
//! thread has exited and the result channel has been drained.
//!
//! ## Threads
//! - **Caller**: start/stop/poll, typically the presentation loop
//! - **Capture thread**: opens the stream, then parks on a shutdown/fault select
//! - **Audio callback**: driver-owned; runs pitch + spectrum and pushes results

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::AnalysisResult;
use crate::analysis::Analyzer;
use crate::audio::MicrophoneSource;
use crate::channel::{ResultReceiver, ResultSender, result_channel};
use crate::config::TunerConfig;
use crate::error::TunerError;
use crate::source::{
    AudioBlock, BlockCallback, CaptureSource, FaultCallback, StreamFault, StreamFormat, StreamInfo,
};

/// Whether a capture thread is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
}

/// Lifecycle notifications for the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The stream opened and blocks are flowing.
    Started {
        device: String,
        sample_rate: u32,
        channels: u16,
    },
    /// The stream failed or vanished mid-capture; the engine has stopped itself.
    Fault { message: String },
    /// The capture thread exited.
    Stopped { blocks_analyzed: u64 },
}

/// Counters accumulated over the engine's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Blocks that went through pitch and spectrum analysis.
    pub blocks_analyzed: u64,
    /// Results discarded by the channel's backlog policy.
    pub results_dropped: u64,
    /// Callbacks that took longer than one block's duration.
    pub overruns: u64,
}

/// State shared between the engine handle and the capture side.
#[derive(Debug, Default)]
struct EngineShared {
    running: AtomicBool,
    blocks_analyzed: AtomicU64,
    overruns: AtomicU64,
}

/// Capture thread management structure.
///
/// Handles the dedicated capture thread and provides a way to shut it
/// down gracefully.
#[derive(Debug)]
struct CaptureWorker {
    shutdown_tx: Sender<()>,              // Channel to send shutdown signal
    thread_handle: JoinHandle<()>,        // Handle to the capture thread
}

/// Real-time tuner: capture, analysis and result hand-off.
pub struct TunerEngine {
    config: TunerConfig,
    source: Arc<dyn CaptureSource>,
    shared: Arc<EngineShared>,
    sender: ResultSender,
    receiver: ResultReceiver,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    worker: Option<CaptureWorker>,
}

impl TunerEngine {
    /// Creates an engine that captures from the microphone.
    pub fn new(config: TunerConfig) -> Result<Self, TunerError> {
        Self::with_source(config, MicrophoneSource::new())
    }

    /// Creates an engine on top of any capture source.
    pub fn with_source(
        config: TunerConfig,
        source: impl CaptureSource + 'static,
    ) -> Result<Self, TunerError> {
        config.validate()?;
        let (sender, receiver) = result_channel(config.backlog);
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Ok(Self {
            config,
            source: Arc::new(source),
            shared: Arc::new(EngineShared::default()),
            sender,
            receiver,
            events_tx,
            events_rx,
            worker: None,
        })
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        if self.is_running() {
            EngineState::Running
        } else {
            EngineState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Starts capturing. Does nothing if already running.
    ///
    /// Blocks until the source reports whether the stream opened; an open
    /// failure is returned here and the engine stays stopped.
    pub fn start(&mut self) -> Result<(), TunerError> {
        if self.is_running() {
            log::debug!("start ignored: capture already running");
            return Ok(());
        }
        // A thread that ended on a fault is still waiting to be joined
        self.join_worker();
        self.receiver.clear();

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let context = CaptureContext {
            source: Arc::clone(&self.source),
            format: StreamFormat {
                sample_rate: self.config.sample_rate,
                block_size: self.config.block_size,
                device: self.config.device.clone(),
            },
            analyzer: Analyzer::new(&self.config),
            budget: self.config.block_duration(),
            shared: Arc::clone(&self.shared),
            sender: self.sender.clone(),
            events: self.events_tx.clone(),
        };

        self.shared.running.store(true, Ordering::Release);
        let spawned = thread::Builder::new()
            .name("tuner-capture".into())
            .spawn(move || context.run(shutdown_rx, ready_tx));
        let thread_handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                return Err(TunerError::Spawn(e));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(info)) => {
                log::info!(
                    "Capture started on {} at {} Hz ({} channel(s))",
                    info.device,
                    info.sample_rate,
                    info.channels
                );
                self.worker = Some(CaptureWorker {
                    shutdown_tx,
                    thread_handle,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                join_capture_thread(thread_handle);
                self.shared.running.store(false, Ordering::Release);
                Err(e)
            }
            Err(_) => {
                join_capture_thread(thread_handle);
                self.shared.running.store(false, Ordering::Release);
                Err(TunerError::CaptureThreadExited)
            }
        }
    }

    /// Stops capturing. Does nothing if already stopped.
    ///
    /// Returns only after the stream is closed and the capture thread has
    /// exited. Results still queued are discarded, so nothing can be
    /// polled from this session afterwards.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if self.worker.is_none() {
            return;
        }
        log::info!("Stopping capture...");
        self.join_worker();

        let discarded = self.receiver.clear();
        if discarded > 0 {
            log::debug!("discarded {discarded} unread result(s) on stop");
        }
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            // The thread may already be gone after a fault
            let _ = worker.shutdown_tx.send(());
            join_capture_thread(worker.thread_handle);
        }
    }

    /// Takes the oldest unread result. Never blocks.
    pub fn poll(&self) -> Option<AnalysisResult> {
        self.receiver.try_pop()
    }

    /// A handle for consuming results from another thread.
    pub fn receiver(&self) -> ResultReceiver {
        self.receiver.clone()
    }

    /// Takes the oldest unread lifecycle event. Never blocks.
    pub fn poll_event(&self) -> Option<EngineEvent> {
        self.events_rx.try_recv().ok()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            blocks_analyzed: self.shared.blocks_analyzed.load(Ordering::Relaxed),
            results_dropped: self.receiver.dropped(),
            overruns: self.shared.overruns.load(Ordering::Relaxed),
        }
    }
}

impl Drop for TunerEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_capture_thread(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("capture thread panicked");
    }
}

/// Everything the capture thread owns.
struct CaptureContext {
    source: Arc<dyn CaptureSource>,
    format: StreamFormat,
    analyzer: Analyzer,
    budget: Duration,
    shared: Arc<EngineShared>,
    sender: ResultSender,
    events: Sender<EngineEvent>,
}

impl CaptureContext {
    fn run(
        self,
        shutdown_rx: Receiver<()>,
        ready_tx: Sender<Result<StreamInfo, TunerError>>,
    ) {
        let CaptureContext {
            source,
            format,
            analyzer,
            budget,
            shared,
            sender,
            events,
        } = self;

        let (fault_tx, fault_rx) = crossbeam_channel::unbounded::<StreamFault>();
        let on_block = block_handler(analyzer, budget, Arc::clone(&shared), sender);
        let on_fault: FaultCallback = Box::new(move |fault| {
            let _ = fault_tx.send(fault);
        });

        log::debug!("opening capture stream: {format:?}");
        let opened = match source.open(&format, on_block, on_fault) {
            Ok(opened) => opened,
            Err(e) => {
                log::error!("Failed to open capture stream: {e}");
                shared.running.store(false, Ordering::Release);
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        let info = opened.info.clone();
        let _ = events.send(EngineEvent::Started {
            device: info.device.clone(),
            sample_rate: info.sample_rate,
            channels: info.channels,
        });
        let _ = ready_tx.send(Ok(info));

        loop {
            crossbeam_channel::select! {
                recv(shutdown_rx) -> _ => {
                    log::debug!("capture thread received shutdown signal");
                    break;
                }
                recv(fault_rx) -> msg => match msg {
                    Ok(fault) if fault.is_fatal() => {
                        log::error!("Audio stream failed: {fault}");
                        let _ = events.send(EngineEvent::Fault { message: fault.message });
                        break;
                    }
                    Ok(fault) => log::warn!("Audio stream reported: {fault}"),
                    Err(_) => {
                        let message = "audio stream ended unexpectedly".to_string();
                        log::error!("{message}");
                        let _ = events.send(EngineEvent::Fault { message });
                        break;
                    }
                },
            }
        }

        shared.running.store(false, Ordering::Release);
        if let Err(e) = opened.stream.pause() {
            log::warn!("Error pausing stream: {e}");
        }
        drop(opened);

        let blocks_analyzed = shared.blocks_analyzed.load(Ordering::Relaxed);
        let _ = events.send(EngineEvent::Stopped { blocks_analyzed });
        log::info!("Capture thread finished after {blocks_analyzed} block(s)");
    }
}

/// Builds the per-block callback: analyse, push, count.
///
/// Blocks arriving after the running flag dropped are skipped whole, so a
/// partially built result is never pushed.
fn block_handler(
    mut analyzer: Analyzer,
    budget: Duration,
    shared: Arc<EngineShared>,
    sender: ResultSender,
) -> BlockCallback {
    Box::new(move |block: AudioBlock| {
        if !shared.running.load(Ordering::Acquire) {
            return;
        }
        let started = Instant::now();
        let result = analyzer.process(&block);
        sender.push(result);
        shared.blocks_analyzed.fetch_add(1, Ordering::Relaxed);

        let elapsed = started.elapsed();
        if elapsed > budget {
            shared.overruns.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "block {} took {:?}, over the {:?} budget",
                block.index(),
                elapsed,
                budget
            );
        }
    })
}
