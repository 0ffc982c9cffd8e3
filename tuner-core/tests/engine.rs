use std::thread;
use std::time::{Duration, Instant};

use tuner_core::synthetic::{SignalSource, Waveform};
use tuner_core::{
    AnalysisResult, BacklogPolicy, EngineEvent, EngineState, TunerConfig, TunerEngine, TunerError,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn config() -> TunerConfig {
    TunerConfig {
        sample_rate: 16_000,
        block_size: 512,
        backlog: BacklogPolicy::Unbounded,
        ..TunerConfig::default()
    }
}

fn engine(source: SignalSource) -> TunerEngine {
    TunerEngine::with_source(config(), source).expect("engine")
}

/// Polls until `count` results arrived or the timeout passed.
fn collect(engine: &TunerEngine, count: usize) -> Vec<AnalysisResult> {
    let deadline = Instant::now() + TIMEOUT;
    let mut results = Vec::new();
    while results.len() < count && Instant::now() < deadline {
        match engine.poll() {
            Some(result) => results.push(result),
            None => thread::sleep(Duration::from_millis(5)),
        }
    }
    results
}

fn events(engine: &TunerEngine) -> Vec<EngineEvent> {
    std::iter::from_fn(|| engine.poll_event()).collect()
}

#[test]
fn sine_round_trip() {
    let mut engine = engine(SignalSource::sine(440.0));
    engine.start().expect("start");
    let results = collect(&engine, 6);
    engine.stop();

    assert_eq!(results.len(), 6);
    let last = results.last().expect("result");
    let error = (last.pitch.frequency_hz - 440.0).abs() / 440.0;
    assert!(error < 0.01, "estimated {:?}", last.pitch);
    assert!(last.pitch.confidence >= 0.75);
    assert_eq!(last.spectrum.len(), 257);

    let expected_bin = (440.0_f32 / last.spectrum.bin_width_hz()).round() as usize;
    let peak = last.spectrum.peak_bin().expect("peak");
    assert!(peak.abs_diff(expected_bin) <= 1, "peak {peak}, expected {expected_bin}");
}

#[test]
fn results_arrive_in_block_order() {
    let mut engine = engine(SignalSource::sine(330.0).realtime(false));
    engine.start().expect("start");
    let results = collect(&engine, 40);
    engine.stop();

    assert_eq!(results.len(), 40);
    for (expected, result) in results.iter().enumerate() {
        assert_eq!(result.block_index, expected as u64);
    }
}

#[test]
fn double_start_keeps_one_capture() {
    let mut engine = engine(SignalSource::sine(440.0));
    engine.start().expect("first start");
    engine.start().expect("second start");
    assert_eq!(engine.state(), EngineState::Running);

    let results = collect(&engine, 8);
    engine.stop();

    let started = events(&engine)
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::Started { .. }))
        .count();
    assert_eq!(started, 1);
    // A second capture would deliver every block index twice
    for pair in results.windows(2) {
        assert_eq!(pair[1].block_index, pair[0].block_index + 1);
    }
}

#[test]
fn stop_before_start_is_a_no_op() {
    let mut engine = engine(SignalSource::sine(440.0));
    engine.stop();
    engine.stop();
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(engine.poll().is_none());
    assert!(engine.poll_event().is_none());
}

#[test]
fn nothing_is_delivered_after_stop() {
    let mut engine = engine(SignalSource::sine(440.0).realtime(false));
    engine.start().expect("start");
    assert!(!collect(&engine, 3).is_empty());

    engine.stop();
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(engine.poll().is_none());

    let analysed = engine.stats().blocks_analyzed;
    thread::sleep(Duration::from_millis(100));
    assert!(engine.poll().is_none());
    assert_eq!(engine.stats().blocks_analyzed, analysed);
}

#[test]
fn restart_begins_a_fresh_session() {
    let mut engine = engine(SignalSource::sine(440.0));
    engine.start().expect("start");
    assert_eq!(collect(&engine, 3).len(), 3);
    engine.stop();

    engine.start().expect("restart");
    let results = collect(&engine, 1);
    engine.stop();
    assert_eq!(results[0].block_index, 0);
}

#[test]
fn silence_has_zero_confidence() {
    let mut engine = engine(SignalSource::new(Waveform::Silence));
    engine.start().expect("start");
    let results = collect(&engine, 3);
    engine.stop();

    assert_eq!(results.len(), 3);
    for result in results {
        assert_eq!(result.pitch.confidence, 0.0);
        assert_eq!(result.pitch.frequency_hz, 0.0);
        assert!(!result.pitch.is_note(0.75));
    }
}

#[test]
fn open_failure_is_returned_from_start() {
    let mut engine = engine(SignalSource::sine(440.0).fail_on_open());
    assert!(matches!(engine.start(), Err(TunerError::NoInputDevice)));
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(engine.poll().is_none());
}

#[test]
fn fatal_fault_stops_the_engine() {
    let mut engine = engine(SignalSource::sine(440.0).realtime(false).fail_after(10));
    engine.start().expect("start");

    let deadline = Instant::now() + TIMEOUT;
    while engine.is_running() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(engine.state(), EngineState::Stopped);

    // Give the capture thread time to publish its final events
    thread::sleep(Duration::from_millis(50));
    let events = events(&engine);
    assert!(
        events.iter().any(|e| matches!(e, EngineEvent::Fault { .. })),
        "{events:?}"
    );

    // The caller may start again after a fault
    engine.start().expect("restart after fault");
    engine.stop();
}

#[test]
fn transient_fault_keeps_capturing() {
    let mut engine = engine(SignalSource::sine(440.0).realtime(false).fail_transient_after(3));
    engine.start().expect("start");
    assert_eq!(collect(&engine, 10).len(), 10);

    // Past the fault: the capture thread has had time to handle it
    thread::sleep(Duration::from_millis(50));
    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(collect(&engine, 10).len(), 10);
    engine.stop();

    let events = events(&engine);
    assert!(
        !events.iter().any(|e| matches!(e, EngineEvent::Fault { .. })),
        "{events:?}"
    );
}

#[test]
fn slow_consumer_drops_results() {
    let config = TunerConfig {
        backlog: BacklogPolicy::DropNewest(2),
        ..config()
    };
    let mut engine =
        TunerEngine::with_source(config, SignalSource::sine(440.0).realtime(false)).expect("engine");
    engine.start().expect("start");

    let deadline = Instant::now() + TIMEOUT;
    while engine.stats().results_dropped == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(engine.receiver().len() <= 2);
    engine.stop();
    assert!(engine.stats().results_dropped > 0);
}

#[test]
fn dropping_a_running_engine_stops_capture() {
    let mut engine = engine(SignalSource::sine(440.0));
    engine.start().expect("start");
    let receiver = engine.receiver();
    drop(engine);

    thread::sleep(Duration::from_millis(50));
    assert!(receiver.is_empty());
}
