//! # Control Loop Module
//!
//! Runs the per-cycle pipeline:
//!
//! ```text
//! read telemetry -> fuse -> preprocess frame -> predict -> encode -> dispatch
//! ```
//!
//! Stages run strictly in sequence; there is never more than one cycle in
//! flight. A telemetry, frame, inference or actuator fault is logged with
//! its stage and the loop moves on to the next cycle. Only a failing
//! telemetry source (not a malformed line) stops the loop.
//!
//! ## Usage
//!
//! ```no_run
//! use otto_drive::actuator::ActuatorChannel;
//! use otto_drive::control::ControlLoop;
//! use otto_drive::predictor::ConstantPredictor;
//! use otto_drive::telemetry::{LineSource, TelemetryReader, DEFAULT_GRAVITY};
//! use otto_drive::vision::BlankFrameSource;
//! use tokio::io::BufReader;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let file = tokio::fs::File::open("data/test_data.csv").await?;
//!     let telemetry = TelemetryReader::new(
//!         Box::new(LineSource::new(BufReader::new(file))),
//!         DEFAULT_GRAVITY,
//!     );
//!     let mut control = ControlLoop::new(
//!         telemetry,
//!         Box::new(BlankFrameSource::new(160, 120)),
//!         Box::new(ConstantPredictor::default()),
//!         ActuatorChannel::DryRun,
//!     );
//!     let stats = control.run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await?;
//!     println!("{} cycles", stats.cycles);
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod state;

use chrono::Utc;
use std::future::Future;
use tokio::time::{interval, Duration, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::actuator::ActuatorChannel;
use crate::command::{encode, SteeringCommand};
use crate::error::{CycleFault, CycleStage, DriveError, Result};
use crate::fusion::{FeatureVector, StateFusion, TimeStep};
use crate::predictor::Predictor;
use crate::telemetry::{CycleRecord, CycleRecorder, TelemetryReader, TelemetrySample};
use crate::vision::{FramePreprocessor, FrameSource};

pub use clock::ElapsedClock;
pub use state::{LoopState, LoopStats};

/// Default number of cycles between status log messages
pub const DEFAULT_STATUS_INTERVAL_CYCLES: u64 = 100;

/// Everything one completed cycle produced
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub sample: TelemetrySample,
    pub features: FeatureVector,
    pub prediction: f32,
    pub command: SteeringCommand,
    /// False in dry-run mode
    pub dispatched: bool,
}

/// Result of a cycle that did not fault
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Telemetry source exhausted; no stage ran
    EndOfStream,
}

/// The fusion-and-dispatch loop and all resources it owns.
///
/// Dropping the loop releases the telemetry source, frame source and
/// actuator channel.
pub struct ControlLoop {
    telemetry: TelemetryReader,
    frames: Box<dyn FrameSource>,
    predictor: Box<dyn Predictor>,
    actuator: ActuatorChannel,
    fusion: StateFusion,
    preprocessor: FramePreprocessor,
    time_step: TimeStep,
    clock: ElapsedClock,
    last_sample_at: Option<Instant>,
    recorder: Option<CycleRecorder>,
    cycle_period: Option<Duration>,
    ticker: Option<Interval>,
    status_interval: u64,
    state: LoopState,
    stats: LoopStats,
}

impl ControlLoop {
    /// Build a loop with fresh fusion state, default crop, and wall-clock
    /// integration. The elapsed clock starts here.
    pub fn new(
        telemetry: TelemetryReader,
        frames: Box<dyn FrameSource>,
        predictor: Box<dyn Predictor>,
        actuator: ActuatorChannel,
    ) -> Self {
        Self {
            telemetry,
            frames,
            predictor,
            actuator,
            fusion: StateFusion::new(),
            preprocessor: FramePreprocessor::default(),
            time_step: TimeStep::WallClock,
            clock: ElapsedClock::start(),
            last_sample_at: None,
            recorder: None,
            cycle_period: None,
            ticker: None,
            status_interval: DEFAULT_STATUS_INTERVAL_CYCLES,
            state: LoopState::Idle,
            stats: LoopStats::default(),
        }
    }

    /// Start from the given fusion state instead of rest.
    #[must_use]
    pub fn with_fusion(mut self, fusion: StateFusion) -> Self {
        self.fusion = fusion;
        self
    }

    #[must_use]
    pub fn with_preprocessor(mut self, preprocessor: FramePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    #[must_use]
    pub fn with_time_step(mut self, time_step: TimeStep) -> Self {
        self.time_step = time_step;
        self
    }

    #[must_use]
    pub fn with_recorder(mut self, recorder: CycleRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Pace cycles at a fixed period. Unthrottled when `None`.
    #[must_use]
    pub fn with_cycle_period(mut self, period: Option<Duration>) -> Self {
        self.cycle_period = period.filter(|p| !p.is_zero());
        self
    }

    #[must_use]
    pub fn with_status_interval(mut self, cycles: u64) -> Self {
        self.status_interval = cycles.max(1);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn fusion(&self) -> &StateFusion {
        &self.fusion
    }

    pub fn clock(&self) -> &ElapsedClock {
        &self.clock
    }

    /// Run cycles until `shutdown` resolves or telemetry ends, then release
    /// the actuator.
    ///
    /// A cycle in progress when `shutdown` resolves is abandoned at its
    /// current await point.
    ///
    /// # Errors
    ///
    /// Returns the telemetry source error if reading fails outright. The
    /// actuator is still closed first.
    pub async fn run<S>(&mut self, shutdown: S) -> Result<LoopStats>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        if let Some(period) = self.cycle_period {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.ticker = Some(ticker);
            info!("Starting control loop at {}ms per cycle", period.as_millis());
        } else {
            info!("Starting control loop (unthrottled)");
        }

        let mut fatal = None;

        loop {
            let result = tokio::select! {
                _ = &mut shutdown => None,
                result = self.paced_cycle() => Some(result),
            };

            match result {
                None => {
                    info!("Shutdown requested, stopping control loop");
                    break;
                }
                Some(Ok(CycleOutcome::EndOfStream)) => {
                    info!("Telemetry stream ended");
                    break;
                }
                Some(Ok(CycleOutcome::Completed(_))) => {}
                Some(Err(fault)) if is_fatal(&fault) => {
                    error!("Telemetry source failed, stopping control loop: {}", fault);
                    fatal = Some(fault.error);
                    break;
                }
                Some(Err(_)) => {}
            }
        }

        self.state = LoopState::Idle;
        self.shutdown().await;

        match fatal {
            Some(error) => Err(error),
            None => Ok(self.stats.clone()),
        }
    }

    async fn paced_cycle(&mut self) -> std::result::Result<CycleOutcome, CycleFault> {
        if let Some(ticker) = self.ticker.as_mut() {
            ticker.tick().await;
        }
        self.run_cycle().await
    }

    /// Run one full cycle.
    ///
    /// A fault is logged with its stage, counted, and returned; the loop is
    /// back in `Idle` either way.
    pub async fn run_cycle(&mut self) -> std::result::Result<CycleOutcome, CycleFault> {
        self.stats.cycles += 1;
        let cycle = self.stats.cycles;

        let result = self.execute_stages(cycle).await;
        self.state = LoopState::Idle;

        match &result {
            Ok(CycleOutcome::Completed(report)) => {
                self.stats.completed += 1;
                if report.dispatched {
                    self.stats.dispatched += 1;
                }
                self.record(report);
            }
            Ok(CycleOutcome::EndOfStream) => {
                // Nothing ran
                self.stats.cycles -= 1;
            }
            Err(fault) => {
                self.stats.record_fault(fault.stage);
                warn!("Cycle {} {} stage failed: {}", cycle, fault.stage, fault.error);
            }
        }

        if self.stats.cycles > 0
            && self.stats.cycles % self.status_interval == 0
            && !matches!(result, Ok(CycleOutcome::EndOfStream))
        {
            info!(
                "Ran {} cycles ({} dispatched, {} faults, {}ms elapsed)",
                self.stats.cycles,
                self.stats.dispatched,
                self.stats.faults(),
                self.clock.elapsed_ms()
            );
        }

        result
    }

    async fn execute_stages(&mut self, cycle: u64) -> std::result::Result<CycleOutcome, CycleFault> {
        self.enter(CycleStage::Reading);
        let sample = match self
            .telemetry
            .next_sample()
            .await
            .map_err(|e| CycleFault::new(CycleStage::Reading, e))?
        {
            Some(sample) => sample,
            None => return Ok(CycleOutcome::EndOfStream),
        };

        self.enter(CycleStage::Fusing);
        let dt = self.step_seconds();
        let features = self.fusion.integrate(&sample, dt);

        self.enter(CycleStage::Preprocessing);
        let pixels = self
            .frames
            .capture()
            .and_then(|frame| self.preprocessor.process(&frame))
            .map_err(|e| CycleFault::new(CycleStage::Preprocessing, e))?;

        self.enter(CycleStage::Predicting);
        let prediction = self
            .predictor
            .predict(&features, &pixels)
            .and_then(|value| {
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(DriveError::Inference(format!("non-finite prediction {}", value)))
                }
            })
            .map_err(|e| CycleFault::new(CycleStage::Predicting, e))?;

        self.enter(CycleStage::Encoding);
        let command = encode(prediction, self.clock.elapsed_ms());
        let wire = command.to_string();

        self.enter(CycleStage::Dispatching);
        let dispatched = self
            .actuator
            .dispatch(&wire)
            .await
            .map_err(|e| CycleFault::new(CycleStage::Dispatching, e))?;

        debug!(
            "Cycle {}: saw {:?} speed {:.3} accel {:.3} predicted {:.4} send {}",
            cycle,
            sample.as_array(),
            features.speed,
            features.accel_magnitude,
            prediction,
            wire
        );

        Ok(CycleOutcome::Completed(CycleReport {
            cycle,
            sample,
            features,
            prediction,
            command,
            dispatched,
        }))
    }

    fn enter(&mut self, stage: CycleStage) {
        self.state = LoopState::from(stage);
    }

    /// Integration step for the sample just read.
    fn step_seconds(&mut self) -> f32 {
        match self.time_step {
            TimeStep::Unit => 1.0,
            TimeStep::WallClock => {
                let now = Instant::now();
                let previous = self.last_sample_at.unwrap_or(self.clock.started_at());
                self.last_sample_at = Some(now);
                now.saturating_duration_since(previous).as_secs_f32()
            }
        }
    }

    fn record(&mut self, report: &CycleReport) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };

        let record = CycleRecord {
            timestamp: Utc::now(),
            cycle: report.cycle,
            elapsed_ms: report.command.elapsed_ms,
            accel: report.sample.as_array(),
            speed: report.features.speed,
            accel_magnitude: report.features.accel_magnitude,
            prediction: report.prediction,
            command: report.command.to_string(),
            dispatched: report.dispatched,
        };

        if let Err(e) = recorder.record(&record) {
            warn!("Failed to record cycle {}: {}", report.cycle, e);
        }
    }

    /// Flush the actuator and recorder. Called by [`run`](Self::run) on exit.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.actuator.close().await {
            warn!("Failed to close actuator channel: {}", e);
        }
        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.flush() {
                warn!("Failed to flush cycle records: {}", e);
            }
        }
        info!(
            "Control loop stopped after {} cycles ({} dispatched, {} faults)",
            self.stats.cycles,
            self.stats.dispatched,
            self.stats.faults()
        );
    }
}

fn is_fatal(fault: &CycleFault) -> bool {
    matches!(fault.error, DriveError::TelemetryIo(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecorderConfig;
    use crate::predictor::{ConstantPredictor, MockPredictor};
    use crate::serial::port_trait::mocks::MockSerialPort;
    use crate::telemetry::{LineSource, TelemetrySource, DEFAULT_GRAVITY};
    use crate::vision::BlankFrameSource;
    use async_trait::async_trait;
    use nalgebra::Vector3;
    use std::io;
    use tokio::io::BufReader;

    fn telemetry(data: &'static [u8]) -> TelemetryReader {
        TelemetryReader::new(Box::new(LineSource::new(BufReader::new(data))), DEFAULT_GRAVITY)
    }

    fn live_loop(data: &'static [u8], port: &MockSerialPort) -> ControlLoop {
        ControlLoop::new(
            telemetry(data),
            Box::new(BlankFrameSource::new(160, 120)),
            Box::new(ConstantPredictor::new(0.5)),
            ActuatorChannel::live(Box::new(port.clone())),
        )
        .with_time_step(TimeStep::Unit)
    }

    /// Source whose reads always fail
    struct BrokenSource;

    #[async_trait]
    impl TelemetrySource for BrokenSource {
        async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
            Err(io::Error::new(io::ErrorKind::NotConnected, "device unplugged"))
        }
    }

    #[tokio::test]
    async fn test_single_cycle_dispatches_command() {
        let port = MockSerialPort::new();
        let mut control = live_loop(b"0.0,0.0,1.0\n", &port);

        let outcome = control.run_cycle().await.unwrap();
        let CycleOutcome::Completed(report) = outcome else {
            panic!("Expected completed cycle");
        };

        assert_eq!(report.cycle, 1);
        assert_eq!(report.sample.as_array(), [0.0, 0.0, 0.0]);
        assert_eq!(report.command.steer, 127);
        assert!(report.dispatched);
        assert_eq!(control.state(), LoopState::Idle);

        let written = port.get_written_strings();
        assert_eq!(written.len(), 1);
        assert!(written[0].starts_with("127,1,255,"));
    }

    #[tokio::test]
    async fn test_actuator_fault_on_third_of_five_cycles() {
        let port = MockSerialPort::new();
        port.fail_write_attempt(3);
        let mut control = live_loop(
            b"0.0,0.0,1.0\n0.1,0.0,1.0\n0.2,0.0,1.0\n0.3,0.0,1.0\n0.4,0.0,1.0\n",
            &port,
        );

        let mut results = Vec::new();
        for _ in 0..5 {
            results.push(control.run_cycle().await);
        }

        for (index, result) in results.iter().enumerate() {
            if index == 2 {
                let fault = result.as_ref().unwrap_err();
                assert_eq!(fault.stage, CycleStage::Dispatching);
                assert!(matches!(fault.error, DriveError::ActuatorIo(_)));
            } else {
                assert!(result.is_ok(), "cycle {} should succeed", index + 1);
            }
        }

        assert_eq!(port.get_written_data().len(), 4);
        assert_eq!(control.stats().cycles, 5);
        assert_eq!(control.stats().dispatched, 4);
        assert_eq!(control.stats().faults(), 1);
        assert_eq!(control.stats().faults_in(CycleStage::Dispatching), 1);
    }

    #[tokio::test]
    async fn test_malformed_telemetry_does_not_touch_fusion() {
        let port = MockSerialPort::new();
        let mut control = live_loop(b"abc,0.0\n1.0,0.0,1.0\n", &port);

        let fault = control.run_cycle().await.unwrap_err();
        assert_eq!(fault.stage, CycleStage::Reading);
        assert!(matches!(fault.error, DriveError::TelemetryParse { .. }));
        assert_eq!(control.fusion().state().velocity, Vector3::zeros());
        assert!(port.get_written_data().is_empty());

        assert!(control.run_cycle().await.is_ok());
        assert_eq!(control.fusion().state().velocity, Vector3::new(1.0, 0.0, 0.0));
    }

    #[tokio::test]
    async fn test_velocity_is_running_sum_across_cycles() {
        let port = MockSerialPort::new();
        let mut control = live_loop(b"0.5,0.25,1.5\n0.5,-0.25,1.0\n-2.0,1.0,0.0\n", &port);

        for _ in 0..3 {
            control.run_cycle().await.unwrap();
        }

        // z: 0.5 + 0.0 + -1.0
        assert_eq!(
            control.fusion().state().velocity,
            Vector3::new(0.5 + 0.5 + -2.0, 0.25 + -0.25 + 1.0, 0.5 + 0.0 + -1.0)
        );
    }

    #[tokio::test]
    async fn test_injected_initial_state() {
        let port = MockSerialPort::new();
        let mut control = live_loop(b"0.0,4.0,1.0\n", &port)
            .with_fusion(StateFusion::with_velocity(Vector3::new(3.0, 0.0, 0.0)));

        let CycleOutcome::Completed(report) = control.run_cycle().await.unwrap() else {
            panic!("Expected completed cycle");
        };
        assert!((report.features.speed - 5.0).abs() < 1e-6);
        assert!((report.features.accel_magnitude - 4.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_frame_shape_fault() {
        let port = MockSerialPort::new();
        let mut control = ControlLoop::new(
            telemetry(b"0.0,0.0,1.0\n"),
            Box::new(BlankFrameSource::new(160, 119)),
            Box::new(ConstantPredictor::default()),
            ActuatorChannel::live(Box::new(port.clone())),
        );

        let fault = control.run_cycle().await.unwrap_err();
        assert_eq!(fault.stage, CycleStage::Preprocessing);
        assert!(matches!(fault.error, DriveError::FrameShape { .. }));
        assert!(port.get_written_data().is_empty());
    }

    #[tokio::test]
    async fn test_predictor_receives_fused_features() {
        let port = MockSerialPort::new();
        let mut predictor = MockPredictor::new();
        predictor
            .expect_predict()
            .withf(|features, frame| {
                (features.speed - 5.0).abs() < 1e-6
                    && (features.accel_magnitude - 5.0).abs() < 1e-6
                    && frame.shape() == (3, 64, 64)
            })
            .times(1)
            .returning(|_, _| Ok(1.0));

        let mut control = ControlLoop::new(
            telemetry(b"3.0,4.0,1.0\n"),
            Box::new(BlankFrameSource::new(160, 120)),
            Box::new(predictor),
            ActuatorChannel::live(Box::new(port.clone())),
        )
        .with_time_step(TimeStep::Unit);

        control.run_cycle().await.unwrap();
        assert!(port.get_written_strings()[0].starts_with("0,1,255,"));
    }

    #[tokio::test]
    async fn test_non_finite_prediction_is_inference_fault() {
        let port = MockSerialPort::new();
        let mut predictor = MockPredictor::new();
        predictor.expect_predict().returning(|_, _| Ok(f32::NAN));

        let mut control = ControlLoop::new(
            telemetry(b"0.0,0.0,1.0\n"),
            Box::new(BlankFrameSource::new(160, 120)),
            Box::new(predictor),
            ActuatorChannel::live(Box::new(port.clone())),
        );

        let fault = control.run_cycle().await.unwrap_err();
        assert_eq!(fault.stage, CycleStage::Predicting);
        match fault.error {
            DriveError::Inference(msg) => assert!(msg.contains("NaN")),
            other => panic!("Expected Inference error, got: {:?}", other),
        }
        assert!(port.get_written_data().is_empty());
    }

    #[tokio::test]
    async fn test_predictor_error_is_cycle_local() {
        let port = MockSerialPort::new();
        let mut predictor = MockPredictor::new();
        let mut calls = 0;
        predictor.expect_predict().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(DriveError::Inference("model busy".to_string()))
            } else {
                Ok(0.0)
            }
        });

        let mut control = ControlLoop::new(
            telemetry(b"0.0,0.0,1.0\n0.0,0.0,1.0\n"),
            Box::new(BlankFrameSource::new(160, 120)),
            Box::new(predictor),
            ActuatorChannel::live(Box::new(port.clone())),
        );

        assert!(control.run_cycle().await.is_err());
        assert!(control.run_cycle().await.is_ok());
        assert_eq!(port.get_written_strings().len(), 1);
        assert!(port.get_written_strings()[0].starts_with("255,1,255,"));
    }

    #[tokio::test]
    async fn test_dry_run_completes_without_dispatch() {
        let mut control = ControlLoop::new(
            telemetry(b"0.0,0.0,1.0\n0.0,0.0,1.0\n"),
            Box::new(BlankFrameSource::new(160, 120)),
            Box::new(ConstantPredictor::default()),
            ActuatorChannel::DryRun,
        );

        let stats = control.run(std::future::pending()).await.unwrap();
        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.dispatched, 0);
        assert_eq!(stats.faults(), 0);
    }

    #[tokio::test]
    async fn test_run_until_end_of_stream_with_fault() {
        let port = MockSerialPort::new();
        port.fail_write_attempt(3);
        let mut control = live_loop(
            b"0.0,0.0,1.0\n0.0,0.0,1.0\n0.0,0.0,1.0\n0.0,0.0,1.0\n0.0,0.0,1.0\n",
            &port,
        );

        let stats = control.run(std::future::pending()).await.unwrap();

        assert_eq!(stats.cycles, 5);
        assert_eq!(stats.dispatched, 4);
        assert_eq!(stats.faults_in(CycleStage::Dispatching), 1);
        assert_eq!(port.get_written_data().len(), 4);
        // 4 dispatch flushes + 1 on shutdown
        assert_eq!(port.flush_count(), 5);
    }

    #[tokio::test]
    async fn test_garbled_serial_line_does_not_stop_loop() {
        let port = MockSerialPort::new();
        let mut control = live_loop(
            b"0.0,0.0,1.0\n\xff\xfe,0.0,1.0\n0.0,0.0,1.0\n0.0,0.0,1.0\n",
            &port,
        );

        let stats = control.run(std::future::pending()).await.unwrap();

        assert_eq!(stats.cycles, 4);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.faults_in(CycleStage::Reading), 1);
        assert_eq!(port.get_written_data().len(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_signal_releases_actuator() {
        let port = MockSerialPort::new();
        // Reader that never yields a line
        let (reader, _writer) = tokio::io::duplex(64);
        let mut control = ControlLoop::new(
            TelemetryReader::new(
                Box::new(LineSource::new(BufReader::new(reader))),
                DEFAULT_GRAVITY,
            ),
            Box::new(BlankFrameSource::new(160, 120)),
            Box::new(ConstantPredictor::default()),
            ActuatorChannel::live(Box::new(port.clone())),
        );

        let stats = control.run(async {}).await.unwrap();
        assert_eq!(stats.completed, 0);
        assert_eq!(port.flush_count(), 1);
        assert_eq!(control.state(), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_telemetry_source_failure_stops_loop() {
        let port = MockSerialPort::new();
        let mut control = ControlLoop::new(
            TelemetryReader::new(Box::new(BrokenSource), DEFAULT_GRAVITY),
            Box::new(BlankFrameSource::new(160, 120)),
            Box::new(ConstantPredictor::default()),
            ActuatorChannel::live(Box::new(port.clone())),
        );

        let err = control.run(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, DriveError::TelemetryIo(_)));
        assert_eq!(port.flush_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_integration_and_elapsed_ms() {
        let port = MockSerialPort::new();
        let mut control = ControlLoop::new(
            telemetry(b"2.0,0.0,1.0\n2.0,0.0,1.0\n"),
            Box::new(BlankFrameSource::new(160, 120)),
            Box::new(ConstantPredictor::new(1.0)),
            ActuatorChannel::live(Box::new(port.clone())),
        );

        tokio::time::advance(Duration::from_millis(500)).await;
        control.run_cycle().await.unwrap();
        assert_eq!(control.fusion().state().velocity, Vector3::new(1.0, 0.0, 0.0));

        tokio::time::advance(Duration::from_millis(250)).await;
        control.run_cycle().await.unwrap();
        assert_eq!(control.fusion().state().velocity, Vector3::new(1.5, 0.0, 0.0));

        assert_eq!(
            port.get_written_strings(),
            vec!["0,1,255,500".to_string(), "0,1,255,750".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_period_paces_loop() {
        let mut control = ControlLoop::new(
            telemetry(b"0.0,0.0,1.0\n0.0,0.0,1.0\n0.0,0.0,1.0\n"),
            Box::new(BlankFrameSource::new(160, 120)),
            Box::new(ConstantPredictor::default()),
            ActuatorChannel::DryRun,
        )
        .with_cycle_period(Some(Duration::from_millis(100)));

        let stats = control.run(std::future::pending()).await.unwrap();
        assert_eq!(stats.completed, 3);
        // First tick is immediate, then 100ms apart; the fourth tick hits EOF
        assert_eq!(control.clock().elapsed_ms(), 300);
    }

    #[tokio::test]
    async fn test_recorder_captures_completed_cycles() {
        let dir = tempfile::TempDir::new().unwrap();
        let recorder = CycleRecorder::new(&RecorderConfig {
            enabled: true,
            log_dir: dir.path().to_string_lossy().to_string(),
            max_records_per_file: 100,
            max_files_to_keep: 2,
        })
        .unwrap();
        let path = recorder.current_path();

        let mut control = ControlLoop::new(
            telemetry(b"0.0,0.0,1.0\nbad\n0.0,0.0,1.0\n"),
            Box::new(BlankFrameSource::new(160, 120)),
            Box::new(ConstantPredictor::default()),
            ActuatorChannel::DryRun,
        )
        .with_recorder(recorder);

        control.run(std::future::pending()).await.unwrap();

        let contents = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let last: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(last["cycle"], 3);
        assert_eq!(last["dispatched"], false);
    }
}
