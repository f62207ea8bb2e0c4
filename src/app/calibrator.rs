//! The processing loop body.
//!
//! `Calibrator` owns every piece of mutable state: ROI, threshold, consensus
//! buffer, sensor snapshot, serial link, frame source. Each `tick()` applies
//! pending operator intents, then does one round of frame + serial + OCR
//! work and publishes a fresh `Dashboard`.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex};

use super::dashboard::Dashboard;
use super::history::History;
use super::intent::Intent;
use crate::analysis;
use crate::capture::FrameSource;
use crate::ocr::preprocess::DEFAULT_THRESHOLD;
use crate::ocr::{self, ConsensusBuffer, OcrEngine, Roi, ThresholdPolicy};
use crate::serial::{Connector, SerialLink};
use crate::session::{DataLog, LogRecord, RecordSource};
use crate::telemetry::{LineKind, SensorSnapshot, TelemetryParser};

/// Serial lines handled per tick; the rest wait for the next one.
const MAX_LINES_PER_TICK: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Stop,
}

/// Everything the calibrator needs, assembled by the caller.
pub struct CalibratorParts<C: Connector> {
    pub source: Box<dyn FrameSource>,
    pub engine: Box<dyn OcrEngine>,
    pub link: SerialLink<C>,
    pub parser: TelemetryParser,
    pub consensus: ConsensusBuffer,
    pub roi: Roi,
    pub threshold: ThresholdPolicy,
    pub data_log: DataLog,
    pub history_len: usize,
    /// Where exported charts go
    pub chart_dir: PathBuf,
}

pub struct Calibrator<C: Connector> {
    source: Box<dyn FrameSource>,
    engine: Box<dyn OcrEngine>,
    link: SerialLink<C>,
    parser: TelemetryParser,
    snapshot: SensorSnapshot,
    consensus: ConsensusBuffer,
    roi: Roi,
    fixed_threshold: u8,
    auto_threshold: bool,
    data_log: DataLog,
    history: History,
    chart_dir: PathBuf,

    intents: Receiver<Intent>,
    dashboard: Arc<Mutex<Dashboard>>,

    // Published alongside the dashboard
    frame_seq: u64,
    last_frame: Option<Arc<RgbImage>>,
    last_gray: Option<Arc<image::GrayImage>>,
    last_binary: Option<Arc<image::GrayImage>>,
    last_raw_text: String,
    threshold_in_use: Option<u8>,
    status_message: Option<String>,

    // Repeated failures are logged once until they recover
    frame_failing: bool,
    engine_failing: bool,
}

impl<C: Connector> Calibrator<C> {
    pub fn new(
        parts: CalibratorParts<C>,
        intents: Receiver<Intent>,
        dashboard: Arc<Mutex<Dashboard>>,
    ) -> Self {
        let (fixed_threshold, auto_threshold) = match parts.threshold {
            ThresholdPolicy::Fixed { value } => (value, false),
            ThresholdPolicy::Otsu => (DEFAULT_THRESHOLD, true),
        };
        let r = parts.roi;

        Self {
            source: parts.source,
            engine: parts.engine,
            link: parts.link,
            parser: parts.parser,
            snapshot: SensorSnapshot::default(),
            consensus: parts.consensus,
            roi: Roi::new(r.x, r.y, r.width, r.height),
            fixed_threshold,
            auto_threshold,
            data_log: parts.data_log,
            history: History::new(parts.history_len),
            chart_dir: parts.chart_dir,
            intents,
            dashboard,
            frame_seq: 0,
            last_frame: None,
            last_gray: None,
            last_binary: None,
            last_raw_text: String::new(),
            threshold_in_use: None,
            status_message: None,
            frame_failing: false,
            engine_failing: false,
        }
    }

    fn threshold_policy(&self) -> ThresholdPolicy {
        if self.auto_threshold {
            ThresholdPolicy::Otsu
        } else {
            ThresholdPolicy::Fixed {
                value: self.fixed_threshold,
            }
        }
    }

    /// One pass of the processing loop.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if self.apply_intents() == TickOutcome::Stop {
            return Ok(TickOutcome::Stop);
        }

        let frame = self.fetch_frame();
        self.poll_serial()?;
        if let Some(frame) = frame {
            self.process_frame(frame)?;
        }

        self.publish()?;
        Ok(TickOutcome::Continue)
    }

    fn apply_intents(&mut self) -> TickOutcome {
        loop {
            match self.intents.try_recv() {
                Ok(Intent::Shutdown) => return TickOutcome::Stop,
                Ok(intent) => self.apply_intent(intent),
                Err(TryRecvError::Empty) => return TickOutcome::Continue,
                Err(TryRecvError::Disconnected) => {
                    log::info!("Intent channel closed, stopping processing loop");
                    return TickOutcome::Stop;
                }
            }
        }
    }

    fn apply_intent(&mut self, intent: Intent) {
        match intent {
            Intent::AdjustRoi { axis, delta } => {
                self.roi.adjust(axis, delta);
                // Old readings describe a different region
                self.consensus.clear();
                log::debug!("ROI moved to {:?}", self.roi);
            }
            Intent::SetThreshold(value) => {
                self.fixed_threshold = value;
            }
            Intent::SetAutoThreshold(enabled) => {
                self.auto_threshold = enabled;
                log::info!(
                    "Threshold mode: {}",
                    if enabled { "auto (Otsu)" } else { "fixed" }
                );
            }
            Intent::SendCommand(command) => {
                let text = command.to_string();
                self.status_message = Some(if self.link.send_command(&text) {
                    format!("Sent {}", text)
                } else {
                    format!("Not sent (link down): {}", text)
                });
            }
            Intent::ResetConsensus => {
                self.consensus.clear();
                log::info!("OCR buffer cleared by operator");
                self.status_message = Some("OCR buffer cleared".to_string());
            }
            Intent::ExportChart => self.export_chart(),
            // Handled by `apply_intents`
            Intent::Shutdown => {}
        }
    }

    fn export_chart(&mut self) {
        let path = analysis::timestamped_path(&self.chart_dir);
        let message = match analysis::export_history(&self.history.to_vec(), &path) {
            Ok(()) => {
                log::info!("Chart saved: {}", path.display());
                format!("Chart saved to {}", path.display())
            }
            Err(e) => {
                log::warn!("Chart export failed: {:#}", e);
                format!("Chart export failed: {}", e)
            }
        };
        self.status_message = Some(message);
    }

    fn fetch_frame(&mut self) -> Option<RgbImage> {
        match self.source.next_frame() {
            Ok(frame) => {
                if self.frame_failing {
                    log::info!("Frames from {} are back", self.source.describe());
                    self.frame_failing = false;
                }
                Some(frame)
            }
            Err(e) => {
                if !self.frame_failing {
                    log::warn!("Frame fetch from {} failed: {:#}", self.source.describe(), e);
                    self.frame_failing = true;
                }
                None
            }
        }
    }

    fn poll_serial(&mut self) -> Result<()> {
        if !self.link.connect() {
            return Ok(());
        }

        for _ in 0..MAX_LINES_PER_TICK {
            let Some(line) = self.link.read_line() else {
                break;
            };
            self.handle_line(&line)?;
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Result<()> {
        log::debug!("Received: {}", line);

        match self.parser.apply_line(line, &mut self.snapshot) {
            LineKind::DeviceLog => {
                log::info!(target: "device", "{}", line);
            }
            LineKind::Telemetry { complete } => {
                if complete {
                    let record = LogRecord::new(
                        RecordSource::Sensor,
                        self.consensus.stable().value(),
                        &self.snapshot,
                    );
                    self.data_log
                        .append(&record)
                        .context("Failed to log telemetry frame")?;
                }
                self.push_history();
            }
        }
        Ok(())
    }

    fn process_frame(&mut self, frame: RgbImage) -> Result<()> {
        let policy = self.threshold_policy();
        let result = ocr::read_frame(&frame, &self.roi, policy, self.engine.as_ref());

        self.frame_seq += 1;
        self.last_frame = Some(Arc::new(frame));

        let Some(result) = result else {
            self.last_gray = None;
            self.last_binary = None;
            self.threshold_in_use = None;
            return Ok(());
        };

        match &result.engine_error {
            Some(e) if !self.engine_failing => {
                log::warn!("OCR engine failed: {}", e);
                self.engine_failing = true;
            }
            None if self.engine_failing => {
                log::info!("OCR engine recovered");
                self.engine_failing = false;
            }
            _ => {}
        }

        self.threshold_in_use = Some(result.images.threshold);
        self.last_gray = Some(Arc::new(result.images.gray));
        self.last_binary = Some(Arc::new(result.images.binary));
        self.last_raw_text = result.raw_text;

        if let Some(reading) = result.reading {
            self.consensus.record(reading);
        }

        if self.consensus.reconsider() {
            let record = LogRecord::new(
                RecordSource::Ocr,
                self.consensus.stable().value(),
                &self.snapshot,
            );
            self.data_log
                .append(&record)
                .context("Failed to log OCR reading")?;
            self.push_history();
        }
        Ok(())
    }

    fn push_history(&mut self) {
        let ocr = self.consensus.stable().value().map(|r| f64::from(r.ppm()));
        self.history.push(self.snapshot.co2_ppm(), ocr);
    }

    fn publish(&mut self) -> Result<()> {
        let mut dash = self
            .dashboard
            .lock()
            .map_err(|_| anyhow!("Dashboard lock poisoned"))?;

        dash.sensor = self.snapshot.clone();
        dash.stable = self.consensus.stable().clone();
        dash.confidence = self.consensus.last_confidence();
        dash.buffer_len = self.consensus.len();
        dash.buffer_capacity = self.consensus.capacity();
        dash.last_raw_text = self.last_raw_text.clone();

        dash.link = self.link.state();
        dash.link_target = self.link.describe();
        dash.link_attempts = self.link.attempts();

        dash.roi = self.roi;
        dash.auto_threshold = self.auto_threshold;
        dash.fixed_threshold = self.fixed_threshold;
        dash.threshold_in_use = self.threshold_in_use;

        if dash.frame_seq != self.frame_seq {
            dash.frame_seq = self.frame_seq;
            dash.frame = self.last_frame.clone();
            dash.gray = self.last_gray.clone();
            dash.binary = self.last_binary.clone();
        }

        dash.history = self.history.to_vec();
        if let Some(message) = self.status_message.take() {
            dash.status_message = Some(message);
        }
        Ok(())
    }

    /// Marks the loop as stopped in the dashboard, with the error if any.
    pub fn report_stopped(&self, error: Option<&anyhow::Error>) {
        if let Ok(mut dash) = self.dashboard.lock() {
            dash.running = false;
            dash.fault = error.map(|e| format!("{:#}", e));
        }
    }

    /// Closes the serial link. The frame source is released when the
    /// calibrator is dropped.
    pub fn close(&mut self) {
        self.link.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::StaticSource;
    use crate::ocr::testing::ScriptedEngine;
    use crate::ocr::{RoiAxis, StableReading};
    use crate::serial::link::testing::{fake_device, FakeConnector, FakeDevice};
    use crate::serial::{DeviceCommand, LinkState};
    use std::sync::mpsc::{self, Sender};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        calibrator: Calibrator<FakeConnector>,
        intents: Sender<Intent>,
        dashboard: Arc<Mutex<Dashboard>>,
        device: Arc<Mutex<FakeDevice>>,
        dir: TempDir,
    }

    impl Harness {
        fn log_lines(&self) -> Vec<String> {
            std::fs::read_to_string(self.dir.path().join("data.csv"))
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn harness(engine: ScriptedEngine, frame: Option<RgbImage>, device_present: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let device = fake_device(device_present);
        let (tx, rx) = mpsc::channel();
        let dashboard = Arc::new(Mutex::new(Dashboard::default()));

        let parts = CalibratorParts {
            source: Box::new(StaticSource(frame)),
            engine: Box::new(engine),
            link: SerialLink::new(FakeConnector(Arc::clone(&device)), Duration::ZERO),
            parser: TelemetryParser::default(),
            consensus: ConsensusBuffer::new(4, 0.6),
            roi: Roi::new(0, 0, 20, 10),
            threshold: ThresholdPolicy::Otsu,
            data_log: DataLog::open(&dir.path().join("data.csv")).unwrap(),
            history_len: 100,
            chart_dir: dir.path().to_path_buf(),
        };

        Harness {
            calibrator: Calibrator::new(parts, rx, Arc::clone(&dashboard)),
            intents: tx,
            dashboard,
            device,
            dir,
        }
    }

    fn gray_frame() -> Option<RgbImage> {
        Some(RgbImage::from_pixel(40, 30, image::Rgb([90, 90, 90])))
    }

    #[test]
    fn test_identical_readings_log_one_ocr_row() {
        let mut h = harness(ScriptedEngine::always("800"), gray_frame(), false);
        for _ in 0..10 {
            assert_eq!(h.calibrator.tick().unwrap(), TickOutcome::Continue);
        }

        let rows: Vec<String> = h
            .log_lines()
            .into_iter()
            .filter(|l| l.contains(",OCR,"))
            .collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains(",OCR,800,"));

        let dash = h.dashboard.lock().unwrap();
        assert_eq!(dash.ocr_co2_text(), "800");
        assert_eq!(dash.confidence, Some(1.0));
        assert!(dash.binary.is_some());
    }

    #[test]
    fn test_rejected_text_never_stabilizes() {
        let mut h = harness(ScriptedEngine::always("801"), gray_frame(), false);
        for _ in 0..10 {
            h.calibrator.tick().unwrap();
        }
        assert_eq!(h.log_lines().len(), 1);
        assert_eq!(h.dashboard.lock().unwrap().stable, StableReading::Unknown);
        assert_eq!(h.dashboard.lock().unwrap().last_raw_text, "801");
    }

    #[test]
    fn test_engine_failure_counts_as_rejection() {
        let mut h = harness(
            ScriptedEngine::new(&[None, None, Some("800")]),
            gray_frame(),
            false,
        );

        for _ in 0..2 {
            assert_eq!(h.calibrator.tick().unwrap(), TickOutcome::Continue);
        }
        assert!(h.calibrator.engine_failing);
        {
            let dash = h.dashboard.lock().unwrap();
            assert_eq!(dash.buffer_len, 0);
            assert_eq!(dash.stable, StableReading::Unknown);
            assert_eq!(dash.last_raw_text, "");
            // Crops are still shown while the engine is down
            assert_eq!(dash.frame_seq, 2);
            assert!(dash.binary.is_some());
        }
        assert_eq!(h.log_lines().len(), 1);

        // Engine back: "800" repeats and reaches half of the 4-slot buffer
        for _ in 0..2 {
            h.calibrator.tick().unwrap();
        }
        assert!(!h.calibrator.engine_failing);
        assert_eq!(h.dashboard.lock().unwrap().ocr_co2_text(), "800");

        let rows: Vec<String> = h
            .log_lines()
            .into_iter()
            .filter(|l| l.contains(",OCR,800,"))
            .collect();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_frame_failure_skips_ocr() {
        let mut h = harness(ScriptedEngine::always("800"), None, false);
        for _ in 0..5 {
            assert_eq!(h.calibrator.tick().unwrap(), TickOutcome::Continue);
        }
        let dash = h.dashboard.lock().unwrap();
        assert_eq!(dash.frame_seq, 0);
        assert_eq!(dash.stable, StableReading::Unknown);
    }

    #[test]
    fn test_complete_telemetry_logged() {
        let mut h = harness(ScriptedEngine::always(""), gray_frame(), true);
        h.device
            .lock()
            .unwrap()
            .push("PCB2_STATE:2;TEMP:24.5;CO2:812\nTEMP:25.0\nESP32 boot ok\n");

        h.calibrator.tick().unwrap();

        let lines = h.log_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(",SENSOR,,812,24.5,"));

        let dash = h.dashboard.lock().unwrap();
        assert_eq!(dash.link, LinkState::Connected);
        assert_eq!(dash.temperature_text(), "25.0");
        assert_eq!(dash.device_state_text(), "SETPOINT_STABLE");
        assert_eq!(dash.history.len(), 2);
    }

    #[test]
    fn test_send_command_intent() {
        let mut h = harness(ScriptedEngine::always(""), gray_frame(), true);
        h.intents
            .send(Intent::SendCommand(DeviceCommand::SetCo2(800)))
            .unwrap();

        // Intents run before connecting, so the first command finds the link down
        h.calibrator.tick().unwrap();
        assert!(h.device.lock().unwrap().written.is_empty());

        h.intents
            .send(Intent::SendCommand(DeviceCommand::OpenAll))
            .unwrap();
        h.calibrator.tick().unwrap();
        assert_eq!(h.device.lock().unwrap().written, b"OPEN_ALL\n");
        assert_eq!(
            h.dashboard.lock().unwrap().status_message.as_deref(),
            Some("Sent OPEN_ALL")
        );
    }

    #[test]
    fn test_roi_move_clears_buffer_keeps_stable() {
        let mut h = harness(ScriptedEngine::always("800"), gray_frame(), false);
        for _ in 0..4 {
            h.calibrator.tick().unwrap();
        }
        assert_eq!(h.dashboard.lock().unwrap().buffer_len, 4);

        h.intents
            .send(Intent::AdjustRoi {
                axis: RoiAxis::X,
                delta: 5,
            })
            .unwrap();
        h.calibrator.tick().unwrap();

        let dash = h.dashboard.lock().unwrap();
        assert_eq!(dash.roi.x, 5);
        assert_eq!(dash.buffer_len, 1);
        assert_eq!(dash.ocr_co2_text(), "800");
    }

    #[test]
    fn test_threshold_intents() {
        let mut h = harness(ScriptedEngine::always(""), gray_frame(), false);
        h.intents.send(Intent::SetAutoThreshold(false)).unwrap();
        h.intents.send(Intent::SetThreshold(200)).unwrap();
        h.calibrator.tick().unwrap();

        let dash = h.dashboard.lock().unwrap();
        assert!(!dash.auto_threshold);
        assert_eq!(dash.threshold_in_use, Some(200));
    }

    #[test]
    fn test_shutdown_and_closed_channel_stop() {
        let mut h = harness(ScriptedEngine::always(""), gray_frame(), false);
        h.intents.send(Intent::Shutdown).unwrap();
        assert_eq!(h.calibrator.tick().unwrap(), TickOutcome::Stop);

        let mut h = harness(ScriptedEngine::always(""), gray_frame(), false);
        drop(h.intents);
        assert_eq!(h.calibrator.tick().unwrap(), TickOutcome::Stop);
    }
}
