//! Rolling CO2 history for the live plot and chart export.

use std::collections::VecDeque;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistorySample {
    /// Seconds since the session started
    pub t_secs: f64,
    /// Controller's CO2 sensor, ppm
    pub sensor_co2: Option<f64>,
    /// Stable OCR reading of the reference instrument, ppm
    pub ocr_co2: Option<f64>,
}

pub struct History {
    samples: VecDeque<HistorySample>,
    capacity: usize,
    started: Instant,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            capacity: capacity.max(1),
            started: Instant::now(),
        }
    }

    /// Adds a point stamped with the time since start. Samples with no value
    /// at all are dropped.
    pub fn push(&mut self, sensor_co2: Option<f64>, ocr_co2: Option<f64>) {
        let t_secs = self.started.elapsed().as_secs_f64();
        self.push_at(t_secs, sensor_co2, ocr_co2);
    }

    fn push_at(&mut self, t_secs: f64, sensor_co2: Option<f64>, ocr_co2: Option<f64>) {
        if sensor_co2.is_none() && ocr_co2.is_none() {
            return;
        }
        self.samples.push_back(HistorySample {
            t_secs,
            sensor_co2,
            ocr_co2,
        });
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn to_vec(&self) -> Vec<HistorySample> {
        self.samples.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded() {
        let mut history = History::new(3);
        for i in 0..5 {
            history.push_at(i as f64, Some(400.0 + i as f64), None);
        }
        let samples = history.to_vec();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].t_secs, 2.0);
        assert_eq!(samples[2].sensor_co2, Some(404.0));
    }

    #[test]
    fn test_empty_sample_dropped() {
        let mut history = History::new(10);
        history.push(None, None);
        assert!(history.to_vec().is_empty());
        history.push(None, Some(800.0));
        assert_eq!(history.to_vec().len(), 1);
    }
}
