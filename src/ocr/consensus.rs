//! Sliding-window majority vote over validated readings.
//!
//! Per-frame OCR misfires constantly. The buffer keeps the last `capacity`
//! validated readings and only publishes a value once it holds a large
//! enough share of a sufficiently full window.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use super::validate::ValidatedReading;

/// The published OCR value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StableReading {
    #[default]
    Unknown,
    Value(ValidatedReading),
}

impl StableReading {
    pub fn value(&self) -> Option<&ValidatedReading> {
        match self {
            Self::Unknown => None,
            Self::Value(reading) => Some(reading),
        }
    }
}

impl fmt::Display for StableReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("---"),
            Self::Value(reading) => write!(f, "{}", reading),
        }
    }
}

#[derive(Debug)]
pub struct ConsensusBuffer {
    buffer: VecDeque<ValidatedReading>,
    capacity: usize,
    confidence_threshold: f64,
    stable: StableReading,
    last_confidence: Option<f64>,
}

impl ConsensusBuffer {
    /// `capacity` must be at least 1 and `confidence_threshold` in (0, 1];
    /// both are checked when the config is loaded.
    pub fn new(capacity: usize, confidence_threshold: f64) -> Self {
        Self {
            buffer: VecDeque::new(),
            capacity: capacity.max(1),
            confidence_threshold,
            stable: StableReading::Unknown,
            last_confidence: None,
        }
    }

    /// Appends a reading, evicting the oldest entries beyond capacity.
    pub fn record(&mut self, reading: ValidatedReading) {
        self.buffer.push_back(reading);
        while self.buffer.len() > self.capacity {
            self.buffer.pop_front();
        }
    }

    /// Re-runs the vote. Returns `true` only when the published value changed.
    ///
    /// Nothing is decided until the buffer is at least half full. Among
    /// equally frequent values the one appended most recently wins.
    pub fn reconsider(&mut self) -> bool {
        let len = self.buffer.len();
        if len == 0 || (len as f64) < self.capacity as f64 / 2.0 {
            return false;
        }

        let Some((candidate, count)) = self.majority().map(|(r, n)| (r.clone(), n)) else {
            return false;
        };

        let confidence = count as f64 / len as f64;
        self.last_confidence = Some(confidence);

        if confidence >= self.confidence_threshold && self.stable.value() != Some(&candidate) {
            log::info!(
                "New stable reading: '{}' (confidence: {:.0}%)",
                candidate,
                confidence * 100.0
            );
            self.stable = StableReading::Value(candidate);
            return true;
        }

        false
    }

    /// Most frequent value and its count; ties go to the latest occurrence.
    fn majority(&self) -> Option<(&ValidatedReading, usize)> {
        // value -> (count, index of its latest occurrence)
        let mut tally: HashMap<&ValidatedReading, (usize, usize)> = HashMap::new();
        for (idx, reading) in self.buffer.iter().enumerate() {
            let entry = tally.entry(reading).or_insert((0, idx));
            entry.0 += 1;
            entry.1 = idx;
        }

        tally
            .into_iter()
            .max_by_key(|(_, (count, last_idx))| (*count, *last_idx))
            .map(|(reading, (count, _))| (reading, count))
    }

    /// Drops buffered evidence but keeps the published value.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.last_confidence = None;
    }

    pub fn stable(&self) -> &StableReading {
        &self.stable
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Share of the winning value at the last completed vote.
    pub fn last_confidence(&self) -> Option<f64> {
        self.last_confidence
    }
}
