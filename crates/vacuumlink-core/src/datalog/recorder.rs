//! Live chart series
//!
//! Keeps the most recent samples for plotting. The engine itself keeps no
//! history; this is a consumer-side buffer.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::engine::GaugeEvent;
use crate::protocol::Sample;

/// Points kept when no capacity is given
const DEFAULT_CAPACITY: usize = 10000;

/// Y axis scale of the chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisScale {
    /// Values as read
    Linear,
    /// Decades, `log10(value)`
    Logarithmic,
}

/// One plotted reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    /// Capture time
    pub timestamp: DateTime<Local>,
    /// Pressure in mbar
    pub value: f64,
}

/// Bounded series of recent readings
pub struct SampleHistory {
    points: VecDeque<ChartPoint>,
    capacity: usize,
    scale: AxisScale,
}

impl SampleHistory {
    /// Keep at most `capacity` points (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
            scale: AxisScale::Linear,
        }
    }

    /// Add a sample, evicting the oldest point when full
    pub fn push(&mut self, sample: &Sample) {
        if self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(ChartPoint {
            timestamp: sample.timestamp,
            value: sample.value,
        });
    }

    /// Feed an engine event; only samples are charted
    pub fn record(&mut self, event: &GaugeEvent) -> bool {
        match event {
            GaugeEvent::Sample(sample) => {
                self.push(sample);
                true
            }
            GaugeEvent::Protocol(_) => false,
        }
    }

    /// Number of points held
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All points, oldest first
    pub fn points(&self) -> impl Iterator<Item = &ChartPoint> {
        self.points.iter()
    }

    /// Most recent point
    pub fn latest(&self) -> Option<&ChartPoint> {
        self.points.back()
    }

    /// Smallest and largest value held
    pub fn range(&self) -> Option<(f64, f64)> {
        self.points.iter().fold(None, |acc, p| match acc {
            None => Some((p.value, p.value)),
            Some((lo, hi)) => Some((lo.min(p.value), hi.max(p.value))),
        })
    }

    /// Current axis scale
    pub fn scale(&self) -> AxisScale {
        self.scale
    }

    /// Flip between linear and logarithmic axis
    pub fn toggle_scale(&mut self) -> AxisScale {
        self.scale = match self.scale {
            AxisScale::Linear => AxisScale::Logarithmic,
            AxisScale::Logarithmic => AxisScale::Linear,
        };
        self.scale
    }

    /// Points in axis units. Non-positive values cannot sit on a log axis and are skipped.
    pub fn plotted(&self) -> Vec<(DateTime<Local>, f64)> {
        match self.scale {
            AxisScale::Linear => self.points.iter().map(|p| (p.timestamp, p.value)).collect(),
            AxisScale::Logarithmic => self
                .points
                .iter()
                .filter(|p| p.value > 0.0)
                .map(|p| (p.timestamp, p.value.log10()))
                .collect(),
        }
    }

    /// Drop every point
    pub fn clear(&mut self) {
        self.points.clear();
    }
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
