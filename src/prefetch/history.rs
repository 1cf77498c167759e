//! Short user-action history and viewport prediction

use crate::core::constants::PREDICTION_HORIZON_FACTOR;
use crate::core::geometry::{Point, Rect};
use crate::prelude::{Duration, Instant, VecDeque};

/// Screen speed (px/s) at which a pan prediction is fully trusted
const FULL_CONFIDENCE_SPEED_PX: f64 = 800.0;
/// Zoom ratio between two samples at which a zoom prediction is fully trusted
const FULL_CONFIDENCE_ZOOM_RATIO: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserActionKind {
    Pan,
    Zoom,
    Drag,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserActionSample {
    pub kind: UserActionKind,
    /// Visible world rectangle after the action
    pub viewport: Rect,
    pub scale: f64,
    pub timestamp: Instant,
    /// World units per second of the viewport centre, relative to the
    /// previous sample
    pub velocity: Option<Point>,
}

/// Extrapolated viewport a short time ahead
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportPrediction {
    pub viewport: Rect,
    pub scale: f64,
    /// 0..=1; how much the extrapolation should be trusted
    pub confidence: f64,
    pub horizon: Duration,
}

/// Bounded FIFO of recent viewport samples
#[derive(Debug, Clone)]
pub struct ActionHistory {
    samples: VecDeque<UserActionSample>,
    capacity: usize,
}

impl ActionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&UserActionSample> {
        self.samples.back()
    }

    pub fn samples(&self) -> impl Iterator<Item = &UserActionSample> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn push(&mut self, sample: UserActionSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Record a viewport, deriving its velocity from the previous sample
    pub fn record(&mut self, kind: UserActionKind, viewport: Rect, scale: f64, now: Instant) {
        let velocity = self.last().and_then(|previous| {
            let dt = now.checked_duration_since(previous.timestamp)?.as_secs_f64();
            if dt <= 0.0 {
                return None;
            }
            Some(
                viewport
                    .center()
                    .subtract(&previous.viewport.center())
                    .multiply(1.0 / dt),
            )
        });
        self.push(UserActionSample {
            kind,
            viewport,
            scale,
            timestamp: now,
            velocity,
        });
    }

    /// Linear extrapolation from the last two samples.
    ///
    /// The horizon is 1.5x the interval between them. Position moves
    /// linearly, scale is extrapolated in log space.
    pub fn predict(&self) -> Option<ViewportPrediction> {
        let len = self.samples.len();
        if len < 2 {
            return None;
        }
        let a = self.samples.get(len - 2)?;
        let b = self.samples.get(len - 1)?;
        let interval = b.timestamp.checked_duration_since(a.timestamp)?;
        if interval.is_zero() || a.scale <= 0.0 || b.scale <= 0.0 {
            return None;
        }
        let k = PREDICTION_HORIZON_FACTOR;

        let ca = a.viewport.center();
        let cb = b.viewport.center();
        let center = cb.add(&cb.subtract(&ca).multiply(k));

        let zoom_ratio = b.scale / a.scale;
        let scale = b.scale * zoom_ratio.powf(k);
        // World extent shrinks as the scale grows
        let shrink = b.scale / scale;
        let viewport =
            Rect::from_center_and_size(center, b.viewport.width * shrink, b.viewport.height * shrink);

        let confidence = match b.kind {
            UserActionKind::Idle => 0.0,
            _ => {
                let speed_px = cb.distance_to(&ca) * b.scale / interval.as_secs_f64();
                let pan = speed_px / FULL_CONFIDENCE_SPEED_PX;
                let zoom = zoom_ratio.ln().abs() / FULL_CONFIDENCE_ZOOM_RATIO.ln();
                pan.max(zoom).clamp(0.0, 1.0)
            }
        };

        Some(ViewportPrediction {
            viewport,
            scale,
            confidence,
            horizon: interval.mul_f64(k),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_evicts_oldest() {
        let t0 = Instant::now();
        let mut history = ActionHistory::new(3);
        for i in 0..5 {
            history.record(
                UserActionKind::Pan,
                Rect::new(f64::from(i), 0.0, 10.0, 10.0),
                1.0,
                t0 + Duration::from_millis(100 * i as u64),
            );
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.samples().next().map(|s| s.viewport.x), Some(2.0));
        let v = history.last().and_then(|s| s.velocity).unwrap();
        assert!((v.x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_fast_pan_prediction() {
        let t0 = Instant::now();
        let mut history = ActionHistory::new(10);
        history.record(UserActionKind::Drag, Rect::new(0.0, 0.0, 100.0, 100.0), 1.0, t0);
        history.record(
            UserActionKind::Drag,
            Rect::new(200.0, 0.0, 100.0, 100.0),
            1.0,
            t0 + Duration::from_millis(100),
        );
        let prediction = history.predict().unwrap();
        assert!((prediction.viewport.x - 500.0).abs() < 1e-9);
        assert_eq!(prediction.viewport.width, 100.0);
        assert!((prediction.horizon.as_secs_f64() - 0.15).abs() < 1e-6);
        // 2000 px/s is well past full confidence
        assert_eq!(prediction.confidence, 1.0);
    }

    #[test]
    fn test_zoom_prediction_and_slow_pan() {
        let t0 = Instant::now();
        let mut history = ActionHistory::new(10);
        history.record(UserActionKind::Zoom, Rect::new(0.0, 0.0, 100.0, 100.0), 1.0, t0);
        history.record(
            UserActionKind::Zoom,
            Rect::new(25.0, 25.0, 50.0, 50.0),
            2.0,
            t0 + Duration::from_millis(200),
        );
        let prediction = history.predict().unwrap();
        assert!((prediction.scale - 2.0 * 2f64.powf(1.5)).abs() < 1e-9);
        assert!((prediction.viewport.center().x - 50.0).abs() < 1e-9);
        assert_eq!(prediction.confidence, 1.0);

        let mut slow = ActionHistory::new(10);
        slow.record(UserActionKind::Pan, Rect::new(0.0, 0.0, 100.0, 100.0), 1.0, t0);
        slow.record(
            UserActionKind::Pan,
            Rect::new(10.0, 0.0, 100.0, 100.0),
            1.0,
            t0 + Duration::from_millis(100),
        );
        let prediction = slow.predict().unwrap();
        assert!(prediction.confidence < 0.7);
    }

    #[test]
    fn test_no_prediction_without_two_samples() {
        let mut history = ActionHistory::new(10);
        assert!(history.predict().is_none());
        let t0 = Instant::now();
        history.record(UserActionKind::Idle, Rect::new(0.0, 0.0, 1.0, 1.0), 1.0, t0);
        assert!(history.predict().is_none());
        history.record(
            UserActionKind::Idle,
            Rect::new(5.0, 0.0, 1.0, 1.0),
            1.0,
            t0 + Duration::from_millis(50),
        );
        assert_eq!(history.predict().map(|p| p.confidence), Some(0.0));
    }
}
