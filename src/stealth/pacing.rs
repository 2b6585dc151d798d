//! Humanization policy
//!
//! Simulates human interaction timing so automated runs do not hammer pages
//! at machine speed. The policy is a trait the action executor consults
//! before each interaction; swap in `NoPacing` to make tests instant.

use async_trait::async_trait;
use bezier_rs::Bezier;
use rand::Rng;
use std::time::Duration;

/// Classes of page interaction with distinct natural rhythms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Click,
    Type,
    Select,
    Navigate,
}

/// Pluggable interaction pacing.
#[async_trait]
pub trait PacingPolicy: Send + Sync + std::fmt::Debug {
    /// Suspend for however long a person would hesitate before this action.
    async fn pause_before(&self, kind: InteractionKind);

    /// Per-keystroke delay when typing into a field.
    fn typing_delay(&self) -> Duration;

    /// Intermediate cursor positions for a pointer move between two points.
    fn cursor_path(&self, start: (f64, f64), end: (f64, f64)) -> Vec<(f64, f64)>;
}

/// Human-like pacing: jittered pre-action pauses, Gaussian-ish typing delays,
/// Bezier cursor paths with random control-point deviation.
#[derive(Debug, Clone)]
pub struct HumanPacing {
    /// Control point deviation for cursor curves, px
    deviation: f64,
    /// Points per cursor path
    path_points: u32,
    /// Mean per-keystroke delay, ms
    mean_key_delay_ms: u64,
    /// Keystroke delay spread, ms
    key_delay_spread_ms: u64,
}

impl Default for HumanPacing {
    fn default() -> Self {
        Self {
            deviation: 40.0,
            path_points: 12,
            mean_key_delay_ms: 90,
            key_delay_spread_ms: 40,
        }
    }
}

impl HumanPacing {
    pub fn new() -> Self {
        Self::default()
    }

    fn pause_range(kind: InteractionKind) -> (u64, u64) {
        match kind {
            InteractionKind::Click => (120, 450),
            InteractionKind::Type => (80, 250),
            InteractionKind::Select => (150, 500),
            InteractionKind::Navigate => (300, 900),
        }
    }
}

#[async_trait]
impl PacingPolicy for HumanPacing {
    async fn pause_before(&self, kind: InteractionKind) {
        // Draw the delay before awaiting so the RNG guard is not held across
        // the suspension point.
        let (min, max) = Self::pause_range(kind);
        let delay = rand::thread_rng().gen_range(min..=max);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    fn typing_delay(&self) -> Duration {
        let spread = self.key_delay_spread_ms as f64;
        let delay = (rand::random::<f64>() * 2.0 - 1.0) * spread + self.mean_key_delay_ms as f64;
        Duration::from_millis(delay.max(10.0) as u64)
    }

    fn cursor_path(&self, start: (f64, f64), end: (f64, f64)) -> Vec<(f64, f64)> {
        let (dx, dy) = (end.0 - start.0, end.1 - start.1);

        let cp1 = (
            start.0 + dx * 0.25 + (rand::random::<f64>() - 0.5) * self.deviation,
            start.1 + dy * 0.25 + (rand::random::<f64>() - 0.5) * self.deviation,
        );
        let cp2 = (
            end.0 - dx * 0.25 + (rand::random::<f64>() - 0.5) * self.deviation,
            end.1 - dy * 0.25 + (rand::random::<f64>() - 0.5) * self.deviation,
        );

        let bezier = Bezier::from_cubic_coordinates(
            start.0, start.1, cp1.0, cp1.1, cp2.0, cp2.1, end.0, end.1,
        );

        (0..=self.path_points)
            .map(|i| {
                let t = f64::from(i) / f64::from(self.path_points);
                let point = bezier.evaluate(bezier_rs::TValue::Euclidean(t));
                (point[0], point[1])
            })
            .collect()
    }
}

/// Pacing disabled: no pauses, instant typing, straight two-point paths.
#[derive(Debug, Clone, Default)]
pub struct NoPacing;

#[async_trait]
impl PacingPolicy for NoPacing {
    async fn pause_before(&self, _kind: InteractionKind) {}

    fn typing_delay(&self) -> Duration {
        Duration::ZERO
    }

    fn cursor_path(&self, start: (f64, f64), end: (f64, f64)) -> Vec<(f64, f64)> {
        vec![start, end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_path_endpoints() {
        let pacing = HumanPacing::new();
        let path = pacing.cursor_path((0.0, 0.0), (200.0, 120.0));
        assert!(path.len() > 2);

        let first = path.first().unwrap();
        let last = path.last().unwrap();
        assert!((first.0 - 0.0).abs() < 1.0 && (first.1 - 0.0).abs() < 1.0);
        assert!((last.0 - 200.0).abs() < 1.0 && (last.1 - 120.0).abs() < 1.0);
    }

    #[test]
    fn test_typing_delay_floor() {
        let pacing = HumanPacing::new();
        for _ in 0..100 {
            assert!(pacing.typing_delay() >= Duration::from_millis(10));
        }
    }

    #[test]
    fn test_no_pacing_is_instant() {
        let start = std::time::Instant::now();
        tokio_test::block_on(NoPacing.pause_before(InteractionKind::Navigate));
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(NoPacing.typing_delay(), Duration::ZERO);
    }
}
