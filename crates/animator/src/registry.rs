use std::collections::HashMap;
use std::time::{Duration, Instant};

use renderer::Rect;

use crate::host::WindowId;

/// Normalized animation time, `elapsed / duration` clamped to `[0, 1]`.
pub fn progress_at(elapsed: Duration, duration: Duration) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0) as f32
}

/// One closing window being animated.
#[derive(Debug, Clone)]
pub struct AnimationRecord<I> {
    pub window: WindowId,
    /// Global position and size, frozen when the animation started.
    pub geometry: Rect,
    pub start: Instant,
    pub duration: Duration,
    pub seed: [f32; 2],
    pub image: Option<I>,
}

impl<I> AnimationRecord<I> {
    pub fn progress(&self, now: Instant) -> f32 {
        progress_at(now.saturating_duration_since(self.start), self.duration)
    }

    /// True until the full `duration` has elapsed since `start`.
    pub fn is_active(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.start) < self.duration
    }
}

/// Animations keyed by window, at most one per window.
#[derive(Debug)]
pub struct AnimationRegistry<I> {
    records: HashMap<WindowId, AnimationRecord<I>>,
}

impl<I> Default for AnimationRegistry<I> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
        }
    }
}

impl<I> AnimationRegistry<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `record` unless its window is already animating.
    ///
    /// Returns `false` and leaves the existing record untouched on a repeat.
    pub fn insert(&mut self, record: AnimationRecord<I>) -> bool {
        if self.records.contains_key(&record.window) {
            return false;
        }
        self.records.insert(record.window, record);
        true
    }

    pub fn contains(&self, window: WindowId) -> bool {
        self.records.contains_key(&window)
    }

    pub fn get(&self, window: WindowId) -> Option<&AnimationRecord<I>> {
        self.records.get(&window)
    }

    pub fn remove(&mut self, window: WindowId) -> Option<AnimationRecord<I>> {
        self.records.remove(&window)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnimationRecord<I>> {
        self.records.values()
    }

    /// Drops every record whose duration has elapsed and returns their windows.
    pub fn prune(&mut self, now: Instant) -> Vec<WindowId> {
        let finished: Vec<WindowId> = self
            .records
            .values()
            .filter(|record| !record.is_active(now))
            .map(|record| record.window)
            .collect();
        for window in &finished {
            self.records.remove(window);
        }
        finished
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn record(id: u64, start: Instant, millis: u64) -> AnimationRecord<()> {
        AnimationRecord {
            window: WindowId::new(id),
            geometry: Rect::new(0.0, 0.0, 100.0, 80.0),
            start,
            duration: Duration::from_millis(millis),
            seed: [1.0, 2.0],
            image: None,
        }
    }

    #[test]
    fn progress_reaches_one_at_duration() {
        let start = Instant::now();
        let record = record(1, start, 500);
        assert_eq!(record.progress(start), 0.0);
        assert!((record.progress(start + Duration::from_millis(250)) - 0.5).abs() < 1e-6);
        assert_eq!(record.progress(start + Duration::from_millis(500)), 1.0);
        assert_eq!(record.progress(start + Duration::from_secs(3)), 1.0);
    }

    #[test]
    fn progress_before_start_is_zero() {
        let start = Instant::now() + Duration::from_secs(1);
        assert_eq!(record(1, start, 500).progress(Instant::now()), 0.0);
    }

    #[test]
    fn repeat_insert_keeps_first_record() {
        let start = Instant::now();
        let mut registry = AnimationRegistry::new();
        assert!(registry.insert(record(7, start, 500)));
        let mut again = record(7, start + Duration::from_millis(100), 900);
        again.seed = [9.0, 9.0];
        assert!(!registry.insert(again));
        assert_eq!(registry.len(), 1);
        let kept = registry.get(WindowId::new(7)).unwrap();
        assert_eq!(kept.start, start);
        assert_eq!(kept.seed, [1.0, 2.0]);
    }

    #[test]
    fn prune_removes_only_finished_records() {
        let start = Instant::now();
        let mut registry = AnimationRegistry::new();
        registry.insert(record(1, start, 100));
        registry.insert(record(2, start, 1000));
        let finished = registry.prune(start + Duration::from_millis(100));
        assert_eq!(finished, vec![WindowId::new(1)]);
        assert!(registry.contains(WindowId::new(2)));
        assert!(registry.prune(start + Duration::from_millis(100)).is_empty());
        assert!(registry.remove(WindowId::new(1)).is_none());
    }

    #[test]
    fn record_survives_until_its_duration_elapses() {
        let start = Instant::now();
        let mut registry = AnimationRegistry::new();
        registry.insert(record(4, start, 500));
        let almost = start + Duration::from_millis(500) - Duration::from_nanos(10);
        assert!(registry.get(WindowId::new(4)).unwrap().is_active(almost));
        assert!(registry.prune(almost).is_empty());
        assert!(registry.contains(WindowId::new(4)));
        assert_eq!(
            registry.prune(start + Duration::from_millis(500)),
            vec![WindowId::new(4)]
        );
    }

    proptest! {
        #[test]
        fn progress_is_monotonic_and_clamped(
            a in 0u64..10_000_000,
            b in 0u64..10_000_000,
            duration in 1u64..5_000_000,
        ) {
            let (early, late) = if a <= b { (a, b) } else { (b, a) };
            let duration = Duration::from_micros(duration);
            let p_early = progress_at(Duration::from_micros(early), duration);
            let p_late = progress_at(Duration::from_micros(late), duration);
            prop_assert!((0.0..=1.0).contains(&p_early));
            prop_assert!(p_early <= p_late);
            if Duration::from_micros(late) >= duration {
                prop_assert_eq!(p_late, 1.0);
            }
        }

        #[test]
        fn record_present_iff_unfinished(elapsed in 0u64..2_000, duration in 1u64..1_000) {
            let start = Instant::now();
            let mut registry = AnimationRegistry::new();
            registry.insert(record(3, start, duration));
            let now = start + Duration::from_millis(elapsed);
            registry.prune(now);
            prop_assert_eq!(registry.contains(WindowId::new(3)), elapsed < duration);
        }
    }
}
