// Bounded, insertion-ordered emotion history

use crate::types::{EmotionLabel, EmotionSample};
use std::collections::{HashMap, VecDeque};

/// FIFO ring of the most recent samples. Never grows past its capacity.
#[derive(Debug, Clone)]
pub struct EmotionHistory {
    samples: VecDeque<EmotionSample>,
    capacity: usize,
}

impl EmotionHistory {
    /// Create a history holding at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full.
    /// Returns the evicted sample, if any.
    pub fn push(&mut self, sample: EmotionSample) -> Option<EmotionSample> {
        let evicted = if self.samples.len() >= self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Most recent sample
    pub fn last(&self) -> Option<&EmotionSample> {
        self.samples.back()
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &EmotionSample> + ExactSizeIterator {
        self.samples.iter()
    }

    /// The newest `n` samples, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &EmotionSample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip)
    }

    pub fn labels(&self) -> Vec<EmotionLabel> {
        self.samples.iter().map(|s| s.label.clone()).collect()
    }

    /// Count of each label among the newest `n` samples
    pub fn distribution(&self, n: usize) -> HashMap<EmotionLabel, usize> {
        let mut counts = HashMap::new();
        for sample in self.recent(n) {
            *counts.entry(sample.label.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// True iff the newest `n` entries exist and are all negative (angry or sad).
/// A window of zero never matches.
pub fn detect_pattern(history: &EmotionHistory, n: usize) -> bool {
    if n == 0 || history.len() < n {
        return false;
    }
    history.recent(n).all(|s| s.label.is_negative())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(label: EmotionLabel) -> EmotionSample {
        EmotionSample::new(label, 0.9)
    }

    fn label_from(i: u8) -> EmotionLabel {
        EmotionLabel::from_index((i % 4) as usize).unwrap()
    }

    #[test]
    fn test_fifo_eviction_keeps_newest() {
        // a..f map to six distinguishable confidences
        let mut history = EmotionHistory::new(4);
        for i in 0..6 {
            history.push(EmotionSample::new(EmotionLabel::Happy, i as f32 / 10.0));
        }
        let kept: Vec<f32> = history.iter().map(|s| s.confidence).collect();
        assert_eq!(kept, vec![0.2, 0.3, 0.4, 0.5]);
    }

    #[test]
    fn test_push_returns_evicted() {
        let mut history = EmotionHistory::new(1);
        assert!(history.push(sample(EmotionLabel::Sad)).is_none());
        let evicted = history.push(sample(EmotionLabel::Happy)).unwrap();
        assert_eq!(evicted.label, EmotionLabel::Sad);
        assert_eq!(history.last().unwrap().label, EmotionLabel::Happy);
    }

    #[test]
    fn test_zero_capacity_is_promoted() {
        let history = EmotionHistory::new(0);
        assert_eq!(history.capacity(), 1);
    }

    #[test]
    fn test_pattern_all_positive() {
        let mut history = EmotionHistory::new(10);
        for _ in 0..3 {
            history.push(sample(EmotionLabel::Happy));
        }
        assert!(!detect_pattern(&history, 3));
    }

    #[test]
    fn test_pattern_all_negative() {
        let mut history = EmotionHistory::new(10);
        for label in [EmotionLabel::Sad, EmotionLabel::Angry, EmotionLabel::Sad] {
            history.push(sample(label));
        }
        assert!(detect_pattern(&history, 3));
    }

    #[test]
    fn test_pattern_needs_n_entries() {
        let mut history = EmotionHistory::new(10);
        history.push(sample(EmotionLabel::Sad));
        history.push(sample(EmotionLabel::Sad));
        assert!(!detect_pattern(&history, 3));
        assert!(!detect_pattern(&history, 0));
    }

    #[test]
    fn test_pattern_only_looks_at_tail() {
        let mut history = EmotionHistory::new(10);
        history.push(sample(EmotionLabel::Happy));
        for _ in 0..3 {
            history.push(sample(EmotionLabel::Angry));
        }
        assert!(detect_pattern(&history, 3));
        assert!(!detect_pattern(&history, 4));
    }

    #[test]
    fn test_distribution_counts_recent_window() {
        let mut history = EmotionHistory::new(10);
        for label in [
            EmotionLabel::Sad,
            EmotionLabel::Happy,
            EmotionLabel::Happy,
            EmotionLabel::Relaxed,
        ] {
            history.push(sample(label));
        }
        let dist = history.distribution(3);
        assert_eq!(dist.get(&EmotionLabel::Happy), Some(&2));
        assert_eq!(dist.get(&EmotionLabel::Relaxed), Some(&1));
        assert_eq!(dist.get(&EmotionLabel::Sad), None);
    }

    proptest! {
        #[test]
        fn prop_len_never_exceeds_capacity(capacity in 1usize..64, labels in prop::collection::vec(any::<u8>(), 0..300)) {
            let mut history = EmotionHistory::new(capacity);
            for l in &labels {
                history.push(sample(label_from(*l)));
                prop_assert!(history.len() <= capacity);
            }
            let expected: Vec<EmotionLabel> = labels
                .iter()
                .skip(labels.len().saturating_sub(capacity))
                .map(|l| label_from(*l))
                .collect();
            prop_assert_eq!(history.labels(), expected);
        }

        #[test]
        fn prop_pattern_matches_tail(n in 1usize..6, labels in prop::collection::vec(any::<u8>(), 0..20)) {
            let mut history = EmotionHistory::new(32);
            for l in &labels {
                history.push(sample(label_from(*l)));
            }
            let expected = labels.len() >= n
                && labels[labels.len() - n..].iter().all(|l| label_from(*l).is_negative());
            prop_assert_eq!(detect_pattern(&history, n), expected);
        }
    }
}
