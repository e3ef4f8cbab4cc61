//! Confidence-weighted digit accumulation.

use serde::{Deserialize, Serialize};

use crate::tuning::Digit;

/// One digit vote and the weight it carries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DigitVote {
    pub digit: Digit,
    pub weight: f32,
}

/// A digit with its accumulated weight and share of the total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DigitShare {
    pub digit: Digit,
    pub weight: f32,
    /// Share of the total in percent.
    pub percent: f32,
}

/// Accumulated weight per digit. All nine digits are always present.
///
/// Weights only grow; the only way back to zero is [`DigitCounts::clear`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DigitCounts {
    weights: [f32; 9],
}

impl DigitCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `weight` to `digit`. Negative or non-finite weights are ignored.
    pub fn add(&mut self, digit: Digit, weight: f32) {
        if weight.is_finite() && weight > 0.0 {
            self.weights[digit.index()] += weight;
        }
    }

    pub fn add_vote(&mut self, vote: DigitVote) {
        self.add(vote.digit, vote.weight);
    }

    pub fn get(&self, digit: Digit) -> f32 {
        self.weights[digit.index()]
    }

    pub fn total(&self) -> f32 {
        self.weights.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() <= 0.0
    }

    pub fn clear(&mut self) {
        self.weights = [0.0; 9];
    }

    pub fn iter(&self) -> impl Iterator<Item = (Digit, f32)> + '_ {
        Digit::ALL.into_iter().map(|d| (d, self.get(d)))
    }

    /// The `n` heaviest digits with their percentage share.
    ///
    /// Ties go to the lower digit; digits without weight are left out, so an
    /// empty counter yields an empty summary.
    pub fn top(&self, n: usize) -> Vec<DigitShare> {
        let total = self.total();
        if total <= 0.0 {
            return Vec::new();
        }
        let mut ranked: Vec<(Digit, f32)> = self.iter().filter(|&(_, w)| w > 0.0).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(n)
            .map(|(digit, weight)| DigitShare {
                digit,
                weight,
                percent: weight / total * 100.0,
            })
            .collect()
    }

    /// The single heaviest digit, if any weight has been recorded.
    pub fn lead(&self) -> Option<Digit> {
        self.top(1).first().map(|share| share.digit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(v: u8) -> Digit {
        Digit::new(v).unwrap()
    }

    #[test]
    fn test_empty_counts() {
        let counts = DigitCounts::new();
        assert_eq!(counts.total(), 0.0);
        assert!(counts.top(3).is_empty());
        assert!(counts.lead().is_none());
        assert_eq!(counts.iter().count(), 9);
    }

    #[test]
    fn test_rejects_negative_and_nan() {
        let mut counts = DigitCounts::new();
        counts.add(d(3), -1.0);
        counts.add(d(3), f32::NAN);
        counts.add(d(3), f32::INFINITY);
        assert_eq!(counts.get(d(3)), 0.0);
    }

    #[test]
    fn test_top_shares() {
        let mut counts = DigitCounts::new();
        counts.add(d(2), 3.0);
        counts.add(d(7), 1.0);
        counts.add(d(5), 1.0);
        counts.add_vote(DigitVote {
            digit: d(9),
            weight: 5.0,
        });

        let top = counts.top(3);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].digit, d(9));
        assert!((top[0].percent - 50.0).abs() < 1e-4);
        assert_eq!(top[1].digit, d(2));
        // tie between 5 and 7 goes to the lower digit
        assert_eq!(top[2].digit, d(5));
        assert_eq!(counts.lead(), Some(d(9)));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut counts = DigitCounts::new();
        counts.add(d(1), 2.0);
        counts.clear();
        assert!(counts.is_empty());
    }
}
