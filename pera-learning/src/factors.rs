//! Success/failure factor extraction (`spec.md` §4.6 step 3b): fit a small
//! logistic classifier predicting episode success from a handful of
//! numeric features, then rank those features by permutation importance
//! — the accuracy drop from shuffling one column — keeping any feature
//! whose importance clears 0.1. Generalizes the teacher's weighted
//! `RewardCalculator` scoring idiom (`memory-core/src/reward.rs`) from a
//! fixed two-factor formula to a learned, ranked factor list.

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::features::EpisodeFeatures;

const FEATURE_NAMES: [&str; 4] = ["duration_secs", "task_count", "unique_tools", "total_retries"];

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

fn dot(weights: &[f32], x: &[f32]) -> f32 {
    weights.iter().zip(x).map(|(w, v)| w * v).sum()
}

struct LogisticModel {
    weights: Vec<f32>,
    bias: f32,
}

impl LogisticModel {
    fn train(features: &[Vec<f32>], labels: &[f32], epochs: usize, lr: f32) -> Self {
        let dim = features[0].len();
        let mut weights = vec![0.0f32; dim];
        let mut bias = 0.0f32;
        let n = features.len() as f32;

        for _ in 0..epochs {
            let mut grad_w = vec![0.0f32; dim];
            let mut grad_b = 0.0f32;
            for (x, &y) in features.iter().zip(labels) {
                let pred = sigmoid(dot(&weights, x) + bias);
                let err = pred - y;
                for (g, v) in grad_w.iter_mut().zip(x) {
                    *g += err * v;
                }
                grad_b += err;
            }
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= lr * g / n;
            }
            bias -= lr * grad_b / n;
        }

        Self { weights, bias }
    }

    fn predict(&self, x: &[f32]) -> f32 {
        sigmoid(dot(&self.weights, x) + self.bias)
    }

    fn accuracy(&self, features: &[Vec<f32>], labels: &[f32]) -> f32 {
        let correct = features
            .iter()
            .zip(labels)
            .filter(|(x, &y)| {
                let predicted = if self.predict(x) >= 0.5 { 1.0 } else { 0.0 };
                (predicted - y).abs() < f32::EPSILON
            })
            .count();
        correct as f32 / features.len() as f32
    }
}

fn to_feature_row(f: &EpisodeFeatures) -> Vec<f32> {
    vec![f.duration_secs, f.task_count as f32, f.unique_tools as f32, f.total_retries as f32]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorImportance {
    pub feature: String,
    pub importance: f32,
}

/// Permutation importance over a logistic success/failure classifier,
/// returning every feature whose importance exceeds 0.1, ranked
/// descending. Returns an empty list when there are too few episodes or
/// the outcome has no variance to learn from (e.g. every episode
/// succeeded).
#[must_use]
pub fn analyze(features: &[EpisodeFeatures], seed: u64) -> Vec<FactorImportance> {
    if features.len() < 10 {
        return Vec::new();
    }
    let rows: Vec<Vec<f32>> = features.iter().map(to_feature_row).collect();
    let labels: Vec<f32> = features.iter().map(|f| if f.succeeded { 1.0 } else { 0.0 }).collect();
    let positive = labels.iter().filter(|&&y| y > 0.5).count();
    if positive == 0 || positive == labels.len() {
        return Vec::new();
    }

    let model = LogisticModel::train(&rows, &labels, 200, 0.1);
    let base_accuracy = model.accuracy(&rows, &labels);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut importances: Vec<FactorImportance> = Vec::new();
    for (dim, name) in FEATURE_NAMES.iter().enumerate() {
        let mut permuted = rows.clone();
        let mut column: Vec<f32> = permuted.iter().map(|r| r[dim]).collect();
        column.shuffle(&mut rng);
        for (row, value) in permuted.iter_mut().zip(column) {
            row[dim] = value;
        }
        let permuted_accuracy = model.accuracy(&permuted, &labels);
        let importance = (base_accuracy - permuted_accuracy).max(0.0);
        importances.push(FactorImportance { feature: (*name).to_string(), importance });
    }

    importances.retain(|f| f.importance > 0.1);
    importances.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    importances
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(duration: f32, succeeded: bool) -> EpisodeFeatures {
        EpisodeFeatures {
            episode_id: uuid::Uuid::new_v4(),
            duration_secs: duration,
            task_count: 2,
            success_rate: if succeeded { 1.0 } else { 0.0 },
            unique_tools: 1,
            tool_usage: std::collections::HashMap::new(),
            total_retries: 0,
            succeeded,
        }
    }

    #[test]
    fn total_retries_surfaces_as_a_factor_when_it_predicts_outcome() {
        let mut features = Vec::new();
        for _ in 0..15 {
            let mut succeeding = feature(1.0, true);
            succeeding.total_retries = 0;
            features.push(succeeding);
            let mut failing = feature(1.0, false);
            failing.total_retries = 5;
            features.push(failing);
        }
        let factors = analyze(&features, 7);
        assert!(factors.iter().any(|f| f.feature == "total_retries"));
    }

    #[test]
    fn too_few_episodes_yields_no_factors() {
        let features = vec![feature(1.0, true), feature(2.0, false)];
        assert!(analyze(&features, 0).is_empty());
    }

    #[test]
    fn duration_surfaces_as_a_factor_when_it_predicts_outcome() {
        let mut features = Vec::new();
        for _ in 0..15 {
            features.push(feature(1.0, true));
            features.push(feature(100.0, false));
        }
        let factors = analyze(&features, 42);
        assert!(factors.iter().any(|f| f.feature == "duration_secs"));
    }
}
