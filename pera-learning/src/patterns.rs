use pera_types::episode::Episode;
use uuid::Uuid;

use crate::clustering::{adaptive_eps, dbscan};
use crate::features::{self, EpisodeFeatures};

/// One non-noise cluster of episodes whose tool-usage vectors fell within
/// `eps` of each other (`spec.md` §4.6 step 3).
#[derive(Debug, Clone)]
pub struct PatternCluster {
    pub episode_ids: Vec<Uuid>,
    /// The cluster member whose task count matches the cluster's modal
    /// length, used as the representative sequence for abstraction.
    pub representative: Uuid,
    pub size: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PatternReport {
    pub clusters: Vec<PatternCluster>,
    pub noise_count: usize,
}

fn mode(values: &[usize]) -> usize {
    let mut counts = std::collections::HashMap::new();
    for &v in values {
        *counts.entry(v).or_insert(0usize) += 1;
    }
    counts.into_iter().max_by_key(|(_, count)| *count).map_or(0, |(value, _)| value)
}

/// Cluster the tool-frequency vectors of episodes whose success ratio
/// exceeds `success_fraction_threshold`, using either a fixed `eps` or an
/// adaptively derived one when `eps` is `None` (`spec.md` §4.6 step 3,
/// grounded in the teacher's DBSCAN module with the feature vector
/// redefined from episode-level features to tool-usage frequency).
#[must_use]
pub fn detect(
    episodes: &[Episode],
    feature_rows: &[EpisodeFeatures],
    success_fraction_threshold: f32,
    eps: Option<f32>,
    min_samples: usize,
) -> PatternReport {
    let qualifying: Vec<usize> = feature_rows
        .iter()
        .enumerate()
        .filter(|(_, f)| f.success_rate >= success_fraction_threshold)
        .map(|(i, _)| i)
        .collect();
    if qualifying.len() < min_samples {
        return PatternReport::default();
    }

    let qualifying_features: Vec<&EpisodeFeatures> = qualifying.iter().map(|&i| &feature_rows[i]).collect();
    let vocabulary = features::tool_vocabulary(&qualifying_features);
    if vocabulary.is_empty() {
        return PatternReport::default();
    }
    let vectors: Vec<Vec<f64>> =
        qualifying_features.iter().map(|f| features::tool_frequency_vector(f, &vocabulary)).collect();

    let eps = eps.map(f64::from).unwrap_or_else(|| adaptive_eps(&vectors, min_samples));
    let labels = dbscan(eps, min_samples, &vectors);

    let mut groups: std::collections::HashMap<isize, Vec<usize>> = std::collections::HashMap::new();
    let mut noise_count = 0usize;
    for (local_idx, &label) in labels.iter().enumerate() {
        if label < 0 {
            noise_count += 1;
        } else {
            groups.entry(label).or_default().push(local_idx);
        }
    }

    let mut clusters: Vec<PatternCluster> = Vec::new();
    for members in groups.into_values() {
        if members.len() < min_samples {
            noise_count += members.len();
            continue;
        }
        let episode_indices: Vec<usize> = members.iter().map(|&local| qualifying[local]).collect();
        let lengths: Vec<usize> = episode_indices.iter().map(|&i| feature_rows[i].task_count).collect();
        let modal_length = mode(&lengths);
        let representative_idx = episode_indices
            .iter()
            .copied()
            .find(|&i| feature_rows[i].task_count == modal_length)
            .unwrap_or(episode_indices[0]);

        clusters.push(PatternCluster {
            episode_ids: episode_indices.iter().map(|&i| episodes[i].id).collect(),
            representative: episodes[representative_idx].id,
            size: episode_indices.len(),
        });
    }

    PatternReport { clusters, noise_count }
}
