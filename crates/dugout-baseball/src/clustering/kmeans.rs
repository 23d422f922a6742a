// K-means clustering with k-means++ seeding and an elbow sweep.
//
// Runs are seeded, so the same data, k and seed always give the same labels.
// Each fit keeps the best of `n_init` restarts by inertia.

use dugout_core::config::ClusteringConfig;
use dugout_core::{AnalysisError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    pub k: usize,
    pub n_init: usize,
    pub max_iter: usize,
    /// Convergence tolerance, relative to the mean per-feature variance.
    pub tolerance: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KMeansFit {
    pub centroids: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    /// Sum of squared distances of points to their centroid.
    pub inertia: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ElbowPoint {
    pub k: usize,
    pub inertia: f64,
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Closest centroid and its squared distance. Ties go to the lowest index.
fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(point, centroid);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

impl KMeansFit {
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    pub fn predict(&self, point: &[f64]) -> usize {
        nearest(point, &self.centroids).0
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k()];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    /// Row indices assigned to `cluster`, in input order.
    pub fn members(&self, cluster: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &label)| label == cluster)
            .map(|(i, _)| i)
            .collect()
    }
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-4,
            seed: 42,
        }
    }

    pub fn from_config(config: &ClusteringConfig) -> Self {
        Self {
            k: config.k,
            n_init: config.n_init,
            max_iter: config.max_iter,
            tolerance: config.tolerance,
            seed: config.seed,
        }
    }

    /// Same settings with a different cluster count.
    pub fn with_k(&self, k: usize) -> Self {
        Self { k, ..self.clone() }
    }

    pub fn fit(&self, data: &[Vec<f64>]) -> Result<KMeansFit> {
        let n = data.len();
        if self.k == 0 {
            return Err(AnalysisError::validation("k must be > 0"));
        }
        if self.k > n {
            return Err(AnalysisError::validation(format!(
                "cannot form {} clusters from {} rows",
                self.k, n
            )));
        }
        let dims = data[0].len();
        if data.iter().any(|row| row.len() != dims) {
            return Err(AnalysisError::validation("rows have differing feature counts"));
        }

        let tol = self.tolerance * mean_variance(data);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<KMeansFit> = None;
        for run in 0..self.n_init.max(1) {
            let fit = self.run_once(data, &mut rng, tol);
            debug!(
                "k-means k={} run {}: inertia {:.4} after {} iterations",
                self.k, run, fit.inertia, fit.iterations
            );
            if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }
        best.ok_or_else(|| AnalysisError::validation("k-means produced no runs"))
    }

    fn run_once(&self, data: &[Vec<f64>], rng: &mut StdRng, tol: f64) -> KMeansFit {
        let dims = data[0].len();
        let mut centroids = plus_plus_init(data, self.k, rng);
        let mut labels = vec![0usize; data.len()];
        let mut iterations = 0;

        for iter in 0..self.max_iter {
            iterations = iter + 1;
            let mut dists = vec![0.0; data.len()];
            for (i, point) in data.iter().enumerate() {
                let (c, d) = nearest(point, &centroids);
                labels[i] = c;
                dists[i] = d;
            }

            let mut sums = vec![vec![0.0; dims]; self.k];
            let mut counts = vec![0usize; self.k];
            for (point, &label) in data.iter().zip(&labels) {
                counts[label] += 1;
                for (s, v) in sums[label].iter_mut().zip(point) {
                    *s += v;
                }
            }

            let mut updated = Vec::with_capacity(self.k);
            for (c, sum) in sums.into_iter().enumerate() {
                if counts[c] == 0 {
                    // Relocate an empty cluster onto the worst-served point.
                    let far = dists
                        .iter()
                        .enumerate()
                        .max_by(|a, b| a.1.total_cmp(b.1))
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    dists[far] = 0.0;
                    updated.push(data[far].clone());
                } else {
                    let count = counts[c] as f64;
                    updated.push(sum.into_iter().map(|s| s / count).collect());
                }
            }

            let shift: f64 = centroids
                .iter()
                .zip(&updated)
                .map(|(old, new)| squared_distance(old, new))
                .sum();
            centroids = updated;
            if shift <= tol {
                break;
            }
        }

        let mut inertia = 0.0;
        for (i, point) in data.iter().enumerate() {
            let (c, d) = nearest(point, &centroids);
            labels[i] = c;
            inertia += d;
        }

        KMeansFit {
            centroids,
            labels,
            inertia,
            iterations,
        }
    }
}

fn mean_variance(data: &[Vec<f64>]) -> f64 {
    let n = data.len() as f64;
    let dims = data[0].len();
    if dims == 0 {
        return 0.0;
    }
    let total: f64 = (0..dims)
        .map(|d| {
            let mean = data.iter().map(|r| r[d]).sum::<f64>() / n;
            data.iter().map(|r| (r[d] - mean).powi(2)).sum::<f64>() / n
        })
        .sum();
    total / dims as f64
}

/// k-means++ seeding: each next center is drawn with probability
/// proportional to its squared distance from the nearest chosen center.
fn plus_plus_init(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = data.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.gen_range(0..n)].clone());
    let mut weights: Vec<f64> = data
        .iter()
        .map(|p| squared_distance(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = weights.iter().sum();
        let next = if total <= 0.0 {
            // Every point coincides with a center already.
            rng.gen_range(0..n)
        } else {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = weights.iter().rposition(|&w| w > 0.0).unwrap_or(0);
            for (i, &w) in weights.iter().enumerate() {
                if target < w {
                    chosen = i;
                    break;
                }
                target -= w;
            }
            chosen
        };
        let center = data[next].clone();
        for (w, p) in weights.iter_mut().zip(data) {
            *w = w.min(squared_distance(p, &center));
        }
        centroids.push(center);
    }
    centroids
}

/// Inertia for every k from 1 to `max_k` (capped at the row count), using
/// the other settings of `template`.
pub fn elbow(data: &[Vec<f64>], max_k: usize, template: &KMeans) -> Result<Vec<ElbowPoint>> {
    let upper = max_k.min(data.len());
    if upper == 0 {
        return Err(AnalysisError::validation("elbow sweep needs at least one row and k"));
    }
    (1..=upper)
        .map(|k| {
            template.with_k(k).fit(data).map(|fit| ElbowPoint {
                k,
                inertia: fit.inertia,
            })
        })
        .collect()
}
