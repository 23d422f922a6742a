// CART regression tree with squared-error splits.

use dugout_core::{AnalysisError, Result};

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParams {
    /// `None` grows until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    root: Node,
    /// Total squared-error reduction credited to each feature.
    importances: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    /// Sorted position where the right side starts.
    position: usize,
    sse: f64,
    order: Vec<usize>,
}

pub(crate) fn validate_training(x: &[Vec<f64>], y: &[f64]) -> Result<usize> {
    let Some(first) = x.first() else {
        return Err(AnalysisError::validation("cannot train on an empty matrix"));
    };
    if x.len() != y.len() {
        return Err(AnalysisError::validation(format!(
            "length mismatch: {} rows, {} targets",
            x.len(),
            y.len()
        )));
    }
    let dims = first.len();
    if dims == 0 || x.iter().any(|row| row.len() != dims) {
        return Err(AnalysisError::validation("rows must share a non-zero feature count"));
    }
    Ok(dims)
}

fn sse_of(y: &[f64], indices: &[usize]) -> (f64, f64) {
    let n = indices.len() as f64;
    let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / n;
    let sse = indices.iter().map(|&i| (y[i] - mean).powi(2)).sum();
    (mean, sse)
}

fn find_best_split(x: &[Vec<f64>], y: &[f64], indices: &[usize], dims: usize) -> Option<BestSplit> {
    let n = indices.len();
    let mut best: Option<BestSplit> = None;

    for feature in 0..dims {
        let mut order = indices.to_vec();
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let total_sum: f64 = order.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = order.iter().map(|&i| y[i] * y[i]).sum();
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        let mut candidate: Option<(usize, f64)> = None;

        for pos in 1..n {
            let prev = order[pos - 1];
            left_sum += y[prev];
            left_sq += y[prev] * y[prev];
            if x[prev][feature] == x[order[pos]][feature] {
                continue;
            }
            let nl = pos as f64;
            let nr = (n - pos) as f64;
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / nl) + (right_sq - right_sum * right_sum / nr);
            if candidate.map_or(true, |(_, s)| sse < s) {
                candidate = Some((pos, sse));
            }
        }

        if let Some((position, sse)) = candidate {
            if best.as_ref().map_or(true, |b| sse < b.sse) {
                let lo = x[order[position - 1]][feature];
                let hi = x[order[position]][feature];
                let mut threshold = lo + (hi - lo) / 2.0;
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some(BestSplit {
                    feature,
                    threshold,
                    position,
                    sse: sse.max(0.0),
                    order,
                });
            }
        }
    }
    best
}

fn grow(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &[usize],
    depth: usize,
    params: TreeParams,
    importances: &mut [f64],
) -> Node {
    let (mean, sse) = sse_of(y, indices);
    let depth_reached = params.max_depth.is_some_and(|max| depth >= max);
    if indices.len() < params.min_samples_split.max(2) || depth_reached || sse <= 1e-12 {
        return Node::Leaf { value: mean };
    }

    let Some(split) = find_best_split(x, y, indices, importances.len()) else {
        return Node::Leaf { value: mean };
    };
    importances[split.feature] += (sse - split.sse).max(0.0);

    let (left, right) = split.order.split_at(split.position);
    Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: Box::new(grow(x, y, left, depth + 1, params, importances)),
        right: Box::new(grow(x, y, right, depth + 1, params, importances)),
    }
}

impl RegressionTree {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: TreeParams) -> Result<Self> {
        validate_training(x, y)?;
        let indices: Vec<usize> = (0..x.len()).collect();
        Ok(Self::fit_indices(x, y, &indices, params))
    }

    /// Fit on the rows named by `indices`, which may repeat (bootstrap
    /// samples). Inputs must already be validated and `indices` non-empty.
    pub(crate) fn fit_indices(
        x: &[Vec<f64>],
        y: &[f64],
        indices: &[usize],
        params: TreeParams,
    ) -> Self {
        let dims = x.first().map_or(0, Vec::len);
        let mut importances = vec![0.0; dims];
        let root = grow(x, y, indices, 0, params, &mut importances);
        Self { root, importances }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(f64::NAN);
                    node = if v <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Unnormalized squared-error reduction per feature.
    pub fn raw_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }

    pub fn leaf_count(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => walk(left) + walk(right),
            }
        }
        walk(&self.root)
    }
}
