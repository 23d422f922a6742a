// Pipelines: configuration + records in, owned report values out.
//
// Each `*_report` function runs one analysis over records that are already
// loaded. The `run_*` wrappers add the CSV load for that section, and `run`
// executes every section present in the config.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

use dugout_baseball::clustering::kmeans::{elbow, ElbowPoint, KMeans};
use dugout_baseball::clustering::pca::Pca;
use dugout_baseball::clustering::standardize::StandardScaler;
use dugout_baseball::features::FeatureMatrix;
use dugout_baseball::regression::forest::RandomForest;
use dugout_baseball::regression::metrics::{r2_score, rmse};
use dugout_baseball::regression::split::train_test_split;
use dugout_baseball::similarity::centrality::{degree_centrality, ego_network, season_cohort};
use dugout_baseball::similarity::distance::DistanceMatrix;
use dugout_baseball::similarity::graph::{GraphConfig, SimilarityGraph};
use dugout_baseball::similarity::normalize::NormalizedSet;
use dugout_baseball::similarity::ranking::SimilarityRanker;
use dugout_core::config::{
    ClusteringConfig, Config, MissingPolicy, NetworkConfig, RegressionConfig, SimilarityConfig,
};
use dugout_core::records::{
    column_mean, distinct_seasons, filter_team, load_records, LoadOptions, StatRecord,
};
use dugout_core::{AnalysisError, Result};

// ---------------------------------------------------------------------------
// Shared report rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatCell {
    pub column: String,
    pub value: Option<f64>,
}

/// Raw (unnormalized) view of one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRow {
    pub season: i32,
    pub name: String,
    pub team: String,
    pub stats: Vec<StatCell>,
}

impl EntityRow {
    pub fn from_record(record: &StatRecord, columns: &[String]) -> Self {
        Self {
            season: record.season,
            name: record.name.clone(),
            team: record.team.clone(),
            stats: columns
                .iter()
                .map(|c| StatCell {
                    column: c.clone(),
                    value: record.stat(c),
                })
                .collect(),
        }
    }
}

fn cells(columns: &[String], value: impl Fn(&str) -> Option<f64>) -> Vec<StatCell> {
    columns
        .iter()
        .map(|c| StatCell {
            column: c.clone(),
            value: value(c),
        })
        .collect()
}

/// `base` followed by each of `extra` not already in it.
fn union_columns(base: &[String], extra: &[String]) -> Vec<String> {
    let mut columns = base.to_vec();
    for column in extra {
        if !columns.contains(column) {
            columns.push(column.clone());
        }
    }
    columns
}

// ---------------------------------------------------------------------------
// Similarity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct NeighborRow {
    pub rank: usize,
    pub entity: EntityRow,
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub query: String,
    /// The query's own raw stats, absent when it was not found.
    pub entity: Option<EntityRow>,
    pub error: Option<String>,
    pub neighbors: Vec<NeighborRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarityReport {
    pub features: Vec<String>,
    pub candidates: usize,
    pub queries: Vec<QueryReport>,
}

pub fn similarity_report(
    records: &[StatRecord],
    config: &SimilarityConfig,
) -> Result<SimilarityReport> {
    let set = NormalizedSet::fit(records, &config.features, config.missing)?;
    info!(
        "similarity: {} candidates over {} features",
        set.len(),
        config.features.len()
    );
    let ranker = SimilarityRanker::new(&set)
        .with_top_k(config.top_k)
        .excluding_same_player(config.exclude_same_player);

    let queries = ranker
        .rank_all(&config.queries)
        .into_iter()
        .map(|outcome| {
            let neighbors = outcome
                .neighbors()
                .iter()
                .map(|n| NeighborRow {
                    rank: n.rank,
                    entity: EntityRow::from_record(n.record, &config.features),
                    distance: n.distance,
                })
                .collect();
            QueryReport {
                query: outcome.key.to_string(),
                entity: outcome
                    .result
                    .as_ref()
                    .ok()
                    .map(|r| EntityRow::from_record(r.query, &config.features)),
                error: outcome.error().map(ToString::to_string),
                neighbors,
            }
        })
        .collect();

    Ok(SimilarityReport {
        features: config.features.clone(),
        candidates: set.len(),
        queries,
    })
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CentralRow {
    pub label: String,
    pub name: String,
    pub degree: usize,
    pub centrality: f64,
    /// Distinct seasons of this player within the analyzed group.
    pub seasons: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeRow {
    pub a: String,
    pub b: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubgraphSummary {
    pub focus: String,
    pub nodes: Vec<String>,
    pub edges: Vec<EdgeRow>,
}

impl SubgraphSummary {
    fn from_graph(focus: &str, graph: &SimilarityGraph) -> Self {
        Self {
            focus: focus.to_string(),
            nodes: graph.nodes().map(|n| n.label.clone()).collect(),
            edges: graph
                .edges()
                .into_iter()
                .map(|(a, b, weight)| EdgeRow {
                    a: a.to_string(),
                    b: b.to_string(),
                    weight,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    pub team: Option<String>,
    pub threshold: f64,
    pub node_count: usize,
    pub edge_count: usize,
    pub central: Vec<CentralRow>,
    /// Every season line of the central players, raw summary columns.
    pub season_lines: Vec<EntityRow>,
    pub ego_networks: Vec<SubgraphSummary>,
    pub cohorts: Vec<SubgraphSummary>,
    pub averages: Vec<StatCell>,
}

pub fn network_report(records: &[StatRecord], config: &NetworkConfig) -> Result<NetworkReport> {
    let group = match &config.team {
        Some(team) => filter_team(records, team),
        None => records.to_vec(),
    };
    if group.is_empty() {
        return Err(AnalysisError::validation(format!(
            "no rows for team {}",
            config.team.as_deref().unwrap_or("(any)")
        )));
    }

    let set = NormalizedSet::fit(&group, &config.features, config.missing)?;
    let distances = DistanceMatrix::compute(set.vectors())?;
    let graph = SimilarityGraph::build(&set, &distances, &GraphConfig::from(config))?;
    info!(
        "network: {} nodes, {} edges at threshold {}",
        graph.node_count(),
        graph.edge_count(),
        config.threshold
    );

    let central: Vec<CentralRow> = degree_centrality(&graph)
        .into_iter()
        .take(config.top_central)
        .map(|s| CentralRow {
            seasons: distinct_seasons(&group, &s.name),
            label: s.label,
            name: s.name,
            degree: s.degree,
            centrality: s.centrality,
        })
        .collect();

    let mut season_lines = Vec::new();
    let mut ego_networks = Vec::with_capacity(central.len());
    let mut cohorts = Vec::with_capacity(central.len());
    for row in &central {
        let mut lines: Vec<&StatRecord> = group.iter().filter(|r| r.name == row.name).collect();
        lines.sort_by_key(|r| r.season);
        season_lines.extend(
            lines
                .into_iter()
                .map(|r| EntityRow::from_record(r, &config.summary_columns)),
        );
        ego_networks.push(SubgraphSummary::from_graph(
            &row.label,
            &ego_network(&graph, &row.label)?,
        ));
        cohorts.push(SubgraphSummary::from_graph(
            &row.label,
            &season_cohort(&graph, &row.label, &group)?,
        ));
    }

    let averages = cells(&config.summary_columns, |c| column_mean(&group, c));

    Ok(NetworkReport {
        team: config.team.clone(),
        threshold: config.threshold,
        node_count: graph.node_count(),
        edge_count: graph.edge_count(),
        central,
        season_lines,
        ego_networks,
        cohorts,
        averages,
    })
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub size: usize,
    /// Top members by the ranking stat, highest first.
    pub leaders: Vec<EntityRow>,
    /// Mean raw feature values of the members.
    pub means: Vec<StatCell>,
    /// Centroid in principal-component space.
    pub projected_centroid: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectedRow {
    pub season: i32,
    pub name: String,
    pub cluster: usize,
    pub components: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusteringReport {
    pub features: Vec<String>,
    pub rows: usize,
    pub elbow: Vec<ElbowPoint>,
    pub k: usize,
    pub inertia: f64,
    pub explained_variance_ratio: Vec<f64>,
    pub clusters: Vec<ClusterSummary>,
    pub projection: Vec<ProjectedRow>,
}

pub fn clustering_report(
    records: &[StatRecord],
    config: &ClusteringConfig,
) -> Result<ClusteringReport> {
    let matrix = FeatureMatrix::build(records, &config.features, MissingPolicy::Drop)?;
    if matrix.is_empty() {
        return Err(AnalysisError::validation("no complete rows to cluster"));
    }
    let raw = matrix.values();
    let scaled = StandardScaler::fit(&raw)?.transform_all(&raw)?;

    let template = KMeans::from_config(config);
    let elbow = elbow(&scaled, config.max_k, &template)?;
    let fit = template.fit(&scaled)?;
    info!(
        "clustering: k={} over {} rows, inertia {:.3}",
        fit.k(),
        matrix.len(),
        fit.inertia
    );

    let pca = Pca::fit(&scaled, matrix.dims().min(2))?;
    let components = pca.transform_all(&scaled)?;

    let leader_columns = union_columns(&config.features, std::slice::from_ref(&config.rank_by));
    let mut clusters = Vec::with_capacity(fit.k());
    for cluster in 0..fit.k() {
        let members = fit.members(cluster);
        let mut ranked: Vec<&StatRecord> = members.iter().map(|&i| matrix.record(i)).collect();
        // Missing ranking stats sort last.
        ranked.sort_by(|a, b| {
            let a = a.stat(&config.rank_by).unwrap_or(f64::NEG_INFINITY);
            let b = b.stat(&config.rank_by).unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        });
        let leaders = ranked
            .into_iter()
            .take(config.top_per_cluster)
            .map(|r| EntityRow::from_record(r, &leader_columns))
            .collect();

        let means = cells(&config.features, |column| {
            let d = config.features.iter().position(|f| f == column)?;
            if members.is_empty() {
                return None;
            }
            Some(members.iter().map(|&i| raw[i][d]).sum::<f64>() / members.len() as f64)
        });

        clusters.push(ClusterSummary {
            cluster,
            size: members.len(),
            leaders,
            means,
            projected_centroid: pca.transform(&fit.centroids[cluster])?,
        });
    }

    let projection = components
        .into_iter()
        .enumerate()
        .map(|(i, components)| ProjectedRow {
            season: matrix.record(i).season,
            name: matrix.record(i).name.clone(),
            cluster: fit.labels[i],
            components,
        })
        .collect();

    Ok(ClusteringReport {
        features: config.features.clone(),
        rows: matrix.len(),
        elbow,
        k: fit.k(),
        inertia: fit.inertia,
        explained_variance_ratio: pca.explained_variance_ratio(),
        clusters,
        projection,
    })
}

// ---------------------------------------------------------------------------
// Regression
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PredictionRow {
    pub season: i32,
    pub name: String,
    pub team: String,
    pub actual: f64,
    pub predicted: f64,
    pub error: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportanceRow {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegressionReport {
    pub target: String,
    pub train_rows: usize,
    pub test_rows: usize,
    pub rmse: f64,
    pub r2: f64,
    pub worst: Vec<PredictionRow>,
    pub best: Vec<PredictionRow>,
    pub importances: Vec<ImportanceRow>,
}

pub fn regression_report(
    records: &[StatRecord],
    config: &RegressionConfig,
) -> Result<RegressionReport> {
    let columns = union_columns(&config.features, std::slice::from_ref(&config.target));
    if columns.len() == config.features.len() {
        return Err(AnalysisError::validation(format!(
            "target `{}` is also listed as a feature",
            config.target
        )));
    }
    let matrix = FeatureMatrix::build(records, &columns, MissingPolicy::Drop)?;
    let dims = config.features.len();
    let (x, y): (Vec<Vec<f64>>, Vec<f64>) = matrix
        .rows()
        .iter()
        .map(|row| (row.values[..dims].to_vec(), row.values[dims]))
        .unzip();

    let split = train_test_split(x.len(), config.test_fraction, config.seed)?;
    let train_x: Vec<Vec<f64>> = split.train.iter().map(|&i| x[i].clone()).collect();
    let train_y: Vec<f64> = split.train.iter().map(|&i| y[i]).collect();
    let test_x: Vec<Vec<f64>> = split.test.iter().map(|&i| x[i].clone()).collect();
    let test_y: Vec<f64> = split.test.iter().map(|&i| y[i]).collect();

    let scaler = StandardScaler::fit(&train_x)?;
    let model = RandomForest::from_config(config).fit(&scaler.transform_all(&train_x)?, &train_y)?;
    let predicted = model.predict_all(&scaler.transform_all(&test_x)?)?;

    let rmse = rmse(&test_y, &predicted)?;
    let r2 = r2_score(&test_y, &predicted)?;
    info!(
        "regression: {} train / {} test rows, RMSE {:.3}, R² {:.3}",
        split.train.len(),
        split.test.len(),
        rmse,
        r2
    );

    let mut rows: Vec<PredictionRow> = split
        .test
        .iter()
        .zip(&predicted)
        .map(|(&i, &p)| {
            let record = matrix.record(i);
            PredictionRow {
                season: record.season,
                name: record.name.clone(),
                team: record.team.clone(),
                actual: y[i],
                predicted: p,
                error: (y[i] - p).abs(),
            }
        })
        .collect();
    rows.sort_by(|a, b| a.error.total_cmp(&b.error));
    let best = rows.iter().take(config.best_predictions).cloned().collect();
    let worst = rows.iter().rev().take(config.worst_errors).cloned().collect();

    let mut importances: Vec<ImportanceRow> = config
        .features
        .iter()
        .zip(model.feature_importances())
        .map(|(feature, importance)| ImportanceRow {
            feature: feature.clone(),
            importance,
        })
        .collect();
    importances.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    Ok(RegressionReport {
        target: config.target.clone(),
        train_rows: split.train.len(),
        test_rows: split.test.len(),
        rmse,
        r2,
        worst,
        best,
        importances,
    })
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<SimilarityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clustering: Option<ClusteringReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regression: Option<RegressionReport>,
}

fn resolve(base_dir: &Path, data_path: &str) -> PathBuf {
    let path = Path::new(data_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn load(base_dir: &Path, data_path: &str, options: &LoadOptions) -> anyhow::Result<Vec<StatRecord>> {
    let path = resolve(base_dir, data_path);
    let records = load_records(&path, options)
        .with_context(|| format!("failed to load records from {}", path.display()))?;
    info!("loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

pub fn run_similarity(base_dir: &Path, config: &SimilarityConfig) -> anyhow::Result<SimilarityReport> {
    let options = LoadOptions::new(config.features.iter().cloned())
        .coerce_invalid(config.coerce_invalid);
    let records = load(base_dir, &config.data_path, &options)?;
    similarity_report(&records, config).context("similarity analysis failed")
}

pub fn run_network(base_dir: &Path, config: &NetworkConfig) -> anyhow::Result<NetworkReport> {
    let columns = union_columns(&config.features, &config.summary_columns);
    let options = LoadOptions::new(columns).coerce_invalid(config.coerce_invalid);
    let records = load(base_dir, &config.data_path, &options)?;
    network_report(&records, config).context("network analysis failed")
}

pub fn run_clustering(base_dir: &Path, config: &ClusteringConfig) -> anyhow::Result<ClusteringReport> {
    let columns = union_columns(&config.features, std::slice::from_ref(&config.rank_by));
    let records = load(base_dir, &config.data_path, &LoadOptions::new(columns))?;
    clustering_report(&records, config).context("clustering analysis failed")
}

pub fn run_regression(base_dir: &Path, config: &RegressionConfig) -> anyhow::Result<RegressionReport> {
    let columns = union_columns(&config.features, std::slice::from_ref(&config.target));
    let records = load(base_dir, &config.data_path, &LoadOptions::new(columns))?;
    regression_report(&records, config).context("regression analysis failed")
}

/// Run every configured section. Data paths resolve against `base_dir`.
pub fn run(config: &Config, base_dir: &Path) -> anyhow::Result<RunReport> {
    let mut report = RunReport::default();
    if let Some(section) = &config.similarity {
        report.similarity = Some(run_similarity(base_dir, section)?);
    }
    if let Some(section) = &config.network {
        report.network = Some(run_network(base_dir, section)?);
    }
    if let Some(section) = &config.clustering {
        report.clustering = Some(run_clustering(base_dir, section)?);
    }
    if let Some(section) = &config.regression {
        report.regression = Some(run_regression(base_dir, section)?);
    }
    if report.similarity.is_none()
        && report.network.is_none()
        && report.clustering.is_none()
        && report.regression.is_none()
    {
        warn!("no analysis sections configured; nothing to do");
    }
    Ok(report)
}
