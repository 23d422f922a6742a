// Integration tests for the dugout pipelines.
//
// These run each analysis end-to-end over the CSV fixtures in
// tests/fixtures/, through the same loaders and report types the binary
// uses.

use std::path::{Path, PathBuf};

use dugout_app::pipeline::{
    self, run_clustering, run_network, run_regression, run_similarity, RunReport,
};
use dugout_app::report;
use dugout_core::config::{
    load_config_from, ClusteringConfig, MissingPolicy, NetworkConfig, NodeIdentity, OutputFormat,
    RegressionConfig, SimilarityConfig,
};
use dugout_core::records::EntityKey;

// ===========================================================================
// Test helpers
// ===========================================================================

fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn similarity_config() -> SimilarityConfig {
    SimilarityConfig {
        data_path: "players.csv".into(),
        features: strings(&["PA", "WAR", "pythW", "WARSHARE"]),
        missing: MissingPolicy::ImputeMean,
        coerce_invalid: false,
        top_k: 5,
        exclude_same_player: false,
        queries: vec![
            EntityKey::new("Barry Bonds", 2001),
            EntityKey::new("Chris Taylor", 2022),
        ],
    }
}

fn network_config(threshold: f64) -> NetworkConfig {
    NetworkConfig {
        data_path: "players.csv".into(),
        features: strings(&["PA", "WAR", "pythW", "WARSHARE"]),
        team: Some("OAK".into()),
        missing: MissingPolicy::Drop,
        coerce_invalid: false,
        threshold,
        node_identity: NodeIdentity::Player,
        top_central: 3,
        summary_columns: strings(&["PA", "WAR", "WARSHARE"]),
    }
}

fn clustering_config() -> ClusteringConfig {
    ClusteringConfig {
        data_path: "pitchers.csv".into(),
        features: strings(&["ERA", "WAR", "FIP", "xFIP", "WPA", "K-BB%", "GB%"]),
        k: 2,
        max_k: 5,
        n_init: 10,
        max_iter: 300,
        tolerance: 1e-4,
        seed: 42,
        top_per_cluster: 3,
        rank_by: "WAR".into(),
    }
}

fn regression_config() -> RegressionConfig {
    RegressionConfig {
        data_path: "pitchers.csv".into(),
        features: strings(&["ERA", "FIP", "xFIP", "WPA", "GB%", "K-BB%", "IP"]),
        target: "WAR".into(),
        test_fraction: 0.2,
        n_estimators: 20,
        max_depth: None,
        min_samples_split: 2,
        seed: 42,
        worst_errors: 5,
        best_predictions: 10,
    }
}

// ===========================================================================
// Similarity
// ===========================================================================

#[test]
fn similarity_ranks_neighbors_and_reports_missing_query() {
    let report = run_similarity(&fixtures(), &similarity_config()).unwrap();
    assert_eq!(report.candidates, 13);
    assert_eq!(report.queries.len(), 2);

    let bonds = &report.queries[0];
    assert_eq!(bonds.query, "Barry Bonds (2001)");
    assert!(bonds.error.is_none());
    assert_eq!(bonds.entity.as_ref().unwrap().team, "SFG");
    assert_eq!(bonds.neighbors.len(), 5);
    assert!(bonds
        .neighbors
        .iter()
        .all(|n| !(n.entity.name == "Barry Bonds" && n.entity.season == 2001)));
    for pair in bonds.neighbors.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
    // Neighbors carry the raw, unnormalized stats.
    let pa: Vec<f64> = bonds
        .neighbors
        .iter()
        .filter_map(|n| n.entity.stats[0].value)
        .collect();
    assert!(pa.iter().any(|&v| v > 1.0));

    let taylor = &report.queries[1];
    assert!(taylor.entity.is_none());
    assert!(taylor.neighbors.is_empty());
    assert!(taylor.error.as_ref().unwrap().contains("not found"));
}

#[test]
fn similarity_can_exclude_other_seasons_of_query_player() {
    let config = SimilarityConfig {
        exclude_same_player: true,
        ..similarity_config()
    };
    let report = run_similarity(&fixtures(), &config).unwrap();
    assert!(report.queries[0]
        .neighbors
        .iter()
        .all(|n| n.entity.name != "Barry Bonds"));
}

#[test]
fn invalid_cells_fail_unless_coerced() {
    let strict = SimilarityConfig {
        data_path: "dirty_players.csv".into(),
        queries: vec![EntityKey::new("Chris Taylor", 2022)],
        ..similarity_config()
    };
    let err = run_similarity(&fixtures(), &strict).unwrap_err();
    assert!(err.chain().any(|e| e.to_string().contains("WARSHARE")));

    let lenient = SimilarityConfig {
        coerce_invalid: true,
        ..strict
    };
    let report = run_similarity(&fixtures(), &lenient).unwrap();
    assert_eq!(report.candidates, 4);
    assert_eq!(report.queries[0].neighbors.len(), 3);
}

#[test]
fn missing_data_file_is_an_error_with_context() {
    let config = SimilarityConfig {
        data_path: "no_such_file.csv".into(),
        ..similarity_config()
    };
    let err = run_similarity(&fixtures(), &config).unwrap_err();
    assert!(format!("{err:#}").contains("failed to load records"));
}

// ===========================================================================
// Network
// ===========================================================================

#[test]
fn network_over_one_team() {
    let report = run_network(&fixtures(), &network_config(0.3)).unwrap();
    assert_eq!(report.team.as_deref(), Some("OAK"));
    // Bench Player has no WAR and is dropped; Chapman's two seasons collapse.
    assert_eq!(report.node_count, 6);
    assert!(report.central.len() <= 3);
    assert_eq!(report.ego_networks.len(), report.central.len());
    assert_eq!(report.cohorts.len(), report.central.len());

    for row in &report.central {
        let expected = if row.name == "Matt Chapman" { 2 } else { 1 };
        assert_eq!(row.seasons, expected, "{}", row.name);
    }
    for pair in report.central.windows(2) {
        assert!(pair[0].degree >= pair[1].degree);
    }
    for ego in &report.ego_networks {
        assert!(ego.nodes.contains(&ego.focus));
    }
    for cohort in &report.cohorts {
        assert!(cohort.nodes.contains(&cohort.focus));
    }

    // Averages cover every OAK row, skipping missing cells.
    assert!(approx_eq(report.averages[0].value.unwrap(), 3763.0 / 8.0, 1e-9));
    assert!(approx_eq(report.averages[1].value.unwrap(), 32.6 / 7.0, 1e-9));
}

#[test]
fn higher_threshold_never_removes_edges() {
    let mut previous = 0;
    for threshold in [0.05, 0.2, 0.3, 0.6, 1.5, 3.0] {
        let report = run_network(&fixtures(), &network_config(threshold)).unwrap();
        assert!(report.edge_count >= previous, "threshold {threshold}");
        previous = report.edge_count;
    }
    // Every pair is within the diagonal of a 4-feature unit hypercube.
    assert_eq!(previous, 6 * 5 / 2);
}

#[test]
fn player_season_identity_keeps_seasons_apart() {
    let config = NetworkConfig {
        node_identity: NodeIdentity::PlayerSeason,
        ..network_config(0.3)
    };
    let report = run_network(&fixtures(), &config).unwrap();
    assert_eq!(report.node_count, 7);
}

// ===========================================================================
// Clustering
// ===========================================================================

#[test]
fn clustering_separates_aces_from_back_end_starters() {
    let report = run_clustering(&fixtures(), &clustering_config()).unwrap();
    // The row without GB% is dropped.
    assert_eq!(report.rows, 12);
    assert_eq!(report.k, 2);
    assert_eq!(report.clusters.iter().map(|c| c.size).sum::<usize>(), 12);

    let cluster_of = |name: &str| {
        report
            .projection
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.cluster)
            .unwrap()
    };
    let aces = cluster_of("Ace One");
    let back = cluster_of("Back End One");
    assert_ne!(aces, back);
    for p in &report.projection {
        let expected = if p.name.starts_with("Ace") { aces } else { back };
        assert_eq!(p.cluster, expected, "{}", p.name);
        assert_eq!(p.components.len(), 2);
    }

    let leaders: Vec<&str> = report.clusters[aces]
        .leaders
        .iter()
        .map(|l| l.name.as_str())
        .collect();
    assert_eq!(leaders, vec!["Ace One", "Ace Two", "Ace Three"]);
    let era = report.clusters[aces].means[0].value.unwrap();
    assert!(approx_eq(era, 16.05 / 6.0, 1e-9));
}

#[test]
fn clustering_elbow_and_projection() {
    let report = run_clustering(&fixtures(), &clustering_config()).unwrap();
    let ks: Vec<usize> = report.elbow.iter().map(|p| p.k).collect();
    assert_eq!(ks, vec![1, 2, 3, 4, 5]);
    assert!(report.elbow[0].inertia > report.elbow[1].inertia);
    // k = 1 inertia on standardized data is rows * features.
    assert!(approx_eq(report.elbow[0].inertia, 12.0 * 7.0, 1e-6));

    assert_eq!(report.explained_variance_ratio.len(), 2);
    let captured: f64 = report.explained_variance_ratio.iter().sum();
    assert!(captured > 0.5 && captured <= 1.0 + 1e-9);
}

// ===========================================================================
// Regression
// ===========================================================================

#[test]
fn regression_reports_metrics_and_importances() {
    let report = run_regression(&fixtures(), &regression_config()).unwrap();
    assert_eq!(report.target, "WAR");
    assert_eq!(report.test_rows, 3);
    assert_eq!(report.train_rows, 9);
    assert!(report.rmse >= 0.0);
    assert!(report.r2 <= 1.0);

    assert_eq!(report.worst.len(), 3);
    assert_eq!(report.best.len(), 3);
    for pair in report.worst.windows(2) {
        assert!(pair[0].error >= pair[1].error);
    }
    for pair in report.best.windows(2) {
        assert!(pair[0].error <= pair[1].error);
    }
    for row in &report.best {
        assert!(approx_eq(row.error, (row.actual - row.predicted).abs(), 1e-12));
    }

    assert_eq!(report.importances.len(), 7);
    let total: f64 = report.importances.iter().map(|r| r.importance).sum();
    assert!(approx_eq(total, 1.0, 1e-9));
    for pair in report.importances.windows(2) {
        assert!(pair[0].importance >= pair[1].importance);
    }
}

#[test]
fn regression_is_reproducible() {
    let a = run_regression(&fixtures(), &regression_config()).unwrap();
    let b = run_regression(&fixtures(), &regression_config()).unwrap();
    assert_eq!(a.rmse, b.rmse);
    assert_eq!(a.worst[0].name, b.worst[0].name);
}

// ===========================================================================
// Full run from a config file
// ===========================================================================

#[test]
fn full_run_from_config_file_renders_both_formats() {
    let base = std::env::temp_dir().join(format!("dugout_full_run_{}", std::process::id()));
    let config_dir = base.join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    let fixtures = fixtures();
    let toml = format!(
        r#"
[similarity]
data_path = '{players}'
features = ["PA", "WAR", "pythW", "WARSHARE"]
top_k = 3
queries = [{{ name = "Matt Olson", season = 2019 }}]

[network]
data_path = '{players}'
features = ["PA", "WAR", "pythW", "WARSHARE"]
team = "OAK"
summary_columns = ["PA", "WAR"]

[output]
format = "json"
"#,
        players = fixtures.join("players.csv").display(),
    );
    std::fs::write(config_dir.join("analysis.toml"), toml).unwrap();

    let config = load_config_from(&base).unwrap();
    assert_eq!(config.output.format, OutputFormat::Json);
    let run: RunReport = pipeline::run(&config, &base).unwrap();
    assert!(run.clustering.is_none());

    let json = report::render(&run, config.output.format).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        parsed["similarity"]["queries"][0]["neighbors"]
            .as_array()
            .unwrap()
            .len(),
        3
    );
    assert_eq!(parsed["network"]["team"], "OAK");
    assert!(parsed.get("regression").is_none());

    let text = report::render(&run, OutputFormat::Text).unwrap();
    assert!(text.contains("Query Player: Matt Olson (2019)"));
    assert!(text.contains("most central players"));

    let _ = std::fs::remove_dir_all(&base);
}
