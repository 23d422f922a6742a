// Report rendering: plain-text tables or pretty JSON.

use std::fmt::{self, Write};

use dugout_core::config::OutputFormat;

use crate::pipeline::{
    ClusteringReport, EntityRow, NetworkReport, PredictionRow, RegressionReport, RunReport,
    SimilarityReport, StatCell, SubgraphSummary,
};

pub fn render(report: &RunReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Text => Ok(render_text(report)?),
    }
}

pub fn render_text(report: &RunReport) -> Result<String, fmt::Error> {
    let mut sections = Vec::new();
    if let Some(r) = &report.similarity {
        sections.push(render_similarity(r)?);
    }
    if let Some(r) = &report.network {
        sections.push(render_network(r)?);
    }
    if let Some(r) = &report.clustering {
        sections.push(render_clustering(r)?);
    }
    if let Some(r) = &report.regression {
        sections.push(render_regression(r)?);
    }
    Ok(sections.join("\n"))
}

// ---------------------------------------------------------------------------
// Cell formatting
// ---------------------------------------------------------------------------

/// A raw stat as loaded; missing cells print as `-`.
fn value(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn fixed(v: Option<f64>, decimals: usize) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:.decimals$}"))
}

fn stat_list(stats: &[StatCell]) -> String {
    stats
        .iter()
        .map(|c| format!("{}: {}", c.column, value(c.value)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn entity_line(row: &EntityRow) -> String {
    format!("Season: {}, Name: {}, Team: {}", row.season, row.name, row.team)
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

fn render_similarity(r: &SimilarityReport) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(
        out,
        "== Similarity ({} candidates; {}) ==",
        r.candidates,
        r.features.join(", ")
    )?;
    for q in &r.queries {
        writeln!(out)?;
        match (&q.entity, &q.error) {
            (Some(entity), _) => {
                writeln!(out, "Query Player: {}", q.query)?;
                writeln!(out, "Team: {}", entity.team)?;
                writeln!(out, "{}", stat_list(&entity.stats))?;
                writeln!(out, "\nTop {} most similar players:\n", q.neighbors.len())?;
            }
            (None, Some(error)) => {
                writeln!(out, "{}: {}", q.query, error)?;
                continue;
            }
            (None, None) => continue,
        }
        for n in &q.neighbors {
            writeln!(
                out,
                "{}. {}, Similarity Score: {:.6}",
                n.rank,
                entity_line(&n.entity),
                n.distance
            )?;
            writeln!(out, "   {}", stat_list(&n.entity.stats))?;
        }
    }
    Ok(out)
}

fn render_subgraph(out: &mut String, kind: &str, s: &SubgraphSummary) -> fmt::Result {
    writeln!(
        out,
        "{} of {}: {} nodes, {} edges",
        kind,
        s.focus,
        s.nodes.len(),
        s.edges.len()
    )?;
    writeln!(out, "  nodes: {}", s.nodes.join(", "))?;
    for e in &s.edges {
        writeln!(out, "  {} -- {} (weight {:.4})", e.a, e.b, e.weight)?;
    }
    Ok(())
}

fn render_network(r: &NetworkReport) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let team = r.team.as_deref().unwrap_or("all teams");
    writeln!(
        out,
        "== Network ({team}; threshold {}) ==\n{} nodes, {} edges",
        r.threshold, r.node_count, r.edge_count
    )?;

    let names: Vec<&str> = r.central.iter().map(|c| c.label.as_str()).collect();
    writeln!(out, "\nTop {} most central players: {}", names.len(), names.join(", "))?;
    for c in &r.central {
        writeln!(
            out,
            "{} has been with {} for {} years (degree {}, centrality {:.4}).",
            c.label, team, c.seasons, c.degree, c.centrality
        )?;
    }

    if !r.season_lines.is_empty() {
        writeln!(out, "\nSeason lines:")?;
        for line in &r.season_lines {
            writeln!(out, "  {} ({}): {}", line.name, line.season, stat_list(&line.stats))?;
        }
    }

    writeln!(out)?;
    for s in &r.ego_networks {
        render_subgraph(&mut out, "Ego network", s)?;
    }
    for s in &r.cohorts {
        render_subgraph(&mut out, "Season cohort", s)?;
    }

    if !r.averages.is_empty() {
        writeln!(out, "\nOverall averages for {team}:")?;
        for cell in &r.averages {
            writeln!(out, "Average {}: {}", cell.column, fixed(cell.value, 4))?;
        }
    }
    Ok(out)
}

fn render_clustering(r: &ClusteringReport) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(
        out,
        "== Clustering ({} rows; {}) ==",
        r.rows,
        r.features.join(", ")
    )?;
    writeln!(out, "\nElbow (k: WCSS):")?;
    for p in &r.elbow {
        writeln!(out, "  {:>2}: {:.3}", p.k, p.inertia)?;
    }
    let ratios: Vec<String> = r
        .explained_variance_ratio
        .iter()
        .map(|v| format!("{v:.3}"))
        .collect();
    writeln!(
        out,
        "\nk = {}, inertia {:.3}; explained variance by component: {}",
        r.k,
        r.inertia,
        ratios.join(", ")
    )?;

    for c in &r.clusters {
        let centroid: Vec<String> = c.projected_centroid.iter().map(|v| format!("{v:.3}")).collect();
        writeln!(
            out,
            "\nCluster {} ({} pitchers, centroid at [{}])",
            c.cluster,
            c.size,
            centroid.join(", ")
        )?;
        for leader in &c.leaders {
            writeln!(out, "  {}; {}", entity_line(leader), stat_list(&leader.stats))?;
        }
    }

    writeln!(out, "\nAverage Stats by Cluster:")?;
    writeln!(out, "Cluster  {}", r.features.join("  "))?;
    for c in &r.clusters {
        let means: Vec<String> = c.means.iter().map(|m| fixed(m.value, 2)).collect();
        writeln!(out, "{:<7}  {}", c.cluster, means.join("  "))?;
    }
    Ok(out)
}

fn prediction_table(out: &mut String, rows: &[PredictionRow], target: &str) -> fmt::Result {
    writeln!(
        out,
        "{:<6}  {:<24}  {:<5}  {:>8}  {:>10}  {:>6}",
        "Season", "Name", "Team", target, "Predicted", "Error"
    )?;
    for row in rows {
        writeln!(
            out,
            "{:<6}  {:<24}  {:<5}  {:>8.2}  {:>10.2}  {:>6.2}",
            row.season, row.name, row.team, row.actual, row.predicted, row.error
        )?;
    }
    Ok(())
}

fn render_regression(r: &RegressionReport) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(
        out,
        "== Regression ({}; {} train / {} test) ==",
        r.target, r.train_rows, r.test_rows
    )?;
    writeln!(out, "RMSE: {:.2}\nR² Score: {:.2}", r.rmse, r.r2)?;

    writeln!(out, "\nTop {} Prediction Errors:", r.worst.len())?;
    prediction_table(&mut out, &r.worst, &r.target)?;
    writeln!(out, "\nTop {} Most Accurate Predictions:", r.best.len())?;
    prediction_table(&mut out, &r.best, &r.target)?;

    writeln!(out, "\nFeature Importance:")?;
    for row in &r.importances {
        writeln!(out, "  {:<8} {:.4}", row.feature, row.importance)?;
    }
    Ok(out)
}
