// WAR regression: a random forest over standardized pitching stats, with a
// seeded train/test split and the usual error metrics.

pub mod forest;
pub mod metrics;
pub mod split;
pub mod tree;
