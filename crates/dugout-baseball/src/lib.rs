// Baseball stat analyses: player similarity and networks, pitcher
// clustering, and WAR regression.

pub mod clustering;
pub mod features;
pub mod regression;
pub mod similarity;
