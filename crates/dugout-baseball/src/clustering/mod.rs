pub mod kmeans;
pub mod pca;
pub mod standardize;
