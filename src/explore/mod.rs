//! Exploratory views of normalized expression: per-sample distributions,
//! sample PCA, and the SVG plots of both (plus the volcano plot of the
//! test results).

mod distribution;
mod pca;
mod plot;

pub use distribution::{box_stats, BoxStats};
pub use pca::{pca, PcaResult};
pub use plot::{boxplot_svg, pca_svg, volcano_svg};
