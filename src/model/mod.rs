//! Per-gene linear models and empirical Bayes variance moderation.

pub mod ebayes;
pub mod lm;

pub use ebayes::{squeeze_var, tmixture, trigamma, trigamma_inverse, SqueezedVar};
pub use lm::{model_lm, LmFit, LmFitSingle};
