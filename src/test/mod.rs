//! Hypothesis tests on fitted linear models.

pub mod moderated;

pub use moderated::{test_moderated, ModeratedResult, ModeratedStat};
