//! Offline training: dataset sampling, split, fitting and evaluation

pub mod dataset;
pub mod report;
pub mod split;
pub mod trainer;

pub use dataset::{sample_csv, DatasetSample};
pub use report::ClassificationReport;
pub use split::{stratified_split, SplitIndices};
pub use trainer::{Trainer, TrainingOutcome};
