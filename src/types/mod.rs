//! Type definitions for the fraud scoring pipeline

pub mod transaction;
pub mod verdict;

pub use transaction::{LabeledTransaction, TransactionRecord};
pub use verdict::{ErrorResponse, ScoreReply, ScoreResponse};
