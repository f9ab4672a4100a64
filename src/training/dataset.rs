//! Labelled transaction log reader with seeded reservoir sampling

use crate::error::{PipelineError, Result};
use crate::types::transaction::{
    LabeledTransaction, TransactionRecord, FIELD_AMOUNT, FIELD_LABEL, FIELD_NEW_BALANCE,
    FIELD_OLD_BALANCE, FIELD_TYPE,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Columns every training log must provide; others are ignored.
pub const REQUIRED_COLUMNS: [&str; 5] = [
    FIELD_AMOUNT,
    FIELD_TYPE,
    FIELD_OLD_BALANCE,
    FIELD_NEW_BALANCE,
    FIELD_LABEL,
];

#[derive(Debug, Deserialize)]
struct CsvRow {
    amount: f64,
    #[serde(rename = "type")]
    transaction_type: String,
    #[serde(rename = "oldbalanceOrg")]
    old_balance_origin: f64,
    #[serde(rename = "newbalanceOrig")]
    new_balance_origin: f64,
    #[serde(rename = "isFraud")]
    is_fraud: u8,
}

/// Rows drawn from a dataset plus bookkeeping about the pass
#[derive(Debug, Clone)]
pub struct DatasetSample {
    pub rows: Vec<LabeledTransaction>,
    /// Usable rows seen in the whole file
    pub total_rows: usize,
    /// Rows rejected as malformed
    pub skipped_rows: usize,
}

/// Stream a CSV file and keep a seeded uniform sample of `sample_size` rows.
pub fn sample_csv<P: AsRef<Path>>(path: P, sample_size: usize, seed: u64) -> Result<DatasetSample> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| PipelineError::DatasetRead {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    info!(path = %path.display(), sample_size = sample_size, "Reading transaction log");
    sample_reader(file, &path.display().to_string(), sample_size, seed)
}

/// Reservoir-sample labelled rows from any CSV source.
///
/// Every usable row has the same probability of being kept and the result
/// depends only on the input and the seed.
pub fn sample_reader<R: Read>(
    reader: R,
    source: &str,
    sample_size: usize,
    seed: u64,
) -> Result<DatasetSample> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| PipelineError::DatasetRead {
            path: source.to_string(),
            reason: e.to_string(),
        })?
        .clone();

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == **col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::schema(
            missing,
            "dataset is missing required column(s)",
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut reservoir: Vec<LabeledTransaction> = Vec::with_capacity(sample_size.min(1 << 20));
    let mut total_rows = 0usize;
    let mut skipped_rows = 0usize;

    for (line, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| PipelineError::DatasetRead {
            path: source.to_string(),
            reason: e.to_string(),
        })?;

        let row = match record.deserialize::<CsvRow>(Some(&headers)) {
            Ok(row) => row,
            Err(e) => {
                skipped_rows += 1;
                debug!(line = line + 2, error = %e, "Skipping malformed row");
                continue;
            }
        };
        let Some(labeled) = into_labeled(row) else {
            skipped_rows += 1;
            debug!(line = line + 2, "Skipping row with invalid values");
            continue;
        };

        if reservoir.len() < sample_size {
            reservoir.push(labeled);
        } else {
            let j = rng.gen_range(0..=total_rows);
            if j < sample_size {
                reservoir[j] = labeled;
            }
        }
        total_rows += 1;
    }

    if skipped_rows > 0 {
        warn!(skipped = skipped_rows, "Rows skipped while reading dataset");
    }
    info!(
        total_rows = total_rows,
        sampled_rows = reservoir.len(),
        "Dataset sampled"
    );

    Ok(DatasetSample {
        rows: reservoir,
        total_rows,
        skipped_rows,
    })
}

fn into_labeled(row: CsvRow) -> Option<LabeledTransaction> {
    if row.is_fraud > 1 {
        return None;
    }
    let record = TransactionRecord::new(
        row.amount,
        row.transaction_type,
        row.old_balance_origin,
        row.new_balance_origin,
    );
    record.validate().ok()?;
    Some(LabeledTransaction::new(record, row.is_fraud == 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const HEADER: &str = "step,type,amount,nameOrig,oldbalanceOrg,newbalanceOrig,isFraud,isFlaggedFraud\n";

    fn log(rows: usize) -> String {
        let mut csv = HEADER.to_string();
        for i in 0..rows {
            let kind = if i % 2 == 0 { "PAYMENT" } else { "TRANSFER" };
            csv.push_str(&format!(
                "1,{},{}.0,C{},{}.0,0.0,{},0\n",
                kind,
                i + 1,
                i,
                (i + 1) * 10,
                u8::from(i % 5 == 0)
            ));
        }
        csv
    }

    #[test]
    fn test_reads_all_rows_when_small() {
        let sample = sample_reader(log(10).as_bytes(), "mem", 100, 42).unwrap();
        assert_eq!(sample.rows.len(), 10);
        assert_eq!(sample.total_rows, 10);
        assert_eq!(sample.skipped_rows, 0);
        assert_eq!(sample.rows[0].record.transaction_type, "PAYMENT");
        assert!(sample.rows[0].is_fraud);
    }

    #[test]
    fn test_sample_is_capped_and_reproducible() {
        let data = log(500);
        let a = sample_reader(data.as_bytes(), "mem", 50, 42).unwrap();
        let b = sample_reader(data.as_bytes(), "mem", 50, 42).unwrap();
        let c = sample_reader(data.as_bytes(), "mem", 50, 43).unwrap();

        assert_eq!(a.rows.len(), 50);
        assert_eq!(a.total_rows, 500);
        assert_eq!(a.rows, b.rows);
        assert_ne!(a.rows, c.rows);
    }

    #[test]
    fn test_missing_columns_are_named() {
        let data = "type,amount,oldbalanceOrg\nPAYMENT,1.0,2.0\n";
        match sample_reader(data.as_bytes(), "mem", 10, 42).unwrap_err() {
            PipelineError::Schema { fields, .. } => {
                assert_eq!(fields, vec!["newbalanceOrig", "isFraud"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_rows_skipped() {
        let data = format!(
            "{}1,PAYMENT,abc,C1,10.0,0.0,0,0\n1,PAYMENT,5.0,C2,-1.0,0.0,0,0\n1,PAYMENT,5.0,C3,10.0,5.0,2,0\n1,TRANSFER,7.0,C4,10.0,3.0,1,0\n",
            HEADER
        );
        let sample = sample_reader(data.as_bytes(), "mem", 10, 42).unwrap();
        assert_eq!(sample.rows.len(), 1);
        assert_eq!(sample.skipped_rows, 3);
        assert_eq!(sample.rows[0].record.transaction_type, "TRANSFER");
    }

    #[test]
    fn test_ragged_row_skipped() {
        let mut data = log(20);
        data.push_str("PAYMENT,5.0\n");
        let sample = sample_reader(data.as_bytes(), "mem", 100, 42).unwrap();
        assert_eq!(sample.rows.len(), 20);
        assert_eq!(sample.skipped_rows, 1);

        let mut data = log(3);
        data.push_str("1,PAYMENT,5.0,C9,10.0,5.0,0,0,extra,fields\n");
        let sample = sample_reader(data.as_bytes(), "mem", 100, 42).unwrap();
        assert_eq!(sample.rows.len(), 4);
        assert_eq!(sample.skipped_rows, 0);
    }

    #[test]
    fn test_unreadable_path() {
        let err = sample_csv("/nonexistent/transactions.csv", 10, 42).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatasetReadError);
    }
}
