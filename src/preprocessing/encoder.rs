//! Categorical encoder for the transaction type

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Logical name of the transaction type encoder inside an [`EncoderMap`].
pub const TYPE_ENCODER: &str = "type_encoder";

/// Encoders keyed by logical name, persisted as one artifact.
pub type EncoderMap = BTreeMap<String, CategoryEncoder>;

/// Bijective mapping between category strings and integer codes.
///
/// Codes are indices into the sorted vocabulary observed at fit time.
/// Values outside the vocabulary are rejected, never mapped to a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    /// Field the encoder applies to (used in error messages)
    field: String,
    /// Sorted, de-duplicated vocabulary
    classes: Vec<String>,
}

impl CategoryEncoder {
    /// Fit an encoder over the observed values of `field`.
    pub fn fit<I, S>(field: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classes: BTreeSet<String> = values
            .into_iter()
            .map(|v| v.as_ref().to_string())
            .collect();

        if classes.is_empty() {
            return Err(PipelineError::DegenerateDataset(format!(
                "no values to fit the '{}' encoder",
                field
            )));
        }

        Ok(Self {
            field: field.to_string(),
            classes: classes.into_iter().collect(),
        })
    }

    /// Encode a value, failing with `UnknownCategory` if it was never seen.
    pub fn encode(&self, value: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|class| class.as_str().cmp(value))
            .map_err(|_| PipelineError::UnknownCategory {
                field: self.field.clone(),
                value: value.to_string(),
            })
    }

    /// Map a code back to its category.
    pub fn decode(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }

    pub fn contains(&self, value: &str) -> bool {
        self.encode(value).is_ok()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Reject vocabularies that were not produced by `fit` (used after loading).
    pub(crate) fn check_integrity(&self) -> std::result::Result<(), String> {
        if self.classes.is_empty() {
            return Err("empty vocabulary".to_string());
        }
        if self.classes.windows(2).any(|w| w[0] >= w[1]) {
            return Err("vocabulary is not sorted and unique".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn type_encoder() -> CategoryEncoder {
        CategoryEncoder::fit(
            "type",
            ["TRANSFER", "PAYMENT", "CASH_OUT", "PAYMENT", "CASH_IN", "DEBIT"],
        )
        .unwrap()
    }

    #[test]
    fn test_codes_follow_sorted_vocabulary() {
        let encoder = type_encoder();
        assert_eq!(
            encoder.classes(),
            &["CASH_IN", "CASH_OUT", "DEBIT", "PAYMENT", "TRANSFER"]
        );
        assert_eq!(encoder.encode("CASH_IN").unwrap(), 0);
        assert_eq!(encoder.encode("TRANSFER").unwrap(), 4);
    }

    #[test]
    fn test_encoding_is_bijective() {
        let encoder = type_encoder();
        for class in encoder.classes() {
            let code = encoder.encode(class).unwrap();
            assert_eq!(encoder.decode(code), Some(class.as_str()));
        }
        assert_eq!(encoder.decode(encoder.len()), None);
    }

    #[test]
    fn test_unknown_category_rejected() {
        let encoder = type_encoder();
        let err = encoder.encode("UNKNOWN_TYPE_XYZ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownCategory);
        assert!(err.to_string().contains("UNKNOWN_TYPE_XYZ"));

        // Matching is exact and case-sensitive
        assert!(!encoder.contains("transfer"));
    }

    #[test]
    fn test_fit_empty_is_degenerate() {
        let err = CategoryEncoder::fit("type", Vec::<String>::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateDataset);
    }

    #[test]
    fn test_integrity_check_rejects_unsorted() {
        let tampered: CategoryEncoder =
            serde_json::from_str(r#"{"field":"type","classes":["TRANSFER","CASH_IN"]}"#).unwrap();
        assert!(tampered.check_integrity().is_err());
        assert!(type_encoder().check_integrity().is_ok());
    }
}
