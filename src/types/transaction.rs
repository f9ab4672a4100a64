//! Transaction records scored by the pipeline

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const FIELD_AMOUNT: &str = "amount";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_OLD_BALANCE: &str = "oldbalanceOrg";
pub const FIELD_NEW_BALANCE: &str = "newbalanceOrig";
pub const FIELD_LABEL: &str = "isFraud";

/// One transaction as received on the wire or read from a training log.
///
/// Field names follow the transaction log columns and are case-sensitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Monetary value of the transaction
    pub amount: f64,

    /// Transaction type (TRANSFER, CASH_OUT, PAYMENT, ...)
    #[serde(rename = "type")]
    pub transaction_type: String,

    /// Origin account balance before the transaction
    #[serde(rename = "oldbalanceOrg")]
    pub old_balance_origin: f64,

    /// Origin account balance after the transaction
    #[serde(rename = "newbalanceOrig")]
    pub new_balance_origin: f64,
}

impl TransactionRecord {
    /// Create a new transaction record
    pub fn new(
        amount: f64,
        transaction_type: impl Into<String>,
        old_balance_origin: f64,
        new_balance_origin: f64,
    ) -> Self {
        Self {
            amount,
            transaction_type: transaction_type.into(),
            old_balance_origin,
            new_balance_origin,
        }
    }

    /// Parse and validate a request body.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(payload).map_err(|e| {
            PipelineError::schema(vec!["<body>".to_string()], format!("malformed JSON: {}", e))
        })?;
        Self::from_value(&value)
    }

    /// Build a record from a flat JSON object, reporting every missing or
    /// mistyped field at once.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            PipelineError::schema(vec!["<body>".to_string()], "request body must be a JSON object")
        })?;

        let mut missing = Vec::new();
        let mut invalid = Vec::new();

        let amount = numeric_field(obj, FIELD_AMOUNT, &mut missing, &mut invalid);
        let transaction_type = match obj.get(FIELD_TYPE) {
            None | Some(Value::Null) => {
                missing.push(FIELD_TYPE.to_string());
                None
            }
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(_) => {
                invalid.push(FIELD_TYPE.to_string());
                None
            }
        };
        let old_balance = numeric_field(obj, FIELD_OLD_BALANCE, &mut missing, &mut invalid);
        let new_balance = numeric_field(obj, FIELD_NEW_BALANCE, &mut missing, &mut invalid);

        if !missing.is_empty() {
            return Err(PipelineError::schema(missing, "missing required field(s)"));
        }
        if !invalid.is_empty() {
            return Err(PipelineError::schema(invalid, "field(s) have the wrong type"));
        }

        match (amount, transaction_type, old_balance, new_balance) {
            (Some(amount), Some(transaction_type), Some(old), Some(new)) => {
                let record = Self::new(amount, transaction_type, old, new);
                record.validate()?;
                Ok(record)
            }
            _ => Err(PipelineError::schema(
                vec!["<body>".to_string()],
                "incomplete transaction record",
            )),
        }
    }

    /// Reject negative, non-finite or empty values.
    pub fn validate(&self) -> Result<()> {
        let mut bad = Vec::new();
        for (name, value) in [
            (FIELD_AMOUNT, self.amount),
            (FIELD_OLD_BALANCE, self.old_balance_origin),
            (FIELD_NEW_BALANCE, self.new_balance_origin),
        ] {
            if !value.is_finite() || value < 0.0 {
                bad.push(name.to_string());
            }
        }
        if self.transaction_type.trim().is_empty() {
            bad.push(FIELD_TYPE.to_string());
        }

        if bad.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::schema(
                bad,
                "values must be finite and non-negative, type must be non-empty",
            ))
        }
    }
}

fn numeric_field(
    obj: &Map<String, Value>,
    name: &str,
    missing: &mut Vec<String>,
    invalid: &mut Vec<String>,
) -> Option<f64> {
    match obj.get(name) {
        None | Some(Value::Null) => {
            missing.push(name.to_string());
            None
        }
        Some(Value::Number(n)) => n.as_f64().or_else(|| {
            invalid.push(name.to_string());
            None
        }),
        Some(_) => {
            invalid.push(name.to_string());
            None
        }
    }
}

/// A transaction with its ground-truth label, as used for training.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTransaction {
    pub record: TransactionRecord,
    pub is_fraud: bool,
}

impl LabeledTransaction {
    pub fn new(record: TransactionRecord, is_fraud: bool) -> Self {
        Self { record, is_fraud }
    }

    /// Label as class index (1 = fraud)
    pub fn label(&self) -> u8 {
        u8::from(self.is_fraud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_parse_valid_request() {
        let body = json!({
            "amount": 5000,
            "type": "TRANSFER",
            "oldbalanceOrg": 10000.0,
            "newbalanceOrig": 5000.0,
            "nameOrig": "C123"
        });
        let record = TransactionRecord::from_value(&body).unwrap();
        assert_eq!(record, TransactionRecord::new(5000.0, "TRANSFER", 10000.0, 5000.0));
    }

    #[test]
    fn test_missing_fields_are_named() {
        let body = json!({ "amount": 10.0, "type": "PAYMENT" });
        let err = TransactionRecord::from_value(&body).unwrap_err();
        match err {
            PipelineError::Schema { fields, .. } => {
                assert_eq!(fields, vec!["oldbalanceOrg", "newbalanceOrig"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_field_names_are_case_sensitive() {
        let body = json!({
            "Amount": 1.0,
            "type": "PAYMENT",
            "oldbalanceOrg": 0.0,
            "newbalanceOrig": 0.0
        });
        let err = TransactionRecord::from_value(&body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaError);
    }

    #[test]
    fn test_mistyped_field_rejected() {
        let body = json!({
            "amount": "5000",
            "type": 3,
            "oldbalanceOrg": 0.0,
            "newbalanceOrig": 0.0
        });
        match TransactionRecord::from_value(&body).unwrap_err() {
            PipelineError::Schema { fields, .. } => assert_eq!(fields, vec!["amount", "type"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_negative_balance_rejected() {
        let body = json!({
            "amount": 1.0,
            "type": "PAYMENT",
            "oldbalanceOrg": -5.0,
            "newbalanceOrig": 0.0
        });
        match TransactionRecord::from_value(&body).unwrap_err() {
            PipelineError::Schema { fields, .. } => assert_eq!(fields, vec!["oldbalanceOrg"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json() {
        let err = TransactionRecord::from_slice(b"{not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaError);
    }

    #[test]
    fn test_non_finite_rejected() {
        let record = TransactionRecord::new(f64::NAN, "PAYMENT", 0.0, f64::INFINITY);
        match record.validate().unwrap_err() {
            PipelineError::Schema { fields, .. } => {
                assert_eq!(fields, vec!["amount", "newbalanceOrig"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_serialization_uses_log_column_names() {
        let record = TransactionRecord::new(1.5, "CASH_OUT", 2.0, 0.5);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "CASH_OUT");
        assert_eq!(json["oldbalanceOrg"], 2.0);
        assert_eq!(json["newbalanceOrig"], 0.5);
    }
}
