use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{FeatureError, InferenceError};

pub const FEATURE_COUNT: usize = 10;

/// Request keys in the order the model was trained on.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "revolvingUtilization",
    "age",
    "late30To59Days",
    "debtRatio",
    "monthlyIncome",
    "openCreditLines",
    "late90PlusDays",
    "realEstateLoans",
    "late60To89Days",
    "dependents",
];

/// Index of the "default" class in the model's probability output.
pub const DEFAULT_CLASS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f32; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(values: [f32; FEATURE_COUNT]) -> Self {
        FeatureVector(values)
    }

    /// Parses a raw request body. See [`FeatureVector::from_json`].
    pub fn from_body(body: &[u8]) -> Result<Self, FeatureError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| FeatureError::InvalidJson(e.to_string()))?;
        Self::from_json(&value)
    }

    /// Reads the ten named fields out of a JSON object. Absent keys are
    /// `0.0`; values are not range-checked.
    pub fn from_json(value: &Value) -> Result<Self, FeatureError> {
        let object = value.as_object().ok_or(FeatureError::NotAnObject)?;

        let mut values = [0.0; FEATURE_COUNT];
        for (slot, field) in values.iter_mut().zip(FEATURE_NAMES) {
            *slot = coerce(object, field)?;
        }
        Ok(FeatureVector::new(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

fn coerce(object: &Map<String, Value>, field: &'static str) -> Result<f32, FeatureError> {
    let not_numeric = |value: &Value| FeatureError::NotNumeric {
        field,
        value: value.to_string(),
    };

    match object.get(field) {
        None => Ok(0.0),
        Some(value @ Value::Number(n)) => n
            .as_f64()
            .map(|v| v as f32)
            .ok_or_else(|| not_numeric(value)),
        Some(Value::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
        Some(value @ Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(|v| v as f32)
            .map_err(|_| not_numeric(value)),
        Some(value) => Err(not_numeric(value)),
    }
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub prediction: i64,
    /// Probability of default as a percentage, two decimals.
    pub probability: String,
}

impl PredictionResponse {
    pub fn new(prediction: i64, probabilities: &[f32]) -> Result<Self, InferenceError> {
        let default = probabilities
            .get(DEFAULT_CLASS)
            .ok_or(InferenceError::TooFewClasses(probabilities.len()))?;

        Ok(PredictionResponse {
            prediction,
            probability: format!("{:.2}", f64::from(*default) * 100.0),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fields_are_placed_in_training_order() {
        let body = json!({
            "dependents": 10,
            "late60To89Days": 9,
            "realEstateLoans": 8,
            "late90PlusDays": 7,
            "openCreditLines": 6,
            "monthlyIncome": 5,
            "debtRatio": 4,
            "late30To59Days": 3,
            "age": 2,
            "revolvingUtilization": 1,
        });

        let features = FeatureVector::from_json(&body).unwrap();
        assert_eq!(
            features.as_slice(),
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]
        );
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let features = FeatureVector::from_json(&json!({ "age": 45 })).unwrap();
        let mut expected = [0.0; FEATURE_COUNT];
        expected[1] = 45.0;
        assert_eq!(features, FeatureVector::new(expected));

        let empty = FeatureVector::from_json(&json!({})).unwrap();
        assert_eq!(empty.as_slice(), &[0.0; FEATURE_COUNT]);
    }

    #[test]
    fn numeric_strings_and_booleans_are_coerced() {
        let body = json!({
            "age": "42",
            "debtRatio": " 0.25 ",
            "monthlyIncome": "1e3",
            "dependents": true,
        });
        let features = FeatureVector::from_json(&body).unwrap();
        let values = features.as_slice();
        assert_eq!(values[1], 42.0);
        assert_eq!(values[3], 0.25);
        assert_eq!(values[4], 1000.0);
        assert_eq!(values[9], 1.0);
    }

    #[test]
    fn out_of_range_values_pass_through() {
        let features =
            FeatureVector::from_json(&json!({ "age": -5, "monthlyIncome": -1200.5 })).unwrap();
        assert_eq!(features.as_slice()[1], -5.0);
        assert_eq!(features.as_slice()[4], -1200.5);
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        let err = FeatureVector::from_json(&json!({ "age": "abc" })).unwrap_err();
        assert_eq!(
            err,
            FeatureError::NotNumeric {
                field: "age",
                value: "\"abc\"".to_string(),
            }
        );

        for value in [Value::Null, json!([1]), json!({ "v": 1 })] {
            let body = json!({ "dependents": value });
            assert!(matches!(
                FeatureVector::from_json(&body),
                Err(FeatureError::NotNumeric { field: "dependents", .. })
            ));
        }
    }

    #[test]
    fn body_must_be_a_json_object() {
        assert_eq!(
            FeatureVector::from_json(&json!([1, 2, 3])),
            Err(FeatureError::NotAnObject)
        );
        assert!(matches!(
            FeatureVector::from_body(b"age=42"),
            Err(FeatureError::InvalidJson(_))
        ));
        assert_eq!(FeatureVector::from_body(b"null"), Err(FeatureError::NotAnObject));
    }

    #[test]
    fn probability_is_a_two_decimal_percentage() {
        let response = PredictionResponse::new(1, &[0.125, 0.875]).unwrap();
        assert_eq!(response.prediction, 1);
        assert_eq!(response.probability, "87.50");

        let certain = PredictionResponse::new(1, &[0.0, 1.0]).unwrap();
        assert_eq!(certain.probability, "100.00");

        let none = PredictionResponse::new(0, &[1.0, 0.0]).unwrap();
        assert_eq!(none.probability, "0.00");
    }

    #[test]
    fn single_class_output_is_an_error() {
        assert!(matches!(
            PredictionResponse::new(0, &[1.0]),
            Err(InferenceError::TooFewClasses(1))
        ));
    }
}
