use std::num::ParseIntError;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;
use tract_onnx::prelude::TractError;

use crate::models::ErrorResponse;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid PORT value '{value}': {source}")]
    InvalidPort {
        value: String,
        source: ParseIntError,
    },
}

/// Startup failures of the model loader. A missing artifact is not one of
/// them: the loader reports it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not open model artifact '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("could not load model artifact '{path}': {reason:#}")]
    Model { path: String, reason: TractError },
}

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("field '{field}' is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Tract(#[from] TractError),

    #[error("model produced no {0} output")]
    MissingOutput(&'static str),

    #[error("model returned {0} class probabilities, expected at least 2")]
    TooFewClasses(usize),
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("could not read request body: {0}")]
    Payload(#[from] actix_web::error::PayloadError),

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("inference task failed: {0}")]
    Blocking(#[from] actix_web::error::BlockingError),
}

impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictError::ModelNotLoaded => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    // Only the two fixed messages ever reach the caller.
    fn error_response(&self) -> HttpResponse {
        let error = match self {
            PredictError::ModelNotLoaded => "Model not loaded",
            _ => "Calculation error",
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse { error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_rt::test]
    async fn error_payloads_hide_the_cause() {
        let err = PredictError::from(FeatureError::NotNumeric {
            field: "age",
            value: "\"abc\"".to_string(),
        });
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], br#"{"error":"Calculation error"}"#);
    }

    #[actix_rt::test]
    async fn missing_model_is_a_server_error() {
        let response = PredictError::ModelNotLoaded.error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], br#"{"error":"Model not loaded"}"#);
    }
}
