use std::sync::Arc;

use actix_web::http::header::ContentType;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use log::{error, info, warn};
use uuid::Uuid;

use crate::classifier::Classifier;
use crate::error::PredictError;
use crate::models::{FeatureVector, PredictionResponse};

const PREDICT_PAGE: &str = include_str!("../static/predict.html");

/// Largest accepted `/predict` body.
pub const MAX_BODY_BYTES: usize = 256 * 1024;

/// Process-wide state, built once at startup.
#[derive(Clone)]
pub struct AppState {
    model: Option<Arc<dyn Classifier>>,
}

impl AppState {
    pub fn new(model: Option<Arc<dyn Classifier>>) -> Self {
        AppState { model }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/predict").route(web::post().to(predict)));
}

pub async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(PREDICT_PAGE)
}

pub async fn predict(
    state: web::Data<AppState>,
    payload: web::Payload,
) -> Result<HttpResponse, PredictError> {
    let request_id = Uuid::new_v4();
    let Some(model) = state.model.clone() else {
        warn!("[{}] prediction requested but no model is loaded", request_id);
        return Err(PredictError::ModelNotLoaded);
    };

    let result = match read_body(payload).await {
        Ok(body) => web::block(move || run_prediction(model.as_ref(), &body))
            .await
            .map_err(PredictError::from)
            .and_then(|result| result),
        Err(e) => Err(e),
    };

    match result {
        Ok(response) => {
            info!(
                "[{}] prediction={} probability={}%",
                request_id, response.prediction, response.probability
            );
            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) => {
            error!("[{}] prediction error: {}", request_id, e);
            Err(e)
        }
    }
}

// Read by hand so an oversized body fails through `PredictError` instead of
// the extractor's plain-text 413.
async fn read_body(mut payload: web::Payload) -> Result<web::BytesMut, PredictError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(PredictError::BodyTooLarge(MAX_BODY_BYTES));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

pub fn run_prediction(
    model: &dyn Classifier,
    body: &[u8],
) -> Result<PredictionResponse, PredictError> {
    let features = FeatureVector::from_body(body)?;
    let (prediction, probabilities) = model.predict(&features)?;
    Ok(PredictionResponse::new(prediction, &probabilities)?)
}
