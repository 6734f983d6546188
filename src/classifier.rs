use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use log::{error, info};
use tract_onnx::prelude::*;

use crate::error::{InferenceError, LoadError};
use crate::models::{FeatureVector, FEATURE_COUNT};

/// A pre-trained binary classifier. Implementations are read-only after
/// construction and shared across request handlers.
pub trait Classifier: Send + Sync {
    /// Predicted class label.
    fn classify(&self, features: &FeatureVector) -> Result<i64, InferenceError>;

    /// Per-class probabilities, indexed by class label.
    fn score(&self, features: &FeatureVector) -> Result<Vec<f32>, InferenceError>;

    /// Label and probabilities together. The default calls `classify` and
    /// `score` separately; implementations that get both from one inference
    /// run should override it.
    fn predict(&self, features: &FeatureVector) -> Result<(i64, Vec<f32>), InferenceError> {
        Ok((self.classify(features)?, self.score(features)?))
    }
}

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Classifier exported to ONNX. Graphs with two outputs are read as
/// `(label, probabilities)`; a single output is read as probabilities and the
/// label is its arg-max.
pub struct OnnxClassifier {
    plan: OnnxPlan,
}

impl OnnxClassifier {
    pub fn from_reader<R: Read>(reader: &mut R) -> TractResult<Self> {
        let plan = tract_onnx::onnx()
            .model_for_read(reader)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, FEATURE_COUNT)),
            )?
            .into_optimized()?
            .into_runnable()?;

        Ok(Self { plan })
    }

    fn run(&self, features: &FeatureVector) -> Result<TVec<TValue>, InferenceError> {
        let input = Tensor::from_shape(&[1, FEATURE_COUNT], features.as_slice())?;
        Ok(self.plan.run(tvec!(input.into()))?)
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, features: &FeatureVector) -> Result<i64, InferenceError> {
        label(&self.run(features)?)
    }

    fn score(&self, features: &FeatureVector) -> Result<Vec<f32>, InferenceError> {
        scores(&self.run(features)?)
    }

    fn predict(&self, features: &FeatureVector) -> Result<(i64, Vec<f32>), InferenceError> {
        let outputs = self.run(features)?;
        Ok((label(&outputs)?, scores(&outputs)?))
    }
}

fn label(outputs: &[TValue]) -> Result<i64, InferenceError> {
    match outputs {
        [] => Err(InferenceError::MissingOutput("label")),
        [only] => argmax(&probabilities(only)?),
        [label, ..] => {
            let label = label.cast_to::<i64>()?;
            label
                .as_slice::<i64>()?
                .first()
                .copied()
                .ok_or(InferenceError::MissingOutput("label"))
        }
    }
}

fn scores(outputs: &[TValue]) -> Result<Vec<f32>, InferenceError> {
    let output = outputs
        .get(1)
        .or_else(|| outputs.first())
        .ok_or(InferenceError::MissingOutput("probability"))?;
    probabilities(output)
}

fn probabilities(output: &Tensor) -> Result<Vec<f32>, InferenceError> {
    let scores = output.cast_to::<f32>()?;
    Ok(scores.as_slice::<f32>()?.to_vec())
}

fn argmax(scores: &[f32]) -> Result<i64, InferenceError> {
    scores
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(index, _)| index as i64)
        .ok_or(InferenceError::MissingOutput("probability"))
}

/// Loads the model artifact at `path`.
///
/// A missing file is logged and yields `Ok(None)` so the server can start
/// without a model. Any other failure is returned and is fatal at startup.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Option<OnnxClassifier>, LoadError> {
    let path = path.as_ref();
    let shown = path.display().to_string();

    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            error!("model artifact '{}' not found", shown);
            return Ok(None);
        }
        Err(e) => {
            error!("failed to open model artifact '{}': {}", shown, e);
            return Err(LoadError::Io {
                path: shown,
                source: e,
            });
        }
    };

    match OnnxClassifier::from_reader(&mut file) {
        Ok(model) => {
            info!("successfully loaded model '{}'", shown);
            Ok(Some(model))
        }
        Err(reason) => {
            error!("error loading model '{}': {:#}", shown, reason);
            Err(LoadError::Model {
                path: shown,
                reason,
            })
        }
    }
}
