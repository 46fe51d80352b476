//! Run one prediction request against a model directory on the local machine.
//!
//! Instances are decoded, run through the configured model and encoded into a
//! `{"predictions": [...]}` response.

#![deny(warnings)]
#![deny(missing_docs)]
#![warn(clippy::all)]

use prediction::{
    codec, config::CreateVersionRequest, create_model, Model, ModelRegistry, PredictionClient,
    PredictionError, Result, SessionClient, Stats, Value,
};
use serde::Serialize;
use std::{io::BufRead, path::Path, sync::Arc};

pub use session::DEFAULT_SERVING_SIGNATURE_DEF_KEY;

/// Response of a prediction request.
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    /// One prediction per instance.
    pub predictions: Value,
    /// Timings of the request.
    #[serde(skip)]
    pub stats: Stats,
}

/// Predict `instances` with the model in `model_dir`.
///
/// A custom model class named by the `create_version_request` environment variable is
/// looked up in `registry`; otherwise the default model serves.
pub fn local_predict<P: AsRef<Path>>(
    model_dir: P,
    signature_name: &str,
    instances: Value,
    registry: &ModelRegistry,
) -> Result<PredictResponse> {
    let model_dir = model_dir.as_ref();
    let instances = instances_from_request(codec::decode(instances)?);
    let (session, signature) = session::load_model(model_dir, signature_name)?;
    let client: Arc<dyn PredictionClient> = Arc::new(SessionClient::new(session, signature));
    let request = CreateVersionRequest::from_env()?;
    let model = create_model(registry, request.as_ref(), client, model_dir)?;
    predict(model.as_ref(), instances)
}

/// Predict decoded `instances` with `model` and encode the predictions.
pub fn predict(model: &dyn Model, instances: Vec<Value>) -> Result<PredictResponse> {
    let mut stats = Stats::new();
    let (_, predictions) = model.predict(instances, &mut stats)?;
    let predictions = codec::encode(
        Value::List(predictions.collect()),
        &model.signature().outputs,
    )?;
    Ok(PredictResponse { predictions, stats })
}

/// A list is a list of instances, anything else is a single instance.
pub fn instances_from_request(request: Value) -> Vec<Value> {
    match request {
        Value::List(instances) => instances,
        instance => vec![instance],
    }
}

/// Read newline delimited JSON instances. Blank lines are skipped.
pub fn read_instances<R: BufRead>(reader: R) -> Result<Vec<Value>> {
    let mut instances = vec![];
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| {
            PredictionError::invalid_inputs(format!("Failed to read line {}: {}", i + 1, e))
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let instance = serde_json::from_str(&line).map_err(|e| {
            PredictionError::invalid_inputs(format!(
                "Failed to parse the instance on line {}: {}",
                i + 1,
                e
            ))
        })?;
        instances.push(instance);
    }
    Ok(instances)
}
