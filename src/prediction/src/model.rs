//! Models turn request instances into predictions.
use crate::{
    client::PredictionClient,
    error::{PredictionError, Result},
    signature::{DataType, Signature},
    stats::{Metric, Stats},
    transcode::{self, Batch, Rows},
    value::Value,
};
use indexmap::IndexMap;
use std::{error::Error, path::Path};

/// Per instance preprocessing applied before the model runs.
pub type PreprocessFn =
    dyn Fn(Value) -> std::result::Result<Value, Box<dyn Error + Send + Sync>> + Send + Sync;

/// Everything that can serve predictions implements Model.
/// A model is immutable once built, so one instance can serve concurrent calls.
pub trait Model: Send + Sync {
    /// Predict on a list of instances.
    ///
    /// Returns the inputs echoed back and the output rows, positionally matched.
    fn predict(&self, instances: Vec<Value>, stats: &mut Stats) -> Result<(Vec<Value>, Rows)>;

    /// Signature of the underlying model.
    fn signature(&self) -> &Signature;
}

/// Model used when no custom model class is configured.
///
/// It normalizes single-input instances, optionally preprocesses them, hands a column
/// batch to the client and turns the client's columns back into rows.
pub struct DefaultModel {
    client: Box<dyn PredictionClient>,
    preprocess_fn: Option<Box<PreprocessFn>>,
}

impl DefaultModel {
    /// Create a model on top of `client`.
    pub fn new(client: Box<dyn PredictionClient>) -> Self {
        DefaultModel {
            client,
            preprocess_fn: None,
        }
    }

    /// Create the default model for a client and the model data at `model_path`.
    pub fn from_client(client: Box<dyn PredictionClient>, _model_path: &Path) -> Self {
        DefaultModel::new(client)
    }

    /// Run `preprocess_fn` on every single-input instance before prediction.
    ///
    /// Only single-input models preprocess; a multi-input model keeps the function
    /// (so [`DefaultModel::need_preprocess`] is true) but never calls it.
    pub fn with_preprocess<F>(mut self, preprocess_fn: F) -> Self
    where
        F: 'static
            + Fn(Value) -> std::result::Result<Value, Box<dyn Error + Send + Sync>>
            + Send
            + Sync,
    {
        self.preprocess_fn = Some(Box::new(preprocess_fn));
        self
    }

    /// Whether a preprocessing function is installed.
    pub fn need_preprocess(&self) -> bool {
        self.preprocess_fn.is_some()
    }

    /// Whether the model has exactly one input.
    pub fn is_single_input(&self) -> bool {
        self.signature().inputs.len() == 1
    }

    /// Whether the model has exactly one input, of string type.
    pub fn is_single_string_input(&self) -> bool {
        self.signature()
            .single_input()
            .map_or(false, |(_, info)| info.dtype.is_string())
    }

    /// Output alias to declared type.
    pub fn outputs_type_map(&self) -> IndexMap<String, DataType> {
        self.signature()
            .outputs
            .iter()
            .map(|(alias, info)| (alias.clone(), info.dtype))
            .collect()
    }

    fn single_input_name(&self) -> Option<&str> {
        self.signature()
            .single_input()
            .map(|(alias, _)| alias.as_str())
    }

    /// A single-input model accepts `{"<input>": value}` or the bare `value`.
    ///
    /// Returns the normalized instances, echoed back with the outputs, and the
    /// instances to feed to the client.
    fn maybe_preprocess(&self, instances: Vec<Value>) -> Result<(Vec<Value>, Vec<Value>)> {
        let input_name = match self.single_input_name() {
            Some(name) => name,
            None => return Ok((instances.clone(), instances)),
        };
        let normalized = instances
            .into_iter()
            .map(|instance| parse_single_tensor(instance, input_name))
            .collect::<Result<Vec<_>>>()?;
        let preprocessed = self.preprocess(normalized.clone())?;
        Ok((normalized, preprocessed))
    }

    fn preprocess(&self, instances: Vec<Value>) -> Result<Vec<Value>> {
        let preprocess_fn = match &self.preprocess_fn {
            Some(f) => f,
            None => return Ok(instances),
        };
        instances
            .into_iter()
            .map(|instance| {
                preprocess_fn(instance).map_err(|e| {
                    log::error!("Exception during preprocessing: {}", e);
                    PredictionError::invalid_inputs(format!(
                        "Exception during preprocessing: {}",
                        e
                    ))
                })
            })
            .collect()
    }

    fn get_columns(&self, instances: Vec<Value>) -> Result<Batch> {
        match self.single_input_name() {
            Some(input_name) => {
                let mut columns = Batch::with_capacity(1);
                columns.insert(input_name.to_string(), Value::List(instances));
                Ok(columns)
            }
            None => transcode::columnarize(instances),
        }
    }
}

fn parse_single_tensor(instance: Value, input_name: &str) -> Result<Value> {
    match instance {
        Value::Map(mut fields) => {
            if fields.len() == 1 && fields.contains_key(input_name) {
                Ok(fields.swap_remove(input_name).unwrap_or(Value::Null))
            } else {
                Err(PredictionError::invalid_inputs(format!(
                    "Expected tensor name: {}, got tensor name: {:?}.",
                    input_name,
                    fields.keys().collect::<Vec<_>>()
                )))
            }
        }
        other => Ok(other),
    }
}

/// A batch of one may come back without its batch dimension.
fn listify(value: Value) -> Value {
    match value {
        Value::List(list) => Value::List(list),
        other => Value::List(vec![other]),
    }
}

impl Model for DefaultModel {
    fn predict(&self, instances: Vec<Value>, stats: &mut Stats) -> Result<(Vec<Value>, Rows)> {
        let single_input = self.single_input_name().map(str::to_string);

        let (reflected, preprocessed) =
            stats.time(Metric::PreprocessTime, |_| self.maybe_preprocess(instances))?;

        let num_instances = preprocessed.len();
        let columns = stats.time(Metric::ColumnarizeTime, |_| {
            let columns = self.get_columns(preprocessed)?;
            for (name, column) in &columns {
                if let Value::List(values) = column {
                    if values.len() != num_instances {
                        return Err(PredictionError::invalid_inputs(format!(
                            "Input {} was missing in at least one input instance.",
                            name
                        )));
                    }
                }
            }
            Ok(columns)
        })?;

        let outputs = stats.time(Metric::EngineRunTime, |stats| {
            self.client.predict(columns, stats)
        })?;

        let outputs = stats.time(Metric::RowifyTime, |_| {
            let outputs = outputs
                .into_iter()
                .map(|(alias, value)| (alias, listify(value)))
                .collect();
            transcode::rowify(outputs)
        })?;

        let inputs = stats.time(Metric::InputProcessingTime, |_| {
            Ok(match &single_input {
                Some(input_name) => reflected
                    .into_iter()
                    .map(|value| {
                        let mut fields = IndexMap::with_capacity(1);
                        fields.insert(input_name.clone(), value);
                        Value::Map(fields)
                    })
                    .collect(),
                None => reflected,
            })
        })?;

        log::debug!(
            "prediction stats: {}",
            serde_json::to_string(&*stats).unwrap_or_default()
        );
        Ok((inputs, outputs))
    }

    fn signature(&self) -> &Signature {
        self.client.signature()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        client::{
            test::{signature, FakeSession},
            SessionClient,
        },
        error::ErrorKind,
        signature::TensorInfo,
    };
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn values(v: serde_json::Value) -> Vec<Value> {
        match Value::from(v) {
            Value::List(list) => list,
            other => vec![other],
        }
    }

    fn single_input_model(outputs: Vec<(&str, Value)>) -> DefaultModel {
        let signature = Signature::new()
            .input("x", TensorInfo::new("x:0", DataType::String))
            .output("y", TensorInfo::new("y:0", DataType::Float));
        let client = SessionClient::new(FakeSession::new(outputs), Arc::new(signature));
        DefaultModel::from_client(Box::new(client), Path::new("unused"))
    }

    #[test]
    fn test_multi_input_predict() {
        let session = FakeSession::new(vec![
            ("label:0", Value::from(json!([1, 0]))),
            ("scores:0", Value::from(json!([[0.1, 0.9], [0.7, 0.3]]))),
        ]);
        let model = DefaultModel::new(Box::new(SessionClient::new(session, signature())));
        assert!(!model.is_single_input());
        let instances = values(json!([{"x": 1.0, "key": "a"}, {"x": 2.0, "key": "b"}]));
        let mut stats = Stats::new();
        let (inputs, outputs) = model.predict(instances.clone(), &mut stats).unwrap();
        assert_eq!(inputs, instances);
        assert_eq!(
            outputs.collect::<Vec<_>>(),
            values(json!([
                {"scores": [0.1, 0.9], "label": 1},
                {"scores": [0.7, 0.3], "label": 0}
            ]))
        );
        for metric in &[
            Metric::PreprocessTime,
            Metric::ColumnarizeTime,
            Metric::EngineRunTime,
            Metric::SessionRunTime,
            Metric::RowifyTime,
            Metric::InputProcessingTime,
        ] {
            assert!(stats.contains(*metric), "{} missing", metric);
        }
    }

    #[test]
    fn test_single_input_accepts_named_and_bare() {
        let model = single_input_model(vec![("y:0", Value::from(json!([0.5, 0.25])))]);
        assert!(model.is_single_input());
        assert!(model.is_single_string_input());
        let instances = values(json!([{"x": "abc"}, "def"]));
        let (inputs, outputs) = model.predict(instances, &mut Stats::new()).unwrap();
        assert_eq!(inputs, values(json!([{"x": "abc"}, {"x": "def"}])));
        assert_eq!(outputs.collect::<Vec<_>>(), values(json!([{"y": 0.5}, {"y": 0.25}])));
    }

    #[test]
    fn test_single_input_wrong_name() {
        let model = single_input_model(vec![("y:0", Value::from(json!([0.5])))]);
        let err = model
            .predict(values(json!([{"z": "abc"}])), &mut Stats::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInputs);
        assert!(err.detail().contains("Expected tensor name: x"));
    }

    #[test]
    fn test_scalar_output_is_listified() {
        let model = single_input_model(vec![("y:0", Value::Float(0.5))]);
        let (_, outputs) = model
            .predict(values(json!(["abc"])), &mut Stats::new())
            .unwrap();
        assert_eq!(outputs.collect::<Vec<_>>(), values(json!([{"y": 0.5}])));
    }

    #[test]
    fn test_preprocess() {
        let session = FakeSession::new(vec![("y:0", Value::from(json!([1.0])))]);
        let signature = Signature::new()
            .input("x", TensorInfo::new("x:0", DataType::String))
            .output("y", TensorInfo::new("y:0", DataType::Float));
        let model = DefaultModel::new(Box::new(SessionClient::new(session, Arc::new(signature))))
            .with_preprocess(|value| match value {
                Value::String(s) => Ok(Value::String(s.to_uppercase())),
                other => Err(format!("cannot preprocess a {}", other.kind()).into()),
            });
        assert!(model.need_preprocess());
        let (inputs, _) = model
            .predict(values(json!(["abc"])), &mut Stats::new())
            .unwrap();
        assert_eq!(inputs, values(json!([{"x": "abc"}])));

        let err = model
            .predict(values(json!([1])), &mut Stats::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInputs);
        assert!(err.detail().starts_with("Exception during preprocessing"));
    }

    #[test]
    fn test_multi_input_skips_preprocess() {
        let session = FakeSession::new(vec![
            ("label:0", Value::from(json!([1]))),
            ("scores:0", Value::from(json!([[0.1, 0.9]]))),
        ]);
        let model = DefaultModel::new(Box::new(SessionClient::new(session, signature())))
            .with_preprocess(|_| Err("must not run".into()));
        assert!(model.need_preprocess());
        let instances = values(json!([{"x": 1.0, "key": "a"}]));
        let (inputs, outputs) = model.predict(instances.clone(), &mut Stats::new()).unwrap();
        assert_eq!(inputs, instances);
        assert_eq!(outputs.len(), 1);
    }

    #[test]
    fn test_preprocessed_values_reach_the_engine() {
        let session = Arc::new(FakeSession::new(vec![("y:0", Value::from(json!([1.0])))]));
        let signature = Signature::new()
            .input("x", TensorInfo::new("x:0", DataType::String))
            .output("y", TensorInfo::new("y:0", DataType::Float));
        let client = SessionClient::new(Arc::clone(&session), Arc::new(signature));
        let model = DefaultModel::new(Box::new(client))
            .with_preprocess(|_| Ok(Value::from("preprocessed")));
        model
            .predict(values(json!(["abc"])), &mut Stats::new())
            .unwrap();
        let feeds = session.last_feeds.lock().unwrap().take().unwrap();
        assert_eq!(feeds["x:0"], values(json!([["preprocessed"]]))[0]);
    }

    struct CountingClient {
        signature: Signature,
        calls: AtomicUsize,
    }

    impl PredictionClient for CountingClient {
        fn predict(&self, inputs: Batch, _stats: &mut Stats) -> Result<Batch> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(inputs)
        }

        fn signature(&self) -> &Signature {
            &self.signature
        }
    }

    #[test]
    fn test_missing_input_field() {
        let client = Arc::new(CountingClient {
            signature: Signature::new()
                .input("a", TensorInfo::new("a:0", DataType::Float))
                .input("b", TensorInfo::new("b:0", DataType::Float))
                .output("a", TensorInfo::new("a:0", DataType::Float)),
            calls: AtomicUsize::new(0),
        });
        let model = DefaultModel::new(Box::new(Arc::clone(&client)));
        let mut stats = Stats::new();
        let err = model
            .predict(values(json!([{"a": 1.0, "b": 2.0}, {"a": 3.0}])), &mut stats)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInputs);
        assert_eq!(
            err.detail(),
            "Input b was missing in at least one input instance."
        );
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert!(stats.contains(Metric::PreprocessTime));
        assert!(!stats.contains(Metric::EngineRunTime));
        assert!(!stats.contains(Metric::RowifyTime));
    }

    #[test]
    fn test_inconsistent_outputs() {
        let session = FakeSession::new(vec![
            ("label:0", Value::from(json!([1]))),
            ("scores:0", Value::from(json!([[0.1, 0.9], [0.7, 0.3]]))),
        ]);
        let model = DefaultModel::new(Box::new(SessionClient::new(session, signature())));
        let err = model
            .predict(
                values(json!([{"x": 1.0, "key": "a"}, {"x": 2.0, "key": "b"}])),
                &mut Stats::new(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOutputs);
    }

    #[test]
    fn test_concurrent_predictions() {
        let model = Arc::new(single_input_model(vec![(
            "y:0",
            Value::from(json!([0.5])),
        )]));
        crossbeam::scope(|scope| {
            for i in 0..8 {
                let model = Arc::clone(&model);
                scope.spawn(move |_| {
                    let instance = Value::from(format!("instance-{}", i));
                    let mut stats = Stats::new();
                    let (inputs, outputs) = model.predict(vec![instance], &mut stats).unwrap();
                    assert_eq!(
                        inputs,
                        values(json!([{ "x": format!("instance-{}", i) }]))
                    );
                    assert_eq!(outputs.len(), 1);
                    assert!(stats.contains(Metric::EngineRunTime));
                });
            }
        })
        .unwrap();
    }

    #[test]
    fn test_outputs_type_map() {
        let model = single_input_model(vec![]);
        let types = model.outputs_type_map();
        assert_eq!(types.get("y"), Some(&DataType::Float));
    }
}
