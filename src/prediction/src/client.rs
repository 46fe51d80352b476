//! Inference clients.
//!
//! A [`PredictionClient`] takes a column batch keyed by input aliases and returns a
//! column batch keyed by output aliases. [`SessionClient`] does so on top of a raw
//! execution [`Session`], which only knows storage names.
use crate::{
    error::{PredictionError, Result},
    signature::Signature,
    stats::{Metric, Stats},
    transcode::Batch,
    value::Value,
};
use std::{
    any::Any,
    error::Error,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

/// Name recorded under [`Metric::Engine`] by [`SessionClient`].
pub const SESSION_RUN_ENGINE_NAME: &str = "SessionRun";

/// Raw execution capability of a loaded model.
///
/// `feeds` is keyed by tensor storage names. The result holds one value per entry of
/// `fetches`, in the same order. A session may be shared by concurrent calls.
/// A panic in `run` is reported like any other engine failure.
pub trait Session: Send + Sync {
    /// Run the graph.
    fn run(
        &self,
        feeds: Batch,
        fetches: &[String],
    ) -> std::result::Result<Vec<Value>, Box<dyn Error + Send + Sync>>;
}

/// Produces output columns for input columns.
pub trait PredictionClient: Send + Sync {
    /// Run inference on `inputs`, recording timings into `stats`.
    fn predict(&self, inputs: Batch, stats: &mut Stats) -> Result<Batch>;

    /// Signature of the loaded model.
    fn signature(&self) -> &Signature;
}

impl<S: Session + ?Sized> Session for Arc<S> {
    fn run(
        &self,
        feeds: Batch,
        fetches: &[String],
    ) -> std::result::Result<Vec<Value>, Box<dyn Error + Send + Sync>> {
        (**self).run(feeds, fetches)
    }
}

impl<C: PredictionClient + ?Sized> PredictionClient for Arc<C> {
    fn predict(&self, inputs: Batch, stats: &mut Stats) -> Result<Batch> {
        (**self).predict(inputs, stats)
    }

    fn signature(&self) -> &Signature {
        (**self).signature()
    }
}

/// A [`PredictionClient`] running a [`Session`].
pub struct SessionClient<S> {
    session: S,
    signature: Arc<Signature>,
    output_tensors: Vec<String>,
}

impl<S: Session> SessionClient<S> {
    /// Create a client for `session` described by `signature`.
    pub fn new(session: S, signature: Arc<Signature>) -> Self {
        let output_tensors = signature
            .outputs
            .values()
            .map(|info| info.name.clone())
            .collect();
        SessionClient {
            session,
            signature,
            output_tensors,
        }
    }

    /// The shared signature.
    pub fn shared_signature(&self) -> Arc<Signature> {
        Arc::clone(&self.signature)
    }
}

impl<S: Session> PredictionClient for SessionClient<S> {
    fn predict(&self, inputs: Batch, stats: &mut Stats) -> Result<Batch> {
        stats.set_label(Metric::Engine, SESSION_RUN_ENGINE_NAME);

        let unaliased = stats.time(Metric::UnaliasTime, |_| {
            inputs
                .into_iter()
                .map(|(alias, value)| match self.signature.inputs.get(&alias) {
                    Some(info) => Ok((info.name.clone(), value)),
                    None => Err(PredictionError::invalid_inputs(format!(
                        "Input mismatch: unknown input alias {:?}, expected one of {:?}",
                        alias,
                        self.signature.inputs.keys().collect::<Vec<_>>()
                    ))),
                })
                .collect::<Result<Batch>>()
        })?;

        let outputs = stats.time(Metric::SessionRunTime, |_| {
            let outputs = panic::catch_unwind(AssertUnwindSafe(|| {
                self.session.run(unaliased, &self.output_tensors)
            }))
            .unwrap_or_else(|payload| Err(panic_message(payload).into()))
            .map_err(|e| {
                log::error!("Exception during running the graph: {}", e);
                PredictionError::failed_to_run_graph(format!(
                    "Exception during running the graph: {}",
                    e
                ))
            })?;
            if outputs.len() != self.output_tensors.len() {
                log::error!(
                    "Engine returned {} outputs for {} fetches",
                    outputs.len(),
                    self.output_tensors.len()
                );
                return Err(PredictionError::failed_to_run_graph(format!(
                    "Exception during running the graph: expected {} outputs, got {}",
                    self.output_tensors.len(),
                    outputs.len()
                )));
            }
            Ok(outputs)
        })?;

        stats.time(Metric::AliasTime, |_| {
            Ok(self
                .signature
                .outputs
                .keys()
                .cloned()
                .zip(outputs)
                .collect())
        })
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let message = match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast_ref::<&str>() {
            Some(message) => message.to_string(),
            None => "unknown cause".to_string(),
        },
    };
    format!("engine panicked: {}", message)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::{
        error::ErrorKind,
        signature::{DataType, TensorInfo},
    };
    use serde_json::json;
    use std::sync::Mutex;

    /// Engine answering every fetch from a fixed table, remembering the last feeds.
    pub(crate) struct FakeSession {
        pub outputs: Vec<(String, Value)>,
        pub last_feeds: Mutex<Option<Batch>>,
    }

    impl FakeSession {
        pub fn new(outputs: Vec<(&str, Value)>) -> Self {
            FakeSession {
                outputs: outputs
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value))
                    .collect(),
                last_feeds: Mutex::new(None),
            }
        }
    }

    impl Session for FakeSession {
        fn run(
            &self,
            feeds: Batch,
            fetches: &[String],
        ) -> std::result::Result<Vec<Value>, Box<dyn Error + Send + Sync>> {
            *self.last_feeds.lock().unwrap() = Some(feeds);
            fetches
                .iter()
                .map(|fetch| {
                    self.outputs
                        .iter()
                        .find(|(name, _)| name == fetch)
                        .map(|(_, value)| value.clone())
                        .ok_or_else(|| format!("no tensor named {}", fetch).into())
                })
                .collect()
        }
    }

    pub(crate) fn signature() -> Arc<Signature> {
        Arc::new(
            Signature::new()
                .input("x", TensorInfo::new("x:0", DataType::Float))
                .input("key", TensorInfo::new("key:0", DataType::String))
                .output("scores", TensorInfo::new("scores:0", DataType::Float))
                .output("label", TensorInfo::new("label:0", DataType::Int64)),
        )
    }

    fn batch(v: serde_json::Value) -> Batch {
        match Value::from(v) {
            Value::Map(map) => map,
            other => panic!("not a map: {:?}", other),
        }
    }

    #[test]
    fn test_predict_translates_aliases() {
        let session = FakeSession::new(vec![
            ("label:0", Value::from(json!([1, 0]))),
            ("scores:0", Value::from(json!([[0.1, 0.9], [0.7, 0.3]]))),
        ]);
        let client = SessionClient::new(session, signature());
        let mut stats = Stats::new();
        let outputs = client
            .predict(batch(json!({"x": [1.0, 2.0], "key": ["a", "b"]})), &mut stats)
            .unwrap();
        assert_eq!(
            outputs,
            batch(json!({"scores": [[0.1, 0.9], [0.7, 0.3]], "label": [1, 0]}))
        );
        assert_eq!(outputs.keys().collect::<Vec<_>>(), vec!["scores", "label"]);
        let feeds = client.session.last_feeds.lock().unwrap().take().unwrap();
        assert_eq!(feeds.keys().collect::<Vec<_>>(), vec!["x:0", "key:0"]);
        assert_eq!(stats.label(Metric::Engine), Some(SESSION_RUN_ENGINE_NAME));
        assert!(stats.contains(Metric::UnaliasTime));
        assert!(stats.contains(Metric::SessionRunTime));
        assert!(stats.contains(Metric::AliasTime));
    }

    #[test]
    fn test_unknown_alias() {
        let client = SessionClient::new(FakeSession::new(vec![]), signature());
        let mut stats = Stats::new();
        let err = client
            .predict(batch(json!({"y": [1.0]})), &mut stats)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInputs);
        assert!(err.detail().starts_with("Input mismatch"));
        assert!(!stats.contains(Metric::SessionRunTime));
    }

    #[test]
    fn test_engine_failure_is_wrapped() {
        let client = SessionClient::new(FakeSession::new(vec![]), signature());
        let mut stats = Stats::new();
        let err = client
            .predict(batch(json!({"x": [1.0]})), &mut stats)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FailedToRunGraph);
        assert!(err.detail().contains("no tensor named scores:0"));
        assert!(stats.contains(Metric::UnaliasTime));
        assert!(!stats.contains(Metric::AliasTime));
    }

    struct ShortSession;

    impl Session for ShortSession {
        fn run(
            &self,
            _feeds: Batch,
            _fetches: &[String],
        ) -> std::result::Result<Vec<Value>, Box<dyn Error + Send + Sync>> {
            Ok(vec![Value::Int(1)])
        }
    }

    struct PanickingSession;

    impl Session for PanickingSession {
        fn run(
            &self,
            _feeds: Batch,
            _fetches: &[String],
        ) -> std::result::Result<Vec<Value>, Box<dyn Error + Send + Sync>> {
            panic!("kernel launch failed on device {}", 0)
        }
    }

    #[test]
    fn test_engine_panic_is_wrapped() {
        let client = SessionClient::new(PanickingSession, signature());
        let mut stats = Stats::new();
        let err = client
            .predict(batch(json!({"x": [1.0]})), &mut stats)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FailedToRunGraph);
        assert!(err
            .detail()
            .contains("engine panicked: kernel launch failed on device 0"));
        assert!(!stats.contains(Metric::SessionRunTime));
    }

    #[test]
    fn test_missing_engine_outputs() {
        let client = SessionClient::new(ShortSession, signature());
        let err = client
            .predict(batch(json!({"x": [1.0]})), &mut Stats::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FailedToRunGraph);
    }
}
