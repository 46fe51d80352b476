#![deny(warnings)]
#![deny(missing_docs)]
#![warn(clippy::all)]

//! Prediction runs inference requests against a loaded model.
//! Row-oriented request instances are turned into column batches for the engine,
//! and the engine's column batches are turned back into response rows.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod signature;
pub mod stats;
pub mod timer;
pub mod transcode;
pub mod value;

pub use client::{PredictionClient, Session, SessionClient};
pub use error::{ErrorKind, PredictionError, Result};
pub use model::{DefaultModel, Model};
pub use registry::{create_model, load_model_class, ModelClass, ModelRegistry};
pub use signature::{DataType, Signature, TensorInfo};
pub use stats::{Metric, Stat, Stats};
pub use transcode::{Batch, Rows};
pub use value::Value;
