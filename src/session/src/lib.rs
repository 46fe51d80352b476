//! Loaded models for prediction.
//!
//! A model directory carries a `model.json` manifest naming its signatures and the
//! engine library that runs the graph.
#![deny(warnings)]
#![deny(missing_docs)]
#![warn(clippy::all)]

mod bundle;
mod library;

pub use bundle::{
    load_model, select_signature, ModelManifest, SignatureDef, TensorRef,
    DEFAULT_SERVING_SIGNATURE_DEF_KEY, MODEL_MANIFEST, SERVING_DEFAULT_FROM_NAMED_KEY,
};
pub use library::{LibrarySession, BUFFER_FREE_SYMBOL, SESSION_RUN_SYMBOL};
