use crate::library::LibrarySession;
use indexmap::IndexMap;
use prediction::{DataType, PredictionError, Result, Signature, TensorInfo};
use serde::Deserialize;
use std::{
    fs,
    io::ErrorKind as IoErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

/// File name of the manifest inside a model directory.
pub const MODEL_MANIFEST: &str = "model.json";

/// Signature key served when none is requested.
pub const DEFAULT_SERVING_SIGNATURE_DEF_KEY: &str = "serving_default";

/// Signature key preferred over any requested one when present.
pub const SERVING_DEFAULT_FROM_NAMED_KEY: &str = "serving_default_from_named";

/// Contents of `model.json`.
#[derive(Clone, Debug, Deserialize)]
pub struct ModelManifest {
    /// Engine library, relative to the model directory unless absolute.
    pub library: PathBuf,
    /// Element type of every tensor in the graph, by storage name.
    #[serde(default)]
    pub tensors: IndexMap<String, DataType>,
    /// Signatures by key.
    #[serde(default)]
    pub signature_def: IndexMap<String, SignatureDef>,
}

/// One signature as written in the manifest.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SignatureDef {
    /// Input aliases.
    #[serde(default)]
    pub inputs: IndexMap<String, TensorRef>,
    /// Output aliases.
    #[serde(default)]
    pub outputs: IndexMap<String, TensorRef>,
}

/// A tensor reference whose element type may be left to the graph.
#[derive(Clone, Debug, Deserialize)]
pub struct TensorRef {
    /// Storage name.
    pub name: String,
    /// Declared element type.
    #[serde(default)]
    pub dtype: Option<DataType>,
}

impl ModelManifest {
    /// Read the manifest of the model directory `model_path`.
    pub fn read<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let manifest_path = model_path.as_ref().join(MODEL_MANIFEST);
        let buf = fs::read(&manifest_path).map_err(|e| match e.kind() {
            IoErrorKind::NotFound => PredictionError::failed_to_load_model(format!(
                "Only models saved with a {} manifest are supported; none found at {}.",
                MODEL_MANIFEST,
                manifest_path.display()
            )),
            _ => bad_model_data(&manifest_path, e),
        })?;
        serde_json::from_slice(&buf).map_err(|e| bad_model_data(&manifest_path, e))
    }

    /// Path of the engine library for a model living in `model_path`.
    pub fn library_path<P: AsRef<Path>>(&self, model_path: P) -> PathBuf {
        if self.library.is_absolute() {
            self.library.clone()
        } else {
            model_path.as_ref().join(&self.library)
        }
    }
}

fn bad_model_data(path: &Path, e: impl std::fmt::Display) -> PredictionError {
    PredictionError::failed_to_load_model(format!(
        "Failed to load the model due to bad model data. {}: {}",
        path.display(),
        e
    ))
}

/// Load the model in `model_path`, serving the signature under `signature_name`.
pub fn load_model<P: AsRef<Path>>(
    model_path: P,
    signature_name: &str,
) -> Result<(LibrarySession, Arc<Signature>)> {
    let model_path = model_path.as_ref();
    let manifest = ModelManifest::read(model_path)?;
    let signature = select_signature(&manifest, signature_name)?;
    let session = LibrarySession::open(manifest.library_path(model_path))?;
    log::info!(
        "Loaded model {} with {} inputs and {} outputs",
        model_path.display(),
        signature.inputs.len(),
        signature.outputs.len()
    );
    Ok((session, Arc::new(signature)))
}

/// Pick the signature to serve and complete its element types from the graph.
///
/// A `serving_default_from_named` signature wins over `signature_name`.
pub fn select_signature(manifest: &ModelManifest, signature_name: &str) -> Result<Signature> {
    if manifest.signature_def.is_empty() {
        return Err(PredictionError::failed_to_load_model(
            "MetaGraph must have at least one signature_def.",
        ));
    }
    if manifest.signature_def.len() > 1 {
        log::warn!(
            "MetaGraph has multiple signatures {}. Support for multiple signatures is \
             limited. By default we select named signatures.",
            manifest.signature_def.len()
        );
    }
    let signature_def = manifest
        .signature_def
        .get(SERVING_DEFAULT_FROM_NAMED_KEY)
        .or_else(|| manifest.signature_def.get(signature_name))
        .ok_or_else(|| {
            PredictionError::failed_to_load_model(format!(
                "No signature found for signature key {}.",
                signature_name
            ))
        })?;

    Ok(Signature {
        inputs: update_dtypes(&manifest.tensors, &signature_def.inputs)?,
        outputs: update_dtypes(&manifest.tensors, &signature_def.outputs)?,
    })
}

fn update_dtypes(
    tensors: &IndexMap<String, DataType>,
    interface: &IndexMap<String, TensorRef>,
) -> Result<IndexMap<String, TensorInfo>> {
    interface
        .iter()
        .map(|(alias, tensor)| {
            let graph_dtype = *tensors.get(&tensor.name).ok_or_else(|| {
                PredictionError::failed_to_load_model(format!(
                    "Tensor {} of alias {} is not in the graph.",
                    tensor.name, alias
                ))
            })?;
            match tensor.dtype {
                Some(dtype) if dtype != graph_dtype => {
                    Err(PredictionError::failed_to_load_model(format!(
                        "Specified data types do not match for alias {}. \
                         Graph has {} while TensorInfo reports {}.",
                        alias, graph_dtype, dtype
                    )))
                }
                _ => Ok((alias.clone(), TensorInfo::new(tensor.name.clone(), graph_dtype))),
            }
        })
        .collect()
}
