//! Model signature: the aliases a loaded model accepts and produces.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a model tensor.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 16-bit float.
    #[serde(rename = "DT_HALF")]
    Half,
    /// 32-bit float.
    #[serde(rename = "DT_FLOAT")]
    Float,
    /// 64-bit float.
    #[serde(rename = "DT_DOUBLE")]
    Double,
    /// Signed 8-bit integer.
    #[serde(rename = "DT_INT8")]
    Int8,
    /// Signed 16-bit integer.
    #[serde(rename = "DT_INT16")]
    Int16,
    /// Signed 32-bit integer.
    #[serde(rename = "DT_INT32")]
    Int32,
    /// Signed 64-bit integer.
    #[serde(rename = "DT_INT64")]
    Int64,
    /// Unsigned 8-bit integer.
    #[serde(rename = "DT_UINT8")]
    Uint8,
    /// Unsigned 16-bit integer.
    #[serde(rename = "DT_UINT16")]
    Uint16,
    /// Boolean.
    #[serde(rename = "DT_BOOL")]
    Bool,
    /// Variable length byte string.
    #[serde(rename = "DT_STRING")]
    String,
}

impl DataType {
    /// Name used in model manifests.
    pub const fn as_str(self) -> &'static str {
        match self {
            DataType::Half => "DT_HALF",
            DataType::Float => "DT_FLOAT",
            DataType::Double => "DT_DOUBLE",
            DataType::Int8 => "DT_INT8",
            DataType::Int16 => "DT_INT16",
            DataType::Int32 => "DT_INT32",
            DataType::Int64 => "DT_INT64",
            DataType::Uint8 => "DT_UINT8",
            DataType::Uint16 => "DT_UINT16",
            DataType::Bool => "DT_BOOL",
            DataType::String => "DT_STRING",
        }
    }

    /// Whether tensors of this type hold strings/bytes.
    pub fn is_string(self) -> bool {
        self == DataType::String
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of one aliased tensor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TensorInfo {
    /// Storage name of the tensor inside the engine.
    pub name: String,
    /// Declared element type.
    pub dtype: DataType,
}

impl TensorInfo {
    /// Create tensor info.
    pub fn new(name: impl Into<String>, dtype: DataType) -> Self {
        TensorInfo {
            name: name.into(),
            dtype,
        }
    }
}

/// Input and output aliases of a loaded model.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    /// Input alias to tensor.
    pub inputs: IndexMap<String, TensorInfo>,
    /// Output alias to tensor.
    pub outputs: IndexMap<String, TensorInfo>,
}

impl Signature {
    /// Empty signature.
    pub fn new() -> Self {
        Signature::default()
    }

    /// Add an input alias.
    pub fn input(mut self, alias: impl Into<String>, info: TensorInfo) -> Self {
        self.inputs.insert(alias.into(), info);
        self
    }

    /// Add an output alias.
    pub fn output(mut self, alias: impl Into<String>, info: TensorInfo) -> Self {
        self.outputs.insert(alias.into(), info);
        self
    }

    /// The sole input alias, if the model has exactly one input.
    pub fn single_input(&self) -> Option<(&String, &TensorInfo)> {
        if self.inputs.len() == 1 {
            self.inputs.first()
        } else {
            None
        }
    }
}
