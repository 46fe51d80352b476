//! Binary payload codec.
//!
//! JSON can't carry raw bytes, so binary fields travel as `{"b64": "<base64>"}`.
//! Requests are decoded before prediction; outputs declared as binary are encoded
//! before the response is written.
use crate::{
    error::{PredictionError, Result},
    signature::TensorInfo,
    value::Value,
};
use base64::{engine::general_purpose, Engine as _};
use indexmap::IndexMap;

/// Key marking a base64 wrapped binary value.
pub const B64_KEY: &str = "b64";

/// Suffix of output aliases whose string content is binary.
pub const BYTES_SUFFIX: &str = "_bytes";

/// Replace every `{"b64": ...}` mapping with the decoded bytes.
pub fn decode(data: Value) -> Result<Value> {
    match data {
        Value::List(list) => list
            .into_iter()
            .map(decode)
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Value::Map(mut map) => {
            if map.len() == 1 && map.contains_key(B64_KEY) {
                match map.swap_remove(B64_KEY) {
                    Some(Value::String(encoded)) => {
                        // line wrapped base64 is accepted, padding stays strict
                        let encoded: Vec<u8> = encoded
                            .bytes()
                            .filter(|b| !b.is_ascii_whitespace())
                            .collect();
                        general_purpose::STANDARD
                            .decode(&encoded)
                            .map(Value::Bytes)
                            .map_err(|e| {
                                PredictionError::invalid_inputs(format!(
                                    "Failed to decode a b64 value: {}",
                                    e
                                ))
                            })
                    }
                    Some(other) => Err(PredictionError::invalid_inputs(format!(
                        "Expected a base64 string for key {:?}, got a {}.",
                        B64_KEY,
                        other.kind()
                    ))),
                    None => Ok(Value::Map(map)),
                }
            } else {
                map.into_iter()
                    .map(|(k, v)| decode(v).map(|v| (k, v)))
                    .collect::<Result<IndexMap<_, _>>>()
                    .map(Value::Map)
            }
        }
        other => Ok(other),
    }
}

/// Wrap the declared binary outputs of every instance as `{"b64": ...}`.
///
/// An output is binary when its type is a string type and its alias ends in
/// `_bytes`. Mapping instances keep exactly the declared outputs. A bare instance
/// is only valid when the model has a single output, since it is that output's value.
pub fn encode(instances: Value, outputs: &IndexMap<String, TensorInfo>) -> Result<Value> {
    let instances = match instances {
        Value::List(list) => list,
        other => {
            return Err(PredictionError::invalid_outputs(format!(
                "Only lists are allowed in the output; got a {}.",
                other.kind()
            )))
        }
    };
    let first_is_map = match instances.first() {
        None => return Ok(Value::List(instances)),
        Some(first) => first.is_map(),
    };

    if !first_is_map {
        let (name, info) = match outputs.first() {
            Some(output) if outputs.len() == 1 => output,
            _ => {
                return Err(PredictionError::invalid_outputs(format!(
                    "The first instance was not a JSON object, but there are {} output tensors, \
                     so a JSON object was expected.",
                    outputs.len()
                )))
            }
        };
        if !is_binary(name, info) {
            return Ok(Value::List(instances));
        }
        return instances
            .into_iter()
            .map(|value| encode_bytes(name, value))
            .collect::<Result<Vec<_>>>()
            .map(Value::List);
    }

    instances
        .into_iter()
        .map(|instance| {
            let mut fields = match instance {
                Value::Map(fields) => fields,
                other => {
                    return Err(PredictionError::invalid_outputs(format!(
                        "Expected every output instance to be a JSON object, got a {}.",
                        other.kind()
                    )))
                }
            };
            let mut encoded = IndexMap::with_capacity(outputs.len());
            for (name, info) in outputs {
                let value = fields.swap_remove(name).ok_or_else(|| {
                    PredictionError::invalid_outputs(format!(
                        "Output {} is missing from an output instance.",
                        name
                    ))
                })?;
                let value = if is_binary(name, info) {
                    encode_bytes(name, value)?
                } else {
                    value
                };
                encoded.insert(name.clone(), value);
            }
            Ok(Value::Map(encoded))
        })
        .collect::<Result<Vec<_>>>()
        .map(Value::List)
}

/// Wrap every byte leaf as `{"b64": ...}`, leaving everything else untouched.
///
/// [`decode`] reverses this.
pub fn wrap_bytes(value: Value) -> Value {
    match value {
        Value::Bytes(bytes) => b64(&bytes),
        Value::List(list) => Value::List(list.into_iter().map(wrap_bytes).collect()),
        Value::Map(map) => Value::Map(
            map.into_iter()
                .map(|(k, v)| (k, wrap_bytes(v)))
                .collect(),
        ),
        other => other,
    }
}

fn is_binary(name: &str, info: &TensorInfo) -> bool {
    info.dtype.is_string() && name.ends_with(BYTES_SUFFIX)
}

fn encode_bytes(name: &str, value: Value) -> Result<Value> {
    match value {
        Value::List(list) => list
            .into_iter()
            .map(|v| encode_bytes(name, v))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Value::Bytes(bytes) => Ok(b64(&bytes)),
        Value::String(s) => Ok(b64(s.as_bytes())),
        other => Err(PredictionError::invalid_outputs(format!(
            "Output {} is declared as binary but holds a {}.",
            name,
            other.kind()
        ))),
    }
}

fn b64(bytes: &[u8]) -> Value {
    let mut wrapped = IndexMap::with_capacity(1);
    wrapped.insert(
        B64_KEY.to_string(),
        Value::String(general_purpose::STANDARD.encode(bytes)),
    );
    Value::Map(wrapped)
}
