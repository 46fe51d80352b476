//! Row/column transcoding.
//!
//! Requests arrive as rows, one instance per element. The engine wants columns, one
//! sequence per named field holding that field's value for every instance. The
//! engine answers in columns, which are turned back into rows for the response.
use crate::{
    error::{PredictionError, Result},
    value::Value,
};
use indexmap::IndexMap;
use std::vec;

/// Column oriented data: field name to the field's values, one per instance.
pub type Batch = IndexMap<String, Value>;

/// Collect the values of every field into columns.
///
/// ```text
/// [{"a": [1.0, 2.0], "b": "x"},        {"a": [[1.0, 2.0], [3.0, 4.0]],
///  {"a": [3.0, 4.0], "b": "y"}]   ->    "b": ["x", "y"]}
/// ```
///
/// Fields are ordered by first appearance. An instance lacking a field just leaves
/// that column shorter; callers compare column lengths to the instance count.
pub fn columnarize(instances: Vec<Value>) -> Result<Batch> {
    let mut columns: IndexMap<String, Vec<Value>> = IndexMap::new();
    for (index, instance) in instances.into_iter().enumerate() {
        match instance {
            Value::Map(fields) => {
                for (name, value) in fields {
                    columns.entry(name).or_default().push(value);
                }
            }
            other => {
                return Err(PredictionError::invalid_inputs(format!(
                    "Expected a JSON object for instance {} of a model with multiple inputs, got a {}.",
                    index,
                    other.kind()
                )))
            }
        }
    }
    Ok(columns
        .into_iter()
        .map(|(name, column)| (name, Value::List(column)))
        .collect())
}

/// Turn columns back into rows.
///
/// ```text
/// {"prediction": [1, 0],                  {"prediction": 1, "scores": [0.1, 0.9]}
///  "scores": [[0.1, 0.9], [0.7, 0.3]]} ->  {"prediction": 0, "scores": [0.7, 0.3]}
/// ```
///
/// Every column must share the same outer (batch) dimension, otherwise the engine
/// produced inconsistent outputs. Rows are built lazily as the iterator advances.
pub fn rowify(columns: Batch) -> Result<Rows> {
    let sizes: IndexMap<&str, Option<usize>> = columns
        .iter()
        .map(|(name, column)| (name.as_str(), column.as_list().map(|list| list.len())))
        .collect();
    let mut outer = sizes.values();
    let num_instances = match outer.next() {
        Some(Some(first)) if outer.all(|size| size == &Some(*first)) => *first,
        _ => {
            return Err(PredictionError::invalid_outputs(format!(
                "Bad output from running the model: outputs had differing sizes in the batch \
                 (outer) dimension. See the outputs and their size: {}. Check your model for \
                 bugs that affect the size of the outputs.",
                describe_sizes(&sizes)
            )))
        }
    };
    let columns = columns
        .into_iter()
        .map(|(name, column)| match column {
            Value::List(list) => (name, list.into_iter()),
            // checked above
            _ => (name, Vec::new().into_iter()),
        })
        .collect();
    Ok(Rows {
        columns,
        remaining: num_instances,
    })
}

fn describe_sizes(sizes: &IndexMap<&str, Option<usize>>) -> String {
    let fields: Vec<_> = sizes
        .iter()
        .map(|(name, size)| match size {
            Some(size) => format!("{:?}: {}", name, size),
            None => format!("{:?}: no batch dimension", name),
        })
        .collect();
    format!("{{{}}}", fields.join(", "))
}

/// Lazily built response rows. Each row is produced on demand; once exhausted the
/// iterator can't be restarted.
#[derive(Debug)]
pub struct Rows {
    columns: Vec<(String, vec::IntoIter<Value>)>,
    remaining: usize,
}

impl Iterator for Rows {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let row = self
            .columns
            .iter_mut()
            .map(|(name, column)| (name.clone(), column.next().unwrap_or(Value::Null)))
            .collect();
        Some(Value::Map(row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Rows {}
