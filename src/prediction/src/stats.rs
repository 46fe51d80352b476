//! Per call statistics.
//!
//! A [`Stats`] is created for one prediction call, filled by the model wrapper and the
//! inference client, and read by the caller afterwards. Keys are a closed set of
//! [`Metric`]s so a misspelt name can't silently start a new metric.
use crate::{error::Result, timer::Timer};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::{fmt, time::Duration};

/// The metrics recorded during a prediction call.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Metric {
    /// Name of the engine that served the call.
    Engine,
    /// Normalizing instances and running the preprocessing function.
    PreprocessTime,
    /// Turning instances into a column batch.
    ColumnarizeTime,
    /// Translating input aliases to storage names.
    UnaliasTime,
    /// The whole client call.
    EngineRunTime,
    /// The execution engine call alone.
    SessionRunTime,
    /// Translating storage results back to output aliases.
    AliasTime,
    /// Turning the output batch into rows.
    RowifyTime,
    /// Building the echoed inputs.
    InputProcessingTime,
}

impl Metric {
    /// Name used when stats are reported.
    pub const fn as_str(self) -> &'static str {
        match self {
            Metric::Engine => "Prediction-Engine",
            Metric::PreprocessTime => "Prediction-Preprocess-Time",
            Metric::ColumnarizeTime => "Prediction-Columnarize-Time",
            Metric::UnaliasTime => "Prediction-Unalias-Time",
            Metric::EngineRunTime => "Prediction-Engine-Run-Time",
            Metric::SessionRunTime => "Prediction-Session-Run-Time",
            Metric::AliasTime => "Prediction-Alias-Time",
            Metric::RowifyTime => "Prediction-Rowify-Time",
            Metric::InputProcessingTime => "Prediction-Input-Processing-Time",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded metric value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stat {
    /// A duration in microseconds.
    Micros(u64),
    /// A text label.
    Label(String),
}

/// Ordered metrics of one prediction call.
#[derive(Clone, Debug, Default)]
pub struct Stats {
    values: IndexMap<Metric, Stat>,
}

impl Stats {
    /// Empty stats.
    pub fn new() -> Self {
        Stats::default()
    }

    /// Record a text label.
    pub fn set_label(&mut self, metric: Metric, label: impl Into<String>) {
        self.values.insert(metric, Stat::Label(label.into()));
    }

    /// Record a duration, kept in microseconds.
    pub fn record(&mut self, metric: Metric, elapsed: Duration) {
        self.values
            .insert(metric, Stat::Micros(elapsed.as_micros() as u64));
    }

    /// Run `f` and record how long it took under `metric`.
    ///
    /// `f` gets these stats back so nested spans can record into them too. Nothing is
    /// recorded for `metric` when `f` fails.
    pub fn time<T, F>(&mut self, metric: Metric, f: F) -> Result<T>
    where
        F: FnOnce(&mut Stats) -> Result<T>,
    {
        let mut timer = Timer::started();
        let result = f(self)?;
        timer.stop();
        self.record(metric, timer.elapsed());
        Ok(result)
    }

    /// The value recorded for `metric`.
    pub fn get(&self, metric: Metric) -> Option<&Stat> {
        self.values.get(&metric)
    }

    /// The duration recorded for `metric`, in microseconds.
    pub fn micros(&self, metric: Metric) -> Option<u64> {
        match self.values.get(&metric) {
            Some(Stat::Micros(micros)) => Some(*micros),
            _ => None,
        }
    }

    /// The label recorded for `metric`.
    pub fn label(&self, metric: Metric) -> Option<&str> {
        match self.values.get(&metric) {
            Some(Stat::Label(label)) => Some(label),
            _ => None,
        }
    }

    /// Whether anything was recorded for `metric`.
    pub fn contains(&self, metric: Metric) -> bool {
        self.values.contains_key(&metric)
    }

    /// Metrics in recording order.
    pub fn iter(&self) -> impl Iterator<Item = (Metric, &Stat)> {
        self.values.iter().map(|(metric, stat)| (*metric, stat))
    }

    /// Number of recorded metrics.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Stats {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (metric, stat) in &self.values {
            match stat {
                Stat::Micros(micros) => map.serialize_entry(metric.as_str(), micros)?,
                Stat::Label(label) => map.serialize_entry(metric.as_str(), label)?,
            }
        }
        map.end()
    }
}
