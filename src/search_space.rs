//! Hyperparameter grids
//!
//! A [`Grid`] is an ordered list of parameters, each with its candidate
//! values. Expanding it yields one [`ParamSet`] per combination, with the
//! last declared parameter varying fastest, so grid order is stable and
//! reproducible.

use crate::error::{Result, TuneError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single hyperparameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            ParamValue::Int(v) => *v as f64,
            ParamValue::Float(v) => *v,
        }
    }

    /// Integer view; floats are accepted only when they hold a whole number
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            ParamValue::Float(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

/// One candidate configuration: named values in grid declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    values: Vec<(String, ParamValue)>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    /// Float value, or an error naming the missing parameter
    pub fn float(&self, name: &str) -> Result<f64> {
        self.get(name)
            .map(|v| v.as_f64())
            .ok_or_else(|| TuneError::ConfigError(format!("missing parameter '{}'", name)))
    }

    /// Non-negative integer value
    pub fn usize(&self, name: &str) -> Result<usize> {
        let value = self
            .get(name)
            .ok_or_else(|| TuneError::ConfigError(format!("missing parameter '{}'", name)))?;
        match value.as_i64() {
            Some(v) if v >= 0 => Ok(v as usize),
            _ => Err(TuneError::invalid_param(
                name,
                value,
                "must be a non-negative integer",
            )),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ParamValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .values
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// A parameter and its candidate values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAxis {
    pub name: String,
    pub values: Vec<ParamValue>,
}

/// Ordered hyperparameter grid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    axes: Vec<GridAxis>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter; redeclaring a name replaces its values in place
    pub fn with<V: Into<ParamValue>>(mut self, name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let name = name.into();
        let values: Vec<ParamValue> = values.into_iter().map(Into::into).collect();
        match self.axes.iter_mut().find(|a| a.name == name) {
            Some(axis) => axis.values = values,
            None => self.axes.push(GridAxis { name, values }),
        }
        self
    }

    pub fn axes(&self) -> &[GridAxis] {
        &self.axes
    }

    pub fn axis(&self, name: &str) -> Option<&GridAxis> {
        self.axes.iter().find(|a| a.name == name)
    }

    /// Number of configurations the grid expands to
    pub fn n_configs(&self) -> usize {
        if self.axes.is_empty() {
            0
        } else {
            self.axes.iter().map(|a| a.values.len()).product()
        }
    }

    /// Reject empty grids, empty axes and non-finite values
    pub fn check(&self) -> Result<()> {
        if self.axes.is_empty() {
            return Err(TuneError::ConfigError("grid declares no parameters".to_string()));
        }
        for axis in &self.axes {
            if axis.values.is_empty() {
                return Err(TuneError::invalid_param(
                    &axis.name,
                    "[]",
                    "needs at least one candidate value",
                ));
            }
            if let Some(bad) = axis.values.iter().find(|v| !v.as_f64().is_finite()) {
                return Err(TuneError::invalid_param(&axis.name, bad, "must be finite"));
            }
        }
        Ok(())
    }

    /// Cartesian product in declaration order, last axis fastest
    pub fn expand(&self) -> Vec<ParamSet> {
        let mut configs = vec![ParamSet::new()];
        for axis in &self.axes {
            let mut next = Vec::with_capacity(configs.len() * axis.values.len());
            for config in &configs {
                for value in &axis.values {
                    next.push(config.clone().with(axis.name.clone(), *value));
                }
            }
            configs = next;
        }
        if self.axes.is_empty() {
            Vec::new()
        } else {
            configs
        }
    }
}

/// `start, start + step, ...` up to and including `end`
pub fn int_range(start: i64, end: i64, step: i64) -> Vec<i64> {
    if step <= 0 {
        return Vec::new();
    }
    (0..)
        .map(|k| start + k * step)
        .take_while(|&v| v <= end)
        .collect()
}
