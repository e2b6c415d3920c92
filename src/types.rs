//! Core data types for sumo-rs
//!
//! This module contains the fundamental data structures shared by the
//! scheduler and the queue protocols.
//!
//! # Main Types
//!
//! - [`JobId`] - Engine-issued job identifier
//! - [`Value`] - A decoded wire value (integer, float, text or nested sequence)
//! - [`VariableMap`] - Named values, as reported by data-comm and read/write conversations
//! - [`VarType`] - Engine-side type tag (`REAL`, `INT`, ...)
//! - [`JobRequest`] - Everything the engine needs to schedule one simulation run
//!
//! # Time Units
//!
//! The engine expresses simulation time in milliseconds. The [`duration`]
//! module provides the usual multiples for building `StopTime`/`DataComm`
//! commands.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Job identifier issued by the engine at submission time
pub type JobId = i32;

/// Named values keyed by variable (or tag) name
pub type VariableMap = BTreeMap<String, Value>;

/// Simulation time units, in engine milliseconds
pub mod duration {
    pub const MSEC: u64 = 1;
    pub const SEC: u64 = 1000 * MSEC;
    pub const MINUTE: u64 = 60 * SEC;
    pub const HOUR: u64 = 60 * MINUTE;
    pub const DAY: u64 = 24 * HOUR;
    pub const WEEK: u64 = 7 * DAY;
}

/// A value decoded from engine wire text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Fully numeric text with no fractional part
    Int(i64),
    /// Numeric text that is not an integer
    Float(f64),
    /// Anything that is not numeric
    Text(String),
    /// `;`-separated sequence, each element decoded independently
    Seq(Vec<Value>),
}

impl Value {
    /// Numeric view of a scalar value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view, only for values decoded as integers
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view, only for values that stayed text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Sequence view
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    /// Whether this is an integer or float
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Text(String::new())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            // Debug keeps the fractional part so "3.0" decodes back to a float
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Text(s) => f.write_str(s),
            Value::Seq(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Seq(v.into_iter().map(Into::into).collect())
    }
}

/// Engine-side type tag of a variable
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VarType {
    /// Floating point variable
    #[default]
    Real,
    /// Integer variable
    Int,
    /// Any other engine type, kept verbatim
    Other(String),
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarType::Real => f.write_str("REAL"),
            VarType::Int => f.write_str("INT"),
            VarType::Other(s) => f.write_str(s),
        }
    }
}

impl FromStr for VarType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "REAL" => VarType::Real,
            "INT" => VarType::Int,
            other => VarType::Other(other.to_string()),
        })
    }
}

impl Serialize for VarType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VarType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or_default())
    }
}

/// Everything the engine needs to schedule one simulation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Model reference (path to the compiled project)
    pub model: String,
    /// Commands executed in order by the engine
    #[serde(default)]
    pub commands: Vec<String>,
    /// Variables reported back through data-comm
    #[serde(default)]
    pub variables: Vec<String>,
    /// Whether data-comm callbacks block the engine until drained
    #[serde(default)]
    pub block_datacomm: bool,
}

impl JobRequest {
    /// Create a request for the given model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Append one command
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }

    /// Append several commands
    pub fn commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.extend(commands.into_iter().map(Into::into));
        self
    }

    /// Append a `set <variable> <value>` command
    pub fn set(self, variable: &str, value: impl fmt::Display) -> Self {
        self.command(format!("set {} {}", variable, value))
    }

    /// Append a `load <state file>` command
    pub fn load_state(self, path: impl fmt::Display) -> Self {
        self.command(format!("load {}", path))
    }

    /// Append variables to report
    pub fn variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables.extend(variables.into_iter().map(Into::into));
        self
    }

    /// Set whether data-comm callbacks block the engine
    pub fn block_datacomm(mut self, block: bool) -> Self {
        self.block_datacomm = block;
        self
    }

    /// Append the standard dynamic-run tail: map to initial conditions, set
    /// stop time and data-comm interval, switch to dynamic mode and start.
    pub fn dynamic_run(self, stop_time_ms: u64, datacomm_interval_ms: u64) -> Self {
        self.command("maptoic")
            .set("Sumo__StopTime", stop_time_ms)
            .set("Sumo__DataComm", datacomm_interval_ms)
            .command("mode dynamic")
            .command("start")
    }

    /// Commands in the engine's `;`-joined form
    pub fn joined_commands(&self) -> String {
        self.commands.join(";")
    }

    /// Variables in the engine's `|`-joined form
    pub fn joined_variables(&self) -> String {
        self.variables.join("|")
    }
}
