//! Parameter sweep arrays
//!
//! Builds the value lists used to fan one model out into many runs. A range
//! is given by its first value plus exactly two of end, step and count.
//!
//! # Example
//!
//! ```ignore
//! use sumo_rs::sweep::ArraySpec;
//!
//! // [0.0, 2.5, 5.0, 7.5, 10.0]
//! let values = ArraySpec::EndCount { end: 10.0, count: 5 }.generate(0.0, true)?;
//! ```

use crate::error::{Result, SumoError};
use serde::{Deserialize, Serialize};

/// Fraction of a step that still counts as reaching the end
const STEP_TOLERANCE: f64 = 0.99;

/// The two range parameters given alongside the first value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArraySpec {
    /// Evenly spaced values up to `end`
    EndCount { end: f64, count: usize },
    /// Values stepping towards `end`
    EndStep { end: f64, step: f64 },
    /// `count` values with a fixed stride
    StepCount { step: f64, count: usize },
}

impl ArraySpec {
    /// Pick the variant from optional parts; exactly two must be present
    pub fn from_parts(end: Option<f64>, step: Option<f64>, count: Option<usize>) -> Result<Self> {
        match (end, step, count) {
            (Some(end), None, Some(count)) => Ok(ArraySpec::EndCount { end, count }),
            (Some(end), Some(step), None) => Ok(ArraySpec::EndStep { end, step }),
            (None, Some(step), Some(count)) => Ok(ArraySpec::StepCount { step, count }),
            (Some(_), Some(_), Some(_)) => Err(SumoError::Config(
                "overdefined array: give two of end, step and count".to_string(),
            )),
            _ => Err(SumoError::Config(
                "underdefined array: give two of end, step and count".to_string(),
            )),
        }
    }

    /// Generate the values starting at `begin`
    pub fn generate(&self, begin: f64, include_end: bool) -> Result<Vec<f64>> {
        match *self {
            ArraySpec::EndCount { end, count } => {
                if count <= 1 {
                    return Ok(vec![begin; count]);
                }
                let intervals = if include_end { count - 1 } else { count };
                let step = (end - begin) / intervals as f64;
                Ok(stride(begin, step, count))
            }
            ArraySpec::EndStep { end, step } => {
                if step == 0.0 {
                    return Err(SumoError::Config("array step must not be zero".to_string()));
                }
                let mut step = step;
                let mut count = ((end - begin + step * STEP_TOLERANCE) / step).trunc();
                if count < 0.0 {
                    step = -step;
                    count = ((end - begin + step * STEP_TOLERANCE) / step).trunc();
                }
                let mut values = stride(begin, step, count.max(0.0) as usize);
                if include_end {
                    values.push(end);
                }
                Ok(values)
            }
            ArraySpec::StepCount { step, count } => {
                if step == 0.0 {
                    return Err(SumoError::Config("array step must not be zero".to_string()));
                }
                Ok(stride(begin, step, count))
            }
        }
    }
}

fn stride(begin: f64, step: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| begin + i as f64 * step).collect()
}

fn default_include_end() -> bool {
    true
}

/// A sweep over one engine variable, as written in batch files
///
/// ```toml
/// sweep = { variable = "Sumo__Plant__Influent__Q", begin = 20000, end = 30000, count = 3 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSpec {
    pub variable: String,
    pub begin: f64,
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default = "default_include_end")]
    pub include_end: bool,
}

impl SweepSpec {
    /// Values the variable takes, one per run
    pub fn values(&self) -> Result<Vec<f64>> {
        ArraySpec::from_parts(self.end, self.step, self.count)?.generate(self.begin, self.include_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_count_inclusive() {
        let values = ArraySpec::EndCount { end: 10.0, count: 5 }
            .generate(0.0, true)
            .unwrap();
        assert_eq!(values, vec![0.0, 2.5, 5.0, 7.5, 10.0]);
    }

    #[test]
    fn test_end_count_exclusive() {
        let values = ArraySpec::EndCount { end: 10.0, count: 5 }
            .generate(0.0, false)
            .unwrap();
        assert_eq!(values, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_end_count_degenerate() {
        let spec = ArraySpec::EndCount { end: 10.0, count: 1 };
        assert_eq!(spec.generate(3.0, true).unwrap(), vec![3.0]);
        let spec = ArraySpec::EndCount { end: 10.0, count: 0 };
        assert!(spec.generate(3.0, true).unwrap().is_empty());
    }

    #[test]
    fn test_end_step_appends_end() {
        let values = ArraySpec::EndStep { end: 10.0, step: 2.0 }
            .generate(0.0, true)
            .unwrap();
        assert_eq!(values, vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);

        let values = ArraySpec::EndStep { end: 10.0, step: 2.0 }
            .generate(0.0, false)
            .unwrap();
        assert_eq!(values, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_end_step_tolerance() {
        // (9.99 + 0.99) / 1 truncates to ten values
        let values = ArraySpec::EndStep { end: 9.99, step: 1.0 }
            .generate(0.0, false)
            .unwrap();
        assert_eq!(values.len(), 10);
    }

    #[test]
    fn test_end_step_corrects_direction() {
        let values = ArraySpec::EndStep { end: 0.0, step: 1.0 }
            .generate(3.0, true)
            .unwrap();
        assert_eq!(values, vec![3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_step_count() {
        let values = ArraySpec::StepCount { step: 0.5, count: 3 }
            .generate(1.0, true)
            .unwrap();
        assert_eq!(values, vec![1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_zero_step_rejected() {
        assert!(ArraySpec::EndStep { end: 1.0, step: 0.0 }.generate(0.0, true).is_err());
        assert!(ArraySpec::StepCount { step: 0.0, count: 2 }.generate(0.0, true).is_err());
    }

    #[test]
    fn test_from_parts_requires_two() {
        assert!(matches!(
            ArraySpec::from_parts(Some(1.0), Some(1.0), Some(1)),
            Err(SumoError::Config(_))
        ));
        assert!(ArraySpec::from_parts(Some(1.0), None, None).is_err());
        assert_eq!(
            ArraySpec::from_parts(None, Some(2.0), Some(4)).unwrap(),
            ArraySpec::StepCount { step: 2.0, count: 4 }
        );
    }

    #[test]
    fn test_sweep_spec_from_toml() {
        let spec: SweepSpec = toml::from_str(
            r#"
            variable = "Sumo__Plant__Influent__Q"
            begin = 20000.0
            end = 30000.0
            count = 3
            "#,
        )
        .unwrap();
        assert!(spec.include_end);
        assert_eq!(spec.values().unwrap(), vec![20000.0, 25000.0, 30000.0]);
    }
}
