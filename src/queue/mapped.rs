//! Mapped-variable bridge
//!
//! Translates between remote (OPC) tags and engine variables using a mapping
//! table. Each [`MappingEntry`] ties one engine variable to one tag with a
//! linear transform:
//!
//! ```text
//! engine = remote / scaling - offset        (read)
//! remote = (engine + offset) * scaling      (write)
//! ```
//!
//! `REAL` entries yield floats, `INT` entries truncate toward zero, any other
//! engine type passes the raw value through unchanged. Array entries apply the
//! transform to every element.

use super::exchange::VariableExchange;
use crate::error::{Result, SumoError};
use crate::types::{Value, VarType, VariableMap};
use serde::{Deserialize, Serialize};

/// Data direction of a mapping entry, as seen from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Remote value flows into the engine
    #[default]
    #[serde(rename = "I")]
    Input,
    /// Engine value flows out to the remote side
    #[serde(rename = "O")]
    Output,
}

/// One row of a mapping table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingEntry {
    pub io: Direction,
    pub io_type: String,
    pub sumo_name: String,
    pub sumo_type: VarType,
    pub sumo_unit: String,
    pub opc_tag: String,
    pub opc_type: String,
    pub opc_unit: String,
    pub is_array: bool,
    pub scaling: f64,
    pub offset: f64,
    pub comment: String,
}

impl Default for MappingEntry {
    fn default() -> Self {
        Self {
            io: Direction::Input,
            io_type: "Dynamic".to_string(),
            sumo_name: String::new(),
            sumo_type: VarType::Real,
            sumo_unit: String::new(),
            opc_tag: String::new(),
            opc_type: String::new(),
            opc_unit: String::new(),
            is_array: false,
            scaling: 1.0,
            offset: 0.0,
            comment: String::new(),
        }
    }
}

impl MappingEntry {
    /// Identity mapping between an engine variable and a tag
    pub fn new(sumo_name: impl Into<String>, opc_tag: impl Into<String>) -> Self {
        Self {
            sumo_name: sumo_name.into(),
            opc_tag: opc_tag.into(),
            ..Default::default()
        }
    }

    pub fn with_transform(mut self, scaling: f64, offset: f64) -> Self {
        self.scaling = scaling;
        self.offset = offset;
        self
    }

    pub fn with_type(mut self, sumo_type: VarType) -> Self {
        self.sumo_type = sumo_type;
        self
    }

    pub fn with_direction(mut self, io: Direction) -> Self {
        self.io = io;
        self
    }

    pub fn array(mut self, is_array: bool) -> Self {
        self.is_array = is_array;
        self
    }

    pub fn is_input(&self) -> bool {
        self.io == Direction::Input
    }

    pub fn is_output(&self) -> bool {
        self.io == Direction::Output
    }

    /// Translate a raw remote value into engine units
    pub fn to_engine(&self, raw: &Value) -> Result<Value> {
        self.translate(raw, true, &|x: f64, scaling: f64, offset: f64| x / scaling - offset)
    }

    /// Translate an engine value into remote units
    pub fn to_remote(&self, value: &Value) -> Result<Value> {
        self.translate(value, false, &|x: f64, scaling: f64, offset: f64| (x + offset) * scaling)
    }

    /// `divides` marks the direction that divides by `scaling`
    fn translate(
        &self,
        value: &Value,
        divides: bool,
        f: &dyn Fn(f64, f64, f64) -> f64,
    ) -> Result<Value> {
        if let Value::Seq(items) = value {
            return items
                .iter()
                .map(|item| self.translate(item, divides, f))
                .collect::<Result<Vec<_>>>()
                .map(Value::Seq);
        }

        let truncate = match &self.sumo_type {
            VarType::Real => false,
            VarType::Int => true,
            VarType::Other(_) => return Ok(value.clone()),
        };

        if divides && self.scaling == 0.0 {
            return Err(self.conversion_error("scaling is zero"));
        }
        let x = value
            .as_f64()
            .ok_or_else(|| self.conversion_error(&format!("{:?} is not numeric", value)))?;

        let y = f(x, self.scaling, self.offset);
        Ok(if truncate {
            Value::Int(y.trunc() as i64)
        } else {
            Value::Float(y)
        })
    }

    fn conversion_error(&self, message: &str) -> SumoError {
        SumoError::Conversion {
            tag: self.opc_tag.clone(),
            message: message.to_string(),
        }
    }
}

impl VariableExchange {
    /// Read every selected entry's tag in one request and translate the
    /// results into engine units, keyed by engine variable name
    ///
    /// The request is sent even when nothing is selected.
    pub fn read_mapped<P>(&self, entries: &[MappingEntry], predicate: P) -> Result<VariableMap>
    where
        P: Fn(&MappingEntry) -> bool,
    {
        let selected: Vec<&MappingEntry> = entries.iter().filter(|e| predicate(e)).collect();
        let tags: Vec<&str> = selected.iter().map(|e| e.opc_tag.as_str()).collect();
        let raw = self.read_variables(&tags)?;

        selected
            .into_iter()
            .map(|entry| {
                let value = raw
                    .get(&entry.opc_tag)
                    .ok_or_else(|| SumoError::UnknownVariable(entry.opc_tag.clone()))?;
                Ok((entry.sumo_name.clone(), entry.to_engine(value)?))
            })
            .collect()
    }

    /// Translate engine values (keyed by engine name) into remote units and
    /// write them in one request; entries without a value are skipped
    pub fn write_mapped<P>(
        &self,
        entries: &[MappingEntry],
        values: &VariableMap,
        predicate: P,
    ) -> Result<VariableMap>
    where
        P: Fn(&MappingEntry) -> bool,
    {
        let mut remote = VariableMap::new();
        for entry in entries.iter().filter(|e| predicate(e)) {
            if let Some(value) = values.get(&entry.sumo_name) {
                remote.insert(entry.opc_tag.clone(), entry.to_remote(value)?);
            }
        }
        if remote.is_empty() {
            return Ok(VariableMap::new());
        }
        self.write_variables(&remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_transform() {
        let entry = MappingEntry::new("Sumo__Q", "PLC.Q").with_transform(2.0, 1.0);
        assert_eq!(entry.to_engine(&Value::Int(10)).unwrap(), Value::Float(4.0));
        assert_eq!(entry.to_remote(&Value::Float(4.0)).unwrap(), Value::Float(10.0));
    }

    #[test]
    fn test_int_transform_truncates() {
        let entry = MappingEntry::new("n", "PLC.N")
            .with_type(VarType::Int)
            .with_transform(3.0, 0.0);
        assert_eq!(entry.to_engine(&Value::Int(10)).unwrap(), Value::Int(3));
        assert_eq!(entry.to_engine(&Value::Float(-10.0)).unwrap(), Value::Int(-3));
    }

    #[test]
    fn test_other_type_passes_through() {
        let entry = MappingEntry::new("s", "PLC.S")
            .with_type(VarType::Other("STRING".to_string()))
            .with_transform(0.0, 5.0);
        let raw = Value::Text("run".to_string());
        assert_eq!(entry.to_engine(&raw).unwrap(), raw);
    }

    #[test]
    fn test_array_elementwise() {
        let entry = MappingEntry::new("a", "PLC.A").array(true).with_transform(10.0, 0.0);
        let raw = Value::Seq(vec![Value::Int(10), Value::Int(20)]);
        assert_eq!(
            entry.to_engine(&raw).unwrap(),
            Value::Seq(vec![Value::Float(1.0), Value::Float(2.0)])
        );
    }

    #[test]
    fn test_conversion_errors() {
        let zero = MappingEntry::new("z", "PLC.Z").with_transform(0.0, 0.0);
        assert!(matches!(
            zero.to_engine(&Value::Int(1)),
            Err(SumoError::Conversion { .. })
        ));

        let entry = MappingEntry::new("t", "PLC.T");
        assert!(matches!(
            entry.to_engine(&Value::Text("n/a".to_string())),
            Err(SumoError::Conversion { .. })
        ));
    }

    #[test]
    fn test_zero_scaling_only_rejected_when_dividing() {
        let zero = MappingEntry::new("z", "PLC.Z").with_transform(0.0, 1.0);
        assert_eq!(zero.to_remote(&Value::Float(4.0)).unwrap(), Value::Float(0.0));
        assert_eq!(
            zero.to_remote(&Value::Seq(vec![Value::Int(1), Value::Int(2)])).unwrap(),
            Value::Seq(vec![Value::Float(0.0), Value::Float(0.0)])
        );
        assert!(matches!(
            zero.to_engine(&Value::Float(4.0)),
            Err(SumoError::Conversion { .. })
        ));
    }

    #[test]
    fn test_entry_deserializes_with_defaults() {
        let entry: MappingEntry = toml::from_str(
            r#"
            io = "O"
            sumo_name = "Sumo__Plant__Effluent__TN"
            opc_tag = "PLC.TN"
            sumo_type = "INT"
            scaling = 1000.0
            "#,
        )
        .unwrap();
        assert!(entry.is_output());
        assert_eq!(entry.sumo_type, VarType::Int);
        assert_eq!(entry.io_type, "Dynamic");
        assert_eq!(entry.offset, 0.0);
    }
}
