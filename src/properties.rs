use std::collections::HashMap;
use std::fmt;

/// Recognized runtime tunables. Unknown keys are unrepresentable; anything
/// not listed here is rejected at the type level rather than silently
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropKey {
    /// Player height in meters.
    PlayerHeight,
    /// Standing eye height in meters.
    EyeHeight,
    /// "Male", "Female" or "Unknown".
    Gender,
    /// Horizontal and vertical neck-to-eye distance in meters.
    NeckToEyeDistance,
    /// Performance HUD mode selector.
    PerfHudMode,
    /// Hide all but the inspected layer while the layer HUD is up.
    LayerHudShowAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropType {
    Bool,
    Int,
    Float,
    FloatArray,
    Str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    FloatArray(Vec<f32>),
    Str(String),
}

impl PropValue {
    fn prop_type(&self) -> PropType {
        match self {
            PropValue::Bool(_) => PropType::Bool,
            PropValue::Int(_) => PropType::Int,
            PropValue::Float(_) => PropType::Float,
            PropValue::FloatArray(_) => PropType::FloatArray,
            PropValue::Str(_) => PropType::Str,
        }
    }
}

impl PropKey {
    /// Declared value type for this key.
    pub fn value_type(self) -> PropType {
        match self {
            PropKey::PlayerHeight | PropKey::EyeHeight => PropType::Float,
            PropKey::Gender => PropType::Str,
            PropKey::NeckToEyeDistance => PropType::FloatArray,
            PropKey::PerfHudMode => PropType::Int,
            PropKey::LayerHudShowAll => PropType::Bool,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyError {
    WrongType { key: PropKey, expected: PropType },
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PropertyError::WrongType { key, expected } => {
                write!(f, "property {:?} expects a {:?} value", key, expected)
            }
        }
    }
}

impl std::error::Error for PropertyError {}

/// Typed property map with the runtime's stock defaults.
#[derive(Debug, Clone)]
pub struct Properties {
    values: HashMap<PropKey, PropValue>,
}

impl Properties {
    pub fn new() -> Self {
        let mut values = HashMap::new();
        values.insert(PropKey::PlayerHeight, PropValue::Float(1.778));
        values.insert(PropKey::EyeHeight, PropValue::Float(1.675));
        values.insert(PropKey::Gender, PropValue::Str("Unknown".into()));
        values.insert(
            PropKey::NeckToEyeDistance,
            PropValue::FloatArray(vec![0.0805, 0.075]),
        );
        values.insert(PropKey::PerfHudMode, PropValue::Int(0));
        values.insert(PropKey::LayerHudShowAll, PropValue::Bool(false));
        Self { values }
    }

    pub fn set(&mut self, key: PropKey, value: PropValue) -> Result<(), PropertyError> {
        if value.prop_type() != key.value_type() {
            return Err(PropertyError::WrongType {
                key,
                expected: key.value_type(),
            });
        }
        self.values.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: PropKey) -> PropValue {
        self.values[&key].clone()
    }
}

impl Default for Properties {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_typed() {
        let props = Properties::new();
        assert_eq!(props.get(PropKey::PlayerHeight), PropValue::Float(1.778));
        assert_eq!(
            props.get(PropKey::Gender),
            PropValue::Str("Unknown".into())
        );
    }

    #[test]
    fn set_rejects_mismatched_type() {
        let mut props = Properties::new();
        let err = props
            .set(PropKey::PlayerHeight, PropValue::Str("tall".into()))
            .unwrap_err();
        assert_eq!(
            err,
            PropertyError::WrongType {
                key: PropKey::PlayerHeight,
                expected: PropType::Float,
            }
        );
        // The default survives the rejected write
        assert_eq!(props.get(PropKey::PlayerHeight), PropValue::Float(1.778));
    }

    #[test]
    fn set_accepts_matching_type() {
        let mut props = Properties::new();
        props
            .set(PropKey::PerfHudMode, PropValue::Int(3))
            .unwrap();
        assert_eq!(props.get(PropKey::PerfHudMode), PropValue::Int(3));
    }
}
