use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Property name the label is read from unless configured otherwise.
pub const DEFAULT_LABEL_PROPERTY: &str = "dG";

// ---------------------------------------------------------------------------
// PropertyValue – a single molecule property
// ---------------------------------------------------------------------------

/// A dynamically-typed molecule property, mirroring what structure files
/// usually attach to a record (`> <dG>` blocks and the like).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Null,
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "{s}"),
            PropertyValue::Integer(i) => write!(f, "{i}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Null => write!(f, "<null>"),
        }
    }
}

impl PropertyValue {
    /// Interpret the value as a number. Text properties are parsed, since
    /// structure files store every property as text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Integer(i) => Some(*i as f64),
            PropertyValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Integer(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

// ---------------------------------------------------------------------------
// Molecule – caller-owned input record
// ---------------------------------------------------------------------------

/// A molecule as seen by the cache layer: a stable identity plus properties.
///
/// Whatever structure representation the descriptor blocks need is theirs to
/// look up (typically a `smiles` or `molblock` property); the cache only ever
/// reads `id` and the label property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Molecule {
    /// Caller-assigned identity. Used verbatim as a cache file stem.
    pub id: String,
    /// Arbitrary properties: name → value.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Molecule {
    pub fn new(id: impl Into<String>) -> Self {
        Molecule {
            id: id.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// The regression label stored under `property`, or NaN when the molecule
    /// has no usable value for it. A missing label is data, not an error.
    pub fn label(&self, property: &str) -> f32 {
        self.property(property)
            .and_then(PropertyValue::as_f64)
            .map(|v| v as f32)
            .unwrap_or(f32::NAN)
    }
}

// ---------------------------------------------------------------------------
// Sample – one (X, Y) pair served to the model
// ---------------------------------------------------------------------------

/// One served sample: the feature vector and a single-element label row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub features: Vec<f32>,
    pub label: Vec<f32>,
}

impl Sample {
    pub fn new(features: Vec<f32>, label: f32) -> Self {
        Sample {
            features,
            label: vec![label],
        }
    }

    /// Bitwise equality, so NaN labels and features compare equal to themselves.
    pub fn bit_eq(&self, other: &Sample) -> bool {
        fn bits(v: &[f32]) -> impl Iterator<Item = u32> + '_ {
            v.iter().map(|x| x.to_bits())
        }
        self.features.len() == other.features.len()
            && self.label.len() == other.label.len()
            && bits(&self.features).eq(bits(&other.features))
            && bits(&self.label).eq(bits(&other.label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_reads_numeric_and_text_properties() {
        let m = Molecule::new("a").with_property("dG", -3.5);
        assert_eq!(m.label(DEFAULT_LABEL_PROPERTY), -3.5);

        let m = Molecule::new("b").with_property("dG", "-1.25");
        assert_eq!(m.label(DEFAULT_LABEL_PROPERTY), -1.25);

        let m = Molecule::new("c").with_property("dG", 2i64);
        assert_eq!(m.label(DEFAULT_LABEL_PROPERTY), 2.0);
    }

    #[test]
    fn missing_or_unusable_label_is_nan() {
        assert!(Molecule::new("a").label("dG").is_nan());
        let m = Molecule::new("b").with_property("dG", "n/a");
        assert!(m.label("dG").is_nan());
    }

    #[test]
    fn bit_eq_treats_nan_as_equal() {
        let a = Sample::new(vec![1.0, 2.0], f32::NAN);
        let b = Sample::new(vec![1.0, 2.0], f32::NAN);
        assert!(a.bit_eq(&b));
        assert_ne!(a, b);
        assert!(!a.bit_eq(&Sample::new(vec![1.0, 2.5], f32::NAN)));
    }

    #[test]
    fn molecule_deserializes_from_json_record() {
        let m: Molecule =
            serde_json::from_str(r#"{"id": "lig1", "properties": {"dG": -7.1, "smiles": "CCO"}}"#).unwrap();
        assert_eq!(m.id, "lig1");
        assert_eq!(m.property("smiles"), Some(&PropertyValue::String("CCO".into())));
        assert!((m.label("dG") - -7.1).abs() < 1e-6);
    }
}
