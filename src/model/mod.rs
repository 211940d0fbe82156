//! Network records consumed by the modeling engine.
//!
//! Features (segments, cables, equipment, structures, conduits) are owned
//! by the host platform. This module gives them a typed face over an open
//! property map, plus the raw connection record.

mod side;

pub use side::Side;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::pins::PinRange;

/// Features keyed by URN.
pub type FeatureMap = HashMap<String, Arc<Feature>>;

/// Build a [`FeatureMap`] from shared features.
pub fn feature_map<I>(features: I) -> FeatureMap
where
    I: IntoIterator<Item = Arc<Feature>>,
{
    features
        .into_iter()
        .map(|f| (f.urn.clone(), f))
        .collect()
}

/// Split a URN of the form `type/id` into its parts.
///
/// A URN without a separator is treated as a bare type with an empty id.
pub fn decompose_urn(urn: &str) -> (&str, &str) {
    urn.split_once('/').unwrap_or((urn, ""))
}

/// A network object as stored by the host platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Globally unique identifier (`type/id`).
    pub urn: String,
    /// Open property map.
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Length of the digitized geometry in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geom_length: Option<f64>,
}

impl Feature {
    /// Create a feature with no properties.
    pub fn new(urn: impl Into<String>) -> Self {
        Self {
            urn: urn.into(),
            properties: Map::new(),
            geom_length: None,
        }
    }

    /// Builder: set a property.
    pub fn with_property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    /// Builder: set the digitized length.
    pub fn with_geom_length(mut self, meters: f64) -> Self {
        self.geom_length = Some(meters);
        self
    }

    /// The feature URN.
    #[inline]
    pub fn urn(&self) -> &str {
        &self.urn
    }

    /// Feature type, the part of the URN before the separator.
    pub fn feature_type(&self) -> &str {
        decompose_urn(&self.urn).0
    }

    /// Record id, the part of the URN after the separator.
    pub fn id(&self) -> &str {
        decompose_urn(&self.urn).1
    }

    /// Raw property value, treating JSON null as absent.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).filter(|v| !v.is_null())
    }

    /// True if the property is present (even when null).
    pub fn has_field(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// String property.
    pub fn str_prop(&self, name: &str) -> Option<&str> {
        self.property(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Integer property (numeric strings are accepted).
    pub fn int_prop(&self, name: &str) -> Option<i64> {
        match self.property(name)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float property.
    pub fn f64_prop(&self, name: &str) -> Option<f64> {
        match self.property(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean property, absent or null reads as false.
    pub fn bool_prop(&self, name: &str) -> bool {
        match self.property(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }

    /// Reference to another record by id (stored as a number or a string).
    pub fn ref_prop(&self, name: &str) -> Option<String> {
        match self.property(name)? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    /// Set a property value.
    pub fn set_property(&mut self, name: &str, value: impl Into<Value>) {
        self.properties.insert(name.to_string(), value.into());
    }

    /// Set a property to null.
    pub fn clear_property(&mut self, name: &str) {
        self.properties.insert(name.to_string(), Value::Null);
    }

    // ------------------------------------------------------------------
    // Containment references
    // ------------------------------------------------------------------

    /// URN of the direct container.
    pub fn housing(&self) -> Option<&str> {
        self.str_prop("housing")
    }

    /// URN of the owning cable (segments and slack).
    pub fn cable(&self) -> Option<&str> {
        self.str_prop("cable")
    }

    /// True if the object has an intrinsic signal direction.
    pub fn is_directed(&self) -> bool {
        self.bool_prop("directed")
    }

    // ------------------------------------------------------------------
    // Segment accessors
    // ------------------------------------------------------------------

    /// Structure at `side` of a segment.
    pub fn structure(&self, side: Side) -> Option<&str> {
        self.str_prop(&format!("{}_structure", side))
    }

    /// Equipment housing `side` of a segment.
    pub fn equipment(&self, side: Side) -> Option<&str> {
        self.str_prop(&format!("{}_equipment", side))
    }

    /// Equipment or structure housing `side` of a segment.
    pub fn end_housing(&self, side: Side) -> Option<&str> {
        self.equipment(side).or_else(|| self.structure(side))
    }

    /// Id of the segment chained at `side`.
    pub fn segment_link(&self, side: Side) -> Option<String> {
        self.ref_prop(&format!("{}_segment", side))
    }

    /// URN of the segment chained at `side`.
    ///
    /// Chained segments share the feature type of this segment.
    pub fn linked_segment_urn(&self, side: Side) -> Option<String> {
        self.segment_link(side)
            .map(|id| format!("{}/{}", self.feature_type(), id))
    }

    /// Tick mark at `side`.
    pub fn tick(&self, side: Side) -> Option<i64> {
        self.int_prop(&tick_field(side))
    }

    /// Set or clear the tick mark at `side`.
    pub fn set_tick(&mut self, side: Side, tick: Option<i64>) {
        match tick {
            Some(t) => self.set_property(&tick_field(side), t),
            None => self.clear_property(&tick_field(side)),
        }
    }

    /// Measured length in meters.
    pub fn length(&self) -> Option<f64> {
        self.f64_prop("length")
    }

    /// Set the measured length in meters.
    pub fn set_length(&mut self, meters: f64) {
        self.set_property("length", meters);
    }

    /// Digitized length in meters (zero when no geometry is known).
    pub fn digitized_length(&self) -> f64 {
        self.geom_length.unwrap_or(0.0)
    }
}

fn tick_field(side: Side) -> String {
    format!("{}_tick", side)
}

/// A raw connection record between pins of two network objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Record URN.
    pub urn: String,
    /// Upstream object.
    pub in_object: String,
    /// Side of the upstream object.
    pub in_side: Side,
    /// First upstream pin.
    pub in_low: u32,
    /// Last upstream pin.
    pub in_high: u32,
    /// Downstream object.
    pub out_object: String,
    /// Side of the downstream object.
    pub out_side: Side,
    /// First downstream pin.
    pub out_low: u32,
    /// Last downstream pin.
    pub out_high: u32,
    /// Equipment or structure housing the connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub housing: Option<String>,
    /// Outermost structure housing the connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_housing: Option<String>,
    /// True if the record belongs to another design.
    #[serde(default)]
    pub proposed: bool,
    /// Design change the record belongs to (proposed records only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    /// Display title of the design owning `delta`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_owner_title: Option<String>,
}

impl ConnectionRecord {
    /// Pins on the upstream object.
    pub fn in_pins(&self) -> PinRange {
        PinRange::new(self.in_side, self.in_low, self.in_high)
    }

    /// Pins on the downstream object.
    pub fn out_pins(&self) -> PinRange {
        PinRange::new(self.out_side, self.out_low, self.out_high)
    }

    /// True if `urn` is one of the connected objects.
    pub fn references(&self, urn: &str) -> bool {
        self.in_object == urn || self.out_object == urn
    }
}

/// A circuit running on a range of pins.
///
/// Port circuits sit on one side of a piece of equipment; segment
/// circuits sit on the fibers or pairs of a cable segment and carry the
/// default side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitInfo {
    /// URN of the circuit.
    pub circuit_urn: String,
    /// URN of the circuit port or circuit segment record.
    pub urn: String,
    /// Equipment or cable segment the circuit runs on.
    pub object: String,
    #[serde(default)]
    pub side: Side,
    pub low: u32,
    pub high: u32,
}

impl CircuitInfo {
    /// Pins the circuit occupies on `object`.
    pub fn pins(&self) -> PinRange {
        PinRange::new(self.side, self.low, self.high)
    }
}

/// Serialize a shared feature as its URN.
pub(crate) fn serialize_urn<S: Serializer>(
    feature: &Arc<Feature>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(feature.urn())
}

/// Serialize an optional shared feature as its URN.
pub(crate) fn serialize_opt_urn<S: Serializer>(
    feature: &Option<Arc<Feature>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match feature {
        Some(f) => serializer.serialize_some(f.urn()),
        None => serializer.serialize_none(),
    }
}
