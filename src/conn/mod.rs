//! Direction-aware view of a connection record.
//!
//! A [`Conn`] presents a raw [`ConnectionRecord`] as a link from one set
//! of pins to another. Looking upstream reverses the link; undirected
//! cables report the side relative to the object they are connected to.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Problem;
use crate::model::{serialize_opt_urn, ConnectionRecord, Feature, FeatureMap, Side};
use crate::pins::PinRange;

/// A connection from one set of pins to another.
#[derive(Debug, Clone, Serialize)]
pub struct Conn {
    #[serde(skip)]
    record: Arc<ConnectionRecord>,
    forward: bool,
    /// URN of the record.
    pub urn: String,
    /// URN of the upstream object.
    pub from_ref: String,
    /// Pins on the upstream object.
    pub from_pins: PinRange,
    /// URN of the downstream object.
    pub to_ref: String,
    /// Pins on the downstream object.
    pub to_pins: PinRange,
    #[serde(skip)]
    pub from_feature: Option<Arc<Feature>>,
    #[serde(skip)]
    pub from_cable: Option<Arc<Feature>>,
    #[serde(skip)]
    pub to_feature: Option<Arc<Feature>>,
    #[serde(skip)]
    pub to_cable: Option<Arc<Feature>>,
    /// Housing of the connection.
    #[serde(serialize_with = "serialize_opt_urn")]
    pub housing_feature: Option<Arc<Feature>>,
    #[serde(skip)]
    resolved: bool,
}

/// Build a [`Conn`] from a record (see [`Conn::new`]).
pub fn build_conn(
    record: Arc<ConnectionRecord>,
    forward: bool,
    features: Option<&FeatureMap>,
) -> Conn {
    Conn::new(record, forward, features)
}

impl Conn {
    /// View `record` as a connection.
    ///
    /// When `forward` is false the record is reversed. When `features` is
    /// supplied the connected features, their cables and the housing are
    /// resolved from it.
    pub fn new(
        record: Arc<ConnectionRecord>,
        forward: bool,
        features: Option<&FeatureMap>,
    ) -> Self {
        let (from_ref, from_pins, to_ref, to_pins) = if forward {
            (
                record.in_object.clone(),
                record.in_pins(),
                record.out_object.clone(),
                record.out_pins(),
            )
        } else {
            (
                record.out_object.clone(),
                record.out_pins(),
                record.in_object.clone(),
                record.in_pins(),
            )
        };

        let mut conn = Self {
            urn: record.urn.clone(),
            record,
            forward,
            from_ref,
            from_pins,
            to_ref,
            to_pins,
            from_feature: None,
            from_cable: None,
            to_feature: None,
            to_cable: None,
            housing_feature: None,
            resolved: false,
        };

        if let Some(features) = features {
            conn.resolve(features);
        }

        conn
    }

    fn resolve(&mut self, features: &FeatureMap) {
        let cable_of = |feature: &Option<Arc<Feature>>| {
            feature
                .as_ref()
                .and_then(|f| f.cable())
                .and_then(|urn| features.get(urn).cloned())
        };

        self.from_feature = features.get(&self.from_ref).cloned();
        self.from_cable = cable_of(&self.from_feature);
        self.to_feature = features.get(&self.to_ref).cloned();
        self.to_cable = cable_of(&self.to_feature);
        self.housing_feature = self
            .record
            .housing
            .as_deref()
            .and_then(|urn| features.get(urn).cloned());
        self.resolved = true;
    }

    /// The same record viewed in the opposite direction.
    ///
    /// Resolved features are swapped, not looked up again, so
    /// `conn.reversed().reversed()` has the same endpoints as `conn`.
    pub fn reversed(&self) -> Conn {
        Conn {
            record: Arc::clone(&self.record),
            forward: !self.forward,
            urn: self.urn.clone(),
            from_ref: self.to_ref.clone(),
            from_pins: self.to_pins,
            to_ref: self.from_ref.clone(),
            to_pins: self.from_pins,
            from_feature: self.to_feature.clone(),
            from_cable: self.to_cable.clone(),
            to_feature: self.from_feature.clone(),
            to_cable: self.from_cable.clone(),
            housing_feature: self.housing_feature.clone(),
            resolved: self.resolved,
        }
    }

    /// The underlying record.
    pub fn record(&self) -> &Arc<ConnectionRecord> {
        &self.record
    }

    /// True if this view follows the record's own direction.
    pub fn is_forward(&self) -> bool {
        self.forward
    }

    /// False if a feature lookup was supplied and an endpoint is missing from it.
    pub fn is_valid(&self) -> bool {
        !self.resolved || (self.from_feature.is_some() && self.to_feature.is_some())
    }

    /// Problems found while resolving endpoints.
    pub fn problems(&self) -> Vec<Problem> {
        if !self.resolved {
            return Vec::new();
        }

        let mut problems = Vec::new();
        for (urn, feature) in [
            (&self.from_ref, &self.from_feature),
            (&self.to_ref, &self.to_feature),
        ] {
            if feature.is_none() {
                problems.push(Problem::UnresolvedReference {
                    record: self.urn.clone(),
                    urn: urn.clone(),
                });
            }
        }
        problems
    }

    /// True if the record belongs to another design.
    pub fn is_proposed(&self) -> bool {
        self.record.proposed
    }

    /// Design change the record belongs to (proposed records only).
    pub fn delta(&self) -> Option<&str> {
        self.record.delta.as_deref()
    }

    /// URN of the record's housing.
    pub fn housing_urn(&self) -> Option<&str> {
        self.record.housing.as_deref()
    }

    /// End of the upstream cable that is connected (segments only).
    pub fn from_cable_side(&self) -> Option<Side> {
        self.from_cable.as_ref().map(|_| self.from_pins.other_side())
    }

    /// End of the downstream cable that is connected (segments only).
    pub fn to_cable_side(&self) -> Option<Side> {
        self.to_cable.as_ref().map(|_| self.to_pins.other_side())
    }

    /// Resolved features this connection relates to, keyed by URN.
    pub fn features(&self) -> FeatureMap {
        [
            &self.from_feature,
            &self.from_cable,
            &self.to_feature,
            &self.to_cable,
            &self.housing_feature,
        ]
        .into_iter()
        .flatten()
        .map(|f| (f.urn.clone(), Arc::clone(f)))
        .collect()
    }

    /// The downstream pin fed by `from_pin`.
    ///
    /// Both pin ranges must be the same size.
    pub fn to_pin_for(&self, from_pin: u32) -> u32 {
        debug_assert_eq!(
            self.from_pins.size(),
            self.to_pins.size(),
            "{} maps pin ranges of different size",
            self
        );
        self.to_pins.low + (from_pin - self.from_pins.low)
    }

    /// The upstream pin feeding `to_pin`.
    ///
    /// Both pin ranges must be the same size.
    pub fn from_pin_for(&self, to_pin: u32) -> u32 {
        debug_assert_eq!(
            self.from_pins.size(),
            self.to_pins.size(),
            "{} maps pin ranges of different size",
            self
        );
        self.from_pins.low + (to_pin - self.to_pins.low)
    }

    /// The user-level side of the upstream object.
    ///
    /// For an undirected cable connected to a non-cable object this is
    /// derived from the pins it is connected to.
    pub fn logical_from_side(&self) -> Side {
        if let (Some(cable), None) = (&self.from_cable, &self.to_cable) {
            if !cable.is_directed() {
                return self.to_pins.other_side();
            }
        }
        self.from_pins.side
    }

    /// The user-level side of the downstream object.
    ///
    /// For an undirected cable connected to a non-cable object this is
    /// derived from the pins it is connected to.
    pub fn logical_to_side(&self) -> Side {
        if let (Some(cable), None) = (&self.to_cable, &self.from_cable) {
            if !cable.is_directed() {
                return self.from_pins.other_side();
            }
        }
        self.to_pins.side
    }
}

impl std::fmt::Display for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Conn({}: {}#{} -> {}#{})",
            self.urn,
            self.from_ref,
            self.from_pins.spec(),
            self.to_ref,
            self.to_pins.spec()
        )
    }
}
