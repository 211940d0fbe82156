//! Access to features owned by the host platform.
//!
//! The engine never fetches data itself. Callers hand it a
//! [`FeatureSource`]: the host's datasource in production, a
//! [`SnapshotSource`] loaded from JSON for tools and tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{SnapshotError, SnapshotResult};
use crate::model::{CircuitInfo, ConnectionRecord, Feature, FeatureMap};

/// Record filter understood by a [`FeatureSource`].
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every record.
    All,
    /// Records whose `field` equals `value`.
    FieldEquals { field: String, value: String },
    /// Records matching any of the filters.
    AnyOf(Vec<Filter>),
}

impl Filter {
    /// Shorthand for [`Filter::FieldEquals`].
    pub fn field_eq(field: &str, value: &str) -> Self {
        Filter::FieldEquals {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// True if `feature` passes the filter.
    pub fn matches_feature(&self, feature: &Feature) -> bool {
        match self {
            Filter::All => true,
            Filter::FieldEquals { field, value } => {
                feature.ref_prop(field).as_deref() == Some(value.as_str())
            }
            Filter::AnyOf(filters) => filters.iter().any(|f| f.matches_feature(feature)),
        }
    }

    /// True if `record` passes the filter.
    pub fn matches_connection(&self, record: &ConnectionRecord) -> bool {
        match self {
            Filter::All => true,
            Filter::FieldEquals { field, value } => {
                let actual = match field.as_str() {
                    "urn" => Some(record.urn.as_str()),
                    "in_object" => Some(record.in_object.as_str()),
                    "out_object" => Some(record.out_object.as_str()),
                    "housing" => record.housing.as_deref(),
                    "root_housing" => record.root_housing.as_deref(),
                    _ => None,
                };
                actual == Some(value.as_str())
            }
            Filter::AnyOf(filters) => filters.iter().any(|f| f.matches_connection(record)),
        }
    }

    /// True if `info` passes the filter.
    pub fn matches_circuit(&self, info: &CircuitInfo) -> bool {
        match self {
            Filter::All => true,
            Filter::FieldEquals { field, value } => {
                let actual = match field.as_str() {
                    "urn" => &info.urn,
                    "circuit_urn" => &info.circuit_urn,
                    "object" => &info.object,
                    _ => return false,
                };
                actual == value
            }
            Filter::AnyOf(filters) => filters.iter().any(|f| f.matches_circuit(info)),
        }
    }
}

/// Read access to network features.
#[cfg_attr(test, mockall::automock)]
pub trait FeatureSource {
    /// The feature identified by `urn`, if it exists.
    fn feature_by_urn(&self, urn: &str) -> Option<Arc<Feature>>;

    /// Features of type `feature_type` passing `filter`.
    fn features(&self, feature_type: &str, filter: &Filter) -> Vec<Arc<Feature>>;

    /// Features of any type passing `filter`.
    fn features_matching(&self, filter: &Filter) -> Vec<Arc<Feature>>;

    /// Connection records passing `filter`.
    fn connections(&self, filter: &Filter) -> Vec<Arc<ConnectionRecord>>;

    /// Circuit port and circuit segment records passing `filter`.
    ///
    /// Sources that do not track circuits report none.
    fn circuits(&self, _filter: &Filter) -> Vec<Arc<CircuitInfo>> {
        Vec::new()
    }

    /// Bulk variant of [`FeatureSource::feature_by_urn`]; missing URNs are skipped.
    fn features_by_urn(&self, urns: &[String]) -> FeatureMap {
        urns.iter()
            .filter_map(|urn| self.feature_by_urn(urn).map(|f| (urn.clone(), f)))
            .collect()
    }
}

/// Serialized form of a set of features and connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
    #[serde(default)]
    pub circuits: Vec<CircuitInfo>,
}

impl Snapshot {
    /// Parse a snapshot from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> SnapshotResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// In-memory [`FeatureSource`] over a snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSource {
    features: FeatureMap,
    order: Vec<String>,
    connections: Vec<Arc<ConnectionRecord>>,
    circuits: Vec<Arc<CircuitInfo>>,
}

impl SnapshotSource {
    /// Index a snapshot, rejecting duplicate feature URNs.
    pub fn new(snapshot: Snapshot) -> SnapshotResult<Self> {
        let mut features = HashMap::with_capacity(snapshot.features.len());
        let mut order = Vec::with_capacity(snapshot.features.len());

        for feature in snapshot.features {
            if features.contains_key(&feature.urn) {
                return Err(SnapshotError::DuplicateUrn { urn: feature.urn });
            }
            order.push(feature.urn.clone());
            features.insert(feature.urn.clone(), Arc::new(feature));
        }

        Ok(Self {
            features,
            order,
            connections: snapshot.connections.into_iter().map(Arc::new).collect(),
            circuits: snapshot.circuits.into_iter().map(Arc::new).collect(),
        })
    }

    /// Load and index a snapshot file.
    pub fn from_path(path: impl AsRef<Path>) -> SnapshotResult<Self> {
        Self::new(Snapshot::from_path(path)?)
    }

    /// All features keyed by URN.
    pub fn feature_map(&self) -> &FeatureMap {
        &self.features
    }

    /// All features in snapshot order.
    pub fn all_features(&self) -> impl Iterator<Item = &Arc<Feature>> {
        self.order.iter().filter_map(|urn| self.features.get(urn))
    }
}

impl FeatureSource for SnapshotSource {
    fn feature_by_urn(&self, urn: &str) -> Option<Arc<Feature>> {
        self.features.get(urn).cloned()
    }

    fn features(&self, feature_type: &str, filter: &Filter) -> Vec<Arc<Feature>> {
        self.all_features()
            .filter(|f| f.feature_type() == feature_type && filter.matches_feature(f))
            .cloned()
            .collect()
    }

    fn features_matching(&self, filter: &Filter) -> Vec<Arc<Feature>> {
        self.all_features()
            .filter(|f| filter.matches_feature(f))
            .cloned()
            .collect()
    }

    fn connections(&self, filter: &Filter) -> Vec<Arc<ConnectionRecord>> {
        self.connections
            .iter()
            .filter(|c| filter.matches_connection(c))
            .cloned()
            .collect()
    }

    fn circuits(&self, filter: &Filter) -> Vec<Arc<CircuitInfo>> {
        self.circuits
            .iter()
            .filter(|c| filter.matches_circuit(c))
            .cloned()
            .collect()
    }
}
