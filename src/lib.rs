//! # Comms Model
//!
//! Connectivity and containment modeling for telecom physical networks:
//! fiber, copper and coax cables, the equipment they connect, and the
//! structures and conduits that house them.
//!
//! ## Features
//!
//! - **Pin ranges**: contiguous port/fiber ranges with set arithmetic
//! - **Connections**: directional views over raw connection records
//! - **Trace trees**: signal paths through splices, splitters, muxes and connectors
//! - **Containment trees**: what is inside a structure or along a route
//! - **Tick marks**: calibrate measured cable lengths from sheath markings
//!
//! ## Architecture
//!
//! ```text
//! FeatureSource (host datasource / JSON snapshot)
//!        ↓
//! Conn, PinRange ──→ TraceBuilder ──→ PinTree forest
//!        ↓
//! StructureContent / RouteContent ──→ ContainmentNode, EquipNode
//! ```
//!
//! Builders are synchronous and work on fully loaded inputs. Data problems
//! (unresolved references, broken segment chains) are returned next to the
//! result as [`Problem`]s rather than failing the build.
//!
//! ## Example
//!
//! ```no_run
//! use comms_model::{build_containment_tree, ContainmentInput, NetworkConfig, SnapshotSource};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NetworkConfig::default();
//!     let source = SnapshotSource::from_path("network.json")?;
//!     let input = ContainmentInput::gather(&source, &config, "manhole/1")?;
//!     let outcome = build_containment_tree(&config, input);
//!     for problem in &outcome.problems {
//!         eprintln!("{}", problem);
//!     }
//!     println!("{}", serde_json::to_string_pretty(&outcome.value)?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Command line interface over network snapshots.
pub mod cli;
/// Configuration loaded from the environment.
pub mod config;
/// Connection views over raw connection records.
pub mod conn;
/// Structure and route containment trees.
pub mod containment;
/// Error types, soft problems and result aliases.
pub mod error;
/// Features and connection records.
pub mod model;
/// Pin range arithmetic.
pub mod pins;
/// Feature access and in-memory snapshots.
pub mod source;
/// Tick mark length reconciliation.
pub mod ticks;
/// Signal trace trees.
pub mod trace;

pub use config::{Config, EquipFunction, NetworkConfig};
pub use conn::{build_conn, Conn};
pub use containment::{
    build_containment_tree, build_route_tree, ContainmentInput, ContainmentNode, EquipNode,
    RouteInput, StructureContent,
};
pub use error::{AppError, AppResult, Outcome, Problem};
pub use model::{CircuitInfo, ConnectionRecord, Feature, FeatureMap, Side};
pub use pins::{pin_range_of, PinRange};
pub use source::{FeatureSource, Filter, Snapshot, SnapshotSource};
pub use ticks::{reconcile_tick_mark, LengthUnit, TickField, TickUpdate};
pub use trace::{build_trace_trees, PinTree, TraceBuilder};
