//! Command line inspection of a network snapshot.
//!
//! Every command reads a [`SnapshotSource`] and prints its result as JSON,
//! so the builders can be exercised against exported production data.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, error};

use crate::config::Config;
use crate::containment::{ContainmentInput, RouteContent, RouteInput, StructureContent};
use crate::error::{AppError, AppResult};
use crate::source::SnapshotSource;
use crate::ticks::{reconcile_tick_mark, LengthUnit, TickField};

/// Connectivity and containment modeling over a network snapshot.
#[derive(Parser, Debug, Clone)]
#[command(name = "comms-model", version, about)]
pub struct Cli {
    /// Snapshot file (JSON with `features` and `connections`)
    #[arg(long, short, env = "COMMS_SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Print compact JSON
    #[arg(long)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Tree shown by the `containment` command.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    /// Equipment, conduits and cables together
    #[default]
    Full,
    /// Cables and their ordered segments
    Cable,
    /// Conduits and the segments they carry
    Conduit,
    /// Equipment with ports and splices
    Equipment,
}

/// Snapshot subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Trace signal paths through the equipment of a structure
    Trace {
        /// Structure URN
        structure: String,

        /// Only trace inside this piece of equipment
        #[arg(long)]
        equip: Option<String>,
    },

    /// Show what a structure contains
    Containment {
        /// Structure URN
        structure: String,

        #[arg(long, value_enum, default_value_t = View::Full)]
        view: View,
    },

    /// Show the conduits and cables along a route
    Route {
        /// Route URN
        route: String,
    },

    /// Set a tick mark and print the recalculated segments
    Tick {
        /// Segment URN
        segment: String,

        /// Segment end: in_tick or out_tick
        #[arg(long, default_value = "in_tick")]
        field: TickField,

        /// Tick mark value
        #[arg(long, required_unless_present = "clear", conflicts_with = "clear")]
        tick: Option<i64>,

        /// Clear the tick mark at the joint
        #[arg(long)]
        clear: bool,

        /// Distance between consecutive marks (defaults to TICK_SPACING)
        #[arg(long)]
        spacing: Option<f64>,

        /// Unit of the spacing (defaults to TICK_UNIT)
        #[arg(long)]
        unit: Option<LengthUnit>,
    },
}

/// Result of CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute a command against a loaded snapshot.
pub fn execute_command(
    command: Commands,
    source: &SnapshotSource,
    config: &Config,
    compact: bool,
) -> CliResult {
    debug!(command = ?command, "Executing command");

    let result = match command {
        Commands::Trace { structure, equip } => {
            execute_trace(source, config, &structure, equip.as_deref(), compact)
        }
        Commands::Containment { structure, view } => {
            execute_containment(source, config, &structure, view, compact)
        }
        Commands::Route { route } => execute_route(source, config, &route, compact),
        Commands::Tick {
            segment,
            field,
            tick,
            clear,
            spacing,
            unit,
        } => {
            let tick = if clear { None } else { tick };
            let spacing = spacing.unwrap_or(config.ticks.spacing);
            let unit = unit.unwrap_or(config.ticks.unit);
            reconcile_tick_mark(source, &segment, tick, field, spacing, unit)
                .map_err(Into::into)
                .and_then(|update| to_json(&update, compact))
        }
    };

    match result {
        Ok(json) => CliResult::success(json),
        Err(e) => {
            error!(error = %e, "Command failed");
            CliResult::error(e.to_string())
        }
    }
}

fn execute_trace(
    source: &SnapshotSource,
    config: &Config,
    structure: &str,
    equip: Option<&str>,
    compact: bool,
) -> AppResult<String> {
    let input = ContainmentInput::gather(source, &config.network, structure)?;
    let content = StructureContent::new(&config.network, input);
    let (tree, mut problems) = content.equipment_tree().into_parts();

    let node = match equip {
        Some(urn) => tree
            .subtree_for(urn)
            .ok_or_else(|| AppError::NotFound {
                urn: urn.to_string(),
            })?,
        None => &tree,
    };

    let mut outcome = node.trace_trees(&config.network);
    problems.append(&mut outcome.problems);
    outcome.problems = problems;
    to_json(&outcome, compact)
}

fn execute_containment(
    source: &SnapshotSource,
    config: &Config,
    structure: &str,
    view: View,
    compact: bool,
) -> AppResult<String> {
    let input = ContainmentInput::gather(source, &config.network, structure)?;
    let content = StructureContent::new(&config.network, input);

    match view {
        View::Full => to_json(&content.containment_tree(), compact),
        View::Cable => to_json(&content.cable_tree(), compact),
        View::Conduit => to_json(&content.conduit_tree(), compact),
        View::Equipment => to_json(&content.equipment_tree(), compact),
    }
}

fn execute_route(
    source: &SnapshotSource,
    config: &Config,
    route: &str,
    compact: bool,
) -> AppResult<String> {
    let input = RouteInput::gather(source, &config.network, route)?;
    to_json(&RouteContent::new(input).cable_tree(), compact)
}

fn to_json<T: Serialize>(value: &T, compact: bool) -> AppResult<String> {
    let json = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    json.map_err(|e| AppError::Internal {
        message: format!("Cannot serialize result: {}", e),
    })
}
