//! Tick mark calibration of measured cable lengths.
//!
//! A technician reads the length markings printed on a cable sheath at a
//! segment end and records them as tick marks. Setting a tick rescales the
//! measured length of every segment between it and the next known tick so
//! that the chain adds up to the calibrated distance. Each segment keeps
//! its share of the distance in proportion to its digitized length.
//!
//! All changes are made on a working copy; the caller receives the full
//! list of updated segments, or an error and nothing at all.

mod units;


pub use units::LengthUnit;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TickConfig;
use crate::error::{TickError, TickResult};
use crate::model::{Feature, Side};
use crate::source::FeatureSource;

/// The tick field being set on a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickField {
    InTick,
    OutTick,
}

impl TickField {
    /// Segment end the field belongs to.
    pub fn side(self) -> Side {
        match self {
            TickField::InTick => Side::In,
            TickField::OutTick => Side::Out,
        }
    }
}

impl std::fmt::Display for TickField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_tick", self.side())
    }
}

impl std::str::FromStr for TickField {
    type Err = TickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_tick" | "in" => Ok(TickField::InTick),
            "out_tick" | "out" => Ok(TickField::OutTick),
            _ => Err(TickError::UnknownField {
                field: s.to_string(),
            }),
        }
    }
}

/// Segments changed by one tick mark operation, to be persisted together.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickUpdate {
    /// Updated segments in the order they were first touched.
    pub updated_segments: Vec<Feature>,
}

impl TickUpdate {
    /// The updated version of `urn`, if it was touched.
    pub fn segment(&self, urn: &str) -> Option<&Feature> {
        self.updated_segments.iter().find(|s| s.urn == urn)
    }
}

/// Set (or clear) a tick mark and reconcile measured lengths around it.
///
/// `spacing` is the distance between consecutive tick marks in `unit`.
/// When `tick_mark` is `None` the tick is cleared on both sides of the
/// joint and no length is recomputed.
pub fn reconcile_tick_mark<S>(
    source: &S,
    segment_urn: &str,
    tick_mark: Option<i64>,
    field: TickField,
    spacing: f64,
    unit: LengthUnit,
) -> TickResult<TickUpdate>
where
    S: FeatureSource + ?Sized,
{
    let mut edit = TickEdit::new(source, spacing, unit);

    match tick_mark {
        None => edit.clear_tick(segment_urn, field.side())?,
        Some(tick) => edit.set_tick_mark(segment_urn, tick, field.side())?,
    }

    let update = edit.finish();
    info!(
        segment = %segment_urn,
        field = %field,
        tick = ?tick_mark,
        updated = update.updated_segments.len(),
        "Tick mark reconciled"
    );
    Ok(update)
}

/// [`reconcile_tick_mark`] using the configured spacing and unit.
pub fn reconcile_with_config<S>(
    source: &S,
    config: &TickConfig,
    segment_urn: &str,
    tick_mark: Option<i64>,
    field: TickField,
) -> TickResult<TickUpdate>
where
    S: FeatureSource + ?Sized,
{
    reconcile_tick_mark(
        source,
        segment_urn,
        tick_mark,
        field,
        config.spacing,
        config.unit,
    )
}

/// Distance in meters between two tick marks.
///
/// `spacing` is the distance between consecutive marks, in `unit`.
pub fn compute_tick_dist(seg_tick: i64, tick: i64, spacing: f64, unit: LengthUnit) -> f64 {
    let ticks = seg_tick.abs_diff(tick) as f64;
    unit.to_meters(ticks * spacing)
}

/// Error unless `[before, tick, after]` runs in one direction.
///
/// Equal neighboring marks are accepted, so a tick may repeat its
/// neighbor's value. Nothing is checked when either neighbor is unknown.
pub fn assert_tick_mark_valid(
    tick: i64,
    before: Option<i64>,
    after: Option<i64>,
) -> TickResult<()> {
    let (Some(before), Some(after)) = (before, after) else {
        return Ok(());
    };

    let ticks = [before, tick, after];
    let ascending = ticks.windows(2).all(|w| w[0] <= w[1]);
    let descending = ticks.windows(2).all(|w| w[0] >= w[1]);

    if ascending || descending {
        Ok(())
    } else {
        Err(TickError::OverlappingTickMark {
            ticks: ticks.to_vec(),
        })
    }
}

/// Working copy of the segments touched by one operation.
struct TickEdit<'a, S: ?Sized> {
    source: &'a S,
    spacing: f64,
    unit: LengthUnit,
    working: HashMap<String, Feature>,
    touched: Vec<String>,
}

impl<'a, S> TickEdit<'a, S>
where
    S: FeatureSource + ?Sized,
{
    fn new(source: &'a S, spacing: f64, unit: LengthUnit) -> Self {
        Self {
            source,
            spacing,
            unit,
            working: HashMap::new(),
            touched: Vec::new(),
        }
    }

    /// Current state of a segment (working copy first).
    fn segment(&self, urn: &str) -> TickResult<Feature> {
        if let Some(seg) = self.working.get(urn) {
            return Ok(seg.clone());
        }
        self.source
            .feature_by_urn(urn)
            .map(|f| f.as_ref().clone())
            .ok_or_else(|| TickError::SegmentNotFound {
                urn: urn.to_string(),
            })
    }

    /// The segment chained at `side` of `seg` (none at a cable end).
    fn linked(&self, seg: &Feature, side: Side) -> Option<Feature> {
        let urn = seg.linked_segment_urn(side)?;
        match self.segment(&urn) {
            Ok(linked) => Some(linked),
            Err(_) => {
                warn!(segment = %seg.urn, linked = %urn, "Chained segment not found");
                None
            }
        }
    }

    fn update(&mut self, seg: Feature) {
        if !self.working.contains_key(&seg.urn) {
            self.touched.push(seg.urn.clone());
        }
        self.working.insert(seg.urn.clone(), seg);
    }

    fn finish(mut self) -> TickUpdate {
        let updated_segments = self
            .touched
            .iter()
            .filter_map(|urn| self.working.remove(urn))
            .collect();
        TickUpdate { updated_segments }
    }

    /// Clear the tick at `side` of a segment and the matching tick across the joint.
    fn clear_tick(&mut self, urn: &str, side: Side) -> TickResult<()> {
        let mut seg = self.segment(urn)?;
        seg.set_tick(side, None);

        let next = self.linked(&seg, side);
        self.update(seg);

        if let Some(mut next) = next {
            next.set_tick(side.other(), None);
            self.update(next);
        }
        Ok(())
    }

    /// Set the tick at `side` of a segment and at the adjoining end across the joint.
    fn set_tick_mark(&mut self, urn: &str, tick: i64, side: Side) -> TickResult<()> {
        let seg = self.segment(urn)?;

        let near = self.set_tick(&seg.urn, side, tick)?;
        let far = match self.linked(&seg, side) {
            Some(next) => self.set_tick(&next.urn, side.other(), tick)?,
            None => None,
        };

        // Bounding ticks in cable order
        let (downstream, upstream) = match side {
            Side::In => (near, far),
            Side::Out => (far, near),
        };

        self.assert_end_seg_valid(&seg, tick, downstream, upstream)?;
        assert_tick_mark_valid(tick, downstream, upstream)
    }

    /// Set one tick and rescale the segments between it and the next tick.
    ///
    /// An `in` tick bounds the segments downstream of it, an `out` tick
    /// those upstream. Returns the bounding tick, if there is one.
    fn set_tick(&mut self, urn: &str, side: Side, tick: i64) -> TickResult<Option<i64>> {
        let mut seg = self.segment(urn)?;
        seg.set_tick(side, Some(tick));
        self.update(seg.clone());

        let toward = side.other();
        let (segs, bound) = self.segs_to_tick(&seg, toward);

        let Some(bound) = bound else {
            debug!(segment = %urn, side = %side, "No bounding tick, lengths unchanged");
            return Ok(None);
        };

        let tick_dist = compute_tick_dist(tick, bound, self.spacing, self.unit);
        self.adjust_measured_lengths(&segs, tick_dist)?;

        Ok(Some(bound))
    }

    /// Segments from `start` toward `toward` up to the next tick mark.
    ///
    /// Returns no segments and no tick when the chain ends first.
    fn segs_to_tick(&self, start: &Feature, toward: Side) -> (Vec<String>, Option<i64>) {
        let mut segs = vec![start.urn.clone()];
        let mut seen: HashSet<String> = segs.iter().cloned().collect();
        let mut current = start.clone();

        loop {
            if let Some(tick) = current.tick(toward) {
                return (segs, Some(tick));
            }

            let Some(next) = self.linked(&current, toward) else {
                return (Vec::new(), None);
            };

            if let Some(tick) = next.tick(toward.other()) {
                return (segs, Some(tick));
            }

            if !seen.insert(next.urn.clone()) {
                warn!(segment = %next.urn, "Segment chain loops back on itself");
                return (Vec::new(), None);
            }

            segs.push(next.urn.clone());
            current = next;
        }
    }

    /// Scale measured lengths of `segs` so they sum to `tick_dist`.
    fn adjust_measured_lengths(&mut self, segs: &[String], tick_dist: f64) -> TickResult<()> {
        let mut chain = Vec::with_capacity(segs.len());
        for urn in segs {
            chain.push(self.segment(urn)?);
        }

        let calc_dist: f64 = chain.iter().map(Feature::digitized_length).sum();
        if !(calc_dist.is_finite() && calc_dist > 0.0) {
            return Err(TickError::ZeroLengthChain {
                segments: segs.to_vec(),
            });
        }

        let factor = tick_dist / calc_dist;
        for mut seg in chain {
            let length = factor * seg.digitized_length();
            seg.set_length(length);
            self.update(seg);
        }

        Ok(())
    }

    /// Validate a tick set at a cable end, where only one neighbor tick is known.
    ///
    /// Looks one further segment out for the real bounding tick.
    fn assert_end_seg_valid(
        &self,
        seg: &Feature,
        tick: i64,
        downstream: Option<i64>,
        upstream: Option<i64>,
    ) -> TickResult<()> {
        match (downstream, upstream) {
            (None, Some(upstream)) => {
                let further = self
                    .linked(seg, Side::In)
                    .and_then(|prev| self.segs_to_tick(&prev, Side::In).1);
                assert_tick_mark_valid(upstream, Some(tick), further)
            }
            (Some(downstream), None) => {
                let further = self
                    .linked(seg, Side::Out)
                    .and_then(|next| self.segs_to_tick(&next, Side::Out).1);
                assert_tick_mark_valid(downstream, Some(tick), further)
            }
            _ => Ok(()),
        }
    }
}
