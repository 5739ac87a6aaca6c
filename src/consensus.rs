// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Consensus finding: reduce the evidence gathered for a pin group to
//! one validated bit order.
//!
//! The passes, each of which may reject the whole group:
//! 1. drop observations where one origin gives a wire several indices.
//! 2. drop (origin, index) pairs claimed by several wires.
//! 3. translate all indices into the frame of one baseline origin.
//! 4. check completeness, continuity and uniqueness, then renumber
//!    the indices to `0..n`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use itertools::Itertools;
use crate::design::{Design, Origin, WireId};
use crate::error::BitorderError;
use crate::offset::{Observations, OffsetMatrix};
use crate::walker::{BitOrder, Evidence, KnownBitorders};

/// Evidence of one round: for each pin group, for each of its wires.
pub type CollectedEvidence = BTreeMap<Origin, BTreeMap<WireId, Evidence>>;

/// Why a pin group did not get a bit order this round.
#[derive(Debug)]
pub enum Rejection {
    /// Nothing left after removing conflicting observations.
    NoEvidence,
    /// The offsets between origins cannot be reconciled.
    Offsets(BitorderError),
    /// Some non-constant wire has no index.
    Incomplete { missing: usize },
    /// Indices are not consecutive (strict mode only).
    Gaps { min: i64, max: i64, count: usize },
    /// Two wires ended up with the same index.
    Duplicates,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoEvidence => write!(f, "no consistent evidence"),
            Rejection::Offsets(e) => write!(f, "{}", e),
            Rejection::Incomplete { missing } =>
                write!(f, "{} wires without index", missing),
            Rejection::Gaps { min, max, count } =>
                write!(f, "indices {}..={} have holes for {} wires", min, max, count),
            Rejection::Duplicates => write!(f, "duplicate indices"),
        }
    }
}

/// Keep only observations where the origin is unambiguous.
fn drop_ambiguous(per_wire: &BTreeMap<WireId, Evidence>) -> BTreeMap<WireId, Observations> {
    per_wire.iter().filter_map(|(&wire, evidence)| {
        let obs: Observations = evidence.iter()
            .filter(|(_, indices)| indices.len() == 1)
            .filter_map(|(&origin, indices)| indices.first().map(|&i| (origin, i)))
            .collect();
        (!obs.is_empty()).then_some((wire, obs))
    }).collect()
}

/// Remove every (origin, index) pair claimed by more than one wire.
fn drop_duplicate_claims(
    reduced: BTreeMap<WireId, Observations>
) -> BTreeMap<WireId, Observations> {
    let claims = reduced.values()
        .flat_map(|obs| obs.iter().map(|(&o, &i)| (o, i)))
        .counts();
    reduced.into_iter().filter_map(|(wire, obs)| {
        let obs: Observations = obs.into_iter()
            .filter(|&(o, i)| claims[&(o, i)] == 1)
            .collect();
        (!obs.is_empty()).then_some((wire, obs))
    }).collect()
}

/// Translate each wire's first observation into the baseline frame.
///
/// Wires whose origin has no offset chain to the baseline are kept
/// with their raw index only when it is their sole observation.
fn reconcile_offsets(
    reduced: &BTreeMap<WireId, Observations>
) -> Result<BTreeMap<WireId, i64>, BitorderError> {
    let mut matrix = OffsetMatrix::build(reduced.values())?;
    let mut consensus = BTreeMap::new();
    let Some(baseline) = matrix.baseline() else {
        return Ok(consensus)
    };
    for (&wire, obs) in reduced {
        let Some((&origin, &index)) = obs.iter().next() else {
            continue
        };
        match matrix.chain_offset(origin, baseline) {
            Some(offset) => {
                consensus.insert(wire, index + offset);
            },
            None if obs.len() == 1 => {
                consensus.insert(wire, index);
            },
            None => {
                clilog::debug!("wire {} has no offset chain from {} to baseline {}, dropped",
                               wire, origin, baseline);
            }
        }
    }
    Ok(consensus)
}

/// Check completeness and continuity, and renumber to `0..n`.
fn align(
    design: &Design, origin: Origin,
    consensus: &BTreeMap<WireId, i64>,
    strict: bool,
) -> Result<BitOrder, Rejection> {
    let mut complete = BTreeMap::new();
    let mut missing = 0;
    for wire in design.group_wires(origin.group) {
        if design.wires[wire.0].is_constant() {
            continue
        }
        match consensus.get(&wire) {
            Some(&index) => { complete.insert(wire, index); },
            None => missing += 1,
        }
    }
    if missing > 0 {
        return Err(Rejection::Incomplete { missing })
    }
    let (Some(&min), Some(&max)) = (complete.values().min(), complete.values().max()) else {
        return Err(Rejection::NoEvidence)
    };
    let count = complete.len();
    if strict && max - min > count as i64 - 1 {
        return Err(Rejection::Gaps { min, max, count })
    }
    let unique: BTreeSet<i64> = complete.values().copied().collect();
    if unique.len() < count {
        return Err(Rejection::Duplicates)
    }
    Ok(complete.into_iter()
       .sorted_by_key(|&(_, index)| index)
       .enumerate()
       .map(|(dense, (wire, _))| (wire, dense))
       .collect())
}

/// Find the bit order of one pin group from its evidence.
pub fn consensus_for_group(
    design: &Design, origin: Origin,
    per_wire: &BTreeMap<WireId, Evidence>,
    strict: bool,
) -> Result<BitOrder, Rejection> {
    let reduced = drop_ambiguous(per_wire);
    if reduced.is_empty() {
        return Err(Rejection::NoEvidence)
    }
    let reduced = drop_duplicate_claims(reduced);
    if reduced.is_empty() {
        return Err(Rejection::NoEvidence)
    }
    let consensus = reconcile_offsets(&reduced).map_err(Rejection::Offsets)?;
    align(design, origin, &consensus, strict)
}

/// Extract every well-formed bit order from the evidence of a round.
///
/// Groups without a consensus are skipped, never reported as errors.
pub fn extract_bitorders(
    design: &Design,
    collected: &CollectedEvidence,
    strict: bool,
) -> KnownBitorders {
    let mut wellformed = KnownBitorders::new();
    for (&origin, per_wire) in collected {
        match consensus_for_group(design, origin, per_wire, strict) {
            Ok(order) => {
                clilog::debug!("consensus for {}/{}: {} wires",
                               design.module_path(origin.module),
                               design.groups[origin.group.0].name,
                               order.len());
                wellformed.insert(origin, order);
            },
            Err(reason) => {
                clilog::debug!("no consensus for {}/{}: {}",
                               design.module_path(origin.module),
                               design.groups[origin.group.0].name,
                               reason);
            }
        }
    }
    wellformed
}
