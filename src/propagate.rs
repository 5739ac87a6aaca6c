// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Fixed-point bit order propagation.
//!
//! Each round walks the design from every pin of every unresolved pin
//! group, runs consensus finding on everything collected, and adds
//! the newly found bit orders to the known set. Rounds repeat until
//! nothing is left to resolve or a round collects exactly the same
//! evidence as the previous one.

use std::collections::{BTreeSet, HashSet, VecDeque};
use crate::consensus::{extract_bitorders, CollectedEvidence};
use crate::design::{Design, ModuleId, Origin, PinDirection, WireId};
use crate::error::{BitorderError, Result, ResultExt};
use crate::reorder::reorder_pin_groups;
use crate::walker::{gather_evidence, merge_evidence, BitOrder, KnownBitorders};

/// Tunables of the propagation.
#[derive(Debug, Clone, Copy)]
pub struct PropagationOptions {
    /// Reject bit orders whose indices are not consecutive.
    pub strict: bool,
    /// Stop after this many rounds even without a fixed point.
    pub max_rounds: Option<usize>,
}

impl Default for PropagationOptions {
    fn default() -> Self {
        PropagationOptions { strict: true, max_rounds: None }
    }
}

/// The outcome of [`propagate_bitorders`].
#[derive(Debug, Default)]
pub struct PropagationReport {
    /// Every well-formed bit order, the given known ones included.
    pub bitorders: KnownBitorders,
    /// The requested unknown groups that got a bit order.
    pub resolved: BTreeSet<Origin>,
    pub rounds: usize,
}

/// Collect the evidence for all pins of one pin group.
///
/// Every pin is walked outwards (starting in the parent module) and
/// inwards (starting in the module itself).
fn collect_group(
    design: &Design, origin: Origin,
    known: &KnownBitorders,
    collected: &mut CollectedEvidence,
) -> Result<()> {
    let m = origin.module;
    let group = &design.groups[origin.group.0];
    let parent = design.modules[m.0].parent.ok_or(BitorderError::TopModuleUnresolved)?;
    let successors = group.direction == PinDirection::Output;
    for wire in design.group_wires(origin.group) {
        let mut evidence = gather_evidence(
            design, wire, parent, known, successors, &mut HashSet::new()
        ).with_context(|| format!(
            "cannot propagate bit order: failed to gather bit indices outwards \
             starting from the module with id {} and pin group {}",
            m, group.name
        ))?;
        let inwards = gather_evidence(
            design, wire, m, known, !successors, &mut HashSet::new()
        ).with_context(|| format!(
            "cannot propagate bit order: failed to gather bit indices inwards \
             starting from the module with id {} and pin group {}",
            m, group.name
        ))?;
        merge_evidence(&mut evidence, inwards);
        merge_evidence(
            collected.entry(origin).or_default().entry(wire).or_default(),
            evidence
        );
    }
    Ok(())
}

/// Whether a pending group of some (recursive) submodule of `m` is
/// still in the queue.
fn has_pending_submodule(design: &Design, m: ModuleId, queue: &VecDeque<Origin>) -> bool {
    let subs: HashSet<ModuleId> = design.submodules(m, true).into_iter().collect();
    queue.iter().any(|o| subs.contains(&o.module))
}

/// Run one round: walk all pending groups, children before parents.
fn collect_round(
    design: &Design, pending: Vec<Origin>,
    known: &KnownBitorders,
) -> Result<CollectedEvidence> {
    let mut collected = CollectedEvidence::new();
    let mut queue: VecDeque<Origin> = pending.into();
    let mut deferrals = 0;
    while let Some(origin) = queue.pop_front() {
        if deferrals <= queue.len() && has_pending_submodule(design, origin.module, &queue) {
            queue.push_back(origin);
            deferrals += 1;
            continue
        }
        if deferrals > queue.len() {
            clilog::warn!("module hierarchy does not allow processing children first, \
                           continuing with {}", design.module_path(origin.module));
        }
        deferrals = 0;
        collect_group(design, origin, known, &mut collected)?;
    }
    Ok(collected)
}

/// Propagate known bit orders to the unknown pin groups until a
/// fixed point is reached.
///
/// Returns all well-formed bit orders. Failing to resolve a group is
/// not an error; malformed designs are.
pub fn propagate_bitorders(
    design: &Design,
    known: KnownBitorders,
    unknown: &BTreeSet<Origin>,
    options: PropagationOptions,
) -> Result<PropagationReport> {
    for &origin in known.keys().chain(unknown) {
        design.check_origin(origin).context("cannot propagate bit order")?;
    }
    let mut report = PropagationReport {
        bitorders: known,
        ..Default::default()
    };
    let mut previous: Option<CollectedEvidence> = None;

    loop {
        let mut pending = Vec::new();
        for &origin in unknown {
            if design.is_top(origin.module) {
                clilog::error!("{}", BitorderError::TopModuleUnresolved);
                continue
            }
            if !report.bitorders.contains_key(&origin) {
                pending.push(origin);
            }
        }
        if pending.is_empty() {
            break
        }
        if matches!(options.max_rounds, Some(max) if report.rounds >= max) {
            clilog::info!("stopping after {} rounds with {} pin groups unresolved",
                          report.rounds, pending.len());
            break
        }

        clilog::info!("starting {}bit order propagation round {} with {} pin groups",
                      if options.strict { "strict " } else { "" },
                      report.rounds, pending.len());
        let timer_round = clilog::stimer!("bit order propagation round");
        let collected = collect_round(design, pending, &report.bitorders)?;
        let newly = extract_bitorders(design, &collected, options.strict);
        clilog::finish!(timer_round);

        for (origin, order) in newly {
            report.resolved.insert(origin);
            report.bitorders.insert(origin, order);
        }
        report.rounds += 1;

        if previous.as_ref() == Some(&collected) {
            break
        }
        previous = Some(collected);
    }

    clilog::info!("found a valid bit order for {} pin groups", report.bitorders.len());
    Ok(report)
}

/// Turn ordered wire lists into bit orders.
fn bitorder_of(wires: &[WireId]) -> BitOrder {
    wires.iter().enumerate().map(|(i, &w)| (w, i)).collect()
}

/// Check that `wires` names the pins of a group once each, and turn
/// it into a bit order. Constant wires may repeat.
fn known_bitorder(design: &Design, origin: Origin, wires: &[WireId]) -> Result<BitOrder> {
    let group = &design.groups[origin.group.0];
    let invalid = |reason: String| BitorderError::InvalidBitOrder {
        group: group.name.to_string(), reason
    };
    if wires.len() != group.pins.len() {
        return Err(invalid(format!("{} wires given for {} pins", wires.len(), group.pins.len())))
    }
    let mut seen = HashSet::with_capacity(wires.len());
    for &w in wires {
        if !group.pins.iter().any(|p| design.pins[p.0].wire == w) {
            return Err(invalid(format!("wire with id {} is not a pin of the group", w.0)))
        }
        if !seen.insert(w) && !design.wires[w.0].is_constant() {
            return Err(invalid(format!("wire {} is listed twice", design.wires[w.0].name)))
        }
    }
    Ok(bitorder_of(wires))
}

/// Propagate from groups with known wire order to unknown groups,
/// then reorder the pins of every group with a bit order to match,
/// the known ones included.
///
/// Returns whether at least one unknown group was resolved.
pub fn propagate(
    design: &mut Design,
    known: &[(Origin, Vec<WireId>)],
    unknown: &[Origin],
    options: PropagationOptions,
) -> Result<bool> {
    let mut known_orders = KnownBitorders::new();
    for (origin, wires) in known {
        design.check_origin(*origin).context("cannot propagate bit order")?;
        let order = known_bitorder(design, *origin, wires)
            .context("cannot propagate bit order")?;
        known_orders.insert(*origin, order);
    }
    let unknown_set: BTreeSet<Origin> = unknown.iter().copied().collect();

    let report = propagate_bitorders(design, known_orders, &unknown_set, options)
        .context("cannot propagate bit order: failed propagation")?;
    reorder_pin_groups(design, &report.bitorders)
        .context("cannot propagate bit order: failed to reorder pin groups")?;

    let num_known = known.len();
    let num_unknown = unknown_set.len();
    let num_new = report.resolved.len();
    clilog::info!("with {} known bit orders, {} unknown bit orders got reconstructed",
                  num_known, num_new);
    clilog::info!("{} / {} = {:.3} of all unknown bit orders",
                  num_new, num_unknown, ratio(num_new, num_unknown));
    clilog::info!("{} / {} = {:.3} of all pin group bit orders",
                  num_new + num_known, num_unknown + num_known,
                  ratio(num_new + num_known, num_unknown + num_known));
    Ok(num_new > 0)
}

fn ratio(a: usize, b: usize) -> f64 {
    match b {
        0 => 0.,
        _ => a as f64 / b as f64,
    }
}

/// Like [`propagate`], taking the current pin order of each known
/// group as its bit order.
pub fn propagate_groups(
    design: &mut Design,
    known: &[Origin],
    unknown: &[Origin],
    options: PropagationOptions,
) -> Result<bool> {
    let mut known_wires = Vec::with_capacity(known.len());
    for &origin in known {
        design.check_origin(origin).context("cannot propagate bit order")?;
        let group = &design.groups[origin.group.0];
        let mut wires = Vec::with_capacity(group.pins.len());
        for index in 0..group.pins.len() {
            let pin = design.pin_at_index(origin.group, index).with_context(|| format!(
                "cannot propagate bit order: failed to get pin at index {} inside of pin group {}",
                index, group.name
            ))?;
            wires.push(design.pins[pin.0].wire);
        }
        known_wires.push((origin, wires));
    }
    propagate(design, &known_wires, unknown, options)
}

/// Resolve `(module id, pin group name)` pairs to origins.
pub fn origins_by_name(design: &Design, names: &[(ModuleId, &str)]) -> Result<Vec<Origin>> {
    names.iter().map(|&(m, name)| {
        let m = design.module_by_id(m.0).context("cannot propagate bit order")?;
        let g = design.pin_group_by_name(m, name).context("cannot propagate bit order")?;
        Ok(Origin::new(m, g))
    }).collect()
}

/// Like [`propagate_groups`], with pin groups given by module id and
/// exact name.
pub fn propagate_by_name(
    design: &mut Design,
    known: &[(ModuleId, &str)],
    unknown: &[(ModuleId, &str)],
    options: PropagationOptions,
) -> Result<bool> {
    let known = origins_by_name(design, known)?;
    let unknown = origins_by_name(design, unknown)?;
    propagate_groups(design, &known, &unknown, options)
}
