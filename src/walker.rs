// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Evidence gathering by walking the design graph.
//!
//! Starting from a wire, we follow fan-out (forward) or fan-in
//! (backward) through combinational gates and the data/state pins of
//! flip-flops and latches, until we hit the border of a module whose
//! pin group already has a known bit order. The index of the wire in
//! that bit order is one piece of evidence.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use indexmap::IndexMap;
use crate::design::{Design, GateId, GateKind, ModuleId, Origin, PinRole, WireId};
use crate::error::{BitorderError, Result, ResultExt};

/// A resolved bit order: wire to index.
pub type BitOrder = IndexMap<WireId, usize>;

/// All bit orders known so far.
pub type KnownBitorders = BTreeMap<Origin, BitOrder>;

/// For one wire, the candidate indices observed from each origin.
pub type Evidence = BTreeMap<Origin, BTreeSet<i64>>;

/// Merge `other` into `into`, unioning index sets per origin.
pub fn merge_evidence(into: &mut Evidence, other: Evidence) {
    for (origin, indices) in other {
        into.entry(origin).or_default().extend(indices);
    }
}

/// If `wire` crosses the border of `module` (entering it when
/// `entering` is set, leaving it otherwise), look up the index of the
/// wire in the known bit order of the pin group it connects to.
fn index_from_origin(
    design: &Design,
    wire: WireId, module: ModuleId,
    known: &KnownBitorders,
    entering: bool,
) -> Result<Option<(Origin, i64)>> {
    let is_border = match entering {
        true => design.is_input_wire(module, wire),
        false => design.is_output_wire(module, wire),
    };
    if !is_border {
        return Ok(None)
    }
    let pin = design.pin_by_wire(module, wire).ok_or(
        BitorderError::MissingBorderPin { wire: wire.0, module: module.0 }
    )?;
    let origin = Origin::new(module, design.pins[pin.0].group);
    Ok(known.get(&origin)
       .and_then(|order| order.get(&wire))
       .map(|&index| (origin, index as i64)))
}

/// The wires a gate passes evidence on to. Empty for gates that
/// stop propagation.
fn next_wires(design: &Design, gate: GateId, forward: bool) -> Vec<WireId> {
    let pins: Vec<_> = match forward {
        true => design.fan_out(gate).collect(),
        false => design.fan_in(gate).collect(),
    };
    match design.gates[gate.0].kind {
        GateKind::Combinational => pins.into_iter().map(|(_, w)| w).collect(),
        GateKind::FlipFlop | GateKind::Latch => pins.into_iter()
            .filter(|(p, _)| matches!(
                p.role, PinRole::Data | PinRole::State | PinRole::NegState
            ))
            .map(|(_, w)| w)
            .collect(),
        GateKind::Sequential | GateKind::Unsupported => vec![],
    }
}

/// Gather bit index evidence for `wire`.
///
/// `border` is the module we are currently walking inside of.
/// Leaving it, or entering a module with a known pin group, yields
/// evidence and ends that branch. Gates in `visited` are skipped;
/// each branch continues with its own copy of the visited set.
pub fn gather_evidence(
    design: &Design,
    wire: WireId, border: ModuleId,
    known: &KnownBitorders,
    forward: bool,
    visited: &mut HashSet<GateId>,
) -> Result<Evidence> {
    let mut evidence = Evidence::new();
    let w = &design.wires[wire.0];

    // global nets have no gates beyond them, but may have a bit order
    // annotated at the top module.
    if (forward && w.global_output) || (!forward && w.global_input) {
        let top = design.top();
        if let Some((origin, index)) = index_from_origin(design, wire, top, known, !forward)
            .with_context(|| format!(
                "cannot gather bit indices for wire {}: failed to gather index at top module",
                w.name
            ))?
        {
            evidence.entry(origin).or_default().insert(index);
        }
        return Ok(evidence)
    }

    for gate in design.neighbor_gates(wire, forward) {
        if !visited.insert(gate) {
            continue
        }
        let found_module = design.gates[gate.0].module;
        clilog::trace!("wire {} reaches gate {} in module {}",
                       w.name, design.gates[gate.0].name, found_module);

        // left the module we were walking in
        if !design.contains_gate(border, gate, true) {
            if let Some((origin, index)) = index_from_origin(design, wire, border, known, !forward)
                .with_context(|| format!(
                    "cannot gather bit indices for wire {}: failed to gather index at module with id {}",
                    w.name, border
                ))?
            {
                evidence.entry(origin).or_default().insert(index);
            }
            continue
        }

        // entered a submodule
        if found_module != border {
            if let Some((origin, index)) = index_from_origin(design, wire, found_module, known, forward)
                .with_context(|| format!(
                    "cannot gather bit indices for wire {}: failed to gather index at module with id {}",
                    w.name, found_module
                ))?
            {
                evidence.entry(origin).or_default().insert(index);
                continue
            }
            // only stop at leaf modules
            if design.modules[found_module.0].submodules.is_empty() {
                continue
            }
        }

        let mut branch_visited = visited.clone();
        for next in next_wires(design, gate, forward) {
            let sub = gather_evidence(
                design, next, found_module, known, forward, &mut branch_visited
            )?;
            merge_evidence(&mut evidence, sub);
        }
    }

    Ok(evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::fixtures::*;
    use crate::design::PinDirection;

    fn known_of(design: &Design, origin: Origin) -> KnownBitorders {
        let order = design.group_wires(origin.group)
            .enumerate().map(|(i, w)| (w, i)).collect();
        [(origin, order)].into_iter().collect()
    }

    #[test]
    fn test_gather_across_sibling_modules() {
        let t = two_modules(4, &[3, 2, 1, 0]);
        let known = known_of(&t.design, t.src);
        // walking outwards from dst's input pins, backwards
        let top = t.design.top();
        for (i, w) in t.design.group_wires(t.dst.group).enumerate() {
            let ev = gather_evidence(
                &t.design, w, top, &known, false, &mut HashSet::new()
            ).unwrap();
            let indices = &ev[&t.src];
            assert_eq!(indices.len(), 1);
            assert_eq!(*indices.first().unwrap(), 3 - i as i64);
        }
    }

    #[test]
    fn test_gather_through_logic_and_flipflop() {
        // src/o -> buf -> dff -> dst/i, all in top
        let mut d = Design::new("top");
        let top = d.top();
        let src = d.add_module("src", top);
        let dst = d.add_module("dst", top);
        let clk = d.add_global_input("clk");
        let a = d.add_global_input("a");
        let w0 = d.add_wire("w0");
        let w1 = d.add_wire("w1");
        let w2 = d.add_wire("w2");
        let y = d.add_global_output("y");
        buf(&mut d, src, "s", a, w0);
        buf(&mut d, top, "b", w0, w1);
        dff(&mut d, top, "ff", clk, w1, w2);
        buf(&mut d, dst, "t", w2, y);
        let sg = d.add_pin_group(src, "o", PinDirection::Output, &[w0]);
        d.add_pin_group(dst, "i", PinDirection::Input, &[w2]);
        d.add_pin_group(top, "clk", PinDirection::Input, &[clk]);
        d.add_pin_group(top, "a", PinDirection::Input, &[a]);
        d.add_pin_group(top, "y", PinDirection::Output, &[y]);
        let src_o = Origin::new(src, sg);
        let known = known_of(&d, src_o);
        let ev = gather_evidence(&d, w2, top, &known, false, &mut HashSet::new()).unwrap();
        assert_eq!(ev.len(), 1);
        assert!(ev[&src_o].contains(&0));

        // the clock pin blocks: walking backwards from clk finds nothing
        let ev = gather_evidence(&d, clk, top, &known, false, &mut HashSet::new()).unwrap();
        assert!(ev.is_empty());
    }

    #[test]
    fn test_descend_through_unknown_parent_module() {
        // outer/i is unknown, but outer holds inner whose group is known
        let mut d = Design::new("top");
        let top = d.top();
        let outer = d.add_module("outer", top);
        let inner = d.add_module("inner", outer);
        let a = d.add_global_input("a");
        let b = d.add_wire("b");
        let y = d.add_global_output("y");
        buf(&mut d, outer, "g", a, b);
        buf(&mut d, inner, "h", b, y);
        d.add_pin_group(top, "a", PinDirection::Input, &[a]);
        d.add_pin_group(top, "y", PinDirection::Output, &[y]);
        d.add_pin_group(outer, "i", PinDirection::Input, &[a]);
        let ig = d.add_pin_group(inner, "i", PinDirection::Input, &[b]);
        let inner_i = Origin::new(inner, ig);
        let known = known_of(&d, inner_i);
        let ev = gather_evidence(&d, a, top, &known, true, &mut HashSet::new()).unwrap();
        assert_eq!(ev.len(), 1);
        assert_eq!(ev[&inner_i].iter().copied().collect::<Vec<_>>(), vec![0]);

        // without the inner order the walk runs out at an unknown top port
        let ev = gather_evidence(&d, a, top, &KnownBitorders::new(), true, &mut HashSet::new()).unwrap();
        assert!(ev.is_empty());
    }

    #[test]
    fn test_gather_through_latch_inverted_output() {
        const LATCH_PINS: &[(&str, PinDirection, PinRole)] = &[
            ("CLK", PinDirection::Input, PinRole::Clock),
            ("D", PinDirection::Input, PinRole::Data),
            ("QN", PinDirection::Output, PinRole::NegState),
        ];
        let mut d = Design::new("top");
        let top = d.top();
        let src = d.add_module("src", top);
        let dst = d.add_module("dst", top);
        let clk = d.add_global_input("clk");
        let x = d.add_global_input("x");
        let w0 = d.add_wire("w0");
        let w1 = d.add_wire("w1");
        let y = d.add_global_output("y");
        buf(&mut d, src, "s", x, w0);
        let l = d.add_gate("lat", "LATCH", top, GateKind::Latch, LATCH_PINS);
        d.connect(l, "CLK", clk).unwrap();
        d.connect(l, "D", w0).unwrap();
        d.connect(l, "QN", w1).unwrap();
        buf(&mut d, dst, "t", w1, y);
        d.add_pin_group(top, "clk", PinDirection::Input, &[clk]);
        d.add_pin_group(top, "x", PinDirection::Input, &[x]);
        d.add_pin_group(top, "y", PinDirection::Output, &[y]);
        let sg = d.add_pin_group(src, "o", PinDirection::Output, &[w0]);
        let dg = d.add_pin_group(dst, "i", PinDirection::Input, &[w1]);
        let src_o = Origin::new(src, sg);
        let dst_i = Origin::new(dst, dg);

        let known = known_of(&d, src_o);
        let ev = gather_evidence(&d, w1, top, &known, false, &mut HashSet::new()).unwrap();
        assert_eq!(ev.len(), 1);
        assert!(ev[&src_o].contains(&0));

        let known = known_of(&d, dst_i);
        let ev = gather_evidence(&d, w0, top, &known, true, &mut HashSet::new()).unwrap();
        assert_eq!(ev.len(), 1);
        assert!(ev[&dst_i].contains(&0));
    }

    #[test]
    fn test_unsupported_gate_is_dead_end() {
        let mut d = Design::new("top");
        let top = d.top();
        let src = d.add_module("src", top);
        let a = d.add_global_input("a");
        let w0 = d.add_wire("w0");
        let w1 = d.add_wire("w1");
        buf(&mut d, src, "s", a, w0);
        let g = d.add_gate("x", "MYSTERY", top, GateKind::Unsupported, BUF_PINS);
        d.connect(g, "A", w0).unwrap();
        d.connect(g, "Y", w1).unwrap();
        let sg = d.add_pin_group(src, "o", PinDirection::Output, &[w0]);
        let known = known_of(&d, Origin::new(src, sg));
        let ev = gather_evidence(&d, w1, top, &known, false, &mut HashSet::new()).unwrap();
        assert!(ev.is_empty());
    }

    #[test]
    fn test_missing_border_pin_is_error() {
        let t = two_modules(2, &[0, 1]);
        let mut d = t.design;
        // strip the pins of src so that its output wires have none
        d.modules[t.src.module.0].pins.clear();
        let known = KnownBitorders::new();
        let w = t.bus[0];
        let e = gather_evidence(&d, w, d.top(), &known, false, &mut HashSet::new()).unwrap_err();
        assert!(matches!(e.root_cause(), BitorderError::MissingBorderPin { .. }));
    }

    #[test]
    fn test_global_wire_reads_top_order() {
        let mut d = Design::new("top");
        let top = d.top();
        let ins: Vec<_> = (0..3).map(|i| d.add_global_input(&format!("a{}", i))).collect();
        let g = d.add_pin_group(top, "a", PinDirection::Input, &ins);
        let origin = Origin::new(top, g);
        let known = known_of(&d, origin);
        let ev = gather_evidence(&d, ins[2], top, &known, false, &mut HashSet::new()).unwrap();
        assert_eq!(ev[&origin].iter().copied().collect::<Vec<_>>(), vec![2]);
    }
}
