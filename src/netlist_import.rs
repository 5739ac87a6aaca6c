// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Building a hierarchical [`Design`] from a flattened netlistdb.
//!
//! netlistdb flattens the hierarchy but keeps the full instance path
//! of every leaf cell. We rebuild the module tree from those paths,
//! and derive module pins from the wires crossing module borders.
//! Top-level ports keep their declared bus order. Submodule pins are
//! grouped by net name in discovery order, as their bit order is
//! exactly what the propagation recovers.

use std::collections::HashMap;
use compact_str::CompactString;
use indexmap::{IndexMap, IndexSet};
use netlistdb::{Direction, GeneralHierName, GeneralPinName, NetlistDB};
use crate::aigpdk::{cell_kind, pin_role};
use crate::design::{Constant, Design, GateKind, ModuleId, PinDirection, PinRole, WireId};
use crate::error::{Result, ResultExt};

fn direction_of(d: Direction) -> PinDirection {
    match d {
        Direction::I => PinDirection::Input,
        Direction::O => PinDirection::Output,
        _ => PinDirection::Inout,
    }
}

/// Get the module for an instance path (top-down), creating it and
/// all its ancestors on first sight.
fn module_for_path(
    design: &mut Design,
    modules: &mut HashMap<Vec<CompactString>, ModuleId>,
    path: &[CompactString],
) -> ModuleId {
    if path.is_empty() {
        return design.top()
    }
    if let Some(&m) = modules.get(path) {
        return m
    }
    let parent = module_for_path(design, modules, &path[..path.len() - 1]);
    let m = design.add_module(&path[path.len() - 1], parent);
    modules.insert(path.to_vec(), m);
    m
}

fn import_top_ports(design: &mut Design, netlistdb: &NetlistDB) {
    let mut ports = IndexMap::<CompactString, Vec<(Option<isize>, WireId, PinDirection)>>::new();
    for pinid in netlistdb.cell2pin.iter_set(0) {
        let wire = WireId(netlistdb.pin2net[pinid]);
        // directions of top ports are seen from inside the design
        let direction = match netlistdb.pindirect[pinid] {
            Direction::O => {
                design.wires[wire.0].global_input = true;
                PinDirection::Input
            }
            Direction::I => {
                design.wires[wire.0].global_output = true;
                PinDirection::Output
            }
            _ => PinDirection::Inout,
        };
        let (_, port, bit) = &netlistdb.pinnames[pinid];
        ports.entry(port.clone()).or_default().push((*bit, wire, direction));
    }
    let top = design.top();
    for (port, mut bits) in ports {
        bits.sort_by_key(|&(bit, _, _)| bit.unwrap_or(0));
        let direction = bits[0].2;
        let wires: Vec<_> = bits.iter().map(|&(_, w, _)| w).collect();
        design.add_pin_group(top, &port, direction, &wires);
    }
}

fn import_border_pins(design: &mut Design, netlistdb: &NetlistDB) {
    // wires touching each module, recursively, in discovery order
    let mut touched = vec![IndexSet::<WireId>::new(); design.modules.len()];
    for gate in &design.gates {
        let wires: Vec<_> = gate.pins.iter().filter_map(|p| p.wire).collect();
        let mut m = Some(gate.module);
        while let Some(cur) = m {
            if design.is_top(cur) {
                break
            }
            touched[cur.0].extend(wires.iter().copied());
            m = design.modules[cur.0].parent;
        }
    }

    for (m, wires) in touched.into_iter().enumerate() {
        let m = ModuleId(m);
        let mut groups = IndexMap::<(CompactString, PinDirection), Vec<WireId>>::new();
        for w in wires {
            let direction = if design.is_input_wire(m, w) {
                PinDirection::Input
            }
            else if design.is_output_wire(m, w) {
                PinDirection::Output
            }
            else {
                continue
            };
            let base = netlistdb.netnames[w.0].1.clone();
            groups.entry((base, direction)).or_default().push(w);
        }
        for ((name, direction), wires) in groups {
            design.add_pin_group(m, &name, direction, &wires);
        }
        clilog::trace!("module {} has {} pin groups",
                       design.module_path(m), design.modules[m.0].groups.len());
    }
}

/// Convert a netlistdb into a [`Design`].
pub fn design_from_netlistdb(netlistdb: &NetlistDB) -> Result<Design> {
    let timer_import = clilog::stimer!("import design");
    let mut design = Design::new(netlistdb.name.as_str());

    for netid in 0..netlistdb.num_nets {
        let name = netlistdb.netnames[netid].dbg_fmt_pin();
        let w = if Some(netid) == netlistdb.net_zero {
            design.add_constant_wire(&name, Constant::Gnd)
        }
        else if Some(netid) == netlistdb.net_one {
            design.add_constant_wire(&name, Constant::Vcc)
        }
        else {
            design.add_wire(&name)
        };
        debug_assert_eq!(w.0, netid);
    }
    import_top_ports(&mut design, netlistdb);

    let mut modules = HashMap::new();
    let mut num_unsupported = 0;
    for cellid in 1..netlistdb.num_cells {
        let mut path: Vec<CompactString> = netlistdb.cellnames[cellid].iter()
            .cloned().collect();
        path.reverse();
        let module = module_for_path(
            &mut design, &mut modules,
            &path[..path.len().saturating_sub(1)]
        );
        let celltype = netlistdb.celltypes[cellid].as_str();
        let kind = cell_kind(celltype);
        if kind == GateKind::Unsupported {
            num_unsupported += 1;
        }
        let pins: Vec<(String, PinDirection, PinRole, WireId)> = netlistdb.cell2pin
            .iter_set(cellid)
            .map(|pinid| {
                let (_, name, bit) = &netlistdb.pinnames[pinid];
                let full = match bit {
                    Some(bit) => format!("{}[{}]", name, bit),
                    None => name.to_string(),
                };
                (full,
                 direction_of(netlistdb.pindirect[pinid]),
                 pin_role(celltype, name),
                 WireId(netlistdb.pin2net[pinid]))
            })
            .collect();
        let specs: Vec<_> = pins.iter()
            .map(|(name, direction, role, _)| (name.as_str(), *direction, *role))
            .collect();
        let cellname = netlistdb.cellnames[cellid].dbg_fmt_hier();
        let gate = design.add_gate(&cellname, celltype, module, kind, &specs);
        for (name, _, _, wire) in &pins {
            design.connect(gate, name, *wire).with_context(|| format!(
                "cannot import cell {}", cellname
            ))?;
        }
    }
    if num_unsupported > 0 {
        clilog::warn!("{} cells are not in the AIGPDK library and will block propagation",
                      num_unsupported);
    }

    import_border_pins(&mut design, netlistdb);
    clilog::finish!(timer_import);
    clilog::info!("imported design with {} modules, {} gates, {} wires and {} pin groups",
                  design.modules.len(), design.gates.len(),
                  design.wires.len(), design.groups.len());
    Ok(design)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use crate::aigpdk::AIGPDKLeafPins;
    use crate::design::Origin;
    use crate::propagate::{propagate_bitorders, PropagationOptions};
    use crate::walker::KnownBitorders;

    const NETLIST: &str = r#"
module src(a, o);
  input [1:0] a;
  output [1:0] o;
  BUF b0 (.A(a[0]), .Y(o[0]));
  BUF b1 (.A(a[1]), .Y(o[1]));
endmodule

module dst(i, y);
  input [1:0] i;
  output [1:0] y;
  BUF c0 (.A(i[0]), .Y(y[0]));
  BUF c1 (.A(i[1]), .Y(y[1]));
endmodule

module top(a, y);
  input [1:0] a;
  output [1:0] y;
  wire [1:0] bus;
  src u_src (.a(a), .o(bus));
  dst u_dst (.i(bus), .y(y));
endmodule
"#;

    fn load() -> Design {
        let dir = tempdir::TempDir::new("bitorder").unwrap();
        let path = dir.path().join("top.gv");
        std::fs::write(&path, NETLIST).unwrap();
        let netlistdb = NetlistDB::from_sverilog_file(
            &path, Some("top"), &AIGPDKLeafPins()
        ).unwrap();
        design_from_netlistdb(&netlistdb).unwrap()
    }

    #[test]
    fn test_import_hierarchy_and_ports() {
        let d = load();
        assert_eq!(d.gates.len(), 4);
        let u_src = d.module_by_path("u_src").unwrap();
        let u_dst = d.module_by_path("u_dst").unwrap();
        assert_eq!(d.modules[u_src.0].gates.len(), 2);
        assert_eq!(d.modules[u_dst.0].gates.len(), 2);

        let top = d.top();
        let a = d.pin_group_by_name(top, "a").unwrap();
        let y = d.pin_group_by_name(top, "y").unwrap();
        assert!(d.group_wires(a).all(|w| d.wires[w.0].global_input));
        assert!(d.group_wires(y).all(|w| d.wires[w.0].global_output));
        assert_eq!(d.groups[a.0].pins.len(), 2);

        for m in [u_src, u_dst] {
            let dirs: BTreeSet<_> = d.modules[m.0].groups.iter()
                .map(|g| format!("{:?}", d.groups[g.0].direction))
                .collect();
            assert_eq!(dirs, ["Input", "Output"].into_iter().map(String::from).collect());
            for g in &d.modules[m.0].groups {
                assert_eq!(d.groups[g.0].pins.len(), 2);
            }
        }
    }

    #[test]
    fn test_imported_design_propagates() {
        let d = load();
        let top = d.top();
        let mut known = KnownBitorders::new();
        for name in ["a", "y"] {
            let g = d.pin_group_by_name(top, name).unwrap();
            known.insert(Origin::new(top, g),
                         d.group_wires(g).enumerate().map(|(i, w)| (w, i)).collect());
        }
        let unknown: BTreeSet<_> = d.modules.iter().enumerate()
            .filter(|(m, _)| *m != 0)
            .flat_map(|(m, module)| module.groups.iter().map(move |&g| Origin::new(ModuleId(m), g)))
            .collect();
        assert_eq!(unknown.len(), 4);
        let report = propagate_bitorders(&d, known, &unknown, PropagationOptions::default()).unwrap();
        assert_eq!(report.resolved, unknown);
    }
}
