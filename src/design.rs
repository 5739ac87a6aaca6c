// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Hierarchical design graph.
//!
//! A design is a set of arenas (modules, pin groups, pins, gates and
//! wires) addressed by integer ids. The propagation core only reads
//! it while gathering evidence, and mutates pin order and pin names
//! afterwards.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use compact_str::CompactString;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use crate::error::{BitorderError, Result};

macro_rules! arena_id {
    ($(#[$m:meta])* $name:ident) => {
        $(#[$m])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub usize);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

arena_id!(
    /// Index into [`Design::modules`].
    ModuleId
);
arena_id!(
    /// Index into [`Design::groups`].
    GroupId
);
arena_id!(
    /// Index into [`Design::pins`].
    PinId
);
arena_id!(
    /// Index into [`Design::gates`].
    GateId
);
arena_id!(
    /// Index into [`Design::wires`].
    WireId
);

/// A (module, pin group) pair: the unit that has a known or unknown
/// bit order.
///
/// Ordering is by module id first, then pin group id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Origin {
    pub module: ModuleId,
    pub group: GroupId,
}

impl Origin {
    /// Smallest and largest possible origins, for range queries.
    pub const MIN: Origin = Origin { module: ModuleId(0), group: GroupId(0) };
    pub const MAX: Origin = Origin { module: ModuleId(usize::MAX), group: GroupId(usize::MAX) };

    pub fn new(module: ModuleId, group: GroupId) -> Origin {
        Origin { module, group }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.module, self.group)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinDirection {
    Input,
    Output,
    Inout,
}

/// What kind of logic a gate implements, as far as traversal is
/// concerned.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateKind {
    Combinational,
    FlipFlop,
    Latch,
    /// Sequential, but neither a flip-flop nor a latch (RAM, clock gate).
    Sequential,
    /// Not recognized. Traversal stops here.
    Unsupported,
}

/// The function of a gate pin.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinRole {
    Data,
    State,
    NegState,
    Clock,
    Enable,
    Set,
    Reset,
    Other,
}

/// Constant-valued wires are exempt from bit orders.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constant {
    Gnd,
    Vcc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatePin {
    pub name: CompactString,
    pub direction: PinDirection,
    pub role: PinRole,
    pub wire: Option<WireId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
    pub name: CompactString,
    pub celltype: CompactString,
    /// The innermost module containing this gate.
    pub module: ModuleId,
    pub kind: GateKind,
    pub pins: Vec<GatePin>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Wire {
    pub name: CompactString,
    /// Driving gates. At most one.
    pub sources: Vec<GateId>,
    /// Driven gates, once per connected pin.
    pub destinations: Vec<GateId>,
    pub global_input: bool,
    pub global_output: bool,
    pub constant: Option<Constant>,
}

impl Wire {
    pub fn is_constant(&self) -> bool {
        self.constant.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: CompactString,
    pub parent: Option<ModuleId>,
    pub submodules: Vec<ModuleId>,
    /// Gates directly inside this module, excluding submodules.
    pub gates: Vec<GateId>,
    pub groups: Vec<GroupId>,
    pub pins: Vec<PinId>,
}

/// A named, ordered collection of module pins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinGroup {
    pub name: CompactString,
    pub module: ModuleId,
    pub direction: PinDirection,
    /// Pins in bit order.
    pub pins: Vec<PinId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pin {
    pub name: CompactString,
    pub module: ModuleId,
    pub wire: WireId,
    pub group: GroupId,
    pub direction: PinDirection,
}

/// A hierarchical gate-level design.
///
/// Module 0 is always the top module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Design {
    pub modules: Vec<Module>,
    pub groups: Vec<PinGroup>,
    pub pins: Vec<Pin>,
    pub gates: Vec<Gate>,
    pub wires: Vec<Wire>,
}

impl Design {
    /// Create an empty design with only a top module.
    pub fn new(top_name: &str) -> Design {
        Design {
            modules: vec![Module {
                name: top_name.into(),
                parent: None,
                submodules: vec![],
                gates: vec![],
                groups: vec![],
                pins: vec![],
            }],
            groups: vec![],
            pins: vec![],
            gates: vec![],
            wires: vec![],
        }
    }

    #[inline]
    pub fn top(&self) -> ModuleId {
        ModuleId(0)
    }

    #[inline]
    pub fn is_top(&self, m: ModuleId) -> bool {
        self.modules[m.0].parent.is_none()
    }

    pub fn add_module(&mut self, name: &str, parent: ModuleId) -> ModuleId {
        let id = ModuleId(self.modules.len());
        self.modules.push(Module {
            name: name.into(),
            parent: Some(parent),
            submodules: vec![],
            gates: vec![],
            groups: vec![],
            pins: vec![],
        });
        self.modules[parent.0].submodules.push(id);
        id
    }

    pub fn add_wire(&mut self, name: &str) -> WireId {
        self.wires.push(Wire {
            name: name.into(),
            ..Default::default()
        });
        WireId(self.wires.len() - 1)
    }

    pub fn add_global_input(&mut self, name: &str) -> WireId {
        let w = self.add_wire(name);
        self.wires[w.0].global_input = true;
        w
    }

    pub fn add_global_output(&mut self, name: &str) -> WireId {
        let w = self.add_wire(name);
        self.wires[w.0].global_output = true;
        w
    }

    pub fn add_constant_wire(&mut self, name: &str, constant: Constant) -> WireId {
        let w = self.add_wire(name);
        self.wires[w.0].constant = Some(constant);
        w
    }

    /// Add a gate with unconnected pins, given as
    /// `(name, direction, role)` triples.
    pub fn add_gate(
        &mut self,
        name: &str, celltype: &str,
        module: ModuleId, kind: GateKind,
        pins: &[(&str, PinDirection, PinRole)],
    ) -> GateId {
        let id = GateId(self.gates.len());
        self.gates.push(Gate {
            name: name.into(),
            celltype: celltype.into(),
            module,
            kind,
            pins: pins.iter().map(|&(name, direction, role)| GatePin {
                name: name.into(), direction, role, wire: None
            }).collect(),
        });
        self.modules[module.0].gates.push(id);
        id
    }

    /// Connect pin `pin_name` of a gate to a wire.
    ///
    /// Output pins become sources of the wire, everything else a
    /// destination. A wire accepts only one driver.
    pub fn connect(&mut self, gate: GateId, pin_name: &str, wire: WireId) -> Result<()> {
        let pin = self.gates[gate.0].pins.iter()
            .position(|p| p.name == pin_name)
            .ok_or_else(|| BitorderError::GatePinNotFound {
                gate: self.gates[gate.0].name.to_string(),
                pin: pin_name.to_string(),
            })?;
        if self.gates[gate.0].pins[pin].direction == PinDirection::Output {
            if let Some(driver) = self.wires[wire.0].sources.first() {
                return Err(BitorderError::MultipleDrivers {
                    wire: self.wires[wire.0].name.to_string(),
                    driver: self.gates[driver.0].name.to_string(),
                    gate: self.gates[gate.0].name.to_string(),
                })
            }
            self.wires[wire.0].sources.push(gate);
        }
        else {
            self.wires[wire.0].destinations.push(gate);
        }
        self.gates[gate.0].pins[pin].wire = Some(wire);
        Ok(())
    }

    /// Add a pin group with one pin per wire, in the given order.
    ///
    /// Pins are named `<group>(<index>)`.
    pub fn add_pin_group(
        &mut self, module: ModuleId, name: &str,
        direction: PinDirection, wires: &[WireId]
    ) -> GroupId {
        let group = GroupId(self.groups.len());
        let mut pins = Vec::with_capacity(wires.len());
        for (i, &wire) in wires.iter().enumerate() {
            let pin = PinId(self.pins.len());
            self.pins.push(Pin {
                name: format!("{}({})", name, i).into(),
                module, wire, group, direction,
            });
            self.modules[module.0].pins.push(pin);
            pins.push(pin);
        }
        self.groups.push(PinGroup {
            name: name.into(), module, direction, pins
        });
        self.modules[module.0].groups.push(group);
        group
    }

    pub fn module_by_id(&self, id: usize) -> Result<ModuleId> {
        match id < self.modules.len() {
            true => Ok(ModuleId(id)),
            false => Err(BitorderError::ModuleNotFound(id)),
        }
    }

    /// Find a module by its dotted instance path from the top.
    ///
    /// The empty path (or the top module name) is the top module.
    pub fn module_by_path(&self, path: &str) -> Result<ModuleId> {
        let mut cur = self.top();
        if path.is_empty() || path == self.modules[cur.0].name {
            return Ok(cur)
        }
        for seg in path.split('.') {
            cur = *self.modules[cur.0].submodules.iter()
                .find(|&&s| self.modules[s.0].name == seg)
                .ok_or_else(|| BitorderError::ModulePathNotFound(path.to_string()))?;
        }
        Ok(cur)
    }

    /// The dotted instance path of a module, empty for the top.
    pub fn module_path(&self, m: ModuleId) -> String {
        let mut segs = Vec::new();
        let mut cur = m;
        while let Some(parent) = self.modules[cur.0].parent {
            segs.push(self.modules[cur.0].name.as_str());
            cur = parent;
        }
        segs.reverse();
        segs.join(".")
    }

    /// Submodules of `m`, optionally including all descendants.
    pub fn submodules(&self, m: ModuleId, recursive: bool) -> Vec<ModuleId> {
        let mut ret = self.modules[m.0].submodules.clone();
        if recursive {
            let mut i = 0;
            while i < ret.len() {
                ret.extend_from_slice(&self.modules[ret[i].0].submodules);
                i += 1;
            }
        }
        ret
    }

    /// Whether module `m` is `inner` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, m: ModuleId, inner: ModuleId) -> bool {
        let mut cur = Some(inner);
        while let Some(c) = cur {
            if c == m {
                return true
            }
            cur = self.modules[c.0].parent;
        }
        false
    }

    pub fn contains_gate(&self, m: ModuleId, gate: GateId, recursive: bool) -> bool {
        let gm = self.gates[gate.0].module;
        match recursive {
            true => self.is_ancestor_or_self(m, gm),
            false => gm == m,
        }
    }

    /// Whether the wire enters module `m` from outside.
    pub fn is_input_wire(&self, m: ModuleId, wire: WireId) -> bool {
        let w = &self.wires[wire.0];
        if self.is_top(m) {
            return w.global_input
        }
        if !w.destinations.iter().any(|&g| self.contains_gate(m, g, true)) {
            return false
        }
        w.global_input || w.sources.is_empty() ||
            w.sources.iter().any(|&g| !self.contains_gate(m, g, true))
    }

    /// Whether the wire leaves module `m` towards outside.
    pub fn is_output_wire(&self, m: ModuleId, wire: WireId) -> bool {
        let w = &self.wires[wire.0];
        if self.is_top(m) {
            return w.global_output
        }
        if !w.sources.iter().any(|&g| self.contains_gate(m, g, true)) {
            return false
        }
        w.global_output ||
            w.destinations.iter().any(|&g| !self.contains_gate(m, g, true))
    }

    /// The module pin attached to a wire, if any.
    pub fn pin_by_wire(&self, m: ModuleId, wire: WireId) -> Option<PinId> {
        self.modules[m.0].pins.iter().copied()
            .find(|p| self.pins[p.0].wire == wire)
    }

    /// Look up a pin group by exact name.
    ///
    /// Fails if the name is absent or used by more than one group.
    pub fn pin_group_by_name(&self, m: ModuleId, name: &str) -> Result<GroupId> {
        let mut found = None;
        for &g in &self.modules[m.0].groups {
            if self.groups[g.0].name != name {
                continue
            }
            if found.is_some() {
                return Err(BitorderError::AmbiguousPinGroup {
                    module: m.0, name: name.to_string()
                })
            }
            found = Some(g);
        }
        found.ok_or_else(|| BitorderError::PinGroupNotFound {
            module: m.0, name: name.to_string()
        })
    }

    /// Check that `origin.group` belongs to `origin.module`.
    pub fn check_origin(&self, origin: Origin) -> Result<()> {
        if origin.module.0 >= self.modules.len() {
            return Err(BitorderError::ModuleNotFound(origin.module.0))
        }
        match self.groups.get(origin.group.0) {
            Some(g) if g.module == origin.module => Ok(()),
            _ => Err(BitorderError::ModuleOriginNotFound {
                module: origin.module.0, group: origin.group.0
            })
        }
    }

    pub fn pin_at_index(&self, group: GroupId, index: usize) -> Result<PinId> {
        let g = &self.groups[group.0];
        g.pins.get(index).copied().ok_or_else(|| BitorderError::PinIndexOutOfRange {
            group: g.name.to_string(), index, len: g.pins.len()
        })
    }

    /// The wires of a pin group in its current pin order.
    pub fn group_wires(&self, group: GroupId) -> impl Iterator<Item = WireId> + '_ {
        self.groups[group.0].pins.iter().map(|p| self.pins[p.0].wire)
    }

    /// Endpoints on the output side of a gate.
    pub fn fan_out(&self, gate: GateId) -> impl Iterator<Item = (&GatePin, WireId)> + '_ {
        self.gates[gate.0].pins.iter()
            .filter(|p| p.direction != PinDirection::Input)
            .filter_map(|p| p.wire.map(|w| (p, w)))
    }

    /// Endpoints on the input side of a gate.
    pub fn fan_in(&self, gate: GateId) -> impl Iterator<Item = (&GatePin, WireId)> + '_ {
        self.gates[gate.0].pins.iter()
            .filter(|p| p.direction != PinDirection::Output)
            .filter_map(|p| p.wire.map(|w| (p, w)))
    }

    /// Move a pin to a new position inside its group, shifting the
    /// pins in between.
    pub fn move_pin_within_group(
        &mut self, group: GroupId, pin: PinId, new_index: usize
    ) -> Result<()> {
        let g = &self.groups[group.0];
        let len = g.pins.len();
        if new_index >= len {
            return Err(BitorderError::PinIndexOutOfRange {
                group: g.name.to_string(), index: new_index, len
            })
        }
        let Some(old_index) = g.pins.iter().position(|&p| p == pin) else {
            return Err(BitorderError::PinGroupMismatch {
                pin: self.pins[pin.0].name.to_string(),
                expected: g.name.to_string(),
                actual: self.groups[self.pins[pin.0].group.0].name.to_string(),
                module: g.module.0,
            })
        };
        let pins = &mut self.groups[group.0].pins;
        let p = pins.remove(old_index);
        pins.insert(new_index, p);
        Ok(())
    }

    pub fn set_pin_name(&mut self, pin: PinId, name: &str) {
        self.pins[pin.0].name = name.into();
    }

    /// All distinct gates driving or driven by this wire, in the
    /// requested direction.
    pub fn neighbor_gates(&self, wire: WireId, forward: bool) -> IndexSet<GateId> {
        let w = &self.wires[wire.0];
        let gates = match forward {
            true => &w.destinations,
            false => &w.sources,
        };
        gates.iter().copied().collect()
    }

    /// Save in the BARE binary format.
    pub fn save(&self, path: &Path) -> Result<()> {
        let f = File::create(path)?;
        let mut buf = BufWriter::new(f);
        serde_bare::to_writer(&mut buf, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Design> {
        let f = File::open(path)?;
        Ok(serde_bare::from_reader(BufReader::new(f))?)
    }
}

/// Small designs shared by the tests of several modules.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const BUF_PINS: &[(&str, PinDirection, PinRole)] = &[
        ("A", PinDirection::Input, PinRole::Data),
        ("Y", PinDirection::Output, PinRole::Data),
    ];

    pub const DFF_PINS: &[(&str, PinDirection, PinRole)] = &[
        ("CLK", PinDirection::Input, PinRole::Clock),
        ("D", PinDirection::Input, PinRole::Data),
        ("Q", PinDirection::Output, PinRole::State),
    ];

    /// Insert a buffer in `module` from `a` to `y`.
    pub fn buf(d: &mut Design, module: ModuleId, name: &str, a: WireId, y: WireId) -> GateId {
        let g = d.add_gate(name, "BUF", module, GateKind::Combinational, BUF_PINS);
        d.connect(g, "A", a).unwrap();
        d.connect(g, "Y", y).unwrap();
        g
    }

    pub fn dff(d: &mut Design, module: ModuleId, name: &str, clk: WireId, dw: WireId, q: WireId) -> GateId {
        let g = d.add_gate(name, "DFF", module, GateKind::FlipFlop, DFF_PINS);
        d.connect(g, "CLK", clk).unwrap();
        d.connect(g, "D", dw).unwrap();
        d.connect(g, "Q", q).unwrap();
        g
    }

    /// Two sibling modules under the top: `src` drives an output bus
    /// through buffers, `dst` receives it on an input bus and buffers
    /// it into a sink. `perm[i]` is the source bit connected to bit
    /// `i` of `dst`'s input group (in creation order).
    pub struct TwoModules {
        pub design: Design,
        pub src: Origin,
        pub dst: Origin,
        pub bus: Vec<WireId>,
    }

    pub fn two_modules(width: usize, perm: &[usize]) -> TwoModules {
        let mut d = Design::new("top");
        let top = d.top();
        let src_m = d.add_module("src", top);
        let dst_m = d.add_module("dst", top);
        let mut bus = Vec::new();
        let mut ins = Vec::new();
        let mut outs = Vec::new();
        for i in 0..width {
            let a = d.add_global_input(&format!("in{}", i));
            let w = d.add_wire(&format!("bus{}", i));
            buf(&mut d, src_m, &format!("src_buf{}", i), a, w);
            ins.push(a);
            bus.push(w);
        }
        let dst_wires: Vec<WireId> = perm.iter().map(|&i| bus[i]).collect();
        for (i, &w) in dst_wires.iter().enumerate() {
            let o = d.add_global_output(&format!("out{}", i));
            buf(&mut d, dst_m, &format!("dst_buf{}", i), w, o);
            outs.push(o);
        }
        let src_g = d.add_pin_group(src_m, "o", PinDirection::Output, &bus);
        let dst_g = d.add_pin_group(dst_m, "i", PinDirection::Input, &dst_wires);
        d.add_pin_group(top, "in", PinDirection::Input, &ins);
        d.add_pin_group(top, "out", PinDirection::Output, &outs);
        TwoModules {
            design: d,
            src: Origin::new(src_m, src_g),
            dst: Origin::new(dst_m, dst_g),
            bus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::fixtures::*;

    #[test]
    fn test_border_wires() {
        let t = two_modules(2, &[0, 1]);
        let d = &t.design;
        let bus0 = t.bus[0];
        assert!(d.is_output_wire(t.src.module, bus0));
        assert!(!d.is_input_wire(t.src.module, bus0));
        assert!(d.is_input_wire(t.dst.module, bus0));
        assert!(!d.is_output_wire(t.dst.module, bus0));
        assert!(!d.is_input_wire(d.top(), bus0));
        let in0 = d.wires.iter().position(|w| w.name == "in0").unwrap();
        assert!(d.is_input_wire(d.top(), WireId(in0)));
        assert!(d.is_input_wire(t.src.module, WireId(in0)));
    }

    #[test]
    fn test_second_driver_rejected() {
        let mut d = Design::new("top");
        let top = d.top();
        let a = d.add_wire("a");
        let y = d.add_wire("y");
        buf(&mut d, top, "b0", a, y);
        let g = d.add_gate("b1", "BUF", top, GateKind::Combinational, BUF_PINS);
        let e = d.connect(g, "Y", y).unwrap_err();
        assert!(matches!(e, BitorderError::MultipleDrivers { .. }));
    }

    #[test]
    fn test_pin_group_lookup() {
        let mut t = two_modules(2, &[0, 1]);
        let d = &mut t.design;
        assert_eq!(d.pin_group_by_name(t.dst.module, "i").unwrap(), t.dst.group);
        assert!(matches!(
            d.pin_group_by_name(t.dst.module, "x"),
            Err(BitorderError::PinGroupNotFound { .. })
        ));
        let bus = t.bus.clone();
        d.add_pin_group(t.dst.module, "i", PinDirection::Input, &bus);
        assert!(matches!(
            d.pin_group_by_name(t.dst.module, "i"),
            Err(BitorderError::AmbiguousPinGroup { .. })
        ));
    }

    #[test]
    fn test_module_paths() {
        let mut d = Design::new("top");
        let a = d.add_module("a", d.top());
        let b = d.add_module("b", a);
        assert_eq!(d.module_by_path("a.b").unwrap(), b);
        assert_eq!(d.module_by_path("").unwrap(), d.top());
        assert_eq!(d.module_path(b), "a.b");
        assert!(d.module_by_path("a.c").is_err());
        assert_eq!(d.submodules(d.top(), true), vec![a, b]);
        assert!(d.is_ancestor_or_self(d.top(), b));
        assert!(!d.is_ancestor_or_self(b, a));
    }

    #[test]
    fn test_move_pin_within_group() {
        let mut t = two_modules(4, &[0, 1, 2, 3]);
        let g = t.dst.group;
        let d = &mut t.design;
        let p3 = d.pin_at_index(g, 3).unwrap();
        d.move_pin_within_group(g, p3, 0).unwrap();
        let wires: Vec<_> = d.group_wires(g).collect();
        assert_eq!(wires, vec![t.bus[3], t.bus[0], t.bus[1], t.bus[2]]);
        assert!(d.move_pin_within_group(g, p3, 4).is_err());
    }

    #[test]
    fn test_save_load() {
        let t = two_modules(3, &[2, 1, 0]);
        let dir = tempdir::TempDir::new("bitorder").unwrap();
        let path = dir.path().join("design.bare");
        t.design.save(&path).unwrap();
        let d = Design::load(&path).unwrap();
        assert_eq!(d.wires.len(), t.design.wires.len());
        let wires: Vec<_> = d.group_wires(t.dst.group).collect();
        assert_eq!(wires, vec![t.bus[2], t.bus[1], t.bus[0]]);
    }
}
