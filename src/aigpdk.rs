// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! AIGPDK cell library knowledge.
//!
//! Gives pin directions and bus widths to netlistdb while parsing, and
//! tells the walker which cells it may propagate through and along
//! which pins.

use netlistdb::{Direction, LeafPinProvider};
use compact_str::CompactString;
use sverilogparse::SVerilogRange;
use crate::design::{GateKind, PinDirection, PinRole};

const SRAM: &str = "$__RAMGEM_SYNC_";

/// Direction and width provider for AIGPDK cells, to be used in
/// netlistdb construction.
///
/// Unlike a simulator, we do not need to understand every cell. Pins
/// of unknown cells are reported as inputs except for the
/// conventional output names, so that unknown cells end up as dead
/// ends in the design instead of aborting the import.
pub struct AIGPDKLeafPins();

/// The traversal class of an AIGPDK cell type.
pub fn cell_kind(celltype: &str) -> GateKind {
    match celltype {
        "INV" | "BUF" => GateKind::Combinational,
        t if t.starts_with("AND2_") => GateKind::Combinational,
        "DFF" | "DFFSR" => GateKind::FlipFlop,
        "LATCH" => GateKind::Latch,
        "CKLNQD" | SRAM => GateKind::Sequential,
        _ => GateKind::Unsupported,
    }
}

/// The role of a cell pin. Only data/state pins of sequential cells
/// carry bit order information.
pub fn pin_role(celltype: &str, pin_name: &str) -> PinRole {
    match (cell_kind(celltype), pin_name) {
        (GateKind::FlipFlop | GateKind::Latch, "D") => PinRole::Data,
        (GateKind::FlipFlop | GateKind::Latch, "Q") => PinRole::State,
        (GateKind::FlipFlop | GateKind::Latch, "QN") => PinRole::NegState,
        (GateKind::FlipFlop | GateKind::Latch, "CLK") => PinRole::Clock,
        (GateKind::FlipFlop, "S") => PinRole::Set,
        (GateKind::FlipFlop, "R") => PinRole::Reset,
        (GateKind::Sequential, "CP" | "PORT_R_CLK" | "PORT_W_CLK") => PinRole::Clock,
        (GateKind::Sequential, "E" | "PORT_W_WR_EN") => PinRole::Enable,
        (GateKind::Combinational, _) => PinRole::Data,
        _ => PinRole::Other,
    }
}

/// Cell pin direction, as seen from the cell.
pub fn pin_direction(celltype: &str, pin_name: &str) -> PinDirection {
    match (celltype, pin_name) {
        (_, "Y" | "Q" | "QN") => PinDirection::Output,
        (SRAM, "PORT_R_RD_DATA") => PinDirection::Output,
        _ => PinDirection::Input,
    }
}

impl LeafPinProvider for AIGPDKLeafPins {
    fn direction_of(
        &self,
        macro_name: &CompactString,
        pin_name: &CompactString, _pin_idx: Option<isize>
    ) -> Direction {
        match pin_direction(macro_name, pin_name) {
            PinDirection::Output => Direction::O,
            _ => Direction::I,
        }
    }

    fn width_of(
        &self,
        macro_name: &CompactString,
        pin_name: &CompactString
    ) -> Option<SVerilogRange> {
        match (macro_name.as_str(), pin_name.as_str()) {
            // 13-bit address, 32-bit words
            (SRAM, "PORT_R_ADDR" | "PORT_W_ADDR") =>
                Some(SVerilogRange(12, 0)),
            (SRAM, "PORT_W_WR_EN" | "PORT_W_WR_DATA" | "PORT_R_RD_DATA") =>
                Some(SVerilogRange(31, 0)),
            _ => None
        }
    }
}
