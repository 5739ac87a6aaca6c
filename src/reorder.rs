// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Applying recovered bit orders to the pin groups.

use crate::design::{Design, Origin, PinId};
use crate::error::{BitorderError, Result, ResultExt};
use crate::walker::{BitOrder, KnownBitorders};

/// The pins of `origin` sorted by their new index.
fn pins_in_order(design: &Design, origin: Origin, order: &BitOrder) -> Result<Vec<(usize, PinId)>> {
    let group = &design.groups[origin.group.0];
    let mut pins = Vec::with_capacity(order.len());
    for (&wire, &index) in order {
        let pin = design.pin_by_wire(origin.module, wire).ok_or(
            BitorderError::MissingBorderPin { wire: wire.0, module: origin.module.0 }
        )?;
        let actual = design.pins[pin.0].group;
        if actual != origin.group {
            return Err(BitorderError::PinGroupMismatch {
                pin: design.pins[pin.0].name.to_string(),
                expected: group.name.to_string(),
                actual: design.groups[actual.0].name.to_string(),
                module: origin.module.0,
            })
        }
        pins.push((index, pin));
    }
    pins.sort_by_key(|&(index, _)| index);
    Ok(pins)
}

/// Rename `pin` to `name`, first moving any other pin of the same
/// module with that name out of the way.
fn rename_pin(design: &mut Design, pin: PinId, name: &str) {
    if design.pins[pin.0].name == name {
        return
    }
    let m = design.pins[pin.0].module;
    let colliding = design.modules[m.0].pins.iter().copied()
        .find(|&p| p != pin && design.pins[p.0].name == name);
    if let Some(other) = colliding {
        clilog::debug!("renaming colliding pin {} to {}_OLD", name, name);
        design.set_pin_name(other, &format!("{}_OLD", name));
    }
    design.set_pin_name(pin, name);
}

/// Reorder the pins of every group in `orders` to match its bit
/// order, and rename them to `<group>(<index>)`.
pub fn reorder_pin_groups(design: &mut Design, orders: &KnownBitorders) -> Result<()> {
    for (&origin, order) in orders {
        let group_name = design.groups[origin.group.0].name.clone();
        let pins = pins_in_order(design, origin, order).with_context(|| format!(
            "cannot reorder pin group {} of module {}",
            group_name, design.module_path(origin.module)
        ))?;
        for (index, pin) in pins {
            design.move_pin_within_group(origin.group, pin, index)?;
            rename_pin(design, pin, &format!("{}({})", group_name, index));
        }
        clilog::debug!("reordered pin group {} of module {}",
                       group_name, design.module_path(origin.module));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::fixtures::*;
    use crate::design::{Constant, PinDirection};

    fn names(design: &Design, origin: Origin) -> Vec<String> {
        design.groups[origin.group.0].pins.iter()
            .map(|p| design.pins[p.0].name.to_string())
            .collect()
    }

    #[test]
    fn test_reorder_reversed_group() {
        let mut t = two_modules(3, &[2, 1, 0]);
        let order: BitOrder = t.bus.iter().enumerate().map(|(i, &w)| (w, i)).collect();
        let orders = [(t.dst, order)].into_iter().collect();
        reorder_pin_groups(&mut t.design, &orders).unwrap();
        assert_eq!(t.design.group_wires(t.dst.group).collect::<Vec<_>>(), t.bus);
        assert_eq!(names(&t.design, t.dst), vec!["i(0)", "i(1)", "i(2)"]);
    }

    #[test]
    fn test_colliding_name_moved_aside() {
        let mut t = two_modules(2, &[1, 0]);
        let m = t.dst.module;
        let extra = t.design.add_wire("extra");
        // a pin in another group already carries the target name
        let g = t.design.add_pin_group(m, "i", PinDirection::Input, &[extra]);
        let clash = t.design.groups[g.0].pins[0];
        t.design.set_pin_name(clash, "i(0)");
        let first = t.design.groups[t.dst.group.0].pins[0];
        t.design.set_pin_name(first, "x");
        let order: BitOrder = t.bus.iter().enumerate().map(|(i, &w)| (w, i)).collect();
        let orders = [(t.dst, order)].into_iter().collect();
        reorder_pin_groups(&mut t.design, &orders).unwrap();
        assert_eq!(names(&t.design, t.dst), vec!["i(0)", "i(1)"]);
        assert_eq!(t.design.pins[clash.0].name, "i(0)_OLD");
    }

    #[test]
    fn test_constant_pins_stay_behind() {
        let mut t = two_modules(2, &[1, 0]);
        let m = t.dst.module;
        let gnd = t.design.add_constant_wire("gnd", Constant::Gnd);
        let mut wires = vec![gnd];
        wires.extend(t.design.group_wires(t.dst.group));
        let g = t.design.add_pin_group(m, "c", PinDirection::Input, &wires);
        // the pins of group i now shadow the bus wires, drop them
        t.design.modules[m.0].pins.retain(|p| t.design.pins[p.0].group == g);
        let origin = Origin::new(m, g);
        let order: BitOrder = t.bus.iter().enumerate().map(|(i, &w)| (w, i)).collect();
        let orders = [(origin, order)].into_iter().collect();
        reorder_pin_groups(&mut t.design, &orders).unwrap();
        assert_eq!(
            t.design.group_wires(g).collect::<Vec<_>>(),
            vec![t.bus[0], t.bus[1], gnd]
        );
    }

    #[test]
    fn test_foreign_group_is_reported() {
        let mut t = two_modules(2, &[0, 1]);
        let m = t.dst.module;
        let g = t.design.add_pin_group(m, "other", PinDirection::Input, &[]);
        // claim the bus wires for the empty group
        let order: BitOrder = t.bus.iter().enumerate().map(|(i, &w)| (w, i)).collect();
        let orders = [(Origin::new(m, g), order)].into_iter().collect();
        let e = reorder_pin_groups(&mut t.design, &orders).unwrap_err();
        match e.root_cause() {
            BitorderError::PinGroupMismatch { expected, actual, .. } => {
                assert_eq!(expected, "other");
                assert_eq!(actual, "i");
            }
            e => panic!("unexpected error {}", e),
        }
    }
}
