// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Bit order propagation for hierarchical gate-level netlists.
//!
//! Synthesis and flattening often lose the bit order of module pin
//! groups. Given some pin groups whose order is known (usually the top
//! ports), we walk the netlist from every pin of the unknown groups
//! until we hit a known group, and recover an order that all the
//! observations agree on.
//!
//! # Pipeline
//!
//! ```text
//! Verilog netlist
//!   → NetlistDB        (netlistdb crate, flat gate-level database)
//!   → Design           (netlist_import: module tree and pin groups)
//!   → Evidence         (walker: indices seen from known pin groups)
//!   → Bit orders       (offset + consensus: reconcile and validate)
//!   → Reordered pins   (reorder: canonical pin order and names)
//! ```
//!
//! # Key modules
//!
//! - [`design`]: The design arena and its border semantics
//! - [`aigpdk`]: AIGPDK cell library interface
//! - [`netlist_import`]: Builds a [`design::Design`] from [`netlistdb::NetlistDB`]
//! - [`propagate`]: The fixed-point driver and public entry points
//! - [`config`]: `bitorder.toml` project configuration

pub mod error;

pub mod design;

pub mod aigpdk;

pub mod netlist_import;

pub mod walker;

pub mod offset;

pub mod consensus;

pub mod propagate;

pub mod reorder;

pub mod config;
