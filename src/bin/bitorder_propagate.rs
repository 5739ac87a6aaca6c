// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Recover lost bit orders of module pin groups in a hierarchical
//! netlist, and write the reordered design.

use std::path::PathBuf;
use bitorder::aigpdk::AIGPDKLeafPins;
use bitorder::config::{resolve_group_ref, BitorderConfig};
use bitorder::design::{Design, GroupId, Origin};
use bitorder::error::{BitorderError, Result};
use bitorder::netlist_import::design_from_netlistdb;
use bitorder::propagate::propagate_groups;
use netlistdb::NetlistDB;

#[derive(clap::Parser, Debug)]
struct PropagateArgs {
    /// Gate-level verilog path synthesized in our provided library.
    #[clap(long)]
    netlist: Option<PathBuf>,
    /// Top module type in netlist to analyze.
    ///
    /// If not specified, we will guess it from the hierarchy.
    #[clap(long)]
    top_module: Option<String>,
    /// A design dump saved by an earlier run, instead of a netlist.
    #[clap(long)]
    design: Option<PathBuf>,
    /// Path to project configuration file.
    ///
    /// If not specified, we search for `bitorder.toml` in the current
    /// directory and parent directories. CLI arguments override config file values.
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Pin group with a known bit order, as `module_path:group`.
    ///
    /// The module path is dotted from the top, empty for the top module.
    /// Defaults to all top-level ports.
    #[clap(long)]
    known: Vec<String>,
    /// Pin group to recover the bit order of, as `module_path:group`.
    ///
    /// Defaults to all pin groups of all submodules.
    #[clap(long)]
    unknown: Vec<String>,
    /// Accept bit orders with gaps between indices.
    #[clap(long)]
    lenient: bool,
    /// Give up after this many propagation rounds.
    #[clap(long)]
    max_rounds: Option<usize>,
    /// Write the reordered design dump here.
    #[clap(long)]
    output: Option<PathBuf>,
}

fn load_config(config_path: Option<&PathBuf>) -> Result<Option<BitorderConfig>> {
    let Some(path) = config_path else {
        return Ok(BitorderConfig::discover().map(|(config, path)| {
            clilog::info!("using config {}", path.display());
            config
        }))
    };
    let config = BitorderConfig::load_resolved(path)?;
    clilog::info!("using config {}", path.display());
    Ok(Some(config))
}

fn load_design(args: &PropagateArgs, config: &Option<BitorderConfig>) -> Result<Design> {
    let dump = args.design.clone()
        .or_else(|| config.as_ref().and_then(|c| c.design.design.clone()));
    if let Some(path) = dump {
        clilog::info!("loading design dump {}", path.display());
        return Design::load(&path)
    }
    let netlist = args.netlist.clone()
        .or_else(|| config.as_ref().and_then(|c| c.design.netlist.clone()))
        .ok_or_else(|| BitorderError::Config(
            "either --netlist or --design is required (or design.netlist in bitorder.toml)".into()
        ))?;
    let top_module = args.top_module.clone()
        .or_else(|| config.as_ref().and_then(|c| c.design.top_module.clone()));
    let netlistdb = NetlistDB::from_sverilog_file(
        &netlist,
        top_module.as_deref(),
        &AIGPDKLeafPins()
    ).expect("cannot build netlist");
    design_from_netlistdb(&netlistdb)
}

fn resolve_refs(design: &Design, refs: &[String]) -> Result<Vec<Origin>> {
    refs.iter().map(|r| resolve_group_ref(design, r)).collect()
}

fn run(args: PropagateArgs) -> Result<()> {
    let config = load_config(args.config.as_ref())?;
    let mut design = load_design(&args, &config)?;

    let mut options = config.as_ref().map(|c| c.options()).unwrap_or_default();
    if args.lenient {
        options.strict = false;
    }
    if args.max_rounds.is_some() {
        options.max_rounds = args.max_rounds;
    }

    let known_refs = match args.known.is_empty() {
        true => config.as_ref().map(|c| c.groups.known.clone()).unwrap_or_default(),
        false => args.known.clone(),
    };
    let unknown_refs = match args.unknown.is_empty() {
        true => config.as_ref().map(|c| c.groups.unknown.clone()).unwrap_or_default(),
        false => args.unknown.clone(),
    };
    let top = design.top();
    let known: Vec<Origin> = match known_refs.is_empty() {
        true => design.modules[top.0].groups.iter().map(|&g| Origin::new(top, g)).collect(),
        false => resolve_refs(&design, &known_refs)?,
    };
    let unknown: Vec<Origin> = match unknown_refs.is_empty() {
        true => design.groups.iter().enumerate()
            .filter(|(_, g)| !design.is_top(g.module))
            .map(|(i, g)| Origin::new(g.module, GroupId(i)))
            .filter(|o| !known.contains(o))
            .collect(),
        false => resolve_refs(&design, &unknown_refs)?,
    };
    clilog::info!("propagating from {} known to {} unknown pin groups",
                  known.len(), unknown.len());

    propagate_groups(&mut design, &known, &unknown, options)?;

    for origin in &unknown {
        let group = &design.groups[origin.group.0];
        let wires: Vec<_> = design.group_wires(origin.group)
            .map(|w| design.wires[w.0].name.as_str())
            .collect();
        println!("{}:{} [{}]", design.module_path(origin.module), group.name, wires.join(", "));
    }

    if let Some(output) = &args.output {
        design.save(output)?;
        clilog::info!("saved reordered design to {}", output.display());
    }
    Ok(())
}

fn main() {
    clilog::init_stderr_color_debug();
    clilog::set_max_print_count(clilog::Level::Warn, "NL_SV_LIT", 1);
    let args = <PropagateArgs as clap::Parser>::parse();
    clilog::info!("Bitorder propagation args:\n{:#?}", args);
    if let Err(e) = run(args) {
        clilog::error!("{}", e);
        std::process::exit(1);
    }
}
