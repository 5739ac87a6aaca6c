// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Project configuration file (`bitorder.toml`) support.
//!
//! Stores the design source, propagation options and the pin groups
//! to start from and to resolve. CLI arguments always override config
//! file values.

use std::path::{Path, PathBuf};
use serde::Deserialize;
use crate::design::{Design, Origin};
use crate::error::{BitorderError, Result, ResultExt};
use crate::propagate::PropagationOptions;

pub const CONFIG_FILE_NAME: &str = "bitorder.toml";

/// Configuration loaded from `bitorder.toml`.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BitorderConfig {
    pub design: DesignConfig,
    pub propagation: PropagationConfig,
    pub groups: GroupsConfig,
}

/// Where the design comes from.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DesignConfig {
    /// Gate-level Verilog netlist path.
    pub netlist: Option<PathBuf>,
    /// Top module name (auto-detected if omitted).
    pub top_module: Option<String>,
    /// Previously saved design dump, used instead of the netlist.
    pub design: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct PropagationConfig {
    /// Require consecutive indices. Defaults to true.
    pub strict: Option<bool>,
    pub max_rounds: Option<usize>,
}

/// Pin groups as `"module_path:group"` references.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct GroupsConfig {
    pub known: Vec<String>,
    pub unknown: Vec<String>,
}

impl BitorderConfig {
    /// Search the working directory and its ancestors for
    /// `bitorder.toml`. A config that fails to load is reported and
    /// ignored.
    pub fn discover() -> Option<(Self, PathBuf)> {
        let cwd = std::env::current_dir().ok()?;
        let path = cwd.ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|p| p.is_file())?;
        match Self::load_resolved(&path) {
            Ok(config) => Some((config, path)),
            Err(e) => {
                clilog::warn!("ignoring {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Parse a config file. Paths inside are left as written.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(BitorderError::from)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        toml::from_str(&content).map_err(|e| BitorderError::Config(
            format!("{}: {}", path.display(), e)
        ))
    }

    /// Parse a config file and make its paths relative to the file.
    pub fn load_resolved(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        Ok(config)
    }

    /// Rebase relative design paths onto `dir`.
    pub fn resolve_paths(&mut self, dir: &Path) {
        let paths = [&mut self.design.netlist, &mut self.design.design];
        for p in paths.into_iter().flatten() {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        }
    }

    pub fn options(&self) -> PropagationOptions {
        PropagationOptions {
            strict: self.propagation.strict.unwrap_or(true),
            max_rounds: self.propagation.max_rounds,
        }
    }
}

/// Split a `"module_path:group"` reference.
///
/// The module path is dotted from the top; an empty path refers to
/// the top module. The last `:` separates the group name.
pub fn parse_group_ref(s: &str) -> Result<(&str, &str)> {
    match s.rsplit_once(':') {
        Some((module, group)) if !group.is_empty() => Ok((module, group)),
        _ => Err(BitorderError::GroupReference(s.to_string())),
    }
}

/// Resolve a `"module_path:group"` reference in a design.
pub fn resolve_group_ref(design: &Design, s: &str) -> Result<Origin> {
    let (path, group) = parse_group_ref(s)?;
    let m = design.module_by_path(path)
        .with_context(|| format!("cannot resolve pin group reference `{}`", s))?;
    let g = design.pin_group_by_name(m, group)
        .with_context(|| format!("cannot resolve pin group reference `{}`", s))?;
    Ok(Origin::new(m, g))
}
