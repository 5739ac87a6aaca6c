// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Error types for bit order propagation.
//!
//! Every failure is scoped to the operation that raised it. Callers
//! add context with [`ResultExt::context`] while the error travels up,
//! so the innermost cause is never replaced.

use thiserror::Error;
use crate::design::Origin;

/// The failures of lookup, structure, consensus and bookkeeping.
#[derive(Debug, Error)]
pub enum BitorderError {
    /// A module id that does not exist in the design.
    #[error("failed to find a module with id {0}")]
    ModuleNotFound(usize),

    /// A dotted instance path that names no module.
    #[error("failed to find a module at instance path `{0}`")]
    ModulePathNotFound(String),

    /// No pin group of this name in the module.
    #[error("failed to find a pin group with the name {name} at module with id {module}")]
    PinGroupNotFound { module: usize, name: String },

    /// Pin group names are expected to be unique inside a module.
    #[error("found multiple pin groups with name {name} at module with id {module}")]
    AmbiguousPinGroup { module: usize, name: String },

    #[error("pin group {group} has {len} pins, index {index} is out of range")]
    PinIndexOutOfRange { group: String, index: usize, len: usize },

    #[error("gate {gate} has no pin named {pin}")]
    GatePinNotFound { gate: String, pin: String },

    /// The origin refers to a group that is not owned by the module.
    #[error("pin group with id {group} does not belong to module with id {module}")]
    ModuleOriginNotFound { module: usize, group: usize },

    /// A border wire of a module is not connected to any module pin.
    #[error("wire with id {wire} is a border wire of module with id {module} but does not have a pin")]
    MissingBorderPin { wire: usize, module: usize },

    #[error("pin {pin} appears in bit order of pin group {expected} for module with id {module} but belongs to pin group {actual}")]
    PinGroupMismatch { pin: String, expected: String, actual: String, module: usize },

    #[error("wire {wire} is already driven by gate {driver}, cannot add gate {gate} as another driver")]
    MultipleDrivers { wire: String, driver: String, gate: String },

    /// Offsets between two origins disagree across wires.
    #[error("failed to find valid offset between {0} and {1}")]
    OffsetConflict(Origin, Origin),

    /// A caller-supplied bit order does not describe the pin group.
    #[error("invalid bit order for pin group {group}: {reason}")]
    InvalidBitOrder { group: String, reason: String },

    #[error("top module is part of the unknown bit orders")]
    TopModuleUnresolved,

    #[error("malformed group reference `{0}`, expected `module_path:group`")]
    GroupReference(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("design format error: {0}")]
    Format(#[from] serde_bare::error::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error with an explanation of what was being attempted.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<BitorderError>,
    },
}

impl BitorderError {
    /// Wrap this error in another layer of context.
    pub fn context(self, context: impl Into<String>) -> Self {
        BitorderError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping all context layers.
    pub fn root_cause(&self) -> &BitorderError {
        let mut e = self;
        while let BitorderError::Context { source, .. } = e {
            e = source;
        }
        e
    }
}

pub type Result<T> = std::result::Result<T, BitorderError>;

/// Context chaining on results.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Like [`ResultExt::context`], but only builds the message on error.
    fn with_context<S: Into<String>>(self, f: impl FnOnce() -> S) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<S: Into<String>>(self, f: impl FnOnce() -> S) -> Result<T> {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_chain_keeps_root_cause() {
        let r: Result<()> = Err(BitorderError::ModuleNotFound(7));
        let r = r.context("inner").with_context(|| format!("outer {}", 1));
        let e = r.unwrap_err();
        assert!(matches!(e.root_cause(), BitorderError::ModuleNotFound(7)));
        assert_eq!(
            e.to_string(),
            "outer 1: inner: failed to find a module with id 7"
        );
    }
}
