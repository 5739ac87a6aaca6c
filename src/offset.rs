// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Offsets between the index numberings of different origins.
//!
//! When one wire is observed at index `i` from origin A and at index
//! `j` from origin B, the two numberings differ by `j - i`. Every
//! wire seen by both A and B must agree on that offset.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use crate::design::Origin;
use crate::error::{BitorderError, Result};

/// The indices of one wire, at most one per origin.
pub type Observations = BTreeMap<Origin, i64>;

/// Pairwise offsets, with `index(b) = index(a) + offset(a, b)`.
///
/// Entries always come in symmetric pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetMatrix {
    offsets: BTreeMap<(Origin, Origin), i64>,
}

impl OffsetMatrix {
    /// Build the matrix from per-wire observations.
    ///
    /// Fails on the first pair of origins whose offset differs between
    /// two wires. A failure invalidates the whole matrix.
    pub fn build<'a>(
        per_wire: impl IntoIterator<Item = &'a Observations>
    ) -> Result<OffsetMatrix> {
        let mut m = OffsetMatrix::default();
        for obs in per_wire {
            for (&a, &index_a) in obs {
                for (&b, &index_b) in obs {
                    match m.offsets.get(&(a, b)) {
                        None => {
                            let offset = index_b - index_a;
                            m.offsets.insert((a, b), offset);
                            m.offsets.insert((b, a), -offset);
                        },
                        Some(&offset) => {
                            if index_a + offset != index_b {
                                return Err(BitorderError::OffsetConflict(a, b))
                            }
                        }
                    }
                }
            }
        }
        Ok(m)
    }

    /// The directly recorded offset from `a` to `b`.
    pub fn get(&self, a: Origin, b: Origin) -> Option<i64> {
        self.offsets.get(&(a, b)).copied()
    }

    /// All origins taking part in at least one offset.
    pub fn origins(&self) -> BTreeSet<Origin> {
        self.offsets.keys().map(|&(a, _)| a).collect()
    }

    /// The reference frame all indices get translated into: the
    /// smallest origin present.
    pub fn baseline(&self) -> Option<Origin> {
        self.offsets.keys().next().map(|&(a, _)| a)
    }

    fn neighbors(&self, a: Origin) -> Vec<(Origin, i64)> {
        self.offsets.range((a, Origin::MIN)..=(a, Origin::MAX))
            .map(|(&(_, b), &offset)| (b, offset))
            .collect()
    }

    /// The offset from `from` to `to`, following a chain of recorded
    /// offsets if there is no direct one.
    ///
    /// A found chain is stored back into the matrix, so later lookups
    /// are direct.
    pub fn chain_offset(&mut self, from: Origin, to: Origin) -> Option<i64> {
        if from == to {
            self.offsets.insert((from, to), 0);
            return Some(0)
        }
        if let Some(offset) = self.get(from, to) {
            return Some(offset)
        }
        let mut visited = BTreeSet::from([from]);
        let mut queue = VecDeque::from([(from, 0i64)]);
        while let Some((cur, acc)) = queue.pop_front() {
            for (next, offset) in self.neighbors(cur) {
                if !visited.insert(next) {
                    continue
                }
                let total = acc + offset;
                if next == to {
                    self.offsets.insert((from, to), total);
                    self.offsets.insert((to, from), -total);
                    return Some(total)
                }
                queue.push_back((next, total));
            }
        }
        None
    }

    /// Iterate over all `(a, b, offset)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (Origin, Origin, i64)> + '_ {
        self.offsets.iter().map(|(&(a, b), &o)| (a, b, o))
    }
}
