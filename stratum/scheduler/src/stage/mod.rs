// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Component A: the stage graph builder.
//!
//! A [`Stage`] is a maximal subgraph of datasets connected by narrow
//! dependencies. Stages are addressed by an integer [`StageId`] handle into
//! a [`StageArena`] owned by the current run -- a statically-typed stand-in
//! for the source's weak id-keyed stage map (`SPEC_FULL.md` §9): `clear()`
//! truncates the arena instead of relying on garbage collection to drop
//! stages nobody references anymore.

pub(crate) mod builder;

pub use builder::{get_missing_parent_stages, get_parent_stages};

use std::collections::HashMap;
use std::sync::Arc;
use stratum_core::{Dataset, PartitionIndex, ShuffleDependency, ShuffleId, StageId};

/// A maximal narrow-connected slice of the lineage, bounded either by the
/// terminal action (a result stage, `shuffle_dep.is_none()`) or by an
/// outgoing shuffle dependency (a shuffle-map stage).
pub struct Stage {
    pub id: StageId,
    pub rdd: Arc<dyn Dataset>,
    pub shuffle_dep: Option<ShuffleDependency>,
    pub parents: Vec<StageId>,
    pub num_partitions: usize,
    /// Hosts known to hold each output partition, in the order they were
    /// reported. Empty until the partition is produced.
    pub output_locs: Vec<Vec<String>>,
}

impl Stage {
    /// `isAvailable` (`SPEC_FULL.md` §3): true for a trivial source stage
    /// (no parents, no shuffle dependency), or once every partition has at
    /// least one reported host.
    pub fn is_available(&self) -> bool {
        if self.parents.is_empty() && self.shuffle_dep.is_none() {
            return true;
        }
        self.output_locs.iter().all(|hosts| !hosts.is_empty())
    }

    pub fn is_shuffle_map(&self) -> bool {
        self.shuffle_dep.is_some()
    }

    pub fn missing_partitions(&self) -> Vec<PartitionIndex> {
        self.output_locs
            .iter()
            .enumerate()
            .filter(|(_, hosts)| hosts.is_empty())
            .map(|(p, _)| p)
            .collect()
    }
}

/// Owns every [`Stage`] created during the current run, addressed by
/// [`StageId`]. Ids are assigned once and never reused within the arena's
/// lifetime; `clear()` starts a fresh lifetime (and fresh ids) for an
/// independent top-level run.
#[derive(Default)]
pub struct StageArena {
    stages: Vec<Stage>,
    shuffle_to_stage: HashMap<ShuffleId, StageId>,
    next_id: u64,
}

impl StageArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: StageId) -> Option<&mut Stage> {
        self.stages.get_mut(id.0 as usize)
    }

    pub fn shuffle_map_stage_id(&self, shuffle_id: ShuffleId) -> Option<StageId> {
        self.shuffle_to_stage.get(&shuffle_id).copied()
    }

    /// Clears every stage from the arena. Call between independent
    /// top-level runs; output locations, shuffle memoization, and ids are
    /// all reset.
    pub fn clear(&mut self) {
        self.stages.clear();
        self.shuffle_to_stage.clear();
        self.next_id = 0;
    }

    pub(crate) fn allocate(
        &mut self,
        rdd: Arc<dyn Dataset>,
        shuffle_dep: Option<ShuffleDependency>,
        parents: Vec<StageId>,
    ) -> StageId {
        let id = StageId(self.next_id);
        self.next_id += 1;
        let num_partitions = shuffle_dep
            .as_ref()
            .map(|d| d.num_output_partitions)
            .unwrap_or_else(|| rdd.num_partitions());
        self.stages.push(Stage {
            id,
            rdd,
            shuffle_dep,
            parents,
            num_partitions,
            output_locs: vec![Vec::new(); num_partitions],
        });
        id
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::VecDataset;

    #[test]
    fn trivial_source_stage_is_available() {
        let mut arena = StageArena::new();
        let rdd: Arc<dyn Dataset> = Arc::new(VecDataset::new(1, vec![vec![1], vec![2]]));
        let id = arena.allocate(rdd, None, Vec::new());
        assert!(arena.get(id).unwrap().is_available());
        assert!(arena.get(id).unwrap().missing_partitions().is_empty());
    }

    #[test]
    fn stage_with_unproduced_partitions_is_not_available() {
        let mut arena = StageArena::new();
        let rdd: Arc<dyn Dataset> = Arc::new(VecDataset::new(1, vec![vec![1], vec![2]]));
        let id = arena.allocate(rdd, None, vec![StageId(0)]);
        assert!(!arena.get(id).unwrap().is_available());
        assert_eq!(arena.get(id).unwrap().missing_partitions(), vec![0, 1]);
    }

    #[test]
    fn output_locs_mark_partitions_available() {
        let mut arena = StageArena::new();
        let rdd: Arc<dyn Dataset> = Arc::new(VecDataset::new(1, vec![vec![1], vec![2]]));
        let id = arena.allocate(rdd, None, vec![StageId(0)]);
        arena.get_mut(id).unwrap().output_locs[0].push("host-a".to_string());
        assert_eq!(arena.get(id).unwrap().missing_partitions(), vec![1]);
        arena.get_mut(id).unwrap().output_locs[1].push("host-b".to_string());
        assert!(arena.get(id).unwrap().is_available());
    }

    #[test]
    fn clear_resets_ids_and_shuffle_memoization() {
        let mut arena = StageArena::new();
        let rdd: Arc<dyn Dataset> = Arc::new(VecDataset::new(1, vec![vec![1]]));
        let first = arena.allocate(rdd.clone(), None, Vec::new());
        arena.shuffle_to_stage.insert(7, first);
        assert_eq!(arena.shuffle_map_stage_id(7), Some(first));
        arena.clear();
        assert_eq!(arena.shuffle_map_stage_id(7), None);
        let second = arena.allocate(rdd, None, Vec::new());
        assert_eq!(second, StageId(0));
    }
}
