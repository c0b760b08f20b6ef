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

//! Lineage walk that turns a dataset graph into a stage DAG.
//!
//! Grounded on `schedule.py`'s `getParentStages`/`getMissingParentStages`: a
//! depth-first walk over narrow dependencies stays inside the current
//! stage, while a shuffle dependency closes the current stage and opens (or
//! reuses, via `shuffle_to_stage`) a shuffle-map stage for its source.

use std::collections::HashSet;
use std::sync::Arc;
use stratum_core::{CacheTracker, Dataset, Dependency, StageId};

use super::StageArena;

/// Returns (creating as needed) the shuffle-map stage that produces
/// `dep`'s output, memoized in `arena.shuffle_to_stage` so that two
/// datasets sharing a shuffle dependency are mapped to the same stage.
fn get_shuffle_map_stage(
    arena: &mut StageArena,
    cache_tracker: &dyn CacheTracker,
    dep: &stratum_core::ShuffleDependency,
) -> StageId {
    if let Some(id) = arena.shuffle_map_stage_id(dep.shuffle_id) {
        return id;
    }
    let parents = get_parent_stages(arena, cache_tracker, &dep.rdd);
    let id = arena.allocate(dep.rdd.clone(), Some(dep.clone()), parents);
    arena.shuffle_to_stage.insert(dep.shuffle_id, id);
    id
}

/// Walks `rdd`'s narrow lineage to find every shuffle dependency it rests
/// on, allocates (or reuses) a shuffle-map stage per dependency found, and
/// returns their ids as this stage's parents. Every cacheable dataset
/// visited is registered with `cache_tracker` (idempotent).
pub fn get_parent_stages(
    arena: &mut StageArena,
    cache_tracker: &dyn CacheTracker,
    rdd: &Arc<dyn Dataset>,
) -> Vec<StageId> {
    let mut parents = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![rdd.clone()];

    while let Some(current) = stack.pop() {
        if !visited.insert(current.id()) {
            continue;
        }
        if current.should_cache() {
            cache_tracker.register_dataset(current.id(), current.num_partitions());
        }
        for dep in current.dependencies() {
            match dep {
                Dependency::Shuffle(shuffle_dep) => {
                    let stage_id = get_shuffle_map_stage(arena, cache_tracker, &shuffle_dep);
                    if !parents.contains(&stage_id) {
                        parents.push(stage_id);
                    }
                }
                Dependency::Narrow(parent_rdd) => stack.push(parent_rdd),
            }
        }
    }
    parents
}

/// From `stage.rdd`, DFS honoring narrow edges. A dataset that is cacheable
/// and whose cache-location snapshot is fully populated (every partition
/// has at least one host) prunes that branch -- caching hides the entire
/// upstream subtree, so the cache snapshot is consulted during the walk
/// rather than left to the cache tracker alone. At each shuffle dependency,
/// resolve to its shuffle-map stage; include it if not yet `is_available`.
/// Returns deduplicated stage ids.
pub fn get_missing_parent_stages(
    arena: &mut StageArena,
    cache_tracker: &dyn CacheTracker,
    stage_id: StageId,
) -> Vec<StageId> {
    let mut missing = Vec::new();
    let mut visited = HashSet::new();
    let Some(root_rdd) = arena.get(stage_id).map(|s| s.rdd.clone()) else {
        return missing;
    };
    let cache_locs = cache_tracker.locations_snapshot();
    let mut stack = vec![root_rdd];

    while let Some(current) = stack.pop() {
        if !visited.insert(current.id()) {
            continue;
        }
        if current.should_cache() {
            if let Some(locs) = cache_locs.get(&current.id()) {
                if !locs.is_empty() && locs.iter().all(|hosts| !hosts.is_empty()) {
                    continue;
                }
            }
        }
        for dep in current.dependencies() {
            match dep {
                Dependency::Shuffle(shuffle_dep) => {
                    let stage_id = get_shuffle_map_stage(arena, cache_tracker, &shuffle_dep);
                    let available = arena.get(stage_id).map(|s| s.is_available()).unwrap_or(false);
                    if !available && !missing.contains(&stage_id) {
                        missing.push(stage_id);
                    }
                }
                Dependency::Narrow(parent_rdd) => stack.push(parent_rdd),
            }
        }
    }
    missing
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::VecDataset;
    use stratum_core::{InMemoryCacheTracker, ShuffleDependency};

    #[test]
    fn narrow_only_lineage_has_no_parent_stages() {
        let mut arena = StageArena::new();
        let tracker = InMemoryCacheTracker::default();
        let source: Arc<dyn Dataset> = Arc::new(VecDataset::new(1, vec![vec![1]]));
        let derived: Arc<dyn Dataset> =
            Arc::new(VecDataset::new(2, vec![vec![1]]).with_narrow_parent(source));
        let parents = get_parent_stages(&mut arena, &tracker, &derived);
        assert!(parents.is_empty());
    }

    #[test]
    fn shuffle_dependency_resolves_to_a_memoized_stage() {
        let mut arena = StageArena::new();
        let tracker = InMemoryCacheTracker::default();
        let map_side: Arc<dyn Dataset> = Arc::new(VecDataset::new(1, vec![vec![1], vec![2]]));
        let shuffle_dep = ShuffleDependency {
            shuffle_id: 9,
            rdd: map_side,
            num_output_partitions: 2,
        };
        let reduce_a: Arc<dyn Dataset> =
            Arc::new(VecDataset::new(2, vec![vec![]]).with_shuffle_parent(shuffle_dep.clone()));
        let reduce_b: Arc<dyn Dataset> =
            Arc::new(VecDataset::new(3, vec![vec![]]).with_shuffle_parent(shuffle_dep));

        let parents_a = get_parent_stages(&mut arena, &tracker, &reduce_a);
        let parents_b = get_parent_stages(&mut arena, &tracker, &reduce_b);
        assert_eq!(parents_a.len(), 1);
        assert_eq!(parents_a, parents_b, "same shuffle id must map to one stage");
    }

    #[test]
    fn cached_dataset_with_full_locations_prunes_the_branch() {
        let mut arena = StageArena::new();
        let tracker = InMemoryCacheTracker::default();
        let map_side: Arc<dyn Dataset> = Arc::new(VecDataset::new(1, vec![vec![1]]));
        let shuffle_dep = ShuffleDependency {
            shuffle_id: 5,
            rdd: map_side,
            num_output_partitions: 1,
        };
        let cached: Arc<dyn Dataset> = Arc::new(
            VecDataset::new(2, vec![vec![1]])
                .with_shuffle_parent(shuffle_dep)
                .cached(),
        );
        let final_rdd: Arc<dyn Dataset> =
            Arc::new(VecDataset::new(3, vec![vec![1]]).with_narrow_parent(cached.clone()));

        tracker.register_dataset(2, 1);
        tracker.add_location(2, 0, "host-a".to_string());

        let final_stage = arena.allocate(final_rdd, None, Vec::new());
        let missing = get_missing_parent_stages(&mut arena, &tracker, final_stage);
        assert!(
            missing.is_empty(),
            "cached dataset with every partition located should prune its shuffle parent"
        );
    }
}
