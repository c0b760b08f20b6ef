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

use parking_lot::Mutex;
use std::collections::HashMap;

/// Global accumulator id, assigned by the embedding application when an
/// accumulator is created.
pub type AccumulatorId = u64;

/// Merges the per-task delta payloads of a single accumulator. Re-execution
/// of a deterministic task may cause the same logical update to be merged
/// more than once (see `SPEC_FULL.md` §9, Open Questions); implementations
/// for which this is unsafe must document it and rely on the embedder to
/// avoid re-execution of tasks touching that accumulator, since the
/// scheduler itself does not deduplicate merges.
pub trait AccumulatorRegistry: Send + Sync {
    /// Merge `delta` (an opaque, codec-specific payload) into the running
    /// total for `id`.
    fn merge(&self, id: AccumulatorId, delta: &[u8]);

    /// Current merged payload for `id`, or `None` if nothing has been merged
    /// yet.
    fn current(&self, id: AccumulatorId) -> Option<Vec<u8>>;
}

/// In-memory registry that merges deltas by concatenation, suitable for
/// byte-string accumulators or as a base to wrap with a real merge function.
/// Embedders with numeric/structural accumulators should provide their own
/// `AccumulatorRegistry` that decodes `delta` before combining.
#[derive(Default)]
pub struct InMemoryAccumulatorRegistry {
    totals: Mutex<HashMap<AccumulatorId, Vec<u8>>>,
}

impl AccumulatorRegistry for InMemoryAccumulatorRegistry {
    fn merge(&self, id: AccumulatorId, delta: &[u8]) {
        self.totals
            .lock()
            .entry(id)
            .or_default()
            .extend_from_slice(delta);
    }

    fn current(&self, id: AccumulatorId) -> Option<Vec<u8>> {
        self.totals.lock().get(&id).cloned()
    }
}
