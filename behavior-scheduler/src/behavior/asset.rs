// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Behavior assets
//!
//! A [`BehaviorAsset`] pairs a compiled state machine with the dependency set
//! its nodes declared. Linking happens once: nodes are visited, their
//! dependencies collected and hashed, and the set is translated into native
//! batch requirements. Entities point at their asset through the
//! [`BehaviorAssetRef`] shared fragment, so every batch belongs to exactly one
//! asset.

use crate::arena::InstanceData;
use crate::behavior::context::ExecutionContext;
use crate::behavior::dependency::{DependencyBuilder, DependencySet};
use crate::ecs::{Requirements, SharedFragment};
use crate::error::SchedulerError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a machine evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunStatus {
    /// The machine is executing and needs no immediate re-evaluation
    Running,
    /// The machine was stopped
    Stopped,
    /// The machine reached a successful end state
    Succeeded,
    /// The machine reached a failing end state
    Failed,
    /// No status has been produced yet
    #[default]
    Unset,
}

impl RunStatus {
    /// Whether the machine is settled in a running state
    pub fn is_running(self) -> bool {
        self == RunStatus::Running
    }
}

/// An evaluator, task or condition that touches external data
pub trait BehaviorNode: Send + Sync {
    /// Declare the data this node reads or writes
    fn collect_dependencies(&self, builder: &mut DependencyBuilder);
}

/// The compiled, opaque state machine of an asset
///
/// One machine value is shared by every entity running the asset. Per-entity
/// state lives in the [`InstanceData`] passed to each call.
pub trait StateMachine: Send + Sync {
    /// Visit every node that contributes dependencies
    fn for_each_node(&self, _visit: &mut dyn FnMut(&dyn BehaviorNode)) {}

    /// Enter the initial state
    fn start(&self, ctx: &mut ExecutionContext<'_>, instance: &mut InstanceData) -> RunStatus;

    /// Advance by `delta_time` seconds
    ///
    /// Any status other than [`RunStatus::Running`] asks for another
    /// evaluation.
    fn tick(
        &self,
        ctx: &mut ExecutionContext<'_>,
        instance: &mut InstanceData,
        delta_time: f64,
    ) -> RunStatus;

    /// Leave the current state for good
    fn stop(&self, ctx: &mut ExecutionContext<'_>, instance: &mut InstanceData);
}

/// Process-unique asset identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId(u64);

impl AssetId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        AssetId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Asset({})", self.0)
    }
}

/// A linked state machine shared by many entities
pub struct BehaviorAsset {
    id: AssetId,
    name: String,
    machine: Box<dyn StateMachine>,
    dependencies: DependencySet,
    requirements: Requirements,
}

impl BehaviorAsset {
    /// Link `machine` into an asset
    ///
    /// Dependencies that have no native requirement category are logged once
    /// here and left out of [`requirements`](Self::requirements).
    pub fn link<M: StateMachine + 'static>(name: impl Into<String>, machine: M) -> Arc<Self> {
        let name = name.into();
        let mut builder = DependencyBuilder::new();
        machine.for_each_node(&mut |node: &dyn BehaviorNode| {
            node.collect_dependencies(&mut builder)
        });
        let dependencies = builder.build();

        let (requirements, unmapped) = dependencies.translate();
        for descriptor in &unmapped {
            let err = SchedulerError::UnmappedDependency {
                asset: name.clone(),
                type_name: descriptor.info.name,
            };
            warn!("{}", err);
        }
        debug!(
            asset = %name,
            dependencies = dependencies.len(),
            hash = dependencies.hash(),
            "Linked behavior asset"
        );

        Arc::new(BehaviorAsset {
            id: AssetId::next(),
            name,
            machine: Box::new(machine),
            dependencies,
            requirements,
        })
    }

    /// Identity of this asset
    pub fn id(&self) -> AssetId {
        self.id
    }

    /// Human readable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The compiled machine
    pub fn machine(&self) -> &dyn StateMachine {
        self.machine.as_ref()
    }

    /// Canonical dependency set
    pub fn dependencies(&self) -> &DependencySet {
        &self.dependencies
    }

    /// Hash of the dependency set, the key tick controllers are shared by
    pub fn requirement_hash(&self) -> u64 {
        self.dependencies.hash()
    }

    /// Native requirements translated from the dependency set
    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }
}

impl fmt::Debug for BehaviorAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorAsset")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}

/// Shared fragment pointing a batch at its asset
#[derive(Clone, Debug)]
pub struct BehaviorAssetRef(Arc<BehaviorAsset>);

impl BehaviorAssetRef {
    /// Reference `asset`
    pub fn new(asset: &Arc<BehaviorAsset>) -> Self {
        BehaviorAssetRef(Arc::clone(asset))
    }

    /// The referenced asset
    pub fn asset(&self) -> &Arc<BehaviorAsset> {
        &self.0
    }
}

impl SharedFragment for BehaviorAssetRef {
    fn shared_key(&self) -> u64 {
        self.0.id.raw()
    }
}
