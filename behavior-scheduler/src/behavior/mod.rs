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
//! Behavior assets and the interface to their state machines
//!
//! - Dependency descriptors and the builder nodes declare them with
//! - Linked assets and the opaque state machine trait
//! - The execution context passed to every machine call
//! - Per-entity scheduling fragments

mod asset;
mod context;
mod dependency;
mod fragments;

pub use asset::{AssetId, BehaviorAsset, BehaviorAssetRef, BehaviorNode, RunStatus, StateMachine};
pub use context::ExecutionContext;
pub use dependency::{DependencyBuilder, DependencyDescriptor, DependencyKind, DependencySet};
pub use fragments::{BehaviorActivated, BehaviorInstance, ImportanceTier};

pub(crate) use context::BatchOutbox;
