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
//! Dependency descriptors
//!
//! Every node of a behavior asset (evaluator, task, condition) declares the
//! external data it touches through a [`DependencyBuilder`]. The builder
//! de-duplicates by type and keeps the most permissive access, so nodes do not
//! need to know what their siblings already declared.
//!
//! The finished [`DependencySet`] is stored in canonical order (sorted by type
//! identity) and hashed in that order. Two assets declaring the same needs in
//! a different order therefore produce the same hash and end up on the same
//! tick controller.

use crate::ecs::{
    Access, ChunkFragment, Fragment, Requirements, SharedFragment, Tag, TypeInfo,
};
use rustc_hash::FxHasher;
use std::any::Any;
use std::hash::{Hash, Hasher};

/// What kind of external data a descriptor refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// Per-entity fragment data
    Fragment,
    /// Structural tag that must be present
    Tag,
    /// Per-batch data
    ChunkFragment,
    /// Per-archetype immutable data
    ConstSharedFragment,
    /// Per-archetype mutable data
    SharedFragment,
    /// World service
    Service,
    /// Data the batch store has no native requirement category for
    Opaque,
}

/// One (type, access) pair an asset depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyDescriptor {
    /// Kind of data
    pub kind: DependencyKind,
    /// Type the dependency refers to
    pub info: TypeInfo,
    /// Requested access, `Access::None` for tags
    pub access: Access,
}

/// Accumulates descriptors from the nodes of one asset
#[derive(Debug, Clone, Default)]
pub struct DependencyBuilder {
    descriptors: Vec<DependencyDescriptor>,
}

impl DependencyBuilder {
    /// Start an empty builder
    pub fn new() -> Self {
        DependencyBuilder {
            descriptors: Vec::new(),
        }
    }

    /// Add a descriptor
    ///
    /// If the type is already listed its access is upgraded to the more
    /// permissive of the two; the first declared kind is kept.
    pub fn add(&mut self, kind: DependencyKind, info: TypeInfo, access: Access) -> &mut Self {
        match self
            .descriptors
            .iter_mut()
            .find(|d| d.info.type_id == info.type_id)
        {
            Some(existing) => existing.access = existing.access.merge(access),
            None => self.descriptors.push(DependencyDescriptor { kind, info, access }),
        }
        self
    }

    /// Depend on fragment `T`
    pub fn add_fragment<T: Fragment>(&mut self, access: Access) -> &mut Self {
        self.add(DependencyKind::Fragment, TypeInfo::of::<T>(), access)
    }

    /// Require tag `T` to be present
    pub fn add_tag<T: Tag>(&mut self) -> &mut Self {
        self.add(DependencyKind::Tag, TypeInfo::of::<T>(), Access::None)
    }

    /// Depend on chunk fragment `T`
    pub fn add_chunk_fragment<T: ChunkFragment>(&mut self, access: Access) -> &mut Self {
        self.add(DependencyKind::ChunkFragment, TypeInfo::of::<T>(), access)
    }

    /// Depend on immutable shared fragment `T`
    pub fn add_const_shared<T: SharedFragment>(&mut self) -> &mut Self {
        self.add(
            DependencyKind::ConstSharedFragment,
            TypeInfo::of::<T>(),
            Access::ReadOnly,
        )
    }

    /// Depend on mutable shared fragment `T`
    pub fn add_shared<T: SharedFragment>(&mut self, access: Access) -> &mut Self {
        self.add(DependencyKind::SharedFragment, TypeInfo::of::<T>(), access)
    }

    /// Depend on world service `T`
    pub fn add_service<T: Any + Send + Sync>(&mut self, access: Access) -> &mut Self {
        self.add(DependencyKind::Service, TypeInfo::of::<T>(), access)
    }

    /// Depend on data outside the batch store's vocabulary
    pub fn add_opaque<T: 'static>(&mut self, access: Access) -> &mut Self {
        self.add(DependencyKind::Opaque, TypeInfo::of::<T>(), access)
    }

    /// Number of distinct types declared so far
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether nothing was declared
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Finish into a canonical, hashed set
    pub fn build(mut self) -> DependencySet {
        self.descriptors.sort_by_key(|d| d.info.type_id);
        let mut hasher = FxHasher::default();
        self.descriptors.len().hash(&mut hasher);
        for d in &self.descriptors {
            d.kind.hash(&mut hasher);
            d.info.type_id.hash(&mut hasher);
            d.access.hash(&mut hasher);
        }
        DependencySet {
            descriptors: self.descriptors,
            hash: hasher.finish(),
        }
    }
}

/// Immutable, canonical descriptor set of one asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySet {
    descriptors: Vec<DependencyDescriptor>,
    hash: u64,
}

impl DependencySet {
    /// The set with no dependencies
    pub fn empty() -> Self {
        DependencyBuilder::new().build()
    }

    /// Descriptors sorted by type identity
    pub fn descriptors(&self) -> &[DependencyDescriptor] {
        &self.descriptors
    }

    /// Order-independent content hash
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Translate into the batch store's requirement vocabulary
    ///
    /// Returns the native requirements and the descriptors that have no
    /// native category. Callers must report the latter.
    pub fn translate(&self) -> (Requirements, Vec<DependencyDescriptor>) {
        let mut requirements = Requirements::new();
        let mut unmapped = Vec::new();
        for d in &self.descriptors {
            match d.kind {
                DependencyKind::Fragment => requirements.add_fragment(d.info, d.access),
                DependencyKind::Tag => requirements.add_tag_all(d.info),
                DependencyKind::ChunkFragment => requirements.add_chunk_fragment(d.info, d.access),
                DependencyKind::ConstSharedFragment => requirements.add_const_shared(d.info),
                DependencyKind::SharedFragment => requirements.add_shared(d.info, d.access),
                DependencyKind::Service => requirements.add_service(d.info, d.access),
                DependencyKind::Opaque => unmapped.push(*d),
            }
        }
        (requirements, unmapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::RequirementCategory;

    struct Target;
    impl Fragment for Target {}

    struct Perception;
    impl Fragment for Perception {}

    struct Hostile;
    impl Tag for Hostile {}

    struct Clock;

    struct Blackboard;

    #[test]
    fn test_merge_is_order_independent() {
        let mut forward = DependencyBuilder::new();
        forward
            .add_fragment::<Target>(Access::ReadOnly)
            .add_fragment::<Target>(Access::ReadWrite);

        let mut reverse = DependencyBuilder::new();
        reverse
            .add_fragment::<Target>(Access::ReadWrite)
            .add_fragment::<Target>(Access::ReadOnly);

        let forward = forward.build();
        let reverse = reverse.build();
        assert_eq!(forward.len(), 1);
        assert_eq!(forward.descriptors()[0].access, Access::ReadWrite);
        assert_eq!(forward, reverse);
        assert_eq!(forward.hash(), reverse.hash());
    }

    #[test]
    fn test_hash_ignores_declaration_order() {
        let mut a = DependencyBuilder::new();
        a.add_fragment::<Target>(Access::ReadOnly)
            .add_fragment::<Perception>(Access::ReadWrite)
            .add_service::<Clock>(Access::ReadOnly);

        let mut b = DependencyBuilder::new();
        b.add_service::<Clock>(Access::ReadOnly)
            .add_fragment::<Perception>(Access::ReadWrite)
            .add_fragment::<Target>(Access::ReadOnly);

        assert_eq!(a.build().hash(), b.build().hash());
    }

    #[test]
    fn test_hash_depends_on_access() {
        let mut a = DependencyBuilder::new();
        a.add_fragment::<Target>(Access::ReadOnly);
        let mut b = DependencyBuilder::new();
        b.add_fragment::<Target>(Access::ReadWrite);

        assert_ne!(a.build().hash(), b.build().hash());
    }

    #[test]
    fn test_empty_set_is_valid() {
        let empty = DependencySet::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.hash(), DependencyBuilder::new().build().hash());
        let (requirements, unmapped) = empty.translate();
        assert!(requirements.is_empty());
        assert!(unmapped.is_empty());
    }

    #[test]
    fn test_translate_maps_kinds() {
        let mut builder = DependencyBuilder::new();
        builder
            .add_fragment::<Target>(Access::ReadWrite)
            .add_tag::<Hostile>()
            .add_service::<Clock>(Access::ReadOnly)
            .add_opaque::<Blackboard>(Access::ReadOnly);

        let (requirements, unmapped) = builder.build().translate();

        assert_eq!(requirements.len(), 3);
        let category_of = |info: TypeInfo| {
            requirements
                .entries()
                .iter()
                .find(|r| r.info == info)
                .map(|r| (r.category, r.access))
        };
        assert_eq!(
            category_of(TypeInfo::of::<Target>()),
            Some((RequirementCategory::Fragment, Access::ReadWrite))
        );
        assert_eq!(
            category_of(TypeInfo::of::<Hostile>()),
            Some((RequirementCategory::TagAll, Access::None))
        );
        assert_eq!(
            category_of(TypeInfo::of::<Clock>()),
            Some((RequirementCategory::Service, Access::ReadOnly))
        );
        assert_eq!(unmapped.len(), 1);
        assert_eq!(unmapped[0].info, TypeInfo::of::<Blackboard>());
    }
}
