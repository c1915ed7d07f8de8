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
//! Native requirement sets
//!
//! A [`Requirements`] value is what a controller declares before it is
//! scheduled: which fragments it reads or writes, which tags must (or must
//! not) be present, which chunk-scoped and shared values it needs and which
//! world services it uses.
//!
//! Two checks are derived from it:
//!
//! - [`Requirements::matches`] is the structural filter used to pick batches.
//! - [`Requirements::validate`] is the full check run right before a batch is
//!   touched. It also covers data that is not part of the archetype layout
//!   (chunk fragments, services) and reports the first missing piece.

use crate::ecs::fragment::TypeInfo;
use crate::ecs::world::{Archetype, Chunk, Services};
use crate::error::SchedulerError;
use std::fmt;

/// Access mode of a requirement
///
/// Ordered so that merging two requests is `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Access {
    /// Presence only, no data access (tags)
    #[default]
    None,
    /// Shared read access
    ReadOnly,
    /// Exclusive write access
    ReadWrite,
}

impl Access {
    /// The more permissive of two access modes
    pub fn merge(self, other: Access) -> Access {
        self.max(other)
    }
}

/// Native requirement category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequirementCategory {
    /// Per-entity fragment data
    Fragment,
    /// Tag that must be present
    TagAll,
    /// Tag that must be absent
    TagNone,
    /// Per-batch data
    ChunkFragment,
    /// Per-archetype immutable data
    ConstSharedFragment,
    /// Per-archetype mutable data
    SharedFragment,
    /// World service
    Service,
}

impl fmt::Display for RequirementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequirementCategory::Fragment => "fragment",
            RequirementCategory::TagAll => "tag",
            RequirementCategory::TagNone => "excluded tag",
            RequirementCategory::ChunkFragment => "chunk fragment",
            RequirementCategory::ConstSharedFragment => "const shared fragment",
            RequirementCategory::SharedFragment => "shared fragment",
            RequirementCategory::Service => "service",
        };
        f.write_str(name)
    }
}

/// One entry of a requirement set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Requirement {
    /// Category the type is required in
    pub category: RequirementCategory,
    /// Required type
    pub info: TypeInfo,
    /// Access mode, `Access::None` for tags
    pub access: Access,
}

/// A controller's declared data needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    entries: Vec<Requirement>,
}

impl Requirements {
    /// Empty requirement set
    pub fn new() -> Self {
        Requirements {
            entries: Vec::new(),
        }
    }

    /// Add a requirement, merging access when the type is already listed in
    /// the same category
    pub fn add(&mut self, category: RequirementCategory, info: TypeInfo, access: Access) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|r| r.category == category && r.info.type_id == info.type_id)
        {
            existing.access = existing.access.merge(access);
            return;
        }
        self.entries.push(Requirement {
            category,
            info,
            access,
        });
    }

    /// Require fragment data
    pub fn add_fragment(&mut self, info: TypeInfo, access: Access) {
        self.add(RequirementCategory::Fragment, info, access);
    }

    /// Require a tag to be present
    pub fn add_tag_all(&mut self, info: TypeInfo) {
        self.add(RequirementCategory::TagAll, info, Access::None);
    }

    /// Require a tag to be absent
    pub fn add_tag_none(&mut self, info: TypeInfo) {
        self.add(RequirementCategory::TagNone, info, Access::None);
    }

    /// Require chunk-scoped data
    pub fn add_chunk_fragment(&mut self, info: TypeInfo, access: Access) {
        self.add(RequirementCategory::ChunkFragment, info, access);
    }

    /// Require immutable shared data
    pub fn add_const_shared(&mut self, info: TypeInfo) {
        self.add(RequirementCategory::ConstSharedFragment, info, Access::ReadOnly);
    }

    /// Require mutable shared data
    pub fn add_shared(&mut self, info: TypeInfo, access: Access) {
        self.add(RequirementCategory::SharedFragment, info, access);
    }

    /// Require a world service
    pub fn add_service(&mut self, info: TypeInfo, access: Access) {
        self.add(RequirementCategory::Service, info, access);
    }

    /// Union of two sets
    pub fn merge(&mut self, other: &Requirements) {
        for r in &other.entries {
            self.add(r.category, r.info, r.access);
        }
    }

    /// All entries in declaration order
    pub fn entries(&self) -> &[Requirement] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is required
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Structural filter: fragments and present tags exist, excluded tags do
    /// not, shared values are attached
    pub fn matches(&self, archetype: &Archetype) -> bool {
        self.entries.iter().all(|r| match r.category {
            RequirementCategory::Fragment => archetype.has_fragment(r.info.type_id),
            RequirementCategory::TagAll => archetype.has_tag(r.info.type_id),
            RequirementCategory::TagNone => !archetype.has_tag(r.info.type_id),
            RequirementCategory::ConstSharedFragment | RequirementCategory::SharedFragment => {
                archetype.shared().contains(r.info.type_id)
            }
            RequirementCategory::ChunkFragment | RequirementCategory::Service => true,
        })
    }

    /// Full check of one batch, run before any of its entities are touched
    pub fn validate(
        &self,
        controller: &str,
        archetype: &Archetype,
        chunk: &Chunk,
        services: &Services,
    ) -> Result<(), SchedulerError> {
        self.validate_archetype(controller, archetype, services)?;
        self.validate_chunk(controller, chunk)
    }

    /// Layout-level half of [`validate`](Self::validate): fragments, tags,
    /// shared values and services
    pub fn validate_archetype(
        &self,
        controller: &str,
        archetype: &Archetype,
        services: &Services,
    ) -> Result<(), SchedulerError> {
        self.validate_parts(controller, |r| match r.category {
            RequirementCategory::Fragment => archetype.has_fragment(r.info.type_id),
            RequirementCategory::TagAll => archetype.has_tag(r.info.type_id),
            RequirementCategory::TagNone => !archetype.has_tag(r.info.type_id),
            RequirementCategory::ConstSharedFragment | RequirementCategory::SharedFragment => {
                archetype.shared().contains(r.info.type_id)
            }
            RequirementCategory::Service => services.contains(r.info.type_id),
            RequirementCategory::ChunkFragment => true,
        })
    }

    /// Batch-level half of [`validate`](Self::validate): fragment columns and
    /// chunk fragments
    pub fn validate_chunk(&self, controller: &str, chunk: &Chunk) -> Result<(), SchedulerError> {
        self.validate_parts(controller, |r| match r.category {
            RequirementCategory::Fragment => chunk.has_column(r.info.type_id),
            RequirementCategory::ChunkFragment => chunk.has_chunk_fragment(r.info.type_id),
            _ => true,
        })
    }

    fn validate_parts(
        &self,
        controller: &str,
        present: impl Fn(&Requirement) -> bool,
    ) -> Result<(), SchedulerError> {
        match self.entries.iter().find(|r| !present(r)) {
            Some(missing) => Err(SchedulerError::MissingRequirement {
                controller: controller.to_string(),
                category: missing.category,
                type_name: missing.info.name,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{EntityBuilder, Fragment, Tag, World};

    struct Stamina(f32);
    impl Fragment for Stamina {}

    struct Fleeing;
    impl Tag for Fleeing {}

    struct Weather;

    #[test]
    fn test_access_merge_prefers_write() {
        assert_eq!(Access::ReadOnly.merge(Access::ReadWrite), Access::ReadWrite);
        assert_eq!(Access::ReadWrite.merge(Access::ReadOnly), Access::ReadWrite);
        assert_eq!(Access::None.merge(Access::ReadOnly), Access::ReadOnly);
    }

    #[test]
    fn test_add_merges_same_type() {
        let mut requirements = Requirements::new();
        requirements.add_fragment(TypeInfo::of::<Stamina>(), Access::ReadOnly);
        requirements.add_fragment(TypeInfo::of::<Stamina>(), Access::ReadWrite);
        assert_eq!(requirements.len(), 1);
        assert_eq!(requirements.entries()[0].access, Access::ReadWrite);
    }

    #[test]
    fn test_matches_and_validate() {
        let mut world = World::new();
        world.spawn(EntityBuilder::new().with(Stamina(1.0)));

        let mut requirements = Requirements::new();
        requirements.add_fragment(TypeInfo::of::<Stamina>(), Access::ReadOnly);
        requirements.add_tag_none(TypeInfo::of::<Fleeing>());

        let archetype = &world.archetypes()[0];
        assert!(requirements.matches(archetype));
        assert!(requirements
            .validate("test", archetype, &archetype.chunks()[0], world.services())
            .is_ok());

        requirements.add_service(TypeInfo::of::<Weather>(), Access::ReadOnly);
        assert!(requirements.matches(archetype));
        let err = requirements
            .validate("test", archetype, &archetype.chunks()[0], world.services())
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::MissingRequirement {
                category: RequirementCategory::Service,
                ..
            }
        ));
    }
}
