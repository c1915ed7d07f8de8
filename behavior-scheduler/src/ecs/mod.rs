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
//! Entity/fragment store
//!
//! This module provides the batched data store behavior controllers run over:
//! - Generational entity handles
//! - Fragments, tags, chunk-scoped and shared data
//! - Fixed-capacity batches grouped by archetype
//! - Deferred structural commands and a removal journal
//! - Native requirement sets used to filter and validate batches

mod commands;
mod entity;
mod fragment;
mod requirements;
mod world;

pub use commands::CommandBuffer;
pub use entity::{Entity, EntityId};
pub use fragment::{ChunkFragment, Fragment, SharedFragment, SharedFragments, Tag, TypeInfo};
pub use requirements::{Access, Requirement, RequirementCategory, Requirements};
pub use world::{Archetype, Chunk, EntityBuilder, Removed, Services, World, DEFAULT_CHUNK_CAPACITY};


#[cfg(test)]
mod tests {
    use super::*;

    struct Mood(u8);
    impl Fragment for Mood {}

    #[test]
    fn test_world_creation() {
        let world = World::new();
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.chunk_capacity(), DEFAULT_CHUNK_CAPACITY);
    }

    #[test]
    fn test_entity_creation() {
        let mut world = World::new();
        let entity = world.spawn(EntityBuilder::new().with(Mood(3)));
        assert_eq!(world.entity_count(), 1);
        assert!(world.is_alive(entity));
        assert_eq!(world.get::<Mood>(entity).map(|m| m.0), Some(3));
    }
}
