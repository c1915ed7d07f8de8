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
//! World management
//!
//! The World owns every entity and its data. Entities with the same fragment
//! types, tags and shared fragment values form an [`Archetype`]; each archetype
//! splits its entities into fixed-capacity [`Chunk`]s, the batches controllers
//! iterate over.
//!
//! Structural changes move an entity's row to another archetype with
//! swap-remove semantics, so row indices inside a chunk are only stable until
//! the next structural change. Controllers therefore defer structural changes
//! through a [`CommandBuffer`] while iterating.
//!
//! Chunk fragments belong to the batch layout. A new chunk starts with copies
//! of the chunk fragments of its archetype's last chunk, and an entity moving
//! into a chunk brings along any chunk fragment type the destination lacks.

use crate::ecs::commands::{Command, CommandBuffer};
use crate::ecs::fragment::{
    ChunkFragment, ChunkValue, Column, ErasedFragment, Fragment, FragmentValue, SharedFragment,
    SharedFragments, SharedValue, Tag, TypeInfo,
};
use crate::ecs::requirements::Requirements;
use crate::ecs::entity::EntitySlots;
use crate::ecs::Entity;
use rustc_hash::{FxHashMap, FxHashSet};
use std::any::{Any, TypeId};

/// Default number of entities per chunk
pub const DEFAULT_CHUNK_CAPACITY: usize = 128;

/// Where an entity's data lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Location {
    pub(crate) archetype: usize,
    pub(crate) chunk: usize,
    pub(crate) row: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
struct ArchetypeKey {
    fragments: Vec<TypeId>,
    tags: Vec<TypeId>,
    shared: Vec<(TypeId, u64)>,
}

impl ArchetypeKey {
    fn normalize(mut self) -> Self {
        self.fragments.sort();
        self.fragments.dedup();
        self.tags.sort();
        self.tags.dedup();
        self.shared.sort();
        self
    }
}

/// One fixed-capacity batch of entities sharing an archetype
pub struct Chunk {
    entities: Vec<Entity>,
    columns: FxHashMap<TypeId, Box<dyn Column>>,
    chunk_fragments: FxHashMap<TypeId, Box<dyn ChunkValue>>,
}

impl Chunk {
    fn from_templates(templates: &[(TypeInfo, Box<dyn Column>)], layout: Option<&Chunk>) -> Self {
        let mut chunk = Chunk {
            entities: Vec::new(),
            columns: templates
                .iter()
                .map(|(info, column)| (info.type_id, column.empty()))
                .collect(),
            chunk_fragments: FxHashMap::default(),
        };
        if let Some(layout) = layout {
            chunk.inherit_chunk_fragments(layout);
        }
        chunk
    }

    /// Copy every chunk fragment of `other` whose type this chunk lacks
    fn inherit_chunk_fragments(&mut self, other: &Chunk) {
        for (type_id, value) in &other.chunk_fragments {
            self.chunk_fragments
                .entry(*type_id)
                .or_insert_with(|| value.clone_value());
        }
    }

    /// Number of entities in the chunk
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the chunk holds no entities
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in row order
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Dense column of fragment `T`
    pub fn column<T: Fragment>(&self) -> Option<&[T]> {
        self.columns
            .get(&TypeId::of::<T>())
            .and_then(|c| c.as_any().downcast_ref::<Vec<T>>())
            .map(|v| v.as_slice())
    }

    /// Mutable dense column of fragment `T`
    pub fn column_mut<T: Fragment>(&mut self) -> Option<&mut [T]> {
        self.columns
            .get_mut(&TypeId::of::<T>())
            .and_then(|c| c.as_any_mut().downcast_mut::<Vec<T>>())
            .map(|v| v.as_mut_slice())
    }

    /// Fragment `T` of the entity at `row`
    pub fn get<T: Fragment>(&self, row: usize) -> Option<&T> {
        self.column::<T>().and_then(|c| c.get(row))
    }

    /// Mutable fragment `T` of the entity at `row`
    pub fn get_mut<T: Fragment>(&mut self, row: usize) -> Option<&mut T> {
        self.column_mut::<T>().and_then(|c| c.get_mut(row))
    }

    /// Chunk-scoped value of type `T`
    pub fn chunk_fragment<T: ChunkFragment>(&self) -> Option<&T> {
        self.chunk_fragments
            .get(&TypeId::of::<T>())
            .and_then(|v| v.as_any().downcast_ref::<T>())
    }

    /// Mutable chunk-scoped value of type `T`
    pub fn chunk_fragment_mut<T: ChunkFragment>(&mut self) -> Option<&mut T> {
        self.chunk_fragments
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.as_any_mut().downcast_mut::<T>())
    }

    /// Set the chunk-scoped value of type `T`
    pub fn set_chunk_fragment<T: ChunkFragment>(&mut self, value: T) {
        self.chunk_fragments.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Remove the chunk-scoped value of type `T`
    pub fn remove_chunk_fragment<T: ChunkFragment>(&mut self) -> Option<T> {
        let value = self.chunk_fragments.remove(&TypeId::of::<T>())?;
        value.into_any().downcast::<T>().ok().map(|v| *v)
    }

    pub(crate) fn has_column(&self, type_id: TypeId) -> bool {
        self.columns.contains_key(&type_id)
    }

    pub(crate) fn has_chunk_fragment(&self, type_id: TypeId) -> bool {
        self.chunk_fragments.contains_key(&type_id)
    }
}

/// All entities sharing one layout and one set of shared fragment values
pub struct Archetype {
    key: ArchetypeKey,
    templates: Vec<(TypeInfo, Box<dyn Column>)>,
    shared: SharedFragments,
    chunks: Vec<Chunk>,
}

impl Archetype {
    /// Whether the layout carries fragment `type_id`
    pub fn has_fragment(&self, type_id: TypeId) -> bool {
        self.key.fragments.binary_search(&type_id).is_ok()
    }

    /// Whether the layout carries tag `type_id`
    pub fn has_tag(&self, type_id: TypeId) -> bool {
        self.key.tags.binary_search(&type_id).is_ok()
    }

    /// Shared fragment values of this archetype
    pub fn shared(&self) -> &SharedFragments {
        &self.shared
    }

    /// The batches of this archetype
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Mutable batches of this archetype
    pub fn chunks_mut(&mut self) -> &mut [Chunk] {
        &mut self.chunks
    }

    /// Split borrow of the shared values and the batches
    pub fn split_mut(&mut self) -> (&SharedFragments, &mut [Chunk]) {
        (&self.shared, &mut self.chunks)
    }

    /// Number of entities across all chunks
    pub fn entity_count(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }

    fn chunk_with_space(&mut self, capacity: usize) -> usize {
        if let Some(index) = self.chunks.iter().position(|c| c.len() < capacity) {
            return index;
        }
        let chunk = Chunk::from_templates(&self.templates, self.chunks.last());
        self.chunks.push(chunk);
        self.chunks.len() - 1
    }
}

/// Type map of world-level services
#[derive(Default)]
pub struct Services {
    map: FxHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Services {
    /// Register or replace a service
    pub fn insert<T: Any + Send + Sync>(&mut self, service: T) {
        self.map.insert(TypeId::of::<T>(), Box::new(service));
    }

    /// Look up a service
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.map.get(&TypeId::of::<T>()).and_then(|s| s.downcast_ref::<T>())
    }

    /// Look up a service mutably
    pub fn get_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|s| s.downcast_mut::<T>())
    }

    /// Unregister a service, handing it back
    pub fn remove<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|s| s.downcast::<T>().ok())
            .map(|s| *s)
    }

    /// Whether a service of the given type is registered
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.map.contains_key(&type_id)
    }
}

/// A watched fragment that left its entity
pub struct Removed<T> {
    /// The entity that lost the fragment (possibly despawned)
    pub entity: Entity,
    /// The fragment value at removal time
    pub value: T,
    /// Shared values of the archetype the entity was in
    pub shared: SharedFragments,
}

struct RemovalRecord {
    entity: Entity,
    type_id: TypeId,
    value: Box<dyn Any + Send>,
    shared: SharedFragments,
}

/// Bundle of data for a new entity
#[derive(Default)]
pub struct EntityBuilder {
    fragments: Vec<Box<dyn ErasedFragment>>,
    tags: Vec<TypeInfo>,
    shared: Vec<SharedValue>,
}

impl EntityBuilder {
    /// Start an empty bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a fragment, replacing an earlier one of the same type
    pub fn with<T: Fragment>(mut self, value: T) -> Self {
        let type_id = TypeId::of::<T>();
        self.fragments.retain(|f| f.info().type_id != type_id);
        self.fragments.push(Box::new(FragmentValue(value)));
        self
    }

    /// Attach a tag
    pub fn with_tag<T: Tag>(mut self) -> Self {
        let info = TypeInfo::of::<T>();
        if !self.tags.contains(&info) {
            self.tags.push(info);
        }
        self
    }

    /// Attach a shared fragment value, replacing an earlier one of the same type
    pub fn with_shared<T: SharedFragment>(mut self, value: T) -> Self {
        let type_id = TypeId::of::<T>();
        self.shared.retain(|s| s.info.type_id != type_id);
        self.shared.push(SharedValue::new(value));
        self
    }
}

enum Change {
    Insert(Box<dyn ErasedFragment>),
    Remove(TypeInfo),
    AddTag(TypeInfo),
    RemoveTag(TypeInfo),
}

/// The main entity store
pub struct World {
    entities: EntitySlots<Location>,
    archetypes: Vec<Archetype>,
    archetype_index: FxHashMap<ArchetypeKey, usize>,
    chunk_capacity: usize,
    services: Services,
    watched: FxHashSet<TypeId>,
    removals: Vec<RemovalRecord>,
}

impl World {
    /// Create a new empty world
    pub fn new() -> Self {
        Self::with_chunk_capacity(DEFAULT_CHUNK_CAPACITY)
    }

    /// Create a world whose chunks hold at most `capacity` entities
    pub fn with_chunk_capacity(capacity: usize) -> Self {
        World {
            entities: EntitySlots::new(),
            archetypes: Vec::new(),
            archetype_index: FxHashMap::default(),
            chunk_capacity: capacity.max(1),
            services: Services::default(),
            watched: FxHashSet::default(),
            removals: Vec::new(),
        }
    }

    /// Maximum number of entities per chunk
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Create a new entity from a bundle
    pub fn spawn(&mut self, builder: EntityBuilder) -> Entity {
        let key = ArchetypeKey {
            fragments: builder.fragments.iter().map(|f| f.info().type_id).collect(),
            tags: builder.tags.iter().map(|t| t.type_id).collect(),
            shared: builder.shared.iter().map(|s| (s.info.type_id, s.key)).collect(),
        }
        .normalize();
        let templates = builder
            .fragments
            .iter()
            .map(|f| (f.info(), f.new_column()))
            .collect();
        let archetype = self.archetype_for(key, templates, SharedFragments::from_values(builder.shared));

        let capacity = self.chunk_capacity;
        let arch = &mut self.archetypes[archetype];
        let chunk_index = arch.chunk_with_space(capacity);
        let chunk = &mut arch.chunks[chunk_index];
        let entity = self.entities.allocate(Location {
            archetype,
            chunk: chunk_index,
            row: chunk.entities.len(),
        });
        for fragment in builder.fragments {
            let type_id = fragment.info().type_id;
            if let Some(column) = chunk.columns.get_mut(&type_id) {
                fragment.push_into(column.as_mut());
            }
        }
        chunk.entities.push(entity);
        entity
    }

    /// Destroy an entity
    ///
    /// This increments the generation counter to invalidate old references.
    /// Watched fragments are moved to the removal journal.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        let Some(loc) = self.location(entity) else {
            return false;
        };
        let watched = &self.watched;
        let removals = &mut self.removals;
        let arch = &mut self.archetypes[loc.archetype];
        let shared = arch.shared.clone();
        let chunk = &mut arch.chunks[loc.chunk];
        for (type_id, column) in chunk.columns.iter_mut() {
            if watched.contains(type_id) {
                removals.push(RemovalRecord {
                    entity,
                    type_id: *type_id,
                    value: column.take_row(loc.row),
                    shared: shared.clone(),
                });
            } else {
                column.drop_row(loc.row);
            }
        }
        chunk.entities.swap_remove(loc.row);
        let moved = chunk.entities.get(loc.row).copied();
        if let Some(moved) = moved {
            self.set_row(moved, loc.row);
        }

        self.entities.release(entity);
        true
    }

    /// Check if an entity is alive
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.location(entity).is_some()
    }

    /// Get the number of alive entities
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Iterate over all alive entities
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.archetypes
            .iter()
            .flat_map(|a| a.chunks.iter())
            .flat_map(|c| c.entities.iter().copied())
    }

    /// Fragment `T` of an entity
    pub fn get<T: Fragment>(&self, entity: Entity) -> Option<&T> {
        let loc = self.location(entity)?;
        self.archetypes[loc.archetype].chunks[loc.chunk].get::<T>(loc.row)
    }

    /// Mutable fragment `T` of an entity
    pub fn get_mut<T: Fragment>(&mut self, entity: Entity) -> Option<&mut T> {
        let loc = self.location(entity)?;
        self.archetypes[loc.archetype].chunks[loc.chunk].get_mut::<T>(loc.row)
    }

    /// Whether the entity carries tag `T`
    pub fn has_tag<T: Tag>(&self, entity: Entity) -> bool {
        self.location(entity)
            .map(|loc| self.archetypes[loc.archetype].has_tag(TypeId::of::<T>()))
            .unwrap_or(false)
    }

    /// Shared fragment `T` of the entity's archetype
    pub fn shared<T: SharedFragment>(&self, entity: Entity) -> Option<&T> {
        let loc = self.location(entity)?;
        self.archetypes[loc.archetype].shared.get::<T>()
    }

    /// Chunk-scoped value `T` of the batch the entity lives in
    pub fn chunk_fragment<T: ChunkFragment>(&self, entity: Entity) -> Option<&T> {
        let loc = self.location(entity)?;
        self.archetypes[loc.archetype].chunks[loc.chunk].chunk_fragment::<T>()
    }

    /// Set the chunk-scoped value `T` of the batch the entity lives in
    pub fn set_chunk_fragment<T: ChunkFragment>(&mut self, entity: Entity, value: T) -> bool {
        match self.location(entity) {
            Some(loc) => {
                self.archetypes[loc.archetype].chunks[loc.chunk].set_chunk_fragment(value);
                true
            }
            None => false,
        }
    }

    /// Remove the chunk-scoped value `T` from the batch the entity lives in
    pub fn remove_chunk_fragment<T: ChunkFragment>(&mut self, entity: Entity) -> Option<T> {
        let loc = self.location(entity)?;
        self.archetypes[loc.archetype].chunks[loc.chunk].remove_chunk_fragment::<T>()
    }

    /// Insert or overwrite a fragment immediately
    pub fn insert<T: Fragment>(&mut self, entity: Entity, value: T) -> bool {
        self.apply_change(entity, Change::Insert(Box::new(FragmentValue(value))))
    }

    /// Remove a fragment immediately
    pub fn remove<T: Fragment>(&mut self, entity: Entity) -> bool {
        self.apply_change(entity, Change::Remove(TypeInfo::of::<T>()))
    }

    /// Add a tag immediately
    pub fn add_tag<T: Tag>(&mut self, entity: Entity) -> bool {
        self.apply_change(entity, Change::AddTag(TypeInfo::of::<T>()))
    }

    /// Remove a tag immediately
    pub fn remove_tag<T: Tag>(&mut self, entity: Entity) -> bool {
        self.apply_change(entity, Change::RemoveTag(TypeInfo::of::<T>()))
    }

    /// Apply every command of the buffer in recording order
    pub fn apply_commands(&mut self, commands: &mut CommandBuffer) {
        for command in commands.drain() {
            match command {
                Command::Despawn { entity } => {
                    self.despawn(entity);
                }
                Command::Insert { entity, value } => {
                    self.apply_change(entity, Change::Insert(value));
                }
                Command::Remove { entity, fragment } => {
                    self.apply_change(entity, Change::Remove(fragment));
                }
                Command::AddTag { entity, tag } => {
                    self.apply_change(entity, Change::AddTag(tag));
                }
                Command::RemoveTag { entity, tag } => {
                    self.apply_change(entity, Change::RemoveTag(tag));
                }
            }
        }
    }

    /// World-level services
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Mutable world-level services
    pub fn services_mut(&mut self) -> &mut Services {
        &mut self.services
    }

    /// Register or replace a service
    pub fn insert_service<T: Any + Send + Sync>(&mut self, service: T) {
        self.services.insert(service);
    }

    /// Unregister a service
    pub fn remove_service<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.services.remove::<T>()
    }

    /// Record removals of fragment `T` in the removal journal
    pub fn watch_removals<T: Fragment>(&mut self) {
        self.watched.insert(TypeId::of::<T>());
    }

    /// Take all journaled removals of fragment `T`
    pub fn drain_removals<T: Fragment>(&mut self) -> Vec<Removed<T>> {
        let type_id = TypeId::of::<T>();
        let (matching, rest): (Vec<_>, Vec<_>) = self
            .removals
            .drain(..)
            .partition(|r| r.type_id == type_id);
        self.removals = rest;
        matching
            .into_iter()
            .filter_map(|r| {
                let entity = r.entity;
                let shared = r.shared;
                r.value.downcast::<T>().ok().map(|value| Removed {
                    entity,
                    value: *value,
                    shared,
                })
            })
            .collect()
    }

    /// Number of journaled removals waiting to be drained
    pub fn pending_removals(&self) -> usize {
        self.removals.len()
    }

    /// Visit every non-empty batch matching `requirements`
    pub fn for_each_batch<F>(&mut self, requirements: &Requirements, mut f: F)
    where
        F: FnMut(&SharedFragments, &mut Chunk, &Services),
    {
        let services = &self.services;
        for archetype in self.archetypes.iter_mut() {
            if !requirements.matches(archetype) {
                continue;
            }
            let (shared, chunks) = archetype.split_mut();
            for chunk in chunks.iter_mut().filter(|c| !c.is_empty()) {
                f(shared, chunk, services);
            }
        }
    }

    /// Visit every non-empty batch matching `requirements` on the rayon pool
    ///
    /// Each batch is handed to exactly one worker.
    #[cfg(feature = "parallel")]
    pub fn for_each_batch_parallel<F>(&mut self, requirements: &Requirements, f: F)
    where
        F: Fn(&SharedFragments, &mut Chunk, &Services) + Send + Sync,
    {
        use rayon::prelude::*;

        let services = &self.services;
        let mut batches: Vec<(&SharedFragments, &mut Chunk)> = Vec::new();
        for archetype in self.archetypes.iter_mut() {
            if !requirements.matches(archetype) {
                continue;
            }
            let (shared, chunks) = archetype.split_mut();
            batches.extend(chunks.iter_mut().filter(|c| !c.is_empty()).map(|c| (shared, c)));
        }
        batches
            .into_par_iter()
            .for_each(|(shared, chunk)| f(shared, chunk, services));
    }

    pub(crate) fn location(&self, entity: Entity) -> Option<Location> {
        self.entities.get(entity).copied()
    }

    pub(crate) fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub(crate) fn batches_mut(&mut self) -> (&mut [Archetype], &Services) {
        (&mut self.archetypes, &self.services)
    }

    fn set_row(&mut self, entity: Entity, row: usize) {
        if let Some(loc) = self.entities.get_mut(entity) {
            loc.row = row;
        }
    }

    fn archetype_for(
        &mut self,
        key: ArchetypeKey,
        templates: Vec<(TypeInfo, Box<dyn Column>)>,
        shared: SharedFragments,
    ) -> usize {
        if let Some(&index) = self.archetype_index.get(&key) {
            return index;
        }
        let index = self.archetypes.len();
        self.archetype_index.insert(key.clone(), index);
        self.archetypes.push(Archetype {
            key,
            templates,
            shared,
            chunks: Vec::new(),
        });
        index
    }

    fn apply_change(&mut self, entity: Entity, change: Change) -> bool {
        let Some(src) = self.location(entity) else {
            return false;
        };

        let mut key = self.archetypes[src.archetype].key.clone();
        let mut inserted = None;
        let mut removed_fragment = None;
        match change {
            Change::Insert(value) => {
                let type_id = value.info().type_id;
                if key.fragments.contains(&type_id) {
                    // Overwrite in place: append, then swap the new value into the row.
                    let chunk = &mut self.archetypes[src.archetype].chunks[src.chunk];
                    if let Some(column) = chunk.columns.get_mut(&type_id) {
                        value.push_into(column.as_mut());
                        column.drop_row(src.row);
                    }
                    return true;
                }
                key.fragments.push(type_id);
                inserted = Some(value);
            }
            Change::Remove(info) => {
                if !key.fragments.contains(&info.type_id) {
                    return false;
                }
                key.fragments.retain(|t| *t != info.type_id);
                removed_fragment = Some(info.type_id);
            }
            Change::AddTag(info) => {
                if key.tags.contains(&info.type_id) {
                    return true;
                }
                key.tags.push(info.type_id);
            }
            Change::RemoveTag(info) => {
                if !key.tags.contains(&info.type_id) {
                    return false;
                }
                key.tags.retain(|t| *t != info.type_id);
            }
        }
        let key = key.normalize();

        let source = &self.archetypes[src.archetype];
        let mut templates: Vec<(TypeInfo, Box<dyn Column>)> = source
            .templates
            .iter()
            .filter(|(info, _)| Some(info.type_id) != removed_fragment)
            .map(|(info, column)| (*info, column.empty()))
            .collect();
        if let Some(value) = &inserted {
            templates.push((value.info(), value.new_column()));
        }
        let shared = source.shared.clone();
        let dst_archetype = self.archetype_for(key, templates, shared);

        let capacity = self.chunk_capacity;
        let watched = &self.watched;
        let removals = &mut self.removals;
        let (source, target) = pair_mut(&mut self.archetypes, src.archetype, dst_archetype);
        let dst_chunk_index = target.chunk_with_space(capacity);
        let dst_chunk = &mut target.chunks[dst_chunk_index];
        let src_chunk = &mut source.chunks[src.chunk];
        dst_chunk.inherit_chunk_fragments(src_chunk);

        for (type_id, column) in src_chunk.columns.iter_mut() {
            match dst_chunk.columns.get_mut(type_id) {
                Some(dst_column) => column.move_row(src.row, dst_column.as_mut()),
                None if watched.contains(type_id) => removals.push(RemovalRecord {
                    entity,
                    type_id: *type_id,
                    value: column.take_row(src.row),
                    shared: source.shared.clone(),
                }),
                None => column.drop_row(src.row),
            }
        }
        if let Some(value) = inserted {
            let type_id = value.info().type_id;
            if let Some(column) = dst_chunk.columns.get_mut(&type_id) {
                value.push_into(column.as_mut());
            }
        }

        src_chunk.entities.swap_remove(src.row);
        let moved = src_chunk.entities.get(src.row).copied();
        dst_chunk.entities.push(entity);
        let dst_row = dst_chunk.entities.len() - 1;

        if let Some(moved) = moved {
            self.set_row(moved, src.row);
        }
        if let Some(loc) = self.entities.get_mut(entity) {
            *loc = Location {
                archetype: dst_archetype,
                chunk: dst_chunk_index,
                row: dst_row,
            };
        }
        true
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
