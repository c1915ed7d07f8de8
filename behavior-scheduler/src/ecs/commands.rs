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
//! Deferred structural commands
//!
//! Structural changes (adding a tag, inserting or removing a fragment,
//! despawning) move entities between batches. Doing that while a controller
//! walks a batch would invalidate the rows it is iterating, so controllers
//! record commands into a [`CommandBuffer`] and the world applies
//! them with [`World::apply_commands`](crate::ecs::World::apply_commands)
//! once the iteration is over.
//!
//! Commands are applied in the order they were recorded. Commands that target
//! an entity which no longer exists are dropped.

use crate::ecs::fragment::{ErasedFragment, Fragment, FragmentValue, Tag, TypeInfo};
use crate::ecs::Entity;

/// A recorded structural change
pub(crate) enum Command {
    /// Remove the entity and all of its data
    Despawn {
        /// Entity to remove
        entity: Entity,
    },
    /// Insert (or overwrite) a fragment
    Insert {
        /// Target entity
        entity: Entity,
        /// The fragment value, type erased
        value: Box<dyn ErasedFragment>,
    },
    /// Remove a fragment
    Remove {
        /// Target entity
        entity: Entity,
        /// Fragment type to remove
        fragment: TypeInfo,
    },
    /// Add a structural tag
    AddTag {
        /// Target entity
        entity: Entity,
        /// Tag type to add
        tag: TypeInfo,
    },
    /// Remove a structural tag
    RemoveTag {
        /// Target entity
        entity: Entity,
        /// Tag type to remove
        tag: TypeInfo,
    },
}

impl Command {
    /// Entity the command applies to
    pub(crate) fn entity(&self) -> Entity {
        match self {
            Command::Despawn { entity }
            | Command::Insert { entity, .. }
            | Command::Remove { entity, .. }
            | Command::AddTag { entity, .. }
            | Command::RemoveTag { entity, .. } => *entity,
        }
    }
}

/// Append-only queue of structural commands
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        CommandBuffer {
            commands: Vec::new(),
        }
    }

    /// Queue a despawn
    pub fn despawn(&mut self, entity: Entity) {
        self.commands.push(Command::Despawn { entity });
    }

    /// Queue a fragment insertion
    pub fn insert<T: Fragment>(&mut self, entity: Entity, value: T) {
        self.commands.push(Command::Insert {
            entity,
            value: Box::new(FragmentValue(value)),
        });
    }

    /// Queue a fragment removal
    pub fn remove<T: Fragment>(&mut self, entity: Entity) {
        self.commands.push(Command::Remove {
            entity,
            fragment: TypeInfo::of::<T>(),
        });
    }

    /// Queue adding tag `T`
    pub fn add_tag<T: Tag>(&mut self, entity: Entity) {
        self.commands.push(Command::AddTag {
            entity,
            tag: TypeInfo::of::<T>(),
        });
    }

    /// Queue removing tag `T`
    pub fn remove_tag<T: Tag>(&mut self, entity: Entity) {
        self.commands.push(Command::RemoveTag {
            entity,
            tag: TypeInfo::of::<T>(),
        });
    }

    /// Move every command of `other` to the end of this buffer
    pub fn append(&mut self, other: &mut CommandBuffer) {
        self.commands.append(&mut other.commands);
    }

    /// Number of queued commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Take all queued commands in recording order
    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, Command> {
        self.commands.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;
    impl Tag for Marker {}

    struct Hunger(f32);
    impl Fragment for Hunger {}

    #[test]
    fn test_commands_keep_recording_order() {
        let mut buffer = CommandBuffer::new();
        let a = Entity::new(0, 0);
        let b = Entity::new(1, 0);

        buffer.add_tag::<Marker>(a);
        buffer.insert(b, Hunger(0.5));
        buffer.despawn(a);

        let order: Vec<Entity> = buffer.drain().map(|c| c.entity()).collect();
        assert_eq!(order, vec![a, b, a]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_append_moves_commands() {
        let mut first = CommandBuffer::new();
        let mut second = CommandBuffer::new();
        second.remove::<Hunger>(Entity::new(3, 1));
        second.remove_tag::<Marker>(Entity::new(3, 1));

        first.append(&mut second);

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
    }
}
