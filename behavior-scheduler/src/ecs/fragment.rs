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
//! Fragment kinds and type-erased column storage
//!
//! The store distinguishes four kinds of attached data:
//!
//! - [`Fragment`]: per-entity plain data, stored in one dense column per type
//!   inside every batch.
//! - [`Tag`]: zero-data structural markers. They only change which batch an
//!   entity lives in.
//! - [`ChunkFragment`]: one value per batch, e.g. an importance tier computed
//!   for the whole batch. Chunk fragments are part of the batch layout: a new
//!   batch starts with copies of the values of the batch it was split from.
//! - [`SharedFragment`]: one value per archetype, shared by every entity with
//!   the same layout. Two entities with different shared values never share a
//!   batch.

use std::any::{Any, TypeId};
use std::sync::Arc;

/// Per-entity plain data
pub trait Fragment: 'static + Send + Sync {}

/// Zero-data structural marker
pub trait Tag: 'static + Send + Sync {}

/// Data stored once per batch
pub trait ChunkFragment: Clone + 'static + Send + Sync {}

/// Data stored once per archetype and shared by all of its entities
pub trait SharedFragment: 'static + Send + Sync {
    /// Identity used to decide whether two values describe the same archetype
    fn shared_key(&self) -> u64;
}

/// Type identity paired with a readable name for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    /// Rust type identity
    pub type_id: TypeId,
    /// `std::any::type_name` of the type
    pub name: &'static str,
}

impl TypeInfo {
    /// Describe `T`
    pub fn of<T: 'static>() -> Self {
        TypeInfo {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

/// A dense, type-erased column of one fragment type
pub(crate) trait Column: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// A new, empty column of the same type
    fn empty(&self) -> Box<dyn Column>;
    fn len(&self) -> usize;
    /// Swap-remove `row` and append the value to `dst`
    fn move_row(&mut self, row: usize, dst: &mut dyn Column);
    /// Swap-remove `row` and hand the value back boxed
    fn take_row(&mut self, row: usize) -> Box<dyn Any + Send>;
    /// Swap-remove `row` and drop the value
    fn drop_row(&mut self, row: usize);
}

impl<T: Fragment> Column for Vec<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn empty(&self) -> Box<dyn Column> {
        Box::new(Vec::<T>::new())
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn move_row(&mut self, row: usize, dst: &mut dyn Column) {
        let value = self.swap_remove(row);
        if let Some(dst) = dst.as_any_mut().downcast_mut::<Vec<T>>() {
            dst.push(value);
        }
    }

    fn take_row(&mut self, row: usize) -> Box<dyn Any + Send> {
        Box::new(self.swap_remove(row))
    }

    fn drop_row(&mut self, row: usize) {
        self.swap_remove(row);
    }
}

/// A type-erased chunk fragment value
pub(crate) trait ChunkValue: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_value(&self) -> Box<dyn ChunkValue>;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

impl<T: ChunkFragment> ChunkValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_value(&self) -> Box<dyn ChunkValue> {
        Box::new(self.clone())
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}

/// A fragment value whose concrete type has been erased, used by deferred
/// commands and entity builders
pub(crate) trait ErasedFragment: Send {
    fn info(&self) -> TypeInfo;
    fn new_column(&self) -> Box<dyn Column>;
    fn push_into(self: Box<Self>, column: &mut dyn Column);
}

pub(crate) struct FragmentValue<T: Fragment>(pub(crate) T);

impl<T: Fragment> ErasedFragment for FragmentValue<T> {
    fn info(&self) -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn new_column(&self) -> Box<dyn Column> {
        Box::new(Vec::<T>::new())
    }

    fn push_into(self: Box<Self>, column: &mut dyn Column) {
        if let Some(column) = column.as_any_mut().downcast_mut::<Vec<T>>() {
            column.push(self.0);
        }
    }
}

/// A shared fragment value as stored on an archetype
#[derive(Clone)]
pub(crate) struct SharedValue {
    pub(crate) info: TypeInfo,
    pub(crate) key: u64,
    pub(crate) value: Arc<dyn Any + Send + Sync>,
}

impl SharedValue {
    pub(crate) fn new<T: SharedFragment>(value: T) -> Self {
        SharedValue {
            info: TypeInfo::of::<T>(),
            key: value.shared_key(),
            value: Arc::new(value),
        }
    }
}

/// The shared fragments of one archetype
#[derive(Clone, Default)]
pub struct SharedFragments {
    values: Vec<SharedValue>,
}

impl SharedFragments {
    pub(crate) fn from_values(mut values: Vec<SharedValue>) -> Self {
        values.sort_by_key(|v| v.info.type_id);
        SharedFragments { values }
    }

    /// Look up the shared value of type `T`
    pub fn get<T: SharedFragment>(&self) -> Option<&T> {
        let type_id = TypeId::of::<T>();
        self.values
            .iter()
            .find(|v| v.info.type_id == type_id)
            .and_then(|v| v.value.downcast_ref::<T>())
    }

    /// Whether a shared value of the given type is present
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.values.iter().any(|v| v.info.type_id == type_id)
    }

    /// Number of shared values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no shared values are attached
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health(u32);
    impl Fragment for Health {}

    struct Archetypal(u64);
    impl SharedFragment for Archetypal {
        fn shared_key(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn test_column_move_row_swaps_last_into_place() {
        let mut src: Vec<Health> = vec![Health(1), Health(2), Health(3)];
        let mut dst: Box<dyn Column> = src.empty();

        src.move_row(0, dst.as_mut());

        assert_eq!(src, vec![Health(3), Health(2)]);
        let dst = dst.as_any().downcast_ref::<Vec<Health>>().unwrap();
        assert_eq!(dst, &vec![Health(1)]);
    }

    #[test]
    fn test_column_take_row_returns_value() {
        let mut column: Vec<Health> = vec![Health(5), Health(6)];
        let taken = column.take_row(1);
        assert_eq!(taken.downcast_ref::<Health>(), Some(&Health(6)));
        assert_eq!(Column::len(&column), 1);
    }

    #[test]
    fn test_erased_fragment_pushes_into_matching_column() {
        let value: Box<dyn ErasedFragment> = Box::new(FragmentValue(Health(9)));
        let mut column = value.new_column();
        assert_eq!(value.info(), TypeInfo::of::<Health>());
        value.push_into(column.as_mut());
        assert_eq!(column.len(), 1);
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Weather(&'static str);
    impl ChunkFragment for Weather {}

    #[test]
    fn test_chunk_value_clones_independently() {
        let mut original: Box<dyn ChunkValue> = Box::new(Weather("rain"));
        let copy = original.clone_value();
        if let Some(weather) = original.as_any_mut().downcast_mut::<Weather>() {
            weather.0 = "sun";
        }
        assert_eq!(copy.as_any().downcast_ref::<Weather>(), Some(&Weather("rain")));
        assert_eq!(original.as_any().downcast_ref::<Weather>(), Some(&Weather("sun")));
    }

    #[test]
    fn test_shared_fragments_lookup() {
        let shared = SharedFragments::from_values(vec![SharedValue::new(Archetypal(11))]);
        assert_eq!(shared.get::<Archetypal>().map(|a| a.0), Some(11));
        assert!(shared.contains(TypeId::of::<Archetypal>()));
        assert_eq!(shared.len(), 1);
    }
}
