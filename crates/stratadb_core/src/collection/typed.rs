use super::{ChangeSet, LiveCollection};
use crate::error::CoreResult;
use crate::notify::ListenerToken;
use crate::object::{AsObject, FromObject, Object};
use std::fmt;
use std::marker::PhantomData;
use stratadb_engine::Value;

/// A typed view of a live collection.
///
/// Table, query and back-link collections are read-only. Link-list
/// collections can be edited inside a write scope; on an unmanaged
/// object they edit the in-memory list directly.
pub struct Collection<T> {
    live: LiveCollection,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            live: self.live.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: FromObject + AsObject> Collection<T> {
    pub(crate) fn new(live: LiveCollection) -> Self {
        Self {
            live,
            _marker: PhantomData,
        }
    }

    /// Returns the element class name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        self.live.class_name()
    }

    /// Returns true if the collection is backed by the store.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.live.is_managed()
    }

    /// Returns false once the owning object of a link-list or back-link
    /// collection is deleted, or the realm is closed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.live.is_valid()
    }

    /// Returns the number of elements.
    pub fn len(&self) -> CoreResult<usize> {
        self.live.len()
    }

    /// Returns true if the collection has no elements.
    pub fn is_empty(&self) -> CoreResult<bool> {
        self.len().map(|n| n == 0)
    }

    /// Returns the element at `index`.
    ///
    /// # Errors
    ///
    /// `IndexOutOfBounds` if `index >= len`.
    pub fn get(&self, index: usize) -> CoreResult<T> {
        self.live.get(index).map(T::from_object)
    }

    /// Returns the first element.
    pub fn first(&self) -> CoreResult<Option<T>> {
        Ok(self.live.objects()?.into_iter().next().map(T::from_object))
    }

    /// Returns the last element.
    pub fn last(&self) -> CoreResult<Option<T>> {
        Ok(self.live.objects()?.pop().map(T::from_object))
    }

    /// Returns the current elements as a plain vector.
    ///
    /// The vector does not change when the collection does.
    pub fn snapshot(&self) -> CoreResult<Vec<T>> {
        Ok(self.live.objects()?.into_iter().map(T::from_object).collect())
    }

    /// Iterates over a snapshot of the current elements.
    pub fn iter(&self) -> CoreResult<impl Iterator<Item = T>> {
        Ok(self.snapshot()?.into_iter())
    }

    /// Returns true if `item` is an element.
    pub fn contains(&self, item: &T) -> CoreResult<bool> {
        self.index_of(item).map(|i| i.is_some())
    }

    /// Returns the index of the first occurrence of `item`.
    pub fn index_of(&self, item: &T) -> CoreResult<Option<usize>> {
        self.live.index_of(item.as_object())
    }

    /// Smallest non-null value of a numeric or timestamp field.
    pub fn min(&self, field: &str) -> CoreResult<Option<Value>> {
        self.live.min(field)
    }

    /// Largest non-null value of a numeric or timestamp field.
    pub fn max(&self, field: &str) -> CoreResult<Option<Value>> {
        self.live.max(field)
    }

    /// Sum of a numeric field; nulls are skipped.
    pub fn sum(&self, field: &str) -> CoreResult<Value> {
        self.live.sum(field)
    }

    /// Mean of a numeric field; `None` if there are no non-null values.
    pub fn average(&self, field: &str) -> CoreResult<Option<f64>> {
        self.live.average(field)
    }

    /// Appends an element. Unmanaged elements are copied into the realm.
    pub fn add(&self, item: &T) -> CoreResult<()> {
        self.live.add(item.as_object())
    }

    /// Inserts an element at `index`.
    pub fn insert(&self, index: usize, item: &T) -> CoreResult<()> {
        self.live.insert(index, item.as_object())
    }

    /// Replaces the element at `index` and returns the previous one.
    pub fn set(&self, index: usize, item: &T) -> CoreResult<T> {
        self.live.set(index, item.as_object()).map(T::from_object)
    }

    /// Removes the element at `index` from the list. The row is kept.
    pub fn remove(&self, index: usize) -> CoreResult<T> {
        self.live.remove(index).map(T::from_object)
    }

    /// Removes the first occurrence of `item`; returns whether one was found.
    pub fn remove_object(&self, item: &T) -> CoreResult<bool> {
        self.live.remove_object(item.as_object())
    }

    /// Removes every element from the list. The rows are kept.
    pub fn clear(&self) -> CoreResult<()> {
        self.live.clear()
    }

    /// Moves the element at `from` to `to`.
    pub fn move_item(&self, from: usize, to: usize) -> CoreResult<()> {
        self.live.move_item(from, to)
    }

    /// Deletes every element's row from the realm.
    ///
    /// # Errors
    ///
    /// `WriteScopeRequired` outside a write scope.
    pub fn delete_all(&self) -> CoreResult<()> {
        self.live.delete_all()
    }

    /// Registers a listener for changes to this collection.
    ///
    /// The current contents become the baseline; the listener is first
    /// called on the next notification pass that changes the collection.
    pub fn add_listener<F>(&self, listener: F) -> CoreResult<ListenerToken>
    where
        F: FnMut(&ChangeSet) + Send + 'static,
    {
        self.live.add_listener(Box::new(listener))
    }

    /// Returns an untyped view of the same collection.
    #[must_use]
    pub fn objects(&self) -> Collection<Object> {
        Collection::new(self.live.clone())
    }
}

impl<T> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("class", &self.live.class_name())
            .field("managed", &self.live.is_managed())
            .finish()
    }
}

impl<T> PartialEq for Collection<T> {
    fn eq(&self, other: &Self) -> bool {
        self.live == other.live
    }
}
