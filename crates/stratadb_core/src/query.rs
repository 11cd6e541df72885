//! Query builder over one class.
//!
//! Predicates are opaque closures handed to the engine's row scan; the
//! builder only resolves field names and combines them. Results are live
//! collections, re-evaluated whenever the realm moves.

use crate::collection::{Collection, LiveCollection, Predicate};
use crate::error::{CoreError, CoreResult};
use crate::object::{AsObject, FromObject};
use crate::realm::{ClassBinding, Realm};
use crate::value::FieldValue;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use stratadb_engine::{RowKey, RowView, SortOrder, SortSpec, Value};

/// One row as seen by a query predicate, addressed by field name.
#[derive(Debug, Clone, Copy)]
pub struct QueryRow<'a> {
    view: &'a RowView<'a>,
}

impl<'a> QueryRow<'a> {
    /// Returns the row key.
    #[must_use]
    pub fn key(&self) -> RowKey {
        self.view.key()
    }

    /// Returns a stored field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.view.get_named(field)
    }

    /// Returns an integer field.
    #[must_use]
    pub fn int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_int)
    }

    /// Returns a numeric field widened to `f64`.
    #[must_use]
    pub fn double(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    /// Returns a string field.
    #[must_use]
    pub fn string(&self, field: &str) -> Option<&'a str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Returns a boolean field.
    #[must_use]
    pub fn bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    /// Returns true if the field is null or not stored.
    #[must_use]
    pub fn is_null(&self, field: &str) -> bool {
        self.get(field).map_or(true, Value::is_null)
    }
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Double(_) | Value::Float(_))
}

/// Orders a stored value against an operand. `None` when either is null or
/// the two are not comparable.
fn compare(stored: &Value, operand: &Value) -> Option<Ordering> {
    if stored.is_null() || operand.is_null() {
        return None;
    }
    if is_number(stored) && is_number(operand) {
        return Some(stored.sort_cmp(operand));
    }
    match (stored, operand) {
        (Value::String(_), Value::String(_))
        | (Value::Bool(_), Value::Bool(_))
        | (Value::Binary(_), Value::Binary(_))
        | (Value::Timestamp(_), Value::Timestamp(_)) => Some(stored.sort_cmp(operand)),
        _ => None,
    }
}

/// A query over the objects of one class.
///
/// ```rust,ignore
/// let adults = realm
///     .query::<Person>()?
///     .greater_than("age", 20_i64)
///     .sort("name", SortOrder::Ascending)
///     .find_all()?;
/// ```
///
/// Unknown field names are reported by [`Query::find_all`].
pub struct Query<T> {
    realm: Realm,
    binding: Arc<ClassBinding>,
    predicates: Vec<Predicate>,
    sort: SortSpec,
    /// First unknown field named by a step.
    unknown_field: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromObject + AsObject> Query<T> {
    pub(crate) fn new(realm: Realm, binding: Arc<ClassBinding>) -> Self {
        Self {
            realm,
            binding,
            predicates: Vec::new(),
            sort: SortSpec::new(),
            unknown_field: None,
            _marker: PhantomData,
        }
    }

    fn column(&mut self, field: &str) -> Option<usize> {
        let column = self.binding.column_of(field);
        if column.is_none() && self.unknown_field.is_none() {
            self.unknown_field = Some(field.to_string());
        }
        column
    }

    fn compare_with(mut self, field: &str, operand: Value, accept: fn(Ordering) -> bool) -> Self {
        if let Some(column) = self.column(field) {
            self.predicates.push(Arc::new(move |row: &RowView<'_>| {
                row.get(column)
                    .and_then(|stored| compare(stored, &operand))
                    .is_some_and(accept)
            }));
        }
        self
    }

    /// Keeps rows for which `predicate` returns true.
    #[must_use]
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&QueryRow<'_>) -> bool + Send + Sync + 'static,
    {
        self.predicates
            .push(Arc::new(move |view: &RowView<'_>| predicate(&QueryRow { view })));
        self
    }

    /// Keeps rows whose field equals `value`. Integers and floats compare
    /// numerically; a null operand matches null fields.
    #[must_use]
    pub fn equal_to(mut self, field: &str, value: impl FieldValue) -> Self {
        let operand = value.into_value();
        if let Some(column) = self.column(field) {
            self.predicates.push(Arc::new(move |row: &RowView<'_>| {
                row.get(column).is_some_and(|stored| {
                    *stored == operand || compare(stored, &operand) == Some(Ordering::Equal)
                })
            }));
        }
        self
    }

    /// Keeps rows whose field differs from `value`.
    #[must_use]
    pub fn not_equal_to(mut self, field: &str, value: impl FieldValue) -> Self {
        let operand = value.into_value();
        if let Some(column) = self.column(field) {
            self.predicates.push(Arc::new(move |row: &RowView<'_>| {
                row.get(column).is_some_and(|stored| {
                    *stored != operand && compare(stored, &operand) != Some(Ordering::Equal)
                })
            }));
        }
        self
    }

    /// Keeps rows whose field is greater than `value`. Nulls never match.
    #[must_use]
    pub fn greater_than(self, field: &str, value: impl FieldValue) -> Self {
        self.compare_with(field, value.into_value(), Ordering::is_gt)
    }

    /// Keeps rows whose field is at least `value`.
    #[must_use]
    pub fn greater_than_or_equal(self, field: &str, value: impl FieldValue) -> Self {
        self.compare_with(field, value.into_value(), Ordering::is_ge)
    }

    /// Keeps rows whose field is less than `value`. Nulls never match.
    #[must_use]
    pub fn less_than(self, field: &str, value: impl FieldValue) -> Self {
        self.compare_with(field, value.into_value(), Ordering::is_lt)
    }

    /// Keeps rows whose field is at most `value`.
    #[must_use]
    pub fn less_than_or_equal(self, field: &str, value: impl FieldValue) -> Self {
        self.compare_with(field, value.into_value(), Ordering::is_le)
    }

    /// Keeps rows whose field is null.
    #[must_use]
    pub fn is_null(mut self, field: &str) -> Self {
        if let Some(column) = self.column(field) {
            self.predicates
                .push(Arc::new(move |row: &RowView<'_>| row.get(column).map_or(true, Value::is_null)));
        }
        self
    }

    /// Keeps rows whose string field contains `needle`.
    #[must_use]
    pub fn contains(mut self, field: &str, needle: &str) -> Self {
        let needle = needle.to_string();
        if let Some(column) = self.column(field) {
            self.predicates.push(Arc::new(move |row: &RowView<'_>| {
                row.get(column)
                    .and_then(Value::as_str)
                    .is_some_and(|s| s.contains(needle.as_str()))
            }));
        }
        self
    }

    /// Orders results by `field`; later calls break ties of earlier ones.
    ///
    /// Sorted results report moves in their change sets.
    #[must_use]
    pub fn sort(mut self, field: &str, order: SortOrder) -> Self {
        if let Some(column) = self.column(field) {
            self.sort = std::mem::take(&mut self.sort).then_by(column, order);
        }
        self
    }

    /// Returns the matching objects as a live, read-only collection.
    ///
    /// # Errors
    ///
    /// `FieldNotFound` if any step named an unknown field.
    pub fn find_all(&self) -> CoreResult<Collection<T>> {
        self.realm.check()?;
        if let Some(field) = &self.unknown_field {
            return Err(CoreError::field_not_found(self.binding.info.name(), field));
        }
        let predicates = self.predicates.clone();
        let predicate: Predicate = Arc::new(move |row: &RowView<'_>| predicates.iter().all(|p| p(row)));
        let sort = (!self.sort.is_empty()).then(|| self.sort.clone());
        Ok(Collection::new(LiveCollection::query(
            self.realm.clone(),
            Arc::clone(&self.binding),
            predicate,
            sort,
        )))
    }

    /// Returns the first matching object.
    pub fn find_first(&self) -> CoreResult<Option<T>> {
        self.find_all()?.first()
    }

    /// Returns the number of matching objects.
    pub fn count(&self) -> CoreResult<usize> {
        self.find_all()?.len()
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("class", &self.binding.info.name())
            .field("predicates", &self.predicates.len())
            .field("sort", &self.sort)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::object::Object;
    use crate::schema::{ClassDescriptor, FieldDescriptor, FieldType};
    use stratadb_engine::Engine;

    fn realm() -> Realm {
        let realm = Realm::open(
            &Engine::in_memory(),
            Config::new().class(
                ClassDescriptor::new("Person")
                    .field(FieldDescriptor::new("name", FieldType::String))
                    .field(FieldDescriptor::new("age", FieldType::Integer))
                    .field(FieldDescriptor::new("score", FieldType::Double).nullable(true)),
            ),
        )
        .unwrap();
        realm
            .write(|r| {
                for (name, age, score) in [("Ann", 30, Some(1.5)), ("Bob", 17, None), ("Cid", 45, Some(3.0))] {
                    let p = r.create_object_dynamic("Person", None)?;
                    p.set("name", name.to_string())?;
                    p.set("age", i64::from(age))?;
                    p.set("score", score)?;
                }
                Ok(())
            })
            .unwrap();
        realm
    }

    fn names(people: &Collection<Object>) -> Vec<String> {
        people
            .iter()
            .unwrap()
            .map(|p| p.get::<String>("name").unwrap())
            .collect()
    }

    #[test]
    fn comparisons_skip_nulls() {
        let realm = realm();
        let q = realm.query_dynamic("Person").unwrap();
        assert_eq!(q.greater_than("age", 20_i64).count().unwrap(), 2);
        let q = realm.query_dynamic("Person").unwrap();
        assert_eq!(q.less_than("score", 2.0_f64).count().unwrap(), 1);
        let q = realm.query_dynamic("Person").unwrap();
        assert_eq!(q.is_null("score").count().unwrap(), 1);
        let q = realm.query_dynamic("Person").unwrap();
        assert_eq!(q.equal_to("score", 3_i64).count().unwrap(), 1);
    }

    #[test]
    fn filter_and_sort_combine() {
        let realm = realm();
        let people = realm
            .query_dynamic("Person")
            .unwrap()
            .filter(|row| row.string("name").is_some_and(|n| n != "Bob"))
            .sort("age", SortOrder::Descending)
            .find_all()
            .unwrap();
        assert_eq!(names(&people), ["Cid", "Ann"]);
    }

    #[test]
    fn unknown_field_fails_on_find() {
        let realm = realm();
        let q = realm.query_dynamic("Person").unwrap().equal_to("height", 3_i64);
        assert!(matches!(
            q.find_all(),
            Err(CoreError::FieldNotFound { field, .. }) if field == "height"
        ));
    }

    #[test]
    fn results_are_live() {
        let realm = realm();
        let adults = realm
            .query_dynamic("Person")
            .unwrap()
            .greater_than_or_equal("age", 18_i64)
            .find_all()
            .unwrap();
        assert_eq!(adults.len().unwrap(), 2);
        realm
            .write(|r| {
                let bob = r
                    .query_dynamic("Person")?
                    .equal_to("name", "Bob".to_string())
                    .find_first()?
                    .ok_or(CoreError::ObjectInvalidated)?;
                bob.set("age", 18_i64)
            })
            .unwrap();
        assert_eq!(adults.len().unwrap(), 3);
        assert!(matches!(
            adults.add(&adults.get(0).unwrap()),
            Err(CoreError::UnsupportedMutation(_))
        ));
    }
}
