//! Class descriptors: the declared shape of a model class.
//!
//! A descriptor is what an annotated class boils down to: field names,
//! types and markers (`primary_key`, `indexed`, `ignored`, default values).
//! Schema derivation validates descriptors and turns them into a
//! [`Schema`](super::Schema); objects use them for in-memory storage.

use super::types::FieldType;
use std::collections::HashMap;
use stratadb_engine::Value;

/// Declared field of a model class.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: String,
    /// Semantic type.
    pub field_type: FieldType,
    /// Whether the field may hold null.
    pub nullable: bool,
    /// Whether the field is indexed.
    pub indexed: bool,
    /// Whether this is the primary key.
    pub primary_key: bool,
    /// Whether the field is in-memory only and never persisted.
    pub ignored: bool,
    /// Value an unset field starts with.
    pub default: Option<Value>,
}

impl FieldDescriptor {
    /// Creates a plain, non-nullable field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            indexed: false,
            primary_key: false,
            ignored: false,
            default: None,
        }
    }

    /// Creates a single-object link field.
    pub fn link(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, FieldType::Object(target.into())).nullable(true)
    }

    /// Creates a list-of-objects field.
    pub fn list(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, FieldType::LinkList(target.into()))
    }

    /// Creates a list-of-primitives field.
    pub fn values(name: impl Into<String>, element: FieldType) -> Self {
        Self::new(name, FieldType::List(Box::new(element)))
    }

    /// Creates a back-link field exposing the objects of `class` whose
    /// `field` links here.
    pub fn backlink(
        name: impl Into<String>,
        class: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            FieldType::BackLink {
                class: class.into(),
                field: field.into(),
            },
        )
    }

    /// Sets whether the field is nullable.
    #[must_use]
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Sets whether the field is indexed.
    #[must_use]
    pub fn indexed(mut self, value: bool) -> Self {
        self.indexed = value;
        self
    }

    /// Marks the field as the primary key.
    #[must_use]
    pub fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Marks the field as ignored.
    #[must_use]
    pub fn ignored(mut self, value: bool) -> Self {
        self.ignored = value;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Returns the value an unset field holds.
    #[must_use]
    pub fn initial_value(&self) -> Value {
        if let Some(default) = &self.default {
            return default.clone();
        }
        if self.ignored {
            return Value::Null;
        }
        match &self.field_type {
            FieldType::Object(_) => Value::Null,
            FieldType::LinkList(_) => Value::LinkList(Vec::new()),
            FieldType::List(_) => Value::List(Vec::new()),
            _ if self.nullable => Value::Null,
            other => other
                .column_type()
                .map_or(Value::Null, |c| c.default_value()),
        }
    }
}

/// Declared model class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDescriptor {
    /// Class name.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldDescriptor>,
}

impl ClassDescriptor {
    /// Creates a class without fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a field.
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }
}

/// A descriptor with a name index, shared by every object of the class.
#[derive(Debug)]
pub(crate) struct ClassInfo {
    pub(crate) descriptor: ClassDescriptor,
    by_name: HashMap<String, usize>,
    primary_key: Option<usize>,
}

impl ClassInfo {
    pub(crate) fn new(descriptor: ClassDescriptor) -> Self {
        let by_name = descriptor
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        let primary_key = descriptor
            .fields
            .iter()
            .position(|f| f.primary_key && !f.ignored);
        Self {
            descriptor,
            by_name,
            primary_key,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub(crate) fn fields(&self) -> &[FieldDescriptor] {
        &self.descriptor.fields
    }

    pub(crate) fn field(&self, index: usize) -> &FieldDescriptor {
        &self.descriptor.fields[index]
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn primary_key(&self) -> Option<usize> {
        self.primary_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_values_follow_markers() {
        assert_eq!(
            FieldDescriptor::new("age", FieldType::Integer).initial_value(),
            Value::Int(0)
        );
        assert_eq!(
            FieldDescriptor::new("nick", FieldType::String)
                .nullable(true)
                .initial_value(),
            Value::Null
        );
        assert_eq!(
            FieldDescriptor::new("score", FieldType::Double)
                .default_value(Value::Double(1.5))
                .initial_value(),
            Value::Double(1.5)
        );
        assert_eq!(FieldDescriptor::link("dog", "Dog").initial_value(), Value::Null);
    }

    #[test]
    fn class_info_indexes_fields() {
        let info = ClassInfo::new(
            ClassDescriptor::new("Person")
                .field(FieldDescriptor::new("id", FieldType::Integer).primary_key(true))
                .field(FieldDescriptor::new("name", FieldType::String)),
        );
        assert_eq!(info.index_of("name"), Some(1));
        assert_eq!(info.primary_key(), Some(0));
        assert_eq!(info.index_of("missing"), None);
    }
}
