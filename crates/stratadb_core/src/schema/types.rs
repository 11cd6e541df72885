//! Schema data model.

use serde::{Deserialize, Serialize};
use std::fmt;
use stratadb_engine::{ColumnDef, ColumnType, Snapshot, TableDef};

/// Semantic type of a declared field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// Signed integer of any width (stored as 64 bits).
    Integer,
    /// 64-bit float.
    Double,
    /// 32-bit float.
    Float,
    /// Boolean.
    Boolean,
    /// UTF-8 string.
    String,
    /// Byte string.
    Binary,
    /// Point in time, millisecond precision.
    Timestamp,
    /// Single reference to an object of the named class.
    Object(String),
    /// Ordered references to objects of the named class.
    LinkList(String),
    /// Ordered list of primitive values.
    List(Box<FieldType>),
    /// Derived inverse of `class.field`, which must link to the declaring class.
    BackLink {
        /// Class owning the forward link.
        class: String,
        /// Forward link field.
        field: String,
    },
    /// A type the store cannot hold; rejected by schema derivation.
    Other(String),
}

impl FieldType {
    /// Returns true for scalar types that may appear in a primitive list.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            FieldType::Integer
                | FieldType::Double
                | FieldType::Float
                | FieldType::Boolean
                | FieldType::String
                | FieldType::Binary
                | FieldType::Timestamp
        )
    }

    /// Returns the class a link or link-list field points at.
    #[must_use]
    pub fn link_target(&self) -> Option<&str> {
        match self {
            FieldType::Object(target) | FieldType::LinkList(target) => Some(target),
            _ => None,
        }
    }

    /// Returns true for fields backed by a column.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        !matches!(self, FieldType::BackLink { .. } | FieldType::Other(_))
    }

    /// Maps to the engine column type, if the field is stored.
    #[must_use]
    pub fn column_type(&self) -> Option<ColumnType> {
        Some(match self {
            FieldType::Integer => ColumnType::Int,
            FieldType::Double => ColumnType::Double,
            FieldType::Float => ColumnType::Float,
            FieldType::Boolean => ColumnType::Bool,
            FieldType::String => ColumnType::String,
            FieldType::Binary => ColumnType::Binary,
            FieldType::Timestamp => ColumnType::Timestamp,
            FieldType::Object(target) => ColumnType::Link {
                target: target.clone(),
            },
            FieldType::LinkList(target) => ColumnType::LinkList {
                target: target.clone(),
            },
            FieldType::List(element) => ColumnType::List(Box::new(element.column_type()?)),
            FieldType::BackLink { .. } | FieldType::Other(_) => return None,
        })
    }

    /// Maps an engine column type back to a field type.
    #[must_use]
    pub fn from_column_type(column_type: &ColumnType) -> Self {
        match column_type {
            ColumnType::Int => FieldType::Integer,
            ColumnType::Double => FieldType::Double,
            ColumnType::Float => FieldType::Float,
            ColumnType::Bool => FieldType::Boolean,
            ColumnType::String => FieldType::String,
            ColumnType::Binary => FieldType::Binary,
            ColumnType::Timestamp => FieldType::Timestamp,
            ColumnType::Link { target } => FieldType::Object(target.clone()),
            ColumnType::LinkList { target } => FieldType::LinkList(target.clone()),
            ColumnType::List(element) => FieldType::List(Box::new(Self::from_column_type(element))),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Integer => f.write_str("integer"),
            FieldType::Double => f.write_str("double"),
            FieldType::Float => f.write_str("float"),
            FieldType::Boolean => f.write_str("boolean"),
            FieldType::String => f.write_str("string"),
            FieldType::Binary => f.write_str("binary"),
            FieldType::Timestamp => f.write_str("timestamp"),
            FieldType::Object(target) => write!(f, "link<{target}>"),
            FieldType::LinkList(target) => write!(f, "list<{target}>"),
            FieldType::List(element) => write!(f, "list<{element}>"),
            FieldType::BackLink { class, field } => write!(f, "backlink<{class}.{field}>"),
            FieldType::Other(name) => f.write_str(name),
        }
    }
}

/// One field of a class, after derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Semantic type.
    pub field_type: FieldType,
    /// Whether the field may hold null.
    pub nullable: bool,
    /// Whether the field is indexed.
    pub indexed: bool,
    /// Whether this is the class's primary key.
    pub primary_key: bool,
}

impl FieldSpec {
    /// Returns the column definition for a stored field.
    #[must_use]
    pub fn column_def(&self) -> Option<ColumnDef> {
        let column_type = self.field_type.column_type()?;
        Some(
            ColumnDef::new(&self.name, column_type)
                .nullable(self.nullable)
                .indexed(self.indexed),
        )
    }
}

/// The shape of one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSpec {
    /// Class name, also the table name.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldSpec>,
}

impl ClassSpec {
    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the primary-key field.
    #[must_use]
    pub fn primary_key(&self) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Iterates the fields backed by columns.
    pub fn persisted_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.field_type.is_persisted())
    }

    /// Builds the table definition for this class.
    ///
    /// Columns that `previous` already defines keep their relative order;
    /// new columns are appended in declaration order.
    #[must_use]
    pub fn table_def(&self, previous: Option<&TableDef>) -> TableDef {
        let mut def = TableDef::new(&self.name);
        let mut placed: Vec<&str> = Vec::new();
        if let Some(previous) = previous {
            for column in &previous.columns {
                let Some(field) = self.field(&column.name) else {
                    continue;
                };
                if let Some(column) = field.column_def() {
                    placed.push(field.name.as_str());
                    def = def.column(column);
                }
            }
        }
        for field in self.persisted_fields() {
            if placed.contains(&field.name.as_str()) {
                continue;
            }
            if let Some(column) = field.column_def() {
                def = def.column(column);
            }
        }
        if let Some(pk) = self.primary_key() {
            def = def.primary_key(&pk.name);
        }
        def
    }

    /// Describes a stored table as a class.
    #[must_use]
    pub fn from_table_def(def: &TableDef) -> Self {
        Self {
            name: def.name.clone(),
            fields: def
                .columns
                .iter()
                .map(|c| FieldSpec {
                    name: c.name.clone(),
                    field_type: FieldType::from_column_type(&c.column_type),
                    nullable: c.nullable,
                    indexed: c.indexed,
                    primary_key: def.primary_key.as_deref() == Some(c.name.as_str()),
                })
                .collect(),
        }
    }
}

/// A set of classes, immutable once a realm is open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    classes: Vec<ClassSpec>,
}

impl Schema {
    /// Creates a schema from already-derived classes.
    #[must_use]
    pub fn new(classes: Vec<ClassSpec>) -> Self {
        Self { classes }
    }

    /// Reads the schema stored in a snapshot. Back-links are not stored and
    /// never appear here.
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            classes: snapshot
                .tables()
                .map(|t| ClassSpec::from_table_def(t.def()))
                .collect(),
        }
    }

    /// Looks up a class by name.
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&ClassSpec> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Returns all classes.
    #[must_use]
    pub fn classes(&self) -> &[ClassSpec] {
        &self.classes
    }

    /// Returns true if the schema has no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
