//! Schema derivation from class descriptors.

use super::descriptor::ClassDescriptor;
use super::types::{ClassSpec, FieldSpec, FieldType, Schema};
use crate::error::SchemaError;
use std::collections::HashSet;
use tracing::debug;

/// Derives and validates a schema from declared classes.
///
/// Ignored fields are dropped. Primary keys are forced indexed, single links
/// forced nullable, and list fields forced non-nullable.
///
/// # Errors
///
/// - `DuplicateClass` / `DuplicateField` for repeated names
/// - `DuplicatePrimaryKey` if a class marks more than one primary key
/// - `InvalidPrimaryKey` if the key is not an integer or string
/// - `UnsupportedFieldType` for `Other` types and lists of non-primitives
/// - `DanglingLinkTarget` if a link names an undeclared class
/// - `InvalidBackLink` if a back-link does not invert a forward link
pub fn derive_schema(descriptors: &[ClassDescriptor]) -> Result<Schema, SchemaError> {
    let mut names = HashSet::new();
    for descriptor in descriptors {
        if !names.insert(descriptor.name.as_str()) {
            return Err(SchemaError::DuplicateClass {
                class: descriptor.name.clone(),
            });
        }
    }

    let mut classes = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        classes.push(derive_class(descriptor, &names)?);
    }
    let schema = Schema::new(classes);
    for class in schema.classes() {
        check_backlinks(class, &schema)?;
    }
    debug!(classes = schema.classes().len(), "derived schema");
    Ok(schema)
}

fn derive_class(descriptor: &ClassDescriptor, declared: &HashSet<&str>) -> Result<ClassSpec, SchemaError> {
    let class = &descriptor.name;
    let mut seen = HashSet::new();
    let mut fields = Vec::new();
    let mut has_primary_key = false;

    for field in descriptor.fields.iter().filter(|f| !f.ignored) {
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                class: class.clone(),
                field: field.name.clone(),
            });
        }
        let unsupported = || SchemaError::UnsupportedFieldType {
            class: class.clone(),
            field: field.name.clone(),
            field_type: field.field_type.to_string(),
        };
        match &field.field_type {
            FieldType::Other(_) => return Err(unsupported()),
            FieldType::List(element) if !element.is_primitive() => return Err(unsupported()),
            FieldType::Object(target) | FieldType::LinkList(target) if !declared.contains(target.as_str()) => {
                return Err(SchemaError::DanglingLinkTarget {
                    class: class.clone(),
                    field: field.name.clone(),
                    target: target.clone(),
                });
            }
            _ => {}
        }

        if field.primary_key {
            if has_primary_key {
                return Err(SchemaError::DuplicatePrimaryKey {
                    class: class.clone(),
                });
            }
            if !matches!(field.field_type, FieldType::Integer | FieldType::String) {
                return Err(SchemaError::InvalidPrimaryKey {
                    class: class.clone(),
                    field: field.name.clone(),
                });
            }
            has_primary_key = true;
        }

        let nullable = match field.field_type {
            FieldType::Object(_) => true,
            FieldType::LinkList(_) | FieldType::List(_) | FieldType::BackLink { .. } => false,
            _ => field.nullable,
        };
        fields.push(FieldSpec {
            name: field.name.clone(),
            field_type: field.field_type.clone(),
            nullable,
            indexed: field.indexed || field.primary_key,
            primary_key: field.primary_key,
        });
    }

    Ok(ClassSpec {
        name: class.clone(),
        fields,
    })
}

fn check_backlinks(class: &ClassSpec, schema: &Schema) -> Result<(), SchemaError> {
    for field in &class.fields {
        let FieldType::BackLink {
            class: source,
            field: source_field,
        } = &field.field_type
        else {
            continue;
        };
        let invalid = |reason: String| SchemaError::InvalidBackLink {
            class: class.name.clone(),
            field: field.name.clone(),
            reason,
        };
        let source_class = schema
            .class(source)
            .ok_or_else(|| invalid(format!("class '{source}' is not declared")))?;
        let forward = source_class
            .field(source_field)
            .ok_or_else(|| invalid(format!("'{source}' has no field '{source_field}'")))?;
        if forward.field_type.link_target() != Some(class.name.as_str()) {
            return Err(invalid(format!(
                "'{source}.{source_field}' is {}, not a link to '{}'",
                forward.field_type, class.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;

    fn dog() -> ClassDescriptor {
        ClassDescriptor::new("Dog")
            .field(FieldDescriptor::new("name", FieldType::String))
            .field(FieldDescriptor::backlink("owners", "Person", "dog"))
    }

    fn person() -> ClassDescriptor {
        ClassDescriptor::new("Person")
            .field(FieldDescriptor::new("id", FieldType::Integer).primary_key(true))
            .field(FieldDescriptor::new("name", FieldType::String))
            .field(FieldDescriptor::link("dog", "Dog"))
            .field(FieldDescriptor::new("cache", FieldType::Other("Cache".into())).ignored(true))
    }

    #[test]
    fn derives_valid_schema() {
        let schema = derive_schema(&[person(), dog()]).unwrap();
        let person = schema.class("Person").unwrap();
        assert_eq!(person.fields.len(), 3);
        let id = person.primary_key().unwrap();
        assert!(id.indexed);
        assert!(person.field("dog").unwrap().nullable);
        assert!(person.field("cache").is_none());
    }

    #[test]
    fn two_primary_keys_fail() {
        let class = ClassDescriptor::new("Pair")
            .field(FieldDescriptor::new("a", FieldType::Integer).primary_key(true))
            .field(FieldDescriptor::new("b", FieldType::String).primary_key(true));
        assert_eq!(
            derive_schema(&[class]).unwrap_err(),
            SchemaError::DuplicatePrimaryKey {
                class: "Pair".into()
            }
        );
    }

    #[test]
    fn undeclared_link_target_fails() {
        let err = derive_schema(&[person()]).unwrap_err();
        assert!(matches!(err, SchemaError::DanglingLinkTarget { target, .. } if target == "Dog"));
    }

    #[test]
    fn unsupported_types_fail() {
        let class = ClassDescriptor::new("Bag")
            .field(FieldDescriptor::values("things", FieldType::Object("Bag".into())));
        assert!(matches!(
            derive_schema(&[class]).unwrap_err(),
            SchemaError::UnsupportedFieldType { .. }
        ));
    }

    #[test]
    fn back_link_must_invert_a_link() {
        let dog = ClassDescriptor::new("Dog").field(FieldDescriptor::backlink("owners", "Person", "name"));
        let err = derive_schema(&[person(), dog]).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidBackLink { .. }));
    }

    #[test]
    fn float_primary_key_fails() {
        let class = ClassDescriptor::new("Reading")
            .field(FieldDescriptor::new("value", FieldType::Double).primary_key(true));
        assert!(matches!(
            derive_schema(&[class]).unwrap_err(),
            SchemaError::InvalidPrimaryKey { .. }
        ));
    }
}
