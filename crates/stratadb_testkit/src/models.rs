//! Model classes shared by the integration tests.
//!
//! Each model is a thin wrapper around an [`Object`] with typed accessors,
//! written the way application code declares its classes.

use stratadb_core::{
    AsObject, ClassDescriptor, Collection, CoreResult, FieldDescriptor, FieldType, FromObject, Model, Object,
    Value,
};
use std::time::SystemTime;

macro_rules! object_wrapper {
    ($name:ident) => {
        impl FromObject for $name {
            fn from_object(object: Object) -> Self {
                Self(object)
            }
        }

        impl AsObject for $name {
            fn as_object(&self) -> &Object {
                &self.0
            }
        }
    };
}

/// A dog, owned by people through [`Person::dog`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dog(pub Object);

object_wrapper!(Dog);

impl Model for Dog {
    const CLASS_NAME: &'static str = "Dog";

    fn describe() -> ClassDescriptor {
        ClassDescriptor::new("Dog")
            .field(FieldDescriptor::new("name", FieldType::String))
            .field(FieldDescriptor::new("age", FieldType::Integer).default_value(Value::Int(1)))
            .field(FieldDescriptor::backlink("owners", "Person", "dog"))
    }
}

impl Dog {
    /// Creates an unmanaged dog.
    pub fn named(name: &str) -> CoreResult<Self> {
        let dog = Self::new_unmanaged();
        dog.set_name(name)?;
        Ok(dog)
    }

    /// Returns the name.
    pub fn name(&self) -> CoreResult<String> {
        self.0.get("name")
    }

    /// Sets the name.
    pub fn set_name(&self, name: &str) -> CoreResult<()> {
        self.0.set("name", name.to_string())
    }

    /// Returns the age in years.
    pub fn age(&self) -> CoreResult<i64> {
        self.0.get("age")
    }

    /// Sets the age in years.
    pub fn set_age(&self, age: i64) -> CoreResult<()> {
        self.0.set("age", age)
    }

    /// People whose `dog` is this dog.
    pub fn owners(&self) -> CoreResult<Collection<Person>> {
        self.0.get_list("owners")
    }
}

/// A person with an optional dog and a list of friends.
#[derive(Debug, Clone, PartialEq)]
pub struct Person(pub Object);

object_wrapper!(Person);

impl Model for Person {
    const CLASS_NAME: &'static str = "Person";

    fn describe() -> ClassDescriptor {
        ClassDescriptor::new("Person")
            .field(FieldDescriptor::new("name", FieldType::String).indexed(true))
            .field(FieldDescriptor::new("age", FieldType::Integer))
            .field(FieldDescriptor::new("nickname", FieldType::String).nullable(true))
            .field(FieldDescriptor::link("dog", "Dog"))
            .field(FieldDescriptor::list("friends", "Person"))
            .field(FieldDescriptor::new("draft", FieldType::String).ignored(true))
    }
}

impl Person {
    /// Creates an unmanaged person.
    pub fn new(name: &str, age: i64) -> CoreResult<Self> {
        let person = Self::new_unmanaged();
        person.set_name(name)?;
        person.set_age(age)?;
        Ok(person)
    }

    /// Returns the name.
    pub fn name(&self) -> CoreResult<String> {
        self.0.get("name")
    }

    /// Sets the name.
    pub fn set_name(&self, name: &str) -> CoreResult<()> {
        self.0.set("name", name.to_string())
    }

    /// Returns the age.
    pub fn age(&self) -> CoreResult<i64> {
        self.0.get("age")
    }

    /// Sets the age.
    pub fn set_age(&self, age: i64) -> CoreResult<()> {
        self.0.set("age", age)
    }

    /// Returns the nickname.
    pub fn nickname(&self) -> CoreResult<Option<String>> {
        self.0.get("nickname")
    }

    /// Sets or clears the nickname.
    pub fn set_nickname(&self, nickname: Option<&str>) -> CoreResult<()> {
        self.0.set("nickname", nickname.map(str::to_string))
    }

    /// Returns the dog, or `None` if unset or deleted.
    pub fn dog(&self) -> CoreResult<Option<Dog>> {
        self.0.get_link("dog")
    }

    /// Sets or clears the dog.
    pub fn set_dog(&self, dog: Option<&Dog>) -> CoreResult<()> {
        self.0.set_link("dog", dog)
    }

    /// Returns the friends list.
    pub fn friends(&self) -> CoreResult<Collection<Person>> {
        self.0.get_list("friends")
    }

    /// Returns the in-memory draft note.
    pub fn draft(&self) -> CoreResult<String> {
        self.0.get("draft")
    }

    /// Sets the in-memory draft note.
    pub fn set_draft(&self, draft: &str) -> CoreResult<()> {
        self.0.set("draft", draft.to_string())
    }
}

/// A contact keyed by email, used for upserts.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact(pub Object);

object_wrapper!(Contact);

impl Model for Contact {
    const CLASS_NAME: &'static str = "Contact";

    fn describe() -> ClassDescriptor {
        ClassDescriptor::new("Contact")
            .field(FieldDescriptor::new("email", FieldType::String).primary_key(true))
            .field(FieldDescriptor::new("name", FieldType::String))
            .field(FieldDescriptor::new("phone", FieldType::String).nullable(true))
            .field(FieldDescriptor::values("tags", FieldType::String))
    }
}

impl Contact {
    /// Creates an unmanaged contact with only the key set.
    pub fn keyed(email: &str) -> CoreResult<Self> {
        let contact = Self::new_unmanaged();
        contact.0.set("email", email.to_string())?;
        Ok(contact)
    }

    /// Returns the primary key.
    pub fn email(&self) -> CoreResult<String> {
        self.0.get("email")
    }

    /// Returns the name.
    pub fn name(&self) -> CoreResult<String> {
        self.0.get("name")
    }

    /// Sets the name.
    pub fn set_name(&self, name: &str) -> CoreResult<()> {
        self.0.set("name", name.to_string())
    }

    /// Returns the phone number.
    pub fn phone(&self) -> CoreResult<Option<String>> {
        self.0.get("phone")
    }

    /// Sets or clears the phone number.
    pub fn set_phone(&self, phone: Option<&str>) -> CoreResult<()> {
        self.0.set("phone", phone.map(str::to_string))
    }

    /// Returns the tags.
    pub fn tags(&self) -> CoreResult<Vec<String>> {
        self.0.get_values("tags")
    }

    /// Replaces the tags.
    pub fn set_tags(&self, tags: &[&str]) -> CoreResult<()> {
        self.0
            .set_values("tags", tags.iter().map(|t| t.to_string()).collect())
    }
}

/// One field of every primitive type.
#[derive(Debug, Clone, PartialEq)]
pub struct AllTypes(pub Object);

object_wrapper!(AllTypes);

impl Model for AllTypes {
    const CLASS_NAME: &'static str = "AllTypes";

    fn describe() -> ClassDescriptor {
        ClassDescriptor::new("AllTypes")
            .field(FieldDescriptor::new("id", FieldType::Integer).primary_key(true))
            .field(FieldDescriptor::new("flag", FieldType::Boolean))
            .field(FieldDescriptor::new("count", FieldType::Integer))
            .field(FieldDescriptor::new("ratio", FieldType::Double))
            .field(FieldDescriptor::new("score", FieldType::Float))
            .field(FieldDescriptor::new("label", FieldType::String))
            .field(FieldDescriptor::new("blob", FieldType::Binary))
            .field(FieldDescriptor::new("at", FieldType::Timestamp))
            .field(FieldDescriptor::new("maybe", FieldType::Integer).nullable(true))
            .field(FieldDescriptor::values("numbers", FieldType::Integer))
    }
}

impl AllTypes {
    /// Reads `flag`.
    pub fn flag(&self) -> CoreResult<bool> {
        self.0.get("flag")
    }

    /// Reads `ratio`.
    pub fn ratio(&self) -> CoreResult<f64> {
        self.0.get("ratio")
    }

    /// Reads `at`.
    pub fn at(&self) -> CoreResult<SystemTime> {
        self.0.get("at")
    }

    /// Reads `numbers`.
    pub fn numbers(&self) -> CoreResult<Vec<i64>> {
        self.0.get_values("numbers")
    }
}

/// A tree node, for graph copies and cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct Node(pub Object);

object_wrapper!(Node);

impl Model for Node {
    const CLASS_NAME: &'static str = "Node";

    fn describe() -> ClassDescriptor {
        ClassDescriptor::new("Node")
            .field(FieldDescriptor::new("id", FieldType::Integer).primary_key(true))
            .field(FieldDescriptor::new("label", FieldType::String))
            .field(FieldDescriptor::link("parent", "Node"))
            .field(FieldDescriptor::list("children", "Node"))
    }
}

impl Node {
    /// Creates an unmanaged node.
    pub fn new(id: i64, label: &str) -> CoreResult<Self> {
        let node = Self::new_unmanaged();
        node.0.set("id", id)?;
        node.0.set("label", label.to_string())?;
        Ok(node)
    }

    /// Returns the id.
    pub fn id(&self) -> CoreResult<i64> {
        self.0.get("id")
    }

    /// Returns the label.
    pub fn label(&self) -> CoreResult<String> {
        self.0.get("label")
    }

    /// Returns the parent.
    pub fn parent(&self) -> CoreResult<Option<Node>> {
        self.0.get_link("parent")
    }

    /// Returns the children.
    pub fn children(&self) -> CoreResult<Collection<Node>> {
        self.0.get_list("children")
    }

    /// Adds `child` and points its parent here.
    pub fn adopt(&self, child: &Node) -> CoreResult<()> {
        child.0.set_link("parent", Some(self))?;
        self.children()?.add(child)
    }
}
