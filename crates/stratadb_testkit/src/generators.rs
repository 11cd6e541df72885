//! Property-based test generators using proptest.
//!
//! Provides strategies for model data and for sequences of list edits.

use crate::models::Person;
use proptest::prelude::*;
use stratadb_core::{Collection, CoreResult};

/// Strategy for person names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{1,8}").expect("Invalid regex")
}

/// Strategy for ages.
pub fn age_strategy() -> impl Strategy<Value = i64> {
    0_i64..100
}

/// Field values for one [`Person`].
#[derive(Debug, Clone, PartialEq)]
pub struct PersonSpec {
    /// Name.
    pub name: String,
    /// Age.
    pub age: i64,
    /// Optional nickname.
    pub nickname: Option<String>,
}

impl PersonSpec {
    /// Builds an unmanaged person from these values.
    pub fn build(&self) -> CoreResult<Person> {
        let person = Person::new(&self.name, self.age)?;
        person.set_nickname(self.nickname.as_deref())?;
        Ok(person)
    }
}

/// Strategy for person field values.
pub fn person_strategy() -> impl Strategy<Value = PersonSpec> {
    (name_strategy(), age_strategy(), prop::option::of(name_strategy()))
        .prop_map(|(name, age, nickname)| PersonSpec { name, age, nickname })
}

/// One edit of a link list. Indices are taken modulo the current length
/// when applied; `item` picks one of a pool of candidate elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOp {
    /// Append a pool element.
    Add {
        /// Pool index.
        item: usize,
    },
    /// Insert a pool element.
    Insert {
        /// Target position.
        index: usize,
        /// Pool index.
        item: usize,
    },
    /// Replace the element at a position.
    Set {
        /// Position.
        index: usize,
        /// Pool index.
        item: usize,
    },
    /// Remove the element at a position.
    Remove {
        /// Position.
        index: usize,
    },
    /// Move an element.
    Move {
        /// Source position.
        from: usize,
        /// Target position.
        to: usize,
    },
}

impl ListOp {
    /// Applies the edit to `list` and to `model`, a plain vector mirroring it.
    ///
    /// Edits that need an element are skipped on an empty list.
    pub fn apply<T: Clone + stratadb_core::FromObject + stratadb_core::AsObject>(
        self,
        list: &Collection<T>,
        model: &mut Vec<T>,
        pool: &[T],
    ) -> CoreResult<()> {
        let len = model.len();
        match self {
            ListOp::Add { item } => {
                let item = &pool[item % pool.len()];
                list.add(item)?;
                model.push(item.clone());
            }
            ListOp::Insert { index, item } => {
                let index = index % (len + 1);
                let item = &pool[item % pool.len()];
                list.insert(index, item)?;
                model.insert(index, item.clone());
            }
            ListOp::Set { index, item } if len > 0 => {
                let index = index % len;
                let item = &pool[item % pool.len()];
                list.set(index, item)?;
                model[index] = item.clone();
            }
            ListOp::Remove { index } if len > 0 => {
                let index = index % len;
                list.remove(index)?;
                model.remove(index);
            }
            ListOp::Move { from, to } if len > 0 => {
                let (from, to) = (from % len, to % len);
                list.move_item(from, to)?;
                let item = model.remove(from);
                model.insert(to, item);
            }
            ListOp::Set { .. } | ListOp::Remove { .. } | ListOp::Move { .. } => {}
        }
        Ok(())
    }
}

/// Strategy for a single list edit.
pub fn list_op_strategy() -> impl Strategy<Value = ListOp> {
    prop_oneof![
        3 => any::<usize>().prop_map(|item| ListOp::Add { item }),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(index, item)| ListOp::Insert { index, item }),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(index, item)| ListOp::Set { index, item }),
        2 => any::<usize>().prop_map(|index| ListOp::Remove { index }),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(from, to)| ListOp::Move { from, to }),
    ]
}

/// Strategy for a batch of list edits.
pub fn list_ops_strategy(max: usize) -> impl Strategy<Value = Vec<ListOp>> {
    prop::collection::vec(list_op_strategy(), 0..=max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn generated_names_are_capitalized() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let name = name_strategy().new_tree(&mut runner).unwrap().current();
            assert!(name.chars().next().is_some_and(char::is_uppercase));
            assert!(name.len() >= 2);
        }
    }

    proptest! {
        #[test]
        fn person_specs_build(spec in person_strategy()) {
            let person = spec.build().unwrap();
            prop_assert_eq!(person.name().unwrap(), spec.name.clone());
            prop_assert_eq!(person.nickname().unwrap(), spec.nickname.clone());
        }
    }
}
