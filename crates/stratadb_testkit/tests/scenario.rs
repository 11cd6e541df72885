//! End-to-end scenarios across realms, queries and links.

use stratadb_core::{CoreError, Model, SortOrder};
use stratadb_testkit::prelude::*;

#[test]
fn person_with_dog_survives_dog_deletion() {
    let test = TestRealm::memory();
    let realm = &test.realm;

    realm
        .write(|r| {
            let rex = r.insert(&Dog::named("Rex")?)?;
            let ann = Person::new("Ann", 30)?;
            ann.set_dog(Some(&rex))?;
            r.insert(&ann)?;
            Ok(())
        })
        .unwrap();

    let adults = realm
        .query::<Person>()
        .unwrap()
        .greater_than("age", 20_i64)
        .find_all()
        .unwrap();
    assert_eq!(adults.len().unwrap(), 1);
    let ann = adults.get(0).unwrap();
    assert_eq!(ann.dog().unwrap().unwrap().name().unwrap(), "Rex");

    realm
        .write(|r| {
            let rex = r
                .query::<Dog>()?
                .equal_to("name", "Rex".to_string())
                .find_first()?
                .ok_or(CoreError::ObjectInvalidated)?;
            r.delete(&rex)
        })
        .unwrap();

    assert!(ann.dog().unwrap().is_none());
    assert_eq!(adults.len().unwrap(), 1);
}

#[test]
fn nested_unmanaged_graph_inserts_transitively() {
    with_temp_realm(|realm| {
        let ann = Person::new("Ann", 30).unwrap();
        let bob = Person::new("Bob", 25).unwrap();
        bob.set_dog(Some(&Dog::named("Fido").unwrap())).unwrap();
        ann.friends().unwrap().add(&bob).unwrap();
        bob.friends().unwrap().add(&ann).unwrap();

        let managed = realm.write(|r| r.insert(&ann)).unwrap();
        assert_eq!(realm.objects::<Person>().unwrap().len().unwrap(), 2);
        assert_eq!(realm.objects::<Dog>().unwrap().len().unwrap(), 1);

        let bob = managed.friends().unwrap().get(0).unwrap();
        assert_eq!(bob.name().unwrap(), "Bob");
        assert_eq!(bob.friends().unwrap().get(0).unwrap(), managed);
        assert_eq!(bob.dog().unwrap().unwrap().name().unwrap(), "Fido");
    });
}

#[test]
fn back_links_follow_forward_links() {
    with_temp_realm(|realm| {
        let rex = realm
            .write(|r| {
                let rex = r.insert(&Dog::named("Rex")?)?;
                for (name, age) in [("Ann", 30), ("Bob", 40)] {
                    let p = Person::new(name, age)?;
                    p.set_dog(Some(&rex))?;
                    r.insert(&p)?;
                }
                r.insert(&Person::new("Cid", 50)?)?;
                Ok(rex)
            })
            .unwrap();

        let owners = rex.owners().unwrap();
        let mut names: Vec<String> = owners.iter().unwrap().map(|p| p.name().unwrap()).collect();
        names.sort();
        assert_eq!(names, ["Ann", "Bob"]);
        assert!(matches!(
            realm.write(|_| owners.clear()),
            Err(CoreError::UnsupportedMutation(_))
        ));

        realm
            .write(|r| {
                let cid = r
                    .query::<Person>()?
                    .equal_to("name", "Cid".to_string())
                    .find_first()?
                    .ok_or(CoreError::ObjectInvalidated)?;
                cid.set_dog(Some(&rex))
            })
            .unwrap();
        assert_eq!(owners.len().unwrap(), 3);
    });
}

#[test]
fn sorted_queries_and_aggregates() {
    with_temp_realm(|realm| {
        realm
            .write(|r| {
                for (name, age) in [("Cid", 50), ("Ann", 30), ("Bob", 40), ("Dee", 10)] {
                    r.insert(&Person::new(name, age)?)?;
                }
                Ok(())
            })
            .unwrap();

        let by_age = realm
            .query::<Person>()
            .unwrap()
            .sort("age", SortOrder::Descending)
            .find_all()
            .unwrap();
        let names: Vec<String> = by_age.iter().unwrap().map(|p| p.name().unwrap()).collect();
        assert_eq!(names, ["Cid", "Bob", "Ann", "Dee"]);

        let people = realm.objects::<Person>().unwrap();
        assert_eq!(people.sum("age").unwrap(), stratadb_core::Value::Int(130));
        assert_eq!(people.min("age").unwrap(), Some(stratadb_core::Value::Int(10)));
        assert_eq!(people.max("age").unwrap(), Some(stratadb_core::Value::Int(50)));
        assert_eq!(people.average("age").unwrap(), Some(32.5));
        assert_eq!(
            realm
                .query::<Person>()
                .unwrap()
                .filter(|row| row.int("age").is_some_and(|a| a % 20 == 10))
                .count()
                .unwrap(),
            3
        );
    });
}

#[test]
fn dynamic_access_matches_typed_access() {
    with_temp_realm(|realm| {
        let ann = realm.write(|r| r.insert(&Person::new("Ann", 30)?)).unwrap();
        let dynamic = realm.objects_dynamic(Person::CLASS_NAME).unwrap().get(0).unwrap();
        assert_eq!(dynamic.get::<String>("name").unwrap(), "Ann");
        realm.write(|_| dynamic.set("age", 31_i64)).unwrap();
        assert_eq!(ann.age().unwrap(), 31);
        assert!(matches!(
            dynamic.get::<i64>("height"),
            Err(CoreError::FieldNotFound { .. })
        ));
    });
}

#[test]
fn file_store_survives_reopen() {
    with_file_engine(|engine, path| {
        let realm = stratadb_core::Realm::open(engine, test_config()).unwrap();
        realm
            .write(|r| {
                let node = Node::new(1, "root")?;
                node.adopt(&Node::new(2, "leaf")?)?;
                r.insert(&node)
            })
            .unwrap();
        drop(realm);

        let engine = stratadb_engine::Engine::open(stratadb_engine::EngineConfig::new().path(path)).unwrap();
        let realm = stratadb_core::Realm::open(&engine, test_config()).unwrap();
        let root = realm.find_by_primary_key::<Node>(1_i64).unwrap().unwrap();
        let leaf = root.children().unwrap().get(0).unwrap();
        assert_eq!(leaf.label().unwrap(), "leaf");
        assert_eq!(leaf.parent().unwrap().unwrap(), root);
    });
}
