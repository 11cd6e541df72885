//! Live collections and notification delivery.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use stratadb_core::{ChangeSet, CoreError, ListenerToken, Move, ObjectEvent, Realm, Version};
use stratadb_testkit::prelude::*;

fn owner_with_friends(realm: &Realm, names: &[&str]) -> (Person, Vec<Person>) {
    realm
        .write(|r| {
            let owner = r.insert(&Person::new("Owner", 40)?)?;
            let mut friends = Vec::new();
            for name in names {
                let friend = r.insert(&Person::new(name, 20)?)?;
                owner.friends()?.add(&friend)?;
                friends.push(friend);
            }
            Ok((owner, friends))
        })
        .unwrap()
}

#[test]
fn replacing_elements_reports_deletion_and_insertion() {
    with_temp_realm(|realm| {
        let (owner, people) = owner_with_friends(realm, &["a", "b", "c"]);
        let d = realm.write(|r| r.insert(&Person::new("d", 20)?)).unwrap();
        let friends = owner.friends().unwrap();
        let recorder = Recorder::new();
        let _token = friends.add_listener(recorder.collection_listener()).unwrap();

        realm
            .write(|_| {
                friends.remove(0)?;
                friends.add(&d)
            })
            .unwrap();

        assert_eq!(
            recorder.take(),
            vec![ChangeSet {
                deletions: vec![0],
                insertions: vec![2],
                ..ChangeSet::default()
            }]
        );
        let now = friends.snapshot().unwrap();
        assert_eq!(now, vec![people[1].clone(), people[2].clone(), d]);
    });
}

#[test]
fn reordering_a_link_list_reports_moves() {
    with_temp_realm(|realm| {
        let (owner, people) = owner_with_friends(realm, &["a", "b", "c"]);
        let friends = owner.friends().unwrap();
        let recorder = Recorder::new();
        let _token = friends.add_listener(recorder.collection_listener()).unwrap();

        realm.write(|_| friends.move_item(2, 0)).unwrap();

        let changes = recorder.take();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].moves, vec![Move { from: 2, to: 0 }]);
        assert!(changes[0].deletions.is_empty());
        assert!(changes[0].insertions.is_empty());

        let replayed = apply_changes(&people, &changes[0], &friends.snapshot().unwrap());
        assert_eq!(replayed, friends.snapshot().unwrap());
    });
}

#[test]
fn field_edits_report_modifications() {
    with_temp_realm(|realm| {
        let (owner, people) = owner_with_friends(realm, &["a", "b", "c"]);
        let friends = owner.friends().unwrap();
        let all = realm.objects::<Person>().unwrap();
        let list_changes = Recorder::new();
        let all_changes = Recorder::new();
        let _a = friends.add_listener(list_changes.collection_listener()).unwrap();
        let _b = all.add_listener(all_changes.collection_listener()).unwrap();

        realm.write(|_| people[1].set_age(21)).unwrap();

        assert_eq!(
            list_changes.take(),
            vec![ChangeSet {
                modifications: vec![1],
                ..ChangeSet::default()
            }]
        );
        let index = all.index_of(&people[1]).unwrap().unwrap();
        assert_eq!(all_changes.take()[0].modifications, vec![index]);
    });
}

#[test]
fn unrelated_commits_are_not_reported() {
    with_temp_realm(|realm| {
        let (owner, _) = owner_with_friends(realm, &["a"]);
        let friends = owner.friends().unwrap();
        let recorder = Recorder::new();
        let _token = friends.add_listener(recorder.collection_listener()).unwrap();

        realm.write(|r| r.insert(&Dog::named("Rex")?)).unwrap();
        assert!(recorder.is_empty());
    });
}

#[test]
fn registration_does_not_dispatch() {
    with_temp_realm(|realm| {
        let dogs = realm.objects::<Dog>().unwrap();
        let recorder = Recorder::new();
        let _token = dogs.add_listener(recorder.collection_listener()).unwrap();
        assert!(recorder.is_empty());
        realm.refresh().unwrap();
        assert!(recorder.is_empty());
    });
}

#[test]
fn object_listener_sees_changes_then_invalidation() {
    with_temp_realm(|realm| {
        let ann = realm.write(|r| r.insert(&Person::new("Ann", 30)?)).unwrap();
        let recorder = Recorder::new();
        let _token = ann.0.add_listener(recorder.object_listener()).unwrap();

        realm
            .write(|_| {
                ann.set_age(31)?;
                ann.set_nickname(Some("A"))
            })
            .unwrap();
        realm.write(|r| r.delete(&ann)).unwrap();
        realm.write(|r| r.insert(&Dog::named("Rex")?)).unwrap();

        assert_eq!(
            recorder.take(),
            vec![
                ObjectEvent::Changed {
                    fields: vec!["age".to_string(), "nickname".to_string()],
                },
                ObjectEvent::Invalidated,
            ]
        );
        assert!(matches!(ann.age(), Err(CoreError::ObjectInvalidated)));
    });
}

#[test]
fn ignored_field_edits_do_not_notify() {
    with_temp_realm(|realm| {
        let ann = realm.write(|r| r.insert(&Person::new("Ann", 30)?)).unwrap();
        let recorder = Recorder::new();
        let _token = ann.0.add_listener(recorder.object_listener()).unwrap();
        ann.set_draft("scratch").unwrap();
        realm.write(|r| r.insert(&Dog::named("Rex")?)).unwrap();
        assert!(recorder.is_empty());
    });
}

#[test]
fn realm_listeners_receive_each_version() {
    with_temp_realm(|realm| {
        let recorder = Recorder::new();
        let _token = realm.add_change_listener(recorder.realm_listener()).unwrap();
        let before = realm.version().unwrap();
        realm.write(|r| r.insert(&Dog::named("A")?)).unwrap();
        realm.write(|r| r.insert(&Dog::named("B")?)).unwrap();

        let versions: Vec<Version> = recorder.take();
        assert_eq!(versions.len(), 2);
        assert!(versions[0] < versions[1]);
        assert_eq!(versions[1], realm.version().unwrap());
        assert!(before < versions[0]);
    });
}

#[test]
fn removing_a_token_is_idempotent() {
    with_temp_realm(|realm| {
        let dogs = realm.objects::<Dog>().unwrap();
        let recorder = Recorder::new();
        let token = dogs.add_listener(recorder.collection_listener()).unwrap();
        assert!(token.is_active());
        token.remove();
        token.remove();
        assert!(!token.is_active());

        realm.write(|r| r.insert(&Dog::named("Rex")?)).unwrap();
        assert!(recorder.is_empty());
    });
}

#[test]
fn listener_removed_mid_pass_is_skipped() {
    with_temp_realm(|realm| {
        let dogs = realm.objects::<Dog>().unwrap();
        let later: Arc<Mutex<Option<ListenerToken>>> = Arc::new(Mutex::new(None));
        let first_calls = Recorder::new();
        let second_calls = Recorder::new();

        let victim = Arc::clone(&later);
        let first = first_calls.clone();
        let _first = dogs
            .add_listener(move |_| {
                first.push(());
                if let Some(token) = victim.lock().as_ref() {
                    token.remove();
                }
            })
            .unwrap();
        let second = second_calls.clone();
        *later.lock() = Some(dogs.add_listener(move |_| second.push(())).unwrap());

        realm.write(|r| r.insert(&Dog::named("Rex")?)).unwrap();
        realm.write(|r| r.insert(&Dog::named("Max")?)).unwrap();
        assert_eq!(first_calls.len(), 2);
        assert_eq!(second_calls.len(), 0);
    });
}

#[test]
fn remove_all_listeners_deactivates_tokens() {
    with_temp_realm(|realm| {
        let dogs = realm.objects::<Dog>().unwrap();
        let recorder = Recorder::new();
        let token = dogs.add_listener(recorder.collection_listener()).unwrap();
        let versions = Recorder::new();
        let realm_token = realm.add_change_listener(versions.realm_listener()).unwrap();

        realm.remove_all_listeners().unwrap();
        assert!(!token.is_active());
        assert!(!realm_token.is_active());
        realm.write(|r| r.insert(&Dog::named("Rex")?)).unwrap();
        assert!(recorder.is_empty());
        assert!(versions.is_empty());
    });
}

#[test]
fn commits_from_another_context_arrive_on_refresh() {
    let test = TestRealm::memory();
    let dogs = test.objects::<Dog>().unwrap();
    let recorder = Recorder::new();
    let _token = dogs.add_listener(recorder.collection_listener()).unwrap();

    let engine = test.engine.clone();
    thread::spawn(move || {
        let realm = Realm::open(&engine, test_config()).unwrap();
        realm
            .write(|r| {
                r.insert(&Dog::named("Rex")?)?;
                r.insert(&Dog::named("Max")?)
            })
            .unwrap();
    })
    .join()
    .unwrap();

    assert!(recorder.is_empty());
    assert!(test.refresh().unwrap());
    assert_eq!(
        recorder.take(),
        vec![ChangeSet {
            insertions: vec![0, 1],
            ..ChangeSet::default()
        }]
    );
    assert!(!test.refresh().unwrap());
    assert!(recorder.is_empty());
}

#[test]
fn deleting_the_owner_clears_its_list() {
    with_temp_realm(|realm| {
        let (owner, _) = owner_with_friends(realm, &["a", "b"]);
        let friends = owner.friends().unwrap();
        let recorder = Recorder::new();
        let _token = friends.add_listener(recorder.collection_listener()).unwrap();

        realm.write(|r| r.delete(&owner)).unwrap();
        assert_eq!(
            recorder.take(),
            vec![ChangeSet {
                deletions: vec![0, 1],
                ..ChangeSet::default()
            }]
        );
        assert!(!friends.is_valid());
    });
}

#[test]
fn listener_registered_inside_a_write_sees_only_later_edits() {
    with_temp_realm(|realm| {
        realm.begin_write().unwrap();
        let rex = realm.insert(&Dog::named("Rex").unwrap()).unwrap();
        rex.set_name("Rexy").unwrap();
        let max = realm.insert(&Dog::named("Max").unwrap()).unwrap();
        let dogs = realm.objects::<Dog>().unwrap();
        let all_changes = Recorder::new();
        let _all = dogs.add_listener(all_changes.collection_listener()).unwrap();
        realm.commit_write().unwrap();
        assert!(all_changes.is_empty());

        realm.begin_write().unwrap();
        rex.set_age(4).unwrap();
        max.set_age(2).unwrap();
        let late = realm.objects::<Dog>().unwrap();
        let late_changes = Recorder::new();
        let _late = late.add_listener(late_changes.collection_listener()).unwrap();
        rex.set_age(5).unwrap();
        realm.commit_write().unwrap();

        assert_eq!(
            all_changes.take(),
            vec![ChangeSet {
                modifications: vec![0, 1],
                ..ChangeSet::default()
            }]
        );
        assert_eq!(
            late_changes.take(),
            vec![ChangeSet {
                modifications: vec![late.index_of(&rex).unwrap().unwrap()],
                ..ChangeSet::default()
            }]
        );
    });
}
