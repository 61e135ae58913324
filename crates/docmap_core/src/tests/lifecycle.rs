//! Persistence lifecycle: save, update, reload, delete, uniqueness, and
//! embedded round trips.

use super::{attrs, session, session_over, FlakyStore};
use crate::ModelError;
use docmap_store::IndexAssignment;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

#[test]
fn create_assigns_a_key_and_round_trips() {
    let session = session();
    let users = session.model("User").unwrap();
    let user = users
        .create(attrs(&[
            ("name", json!("Ada")),
            ("email", json!("ada@example.com")),
        ]))
        .unwrap();

    assert!(!user.is_new());
    let id = user.id().unwrap();

    let fetched = users.get(&id).unwrap().unwrap();
    assert_eq!(fetched, user);
    assert_eq!(fetched.get("name").unwrap(), json!("Ada"));
    assert_eq!(fetched.get("email").unwrap(), json!("ada@example.com"));
}

#[test]
fn stored_document_carries_the_type_discriminator() {
    let session = session();
    let users = session.model("User").unwrap();
    let user = users.create(attrs(&[("name", json!("Ada"))])).unwrap();

    let raw = session
        .store()
        .get(users.schema().bucket_name(), &user.id().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(raw.get("_type"), Some(&json!("User")));
    // The discriminator never leaks back into the attribute map.
    assert!(!user.attributes().contains_key("_type"));
}

#[test]
fn getting_an_absent_record_is_none_not_an_error() {
    let session = session();
    let users = session.model("User").unwrap();

    assert!(users.get("missing").unwrap().is_none());
    assert!(!users.exists("missing").unwrap());
}

#[test]
fn update_assigns_and_saves() {
    let session = session();
    let users = session.model("User").unwrap();
    let user = users
        .create(attrs(&[
            ("name", json!("Ada")),
            ("email", json!("ada@example.com")),
        ]))
        .unwrap();

    user.update(&session, attrs(&[("name", json!("Grace"))]))
        .unwrap();

    let fetched = users.get(&user.id().unwrap()).unwrap().unwrap();
    assert_eq!(fetched.get("name").unwrap(), json!("Grace"));
    assert_eq!(fetched.get("email").unwrap(), json!("ada@example.com"));
}

#[test]
fn reload_discards_local_edits() {
    let session = session();
    let users = session.model("User").unwrap();
    let user = users.create(attrs(&[("name", json!("Ada"))])).unwrap();

    user.set("name", json!("scratch")).unwrap();
    user.reload(&session).unwrap();
    assert_eq!(user.get("name").unwrap(), json!("Ada"));
}

#[test]
fn reload_is_a_noop_for_new_and_vanished_records() {
    let session = session();
    let users = session.model("User").unwrap();

    let fresh = users.new_entity(attrs(&[("name", json!("Ada"))])).unwrap();
    fresh.reload(&session).unwrap();
    assert_eq!(fresh.get("name").unwrap(), json!("Ada"));

    let saved = users.create(attrs(&[("name", json!("Grace"))])).unwrap();
    let id = saved.id().unwrap();
    session
        .store()
        .delete(users.schema().bucket_name(), &id)
        .unwrap();
    saved.set("name", json!("local")).unwrap();
    saved.reload(&session).unwrap();
    assert_eq!(saved.get("name").unwrap(), json!("local"));
}

#[test]
fn delete_removes_the_record_and_freezes_the_instance() {
    let session = session();
    let users = session.model("User").unwrap();
    let user = users.create(attrs(&[("name", json!("Ada"))])).unwrap();
    let id = user.id().unwrap();

    assert!(user.delete(&session).unwrap());
    assert!(user.is_frozen());
    assert!(!users.exists(&id).unwrap());

    // Identity is retained; mutation is not.
    assert_eq!(user.id().unwrap(), id);
    assert!(matches!(
        user.set("name", json!("x")),
        Err(ModelError::Frozen)
    ));
    assert!(matches!(user.save(&session), Err(ModelError::Frozen)));
}

#[test]
fn failed_delete_reports_false_and_stays_mutable() {
    let store = Arc::new(FlakyStore::new());
    let session = session_over(store.clone());
    let users = session.model("User").unwrap();
    let user = users.create(attrs(&[("name", json!("Ada"))])).unwrap();

    store.fail_deletes();
    assert!(!user.delete(&session).unwrap());
    assert!(!user.is_frozen());
    user.set("name", json!("still writable")).unwrap();
}

#[test]
fn unique_values_reject_a_second_record() {
    let session = session();
    let users = session.model("User").unwrap();
    users
        .create(attrs(&[
            ("name", json!("Ada")),
            ("email", json!("taken@example.com")),
        ]))
        .unwrap();

    let err = users
        .create(attrs(&[
            ("name", json!("Grace")),
            ("email", json!("taken@example.com")),
        ]))
        .unwrap_err();
    assert!(matches!(
        err,
        ModelError::UniqueIndexViolation { ref attribute } if attribute == "email"
    ));

    // A different value passes.
    users
        .create(attrs(&[
            ("name", json!("Grace")),
            ("email", json!("free@example.com")),
        ]))
        .unwrap();
}

#[test]
fn resaving_an_unchanged_unique_value_is_allowed() {
    let session = session();
    let users = session.model("User").unwrap();
    let user = users
        .create(attrs(&[
            ("name", json!("Ada")),
            ("email", json!("ada@example.com")),
        ]))
        .unwrap();

    user.set("name", json!("Countess")).unwrap();
    user.save(&session).unwrap();
    assert_eq!(
        users.get(&user.id().unwrap()).unwrap().unwrap().get("name").unwrap(),
        json!("Countess")
    );
}

#[test]
fn absent_unique_values_are_not_checked() {
    let session = session();
    let users = session.model("User").unwrap();

    // Two records with no email at all coexist.
    users.create(attrs(&[("name", json!("Ada"))])).unwrap();
    users.create(attrs(&[("name", json!("Grace"))])).unwrap();
}

#[test]
fn uniqueness_is_checked_then_written_not_enforced_by_the_store() {
    let session = session();
    let users = session.model("User").unwrap();
    let bucket = users.schema().bucket_name().to_owned();
    users
        .create(attrs(&[
            ("name", json!("Ada")),
            ("email", json!("dup@example.com")),
        ]))
        .unwrap();

    // A writer bypassing the mapper (or racing between check and write)
    // lands a duplicate; the store itself enforces nothing.
    session
        .store()
        .put(
            &bucket,
            None,
            attrs(&[
                ("_type", json!("User")),
                ("name", json!("Eve")),
                ("email", json!("dup@example.com")),
            ]),
            &[IndexAssignment::single("email_bin", "dup@example.com")],
        )
        .unwrap();
    assert_eq!(users.find("email", json!("dup@example.com")).unwrap().len().unwrap(), 2);

    // The mapper-side check still rejects further writes of the value.
    assert!(matches!(
        users
            .create(attrs(&[("email", json!("dup@example.com"))]))
            .unwrap_err(),
        ModelError::UniqueIndexViolation { .. }
    ));
}

#[test]
fn embedded_children_round_trip_polymorphically() {
    let session = session();
    let posts = session.model("Post").unwrap();
    let post = posts
        .new_entity(attrs(&[("title", json!("Entities"))]))
        .unwrap();

    let author = session
        .model("Author")
        .unwrap()
        .new_entity(attrs(&[("name", json!("Ada"))]))
        .unwrap();
    post.set_embedded("author", &author).unwrap();

    let plain = session
        .model("Tag")
        .unwrap()
        .new_entity(attrs(&[("label", json!("db"))]))
        .unwrap();
    let special = session
        .model("SpecialTag")
        .unwrap()
        .new_entity(attrs(&[("label", json!("hot")), ("weight", json!(3))]))
        .unwrap();
    post.embedded_add("tags", &plain).unwrap();
    post.embedded_add("tags", &special).unwrap();

    post.save(&session).unwrap();
    let fetched = posts.get(&post.id().unwrap()).unwrap().unwrap();

    // Each element reconstructs as its own recorded type, not the
    // statically declared one.
    let tags = fetched.embedded_collection(&session, "tags").unwrap();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0].type_name(), "Tag");
    assert_eq!(tags[1].type_name(), "SpecialTag");
    assert_eq!(tags[1].get("weight").unwrap(), json!(3));
    assert!(tags[1].parent().unwrap().same_instance(&fetched));

    let author_back = fetched.embedded(&session, "author").unwrap().unwrap();
    assert_eq!(author_back.get("name").unwrap(), json!("Ada"));
    assert!(!author_back.is_new());
}

#[test]
fn saving_an_embedded_child_saves_its_parent() {
    let session = session();
    let posts = session.model("Post").unwrap();
    let post = posts
        .new_entity(attrs(&[("title", json!("Entities"))]))
        .unwrap();
    let author = session
        .model("Author")
        .unwrap()
        .new_entity(attrs(&[("name", json!("Ada"))]))
        .unwrap();
    post.set_embedded("author", &author).unwrap();
    post.save(&session).unwrap();

    author.set("name", json!("Grace")).unwrap();
    author.save(&session).unwrap();

    let fetched = posts.get(&post.id().unwrap()).unwrap().unwrap();
    assert_eq!(
        fetched.embedded(&session, "author").unwrap().unwrap().get("name").unwrap(),
        json!("Grace")
    );
}

#[test]
fn deleting_an_embedded_child_persists_the_parent() {
    let session = session();
    let posts = session.model("Post").unwrap();
    let post = posts
        .new_entity(attrs(&[("title", json!("Entities"))]))
        .unwrap();
    let keep = session
        .model("Tag")
        .unwrap()
        .new_entity(attrs(&[("label", json!("keep"))]))
        .unwrap();
    let doomed = session
        .model("Tag")
        .unwrap()
        .new_entity(attrs(&[("label", json!("old"))]))
        .unwrap();
    post.embedded_add("tags", &keep).unwrap();
    post.embedded_add("tags", &doomed).unwrap();
    post.save(&session).unwrap();

    assert!(doomed.delete(&session).unwrap());
    assert!(doomed.is_frozen());
    assert!(matches!(doomed.parent(), Err(ModelError::ParentMissing)));

    let fetched = posts.get(&post.id().unwrap()).unwrap().unwrap();
    let tags = fetched.embedded_collection(&session, "tags").unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].get("label").unwrap(), json!("keep"));
}

#[test]
fn deleting_an_unsaved_embedded_child_skips_the_store() {
    let session = session();
    let posts = session.model("Post").unwrap();
    let post = posts
        .new_entity(attrs(&[("title", json!("Draft"))]))
        .unwrap();
    let tag = session
        .model("Tag")
        .unwrap()
        .new_entity(attrs(&[("label", json!("wip"))]))
        .unwrap();
    post.embedded_add("tags", &tag).unwrap();

    // Parent was never saved, so neither was the child.
    assert!(tag.delete(&session).unwrap());
    assert!(tag.is_frozen());
}

#[test]
fn parent_save_failure_downgrades_embedded_delete_to_false() {
    let store = Arc::new(FlakyStore::new());
    let session = session_over(store.clone());
    let posts = session.model("Post").unwrap();
    let post = posts
        .new_entity(attrs(&[("title", json!("Entities"))]))
        .unwrap();
    let tag = session
        .model("Tag")
        .unwrap()
        .new_entity(attrs(&[("label", json!("db"))]))
        .unwrap();
    post.embedded_add("tags", &tag).unwrap();
    post.save(&session).unwrap();

    store.fail_puts();
    assert!(!tag.delete(&session).unwrap());
    assert!(!tag.is_frozen());

    // The stored copy is untouched.
    let fetched = posts.get(&post.id().unwrap()).unwrap().unwrap();
    assert_eq!(fetched.embedded_collection(&session, "tags").unwrap().len(), 1);
}

proptest! {
    #[test]
    fn attributes_survive_a_store_round_trip(
        name in "\\PC{0,24}",
        email in "[a-z]{1,12}@[a-z]{1,8}\\.com",
        nickname in proptest::option::of("[a-zA-Z0-9 ]{0,16}"),
    ) {
        let session = session();
        let users = session.model("User").unwrap();

        let mut incoming = attrs(&[("name", json!(name)), ("email", json!(email))]);
        if let Some(nickname) = nickname {
            incoming.insert("nickname".to_owned(), Value::String(nickname));
        }
        let user = users.create(incoming).unwrap();
        let fetched = users.get(&user.id().unwrap()).unwrap().unwrap();
        prop_assert_eq!(fetched.attributes(), user.attributes());
    }
}
