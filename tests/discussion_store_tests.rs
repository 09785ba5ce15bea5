use dg::{
    discussion::{DiscussionStore, DiscussionUpdate},
    error::GraderError,
};
use tempfile::TempDir;

fn store() -> (TempDir, DiscussionStore) {
    let dir = TempDir::new().expect("create temp dir");
    let store = DiscussionStore::new(dir.path()).expect("open store");
    (dir, store)
}

#[test]
fn create_then_get_round_trips_all_fields() {
    let (_dir, store) = store();
    let id = store
        .create("Unit testing", 8, 100, Some("Why write unit tests?"))
        .expect("create");

    let discussion = store.get(id).expect("get");
    assert_eq!(discussion.id, id);
    assert_eq!(discussion.title, "Unit testing");
    assert_eq!(discussion.points, 8);
    assert_eq!(discussion.min_words, 100);
    assert_eq!(discussion.question_content, "Why write unit tests?");

    // The id is stable across repeated reads.
    assert_eq!(store.get(id).expect("get again").id, id);
}

#[test]
fn identifiers_are_assigned_monotonically() {
    let (_dir, store) = store();
    let first = store.create("a", 12, 300, None).unwrap();
    let second = store.create("b", 12, 300, None).unwrap();
    let third = store.create("c", 12, 300, None).unwrap();
    assert_eq!((first, second, third), (1, 2, 3));
}

#[test]
fn list_orders_by_id_ascending() {
    let (_dir, store) = store();
    for title in ["one", "two", "three"] {
        store.create(title, 12, 300, None).unwrap();
    }
    let listed = store.list().expect("list");
    let ids: Vec<u32> = listed.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn list_skips_directories_with_broken_metadata() {
    let (dir, store) = store();
    store.create("ok", 12, 300, None).unwrap();
    std::fs::create_dir_all(dir.path().join("discussion_9")).unwrap();
    std::fs::write(dir.path().join("discussion_9/metadata.json"), "not json").unwrap();

    let listed = store.list().expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, 1);
}

#[test]
fn update_changes_only_the_provided_fields() {
    let (_dir, store) = store();
    let id = store.create("Original", 12, 300, Some("question")).unwrap();
    let before = store.get(id).unwrap();

    let updated = store
        .update(
            id,
            DiscussionUpdate {
                points: Some(20),
                ..DiscussionUpdate::default()
            },
        )
        .expect("update");

    assert_eq!(updated.points, 20);
    assert_eq!(updated.title, "Original");
    assert_eq!(updated.min_words, 300);
    assert_eq!(updated.question_content, "question");
    assert_eq!(updated.created_at, before.created_at);
    assert!(updated.updated_at >= before.updated_at);
}

#[test]
fn question_only_update_still_refreshes_updated_at() {
    let (_dir, store) = store();
    let id = store.create("t", 12, 300, Some("old question")).unwrap();
    let before = store.get(id).unwrap();

    let updated = store
        .update(
            id,
            DiscussionUpdate {
                question_content: Some("new question".to_string()),
                ..DiscussionUpdate::default()
            },
        )
        .unwrap();

    assert_eq!(updated.question_content, "new question");
    assert!(updated.updated_at >= before.updated_at);
}

#[test]
fn get_and_update_report_missing_discussions() {
    let (_dir, store) = store();
    assert!(matches!(
        store.get(42).unwrap_err(),
        GraderError::DiscussionNotFound(42)
    ));
    assert!(matches!(
        store.update(42, DiscussionUpdate::default()).unwrap_err(),
        GraderError::DiscussionNotFound(42)
    ));
}

#[test]
fn find_or_create_matches_whitespace_and_case_variants() {
    let (_dir, store) = store();
    let first = store
        .find_or_create("What are the benefits of CI?", 8, 100, "CI")
        .expect("first");
    let second = store
        .find_or_create("  what are   the Benefits\nof CI?  ", 8, 100, "CI again")
        .expect("second");
    assert_eq!(first, second);

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
}

#[test]
fn find_or_create_creates_for_genuinely_new_questions() {
    let (_dir, store) = store();
    let first = store.find_or_create("question one", 8, 100, "t1").unwrap();
    let second = store.find_or_create("question two", 8, 100, "t2").unwrap();
    assert_ne!(first, second);
}
