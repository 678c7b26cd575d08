//! Behavior every [`Store`] implementation must share.

use superjob_tree::{
  NodeDef, Subjob, SubjobKind, SubjobStatus, SuperjobDef, SuperjobStatus, materialize,
};

use crate::{Error, Store};

/// `[A, parallel[B, C], D]` materialized as `sj.1` .. `sj.5`.
pub fn sample_tree(superjob_id: &str) -> Vec<Subjob> {
  let def = SuperjobDef {
    name: "sample".to_string(),
    nodes: vec![
      NodeDef::worker("A"),
      NodeDef::parallel(vec![NodeDef::worker("B"), NodeDef::worker("C")]),
      NodeDef::worker("D"),
    ],
  };
  materialize(superjob_id, &def).unwrap().1
}

async fn seed(store: &impl Store, superjob_id: &str) {
  let def = SuperjobDef {
    name: "sample".to_string(),
    nodes: vec![NodeDef::worker("A")],
  };
  let (superjob, _) = materialize(superjob_id, &def).unwrap();
  store.create_superjob(&superjob).await.unwrap();
  store
    .insert_subjobs(&sample_tree(superjob_id))
    .await
    .unwrap();
}

pub async fn superjob_round_trip(store: &impl Store) {
  seed(store, "sj").await;

  let superjob = store.get_superjob("sj").await.unwrap();
  assert_eq!(superjob.status, SuperjobStatus::Running);
  assert_eq!(superjob.name, "sample");

  let finished = chrono::Utc::now();
  store
    .update_superjob_status(
      "sj",
      SuperjobStatus::Failed,
      Some(finished),
      Some("boom".to_string()),
    )
    .await
    .unwrap();

  let superjob = store.get_superjob("sj").await.unwrap();
  assert_eq!(superjob.status, SuperjobStatus::Failed);
  assert_eq!(superjob.error.as_deref(), Some("boom"));
  assert!(superjob.completed_at.is_some());
}

pub async fn tree_queries(store: &impl Store) {
  seed(store, "sj").await;
  seed(store, "other").await;

  let top: Vec<String> = store
    .top_level("sj")
    .await
    .unwrap()
    .into_iter()
    .map(|s| s.subjob_id)
    .collect();
  assert_eq!(top, vec!["sj.1", "sj.2", "sj.5"]);

  let children = store.children("sj.2").await.unwrap();
  assert_eq!(children.len(), 2);
  assert_eq!(children[0].kind, SubjobKind::worker("B"));
  assert_eq!(children[1].kind, SubjobKind::worker("C"));

  let a = store.get_subjob("sj.1").await.unwrap();
  assert_eq!(a.next_id.as_deref(), Some("sj.2"));
  assert_eq!(a.status, SubjobStatus::Initialized);

  let all = store.list_subjobs("sj").await.unwrap();
  assert_eq!(all.len(), 5);
  assert!(all.iter().all(|s| s.superjob_id == "sj"));
}

pub async fn transition_compare_and_set(store: &impl Store) {
  seed(store, "sj").await;

  let moved = store
    .transition("sj.2", &[SubjobStatus::Initialized], SubjobStatus::Running)
    .await
    .unwrap();
  assert!(moved);

  let moved_again = store
    .transition("sj.2", &[SubjobStatus::Initialized], SubjobStatus::Running)
    .await
    .unwrap();
  assert!(!moved_again);

  let completed = store
    .transition(
      "sj.2",
      &[SubjobStatus::Running, SubjobStatus::Complete],
      SubjobStatus::Complete,
    )
    .await
    .unwrap();
  assert!(completed);
  assert_eq!(
    store.get_subjob("sj.2").await.unwrap().status,
    SubjobStatus::Complete
  );

  let backward = store
    .transition("sj.2", &[SubjobStatus::Complete], SubjobStatus::Initialized)
    .await;
  assert!(matches!(
    backward,
    Err(Error::InvalidTransition {
      from: SubjobStatus::Complete,
      to: SubjobStatus::Initialized
    })
  ));
}

pub async fn queue_assigns_handle_once(store: &impl Store) {
  seed(store, "sj").await;

  assert!(store.queue("sj.1", "handle-1").await.unwrap());
  assert!(!store.queue("sj.1", "handle-2").await.unwrap());

  let subjob = store.find_by_handle("handle-1").await.unwrap();
  assert_eq!(subjob.subjob_id, "sj.1");
  assert_eq!(subjob.status, SubjobStatus::Queued);
  assert_eq!(subjob.job_handle.as_deref(), Some("handle-1"));

  assert!(matches!(
    store.find_by_handle("handle-2").await,
    Err(Error::NotFound(_))
  ));
}

pub async fn descendants_flag_flips_once(store: &impl Store) {
  seed(store, "sj").await;

  assert!(store.mark_descendants_complete("sj.3").await.unwrap());
  assert!(!store.mark_descendants_complete("sj.3").await.unwrap());
  assert!(
    store
      .get_subjob("sj.3")
      .await
      .unwrap()
      .descendants_are_complete
  );
}

pub async fn delete_subjobs(store: &impl Store) {
  seed(store, "sj").await;
  seed(store, "keep").await;
  store.queue("sj.1", "handle-1").await.unwrap();

  let removed = store.delete_subjobs("sj").await.unwrap();
  assert_eq!(removed, 5);
  assert!(store.list_subjobs("sj").await.unwrap().is_empty());
  assert_eq!(store.list_subjobs("keep").await.unwrap().len(), 5);
  assert!(matches!(
    store.find_by_handle("handle-1").await,
    Err(Error::NotFound(_))
  ));
}

pub async fn missing_records(store: &impl Store) {
  assert!(matches!(
    store.get_superjob("nope").await,
    Err(Error::NotFound(_))
  ));
  assert!(matches!(
    store.get_subjob("nope").await,
    Err(Error::NotFound(_))
  ));
  assert!(matches!(
    store
      .transition("nope", &[SubjobStatus::Initialized], SubjobStatus::Running)
      .await,
    Err(Error::NotFound(_))
  ));
  assert!(matches!(
    store.mark_descendants_complete("nope").await,
    Err(Error::NotFound(_))
  ));
}
