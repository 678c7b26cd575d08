//! Blueprint materialization.
//!
//! A [`SuperjobDef`] is a nested description of a subjob tree. [`materialize`]
//! flattens it into [`Subjob`] records with parent, position and next-sibling
//! links filled in, ready to be inserted into a store.
//!
//! Ids are deterministic: `<superjob_id>.<n>` where `n` counts subjobs in
//! pre-order starting at 1.

use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::kind::SubjobKind;
use crate::subjob::Subjob;
use crate::superjob::Superjob;

/// One node of a blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeDef {
  /// Every child starts at once.
  Parallel { parallel: Vec<NodeDef> },
  /// Each inner list is one lane, run as a chain.
  Batch { batch: Vec<Vec<NodeDef>> },
  /// A worker identifier. Children run as a chain once this subjob completes.
  Worker {
    worker: String,
    #[serde(default)]
    arguments: serde_json::Value,
    #[serde(default)]
    metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeDef>,
  },
}

impl NodeDef {
  pub fn worker(name: impl Into<String>) -> Self {
    NodeDef::Worker {
      worker: name.into(),
      arguments: serde_json::Value::Null,
      metadata: serde_json::Value::Null,
      children: Vec::new(),
    }
  }

  pub fn parallel(children: Vec<NodeDef>) -> Self {
    NodeDef::Parallel { parallel: children }
  }

  pub fn batch(lanes: Vec<Vec<NodeDef>>) -> Self {
    NodeDef::Batch { batch: lanes }
  }

  /// Set the arguments of a worker node. No-op for composite nodes.
  pub fn with_arguments(mut self, value: serde_json::Value) -> Self {
    if let NodeDef::Worker { arguments, .. } = &mut self {
      *arguments = value;
    }
    self
  }

  /// Set the backend metadata of a worker node. No-op for composite nodes.
  pub fn with_metadata(mut self, value: serde_json::Value) -> Self {
    if let NodeDef::Worker { metadata, .. } = &mut self {
      *metadata = value;
    }
    self
  }

  /// Set the children of a worker node. No-op for composite nodes.
  pub fn with_children(mut self, nodes: Vec<NodeDef>) -> Self {
    if let NodeDef::Worker { children, .. } = &mut self {
      *children = nodes;
    }
    self
  }
}

/// A full superjob blueprint: a name and the top-level chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperjobDef {
  pub name: String,
  pub nodes: Vec<NodeDef>,
}

/// Flatten a blueprint into a superjob record and its subjobs (pre-order).
pub fn materialize(
  superjob_id: &str,
  def: &SuperjobDef,
) -> Result<(Superjob, Vec<Subjob>), TreeError> {
  if def.nodes.is_empty() {
    return Err(TreeError::EmptyGroup("top-level chain"));
  }

  let mut materializer = Materializer {
    superjob_id,
    subjobs: Vec::new(),
  };
  materializer.siblings(&def.nodes, None, true)?;

  Ok((Superjob::new(superjob_id, &def.name), materializer.subjobs))
}

struct Materializer<'a> {
  superjob_id: &'a str,
  subjobs: Vec<Subjob>,
}

impl Materializer<'_> {
  /// Materialize a sibling list. Sequential lists get `next_id` links.
  fn siblings(
    &mut self,
    defs: &[NodeDef],
    parent_id: Option<&str>,
    sequential: bool,
  ) -> Result<(), TreeError> {
    let mut previous: Option<usize> = None;

    for (position, def) in defs.iter().enumerate() {
      let index = self.node(def, parent_id, position as u32)?;
      if sequential {
        if let Some(prev) = previous {
          let next_id = self.subjobs[index].subjob_id.clone();
          self.subjobs[prev].next_id = Some(next_id);
        }
        previous = Some(index);
      }
    }

    Ok(())
  }

  fn push(&mut self, kind: SubjobKind, parent_id: Option<&str>, position: u32) -> (usize, String) {
    let index = self.subjobs.len();
    let subjob_id = format!("{}.{}", self.superjob_id, index + 1);

    let mut subjob = Subjob::new(subjob_id.clone(), self.superjob_id, kind);
    subjob.parent_id = parent_id.map(str::to_string);
    subjob.position = position;
    self.subjobs.push(subjob);

    (index, subjob_id)
  }

  fn node(
    &mut self,
    def: &NodeDef,
    parent_id: Option<&str>,
    position: u32,
  ) -> Result<usize, TreeError> {
    match def {
      NodeDef::Worker {
        worker,
        arguments,
        metadata,
        children,
      } => {
        if worker.trim().is_empty() || SubjobKind::is_reserved(worker) {
          return Err(TreeError::InvalidWorker(worker.clone()));
        }

        let (index, subjob_id) = self.push(SubjobKind::worker(worker), parent_id, position);
        self.subjobs[index].arguments = arguments.clone();
        self.subjobs[index].metadata = metadata.clone();
        self.siblings(children, Some(&subjob_id), true)?;
        Ok(index)
      }
      NodeDef::Parallel { parallel } => {
        if parallel.is_empty() {
          return Err(TreeError::EmptyGroup("parallel group"));
        }

        let (index, subjob_id) = self.push(SubjobKind::Parallel, parent_id, position);
        self.siblings(parallel, Some(&subjob_id), false)?;
        Ok(index)
      }
      NodeDef::Batch { batch } => {
        if batch.is_empty() {
          return Err(TreeError::EmptyGroup("batch group"));
        }

        let (index, subjob_id) = self.push(SubjobKind::Batch, parent_id, position);
        for (lane_position, lane) in batch.iter().enumerate() {
          if lane.is_empty() {
            return Err(TreeError::EmptyGroup("batch lane"));
          }
          let (_, lane_id) =
            self.push(SubjobKind::BatchChild, Some(&subjob_id), lane_position as u32);
          self.siblings(lane, Some(&lane_id), true)?;
        }
        Ok(index)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::status::SubjobStatus;
  use serde_json::json;

  fn find<'a>(subjobs: &'a [Subjob], id: &str) -> &'a Subjob {
    subjobs.iter().find(|s| s.subjob_id == id).unwrap()
  }

  #[test]
  fn test_top_level_chain_is_linked() {
    let def = SuperjobDef {
      name: "chain".to_string(),
      nodes: vec![NodeDef::worker("A"), NodeDef::worker("B"), NodeDef::worker("C")],
    };

    let (superjob, subjobs) = materialize("sj", &def).unwrap();

    assert_eq!(superjob.superjob_id, "sj");
    assert_eq!(superjob.name, "chain");
    assert_eq!(subjobs.len(), 3);
    assert_eq!(subjobs[0].next_id.as_deref(), Some("sj.2"));
    assert_eq!(subjobs[1].next_id.as_deref(), Some("sj.3"));
    assert_eq!(subjobs[2].next_id, None);
    assert!(subjobs.iter().all(|s| s.parent_id.is_none()));
    assert!(subjobs.iter().all(|s| s.status == SubjobStatus::Initialized));
    assert_eq!(
      subjobs.iter().map(|s| s.position).collect::<Vec<_>>(),
      vec![0, 1, 2]
    );
  }

  #[test]
  fn test_parallel_children_are_not_linked() {
    let def = SuperjobDef {
      name: "fanout".to_string(),
      nodes: vec![
        NodeDef::parallel(vec![NodeDef::worker("A"), NodeDef::worker("B")]),
        NodeDef::worker("C"),
      ],
    };

    let (_, subjobs) = materialize("sj", &def).unwrap();

    let parallel = find(&subjobs, "sj.1");
    assert_eq!(parallel.kind, SubjobKind::Parallel);
    assert_eq!(parallel.next_id.as_deref(), Some("sj.4"));

    for id in ["sj.2", "sj.3"] {
      let child = find(&subjobs, id);
      assert_eq!(child.parent_id.as_deref(), Some("sj.1"));
      assert_eq!(child.next_id, None);
    }
  }

  #[test]
  fn test_batch_lanes_become_batch_children() {
    let def = SuperjobDef {
      name: "batch".to_string(),
      nodes: vec![NodeDef::batch(vec![
        vec![NodeDef::worker("A1"), NodeDef::worker("A2")],
        vec![NodeDef::worker("B1"), NodeDef::worker("B2")],
      ])],
    };

    let (_, subjobs) = materialize("sj", &def).unwrap();

    // batch, lane A, A1, A2, lane B, B1, B2
    assert_eq!(subjobs.len(), 7);
    assert_eq!(subjobs[0].kind, SubjobKind::Batch);

    let lane_a = find(&subjobs, "sj.2");
    let lane_b = find(&subjobs, "sj.5");
    assert_eq!(lane_a.kind, SubjobKind::BatchChild);
    assert_eq!(lane_b.kind, SubjobKind::BatchChild);
    assert_eq!(lane_a.next_id, None);
    assert_eq!(lane_b.position, 1);

    let a1 = find(&subjobs, "sj.3");
    assert_eq!(a1.kind, SubjobKind::worker("A1"));
    assert_eq!(a1.parent_id.as_deref(), Some("sj.2"));
    assert_eq!(a1.next_id.as_deref(), Some("sj.4"));
    assert_eq!(find(&subjobs, "sj.4").next_id, None);
  }

  #[test]
  fn test_worker_children_form_a_chain() {
    let def = SuperjobDef {
      name: "nested".to_string(),
      nodes: vec![
        NodeDef::worker("Nested")
          .with_children(vec![NodeDef::worker("X"), NodeDef::worker("Y")]),
      ],
    };

    let (_, subjobs) = materialize("sj", &def).unwrap();

    assert_eq!(find(&subjobs, "sj.2").next_id.as_deref(), Some("sj.3"));
    assert_eq!(find(&subjobs, "sj.3").parent_id.as_deref(), Some("sj.1"));
  }

  #[test]
  fn test_arguments_and_metadata_pass_through() {
    let def = SuperjobDef {
      name: "payload".to_string(),
      nodes: vec![
        NodeDef::worker("Mailer")
          .with_arguments(json!([42, "hello"]))
          .with_metadata(json!({ "queue": "mail" })),
      ],
    };

    let (_, subjobs) = materialize("sj", &def).unwrap();

    assert_eq!(subjobs[0].arguments, json!([42, "hello"]));
    assert_eq!(subjobs[0].metadata, json!({ "queue": "mail" }));
  }

  #[test]
  fn test_empty_groups_rejected() {
    let empty_chain = SuperjobDef {
      name: "empty".to_string(),
      nodes: vec![],
    };
    assert!(matches!(
      materialize("sj", &empty_chain),
      Err(TreeError::EmptyGroup("top-level chain"))
    ));

    let empty_lane = SuperjobDef {
      name: "lane".to_string(),
      nodes: vec![NodeDef::batch(vec![vec![NodeDef::worker("A")], vec![]])],
    };
    assert!(matches!(
      materialize("sj", &empty_lane),
      Err(TreeError::EmptyGroup("batch lane"))
    ));

    let empty_parallel = SuperjobDef {
      name: "parallel".to_string(),
      nodes: vec![NodeDef::parallel(vec![])],
    };
    assert!(matches!(
      materialize("sj", &empty_parallel),
      Err(TreeError::EmptyGroup("parallel group"))
    ));
  }

  #[test]
  fn test_reserved_worker_names_rejected() {
    let def = SuperjobDef {
      name: "reserved".to_string(),
      nodes: vec![NodeDef::worker("batch_child")],
    };

    assert!(matches!(
      materialize("sj", &def),
      Err(TreeError::InvalidWorker(name)) if name == "batch_child"
    ));
  }

  #[test]
  fn test_deserializes_from_json() {
    let def: SuperjobDef = serde_json::from_value(json!({
      "name": "from-json",
      "nodes": [
        { "worker": "Fetch", "arguments": [1] },
        { "parallel": [{ "worker": "A" }, { "worker": "B" }] },
        { "batch": [[{ "worker": "L1" }], [{ "worker": "L2" }]] }
      ]
    }))
    .unwrap();

    assert_eq!(def.nodes.len(), 3);
    assert!(matches!(&def.nodes[1], NodeDef::Parallel { parallel } if parallel.len() == 2));
    assert!(matches!(&def.nodes[2], NodeDef::Batch { batch } if batch.len() == 2));
  }
}
