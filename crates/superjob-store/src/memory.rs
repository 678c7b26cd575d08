//! In-memory store.
//!
//! Subjobs live in an arena keyed by id. Every operation takes the lock once,
//! so each update is atomic and immediately visible to later reads.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use superjob_tree::{Subjob, SubjobStatus, Superjob, SuperjobStatus};

use crate::{Error, Store, check_transition};

struct Entry {
  seq: u64,
  subjob: Subjob,
}

#[derive(Default)]
struct State {
  superjobs: HashMap<String, Superjob>,
  subjobs: HashMap<String, Entry>,
  handles: HashMap<String, String>,
  next_seq: u64,
}

impl State {
  fn subjob_mut(&mut self, subjob_id: &str) -> Result<&mut Subjob, Error> {
    self
      .subjobs
      .get_mut(subjob_id)
      .map(|entry| &mut entry.subjob)
      .ok_or_else(|| Error::NotFound(format!("subjob {}", subjob_id)))
  }

  /// Subjobs matching `filter`, sorted by `key`.
  fn collect<F, K>(&self, filter: F, key: K) -> Vec<Subjob>
  where
    F: Fn(&Subjob) -> bool,
    K: Fn(&Entry) -> (u32, u64),
  {
    let mut entries: Vec<&Entry> = self.subjobs.values().filter(|e| filter(&e.subjob)).collect();
    entries.sort_by_key(|e| key(e));
    entries.into_iter().map(|e| e.subjob.clone()).collect()
  }
}

/// A [`Store`] kept entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
  state: RwLock<State>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn read(&self) -> Result<RwLockReadGuard<'_, State>, Error> {
    self.state.read().map_err(|_| Error::LockPoisoned)
  }

  fn write(&self) -> Result<RwLockWriteGuard<'_, State>, Error> {
    self.state.write().map_err(|_| Error::LockPoisoned)
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn create_superjob(&self, superjob: &Superjob) -> Result<(), Error> {
    let mut state = self.write()?;
    if state.superjobs.contains_key(&superjob.superjob_id) {
      return Err(Error::AlreadyExists(format!(
        "superjob {}",
        superjob.superjob_id
      )));
    }
    state
      .superjobs
      .insert(superjob.superjob_id.clone(), superjob.clone());
    Ok(())
  }

  async fn get_superjob(&self, superjob_id: &str) -> Result<Superjob, Error> {
    self
      .read()?
      .superjobs
      .get(superjob_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(format!("superjob {}", superjob_id)))
  }

  async fn update_superjob_status(
    &self,
    superjob_id: &str,
    status: SuperjobStatus,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
  ) -> Result<(), Error> {
    let mut state = self.write()?;
    let superjob = state
      .superjobs
      .get_mut(superjob_id)
      .ok_or_else(|| Error::NotFound(format!("superjob {}", superjob_id)))?;
    superjob.status = status;
    superjob.completed_at = completed_at;
    superjob.error = error;
    Ok(())
  }

  async fn insert_subjobs(&self, subjobs: &[Subjob]) -> Result<(), Error> {
    let mut state = self.write()?;

    if let Some(existing) = subjobs
      .iter()
      .find(|s| state.subjobs.contains_key(&s.subjob_id))
    {
      return Err(Error::AlreadyExists(format!("subjob {}", existing.subjob_id)));
    }

    for subjob in subjobs {
      let seq = state.next_seq;
      state.next_seq += 1;
      if let Some(handle) = &subjob.job_handle {
        state.handles.insert(handle.clone(), subjob.subjob_id.clone());
      }
      state.subjobs.insert(
        subjob.subjob_id.clone(),
        Entry {
          seq,
          subjob: subjob.clone(),
        },
      );
    }
    Ok(())
  }

  async fn get_subjob(&self, subjob_id: &str) -> Result<Subjob, Error> {
    self
      .read()?
      .subjobs
      .get(subjob_id)
      .map(|entry| entry.subjob.clone())
      .ok_or_else(|| Error::NotFound(format!("subjob {}", subjob_id)))
  }

  async fn find_by_handle(&self, job_handle: &str) -> Result<Subjob, Error> {
    let state = self.read()?;
    state
      .handles
      .get(job_handle)
      .and_then(|subjob_id| state.subjobs.get(subjob_id))
      .map(|entry| entry.subjob.clone())
      .ok_or_else(|| Error::NotFound(format!("job handle {}", job_handle)))
  }

  async fn children(&self, parent_id: &str) -> Result<Vec<Subjob>, Error> {
    Ok(self.read()?.collect(
      |s| s.parent_id.as_deref() == Some(parent_id),
      |e| (e.subjob.position, e.seq),
    ))
  }

  async fn top_level(&self, superjob_id: &str) -> Result<Vec<Subjob>, Error> {
    Ok(self.read()?.collect(
      |s| s.superjob_id == superjob_id && s.parent_id.is_none(),
      |e| (e.subjob.position, e.seq),
    ))
  }

  async fn list_subjobs(&self, superjob_id: &str) -> Result<Vec<Subjob>, Error> {
    Ok(
      self
        .read()?
        .collect(|s| s.superjob_id == superjob_id, |e| (0, e.seq)),
    )
  }

  async fn delete_subjobs(&self, superjob_id: &str) -> Result<u64, Error> {
    let mut state = self.write()?;
    let before = state.subjobs.len();
    state
      .subjobs
      .retain(|_, entry| entry.subjob.superjob_id != superjob_id);
    let State {
      subjobs, handles, ..
    } = &mut *state;
    handles.retain(|_, subjob_id| subjobs.contains_key(subjob_id));
    Ok((before - subjobs.len()) as u64)
  }

  async fn transition(
    &self,
    subjob_id: &str,
    from: &[SubjobStatus],
    to: SubjobStatus,
  ) -> Result<bool, Error> {
    check_transition(from, to)?;

    let mut state = self.write()?;
    let subjob = state.subjob_mut(subjob_id)?;
    if !from.contains(&subjob.status) {
      return Ok(false);
    }
    subjob.status = to;
    Ok(true)
  }

  async fn queue(&self, subjob_id: &str, job_handle: &str) -> Result<bool, Error> {
    let mut state = self.write()?;
    let subjob = state.subjob_mut(subjob_id)?;
    if subjob.status != SubjobStatus::Initialized {
      return Ok(false);
    }
    subjob.status = SubjobStatus::Queued;
    subjob.job_handle = Some(job_handle.to_string());
    state
      .handles
      .insert(job_handle.to_string(), subjob_id.to_string());
    Ok(true)
  }

  async fn mark_descendants_complete(&self, subjob_id: &str) -> Result<bool, Error> {
    let mut state = self.write()?;
    let subjob = state.subjob_mut(subjob_id)?;
    if subjob.descendants_are_complete {
      return Ok(false);
    }
    subjob.descendants_are_complete = true;
    Ok(true)
  }
}
