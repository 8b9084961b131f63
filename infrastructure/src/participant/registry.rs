//! Client registry: the single owner of every participant client.
//!
//! Creation is deduplicated per identity: the first caller starts a spawned
//! creation task and stores a shared handle to it; everyone else arriving
//! before it settles awaits the same handle. The slot map lock is never held
//! across an await.
//!
//! Each record carries a generation number. A watcher task evicts a record
//! once it reaches a terminal state, but only if the slot still holds that
//! generation, so an eviction can never remove a newer replacement.

use super::client::{ClientOptions, ParticipantClient};
use super::error::{ClientError, Result};
use super::process::Launcher;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use quorum_application::SpawnSpecProvider;
use quorum_domain::{LifecycleState, ParticipantId, SpawnSpec};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

type Creation = Shared<BoxFuture<'static, Result<ParticipantClient>>>;

enum Slot {
    /// Spawn or handshake still running
    Pending {
        generation: u64,
        state: watch::Receiver<LifecycleState>,
        creation: Creation,
    },
    Live {
        generation: u64,
        client: ParticipantClient,
    },
}

impl Slot {
    fn generation(&self) -> u64 {
        match self {
            Slot::Pending { generation, .. } | Slot::Live { generation, .. } => *generation,
        }
    }

    fn entry(&self) -> Entry {
        match self {
            Slot::Pending { creation, .. } => Entry::Creating(creation.clone()),
            Slot::Live { client, .. } => Entry::Live(client.clone()),
        }
    }
}

/// A slot's content, cloned out from under the lock
enum Entry {
    Creating(Creation),
    Live(ParticipantClient),
}

impl Entry {
    /// The client behind this entry, once creation has settled
    async fn resolve(self) -> Option<ParticipantClient> {
        match self {
            Entry::Live(client) => Some(client),
            Entry::Creating(creation) => creation.await.ok(),
        }
    }
}

/// Outcome of [`ClientRegistry::close_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseSummary {
    /// Clients that reached a terminal state
    pub closed: usize,
    /// Clients that had to be killed
    pub forced: usize,
}

struct RegistryInner {
    specs: Arc<dyn SpawnSpecProvider>,
    launcher: Arc<dyn Launcher>,
    options: ClientOptions,
    slots: Mutex<HashMap<ParticipantId, Slot>>,
    next_generation: AtomicU64,
}

impl RegistryInner {
    fn slots(&self) -> MutexGuard<'_, HashMap<ParticipantId, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove the slot for `id` if it still holds `generation`
    fn evict(&self, id: &ParticipantId, generation: u64) -> bool {
        let mut slots = self.slots();
        if slots.get(id).is_some_and(|slot| slot.generation() == generation) {
            slots.remove(id);
            debug!("Evicted participant {} (generation {})", id, generation);
            true
        } else {
            false
        }
    }
}

/// Owns all participant clients, creating them on demand
#[derive(Clone)]
pub struct ClientRegistry {
    inner: Arc<RegistryInner>,
}

impl ClientRegistry {
    pub fn new(
        specs: Arc<dyn SpawnSpecProvider>,
        launcher: Arc<dyn Launcher>,
        options: ClientOptions,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                specs,
                launcher,
                options,
                slots: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Return the Ready/InUse client for `id`, creating it if needed.
    ///
    /// Concurrent callers share one creation. A record that is still closing
    /// is allowed to finish before its replacement is spawned.
    pub async fn get_or_create(&self, id: &ParticipantId) -> Result<ParticipantClient> {
        let creation = {
            let mut slots = self.inner.slots();
            match slots.get(id) {
                Some(Slot::Live { client, .. }) if client.state().accepts_calls() => {
                    return Ok(client.clone());
                }
                Some(Slot::Pending { creation, .. }) => creation.clone(),
                existing => {
                    let previous = match existing {
                        Some(Slot::Live { client, .. }) => Some(client.clone()),
                        _ => None,
                    };
                    let spec = self
                        .inner
                        .specs
                        .spawn_spec(id)
                        .ok_or_else(|| ClientError::UnknownParticipant(id.to_string()))?;
                    let (slot, creation) = self.start_creation(id, spec, previous);
                    slots.insert(id.clone(), slot);
                    creation
                }
            }
        };

        creation.await
    }

    /// Start the creation task for `id`; the caller inserts the slot
    fn start_creation(
        &self,
        id: &ParticipantId,
        spec: SpawnSpec,
        previous: Option<ParticipantClient>,
    ) -> (Slot, Creation) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let (state_tx, state_rx) = watch::channel(LifecycleState::Spawning);
        let inner = Arc::clone(&self.inner);
        let id = id.clone();

        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                debug!("Waiting for previous {} to finish closing", id);
                previous.wait_terminal().await;
            }

            let result = ParticipantClient::spawn_with_state(
                id.clone(),
                &spec,
                inner.launcher.as_ref(),
                inner.options.clone(),
                state_tx,
            )
            .await;

            match result {
                Ok(client) => Self::install(&inner, &id, generation, client).await,
                Err(e) => {
                    inner.evict(&id, generation);
                    Err(e)
                }
            }
        });

        let creation = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(ClientError::ClientTerminated(format!(
                    "creation task failed: {}",
                    e
                ))),
            }
        }
        .boxed()
        .shared();

        let slot = Slot::Pending {
            generation,
            state: state_rx,
            creation: creation.clone(),
        };
        (slot, creation)
    }

    /// Promote a finished creation to a live record, unless it was replaced
    async fn install(
        inner: &Arc<RegistryInner>,
        id: &ParticipantId,
        generation: u64,
        client: ParticipantClient,
    ) -> Result<ParticipantClient> {
        let installed = {
            let mut slots = inner.slots();
            let current = slots
                .get(id)
                .is_some_and(|slot| slot.generation() == generation);
            if current {
                slots.insert(
                    id.clone(),
                    Slot::Live {
                        generation,
                        client: client.clone(),
                    },
                );
            }
            current
        };

        if !installed {
            debug!("Participant {} was removed while starting, closing it", id);
            client.close().await;
            return Err(ClientError::ClientTerminated(format!(
                "participant {} was removed while starting",
                id
            )));
        }

        Self::spawn_watcher(inner, id.clone(), generation, &client);
        Ok(client)
    }

    /// Evict the record once its client reaches Closed or Failed
    fn spawn_watcher(
        inner: &Arc<RegistryInner>,
        id: ParticipantId,
        generation: u64,
        client: &ParticipantClient,
    ) {
        let weak = Arc::downgrade(inner);
        let mut state = client.watch_state();

        tokio::spawn(async move {
            let _ = state.wait_for(|s| s.is_terminal()).await;
            if let Some(inner) = weak.upgrade() {
                inner.evict(&id, generation);
            }
        });
    }

    /// Close and evict the record for `id`.
    ///
    /// Returns `false` if there was none.
    pub async fn remove(&self, id: &ParticipantId) -> bool {
        let found = self
            .inner
            .slots()
            .get(id)
            .map(|slot| (slot.generation(), slot.entry()));
        let Some((generation, entry)) = found else {
            return false;
        };

        if let Some(client) = entry.resolve().await {
            client.close().await;
        }
        self.inner.evict(id, generation);
        true
    }

    /// Close every record, force-killing whatever is left at `deadline`
    pub async fn close_all(&self, deadline: Duration) -> CloseSummary {
        let deadline_at = tokio::time::Instant::now() + deadline;
        let entries: Vec<(ParticipantId, u64, Entry)> = self
            .inner
            .slots()
            .iter()
            .map(|(id, slot)| (id.clone(), slot.generation(), slot.entry()))
            .collect();

        if entries.is_empty() {
            return CloseSummary::default();
        }
        info!("Closing {} participants", entries.len());

        let resolved = join_all(entries.into_iter().map(|(id, generation, entry)| async move {
            match tokio::time::timeout_at(deadline_at, entry.resolve()).await {
                Ok(client) => (id, generation, client),
                Err(_) => {
                    warn!("Participant {} still starting at shutdown deadline", id);
                    (id, generation, None)
                }
            }
        }))
        .await;

        let clients: Vec<ParticipantClient> = resolved
            .iter()
            .filter_map(|(_, _, client)| client.clone())
            .collect();

        let mut closing = JoinSet::new();
        for client in &clients {
            let client = client.clone();
            closing.spawn(async move { client.close().await });
        }

        let drained = tokio::time::timeout_at(deadline_at, async {
            while closing.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            let stragglers: Vec<_> = clients
                .iter()
                .filter(|client| !client.state().is_terminal())
                .collect();
            warn!(
                "{} participants still closing at deadline, killing",
                stragglers.len()
            );
            join_all(stragglers.into_iter().map(|client| client.force_kill())).await;
            while closing.join_next().await.is_some() {}
        }

        for (id, generation, _) in &resolved {
            self.inner.evict(id, *generation);
        }

        let summary = CloseSummary {
            closed: clients
                .iter()
                .filter(|client| client.state().is_terminal())
                .count(),
            forced: clients.iter().filter(|client| client.was_killed()).count(),
        };
        info!(
            "Closed {} participants ({} killed)",
            summary.closed, summary.forced
        );
        summary
    }

    /// Number of records holding a started client
    pub fn live_count(&self) -> usize {
        self.inner
            .slots()
            .values()
            .filter(|slot| matches!(slot, Slot::Live { .. }))
            .count()
    }

    /// Lifecycle state of the record for `id`, if any
    pub fn state_of(&self, id: &ParticipantId) -> Option<LifecycleState> {
        self.inner.slots().get(id).map(|slot| match slot {
            Slot::Pending { state, .. } => *state.borrow(),
            Slot::Live { client, .. } => client.state(),
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }
}
