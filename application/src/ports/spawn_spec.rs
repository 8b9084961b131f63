//! Spawn specification provider port
//!
//! The core needs only `(identity) -> spawn spec` plus the default roster;
//! where that comes from (TOML file, CLI flags, tests) is an adapter concern.

use quorum_domain::{ParticipantId, SpawnSpec};

/// Lookup of participant launch specifications
pub trait SpawnSpecProvider: Send + Sync {
    /// Spawn spec for `id`, or `None` if the participant is unknown
    fn spawn_spec(&self, id: &ParticipantId) -> Option<SpawnSpec>;

    /// Participants used when a request does not name any, in roster order
    fn default_participants(&self) -> Vec<ParticipantId>;
}

/// Fixed, ordered roster of participants
#[derive(Debug, Clone, Default)]
pub struct StaticSpawnSpecs {
    entries: Vec<(ParticipantId, SpawnSpec)>,
}

impl StaticSpawnSpecs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant; a later entry for the same id replaces the earlier one
    pub fn with(mut self, id: ParticipantId, spec: SpawnSpec) -> Self {
        self.insert(id, spec);
        self
    }

    pub fn insert(&mut self, id: ParticipantId, spec: SpawnSpec) {
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = spec,
            None => self.entries.push((id, spec)),
        }
    }

    /// Keep only the listed participants (roster order is preserved)
    pub fn retain(&mut self, keep: &[ParticipantId]) {
        self.entries.retain(|(id, _)| keep.contains(id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SpawnSpecProvider for StaticSpawnSpecs {
    fn spawn_spec(&self, id: &ParticipantId) -> Option<SpawnSpec> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, spec)| spec.clone())
    }

    fn default_participants(&self) -> Vec<ParticipantId> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }
}
