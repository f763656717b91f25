//! Squad service (§4.11): diffs the latest `ListSquads` snapshot against
//! the canonical map and drops squads no longer reported. Unlike the
//! player service there is no tombstone grace period — a squad that
//! disappears from one listing to the next is gone immediately, since
//! squads carry no log-derived disconnect signal to wait on.

use std::collections::HashMap;

use domain::ids::{SquadId, TeamId};
use domain::squad::Squad;

#[derive(Default)]
pub struct SquadService {
    squads: HashMap<(TeamId, SquadId), Squad>,
}

impl SquadService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, team_id: TeamId, squad_id: SquadId) -> Option<&Squad> {
        self.squads.get(&(team_id, squad_id))
    }

    pub fn all(&self) -> impl Iterator<Item = &Squad> {
        self.squads.values()
    }

    pub fn len(&self) -> usize {
        self.squads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.squads.is_empty()
    }

    /// Replaces the canonical map with `list`. Returns the keys of squads
    /// that were present before and are now gone, for callers that want to
    /// log the removal.
    pub fn update_from_rcon(&mut self, list: Vec<Squad>) -> Vec<(TeamId, SquadId)> {
        let incoming: HashMap<(TeamId, SquadId), Squad> = list.into_iter().map(|squad| (squad.key(), squad)).collect();
        let removed: Vec<(TeamId, SquadId)> = self.squads.keys().filter(|&key| !incoming.contains_key(key)).copied().collect();
        self.squads = incoming;
        removed
    }
}
