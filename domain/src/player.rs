//! Player entity (§3). Keyed by `eosID`; every other identifier is optional
//! because it may not have been observed yet.

use crate::ids::{EosId, PlayerController, PlayerId, SquadId, SteamId, TeamId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub eos_id: EosId,
    pub steam_id: Option<SteamId>,
    pub player_id: Option<PlayerId>,
    pub name: Option<String>,
    pub team_id: Option<TeamId>,
    pub squad_id: Option<SquadId>,
    pub is_squad_leader: bool,
    pub role: Option<String>,
    pub controller: Option<PlayerController>,
}

impl Player {
    /// A fresh player record with only the identity we are sure of.
    pub fn new(eos_id: EosId) -> Self {
        Self {
            eos_id,
            steam_id: None,
            player_id: None,
            name: None,
            team_id: None,
            squad_id: None,
            is_squad_leader: false,
            role: None,
            controller: None,
        }
    }

    /// `(teamID, squadID)` snapshot, used by the diff engine to detect
    /// team/squad transitions (§4.11).
    pub fn squad_key(&self) -> Option<(TeamId, SquadId)> {
        match (self.team_id, self.squad_id) {
            (Some(team), Some(squad)) => Some((team, squad)),
            _ => None,
        }
    }

    /// Global invariant: `isSquadLeader` implies a non-null `squadID`.
    pub fn upholds_leader_invariant(&self) -> bool {
        !self.is_squad_leader || self.squad_id.is_some()
    }
}
