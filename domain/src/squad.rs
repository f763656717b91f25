//! Squad entity (§3). Keyed by `(teamID, squadID)`.

use crate::ids::{EosId, SquadId, SteamId, TeamId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Squad {
    pub team_id: TeamId,
    pub squad_id: SquadId,
    pub name: String,
    pub size: u16,
    pub locked: bool,
    pub creator_name: String,
    pub creator_eos_id: EosId,
    pub creator_steam_id: Option<SteamId>,
}

impl Squad {
    pub fn key(&self) -> (TeamId, SquadId) {
        (self.team_id, self.squad_id)
    }
}
