//! [`host_api::ReadModel`] implemented over the state services (C11).
//! §5: "Plugins access them through read-only views; mutations are
//! impossible from plugin code" — every method here returns an owned
//! clone, never a reference into the orchestrator's guarded maps.

use domain::ids::{EosId, SquadId, SteamId, TeamId};
use domain::layer::Layer;
use domain::player::Player;
use domain::squad::Squad;
use host_api::ReadModel;

use crate::Orchestrator;

impl ReadModel for Orchestrator {
    fn player(&self, eos_id: &EosId) -> Option<Player> {
        self.shared().players.get(eos_id).cloned()
    }

    fn player_by_steam_id(&self, steam_id: &SteamId) -> Option<Player> {
        self.shared().players.by_steam_id(steam_id).cloned()
    }

    fn players(&self) -> Vec<Player> {
        self.shared().players.all().cloned().collect()
    }

    fn squad(&self, team_id: TeamId, squad_id: SquadId) -> Option<Squad> {
        self.shared().squads.get(team_id, squad_id).cloned()
    }

    fn squads(&self) -> Vec<Squad> {
        self.shared().squads.all().cloned().collect()
    }

    fn current_layer(&self) -> Option<Layer> {
        self.shared().layers.current().cloned()
    }

    fn next_layer(&self) -> Option<Layer> {
        self.shared().layers.next().cloned()
    }

    fn has_permission(&self, identity: &str, permission: &str) -> bool {
        self.0.admin_roster.lock().unwrap().has_permission(identity, permission)
    }
}
