//! Player service (§4.11): the canonical player map, keyed by `eosID`,
//! with secondary indices on `steamID`/`playerID`/name. `update_from_rcon`
//! performs the three-way diff against a fresh `ListPlayers` snapshot and
//! synthesizes the four transition events the orchestrator re-delivers to
//! plugins.

use std::collections::{HashMap, HashSet};

use domain::event::{Event, PlayerLeaderChange, PlayerRoleChange, PlayerSquadChange, PlayerTeamChange};
use domain::ids::{EosId, PlayerId, SteamId};
use domain::player::Player;

struct PlayerRecord {
    player: Player,
    /// Set when a listing no longer reports this player. Cleared again if
    /// they reappear in a later listing. Actual removal only happens via
    /// [`PlayerService::apply_map_change`] (§4.11).
    tombstoned: bool,
}

#[derive(Default)]
pub struct PlayerService {
    players: HashMap<EosId, PlayerRecord>,
    by_steam_id: HashMap<SteamId, EosId>,
    by_player_id: HashMap<PlayerId, EosId>,
    by_name: HashMap<String, Vec<EosId>>,
}

impl PlayerService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, eos_id: &EosId) -> Option<&Player> {
        self.players.get(eos_id).map(|r| &r.player)
    }

    pub fn by_steam_id(&self, steam_id: &SteamId) -> Option<&Player> {
        self.by_steam_id.get(steam_id).and_then(|eos| self.get(eos))
    }

    pub fn by_player_id(&self, player_id: &PlayerId) -> Option<&Player> {
        self.by_player_id.get(player_id).and_then(|eos| self.get(eos))
    }

    pub fn by_name(&self, name: &str) -> Vec<&Player> {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|eos| self.get(eos))
            .collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &Player> {
        self.players.values().map(|r| &r.player)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    fn index(&mut self, eos_id: EosId, player: &Player) {
        if let Some(steam_id) = &player.steam_id {
            self.by_steam_id.insert(steam_id.clone(), eos_id.clone());
        }
        if let Some(player_id) = &player.player_id {
            self.by_player_id.insert(*player_id, eos_id.clone());
        }
        if let Some(name) = &player.name {
            let bucket = self.by_name.entry(name.clone()).or_default();
            if !bucket.contains(&eos_id) {
                bucket.push(eos_id.clone());
            }
        }
    }

    /// Feeds in the latest `ListPlayers` result. Additions are recorded
    /// silently (`PLAYER_APPEARED` is an internal bookkeeping signal only,
    /// per §4.11 — it has no plugin-facing event). Players missing from
    /// `list` are tombstoned, not removed; removal happens only through
    /// [`apply_map_change`]. Returns the team/squad/role/leader transition
    /// events synthesized for players present in both the old and new
    /// snapshot.
    pub fn update_from_rcon(&mut self, list: Vec<Player>) -> Vec<Event> {
        let mut events = Vec::new();
        let mut seen: HashSet<EosId> = HashSet::with_capacity(list.len());

        for incoming in list {
            let eos_id = incoming.eos_id.clone();
            seen.insert(eos_id.clone());

            match self.players.get(&eos_id) {
                Some(existing) => {
                    let previous = existing.player.clone();
                    events.extend(diff_events(&previous, &incoming));
                }
                None => {
                    tracing::debug!(eos_id = %eos_id, "player appeared");
                }
            }

            self.index(eos_id.clone(), &incoming);
            self.players.insert(eos_id, PlayerRecord { player: incoming, tombstoned: false });
        }

        for (eos_id, record) in self.players.iter_mut() {
            if !seen.contains(eos_id) {
                record.tombstoned = true;
            }
        }

        events
    }

    /// Called when a `NEW_GAME` event arrives, carrying the set of
    /// `eosID`s the log correlator observed disconnecting during the
    /// previous map. Any player both tombstoned and in that set is
    /// actually removed now; everything else is left alone — a missed
    /// map-change event leaves stale tombstones lingering, which is the
    /// documented, deliberately tolerated behaviour (§9 open questions).
    pub fn apply_map_change(&mut self, disconnected: &[EosId]) {
        let disconnected: HashSet<&EosId> = disconnected.iter().collect();
        let to_remove: Vec<EosId> = self
            .players
            .iter()
            .filter(|entry| entry.1.tombstoned && disconnected.contains(entry.0))
            .map(|entry| entry.0.clone())
            .collect();

        for eos_id in to_remove {
            if let Some(record) = self.players.remove(&eos_id) {
                if let Some(steam_id) = &record.player.steam_id {
                    self.by_steam_id.remove(steam_id);
                }
                if let Some(player_id) = &record.player.player_id {
                    self.by_player_id.remove(player_id);
                }
                if let Some(name) = &record.player.name {
                    if let Some(bucket) = self.by_name.get_mut(name) {
                        bucket.retain(|id| id != &eos_id);
                    }
                }
            }
        }
    }
}

fn diff_events(old: &Player, new: &Player) -> Vec<Event> {
    let mut events = Vec::new();

    if old.team_id != new.team_id {
        events.push(Event::PlayerTeamChange(PlayerTeamChange {
            player: new.clone(),
            old_team_id: old.team_id,
            new_team_id: new.team_id,
        }));
    }
    if old.squad_id != new.squad_id {
        events.push(Event::PlayerSquadChange(PlayerSquadChange {
            player: new.clone(),
            old_squad_id: old.squad_id,
            new_squad_id: new.squad_id,
        }));
    }
    if old.role != new.role {
        events.push(Event::PlayerRoleChange(PlayerRoleChange {
            player: new.clone(),
            old_role: old.role.clone(),
            new_role: new.role.clone(),
        }));
    }
    if old.is_squad_leader != new.is_squad_leader {
        events.push(Event::PlayerLeaderChange(PlayerLeaderChange {
            player: new.clone(),
            is_leader: new.is_squad_leader,
        }));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ids::{SquadId, TeamId};

    fn eos(n: u8) -> EosId {
        EosId::parse(&format!("{:032x}", n)).unwrap()
    }

    fn base_player(id: u8) -> Player {
        Player {
            eos_id: eos(id),
            steam_id: None,
            player_id: None,
            name: Some(format!("P{id}")),
            team_id: Some(TeamId::parse("1").unwrap()),
            squad_id: Some(SquadId::parse("1").unwrap()),
            is_squad_leader: false,
            role: Some("Rifleman".to_string()),
            controller: None,
        }
    }

    #[test]
    fn new_players_are_indexed_without_emitting_transition_events() {
        let mut service = PlayerService::new();
        let events = service.update_from_rcon(vec![base_player(1)]);
        assert!(events.is_empty());
        assert_eq!(service.len(), 1);
        assert!(service.get(&eos(1)).is_some());
    }

    #[test]
    fn team_and_role_changes_are_synthesized() {
        let mut service = PlayerService::new();
        service.update_from_rcon(vec![base_player(1)]);

        let mut changed = base_player(1);
        changed.team_id = Some(TeamId::parse("2").unwrap());
        changed.role = Some("Medic".to_string());
        changed.is_squad_leader = true;

        let events = service.update_from_rcon(vec![changed]);
        assert!(events.iter().any(|e| matches!(e, Event::PlayerTeamChange(_))));
        assert!(events.iter().any(|e| matches!(e, Event::PlayerRoleChange(_))));
        assert!(events.iter().any(|e| matches!(e, Event::PlayerLeaderChange(_))));
        assert!(!events.iter().any(|e| matches!(e, Event::PlayerSquadChange(_))));
    }

    #[test]
    fn missing_player_is_tombstoned_not_removed() {
        let mut service = PlayerService::new();
        service.update_from_rcon(vec![base_player(1)]);
        service.update_from_rcon(vec![]);
        assert_eq!(service.len(), 1, "tombstoned players stay until a map change confirms removal");
    }

    #[test]
    fn tombstoned_and_disconnected_player_is_removed_on_map_change() {
        let mut service = PlayerService::new();
        service.update_from_rcon(vec![base_player(1)]);
        service.update_from_rcon(vec![]);
        service.apply_map_change(&[eos(1)]);
        assert_eq!(service.len(), 0);
    }

    #[test]
    fn tombstoned_but_not_disconnected_player_lingers_through_map_change() {
        let mut service = PlayerService::new();
        service.update_from_rcon(vec![base_player(1)]);
        service.update_from_rcon(vec![]);
        service.apply_map_change(&[eos(2)]);
        assert_eq!(service.len(), 1, "without a matching disconnect the stale entry is tolerated, not guessed away");
    }

    #[test]
    fn reappearing_player_clears_the_tombstone() {
        let mut service = PlayerService::new();
        service.update_from_rcon(vec![base_player(1)]);
        service.update_from_rcon(vec![]);
        service.update_from_rcon(vec![base_player(1)]);
        service.apply_map_change(&[eos(1)]);
        assert_eq!(service.len(), 1, "a player who returned before the map change should not be purged");
    }
}
