//! Event correlation store (C8): stitches the single-line [`RawLine`]s
//! the rule parser (C7) emits into the multi-line game events described
//! in §3/§4.8 — join requests, damage→wound→death chains, and the
//! round-winner/new-game handoff. Single-threaded by construction (it is
//! only ever driven from the log-ingest pipeline's own task).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use domain::correlation::{CombatSession, DamageInfo, JoinRequest, PartialPlayer, RoundResult, WoundInfo};
use domain::ids::{ChainId, EosId, PlayerController, SteamId};

use crate::rules::RawLine;

#[derive(Debug, Clone)]
pub struct TeamResultRaw {
    pub team: String,
    pub faction: String,
    pub subfaction: Option<String>,
    pub tickets: f32,
}

/// Events as they leave the correlation store: the shapes a single log
/// line cannot complete on its own (`PlayerJoinSucceeded`, `PlayerDied`,
/// `NewGame`) have been filled in from the transient state §3 defines.
#[derive(Debug, Clone)]
pub enum LogEvent {
    PlayerConnected {
        chain_id: ChainId,
        eos_id: EosId,
        steam_id: Option<SteamId>,
        controller: Option<PlayerController>,
        ip: String,
        timestamp: DateTime<Utc>,
    },
    PlayerDisconnected {
        eos_id: EosId,
        suffix: String,
        timestamp: DateTime<Utc>,
    },
    PlayerJoinSucceeded {
        chain_id: ChainId,
        eos_id: EosId,
        steam_id: Option<SteamId>,
        controller: Option<PlayerController>,
        ip: String,
        timestamp: DateTime<Utc>,
    },
    PlayerPossess {
        controller: PlayerController,
        possessed_controller: PlayerController,
        pawn: String,
        eos_id: Option<EosId>,
        steam_id: Option<SteamId>,
        name: String,
        timestamp: DateTime<Utc>,
    },
    PlayerUnpossess {
        controller: PlayerController,
        possessed_controller: PlayerController,
        pawn: String,
        eos_id: Option<EosId>,
        steam_id: Option<SteamId>,
        name: String,
        timestamp: DateTime<Utc>,
    },
    PlayerDamaged {
        chain_id: ChainId,
        victim_name: String,
        damage: f32,
        weapon: String,
        attacker_name: Option<String>,
        attacker_eos_id: Option<EosId>,
        attacker_steam_id: Option<SteamId>,
        attacker_controller: Option<PlayerController>,
        timestamp: DateTime<Utc>,
    },
    PlayerWounded {
        victim_name: String,
        damage: f32,
        weapon: String,
        attacker_controller: Option<PlayerController>,
        timestamp: DateTime<Utc>,
    },
    /// Teamkill is left for the orchestrator to compute (§4.8 item 2):
    /// it requires a team-id lookup this store has no access to.
    PlayerDied {
        victim_name: String,
        damage: f32,
        weapon: String,
        attacker_eos_id: Option<EosId>,
        attacker_steam_id: Option<SteamId>,
        attacker_controller: Option<PlayerController>,
        attacker_name: Option<String>,
        timestamp: DateTime<Utc>,
    },
    PlayerRevived {
        reviver_name: String,
        victim_name: String,
        timestamp: DateTime<Utc>,
    },
    DeployableDamaged {
        deployable: String,
        damage: f32,
        weapon: String,
        attacker_name: Option<String>,
        timestamp: DateTime<Utc>,
    },
    AdminBroadcast {
        message: String,
        from: Option<String>,
        timestamp: DateTime<Utc>,
    },
    NewGame {
        layer: String,
        level: Option<String>,
        previous_round: Option<RoundResult>,
        /// Players who disconnected during the previous map and were
        /// never seen again; the player service removes them now (§4.11).
        disconnected: Vec<EosId>,
        timestamp: DateTime<Utc>,
    },
    RoundEnded {
        timestamp: DateTime<Utc>,
    },
    RoundTickets {
        team: String,
        tickets: f32,
        timestamp: DateTime<Utc>,
    },
    RoundWinner {
        winner: TeamResultRaw,
        loser: TeamResultRaw,
        layer: Option<String>,
        level: Option<String>,
        timestamp: DateTime<Utc>,
    },
    ServerTickRate {
        rate: f32,
        timestamp: DateTime<Utc>,
    },
}

/// Owns the transient per-match maps from §3 and turns [`RawLine`]s into
/// fully correlated [`LogEvent`]s.
#[derive(Default)]
pub struct CorrelationStore {
    join_requests: HashMap<ChainId, JoinRequest>,
    combat_sessions: HashMap<String, CombatSession>,
    round_result: Option<RoundResult>,
    disconnected: HashSet<EosId>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join_request_count(&self) -> usize {
        self.join_requests.len()
    }

    pub fn combat_session_count(&self) -> usize {
        self.combat_sessions.len()
    }

    pub fn disconnected_count(&self) -> usize {
        self.disconnected.len()
    }

    /// Feeds one parsed line in; returns zero or more correlated events
    /// (a damage/wound line always passes through unchanged in addition
    /// to updating the session; a bare join-succeeded marker with no
    /// matching request produces nothing).
    pub fn ingest(&mut self, line: RawLine) -> Vec<LogEvent> {
        match line {
            RawLine::PlayerConnected { chain_id, eos_id, steam_id, controller, ip, timestamp } => {
                self.join_requests.insert(
                    chain_id,
                    JoinRequest {
                        chain_id,
                        partial_player: PartialPlayer {
                            eos_id: eos_id.clone(),
                            steam_id: steam_id.clone(),
                            controller: controller.clone(),
                        },
                        ip: ip.clone(),
                        timestamp,
                    },
                );
                vec![LogEvent::PlayerConnected { chain_id, eos_id, steam_id, controller, ip, timestamp }]
            }

            RawLine::PlayerDisconnected { eos_id, suffix, timestamp } => {
                self.disconnected.insert(eos_id.clone());
                vec![LogEvent::PlayerDisconnected { eos_id, suffix, timestamp }]
            }

            RawLine::PlayerJoinSucceeded { chain_id, timestamp } => {
                match self.join_requests.remove(&chain_id) {
                    Some(request) => vec![LogEvent::PlayerJoinSucceeded {
                        chain_id,
                        eos_id: request.partial_player.eos_id,
                        steam_id: request.partial_player.steam_id,
                        controller: request.partial_player.controller,
                        ip: request.ip,
                        timestamp,
                    }],
                    None => {
                        tracing::warn!(chain_id = chain_id.get(), "JOIN_SUCCEEDED with no matching PLAYER_CONNECTED");
                        vec![]
                    }
                }
            }

            RawLine::PlayerPossess { controller, possessed_controller, pawn, eos_id, steam_id, name, timestamp } => {
                vec![LogEvent::PlayerPossess { controller, possessed_controller, pawn, eos_id, steam_id, name, timestamp }]
            }

            RawLine::PlayerUnpossess { controller, possessed_controller, pawn, eos_id, steam_id, name, timestamp } => {
                vec![LogEvent::PlayerUnpossess { controller, possessed_controller, pawn, eos_id, steam_id, name, timestamp }]
            }

            RawLine::PlayerDamaged {
                chain_id,
                victim_name,
                damage,
                weapon,
                attacker_name,
                attacker_eos_id,
                attacker_steam_id,
                attacker_controller,
                timestamp,
            } => {
                self.combat_sessions.insert(
                    victim_name.clone(),
                    CombatSession {
                        chain_id,
                        last_damage: DamageInfo {
                            damage,
                            weapon: weapon.clone(),
                            attacker_eos_id: attacker_eos_id.clone(),
                            attacker_steam_id: attacker_steam_id.clone(),
                            attacker_controller: attacker_controller.clone(),
                            attacker_name: attacker_name.clone(),
                        },
                        last_wound: None,
                    },
                );
                vec![LogEvent::PlayerDamaged {
                    chain_id,
                    victim_name,
                    damage,
                    weapon,
                    attacker_name,
                    attacker_eos_id,
                    attacker_steam_id,
                    attacker_controller,
                    timestamp,
                }]
            }

            RawLine::PlayerWounded { victim_name, damage, weapon, attacker_controller, timestamp } => {
                if let Some(session) = self.combat_sessions.get_mut(&victim_name) {
                    session.last_wound = Some(WoundInfo {
                        time: timestamp,
                        damage,
                        weapon: weapon.clone(),
                        attacker_controller: attacker_controller.clone(),
                    });
                }
                vec![LogEvent::PlayerWounded { victim_name, damage, weapon, attacker_controller, timestamp }]
            }

            RawLine::PlayerDied { victim_name, timestamp } => {
                let session = self.combat_sessions.remove(&victim_name);
                let (damage, weapon, attacker_eos_id, attacker_steam_id, attacker_controller, attacker_name) =
                    match session {
                        Some(session) => (
                            session.last_damage.damage,
                            session.last_damage.weapon,
                            session.last_damage.attacker_eos_id,
                            session.last_damage.attacker_steam_id,
                            session
                                .last_wound
                                .and_then(|w| w.attacker_controller)
                                .or(session.last_damage.attacker_controller),
                            session.last_damage.attacker_name,
                        ),
                        None => (0.0, String::new(), None, None, None, None),
                    };
                vec![LogEvent::PlayerDied {
                    victim_name,
                    damage,
                    weapon,
                    attacker_eos_id,
                    attacker_steam_id,
                    attacker_controller,
                    attacker_name,
                    timestamp,
                }]
            }

            RawLine::PlayerRevived { reviver_name, victim_name, timestamp } => {
                vec![LogEvent::PlayerRevived { reviver_name, victim_name, timestamp }]
            }

            RawLine::DeployableDamaged { deployable, damage, weapon, attacker_name, timestamp } => {
                vec![LogEvent::DeployableDamaged { deployable, damage, weapon, attacker_name, timestamp }]
            }

            RawLine::AdminBroadcast { message, from, timestamp } => {
                vec![LogEvent::AdminBroadcast { message, from, timestamp }]
            }

            RawLine::RoundWinner { winner, loser, layer, level, timestamp } => {
                self.round_result = Some(RoundResult {
                    winner: to_domain_result(&winner),
                    loser: to_domain_result(&loser),
                    layer: layer.clone(),
                    level: level.clone(),
                });
                vec![LogEvent::RoundWinner { winner, loser, layer, level, timestamp }]
            }

            RawLine::NewGame { layer, level, timestamp } => {
                let previous_round = self.round_result.take();
                let disconnected: Vec<EosId> = self.disconnected.drain().collect();
                self.join_requests.clear();
                self.combat_sessions.clear();
                vec![LogEvent::NewGame { layer, level, previous_round, disconnected, timestamp }]
            }

            RawLine::RoundEnded { timestamp } => vec![LogEvent::RoundEnded { timestamp }],

            RawLine::RoundTickets { team, tickets, timestamp } => {
                vec![LogEvent::RoundTickets { team, tickets, timestamp }]
            }

            RawLine::ServerTickRate { rate, timestamp } => vec![LogEvent::ServerTickRate { rate, timestamp }],
        }
    }
}

fn to_domain_result(raw: &TeamResultRaw) -> domain::correlation::TeamResult {
    domain::correlation::TeamResult {
        team: raw.team.clone(),
        faction: raw.faction.clone(),
        subfaction: raw.subfaction.clone(),
        tickets: raw.tickets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{default_rules, parse_line};

    fn ingest_line(store: &mut CorrelationStore, line: &str) -> Vec<LogEvent> {
        let rules = default_rules();
        let parsed = parse_line(line, &rules).expect("line should parse");
        store.ingest(parsed)
    }

    /// S6 equivalent at the correlation layer / Property 6: join-succeeded
    /// carries the chain-id of a prior connect and a non-empty eosID.
    #[test]
    fn connect_then_join_succeeded_merges_identity() {
        let mut store = CorrelationStore::new();
        ingest_line(
            &mut store,
            "[2024.02.22-19.00.00:000][ 5]LogSquad: PLAYER CONNECTED: EOSID: 0002a10186d9414496bf20d22d3860ba | SteamID: 76561198012345678 | Controller: N/A | IP: 1.2.3.4",
        );
        let events = ingest_line(&mut store, "[2024.02.22-19.00.01:000][ 5]LogSquad: PLAYER JOIN SUCCEEDED");
        match &events[0] {
            LogEvent::PlayerJoinSucceeded { chain_id, eos_id, .. } => {
                assert_eq!(chain_id.get(), 5);
                assert_eq!(eos_id.as_str(), "0002a10186d9414496bf20d22d3860ba");
            }
            other => panic!("expected PlayerJoinSucceeded, got {other:?}"),
        }
        assert_eq!(store.join_request_count(), 0);
    }

    #[test]
    fn join_succeeded_without_a_connect_is_dropped() {
        let mut store = CorrelationStore::new();
        let events = ingest_line(&mut store, "[2024.02.22-19.00.01:000][ 9]LogSquad: PLAYER JOIN SUCCEEDED");
        assert!(events.is_empty());
    }

    /// S4 / Property 5 — damage → wound → death correlation.
    #[test]
    fn damage_wound_death_merges_into_one_enriched_death() {
        let mut store = CorrelationStore::new();
        ingest_line(
            &mut store,
            "[2024.02.22-19.00.00:000][ 1]LogSquad: DAMAGED: Victim: V | Damage: 50 | Weapon: AK | Attacker: A | AttackerEOSID: N/A | AttackerSteamID: N/A | AttackerController: N/A",
        );
        ingest_line(
            &mut store,
            "[2024.02.22-19.00.01:000][ 1]LogSquad: WOUNDED: Victim: V | Damage: 50 | Weapon: AK | AttackerController: N/A",
        );
        let events = ingest_line(&mut store, "[2024.02.22-19.00.02:000][ 1]LogSquad: DIED: Victim: V");
        match &events[0] {
            LogEvent::PlayerDied { victim_name, damage, weapon, attacker_name, .. } => {
                assert_eq!(victim_name, "V");
                assert_eq!(*damage, 50.0);
                assert_eq!(weapon, "AK");
                assert_eq!(attacker_name.as_deref(), Some("A"));
            }
            other => panic!("expected PlayerDied, got {other:?}"),
        }
        assert_eq!(store.combat_session_count(), 0);
    }

    /// Property 7 — NEW_GAME drains every transient map.
    #[test]
    fn new_game_clears_sessions_joins_and_disconnects() {
        let mut store = CorrelationStore::new();
        ingest_line(
            &mut store,
            "[2024.02.22-19.00.00:000][ 1]LogSquad: PLAYER CONNECTED: EOSID: 0002a10186d9414496bf20d22d3860ba | SteamID: N/A | Controller: N/A | IP: 1.2.3.4",
        );
        ingest_line(
            &mut store,
            "[2024.02.22-19.00.00:000][ 2]LogSquad: DAMAGED: Victim: V | Damage: 10 | Weapon: AK | Attacker: N/A | AttackerEOSID: N/A | AttackerSteamID: N/A | AttackerController: N/A",
        );
        ingest_line(
            &mut store,
            "[2024.02.22-19.00.00:000][ 3]LogSquad: PLAYER DISCONNECTED: EOSID: 0002a10186d9414496bf20d22d3860ba | Suffix: bye",
        );
        let events = ingest_line(&mut store, "[2024.02.22-19.01.00:000][ 4]LogGameState: NEW GAME: Layer: Narva_RAAS_v1 | Level: Narva");
        match &events[0] {
            LogEvent::NewGame { disconnected, .. } => assert_eq!(disconnected.len(), 1),
            other => panic!("expected NewGame, got {other:?}"),
        }
        assert_eq!(store.join_request_count(), 0);
        assert_eq!(store.combat_session_count(), 0);
        assert_eq!(store.disconnected_count(), 0);
    }

    #[test]
    fn round_winner_is_consumed_by_the_next_new_game() {
        let mut store = CorrelationStore::new();
        ingest_line(
            &mut store,
            "[2024.02.22-19.00.00:000][ 1]LogGameState: ROUND WINNER: WinnerTeam: 1 | WinnerFaction: PLA | WinnerSubFaction: N/A | WinnerTickets: 150 | LoserTeam: 2 | LoserFaction: USA | LoserSubFaction: N/A | LoserTickets: 20 | Layer: Narva_RAAS_v1 | Level: Narva",
        );
        let events = ingest_line(&mut store, "[2024.02.22-19.01.00:000][ 2]LogGameState: NEW GAME: Layer: Mutaha_RAAS_v1 | Level: Mutaha");
        match &events[0] {
            LogEvent::NewGame { previous_round, .. } => {
                let round = previous_round.as_ref().expect("round result carried over");
                assert_eq!(round.winner.team, "1");
                assert_eq!(round.winner.tickets, 150.0);
            }
            other => panic!("expected NewGame, got {other:?}"),
        }
    }
}
