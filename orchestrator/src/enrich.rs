//! Turns the two upstream half-formed event shapes — `log_ingest::LogEvent`
//! (C8) and `protocol::chat::ChatClassification` (C4) — into the fully
//! enriched `domain::Event` the event bus (C9) distributes to plugins.
//!
//! §4.12: "raw RCON events carrying only eosID/steamID/name are enriched
//! with the full `Player` looked up from the player service; if the
//! player is unknown ... the event is dropped rather than delivered with
//! null fields". This module is where that policy lives, along with the
//! teamkill computation §4.8 defers to the orchestrator.

use domain::correlation::TeamResult;
use domain::event::{self, ChatChannel, Event, RoundWinner};
use domain::ids::PlayerId;
use domain::player::Player;
use log_ingest::{LogEvent, TeamResultRaw};
use protocol::chat::{self, ChatClassification};
use state::PlayerService;

fn lookup(players: &PlayerService, eos_id: Option<&domain::ids::EosId>, steam_id: Option<&domain::ids::SteamId>, name: Option<&str>) -> Option<Player> {
    if let Some(eos_id) = eos_id {
        if let Some(player) = players.get(eos_id) {
            return Some(player.clone());
        }
    }
    if let Some(steam_id) = steam_id {
        if let Some(player) = players.by_steam_id(steam_id) {
            return Some(player.clone());
        }
    }
    if let Some(name) = name {
        if let Some(player) = players.by_name(name).into_iter().next() {
            return Some(player.clone());
        }
    }
    None
}

/// Teamkill is true only when both victim and attacker resolve to a known
/// player on opposing-yet-equal team ids and the attacker isn't the victim
/// (§4.8 item 2). Suicide and an unresolved attacker both read as `false`
/// rather than panicking the correlation — this is deliberately
/// conservative, matching "skips teamkill flag".
fn compute_teamkill(
    players: &PlayerService,
    victim_name: &str,
    attacker_name: Option<&str>,
    attacker_eos_id: Option<&domain::ids::EosId>,
) -> bool {
    if attacker_name == Some(victim_name) || attacker_eos_id.is_none() && attacker_name.is_none() {
        return false;
    }
    let Some(victim) = players.by_name(victim_name).into_iter().next() else {
        return false;
    };
    let attacker = lookup(players, attacker_eos_id, None, attacker_name);
    let Some(attacker) = attacker else {
        return false;
    };
    if attacker.eos_id == victim.eos_id {
        return false;
    }
    matches!((victim.team_id, attacker.team_id), (Some(v), Some(a)) if v == a)
}

fn to_domain_team_result(raw: &TeamResultRaw) -> TeamResult {
    TeamResult {
        team: raw.team.clone(),
        faction: raw.faction.clone(),
        subfaction: raw.subfaction.clone(),
        tickets: raw.tickets,
    }
}

/// Maps one correlated log event into the closed `Event` sum type, or
/// `None` if the enrichment policy says to drop it.
pub fn enrich_log_event(log_event: LogEvent, players: &PlayerService) -> Option<Event> {
    match log_event {
        LogEvent::PlayerConnected { chain_id, eos_id, steam_id, controller, ip, timestamp } => {
            Some(Event::PlayerConnected(event::PlayerConnected { chain_id, eos_id, steam_id, controller, ip, timestamp }))
        }

        LogEvent::PlayerDisconnected { suffix, timestamp, .. } => {
            Some(Event::PlayerDisconnected(event::PlayerDisconnected { player_suffix: suffix, timestamp }))
        }

        LogEvent::PlayerJoinSucceeded { chain_id, eos_id, steam_id, controller, ip, timestamp } => {
            Some(Event::PlayerJoinSucceeded(event::PlayerJoinSucceeded { chain_id, eos_id, steam_id, controller, ip, timestamp }))
        }

        LogEvent::PlayerPossess { possessed_controller, pawn, eos_id, steam_id, name, timestamp, .. } => {
            let player = lookup(players, eos_id.as_ref(), steam_id.as_ref(), Some(&name))?;
            Some(Event::PlayerPossess(event::PlayerPossess { player, possessed_controller, pawn, timestamp }))
        }

        LogEvent::PlayerUnpossess { possessed_controller, pawn, eos_id, steam_id, name, timestamp, .. } => {
            let player = lookup(players, eos_id.as_ref(), steam_id.as_ref(), Some(&name))?;
            Some(Event::PlayerUnpossess(event::PlayerPossess { player, possessed_controller, pawn, timestamp }))
        }

        LogEvent::PlayerDamaged {
            victim_name, damage, weapon, attacker_name, attacker_eos_id, attacker_steam_id, attacker_controller, timestamp, ..
        } => Some(Event::PlayerDamaged(event::PlayerDamaged {
            victim_name,
            damage,
            weapon,
            attacker_eos_id,
            attacker_steam_id,
            attacker_controller,
            attacker_name,
            timestamp,
        })),

        LogEvent::PlayerWounded { victim_name, damage, weapon, attacker_controller, timestamp } => {
            Some(Event::PlayerWounded(event::PlayerWounded { victim_name, damage, weapon, attacker_controller, timestamp }))
        }

        LogEvent::PlayerDied {
            victim_name, damage, weapon, attacker_eos_id, attacker_steam_id, attacker_controller, attacker_name, timestamp,
        } => {
            let teamkill = compute_teamkill(players, &victim_name, attacker_name.as_deref(), attacker_eos_id.as_ref());
            Some(Event::PlayerDied(event::PlayerDied {
                victim_name,
                damage,
                weapon,
                attacker_eos_id,
                attacker_steam_id,
                attacker_controller,
                attacker_name,
                teamkill,
                timestamp,
            }))
        }

        LogEvent::PlayerRevived { reviver_name, victim_name, timestamp } => {
            Some(Event::PlayerRevived(event::PlayerRevived { reviver_name, victim_name, timestamp }))
        }

        LogEvent::DeployableDamaged { deployable, damage, weapon, attacker_name, timestamp } => {
            Some(Event::DeployableDamaged(event::DeployableDamaged { deployable, damage, weapon, attacker_name, timestamp }))
        }

        LogEvent::AdminBroadcast { message, from, timestamp } => {
            Some(Event::AdminBroadcast(event::AdminBroadcast { message, from, timestamp }))
        }

        LogEvent::NewGame { layer, level, previous_round, timestamp, .. } => {
            let previous_round = previous_round.map(|round| RoundWinner {
                winner: round.winner,
                loser: round.loser,
                layer: round.layer,
                level: round.level,
                timestamp,
            });
            Some(Event::NewGame(event::NewGame { layer, level, previous_round, timestamp }))
        }

        LogEvent::RoundEnded { timestamp } => Some(Event::RoundEnded(event::RoundEnded { timestamp })),

        LogEvent::RoundTickets { team, tickets, timestamp } => {
            Some(Event::RoundTickets(event::RoundTickets { team, tickets, timestamp }))
        }

        LogEvent::RoundWinner { winner, loser, layer, level, timestamp } => {
            Some(Event::RoundWinner(RoundWinner {
                winner: to_domain_team_result(&winner),
                loser: to_domain_team_result(&loser),
                layer,
                level,
                timestamp,
            }))
        }

        LogEvent::ServerTickRate { rate, timestamp } => Some(Event::ServerTickRate(event::ServerTickRate { rate, timestamp })),
    }
}

fn to_domain_channel(channel: chat::ChatChannel) -> ChatChannel {
    match channel {
        chat::ChatChannel::All => ChatChannel::All,
        chat::ChatChannel::Team => ChatChannel::Team,
        chat::ChatChannel::Squad => ChatChannel::Squad,
        chat::ChatChannel::Admin => ChatChannel::Admin,
    }
}

/// Maps an unsolicited RCON frame classification (§4.4) into the closed
/// event sum type. `PlayerKicked`/`PlayerBanned` carry a raw in-game id
/// that must still satisfy `PlayerId`'s 1..=1024 range; an id outside
/// that range is dropped rather than faked.
pub fn enrich_chat_event(classification: ChatClassification) -> Option<Event> {
    match classification {
        ChatClassification::ChatMessage(msg) => Some(Event::ChatMessage(event::ChatMessage {
            channel: to_domain_channel(msg.channel),
            player_name: msg.player_name,
            message: msg.message,
            eos_id: msg.eos_id,
            steam_id: msg.steam_id,
        })),

        ChatClassification::AdminCam(cam) => {
            let payload = event::AdminCamEntered { player_name: cam.player_name, eos_id: cam.eos_id, steam_id: cam.steam_id };
            Some(if cam.entered { Event::AdminCamEntered(payload) } else { Event::AdminCamExited(payload) })
        }

        ChatClassification::PlayerWarned(warned) => {
            Some(Event::PlayerWarned(event::PlayerWarned { player_name: warned.player_name, reason: warned.reason }))
        }

        ChatClassification::PlayerKicked(kicked) => {
            let player_id = PlayerId::new(kicked.player_id)?;
            Some(Event::PlayerKicked(event::PlayerKicked { player_id, player_name: kicked.player_name }))
        }

        ChatClassification::PlayerBanned(banned) => {
            let player_id = PlayerId::new(banned.player_id)?;
            Some(Event::PlayerBanned(event::PlayerBanned { player_id, player_name: banned.player_name, interval: banned.interval }))
        }

        ChatClassification::SquadCreated(created) => Some(Event::SquadCreated(event::SquadCreated {
            creator_name: created.creator_name,
            eos_id: created.eos_id,
            steam_id: created.steam_id,
            squad_id: created.squad_id,
            squad_name: created.squad_name,
            team_name: created.team_name,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ids::{EosId, PlayerController, SteamId, TeamId};
    use protocol::chat::{self as raw_chat};

    fn connected_player(eos: &str, team: Option<u8>) -> Player {
        let mut player = Player::new(EosId::parse(eos).unwrap());
        player.team_id = team.and_then(TeamId::new);
        player.name = Some(eos.to_string());
        player
    }

    #[test]
    fn possess_is_dropped_when_the_player_is_unknown() {
        let players = PlayerService::new();
        let event = LogEvent::PlayerPossess {
            controller: PlayerController::parse("BP_PlayerController_C_1").unwrap(),
            possessed_controller: PlayerController::parse("BP_PlayerController_C_2").unwrap(),
            pawn: "BP_Soldier_C_1".to_string(),
            eos_id: EosId::parse("0002a10186d9414496bf20d22d3860ba"),
            steam_id: None,
            name: "Ghost".to_string(),
            timestamp: chrono::Utc::now(),
        };
        assert!(enrich_log_event(event, &players).is_none());
    }

    #[test]
    fn teamkill_is_true_when_attacker_and_victim_share_a_team() {
        let mut players = PlayerService::new();
        let diff = players.update_from_rcon(vec![
            connected_player("0002a10186d9414496bf20d22d3860ba", Some(1)),
            connected_player("0002a10186d9414496bf20d22d3860bb", Some(1)),
        ]);
        assert!(!diff.is_empty());

        let event = LogEvent::PlayerDied {
            victim_name: "0002a10186d9414496bf20d22d3860ba".to_string(),
            damage: 100.0,
            weapon: "BP_Frag".to_string(),
            attacker_eos_id: EosId::parse("0002a10186d9414496bf20d22d3860bb"),
            attacker_steam_id: None,
            attacker_controller: None,
            attacker_name: Some("0002a10186d9414496bf20d22d3860bb".to_string()),
            timestamp: chrono::Utc::now(),
        };
        match enrich_log_event(event, &players) {
            Some(Event::PlayerDied(died)) => assert!(died.teamkill),
            other => panic!("expected PlayerDied, got {other:?}"),
        }
    }

    #[test]
    fn suicide_never_sets_the_teamkill_flag() {
        let players = PlayerService::new();
        let event = LogEvent::PlayerDied {
            victim_name: "Solo".to_string(),
            damage: 100.0,
            weapon: "BP_Frag".to_string(),
            attacker_eos_id: None,
            attacker_steam_id: None,
            attacker_controller: None,
            attacker_name: Some("Solo".to_string()),
            timestamp: chrono::Utc::now(),
        };
        match enrich_log_event(event, &players) {
            Some(Event::PlayerDied(died)) => assert!(!died.teamkill),
            other => panic!("expected PlayerDied, got {other:?}"),
        }
    }

    #[test]
    fn a_kicked_player_id_outside_the_valid_range_is_dropped() {
        let classification = ChatClassification::PlayerKicked(raw_chat::PlayerKicked { player_id: 0, player_name: "Ghost".to_string() });
        assert!(enrich_chat_event(classification).is_none());
    }

    #[test]
    fn admin_cam_exit_maps_to_the_exited_variant() {
        let classification = ChatClassification::AdminCam(raw_chat::AdminCamEvent {
            entered: false,
            player_name: "Overseer".to_string(),
            eos_id: None,
            steam_id: None,
        });
        assert!(matches!(enrich_chat_event(classification), Some(Event::AdminCamExited(_))));
    }
}
