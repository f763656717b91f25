//! Transient, per-match structures (§3) owned by the event correlation
//! store (C8). None of these survive a restart and all are cleared at
//! `NEW_GAME` except `JoinRequest`s, which are discarded individually once
//! claimed or stale.

use crate::ids::{ChainId, EosId, PlayerController, SteamId};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct PartialPlayer {
    pub eos_id: EosId,
    pub steam_id: Option<SteamId>,
    pub controller: Option<PlayerController>,
}

/// Recorded on `PLAYER_CONNECTED`, consumed by the matching
/// `PLAYER_JOIN_SUCCEEDED` (same chain-id) or discarded at the next
/// `NEW_GAME`.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub chain_id: ChainId,
    pub partial_player: PartialPlayer,
    pub ip: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DamageInfo {
    pub damage: f32,
    pub weapon: String,
    pub attacker_eos_id: Option<EosId>,
    pub attacker_steam_id: Option<SteamId>,
    pub attacker_controller: Option<PlayerController>,
    pub attacker_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WoundInfo {
    pub time: DateTime<Utc>,
    pub damage: f32,
    pub weapon: String,
    pub attacker_controller: Option<PlayerController>,
}

/// Keyed by victim name — the only correlation token the game provides
/// across damage/wound/death lines. Created by the first damage event,
/// enriched by wound, consumed by death.
#[derive(Debug, Clone)]
pub struct CombatSession {
    pub chain_id: ChainId,
    pub last_damage: DamageInfo,
    pub last_wound: Option<WoundInfo>,
}

#[derive(Debug, Clone)]
pub struct TeamResult {
    pub team: String,
    pub faction: String,
    pub subfaction: Option<String>,
    pub tickets: f32,
}

/// Transient singleton set by `ROUND_WINNER`, consumed by the next
/// `NEW_GAME`.
#[derive(Debug, Clone)]
pub struct RoundResult {
    pub winner: TeamResult,
    pub loser: TeamResult,
    pub layer: Option<String>,
    pub level: Option<String>,
}
