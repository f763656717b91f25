//! The typed event stream (§9 redesign flag: a closed sum type replaces the
//! source's dynamic, string-keyed event map). Every event the supervisor
//! can deliver to a plugin is a variant of [`Event`]; `event-bus`'s
//! subscription API is generic over the tag this enum's discriminant
//! provides via [`Event::kind`].

use crate::correlation::TeamResult;
use crate::error::ErrorContext;
use crate::ids::{ChainId, EosId, PlayerController, PlayerId, SquadId, SteamId, TeamId};
use crate::player::Player;
use chrono::{DateTime, Utc};
use std::fmt;

/// Stable tag for subscription filtering — mirrors the variant names 1:1
/// so `on(EventKind::PlayerDied, handler)` reads the same as the event it
/// will receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PlayerConnected,
    PlayerDisconnected,
    PlayerJoinSucceeded,
    PlayerPossess,
    PlayerUnpossess,
    PlayerDamaged,
    PlayerWounded,
    PlayerDied,
    PlayerRevived,
    DeployableDamaged,
    AdminBroadcast,
    NewGame,
    RoundEnded,
    RoundTickets,
    RoundWinner,
    ServerTickRate,
    ChatMessage,
    AdminCamEntered,
    AdminCamExited,
    PlayerWarned,
    PlayerKicked,
    PlayerBanned,
    SquadCreated,
    PlayerTeamChange,
    PlayerSquadChange,
    PlayerRoleChange,
    PlayerLeaderChange,
    ServerError,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatChannel {
    All,
    Team,
    Squad,
    Admin,
}

#[derive(Debug, Clone)]
pub struct PlayerConnected {
    pub chain_id: ChainId,
    pub eos_id: EosId,
    pub steam_id: Option<SteamId>,
    pub controller: Option<PlayerController>,
    pub ip: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PlayerDisconnected {
    pub player_suffix: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PlayerJoinSucceeded {
    pub chain_id: ChainId,
    pub eos_id: EosId,
    pub steam_id: Option<SteamId>,
    pub controller: Option<PlayerController>,
    pub ip: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PlayerPossess {
    pub player: Player,
    pub possessed_controller: PlayerController,
    pub pawn: String,
    pub timestamp: DateTime<Utc>,
}

pub type PlayerUnpossess = PlayerPossess;

#[derive(Debug, Clone)]
pub struct PlayerDamaged {
    pub victim_name: String,
    pub damage: f32,
    pub weapon: String,
    pub attacker_eos_id: Option<EosId>,
    pub attacker_steam_id: Option<SteamId>,
    pub attacker_controller: Option<PlayerController>,
    pub attacker_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PlayerWounded {
    pub victim_name: String,
    pub damage: f32,
    pub weapon: String,
    pub attacker_controller: Option<PlayerController>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PlayerDied {
    pub victim_name: String,
    pub damage: f32,
    pub weapon: String,
    pub attacker_eos_id: Option<EosId>,
    pub attacker_steam_id: Option<SteamId>,
    pub attacker_controller: Option<PlayerController>,
    pub attacker_name: Option<String>,
    pub teamkill: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PlayerRevived {
    pub reviver_name: String,
    pub victim_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DeployableDamaged {
    pub deployable: String,
    pub damage: f32,
    pub weapon: String,
    pub attacker_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AdminBroadcast {
    pub message: String,
    pub from: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewGame {
    pub layer: String,
    pub level: Option<String>,
    pub previous_round: Option<RoundWinner>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RoundEnded {
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RoundTickets {
    pub team: String,
    pub tickets: f32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RoundWinner {
    pub winner: TeamResult,
    pub loser: TeamResult,
    pub layer: Option<String>,
    pub level: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ServerTickRate {
    pub rate: f32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub channel: ChatChannel,
    pub player_name: String,
    pub message: String,
    pub eos_id: Option<EosId>,
    pub steam_id: Option<SteamId>,
}

#[derive(Debug, Clone)]
pub struct AdminCamEntered {
    pub player_name: String,
    pub eos_id: Option<EosId>,
    pub steam_id: Option<SteamId>,
}

pub type AdminCamExited = AdminCamEntered;

#[derive(Debug, Clone)]
pub struct PlayerWarned {
    pub player_name: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct PlayerKicked {
    pub player_id: PlayerId,
    pub player_name: String,
}

#[derive(Debug, Clone)]
pub struct PlayerBanned {
    pub player_id: PlayerId,
    pub player_name: String,
    pub interval: String,
}

#[derive(Debug, Clone)]
pub struct SquadCreated {
    pub creator_name: String,
    pub eos_id: Option<EosId>,
    pub steam_id: Option<SteamId>,
    pub squad_id: SquadId,
    pub squad_name: String,
    pub team_name: String,
}

#[derive(Debug, Clone)]
pub struct PlayerTeamChange {
    pub player: Player,
    pub old_team_id: Option<TeamId>,
    pub new_team_id: Option<TeamId>,
}

#[derive(Debug, Clone)]
pub struct PlayerSquadChange {
    pub player: Player,
    pub old_squad_id: Option<SquadId>,
    pub new_squad_id: Option<SquadId>,
}

#[derive(Debug, Clone)]
pub struct PlayerRoleChange {
    pub player: Player,
    pub old_role: Option<String>,
    pub new_role: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlayerLeaderChange {
    pub player: Player,
    pub is_leader: bool,
}

#[derive(Debug, Clone)]
pub struct ServerErrorEvent {
    pub component: String,
    pub code: &'static str,
    pub message: String,
    pub recoverable: bool,
    pub context: ErrorContext,
}

/// The closed event sum type (§9 redesign flag). Handlers registered with
/// `event-bus` receive exactly the payload matching the tag they
/// subscribed to.
#[derive(Debug, Clone)]
pub enum Event {
    PlayerConnected(PlayerConnected),
    PlayerDisconnected(PlayerDisconnected),
    PlayerJoinSucceeded(PlayerJoinSucceeded),
    PlayerPossess(PlayerPossess),
    PlayerUnpossess(PlayerUnpossess),
    PlayerDamaged(PlayerDamaged),
    PlayerWounded(PlayerWounded),
    PlayerDied(PlayerDied),
    PlayerRevived(PlayerRevived),
    DeployableDamaged(DeployableDamaged),
    AdminBroadcast(AdminBroadcast),
    NewGame(NewGame),
    RoundEnded(RoundEnded),
    RoundTickets(RoundTickets),
    RoundWinner(RoundWinner),
    ServerTickRate(ServerTickRate),
    ChatMessage(ChatMessage),
    AdminCamEntered(AdminCamEntered),
    AdminCamExited(AdminCamExited),
    PlayerWarned(PlayerWarned),
    PlayerKicked(PlayerKicked),
    PlayerBanned(PlayerBanned),
    SquadCreated(SquadCreated),
    PlayerTeamChange(PlayerTeamChange),
    PlayerSquadChange(PlayerSquadChange),
    PlayerRoleChange(PlayerRoleChange),
    PlayerLeaderChange(PlayerLeaderChange),
    ServerError(ServerErrorEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::PlayerConnected(_) => EventKind::PlayerConnected,
            Event::PlayerDisconnected(_) => EventKind::PlayerDisconnected,
            Event::PlayerJoinSucceeded(_) => EventKind::PlayerJoinSucceeded,
            Event::PlayerPossess(_) => EventKind::PlayerPossess,
            Event::PlayerUnpossess(_) => EventKind::PlayerUnpossess,
            Event::PlayerDamaged(_) => EventKind::PlayerDamaged,
            Event::PlayerWounded(_) => EventKind::PlayerWounded,
            Event::PlayerDied(_) => EventKind::PlayerDied,
            Event::PlayerRevived(_) => EventKind::PlayerRevived,
            Event::DeployableDamaged(_) => EventKind::DeployableDamaged,
            Event::AdminBroadcast(_) => EventKind::AdminBroadcast,
            Event::NewGame(_) => EventKind::NewGame,
            Event::RoundEnded(_) => EventKind::RoundEnded,
            Event::RoundTickets(_) => EventKind::RoundTickets,
            Event::RoundWinner(_) => EventKind::RoundWinner,
            Event::ServerTickRate(_) => EventKind::ServerTickRate,
            Event::ChatMessage(_) => EventKind::ChatMessage,
            Event::AdminCamEntered(_) => EventKind::AdminCamEntered,
            Event::AdminCamExited(_) => EventKind::AdminCamExited,
            Event::PlayerWarned(_) => EventKind::PlayerWarned,
            Event::PlayerKicked(_) => EventKind::PlayerKicked,
            Event::PlayerBanned(_) => EventKind::PlayerBanned,
            Event::SquadCreated(_) => EventKind::SquadCreated,
            Event::PlayerTeamChange(_) => EventKind::PlayerTeamChange,
            Event::PlayerSquadChange(_) => EventKind::PlayerSquadChange,
            Event::PlayerRoleChange(_) => EventKind::PlayerRoleChange,
            Event::PlayerLeaderChange(_) => EventKind::PlayerLeaderChange,
            Event::ServerError(_) => EventKind::ServerError,
        }
    }
}
