//! Player/squad/layer/admin refresh cycles (§4.10/§4.11/§4.12). Every
//! RCON round trip happens before any lock is taken — the state mutation
//! itself is synchronous, so the `std::sync::Mutex` guarding [`Shared`]
//! is never held across an `.await`.

use domain::admin::AdminRoster;
use domain::layer::Layer;
use domain::player::Player;
use domain::squad::Squad;
use protocol::parsers::{self, ParsedPlayer, ParsedSquad};

use crate::Orchestrator;

fn to_domain_player(p: ParsedPlayer) -> Player {
    Player {
        eos_id: p.eos_id,
        steam_id: p.steam_id,
        player_id: Some(p.player_id),
        name: Some(p.name),
        team_id: p.team_id,
        squad_id: p.squad_id,
        is_squad_leader: p.is_leader,
        role: p.role,
        controller: None,
    }
}

fn to_domain_squad(s: ParsedSquad) -> Squad {
    Squad {
        team_id: s.team_id,
        squad_id: s.squad_id,
        name: s.name,
        size: s.size,
        locked: s.locked,
        creator_name: s.creator_name,
        creator_eos_id: s.creator_eos_id,
        creator_steam_id: s.creator_steam_id,
    }
}

/// Best-effort split of a Squad-style layer string (`"Narva_RAAS_v1"`)
/// into name/game mode/version. `ShowCurrentMap`/`ShowNextMap` don't
/// report these separately, so this is a heuristic, not a parser for a
/// documented grammar.
fn split_layer(level: String, layer: Option<String>) -> Layer {
    let Some(raw) = layer else {
        return Layer { name: level.clone(), level, game_mode: String::new(), version: None };
    };

    let mut parts: Vec<&str> = raw.split('_').collect();
    let is_version = |p: &str| p.len() >= 2 && p.starts_with(['v', 'V']) && p[1..].chars().all(|c| c.is_ascii_digit());

    let version = parts.last().copied().filter(|p| is_version(p)).map(|p| p.to_string());
    if version.is_some() {
        parts.pop();
    }
    let game_mode = parts.pop().unwrap_or_default().to_string();
    let name = if parts.is_empty() { raw.clone() } else { parts.join("_") };

    Layer { name, level, game_mode, version }
}

impl Orchestrator {
    /// `ListPlayers` round trip, diffed against the player map (§4.11).
    /// Emits every transition event the diff produces.
    pub(crate) async fn refresh_players(&self) -> Result<(), domain::error::SupervisorError> {
        let rcon = self.rcon_handle().await?;
        let body = rcon.execute("ListPlayers").await?;
        let parsed = parsers::parse_list_players(&body)?;
        let players: Vec<Player> = parsed.into_iter().map(to_domain_player).collect();

        let events = self.shared().players.update_from_rcon(players);
        for event in events {
            self.events().emit(event);
        }
        Ok(())
    }

    /// `ListSquads` round trip. No domain events are emitted here — a
    /// squad's birth is observed as chat (`SquadCreated`), and its
    /// disappearance carries no payload beyond "it's gone" (§4.11).
    pub(crate) async fn refresh_squads(&self) -> Result<(), domain::error::SupervisorError> {
        let rcon = self.rcon_handle().await?;
        let body = rcon.execute("ListSquads").await?;
        let parsed = parsers::parse_list_squads(&body)?;
        let squads: Vec<Squad> = parsed.into_iter().map(to_domain_squad).collect();

        let removed = self.shared().squads.update_from_rcon(squads);
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "squads removed from roster");
        }
        Ok(())
    }

    /// `ShowCurrentMap` + `ShowNextMap` round trip (§4.11).
    pub(crate) async fn refresh_layers(&self) -> Result<(), domain::error::SupervisorError> {
        let rcon = self.rcon_handle().await?;
        let current = parsers::parse_show_current_map(&rcon.execute("ShowCurrentMap").await?)?;
        let next = parsers::parse_show_next_map(&rcon.execute("ShowNextMap").await?)?;

        let mut shared = self.shared();
        shared.layers.set_current(split_layer(current.level, current.layer));
        if !next.level.is_empty() {
            shared.layers.set_next(split_layer(next.level, next.layer));
        }
        Ok(())
    }

    /// Reloads every admin source and swaps in the merged roster.
    /// Deliberately does not take `shared`'s lock while any source is
    /// loading: [`state::AdminService::refresh`] is async, so it runs to
    /// completion behind its own `tokio::sync::Mutex` (safe to hold
    /// across an `.await`), and only the resulting [`AdminRoster`] clone
    /// is published into the plain `std::sync::Mutex` snapshot that
    /// [`host_api::ReadModel::has_permission`] reads synchronously.
    pub(crate) async fn refresh_admin(&self) {
        let roster: AdminRoster = {
            let mut service = self.0.admin_service.lock().await;
            service.refresh().await;
            service.roster().clone()
        };
        *self.0.admin_roster.lock().unwrap() = roster;
    }
}
