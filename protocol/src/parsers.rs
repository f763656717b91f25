//! Response parsers (C4): turn the text bodies of `ListPlayers`,
//! `ListSquads`, `ShowCurrentMap` and `ShowNextMap` into typed values.

use std::sync::LazyLock;

use domain::error::{ErrorContext, ParseErrorKind, SupervisorError};
use domain::ids::{EosId, PlayerId, SquadId, SteamId, TeamId};
use regex::Regex;

fn parse_error(kind: ParseErrorKind, field: &str, raw_sample: &str) -> SupervisorError {
    let mut context = ErrorContext::new();
    context.insert("field".to_string(), field.to_string());
    context.insert("rawSample".to_string(), raw_sample.to_string());
    SupervisorError::ParseError {
        kind,
        message: format!("failed to parse {field}"),
        context,
    }
}

/// Online-ID pair as found in `Online IDs:EOS: <eos> steam: <steam>`.
/// `None` at the outer level means the line carried an explicit `INVALID`
/// marker and the event should be dropped by the caller.
fn parse_online_ids(raw: &str) -> Option<(Option<EosId>, Option<SteamId>)> {
    static EOS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\beos:\s*(\S+)").unwrap());
    static STEAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bsteam:\s*(\S+)").unwrap());

    if raw.contains("INVALID") {
        return None;
    }
    let eos = EOS
        .captures(raw)
        .and_then(|c| EosId::parse(c.get(1)?.as_str()));
    let steam = STEAM
        .captures(raw)
        .and_then(|c| SteamId::parse(c.get(1)?.as_str()));
    Some((eos, steam))
}

#[derive(Debug, Clone)]
pub struct ParsedPlayer {
    pub player_id: PlayerId,
    pub eos_id: EosId,
    pub steam_id: Option<SteamId>,
    pub name: String,
    pub team_id: Option<TeamId>,
    pub squad_id: Option<SquadId>,
    pub is_leader: bool,
    pub role: Option<String>,
}

static PLAYER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?xi)
        ^ID:\s*(?P<id>\d+)\s*\|\s*
        (?P<online>Online\ IDs?:.*?)\s*\|\s*
        Name:\s*(?P<name>.*?)\s*\|\s*
        Team\ ID:\s*(?P<team>\d+|N/A)\s*\|\s*
        Squad\ ID:\s*(?P<squad>\d+|N/A)\s*\|\s*
        Is\ Leader:\s*(?P<leader>True|False)\s*\|\s*
        Role:\s*(?P<role>N/A|.*?)\s*$
        "#,
    )
    .unwrap()
});

/// Parses the body of `ListPlayers`. Blank lines are ignored; a line that
/// doesn't match the expected shape is reported as a single
/// `PARSE_ERROR{UNEXPECTED_FORMAT}` rather than silently dropped.
pub fn parse_list_players(body: &str) -> Result<Vec<ParsedPlayer>, SupervisorError> {
    let mut players = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let caps = PLAYER_LINE
            .captures(line)
            .ok_or_else(|| parse_error(ParseErrorKind::UnexpectedFormat, "ListPlayers line", line))?;
        let Some(player_id) = PlayerId::parse(&caps["id"]) else {
            return Err(parse_error(ParseErrorKind::InvalidId, "playerID", line));
        };
        let Some((Some(eos_id), steam_id)) = parse_online_ids(&caps["online"]) else {
            continue; // INVALID marker or missing EOS id: drop the line.
        };
        let team_id = (caps["team"] != "N/A").then(|| TeamId::parse(&caps["team"])).flatten();
        let squad_id = (caps["squad"] != "N/A").then(|| SquadId::parse(&caps["squad"])).flatten();
        let role = (caps["role"] != "N/A").then(|| caps["role"].to_string());
        players.push(ParsedPlayer {
            player_id,
            eos_id,
            steam_id,
            name: caps["name"].to_string(),
            team_id,
            squad_id,
            is_leader: caps["leader"] == "True",
            role,
        });
    }
    Ok(players)
}

#[derive(Debug, Clone)]
pub struct ParsedSquad {
    pub team_id: TeamId,
    pub team_name: String,
    pub squad_id: SquadId,
    pub name: String,
    pub size: u16,
    pub locked: bool,
    pub creator_name: String,
    pub creator_eos_id: EosId,
    pub creator_steam_id: Option<SteamId>,
}

static TEAM_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Team ID:\s*(\d+)\s*\((.*)\)\s*$").unwrap());

static SQUAD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?xi)
        ^ID:\s*(?P<id>\d+)\s*\|\s*
        Name:\s*(?P<name>.*?)\s*\|\s*
        Size:\s*(?P<size>\d+)\s*\|\s*
        Locked:\s*(?P<locked>True|False)\s*\|\s*
        Creator\ Name:\s*(?P<creator>.*?)\s*\|\s*
        Creator\ (?P<online>Online\ IDs?:.*)\s*$
        "#,
    )
    .unwrap()
});

/// Parses the body of `ListSquads`: team headers followed by their squad
/// lines.
pub fn parse_list_squads(body: &str) -> Result<Vec<ParsedSquad>, SupervisorError> {
    let mut squads = Vec::new();
    let mut current_team: Option<(TeamId, String)> = None;
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = TEAM_HEADER.captures(line) {
            let Some(team_id) = TeamId::parse(&caps[1]) else {
                return Err(parse_error(ParseErrorKind::InvalidId, "teamID", line));
            };
            current_team = Some((team_id, caps[2].to_string()));
            continue;
        }
        let Some((team_id, team_name)) = current_team.clone() else {
            return Err(parse_error(
                ParseErrorKind::UnexpectedFormat,
                "ListSquads team header",
                line,
            ));
        };
        let caps = SQUAD_LINE
            .captures(line)
            .ok_or_else(|| parse_error(ParseErrorKind::UnexpectedFormat, "ListSquads line", line))?;
        let Some(squad_id) = SquadId::parse(&caps["id"]) else {
            return Err(parse_error(ParseErrorKind::InvalidId, "squadID", line));
        };
        let Some((Some(creator_eos_id), creator_steam_id)) = parse_online_ids(&caps["online"]) else {
            continue;
        };
        squads.push(ParsedSquad {
            team_id,
            team_name: team_name.clone(),
            squad_id,
            name: caps["name"].to_string(),
            size: caps["size"].parse().unwrap_or(0),
            locked: caps["locked"] == "True",
            creator_name: caps["creator"].to_string(),
            creator_eos_id,
            creator_steam_id,
        });
    }
    Ok(squads)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapInfo {
    pub level: String,
    pub layer: Option<String>,
}

static CURRENT_MAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Current level is (?P<level>.+?), layer is (?P<layer>.*)$").unwrap());
static NEXT_MAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Next level is (?P<level>.+?), layer is (?P<layer>.*)$").unwrap());

pub fn parse_show_current_map(body: &str) -> Result<MapInfo, SupervisorError> {
    let body = body.trim();
    let caps = CURRENT_MAP
        .captures(body)
        .ok_or_else(|| parse_error(ParseErrorKind::UnexpectedFormat, "ShowCurrentMap", body))?;
    Ok(MapInfo {
        level: caps["level"].to_string(),
        layer: non_empty(&caps["layer"]),
    })
}

/// `"To be voted"` and an empty body both mean "undecided" — no layer.
pub fn parse_show_next_map(body: &str) -> Result<MapInfo, SupervisorError> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(MapInfo {
            level: String::new(),
            layer: None,
        });
    }
    let caps = NEXT_MAP
        .captures(body)
        .ok_or_else(|| parse_error(ParseErrorKind::UnexpectedFormat, "ShowNextMap", body))?;
    let layer = &caps["layer"];
    Ok(MapInfo {
        level: caps["level"].to_string(),
        layer: if layer.trim() == "To be voted" { None } else { non_empty(layer) },
    })
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_player_line() {
        let body = "ID: 3 | Online IDs:EOS: 0002a10186d9414496bf20d22d3860ba steam: 76561198012345678 | Name: TestPlayer | Team ID: 1 | Squad ID: 2 | Is Leader: True | Role: SL";
        let players = parse_list_players(body).unwrap();
        assert_eq!(players.len(), 1);
        let p = &players[0];
        assert_eq!(p.player_id.get(), 3);
        assert_eq!(p.name, "TestPlayer");
        assert_eq!(p.team_id.unwrap().get(), 1);
        assert_eq!(p.squad_id.unwrap().get(), 2);
        assert!(p.is_leader);
        assert_eq!(p.role.as_deref(), Some("SL"));
    }

    #[test]
    fn player_line_with_missing_team_and_squad() {
        let body = "ID: 9 | Online IDs:EOS: 0002a10186d9414496bf20d22d3860ba | Name: Fresh | Team ID: N/A | Squad ID: N/A | Is Leader: False | Role: N/A";
        let players = parse_list_players(body).unwrap();
        assert!(players[0].team_id.is_none());
        assert!(players[0].squad_id.is_none());
        assert!(players[0].steam_id.is_none());
        assert!(players[0].role.is_none());
    }

    #[test]
    fn parses_squads_grouped_by_team_header() {
        let body = "Team ID: 1 (Team1)\nID: 2 | Name: Alpha | Size: 9 | Locked: False | Creator Name: Boss | Creator Online IDs:EOS: 0002a10186d9414496bf20d22d3860ba steam: 76561198012345678\n";
        let squads = parse_list_squads(body).unwrap();
        assert_eq!(squads.len(), 1);
        assert_eq!(squads[0].team_name, "Team1");
        assert_eq!(squads[0].name, "Alpha");
        assert_eq!(squads[0].size, 9);
        assert!(!squads[0].locked);
    }

    #[test]
    fn current_map_parses_level_with_spaces() {
        let map = parse_show_current_map("Current level is Narva Grand Bazaar, layer is Narva_RAAS_v1").unwrap();
        assert_eq!(map.level, "Narva Grand Bazaar");
        assert_eq!(map.layer.as_deref(), Some("Narva_RAAS_v1"));
    }

    #[test]
    fn next_map_to_be_voted_yields_no_layer() {
        let map = parse_show_next_map("Next level is Narva, layer is To be voted").unwrap();
        assert!(map.layer.is_none());
    }

    #[test]
    fn next_map_empty_body_yields_nulls() {
        let map = parse_show_next_map("").unwrap();
        assert_eq!(map.level, "");
        assert!(map.layer.is_none());
    }
}
