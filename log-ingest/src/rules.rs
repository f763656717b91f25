//! Rule-based line parser (C7). Every line carries the prefix
//! `[YYYY.MM.DD-HH.MM.SS:mmm][ <chainID>]`; what follows is matched
//! against a table of rules, each gated by a cheap tag-prefix regex and,
//! on a tag hit, a body regex that extracts the event's fields. The
//! first rule whose tag *and* body match wins; a rule may still decline
//! (return `None`) to silently discard the line — used here for the
//! `INVALID` online-id marker and for lines that only carry half of a
//! correlated event.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use domain::ids::{ChainId, EosId, PlayerController, SquadId, SteamId, TeamId};
use regex::{Captures, Regex};

use crate::correlation::TeamResultRaw;

/// A timestamped, chain-tagged line, split into its parsed prefix and the
/// remaining tag+body text the rule table matches against.
#[derive(Debug, Clone)]
pub struct LinePrefix {
    pub timestamp: DateTime<Utc>,
    pub chain_id: ChainId,
}

static PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[(?P<y>\d{4})\.(?P<mo>\d{2})\.(?P<d>\d{2})-(?P<h>\d{2})\.(?P<mi>\d{2})\.(?P<s>\d{2}):(?P<ms>\d{3})\]\[\s*(?P<chain>\d+)\s*\](?P<rest>.*)$",
    )
    .unwrap()
});

/// Validates calendar ranges (rejects `Feb 30`, hour 25, etc. — S2) and
/// splits the line into its prefix and the rest of the text.
pub fn parse_prefix(line: &str) -> Option<(LinePrefix, &str)> {
    let caps = PREFIX.captures(line)?;
    let year: i32 = caps["y"].parse().ok()?;
    let month: u32 = caps["mo"].parse().ok()?;
    let day: u32 = caps["d"].parse().ok()?;
    let hour: u32 = caps["h"].parse().ok()?;
    let minute: u32 = caps["mi"].parse().ok()?;
    let second: u32 = caps["s"].parse().ok()?;
    let milli: u32 = caps["ms"].parse().ok()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_milli_opt(hour, minute, second, milli)?;
    let timestamp = Utc.from_utc_datetime(&date.and_time(time));
    let chain_id = ChainId::parse(&caps["chain"])?;
    let rest_start = caps.name("rest")?.start();
    Some((LinePrefix { timestamp, chain_id }, &line[rest_start..]))
}

/// Pre-correlation line events (C7's direct output). `PlayerJoinSucceeded`
/// and `PlayerDied` carry only what the single line itself proves; the
/// correlation store (C8) fills in the rest from state it has been
/// accumulating.
#[derive(Debug, Clone)]
pub enum RawLine {
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
    PlayerDied {
        victim_name: String,
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

fn field(caps: &Captures, name: &str) -> Option<String> {
    let value = caps.name(name)?.as_str();
    (value != "N/A").then(|| value.to_string())
}

pub struct Rule {
    pub name: &'static str,
    tag: Regex,
    body: Regex,
    build: fn(&Captures, &LinePrefix) -> Option<RawLine>,
}

impl Rule {
    /// Tries this rule against `rest`; `None` if the tag doesn't match at
    /// all, `Some(None)` if the tag matched but the rule declined the
    /// line (malformed body, or a deliberate silent discard).
    fn try_match(&self, rest: &str, prefix: &LinePrefix) -> Option<Option<RawLine>> {
        if !self.tag.is_match(rest) {
            return None;
        }
        match self.body.captures(rest) {
            Some(caps) => Some((self.build)(&caps, prefix)),
            None => Some(None),
        }
    }
}

macro_rules! rule {
    ($name:expr, $tag:expr, $body:expr, $build:expr) => {
        Rule {
            name: $name,
            tag: Regex::new($tag).unwrap(),
            body: Regex::new($body).unwrap(),
            build: $build,
        }
    };
}

/// The canonical rule set (§4.7). Consumers can `extend`/`retain`/filter
/// this `Vec` to compose their own table without touching this module.
pub fn default_rules() -> Vec<Rule> {
    vec![
        rule!(
            "PLAYER_CONNECTED",
            r"^LogSquad: PLAYER CONNECTED",
            r"^LogSquad: PLAYER CONNECTED: EOSID: (?P<eos>[0-9a-fA-F]{32}|INVALID) \| SteamID: (?P<steam>\d{17}|N/A) \| Controller: (?P<ctrl>\S+|N/A) \| IP: (?P<ip>\S+)$",
            |caps, prefix| {
                let eos_raw = &caps["eos"];
                if eos_raw == "INVALID" {
                    return None;
                }
                Some(RawLine::PlayerConnected {
                    chain_id: prefix.chain_id,
                    eos_id: EosId::parse(eos_raw)?,
                    steam_id: field(caps, "steam").and_then(|s| SteamId::parse(&s)),
                    controller: field(caps, "ctrl").and_then(|c| PlayerController::parse(&c)),
                    ip: caps["ip"].to_string(),
                    timestamp: prefix.timestamp,
                })
            }
        ),
        rule!(
            "PLAYER_DISCONNECTED",
            r"^LogSquad: PLAYER DISCONNECTED",
            r"^LogSquad: PLAYER DISCONNECTED: EOSID: (?P<eos>[0-9a-fA-F]{32}|INVALID) \| Suffix: (?P<suffix>.+)$",
            |caps, prefix| {
                let eos_raw = &caps["eos"];
                if eos_raw == "INVALID" {
                    return None;
                }
                Some(RawLine::PlayerDisconnected {
                    eos_id: EosId::parse(eos_raw)?,
                    suffix: caps["suffix"].to_string(),
                    timestamp: prefix.timestamp,
                })
            }
        ),
        rule!(
            "PLAYER_JOIN_SUCCEEDED",
            r"^LogSquad: PLAYER JOIN SUCCEEDED",
            r"^LogSquad: PLAYER JOIN SUCCEEDED$",
            |_caps, prefix| Some(RawLine::PlayerJoinSucceeded {
                chain_id: prefix.chain_id,
                timestamp: prefix.timestamp,
            })
        ),
        rule!(
            "PLAYER_POSSESS",
            r"^LogSquad: POSSESS",
            r"^LogSquad: POSSESS: Controller: (?P<ctrl>\S+) \| Possessed: (?P<possessed>\S+) \| Pawn: (?P<pawn>\S+) \| EOSID: (?P<eos>[0-9a-fA-F]{32}|N/A|INVALID) \| SteamID: (?P<steam>\d{17}|N/A) \| Name: (?P<name>.+)$",
            |caps, prefix| {
                if &caps["eos"] == "INVALID" {
                    return None;
                }
                Some(RawLine::PlayerPossess {
                    controller: PlayerController::parse(&caps["ctrl"])?,
                    possessed_controller: PlayerController::parse(&caps["possessed"])?,
                    pawn: caps["pawn"].to_string(),
                    eos_id: field(caps, "eos").and_then(|e| EosId::parse(&e)),
                    steam_id: field(caps, "steam").and_then(|s| SteamId::parse(&s)),
                    name: caps["name"].to_string(),
                    timestamp: prefix.timestamp,
                })
            }
        ),
        rule!(
            "PLAYER_UNPOSSESS",
            r"^LogSquad: UNPOSSESS",
            r"^LogSquad: UNPOSSESS: Controller: (?P<ctrl>\S+) \| Possessed: (?P<possessed>\S+) \| Pawn: (?P<pawn>\S+) \| EOSID: (?P<eos>[0-9a-fA-F]{32}|N/A|INVALID) \| SteamID: (?P<steam>\d{17}|N/A) \| Name: (?P<name>.+)$",
            |caps, prefix| {
                if &caps["eos"] == "INVALID" {
                    return None;
                }
                Some(RawLine::PlayerUnpossess {
                    controller: PlayerController::parse(&caps["ctrl"])?,
                    possessed_controller: PlayerController::parse(&caps["possessed"])?,
                    pawn: caps["pawn"].to_string(),
                    eos_id: field(caps, "eos").and_then(|e| EosId::parse(&e)),
                    steam_id: field(caps, "steam").and_then(|s| SteamId::parse(&s)),
                    name: caps["name"].to_string(),
                    timestamp: prefix.timestamp,
                })
            }
        ),
        rule!(
            "PLAYER_DAMAGED",
            r"^LogSquad: DAMAGED",
            r"^LogSquad: DAMAGED: Victim: (?P<victim>.+?) \| Damage: (?P<damage>[\d.]+) \| Weapon: (?P<weapon>\S+) \| Attacker: (?P<attacker>.+?|N/A) \| AttackerEOSID: (?P<eos>[0-9a-fA-F]{32}|N/A) \| AttackerSteamID: (?P<steam>\d{17}|N/A) \| AttackerController: (?P<ctrl>\S+|N/A)$",
            |caps, prefix| Some(RawLine::PlayerDamaged {
                chain_id: prefix.chain_id,
                victim_name: caps["victim"].to_string(),
                damage: caps["damage"].parse().ok()?,
                weapon: caps["weapon"].to_string(),
                attacker_name: field(caps, "attacker"),
                attacker_eos_id: field(caps, "eos").and_then(|e| EosId::parse(&e)),
                attacker_steam_id: field(caps, "steam").and_then(|s| SteamId::parse(&s)),
                attacker_controller: field(caps, "ctrl").and_then(|c| PlayerController::parse(&c)),
                timestamp: prefix.timestamp,
            })
        ),
        rule!(
            "PLAYER_WOUNDED",
            r"^LogSquad: WOUNDED",
            r"^LogSquad: WOUNDED: Victim: (?P<victim>.+?) \| Damage: (?P<damage>[\d.]+) \| Weapon: (?P<weapon>\S+) \| AttackerController: (?P<ctrl>\S+|N/A)$",
            |caps, prefix| Some(RawLine::PlayerWounded {
                victim_name: caps["victim"].to_string(),
                damage: caps["damage"].parse().ok()?,
                weapon: caps["weapon"].to_string(),
                attacker_controller: field(caps, "ctrl").and_then(|c| PlayerController::parse(&c)),
                timestamp: prefix.timestamp,
            })
        ),
        rule!(
            "PLAYER_DIED",
            r"^LogSquad: DIED",
            r"^LogSquad: DIED: Victim: (?P<victim>.+)$",
            |caps, prefix| Some(RawLine::PlayerDied {
                victim_name: caps["victim"].to_string(),
                timestamp: prefix.timestamp,
            })
        ),
        rule!(
            "PLAYER_REVIVED",
            r"^LogSquad: REVIVED",
            r"^LogSquad: REVIVED: Reviver: (?P<reviver>.+?) \| Victim: (?P<victim>.+)$",
            |caps, prefix| Some(RawLine::PlayerRevived {
                reviver_name: caps["reviver"].to_string(),
                victim_name: caps["victim"].to_string(),
                timestamp: prefix.timestamp,
            })
        ),
        rule!(
            "DEPLOYABLE_DAMAGED",
            r"^LogSquad: DEPLOYABLE DAMAGED",
            r"^LogSquad: DEPLOYABLE DAMAGED: Deployable: (?P<deployable>.+?) \| Damage: (?P<damage>[\d.]+) \| Weapon: (?P<weapon>\S+) \| Attacker: (?P<attacker>.+?|N/A)$",
            |caps, prefix| Some(RawLine::DeployableDamaged {
                deployable: caps["deployable"].to_string(),
                damage: caps["damage"].parse().ok()?,
                weapon: caps["weapon"].to_string(),
                attacker_name: field(caps, "attacker"),
                timestamp: prefix.timestamp,
            })
        ),
        rule!(
            "ADMIN_BROADCAST",
            r"^LogSquad: ADMIN BROADCAST",
            r#"^LogSquad: ADMIN BROADCAST: Message: "(?P<message>.*)" \| From: (?P<from>.+?|N/A)$"#,
            |caps, prefix| Some(RawLine::AdminBroadcast {
                message: caps["message"].to_string(),
                from: field(caps, "from"),
                timestamp: prefix.timestamp,
            })
        ),
        rule!(
            "NEW_GAME",
            r"^LogGameState: NEW GAME",
            r"^LogGameState: NEW GAME: Layer: (?P<layer>\S+) \| Level: (?P<level>.+?|N/A)$",
            |caps, prefix| Some(RawLine::NewGame {
                layer: caps["layer"].to_string(),
                level: field(caps, "level"),
                timestamp: prefix.timestamp,
            })
        ),
        rule!(
            "ROUND_ENDED",
            r"^LogGameState: ROUND ENDED",
            r"^LogGameState: ROUND ENDED$",
            |_caps, prefix| Some(RawLine::RoundEnded { timestamp: prefix.timestamp })
        ),
        rule!(
            "ROUND_TICKETS",
            r"^LogGameState: TICKETS",
            r"^LogGameState: TICKETS: Team: (?P<team>.+?) \| Tickets: (?P<tickets>-?[\d.]+)$",
            |caps, prefix| Some(RawLine::RoundTickets {
                team: caps["team"].to_string(),
                tickets: caps["tickets"].parse().ok()?,
                timestamp: prefix.timestamp,
            })
        ),
        rule!(
            "ROUND_WINNER",
            r"^LogGameState: ROUND WINNER",
            r"^LogGameState: ROUND WINNER: WinnerTeam: (?P<wt>.+?) \| WinnerFaction: (?P<wf>.+?) \| WinnerSubFaction: (?P<wsf>.+?|N/A) \| WinnerTickets: (?P<wtk>-?[\d.]+) \| LoserTeam: (?P<lt>.+?) \| LoserFaction: (?P<lf>.+?) \| LoserSubFaction: (?P<lsf>.+?|N/A) \| LoserTickets: (?P<ltk>-?[\d.]+) \| Layer: (?P<layer>.+?|N/A) \| Level: (?P<level>.+?|N/A)$",
            |caps, prefix| Some(RawLine::RoundWinner {
                winner: TeamResultRaw {
                    team: caps["wt"].to_string(),
                    faction: caps["wf"].to_string(),
                    subfaction: field(caps, "wsf"),
                    tickets: caps["wtk"].parse().ok()?,
                },
                loser: TeamResultRaw {
                    team: caps["lt"].to_string(),
                    faction: caps["lf"].to_string(),
                    subfaction: field(caps, "lsf"),
                    tickets: caps["ltk"].parse().ok()?,
                },
                layer: field(caps, "layer"),
                level: field(caps, "level"),
                timestamp: prefix.timestamp,
            })
        ),
        rule!(
            "SERVER_TICK_RATE",
            r"^LogSquad: SERVER TICK RATE",
            r"^LogSquad: SERVER TICK RATE: (?P<rate>[\d.]+)$",
            |caps, prefix| Some(RawLine::ServerTickRate {
                rate: caps["rate"].parse().ok()?,
                timestamp: prefix.timestamp,
            })
        ),
    ]
}

/// Runs `line` through the prefix parser and then the rule table, in
/// order, returning the first rule's outcome. Lines with no prefix match,
/// no rule-tag match, or a declining rule all silently produce `None`.
pub fn parse_line(line: &str, rules: &[Rule]) -> Option<RawLine> {
    let (prefix, rest) = parse_prefix(line)?;
    for rule in rules {
        if let Some(outcome) = rule.try_match(rest, &prefix) {
            return outcome;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S2 — timestamp parse rejection: Feb 30 is not a valid calendar date.
    #[test]
    fn rejects_invalid_calendar_date() {
        let line = "[2024.02.30-12.30.45:123][ 1]LogSquad: SERVER TICK RATE: 30.0";
        assert!(parse_prefix(line).is_none());
    }

    #[test]
    fn parses_a_valid_prefix_with_padded_chain_id() {
        let line = "[2024.02.22-19.00.00:000][  277]LogSquad: SERVER TICK RATE: 30.0";
        let (prefix, rest) = parse_prefix(line).unwrap();
        assert_eq!(prefix.chain_id.get(), 277);
        assert_eq!(rest, "LogSquad: SERVER TICK RATE: 30.0");
    }

    #[test]
    fn player_connected_round_trips_identity_fields() {
        let rules = default_rules();
        let line = "[2024.02.22-19.00.00:000][ 5]LogSquad: PLAYER CONNECTED: EOSID: 0002a10186d9414496bf20d22d3860ba | SteamID: 76561198012345678 | Controller: BP_PlayerController_C_1 | IP: 1.2.3.4";
        match parse_line(line, &rules) {
            Some(RawLine::PlayerConnected { chain_id, eos_id, steam_id, ip, .. }) => {
                assert_eq!(chain_id.get(), 5);
                assert_eq!(eos_id.as_str(), "0002a10186d9414496bf20d22d3860ba");
                assert_eq!(steam_id.unwrap().as_str(), "76561198012345678");
                assert_eq!(ip, "1.2.3.4");
            }
            other => panic!("expected PlayerConnected, got {other:?}"),
        }
    }

    #[test]
    fn invalid_eosid_marker_discards_the_line() {
        let rules = default_rules();
        let line = "[2024.02.22-19.00.00:000][ 5]LogSquad: PLAYER CONNECTED: EOSID: INVALID | SteamID: N/A | Controller: N/A | IP: 1.2.3.4";
        assert!(parse_line(line, &rules).is_none());
    }

    #[test]
    fn unmatched_tag_is_silently_discarded() {
        let rules = default_rules();
        let line = "[2024.02.22-19.00.00:000][ 5]LogSomethingElse: nothing we parse";
        assert!(parse_line(line, &rules).is_none());
    }

    #[test]
    fn damaged_then_died_round_trip_through_the_table() {
        let rules = default_rules();
        let damaged = "[2024.02.22-19.00.00:000][ 9]LogSquad: DAMAGED: Victim: V | Damage: 50 | Weapon: AK | Attacker: A | AttackerEOSID: N/A | AttackerSteamID: N/A | AttackerController: N/A";
        let died = "[2024.02.22-19.00.05:000][ 9]LogSquad: DIED: Victim: V";
        assert!(matches!(parse_line(damaged, &rules), Some(RawLine::PlayerDamaged { .. })));
        assert!(matches!(parse_line(died, &rules), Some(RawLine::PlayerDied { .. })));
    }
}
