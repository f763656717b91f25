//! Unsolicited-frame classification (§4.4): chat lines, admin-camera
//! toggles, warn/kick/ban announcements and squad creation all arrive as
//! RCON frames the server sends without being asked. Patterns are tried
//! in the order the spec lists them; the first match wins.

use std::sync::LazyLock;

use domain::ids::{EosId, SquadId, SteamId};
use regex::Regex;

fn parse_online_ids(raw: &str) -> Option<(Option<EosId>, Option<SteamId>)> {
    static EOS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\beos:\s*(\S+)").unwrap());
    static STEAM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bsteam:\s*(\S+)").unwrap());
    if raw.contains("INVALID") {
        return None;
    }
    Some((
        EOS.captures(raw).and_then(|c| EosId::parse(c.get(1)?.as_str())),
        STEAM.captures(raw).and_then(|c| SteamId::parse(c.get(1)?.as_str())),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatChannel {
    All,
    Team,
    Squad,
    Admin,
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
pub struct AdminCamEvent {
    pub entered: bool,
    pub player_name: String,
    pub eos_id: Option<EosId>,
    pub steam_id: Option<SteamId>,
}

#[derive(Debug, Clone)]
pub struct PlayerWarned {
    pub player_name: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct PlayerKicked {
    pub player_id: u16,
    pub player_name: String,
}

#[derive(Debug, Clone)]
pub struct PlayerBanned {
    pub player_id: u16,
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
pub enum ChatClassification {
    ChatMessage(ChatMessage),
    AdminCam(AdminCamEvent),
    PlayerWarned(PlayerWarned),
    PlayerKicked(PlayerKicked),
    PlayerBanned(PlayerBanned),
    SquadCreated(SquadCreated),
}

static CHAT_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\[Chat(All|Team|Squad|Admin)\] \[(?P<online>Online IDs?:[^\]]*)\] (?P<name>[^:]+?) : (?P<message>.*)$").unwrap()
});
static ADMIN_CAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\[(?P<online>Online Ids?:[^\]]*)\] (?P<name>.+?) has (?P<verb>possessed|unpossessed) admin camera\.?$").unwrap()
});
static PLAYER_WARNED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^Remote admin has warned player (?P<name>.+?)\. Message was "(?P<reason>.*)"$"#).unwrap()
});
static PLAYER_KICKED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Kicked player (?P<id>\d+)\. \[(?P<online>Online IDs?=[^\]]*)\] (?P<name>.+)$").unwrap()
});
static PLAYER_BANNED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Banned player (?P<id>\d+)\. \[(?P<online>Online IDs?=[^\]]*)\] (?P<name>.+?) for interval (?P<interval>.+)$").unwrap()
});
static SQUAD_CREATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>.+?) \((?P<online>Online IDs?:[^)]*)\) has created Squad (?P<id>\d+) \(Squad Name: (?P<squad>.+?)\) on (?P<team>.+)$").unwrap()
});

fn channel_from_tag(tag: &str) -> ChatChannel {
    match tag.to_ascii_lowercase().as_str() {
        "all" => ChatChannel::All,
        "team" => ChatChannel::Team,
        "squad" => ChatChannel::Squad,
        "admin" => ChatChannel::Admin,
        _ => ChatChannel::All,
    }
}

/// Classifies a frame body the ingress loop has already heuristically
/// identified as unsolicited chat. Returns `None` if no pattern matches
/// or the line's online-id region carries an `INVALID` marker (dropped
/// per §4.4).
pub fn classify(body: &str) -> Option<ChatClassification> {
    let body = body.trim();

    if let Some(caps) = CHAT_MESSAGE.captures(body) {
        let (eos_id, steam_id) = parse_online_ids(&caps["online"])?;
        return Some(ChatClassification::ChatMessage(ChatMessage {
            channel: channel_from_tag(&caps[1]),
            player_name: caps["name"].trim().to_string(),
            message: caps["message"].to_string(),
            eos_id,
            steam_id,
        }));
    }
    if let Some(caps) = ADMIN_CAM.captures(body) {
        let (eos_id, steam_id) = parse_online_ids(&caps["online"])?;
        return Some(ChatClassification::AdminCam(AdminCamEvent {
            entered: caps["verb"].eq_ignore_ascii_case("possessed"),
            player_name: caps["name"].trim().to_string(),
            eos_id,
            steam_id,
        }));
    }
    if let Some(caps) = PLAYER_WARNED.captures(body) {
        return Some(ChatClassification::PlayerWarned(PlayerWarned {
            player_name: caps["name"].to_string(),
            reason: caps["reason"].to_string(),
        }));
    }
    if let Some(caps) = PLAYER_KICKED.captures(body) {
        let id: u16 = caps["id"].parse().ok()?;
        let _ = parse_online_ids(&caps["online"])?;
        return Some(ChatClassification::PlayerKicked(PlayerKicked {
            player_id: id,
            player_name: caps["name"].trim().to_string(),
        }));
    }
    if let Some(caps) = PLAYER_BANNED.captures(body) {
        let id: u16 = caps["id"].parse().ok()?;
        let _ = parse_online_ids(&caps["online"])?;
        return Some(ChatClassification::PlayerBanned(PlayerBanned {
            player_id: id,
            player_name: caps["name"].trim().to_string(),
            interval: caps["interval"].to_string(),
        }));
    }
    if let Some(caps) = SQUAD_CREATED.captures(body) {
        let (eos_id, steam_id) = parse_online_ids(&caps["online"])?;
        let squad_id = SquadId::parse(&caps["id"])?;
        return Some(ChatClassification::SquadCreated(SquadCreated {
            creator_name: caps["name"].trim().to_string(),
            eos_id,
            steam_id,
            squad_id,
            squad_name: caps["squad"].to_string(),
            team_name: caps["team"].to_string(),
        }));
    }
    None
}

/// Pre-classification heuristic from §4.2: does this frame body look like
/// unsolicited chat rather than a command response?
pub fn looks_like_chat(body: &str) -> bool {
    body.starts_with("[Chat")
        || body.starts_with("[Online")
        || body.starts_with("Remote admin")
        || body.starts_with("Kicked player")
        || body.starts_with("Banned player")
        || body.contains("has created Squad")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S1 — chat parse round-trip.
    #[test]
    fn classifies_chat_all_message() {
        let body = "[ChatAll] [Online IDs:EOS: 0002a10186d9414496bf20d22d3860ba steam: 76561198012345678] TestPlayer : Hello world";
        match classify(body) {
            Some(ChatClassification::ChatMessage(msg)) => {
                assert_eq!(msg.channel, ChatChannel::All);
                assert_eq!(msg.player_name, "TestPlayer");
                assert_eq!(msg.message, "Hello world");
                assert_eq!(msg.steam_id.unwrap().as_str(), "76561198012345678");
                assert_eq!(msg.eos_id.unwrap().as_str(), "0002a10186d9414496bf20d22d3860ba");
            }
            other => panic!("expected ChatMessage, got {other:?}"),
        }
    }

    #[test]
    fn accepts_both_ids_and_ID_case_variants_for_admin_cam() {
        let lower = "[Online Ids:EOS: 0002a10186d9414496bf20d22d3860ba] Admin has possessed admin camera.";
        let upper = "[Online IDs:EOS: 0002a10186d9414496bf20d22d3860ba] Admin has unpossessed admin camera.";
        assert!(matches!(classify(lower), Some(ChatClassification::AdminCam(e)) if e.entered));
        assert!(matches!(classify(upper), Some(ChatClassification::AdminCam(e)) if !e.entered));
    }

    #[test]
    fn parses_kick_and_ban_announcements() {
        let kick = "Kicked player 3. [Online IDs=EOS: 0002a10186d9414496bf20d22d3860ba] Griefer";
        match classify(kick) {
            Some(ChatClassification::PlayerKicked(k)) => {
                assert_eq!(k.player_id, 3);
                assert_eq!(k.player_name, "Griefer");
            }
            other => panic!("expected PlayerKicked, got {other:?}"),
        }

        let ban = "Banned player 4. [Online IDs=EOS: 0002a10186d9414496bf20d22d3860ba] Cheater for interval 1d";
        match classify(ban) {
            Some(ChatClassification::PlayerBanned(b)) => {
                assert_eq!(b.player_id, 4);
                assert_eq!(b.interval, "1d");
            }
            other => panic!("expected PlayerBanned, got {other:?}"),
        }
    }

    #[test]
    fn invalid_online_id_marker_drops_the_line() {
        let body = "[ChatAll] [Online IDs:EOS: INVALID] Ghost : test";
        assert!(classify(body).is_none());
    }

    #[test]
    fn recognizes_squad_created_announcement() {
        let body = "Leader (Online IDs:EOS: 0002a10186d9414496bf20d22d3860ba) has created Squad 5 (Squad Name: Alpha) on British Army";
        match classify(body) {
            Some(ChatClassification::SquadCreated(sq)) => {
                assert_eq!(sq.squad_id.get(), 5);
                assert_eq!(sq.squad_name, "Alpha");
                assert_eq!(sq.team_name, "British Army");
            }
            other => panic!("expected SquadCreated, got {other:?}"),
        }
    }
}
