//! Branded identifier types (§3). Each wraps a primitive but is never
//! convertible to another id type without going through a smart
//! constructor, so a `SteamID` can never be passed where an `EOSID` is
//! expected even though both are ultimately strings.

use std::fmt;

/// 17-digit decimal SteamID64.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SteamId(String);

impl SteamId {
    /// Validates and wraps a raw string. Must be exactly 17 ASCII decimal digits.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == 17 && raw.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 32-character lower-case hex Epic Online Services id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EosId(String);

impl EosId {
    /// Validates and normalizes to lower-case. Must be exactly 32 hex characters.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == 32 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EosId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Small positive integer assigned by the game server (1–1024).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(u16);

impl PlayerId {
    pub fn parse(raw: &str) -> Option<Self> {
        raw.parse::<u16>().ok().and_then(Self::new)
    }

    pub fn new(value: u16) -> Option<Self> {
        if (1..=1024).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Team identifier, either 1 or 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TeamId(u8);

impl TeamId {
    pub fn parse(raw: &str) -> Option<Self> {
        raw.parse::<u8>().ok().and_then(Self::new)
    }

    pub fn new(value: u8) -> Option<Self> {
        if value == 1 || value == 2 {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Positive squad identifier, unique within a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SquadId(u32);

impl SquadId {
    pub fn parse(raw: &str) -> Option<Self> {
        raw.parse::<u32>().ok().and_then(Self::new)
    }

    pub fn new(value: u32) -> Option<Self> {
        if value > 0 { Some(Self(value)) } else { None }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SquadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chain-id tag the game server attaches to correlated log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(u64);

impl ChainId {
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<u64>().ok().map(Self)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque engine controller name, e.g. `BP_PlayerController_C_12345`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayerController(String);

impl PlayerController {
    pub fn parse(raw: &str) -> Option<Self> {
        let digits_start = raw.rfind('_').map(|i| i + 1)?;
        let (prefix, digits) = raw.split_at(digits_start);
        if prefix.starts_with("BP_PlayerController") && prefix.ends_with("_C_") && !digits.is_empty()
            && digits.bytes().all(|b| b.is_ascii_digit())
        {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steam_id_requires_exactly_17_digits() {
        assert!(SteamId::parse("76561198012345678").is_some());
        assert!(SteamId::parse("7656119801234567").is_none());
        assert!(SteamId::parse("7656119801234567a").is_none());
    }

    #[test]
    fn eos_id_normalizes_case() {
        let id = EosId::parse("0002A10186D9414496BF20D22D3860BA").unwrap();
        assert_eq!(id.as_str(), "0002a10186d9414496bf20d22d3860ba");
    }

    #[test]
    fn eos_id_rejects_wrong_length() {
        assert!(EosId::parse("0002a10186d9414496bf20d22d3860").is_none());
    }

    #[test]
    fn player_id_range() {
        assert!(PlayerId::new(0).is_none());
        assert!(PlayerId::new(1).is_some());
        assert!(PlayerId::new(1024).is_some());
        assert!(PlayerId::new(1025).is_none());
    }

    #[test]
    fn team_id_only_one_or_two() {
        assert!(TeamId::new(1).is_some());
        assert!(TeamId::new(2).is_some());
        assert!(TeamId::new(3).is_none());
    }

    #[test]
    fn player_controller_pattern() {
        assert!(PlayerController::parse("BP_PlayerController_C_12345").is_some());
        assert!(PlayerController::parse("BP_Pawn_C_12345").is_none());
    }
}
