// =============================================================================
// models.rs - THE RECORDS WE HAND BACK
// =============================================================================
//
// Every field is either a typed value or `None`, which serializes as `null`.
// A raw page string never ends up in a numeric or date field; when a value
// could not be read the assembler leaves it `None` and names it in the
// `missing` list of a degraded outcome.
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PositionGroup {
    Goalkeeper,
    Defender,
    Midfield,
    Attack,
}

impl fmt::Display for PositionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionGroup::Goalkeeper => write!(f, "Goalkeeper"),
            PositionGroup::Defender => write!(f, "Defender"),
            PositionGroup::Midfield => write!(f, "Midfield"),
            PositionGroup::Attack => write!(f, "Attack"),
        }
    }
}

/// Where a player plays. `detail` is the canonical English name of the
/// specific role when the page gives one ("Centre-Forward").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub group: PositionGroup,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Foot {
    Left,
    Right,
    Both,
}

/// What changed hands in a transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "amount", rename_all = "snake_case")]
pub enum TransferFee {
    Amount(u64),
    FreeTransfer,
    /// A loan, with its fee when one was disclosed.
    Loan(Option<u64>),
    EndOfLoan,
}

/// A club as referenced from another page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClubRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompetitionRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerProfile {
    pub id: String,
    pub url: String,
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub shirt_number: Option<u32>,
    pub date_of_birth: Option<NaiveDate>,
    pub age: Option<u32>,
    pub place_of_birth: Option<String>,
    pub height_cm: Option<u16>,
    pub citizenship: Vec<String>,
    pub position: Option<Position>,
    pub foot: Option<Foot>,
    pub current_club: Option<ClubRef>,
    pub joined: Option<NaiveDate>,
    pub contract_expires: Option<NaiveDate>,
    pub market_value_eur: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transfer {
    pub season: Option<String>,
    pub date: Option<NaiveDate>,
    pub from: ClubRef,
    pub to: ClubRef,
    pub market_value_eur: Option<u64>,
    pub fee: Option<TransferFee>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerTransfers {
    pub player_id: String,
    pub url: String,
    pub transfers: Vec<Transfer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClubProfile {
    pub id: String,
    pub url: String,
    pub name: Option<String>,
    pub league: Option<CompetitionRef>,
    pub squad_size: Option<u32>,
    pub average_age: Option<f64>,
    pub foreigners: Option<u32>,
    pub stadium_name: Option<String>,
    pub stadium_seats: Option<u32>,
    pub total_market_value_eur: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SquadPlayer {
    pub id: String,
    pub name: Option<String>,
    pub position: Option<Position>,
    pub date_of_birth: Option<NaiveDate>,
    pub age: Option<u32>,
    pub nationalities: Vec<String>,
    pub market_value_eur: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClubPlayers {
    pub club_id: String,
    pub season: Option<u16>,
    pub url: String,
    pub players: Vec<SquadPlayer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompetitionClubs {
    pub id: String,
    pub url: String,
    pub name: Option<String>,
    pub season: Option<u16>,
    pub clubs: Vec<ClubRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerHit {
    pub id: String,
    pub name: Option<String>,
    pub position: Option<Position>,
    pub club: Option<ClubRef>,
    pub age: Option<u32>,
    pub nationalities: Vec<String>,
    pub market_value_eur: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClubHit {
    pub id: String,
    pub name: Option<String>,
    pub country: Option<String>,
    pub squad_size: Option<u32>,
    pub market_value_eur: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompetitionHit {
    pub id: String,
    pub name: Option<String>,
    pub country: Option<String>,
    pub clubs: Option<u32>,
    pub players: Option<u32>,
    pub total_market_value_eur: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResults<T> {
    pub query: String,
    pub page_number: u32,
    pub last_page_number: u32,
    pub results: Vec<T>,
}
