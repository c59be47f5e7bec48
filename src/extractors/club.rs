// =============================================================================
// extractors/club.rs - CLUB PROFILE AND SQUAD
// =============================================================================
//
// Profile page: /-/datenfakten/verein/{id}
// Squad page:   /-/kader/verein/{id}/saison_id/{season}/plus/1
//
// The squad table can run to forty-odd rows, each with half a dozen fields
// to normalize. Rows are first copied out of the DOM as plain strings (the
// DOM cannot leave this thread), then normalized in parallel with rayon.
// =============================================================================

use std::sync::LazyLock;

use rayon::prelude::*;
use scraper::{ElementRef, Selector};

use crate::assembler::{Assembly, Outcome};
use crate::error::FetchError;
use crate::extractors::player::{headline_name, HEADER_CLUB_LINK, FLAG, HEADLINE, LINK, MARKET_VALUE, PAGE_MARKER};
use crate::extractors::{extract, is_valid_id, known, reject_id};
use crate::fetch::FetchClient;
use crate::html::{all_attrs, element_text, first_text, has_marker, own_text, selector, text_without, Page};
use crate::models::{ClubPlayers, ClubProfile, CompetitionRef, SquadPlayer};
use crate::normalizers::{
    birth_fields, count_field, id_from_href, parse_birthdate_age, market_value, parse_decimal, parse_position, parse_season_id,
    text_field, Normalized,
};
use crate::transport::Transport;

static SEATS: LazyLock<Selector> = LazyLock::new(|| selector("span.tabellenplatz"));
static SQUAD_ROW: LazyLock<Selector> = LazyLock::new(|| selector("table.items > tbody > tr"));
static PLAYER_LINK: LazyLock<Selector> = LazyLock::new(|| selector("td.hauptlink a[href*=\"/spieler/\"]"));
static INLINE_POSITION: LazyLock<Selector> =
    LazyLock::new(|| selector("table.inline-table tr:nth-child(2) td"));
static CENTERED: LazyLock<Selector> = LazyLock::new(|| selector("td.zentriert"));
static VALUE_CELL: LazyLock<Selector> = LazyLock::new(|| selector("td.rechts.hauptlink"));
pub(crate) static SELECTED_SEASON: LazyLock<Selector> =
    LazyLock::new(|| selector("select[name=\"saison_id\"] option[selected]"));

pub fn profile_path(id: &str) -> String {
    format!("/-/datenfakten/verein/{}", id)
}

pub fn players_path(id: &str, season: Option<u16>) -> String {
    match season {
        Some(season) => format!("/-/kader/verein/{}/saison_id/{}/plus/1", id, season),
        None => format!("/-/kader/verein/{}/plus/1", id),
    }
}

pub async fn fetch_and_parse<T: Transport>(
    client: &FetchClient<T>,
    id: &str,
) -> Result<Outcome<ClubProfile>, FetchError> {
    if !is_valid_id(id) {
        return Ok(reject_id(client, "club", id));
    }
    extract(client, "club", id, profile_path(id), |doc| {
        parse_profile(id, doc.url.as_str(), &doc.body)
    })
    .await
}

pub async fn fetch_and_parse_players<T: Transport>(
    client: &FetchClient<T>,
    id: &str,
    season: Option<u16>,
) -> Result<Outcome<ClubPlayers>, FetchError> {
    if !is_valid_id(id) {
        return Ok(reject_id(client, "club_players", id));
    }
    extract(client, "club_players", id, players_path(id, season), |doc| {
        parse_players(id, season, doc.url.as_str(), &doc.body)
    })
    .await
}

pub fn parse_profile(id: &str, url: &str, body: &[u8]) -> Outcome<ClubProfile> {
    if !has_marker(body, PAGE_MARKER) {
        return Outcome::NotFound;
    }
    let page = Page::parse(&String::from_utf8_lossy(body));
    if !page.exists(&HEADLINE) {
        return Outcome::NotFound;
    }

    let (name, _) = headline_name(&page);
    let details = page.header_details();
    let mut asm = Assembly::new();

    let league = page.first(&HEADER_CLUB_LINK).map(|a| CompetitionRef {
        id: a.value().attr("href").and_then(id_from_href),
        name: a.value().attr("title").map(String::from).or_else(|| element_text(a)),
    });

    let stadium = details.get(&["stadium", "stadion", "estadio"]);
    let stadium_name = stadium.and_then(|el| first_text(el, &LINK).or_else(|| own_text(el)));
    let stadium_seats = stadium.and_then(|el| first_text(el, &SEATS));

    let value = page.first(&MARKET_VALUE).and_then(|el| text_without(el, "p"));

    let record = ClubProfile {
        id: id.to_string(),
        url: url.to_string(),
        name: asm.require("name", text_field(name.as_deref())),
        league,
        squad_size: asm.take(
            "squad_size",
            count_field(details.text(&["squad size", "kadergröße", "plantilla"]).as_deref()),
        ),
        average_age: asm.take(
            "average_age",
            Normalized::from_raw(
                known(details.text(&["average age", "durchschnittsalter", "ø-alter", "edad media"])).as_deref(),
                parse_decimal,
            ),
        ),
        foreigners: asm.take(
            "foreigners",
            count_field(known(details.text(&["foreigners", "legionäre", "extranjeros"])).as_deref()),
        ),
        stadium_name: asm.take("stadium_name", text_field(stadium_name.as_deref())),
        stadium_seats: asm.take("stadium_seats", count_field(stadium_seats.as_deref())),
        total_market_value_eur: asm.take("total_market_value_eur", market_value(value.as_deref())),
    };

    asm.finish(record)
}

/// A squad row copied out of the DOM.
#[derive(Debug, Clone, Default)]
struct RawSquadRow {
    href: Option<String>,
    name: Option<String>,
    position: Option<String>,
    birth: Option<String>,
    nationalities: Vec<String>,
    value: Option<String>,
}

fn read_squad_row(row: ElementRef<'_>) -> RawSquadRow {
    let link = row.select(&PLAYER_LINK).next();
    // date of birth is the centred cell that reads as one; failing that, the
    // one with "(age)" in it, so a garbled date still gets reported
    let centered: Vec<String> = row.select(&CENTERED).filter_map(element_text).collect();
    let birth = centered
        .iter()
        .find(|text| parse_birthdate_age(text).date.is_some())
        .or_else(|| centered.iter().find(|text| text.contains('(')))
        .cloned();

    RawSquadRow {
        href: link.and_then(|a| a.value().attr("href")).map(String::from),
        name: link.and_then(element_text),
        position: first_text(row, &INLINE_POSITION),
        birth,
        nationalities: all_attrs(row, &FLAG, "title"),
        value: first_text(row, &VALUE_CELL),
    }
}

fn normalize_squad_row(raw: RawSquadRow) -> Option<(SquadPlayer, Assembly)> {
    let id = raw.href.as_deref().and_then(id_from_href)?;
    let mut asm = Assembly::new();
    let (date_of_birth, age) = birth_fields(raw.birth.as_deref());

    let player = SquadPlayer {
        id,
        name: asm.require("name", text_field(raw.name.as_deref())),
        position: asm.take("position", Normalized::from_raw(raw.position.as_deref(), parse_position)),
        date_of_birth: asm.take("date_of_birth", date_of_birth),
        age: asm.take("age", age),
        nationalities: raw.nationalities,
        market_value_eur: asm.take("market_value_eur", market_value(raw.value.as_deref())),
    };
    Some((player, asm))
}

pub fn parse_players(id: &str, season: Option<u16>, url: &str, body: &[u8]) -> Outcome<ClubPlayers> {
    if !has_marker(body, PAGE_MARKER) {
        return Outcome::NotFound;
    }

    let (raw_rows, page_season) = {
        let page = Page::parse(&String::from_utf8_lossy(body));
        if !page.exists(&HEADLINE) {
            return Outcome::NotFound;
        }
        let rows: Vec<RawSquadRow> = page
            .select(&SQUAD_ROW)
            .filter(|tr| tr.select(&CENTERED).next().is_some())
            .map(read_squad_row)
            .collect();
        let page_season = page
            .attr(&SELECTED_SEASON, "value")
            .as_deref()
            .and_then(parse_season_id);
        (rows, page_season)
    };

    let normalized: Vec<Option<(SquadPlayer, Assembly)>> =
        raw_rows.into_par_iter().map(normalize_squad_row).collect();

    let mut asm = Assembly::new();
    let players = asm.rows(normalized);

    asm.finish(ClubPlayers {
        club_id: id.to_string(),
        season: season.or(page_season),
        url: url.to_string(),
        players,
    })
}
