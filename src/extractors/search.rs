// =============================================================================
// extractors/search.rs - QUICK SEARCH
// =============================================================================
//
// Page: /schnellsuche/ergebnis/schnellsuche?query={q}&{Kind}_page={page}
//
// One results page holds a box per kind of hit (players, clubs,
// competitions...), each a table with its own pagination. Box headings are
// localized, so the right box is picked by what its rows link to instead.
// A kind with no hits has no box at all; that is an empty result, not a
// missing page.
// =============================================================================

use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use crate::assembler::{Assembly, Outcome};
use crate::error::FetchError;
use crate::extractors::extract;
use crate::extractors::player::FLAG;
use crate::fetch::FetchClient;
use crate::html::{all_attrs, element_text, first_attr, first_text, has_marker, last_page_number, selector, Page};
use crate::models::{ClubHit, ClubRef, CompetitionHit, PlayerHit, SearchResults};
use crate::normalizers::{count_field, id_from_href, market_value, parse_position, text_field, Normalized};
use crate::transport::Transport;

const PAGE_MARKER: &str = "class=\"box";

static BOX: LazyLock<Selector> = LazyLock::new(|| selector("div.box"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("table.items > tbody > tr"));
static PLAYER_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector("td.hauptlink a[href*=\"/profil/spieler/\"]"));
static CLUB_LINK: LazyLock<Selector> = LazyLock::new(|| selector("td.hauptlink a[href*=\"/verein/\"]"));
static COMPETITION_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector("td.hauptlink a[href*=\"/wettbewerb/\"]"));
static ROW_CLUB_LINK: LazyLock<Selector> = LazyLock::new(|| selector("td.zentriert a[href*=\"/verein/\"]"));
static CENTERED: LazyLock<Selector> = LazyLock::new(|| selector("td.zentriert"));
static VALUE_CELL: LazyLock<Selector> = LazyLock::new(|| selector("td.rechts"));
static CREST: LazyLock<Selector> = LazyLock::new(|| selector("img"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum SearchKind {
    Players,
    Clubs,
    Competitions,
}

impl SearchKind {
    /// Query parameter selecting the page of this kind's box.
    pub fn page_param(&self) -> &'static str {
        match self {
            SearchKind::Players => "Spieler_page",
            SearchKind::Clubs => "Verein_page",
            SearchKind::Competitions => "Wettbewerb_page",
        }
    }

    pub fn job_kind(&self) -> &'static str {
        match self {
            SearchKind::Players => "search_players",
            SearchKind::Clubs => "search_clubs",
            SearchKind::Competitions => "search_competitions",
        }
    }

    fn row_link(&self) -> &'static Selector {
        match self {
            SearchKind::Players => &PLAYER_LINK,
            SearchKind::Clubs => &CLUB_LINK,
            SearchKind::Competitions => &COMPETITION_LINK,
        }
    }
}

pub fn search_path(kind: SearchKind, query: &str, page: u32) -> String {
    format!(
        "/schnellsuche/ergebnis/schnellsuche?query={}&{}={}",
        urlencoding::encode(query.trim()),
        kind.page_param(),
        page.max(1)
    )
}

async fn search<T, H, F>(
    client: &FetchClient<T>,
    kind: SearchKind,
    query: &str,
    page: u32,
    read_row: F,
) -> Result<Outcome<SearchResults<H>>, FetchError>
where
    T: Transport,
    F: Fn(ElementRef<'_>) -> Option<(H, Assembly)>,
{
    let query = query.trim();
    if query.is_empty() {
        return Ok(Outcome::NotFound);
    }
    extract(client, kind.job_kind(), query, search_path(kind, query, page), |doc| {
        parse_results(kind, query, page, &doc.body, &read_row)
    })
    .await
}

pub async fn players<T: Transport>(
    client: &FetchClient<T>,
    query: &str,
    page: u32,
) -> Result<Outcome<SearchResults<PlayerHit>>, FetchError> {
    search(client, SearchKind::Players, query, page, player_row).await
}

pub async fn clubs<T: Transport>(
    client: &FetchClient<T>,
    query: &str,
    page: u32,
) -> Result<Outcome<SearchResults<ClubHit>>, FetchError> {
    search(client, SearchKind::Clubs, query, page, club_row).await
}

pub async fn competitions<T: Transport>(
    client: &FetchClient<T>,
    query: &str,
    page: u32,
) -> Result<Outcome<SearchResults<CompetitionHit>>, FetchError> {
    search(client, SearchKind::Competitions, query, page, competition_row).await
}

/// Parse one kind's box out of a results page.
pub fn parse_results<H, F>(
    kind: SearchKind,
    query: &str,
    page_number: u32,
    body: &[u8],
    read_row: F,
) -> Outcome<SearchResults<H>>
where
    F: Fn(ElementRef<'_>) -> Option<(H, Assembly)>,
{
    if !has_marker(body, PAGE_MARKER) {
        return Outcome::NotFound;
    }
    let page = Page::parse(&String::from_utf8_lossy(body));
    if !page.exists(&BOX) {
        return Outcome::NotFound;
    }

    let results_box = page
        .select(&BOX)
        .find(|b| b.select(&ROW).any(|row| row.select(kind.row_link()).next().is_some()));

    let mut asm = Assembly::new();
    let (results, last_page) = match results_box {
        Some(b) => {
            let rows: Vec<Option<(H, Assembly)>> = b.select(&ROW).map(&read_row).collect();
            (asm.rows(rows), last_page_number(b))
        }
        None => (Vec::new(), 1),
    };

    asm.finish(SearchResults {
        query: query.to_string(),
        page_number: page_number.max(1),
        last_page_number: last_page,
        results,
    })
}

fn centered_texts(row: ElementRef<'_>) -> Vec<Option<String>> {
    row.select(&CENTERED).map(element_text).collect()
}

fn hit_identity(row: ElementRef<'_>, link: &Selector) -> Option<(String, Option<String>)> {
    let a = row.select(link).next()?;
    let id = a.value().attr("href").and_then(id_from_href)?;
    Some((id, element_text(a).or_else(|| a.value().attr("title").map(String::from))))
}

pub fn player_row(row: ElementRef<'_>) -> Option<(PlayerHit, Assembly)> {
    let (id, name) = hit_identity(row, &PLAYER_LINK)?;
    let cells = centered_texts(row);
    let cell = |i: usize| cells.get(i).cloned().flatten();

    let club = row.select(&ROW_CLUB_LINK).next().map(|a| ClubRef {
        id: a.value().attr("href").and_then(id_from_href),
        name: a
            .value()
            .attr("title")
            .map(String::from)
            .or_else(|| first_attr(a, &CREST, "title"))
            .or_else(|| element_text(a)),
    });

    let mut asm = Assembly::new();
    let hit = PlayerHit {
        id,
        name: asm.require("name", text_field(name.as_deref())),
        position: asm.take("position", Normalized::from_raw(cell(0).as_deref(), parse_position)),
        club,
        age: asm.take("age", count_field(cell(2).filter(|a| a != "-").as_deref())),
        nationalities: all_attrs(row, &FLAG, "title"),
        market_value_eur: asm.take("market_value_eur", market_value(first_text(row, &VALUE_CELL).as_deref())),
    };
    Some((hit, asm))
}

pub fn club_row(row: ElementRef<'_>) -> Option<(ClubHit, Assembly)> {
    let (id, name) = hit_identity(row, &CLUB_LINK)?;
    let squad = centered_texts(row).into_iter().flatten().next();

    let mut asm = Assembly::new();
    let hit = ClubHit {
        id,
        name: asm.require("name", text_field(name.as_deref())),
        country: first_attr(row, &FLAG, "title"),
        squad_size: asm.take("squad_size", count_field(squad.as_deref())),
        market_value_eur: asm.take("market_value_eur", market_value(first_text(row, &VALUE_CELL).as_deref())),
    };
    Some((hit, asm))
}

pub fn competition_row(row: ElementRef<'_>) -> Option<(CompetitionHit, Assembly)> {
    let (id, name) = hit_identity(row, &COMPETITION_LINK)?;
    let mut counts = centered_texts(row).into_iter().flatten();

    let mut asm = Assembly::new();
    let hit = CompetitionHit {
        id,
        name: asm.require("name", text_field(name.as_deref())),
        country: first_attr(row, &FLAG, "title"),
        clubs: asm.take("clubs", count_field(counts.next().as_deref())),
        players: asm.take("players", count_field(counts.next().as_deref())),
        total_market_value_eur: asm.take(
            "total_market_value_eur",
            market_value(first_text(row, &VALUE_CELL).as_deref()),
        ),
    };
    Some((hit, asm))
}
