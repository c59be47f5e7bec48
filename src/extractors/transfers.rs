// =============================================================================
// extractors/transfers.rs - PLAYER TRANSFER HISTORY
// =============================================================================
//
// Page: /-/transfers/spieler/{id}
//
// The history is a grid of rows, one per move, newest first. The heading row
// and the total-fees footer are not transfers and never reach the parser, nor
// does any row without a season, date or club cell (upcoming-transfer
// teasers). A transfer row whose cells are there but name no date or season,
// or no club, has lost its identity and is reported as a missing row.
// =============================================================================

use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use crate::assembler::{Assembly, Outcome};
use crate::error::FetchError;
use crate::extractors::player::{HEADLINE, PAGE_MARKER};
use crate::extractors::{extract, is_valid_id, known, reject_id};
use crate::fetch::FetchClient;
use crate::html::{first_attr, first_text, has_marker, selector, Page};
use crate::models::{ClubRef, PlayerTransfers, Transfer};
use crate::normalizers::{id_from_href, market_value, parse_date, text_field, transfer_fee, Normalized};
use crate::transport::Transport;

static ROW: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        "div.tm-player-transfer-history-grid\
         :not(.tm-player-transfer-history-grid--heading)\
         :not(.tm-player-transfer-history-grid--sum)",
    )
});
static SEASON: LazyLock<Selector> = LazyLock::new(|| selector(".tm-player-transfer-history-grid__season"));
static DATE: LazyLock<Selector> = LazyLock::new(|| selector(".tm-player-transfer-history-grid__date"));
static OLD_CLUB: LazyLock<Selector> = LazyLock::new(|| selector(".tm-player-transfer-history-grid__old-club"));
static NEW_CLUB: LazyLock<Selector> = LazyLock::new(|| selector(".tm-player-transfer-history-grid__new-club"));
static CLUB_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector("a.tm-player-transfer-history-grid__club-link"));
static VALUE: LazyLock<Selector> = LazyLock::new(|| selector(".tm-player-transfer-history-grid__market-value"));
static FEE: LazyLock<Selector> = LazyLock::new(|| selector(".tm-player-transfer-history-grid__fee"));

pub fn transfers_path(id: &str) -> String {
    format!("/-/transfers/spieler/{}", id)
}

pub async fn fetch_and_parse<T: Transport>(
    client: &FetchClient<T>,
    id: &str,
) -> Result<Outcome<PlayerTransfers>, FetchError> {
    if !is_valid_id(id) {
        return Ok(reject_id(client, "player_transfers", id));
    }
    extract(client, "player_transfers", id, transfers_path(id), |doc| {
        parse_transfers(id, doc.url.as_str(), &doc.body)
    })
    .await
}

fn club_in(row: ElementRef<'_>, cell: &Selector) -> ClubRef {
    let Some(cell) = row.select(cell).next() else {
        return ClubRef { id: None, name: None };
    };
    ClubRef {
        id: first_attr(cell, &CLUB_LINK, "href").as_deref().and_then(id_from_href),
        name: first_text(cell, &CLUB_LINK),
    }
}

fn is_transfer_row(row: &ElementRef<'_>) -> bool {
    [&*SEASON, &*DATE, &*OLD_CLUB, &*NEW_CLUB]
        .into_iter()
        .any(|cell| row.select(cell).next().is_some())
}

fn parse_row(row: ElementRef<'_>) -> Option<(Transfer, Assembly)> {
    let season = known(first_text(row, &SEASON));
    let date_raw = known(first_text(row, &DATE));
    let from = club_in(row, &OLD_CLUB);
    let to = club_in(row, &NEW_CLUB);

    if (season.is_none() && date_raw.is_none()) || (from.name.is_none() && to.name.is_none()) {
        return None;
    }

    let mut asm = Assembly::new();
    let transfer = Transfer {
        season: asm.take("season", text_field(season.as_deref())),
        date: asm.take("date", Normalized::from_raw(date_raw.as_deref(), parse_date)),
        from,
        to,
        market_value_eur: asm.take("market_value_eur", market_value(first_text(row, &VALUE).as_deref())),
        fee: asm.take("fee", transfer_fee(first_text(row, &FEE).as_deref())),
    };
    Some((transfer, asm))
}

pub fn parse_transfers(id: &str, url: &str, body: &[u8]) -> Outcome<PlayerTransfers> {
    if !has_marker(body, PAGE_MARKER) {
        return Outcome::NotFound;
    }
    let page = Page::parse(&String::from_utf8_lossy(body));
    if !page.exists(&HEADLINE) {
        return Outcome::NotFound;
    }

    let rows: Vec<Option<(Transfer, Assembly)>> = page
        .select(&ROW)
        .filter(is_transfer_row)
        .map(parse_row)
        .collect();

    let mut asm = Assembly::new();
    let transfers = asm.rows(rows);

    asm.finish(PlayerTransfers {
        player_id: id.to_string(),
        url: url.to_string(),
        transfers,
    })
}
