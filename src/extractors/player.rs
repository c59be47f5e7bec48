// =============================================================================
// extractors/player.rs - PLAYER PROFILE
// =============================================================================
//
// Page: /-/profil/spieler/{id}
//
// Identity anchor is the header headline. Everything else comes from the
// header (shirt number, market value, club) and the "player data" info table,
// whose labels follow the site locale.
// =============================================================================

use std::sync::LazyLock;

use scraper::Selector;

use crate::assembler::{Assembly, Outcome};
use crate::error::FetchError;
use crate::extractors::{extract, known, reject_id, is_valid_id};
use crate::fetch::FetchClient;
use crate::html::{all_attrs, element_text, first_attr, first_text, has_marker, selector, text_without, Page};
use crate::models::{ClubRef, PlayerProfile};
use crate::normalizers::{
    birth_fields, count_field, id_from_href, market_value, parse_date, parse_foot, parse_height_cm,
    parse_position, text_field, Normalized,
};
use crate::transport::Transport;

pub(crate) const PAGE_MARKER: &str = "data-header__headline-wrapper";

pub(crate) static HEADLINE: LazyLock<Selector> = LazyLock::new(|| selector("h1.data-header__headline-wrapper"));
static SHIRT_NUMBER: LazyLock<Selector> = LazyLock::new(|| selector("span.data-header__shirt-number"));
pub(crate) static MARKET_VALUE: LazyLock<Selector> =
    LazyLock::new(|| selector("a.data-header__market-value-wrapper"));
pub(crate) static HEADER_CLUB_LINK: LazyLock<Selector> = LazyLock::new(|| selector("span.data-header__club a"));
pub(crate) static FLAG: LazyLock<Selector> = LazyLock::new(|| selector("img.flaggenrahmen"));
pub(crate) static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a"));

pub fn profile_path(id: &str) -> String {
    format!("/-/profil/spieler/{}", id)
}

pub async fn fetch_and_parse<T: Transport>(
    client: &FetchClient<T>,
    id: &str,
) -> Result<Outcome<PlayerProfile>, FetchError> {
    if !is_valid_id(id) {
        return Ok(reject_id(client, "player", id));
    }
    extract(client, "player", id, profile_path(id), |doc| {
        parse_profile(id, doc.url.as_str(), &doc.body)
    })
    .await
}

/// Headline text without the shirt number in front of it.
pub(crate) fn headline_name(page: &Page) -> (Option<String>, Option<String>) {
    let Some(headline) = page.first(&HEADLINE) else {
        return (None, None);
    };
    let shirt = first_text(headline, &SHIRT_NUMBER);
    let full = element_text(headline);
    let name = match (&full, &shirt) {
        (Some(full), Some(shirt)) => full.strip_prefix(shirt.as_str()).map(str::trim).map(String::from),
        _ => full.clone(),
    };
    (name.filter(|n| !n.is_empty()), shirt)
}

pub fn parse_profile(id: &str, url: &str, body: &[u8]) -> Outcome<PlayerProfile> {
    if !has_marker(body, PAGE_MARKER) {
        return Outcome::NotFound;
    }
    let page = Page::parse(&String::from_utf8_lossy(body));
    if !page.exists(&HEADLINE) {
        return Outcome::NotFound;
    }

    let (name, shirt) = headline_name(&page);
    let info = page.info_table();
    let mut asm = Assembly::new();

    let (date_of_birth, age) = birth_fields(
        info.text(&["date of birth", "geb./alter", "geburtsdatum", "fecha de nacimiento"])
            .as_deref(),
    );

    let citizenship = info
        .get(&["citizenship", "nationalität", "staatsbürgerschaft", "nacionalidad"])
        .map(|el| {
            let flags = all_attrs(el, &FLAG, "title");
            if flags.is_empty() {
                element_text(el).into_iter().collect()
            } else {
                flags
            }
        })
        .unwrap_or_default();

    let current_club = info
        .get(&["current club", "aktueller verein", "club actual"])
        .and_then(|el| {
            let name = first_attr(el, &LINK, "title").or_else(|| element_text(el));
            let id = first_attr(el, &LINK, "href").as_deref().and_then(id_from_href);
            name.map(|name| ClubRef { id, name: Some(name) })
        })
        .or_else(|| {
            let link = page.first(&HEADER_CLUB_LINK)?;
            Some(ClubRef {
                id: link.value().attr("href").and_then(id_from_href),
                name: link.value().attr("title").map(String::from).or_else(|| element_text(link)),
            })
        });

    let value = page.first(&MARKET_VALUE).and_then(|el| text_without(el, "p"));

    let record = PlayerProfile {
        id: id.to_string(),
        url: url.to_string(),
        name: asm.require("name", text_field(name.as_deref())),
        full_name: asm.take(
            "full_name",
            text_field(info.text(&["name in home country", "full name", "vollständiger name", "name im heimatland"]).as_deref()),
        ),
        shirt_number: asm.take("shirt_number", count_field(shirt.as_deref())),
        date_of_birth: asm.require("date_of_birth", date_of_birth),
        age: asm.take("age", age),
        place_of_birth: asm.take(
            "place_of_birth",
            text_field(info.text(&["place of birth", "geburtsort", "lugar de nacimiento"]).as_deref()),
        ),
        height_cm: asm.take(
            "height_cm",
            Normalized::from_raw(known(info.text(&["height", "größe", "altura"])).as_deref(), parse_height_cm),
        ),
        citizenship,
        position: asm.take(
            "position",
            Normalized::from_raw(info.text(&["position", "posición"]).as_deref(), parse_position),
        ),
        foot: asm.take(
            "foot",
            Normalized::from_raw(known(info.text(&["foot", "fuß", "pie"])).as_deref(), parse_foot),
        ),
        current_club,
        joined: asm.take(
            "joined",
            Normalized::from_raw(known(info.text(&["joined", "im team seit", "fichado"])).as_deref(), parse_date),
        ),
        contract_expires: asm.take(
            "contract_expires",
            Normalized::from_raw(
                known(info.text(&["contract expires", "vertrag bis", "contrato hasta"])).as_deref(),
                parse_date,
            ),
        ),
        market_value_eur: asm.take("market_value_eur", market_value(value.as_deref())),
    };

    asm.finish(record)
}
