// =============================================================================
// extractors/competition.rs - CLUBS IN A COMPETITION
// =============================================================================
//
// Page: /-/startseite/wettbewerb/{id}, or with /plus/?saison_id={season}
// for a past season.
// =============================================================================

use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use crate::assembler::{Assembly, Outcome};
use crate::error::FetchError;
use crate::extractors::club::SELECTED_SEASON;
use crate::extractors::player::{HEADLINE, PAGE_MARKER};
use crate::extractors::{extract, is_valid_id, reject_id};
use crate::fetch::FetchClient;
use crate::html::{element_text, has_marker, selector, Page};
use crate::models::{ClubRef, CompetitionClubs};
use crate::normalizers::{id_from_href, parse_season_id, text_field};
use crate::transport::Transport;

static CLUB_ROW: LazyLock<Selector> = LazyLock::new(|| selector("table.items > tbody > tr"));
static NAME_CELL: LazyLock<Selector> = LazyLock::new(|| selector("td.hauptlink"));
static CLUB_LINK: LazyLock<Selector> = LazyLock::new(|| selector("td.hauptlink a[href*=\"/verein/\"]"));

pub fn competition_path(id: &str, season: Option<u16>) -> String {
    match season {
        Some(season) => format!("/-/startseite/wettbewerb/{}/plus/?saison_id={}", id, season),
        None => format!("/-/startseite/wettbewerb/{}", id),
    }
}

pub async fn fetch_and_parse<T: Transport>(
    client: &FetchClient<T>,
    id: &str,
    season: Option<u16>,
) -> Result<Outcome<CompetitionClubs>, FetchError> {
    if !is_valid_id(id) {
        return Ok(reject_id(client, "competition", id));
    }
    extract(client, "competition", id, competition_path(id, season), |doc| {
        parse_clubs(id, season, doc.url.as_str(), &doc.body)
    })
    .await
}

fn club_row(row: ElementRef<'_>) -> Option<(ClubRef, Assembly)> {
    let link = row.select(&CLUB_LINK).next()?;
    let id = link.value().attr("href").and_then(id_from_href)?;
    let name = link
        .value()
        .attr("title")
        .map(String::from)
        .or_else(|| element_text(link));

    let mut asm = Assembly::new();
    let club = ClubRef {
        id: Some(id),
        name: asm.require("name", text_field(name.as_deref())),
    };
    Some((club, asm))
}

pub fn parse_clubs(id: &str, season: Option<u16>, url: &str, body: &[u8]) -> Outcome<CompetitionClubs> {
    if !has_marker(body, PAGE_MARKER) {
        return Outcome::NotFound;
    }
    let page = Page::parse(&String::from_utf8_lossy(body));
    if !page.exists(&HEADLINE) {
        return Outcome::NotFound;
    }

    let mut asm = Assembly::new();
    let name = asm.require("name", text_field(page.text(&HEADLINE).as_deref()));

    let rows: Vec<Option<(ClubRef, Assembly)>> = page
        .select(&CLUB_ROW)
        // spacer and totals rows have no name cell
        .filter(|tr| tr.select(&NAME_CELL).next().is_some())
        .map(club_row)
        .collect();
    let clubs = asm.rows(rows);

    let page_season = page
        .attr(&SELECTED_SEASON, "value")
        .as_deref()
        .and_then(parse_season_id);

    asm.finish(CompetitionClubs {
        id: id.to_string(),
        url: url.to_string(),
        name,
        season: season.or(page_season),
        clubs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn club(id: &str, name: &str) -> String {
        format!(
            r#"<tr class="odd">
  <td class="zentriert no-border-rechts"><a href="/c/startseite/verein/{id}"><img title="{name}"></a></td>
  <td class="hauptlink no-border-links"><a title="{name}" href="/c/startseite/verein/{id}/saison_id/2024">{name}</a></td>
  <td class="zentriert">25</td>
</tr>"#
        )
    }

    fn page(rows: &[String]) -> String {
        format!(
            r#"<html><body>
<h1 class="data-header__headline-wrapper">Premier League</h1>
<select name="saison_id"><option value="2024" selected>24/25</option></select>
<table class="items"><tbody>{}</tbody></table>
</body></html>"#,
            rows.join("\n")
        )
    }

    #[test]
    fn test_competition_clubs() {
        let html = page(&[club("281", "Manchester City"), club("11", "Arsenal FC"), club("31", "Liverpool FC")]);
        let outcome = parse_clubs("GB1", None, "u", html.as_bytes());
        assert!(outcome.is_complete(), "missing: {:?}", outcome.missing());

        let comp = outcome.into_record().unwrap();
        assert_eq!(comp.name.as_deref(), Some("Premier League"));
        assert_eq!(comp.season, Some(2024));
        assert_eq!(comp.clubs.len(), 3);
        assert_eq!(comp.clubs[1].id.as_deref(), Some("11"));
        assert_eq!(comp.clubs[1].name.as_deref(), Some("Arsenal FC"));
    }

    #[test]
    fn test_row_without_club_link_is_reported() {
        let html = page(&[
            club("281", "Manchester City"),
            r#"<tr><td class="hauptlink">relegated</td></tr>"#.to_string(),
        ]);
        let outcome = parse_clubs("GB1", Some(2023), "u", html.as_bytes());
        assert_eq!(outcome.missing(), &["rows[1]".to_string()]);
        let comp = outcome.record().unwrap();
        assert_eq!(comp.clubs.len(), 1);
        assert_eq!(comp.season, Some(2023));
    }

    #[test]
    fn test_rows_without_a_name_cell_are_skipped() {
        let html = page(&[
            club("281", "Manchester City"),
            r#"<tr class="bg_grau"><td colspan="3">Total: 20 clubs</td></tr>"#.to_string(),
            club("11", "Arsenal FC"),
        ]);
        let outcome = parse_clubs("GB1", None, "u", html.as_bytes());
        assert!(outcome.is_complete(), "missing: {:?}", outcome.missing());
        assert_eq!(outcome.record().unwrap().clubs.len(), 2);
    }

    #[test]
    fn test_paths() {
        assert_eq!(competition_path("GB1", None), "/-/startseite/wettbewerb/GB1");
        assert_eq!(
            competition_path("GB1", Some(2023)),
            "/-/startseite/wettbewerb/GB1/plus/?saison_id=2023"
        );
    }
}
