// =============================================================================
// normalizers/text.rs - SMALL TEXT FIELDS
// =============================================================================

use std::sync::LazyLock;

use regex::Regex;

use crate::models::Foot;

static COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:[.,]\d{3})+|\d+").expect("count pattern compiles"));

static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("decimal pattern compiles"));

static HEIGHT_METRES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)[,.](\d{2})\s*m\b").expect("height pattern compiles"));

static HEIGHT_CM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{3})\s*cm\b").expect("height cm pattern compiles"));

static PROFILE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:spieler|verein|wettbewerb)/([A-Za-z0-9]+)").expect("profile id pattern compiles")
});

static SEASON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}|\d{2})(?:\s*/\s*(?:\d{4}|\d{2}))?$").expect("season pattern compiles"));

/// Trim, fold `&nbsp;` into spaces and collapse runs of whitespace. `None`
/// when nothing is left.
pub fn clean(raw: &str) -> Option<String> {
    let collapsed = raw
        .replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// First whole number in the text, thousands separators allowed.
pub fn parse_count(raw: &str) -> Option<u32> {
    let found = COUNT.find(raw)?;
    let digits: String = found.as_str().chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// First decimal number, comma or point.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let found = DECIMAL.find(raw)?;
    found.as_str().replace(',', ".").parse().ok()
}

/// "1,85 m" / "1.85m" / "185 cm" to centimetres.
pub fn parse_height_cm(raw: &str) -> Option<u16> {
    if let Some(c) = HEIGHT_METRES.captures(raw) {
        let metres: u16 = c[1].parse().ok()?;
        let cm: u16 = c[2].parse().ok()?;
        return Some(metres * 100 + cm);
    }
    HEIGHT_CM.captures(raw).and_then(|c| c[1].parse().ok())
}

/// Numeric or alphanumeric id from a profile link such as
/// `/erling-haaland/profil/spieler/418560`.
pub fn id_from_href(href: &str) -> Option<String> {
    PROFILE_ID.captures(href).map(|c| c[1].to_string())
}

/// Season id (the starting year) from "2023", "23/24" or "2023/2024".
pub fn parse_season_id(raw: &str) -> Option<u16> {
    let c = SEASON.captures(raw.trim())?;
    let year = &c[1];
    let n: u16 = year.parse().ok()?;
    if year.len() == 4 {
        Some(n)
    } else if n < 70 {
        Some(2000 + n)
    } else {
        Some(1900 + n)
    }
}

pub fn parse_foot(raw: &str) -> Option<Foot> {
    match raw.trim().to_lowercase().as_str() {
        "right" | "rechts" | "derecho" | "droit" | "destro" | "direito" => Some(Foot::Right),
        "left" | "links" | "izquierdo" | "gauche" | "sinistro" | "esquerdo" => Some(Foot::Left),
        "both" | "beidfüßig" | "ambidiestro" | "ambidextre" => Some(Foot::Both),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_collapses_whitespace_and_nbsp() {
        assert_eq!(clean("  Erling\u{a0}\u{a0}Haaland \n"), Some("Erling Haaland".into()));
        assert_eq!(clean(" \t\n"), None);
    }

    #[test]
    fn test_counts() {
        assert_eq!(parse_count("#9"), Some(9));
        assert_eq!(parse_count("Squad size: 27"), Some(27));
        assert_eq!(parse_count("Seats: 81.365"), Some(81_365));
        assert_eq!(parse_count("53,394 seats"), Some(53_394));
        assert_eq!(parse_count("none"), None);
    }

    #[test]
    fn test_decimal() {
        assert_eq!(parse_decimal("26,4"), Some(26.4));
        assert_eq!(parse_decimal("Ø-Age: 27.1"), Some(27.1));
    }

    #[test]
    fn test_height() {
        assert_eq!(parse_height_cm("1,95 m"), Some(195));
        assert_eq!(parse_height_cm("1.85m"), Some(185));
        assert_eq!(parse_height_cm("178 cm"), Some(178));
        assert_eq!(parse_height_cm("tall"), None);
    }

    #[test]
    fn test_ids_from_links() {
        assert_eq!(id_from_href("/erling-haaland/profil/spieler/418560"), Some("418560".into()));
        assert_eq!(
            id_from_href("/manchester-city/startseite/verein/281/saison_id/2023"),
            Some("281".into())
        );
        assert_eq!(id_from_href("/premier-league/startseite/wettbewerb/GB1"), Some("GB1".into()));
        assert_eq!(id_from_href("/news"), None);
    }

    #[test]
    fn test_seasons() {
        assert_eq!(parse_season_id("2023"), Some(2023));
        assert_eq!(parse_season_id("23/24"), Some(2023));
        assert_eq!(parse_season_id("99/00"), Some(1999));
        assert_eq!(parse_season_id("2019/2020"), Some(2019));
        assert_eq!(parse_season_id("last year"), None);
    }

    #[test]
    fn test_foot() {
        assert_eq!(parse_foot("right"), Some(Foot::Right));
        assert_eq!(parse_foot(" Links "), Some(Foot::Left));
        assert_eq!(parse_foot("both"), Some(Foot::Both));
        assert_eq!(parse_foot("-"), None);
    }
}
