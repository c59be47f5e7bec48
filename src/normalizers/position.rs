// =============================================================================
// normalizers/position.rs - PLAYING POSITIONS
// =============================================================================
//
// Position cells come in a few shapes depending on page and locale:
//
//   "Attack - Centre-Forward"     profile header, english
//   "Centre-Forward"              squad table
//   "Sturm - Mittelstürmer"       profile header, german
//   "Goalkeeper"
//
// One Aho-Corasick pass over the lowercased label finds every known spelling
// at once. Leftmost-longest matching makes "defensive midfield" win over the
// "midfield" inside it. A detailed position implies its group; a bare group
// label gives a group with no detail.
// =============================================================================

use std::sync::LazyLock;

use aho_corasick::{AhoCorasick, MatchKind};

use crate::models::{Position, PositionGroup};

/// (spelling, group, canonical detail)
static POSITION_LABELS: &[(&str, PositionGroup, Option<&str>)] = &[
    // groups
    ("goalkeeper", PositionGroup::Goalkeeper, None),
    ("torwart", PositionGroup::Goalkeeper, None),
    ("defender", PositionGroup::Defender, None),
    ("defence", PositionGroup::Defender, None),
    ("abwehr", PositionGroup::Defender, None),
    ("midfield", PositionGroup::Midfield, None),
    ("midfielder", PositionGroup::Midfield, None),
    ("mittelfeld", PositionGroup::Midfield, None),
    ("attack", PositionGroup::Attack, None),
    ("forward", PositionGroup::Attack, None),
    ("sturm", PositionGroup::Attack, None),
    // defenders
    ("centre-back", PositionGroup::Defender, Some("Centre-Back")),
    ("center-back", PositionGroup::Defender, Some("Centre-Back")),
    ("innenverteidiger", PositionGroup::Defender, Some("Centre-Back")),
    ("left-back", PositionGroup::Defender, Some("Left-Back")),
    ("linker verteidiger", PositionGroup::Defender, Some("Left-Back")),
    ("right-back", PositionGroup::Defender, Some("Right-Back")),
    ("rechter verteidiger", PositionGroup::Defender, Some("Right-Back")),
    // midfielders
    ("defensive midfield", PositionGroup::Midfield, Some("Defensive Midfield")),
    ("defensives mittelfeld", PositionGroup::Midfield, Some("Defensive Midfield")),
    ("central midfield", PositionGroup::Midfield, Some("Central Midfield")),
    ("zentrales mittelfeld", PositionGroup::Midfield, Some("Central Midfield")),
    ("attacking midfield", PositionGroup::Midfield, Some("Attacking Midfield")),
    ("offensives mittelfeld", PositionGroup::Midfield, Some("Attacking Midfield")),
    ("left midfield", PositionGroup::Midfield, Some("Left Midfield")),
    ("linkes mittelfeld", PositionGroup::Midfield, Some("Left Midfield")),
    ("right midfield", PositionGroup::Midfield, Some("Right Midfield")),
    ("rechtes mittelfeld", PositionGroup::Midfield, Some("Right Midfield")),
    // attackers
    ("left winger", PositionGroup::Attack, Some("Left Winger")),
    ("linksaußen", PositionGroup::Attack, Some("Left Winger")),
    ("right winger", PositionGroup::Attack, Some("Right Winger")),
    ("rechtsaußen", PositionGroup::Attack, Some("Right Winger")),
    ("centre-forward", PositionGroup::Attack, Some("Centre-Forward")),
    ("center-forward", PositionGroup::Attack, Some("Centre-Forward")),
    ("mittelstürmer", PositionGroup::Attack, Some("Centre-Forward")),
    ("second striker", PositionGroup::Attack, Some("Second Striker")),
    ("hängende spitze", PositionGroup::Attack, Some("Second Striker")),
];

static POSITION_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(POSITION_LABELS.iter().map(|(label, _, _)| *label))
        .expect("Failed to build position automaton")
});

/// Read a position label. `None` if no known spelling occurs in it.
pub fn parse_position(raw: &str) -> Option<Position> {
    let lower = raw.to_lowercase();
    let mut group = None;

    for m in POSITION_AUTOMATON.find_iter(&lower) {
        let (_, g, detail) = POSITION_LABELS[m.pattern().as_usize()];
        if let Some(detail) = detail {
            return Some(Position {
                group: g,
                detail: Some(detail.to_string()),
            });
        }
        group.get_or_insert(g);
    }

    group.map(|group| Position { group, detail: None })
}
