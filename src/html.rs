// =============================================================================
// html.rs - READING REGIONS OFF A PAGE
// =============================================================================
//
// Thin helpers over `scraper`. Extractors name the regions they want with CSS
// selectors and get back cleaned text, attribute values or labelled pairs.
// Nothing in here fails: a region that is not on the page is `None` or an
// empty list.
//
// `scraper::Html` is not `Send`. Pages are parsed and fully read inside plain
// synchronous functions, so no document ever lives across an `.await`.
// =============================================================================

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::normalizers::clean;

/// Compile a selector written into the source. Only ever called on literals
/// from `LazyLock` statics.
pub fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("built-in selector is valid CSS")
}

static LAST_PAGE_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector("li.tm-pagination__list-item--icon-last-page > a"));
static ACTIVE_PAGE_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector("li.tm-pagination__list-item--active > a"));
static INFO_TABLE_CELL: LazyLock<Selector> = LazyLock::new(|| selector("span.info-table__content"));
static HEADER_LABEL: LazyLock<Selector> = LazyLock::new(|| selector("li.data-header__label"));
static HEADER_CONTENT: LazyLock<Selector> = LazyLock::new(|| selector("span.data-header__content"));

/// Cheap check for a marker string before paying for a DOM.
pub fn has_marker(body: &[u8], marker: &str) -> bool {
    memchr::memmem::find(body, marker.as_bytes()).is_some()
}

/// A parsed page.
pub struct Page {
    html: Html,
}

impl Page {
    pub fn parse(body: &str) -> Self {
        Self {
            html: Html::parse_document(body),
        }
    }

    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    pub fn exists(&self, sel: &Selector) -> bool {
        self.html.select(sel).next().is_some()
    }

    pub fn first(&self, sel: &Selector) -> Option<ElementRef<'_>> {
        self.html.select(sel).next()
    }

    pub fn select<'a>(&'a self, sel: &'a Selector) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.html.select(sel)
    }

    pub fn text(&self, sel: &Selector) -> Option<String> {
        first_text(self.root(), sel)
    }

    pub fn attr(&self, sel: &Selector, name: &str) -> Option<String> {
        first_attr(self.root(), sel, name)
    }

    /// Label/value pairs from the profile's info table, in page order.
    pub fn info_table(&self) -> Labelled<'_> {
        let mut pairs = Vec::new();
        let mut pending: Option<String> = None;

        for cell in self.html.select(&INFO_TABLE_CELL) {
            let is_label = cell
                .value()
                .classes()
                .any(|c| c == "info-table__content--regular");
            if is_label {
                pending = element_text(cell).map(|l| normalize_label(&l));
            } else if let Some(label) = pending.take() {
                pairs.push((label, cell));
            }
        }
        Labelled { pairs }
    }

    /// Label/value pairs from the header details list
    /// (`<li>Squad size: <span>27</span></li>`).
    pub fn header_details(&self) -> Labelled<'_> {
        let pairs = self
            .html
            .select(&HEADER_LABEL)
            .filter_map(|li| {
                let label = own_text(li).map(|l| normalize_label(&l))?;
                let value = li.select(&HEADER_CONTENT).next()?;
                Some((label, value))
            })
            .collect();
        Labelled { pairs }
    }
}

fn normalize_label(raw: &str) -> String {
    raw.trim().trim_end_matches(':').trim().to_lowercase()
}

/// Values keyed by their (lowercased, colon-free) labels.
pub struct Labelled<'a> {
    pairs: Vec<(String, ElementRef<'a>)>,
}

impl<'a> Labelled<'a> {
    /// The value whose label starts with any of `labels`. Several spellings
    /// are accepted because the labels follow the page locale.
    pub fn get(&self, labels: &[&str]) -> Option<ElementRef<'a>> {
        self.pairs
            .iter()
            .find(|(label, _)| labels.iter().any(|l| label.starts_with(l)))
            .map(|(_, el)| *el)
    }

    pub fn text(&self, labels: &[&str]) -> Option<String> {
        self.get(labels).and_then(element_text)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// All text under an element, cleaned.
pub fn element_text(el: ElementRef<'_>) -> Option<String> {
    clean(&el.text().collect::<String>())
}

/// Text of the element's own text nodes, ignoring child elements.
pub fn own_text(el: ElementRef<'_>) -> Option<String> {
    let joined: String = el
        .children()
        .filter_map(|child| child.value().as_text().map(|t| t.to_string()))
        .collect::<Vec<_>>()
        .join(" ");
    clean(&joined)
}

/// All text under an element except inside child elements named `skip_tag`.
pub fn text_without(el: ElementRef<'_>, skip_tag: &str) -> Option<String> {
    fn walk(el: ElementRef<'_>, skip_tag: &str, out: &mut String) {
        for child in el.children() {
            if let Some(text) = child.value().as_text() {
                out.push_str(text);
            } else if let Some(child_el) = ElementRef::wrap(child) {
                if child_el.value().name() != skip_tag {
                    walk(child_el, skip_tag, out);
                }
            }
        }
    }

    let mut out = String::new();
    walk(el, skip_tag, &mut out);
    clean(&out)
}

pub fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope.select(sel).next().and_then(element_text)
}

pub fn first_attr(scope: ElementRef<'_>, sel: &Selector, name: &str) -> Option<String> {
    scope
        .select(sel)
        .find_map(|el| el.value().attr(name))
        .and_then(clean)
}

pub fn all_attrs(scope: ElementRef<'_>, sel: &Selector, name: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for value in scope.select(sel).filter_map(|el| el.value().attr(name)).filter_map(clean) {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

pub fn all_texts(scope: ElementRef<'_>, sel: &Selector) -> Vec<String> {
    scope.select(sel).filter_map(element_text).collect()
}

/// Page number at the end of a pagination href such as
/// `/schnellsuche/ergebnis/schnellsuche?query=x&Spieler_page=7` or
/// `/premier-league/startseite/wettbewerb/GB1/page/3`.
fn page_from_href(href: &str) -> Option<u32> {
    let after_eq = href.rsplit('=').next()?;
    let last = after_eq.rsplit('/').next()?;
    last.trim().parse().ok()
}

/// Last page of a paginated listing within `scope`: the "last page" link,
/// else the active page link, else 1.
pub fn last_page_number(scope: ElementRef<'_>) -> u32 {
    for sel in [&*LAST_PAGE_LINK, &*ACTIVE_PAGE_LINK] {
        if let Some(n) = first_attr(scope, sel, "href").as_deref().and_then(page_from_href) {
            return n.max(1);
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"
        <html><body>
        <h1 class="data-header__headline-wrapper"><span class="data-header__shirt-number">#9</span> Erling <strong>Haaland</strong></h1>
        <ul>
          <li class="data-header__label">Squad size: <span class="data-header__content">27</span></li>
          <li class="data-header__label">Stadium: <span class="data-header__content"><a>Etihad</a></span></li>
        </ul>
        <a class="data-header__market-value-wrapper"><span class="waehrung">€</span>180.00<span class="waehrung">m</span> <p class="data-header__last-update">Last update: Dec 19, 2024</p></a>
        <div class="info-table">
          <span class="info-table__content info-table__content--regular">Date of birth/Age:</span>
          <span class="info-table__content info-table__content--bold"><a>Jul 21, 2000</a> (24)</span>
          <span class="info-table__content info-table__content--regular">Citizenship:</span>
          <span class="info-table__content info-table__content--bold"><img class="flaggenrahmen" title="Norway"> Norway <img class="flaggenrahmen" title="England"> England</span>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_info_table_pairs() {
        let page = Page::parse(PROFILE);
        let info = page.info_table();
        assert_eq!(info.len(), 2);
        assert_eq!(info.text(&["date of birth"]).as_deref(), Some("Jul 21, 2000 (24)"));

        let flags = selector("img.flaggenrahmen");
        let citizenship = info.get(&["citizenship", "staatsbürgerschaft"]).unwrap();
        assert_eq!(all_attrs(citizenship, &flags, "title"), vec!["Norway", "England"]);
        assert!(info.get(&["height"]).is_none());
    }

    #[test]
    fn test_header_details() {
        let page = Page::parse(PROFILE);
        let details = page.header_details();
        assert_eq!(details.text(&["squad size", "kadergröße"]).as_deref(), Some("27"));
        assert_eq!(details.text(&["stadium"]).as_deref(), Some("Etihad"));
    }

    #[test]
    fn test_text_without_skips_the_footnote() {
        let page = Page::parse(PROFILE);
        let wrapper = page.first(&selector("a.data-header__market-value-wrapper")).unwrap();
        assert_eq!(text_without(wrapper, "p").as_deref(), Some("€180.00m"));
    }

    #[test]
    fn test_own_text_ignores_children() {
        let page = Page::parse(r#"<div id="x">Label: <span>value</span></div>"#);
        let div = page.first(&selector("#x")).unwrap();
        assert_eq!(own_text(div).as_deref(), Some("Label:"));
    }

    #[test]
    fn test_last_page_from_last_link() {
        let page = Page::parse(
            r#"<ul><li class="tm-pagination__list-item tm-pagination__list-item--icon-last-page">
               <a href="/schnellsuche/ergebnis/schnellsuche?query=m&amp;Spieler_page=7">last</a></li></ul>"#,
        );
        assert_eq!(last_page_number(page.root()), 7);
    }

    #[test]
    fn test_last_page_falls_back_to_active_then_one() {
        let page = Page::parse(
            r#"<ul><li class="tm-pagination__list-item tm-pagination__list-item--active">
               <a href="/x/startseite/wettbewerb/GB1/page/3">3</a></li></ul>"#,
        );
        assert_eq!(last_page_number(page.root()), 3);

        let page = Page::parse("<p>no pagination</p>");
        assert_eq!(last_page_number(page.root()), 1);
    }

    #[test]
    fn test_marker_check() {
        assert!(has_marker(PROFILE.as_bytes(), "data-header__headline-wrapper"));
        assert!(!has_marker(b"<html></html>", "data-header"));
    }
}
