use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::cleaner::normalize_ws;

// ── Locator ───────────────────────────────────────────────────────────────────

/// How a site's table (or container) is found in a page.
#[derive(Debug, Clone)]
pub enum TableLocator {
    Id(&'static str),
    /// e.g. `^box-(\w+)-game-basic$`, one table per team
    IdPattern(Regex),
    /// Class-list membership, not a substring match
    Class(&'static str),
    /// Structural fallback, any CSS selector
    Selector(&'static str),
}

/// Find every element matching `locator`. Absence is normal (postponed game,
/// bye week) so this never fails; a bad selector just matches nothing.
pub fn locate<'a>(doc: &'a Html, locator: &TableLocator) -> Vec<ElementRef<'a>> {
    match locator {
        TableLocator::Id(id) => with_attr(doc, "[id]")
            .filter(|el| el.value().id() == Some(*id))
            .collect(),
        TableLocator::IdPattern(re) => with_attr(doc, "[id]")
            .filter(|el| el.value().id().is_some_and(|id| re.is_match(id)))
            .collect(),
        TableLocator::Class(class) => with_attr(doc, "[class]")
            .filter(|el| el.value().classes().any(|c| c == *class))
            .collect(),
        TableLocator::Selector(css) => match Selector::parse(css) {
            Ok(sel) => doc.select(&sel).collect(),
            Err(e) => {
                debug!("Ignoring bad selector {:?}: {:?}", css, e);
                Vec::new()
            }
        },
    }
}

fn with_attr<'a>(doc: &'a Html, css: &'static str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    // Static attribute selectors always parse
    let sel = Selector::parse(css).ok();
    sel.into_iter()
        .flat_map(move |sel| doc.select(&sel).collect::<Vec<_>>())
}

/// Parse a selector that is a compile-time literal in the calling adapter.
pub fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css)
        .map_err(|e| debug!("Bad selector {:?}: {:?}", css, e))
        .ok()
}

/// Trimmed, whitespace-collapsed text of an element.
pub fn element_text(el: &ElementRef<'_>) -> String {
    normalize_ws(&el.text().collect::<String>())
}

// ── Raw table ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderRow {
    /// Last `thead` row, or the first row when the table has no `thead`
    Auto,
    /// Headerless table, columns mapped by position; rows made only of
    /// `th` cells are dropped
    None,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub text: String,
    pub href: Option<String>,
}

/// A table flattened to strings, headers disambiguated pandas-style
/// (`Yds`, `Yds.1`, `Yds.2`).
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub id: Option<String>,
    pub caption: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn from_element(table: ElementRef<'_>, mode: HeaderRow) -> RawTable {
        let (
            Some(thead_sel),
            Some(body_sel),
            Some(tr_sel),
            Some(cell_sel),
            Some(td_sel),
            Some(a_sel),
            Some(cap_sel),
        ) = (
            selector("thead tr"),
            selector("tbody tr, tfoot tr"),
            selector("tr"),
            selector("th, td"),
            selector("td"),
            selector("a[href]"),
            selector("caption"),
        )
        else {
            return RawTable::default();
        };

        let read_row = |tr: ElementRef<'_>| -> Vec<Cell> {
            tr.select(&cell_sel)
                .map(|cell| Cell {
                    text: element_text(&cell),
                    href: cell
                        .select(&a_sel)
                        .next()
                        .and_then(|a| a.value().attr("href"))
                        .map(str::to_string),
                })
                .collect()
        };

        let head_rows: Vec<ElementRef<'_>> = table.select(&thead_sel).collect();
        let (headers, rows): (Vec<String>, Vec<Vec<Cell>>) = match mode {
            HeaderRow::Auto if !head_rows.is_empty() => {
                let header = head_rows.last().map(|tr| read_row(*tr)).unwrap_or_default();
                let rows = table.select(&body_sel).map(read_row).collect();
                (header.into_iter().map(|c| c.text).collect(), rows)
            }
            HeaderRow::Auto => {
                let mut all = table.select(&tr_sel).map(read_row);
                let header = all.next().unwrap_or_default();
                (header.into_iter().map(|c| c.text).collect(), all.collect())
            }
            HeaderRow::None => {
                let rows = table
                    .select(&body_sel)
                    .filter(|tr| tr.select(&td_sel).next().is_some())
                    .map(read_row)
                    .collect();
                (Vec::new(), rows)
            }
        };

        RawTable {
            id: table.value().id().map(str::to_string),
            caption: table.select(&cap_sel).next().map(|c| element_text(&c)),
            headers: dedupe_headers(headers),
            rows,
        }
    }

    /// Column index for a (disambiguated) header label.
    pub fn column(&self, label: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == label)
    }
}

/// `Yds`, `Yds` → `Yds`, `Yds.1`; suffixes already used by a real header are skipped.
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = headers.iter().cloned().collect();
    let mut kept: HashSet<String> = HashSet::new();
    let mut next: HashMap<String, usize> = HashMap::new();
    headers
        .into_iter()
        .map(|h| {
            if h.is_empty() || kept.insert(h.clone()) {
                return h;
            }
            let n = next.entry(h.clone()).or_insert(1);
            let mut label = format!("{}.{}", h, n);
            while taken.contains(&label) {
                *n += 1;
                label = format!("{}.{}", h, n);
            }
            *n += 1;
            taken.insert(label.clone());
            label
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
      <div class="scorebox"><div>A</div></div>
      <table id="box-LAL-game-basic" class="sortable stats_table">
        <caption>Los Angeles Lakers Basic Box Score</caption>
        <thead>
          <tr class="over_header"><th colspan="3">Basic</th></tr>
          <tr><th>Player</th><th>Yds</th><th>Yds</th><th>TD</th></tr>
        </thead>
        <tbody>
          <tr><th><a href="/players/j/jamesle01.html">LeBron James</a></th><td>1,204</td><td>5</td><td>-</td></tr>
        </tbody>
        <tfoot><tr><th>Team Totals</th><td>10</td><td>2</td><td>3</td></tr></tfoot>
      </table>
      <table class="table_list"><tr><td>x</td><td>y</td></tr><tr><td>1</td><td>2</td></tr></table>
    </body></html>"#;

    #[test]
    fn test_locate_by_id_pattern_and_class() {
        let doc = Html::parse_document(PAGE);
        let re = Regex::new(r"^box-(\w+)-game-basic$").unwrap();
        assert_eq!(locate(&doc, &TableLocator::IdPattern(re)).len(), 1);
        assert_eq!(locate(&doc, &TableLocator::Class("stats_table")).len(), 1);
        // membership, not substring
        assert_eq!(locate(&doc, &TableLocator::Class("stats")).len(), 0);
        assert_eq!(locate(&doc, &TableLocator::Selector("div.scorebox")).len(), 1);
    }

    #[test]
    fn test_missing_or_bad_locator_is_empty() {
        let doc = Html::parse_document(PAGE);
        assert!(locate(&doc, &TableLocator::Id("schedule")).is_empty());
        assert!(locate(&doc, &TableLocator::Selector("table[[")).is_empty());
    }

    #[test]
    fn test_raw_table_uses_last_thead_row() {
        let doc = Html::parse_document(PAGE);
        let el = locate(&doc, &TableLocator::Id("box-LAL-game-basic"))[0];
        let t = RawTable::from_element(el, HeaderRow::Auto);

        assert_eq!(t.headers, vec!["Player", "Yds", "Yds.1", "TD"]);
        assert_eq!(t.caption.as_deref(), Some("Los Angeles Lakers Basic Box Score"));
        assert_eq!(t.rows.len(), 2); // tbody + tfoot
        assert_eq!(t.rows[0][0].text, "LeBron James");
        assert_eq!(t.rows[0][0].href.as_deref(), Some("/players/j/jamesle01.html"));
        assert_eq!(t.rows[0][1].text, "1,204");
        assert_eq!(t.column("Yds.1"), Some(2));
    }

    #[test]
    fn test_raw_table_without_thead() {
        let doc = Html::parse_document(PAGE);
        let el = locate(&doc, &TableLocator::Class("table_list"))[0];

        let auto = RawTable::from_element(el, HeaderRow::Auto);
        assert_eq!(auto.headers, vec!["x", "y"]);
        assert_eq!(auto.rows.len(), 1);

        let none = RawTable::from_element(el, HeaderRow::None);
        assert!(none.headers.is_empty());
        assert_eq!(none.rows.len(), 2);
    }

    #[test]
    fn test_generated_labels_skip_existing_headers() {
        let h = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(dedupe_headers(h(&["Yds", "Yds.1", "Yds"])), h(&["Yds", "Yds.1", "Yds.2"]));
        assert_eq!(dedupe_headers(h(&["Yds", "Yds", "Yds.1"])), h(&["Yds", "Yds.2", "Yds.1"]));
        assert_eq!(dedupe_headers(h(&["", "", "TD", "TD", "TD"])), h(&["", "", "TD", "TD.1", "TD.2"]));
    }
}
