use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Selector};

static PAREN_ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d{4}-\d{2}-\d{2})\)").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static IMG_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());

/// Whitespace-collapsed text of an element and its descendants.
pub fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Direct `td`/`th` children of a row. Nested tables inside a cell are not
/// flattened into the row.
pub fn row_cells<'a>(row: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .collect()
}

/// Rows belonging to this table only, header included, in document order.
pub fn table_rows<'a>(table: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|r| r.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

/// `title` of the first image in the cell, e.g. flag or club crest.
pub fn img_title(cell: ElementRef<'_>) -> Option<String> {
    cell.select(&IMG_SEL)
        .next()
        .and_then(|img| img.value().attr("title"))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// `href` of the first link in the element.
pub fn first_href(el: ElementRef<'_>) -> Option<String> {
    el.select(&LINK_SEL)
        .find_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

/// Player name from a cell: nested link text, then the first nested element
/// with text, then the raw cell text. Empty when all three are empty.
pub fn name_from_cell(cell: ElementRef<'_>) -> String {
    if let Some(name) = cell
        .select(&LINK_SEL)
        .map(text_of)
        .find(|t| !t.is_empty())
    {
        return name;
    }

    if let Some(name) = cell
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .map(text_of)
        .find(|t| !t.is_empty())
    {
        return name;
    }

    text_of(cell)
}

/// First parenthesized `YYYY-MM-DD` that is a real calendar date.
pub fn clean_date_of_birth(raw: &str) -> Option<String> {
    PAREN_ISO_DATE_RE
        .captures_iter(raw)
        .next()
        .and_then(|caps| NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Accepts an already-ISO date such as the API's `birth.date`.
pub fn iso_date(raw: &str) -> Option<String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn first_cell(html: &str) -> String {
        let doc = Html::parse_fragment(&format!("<table><tr>{html}</tr></table>"));
        let sel = Selector::parse("td").unwrap();
        name_from_cell(doc.select(&sel).next().unwrap())
    }

    #[test]
    fn dob_from_wiki_sort_key() {
        assert_eq!(
            clean_date_of_birth("(2008-06-06)6 June 2008 (aged 14)").as_deref(),
            Some("2008-06-06")
        );
    }

    #[test]
    fn dob_absent_without_paren_iso() {
        assert_eq!(clean_date_of_birth("6 June 2008 (aged 14)"), None);
        assert_eq!(clean_date_of_birth("2008-06-06"), None);
        assert_eq!(clean_date_of_birth("(2008-02-31)"), None);
    }

    #[test]
    fn name_prefers_link_text() {
        assert_eq!(
            first_cell(r#"<td><span>x</span><a href="/p">Mohamed Salah</a></td>"#),
            "Mohamed Salah"
        );
    }

    #[test]
    fn name_falls_back_to_nested_element_then_raw_text() {
        assert_eq!(first_cell("<td><span></span><b> Sadio  Mané </b></td>"), "Sadio Mané");
        assert_eq!(first_cell("<td>  Riyad Mahrez </td>"), "Riyad Mahrez");
        assert_eq!(first_cell("<td><a href='/x'> </a><span></span></td>"), "");
    }

    #[test]
    fn iso_date_rejects_free_text() {
        assert_eq!(iso_date("1992-06-15").as_deref(), Some("1992-06-15"));
        assert_eq!(iso_date("June 1992"), None);
    }
}
