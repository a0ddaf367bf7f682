use crate::mapping::{FieldMapping, FieldRule, TagKind};
use crate::models::{DetailRef, FieldValue, ResultsHeading};
use crate::scraper::ScrapeError;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::{debug, warn};
use url::Url;

fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::Selector(format!("{}: {:?}", css, e)))
}

/// All elements of the document in document order, root included.
fn elements(doc: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    doc.root_element().descendants().filter_map(ElementRef::wrap)
}

// ── Search page ───────────────────────────────────────────────────────────────

pub fn has_search_form(html: &str, form_name: &str) -> Result<bool, ScrapeError> {
    let doc = Html::parse_document(html);
    let form_sel = selector("form")?;
    Ok(doc
        .select(&form_sel)
        .any(|f| f.value().attr("name") == Some(form_name)))
}

/// Read page size and total count from the `<b>` elements that follow
/// `span.results_heading`: "Results <b>1</b> - <b>30</b> of <b>1,234</b>".
pub fn parse_results_heading(html: &str) -> Option<ResultsHeading> {
    let doc = Html::parse_document(html);

    let mut seen_heading = false;
    let mut numbers = Vec::with_capacity(3);
    for el in elements(&doc) {
        if !seen_heading {
            seen_heading = el.value().name() == "span"
                && el.value().classes().any(|c| c == "results_heading");
            continue;
        }
        if el.value().name() == "b" {
            numbers.push(el.text().collect::<String>());
            if numbers.len() == 3 {
                break;
            }
        }
    }

    if numbers.len() < 3 {
        return None;
    }
    Some(ResultsHeading {
        page_size: parse_count(&numbers[1])?,
        total_count: parse_count(&numbers[2])?,
    })
}

/// "1,234" → 1234
pub fn parse_count(s: &str) -> Option<u64> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse().ok()
}

// ── Detail links ──────────────────────────────────────────────────────────────

/// Every `title="View"` element's href, made absolute against `base`.
pub fn extract_view_links(html: &str, base: &Url) -> Result<Vec<DetailRef>, ScrapeError> {
    let doc = Html::parse_document(html);
    let view_sel = selector(r#"[title="View"]"#)?;

    let mut refs = Vec::new();
    for el in doc.select(&view_sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        match resolve_detail_href(base, href) {
            Some(url) => refs.push(DetailRef::new(url)),
            None => warn!("Unusable view link: {}", href),
        }
    }
    debug!("{} view links on page", refs.len());
    Ok(refs)
}

/// View links are often script calls like `javascript:open('/path?id=1')`;
/// the first single-quoted segment is then the real target.
pub fn resolve_detail_href(base: &Url, href: &str) -> Option<String> {
    let target = if href.contains('\'') {
        href.split('\'').nth(1)?
    } else {
        href
    };
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    base.join(target).ok().map(String::from)
}

// ── Detail page fields ────────────────────────────────────────────────────────

/// One value per mapping entry, in mapping order.
pub fn extract_fields(html: &str, mapping: &FieldMapping) -> Result<Vec<FieldValue>, ScrapeError> {
    let doc = Html::parse_document(html);
    let option_sel = selector("option[selected]")?;

    let mut by_id: HashMap<&str, ElementRef<'_>> = HashMap::new();
    for el in elements(&doc) {
        if let Some(id) = el.value().id() {
            by_id.entry(id).or_insert(el);
        }
    }

    Ok(mapping
        .entries()
        .iter()
        .map(|(_, rule)| {
            let el = rule
                .source_tag_id
                .as_deref()
                .and_then(|id| by_id.get(id).copied());
            field_value(el, rule, &option_sel)
        })
        .collect())
}

fn field_value(el: Option<ElementRef<'_>>, rule: &FieldRule, option_sel: &Selector) -> FieldValue {
    let Some(el) = el else {
        return FieldValue::Null;
    };
    match rule.kind {
        TagKind::Input => el
            .value()
            .attr("value")
            .map(|v| FieldValue::Text(v.to_string()))
            .unwrap_or(FieldValue::Null),
        TagKind::Checkbox => FieldValue::Flag(el.value().attr("checked").is_some()),
        TagKind::Text => FieldValue::Text(el.text().collect::<String>().trim().to_string()),
        TagKind::Select => el
            .select(option_sel)
            .next()
            .map(|o| FieldValue::Text(o.text().collect::<String>().trim().to_string()))
            .unwrap_or(FieldValue::Null),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
