//! HTML → `RawListing` extraction for search result and detail pages.
//!
//! Pure functions over page text; no network. Selectors and feature labels
//! come from the `[selectors]` config section.

use flatwatch_config::SelectorSettings;
use flatwatch_core::RawListing;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// `[selectors]` compiled once per fetcher.
#[derive(Debug)]
pub struct PageSelectors {
    listing: Selector,
    link: Selector,
    price: Selector,
    feature: Selector,
    legend: Selector,
    description: Selector,
    area_label: String,
    rooms_label: String,
    floor_label: String,
}

impl PageSelectors {
    pub fn compile(cfg: &SelectorSettings) -> Result<Self, String> {
        let sel = |name: &str, css: &str| {
            Selector::parse(css).map_err(|e| format!("selectors.{name} '{css}': {e}"))
        };
        Ok(Self {
            listing: sel("listing", &cfg.listing)?,
            link: sel("link", &cfg.link)?,
            price: sel("price", &cfg.price)?,
            feature: sel("feature", &cfg.feature)?,
            legend: sel("legend", &cfg.legend)?,
            description: sel("description", &cfg.description)?,
            area_label: cfg.area_label.clone(),
            rooms_label: cfg.rooms_label.clone(),
            floor_label: cfg.floor_label.clone(),
        })
    }
}

/// Text of an element with each text node trimmed and concatenated.
fn squashed_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).collect()
}

fn strip_area_units(value: &str) -> String {
    value.replace("m²", "").replace("m2", "").trim().to_string()
}

/// Every listing card on a results page. Cards without a link are kept
/// with `url = None` so the projector counts them as dropped.
pub fn parse_results_page(html: &str, sel: &PageSelectors, base: &Url) -> Vec<RawListing> {
    let doc = Html::parse_document(html);
    doc.select(&sel.listing).map(|card| parse_card(card, sel, base)).collect()
}

fn parse_card(card: ElementRef<'_>, sel: &PageSelectors, base: &Url) -> RawListing {
    let url = card
        .select(&sel.link)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| match base.join(href.trim()) {
            Ok(u) => Some(u.to_string()),
            Err(e) => {
                log::debug!("skipping bad link '{href}': {e}");
                None
            }
        });

    let price_raw = card.select(&sel.price).next().map(|el| match el.value().attr("data-value") {
        Some(v) => v.to_string(),
        None => squashed_text(el),
    });

    let mut raw = RawListing { url, price_raw, area_raw: None, rooms_raw: None, floor_raw: None, description: None };

    for item in card.select(&sel.feature) {
        let Some(legend) = item.select(&sel.legend).next() else {
            continue;
        };
        let label = squashed_text(legend);
        let value = squashed_text(item).replacen(&label, "", 1).trim().to_string();
        if label == sel.area_label {
            raw.area_raw = Some(strip_area_units(&value));
        } else if label == sel.rooms_label {
            raw.rooms_raw = Some(value);
        } else if label == sel.floor_label {
            raw.floor_raw = Some(value);
        }
    }
    raw
}

/// Description text from a listing detail page.
pub fn parse_description(html: &str, sel: &PageSelectors) -> Option<String> {
    let doc = Html::parse_document(html);
    let text = doc
        .select(&sel.description)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))?;
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS: &str = r#"
<html><body>
<div class="product-item product-list-item Premium real-estates my-product-placeholder">
  <div class="col-md-6 col-sm-5 col-xs-6 col-lg-6 sm-margin">
    <h3 class="product-title"><a href="/nekretnine/izdavanje-stanova/stan-vracar/5425">Stan Vračar</a></h3>
    <ul class="product-features">
      <li class="col-p-1-3"><div class="value-wrapper">52&nbsp;m<sup>2</sup><span class="legend">Kvadratura</span></div></li>
      <li class="col-p-1-3"><div class="value-wrapper">2.5<span class="legend">Broj soba</span></div></li>
      <li class="col-p-1-3"><div class="value-wrapper">IV/6<span class="legend">Spratnost</span></div></li>
    </ul>
  </div>
  <div class="central-feature-wrapper"><div class="central-feature"><span data-value="550">550 &euro;</span></div></div>
</div>
<div class="product-item product-list-item Standard real-estates my-product-placeholder">
  <h3 class="product-title"><a href="https://www.halooglasi.com/nekretnine/izdavanje-stanova/stan-zvezdara/77">Stan</a></h3>
  <ul>
    <li class="col-p-1-3">48 m²<span class="legend">Kvadratura</span></li>
    <li class="col-p-1-3">VPR/4<span class="legend">Spratnost</span></li>
    <li class="col-p-1-3">no legend here</li>
  </ul>
</div>
<div class="product-item product-list-item Standard real-estates my-product-placeholder">
  <p>card without a link</p>
</div>
<div class="banner">not a listing</div>
</body></html>
"#;

    fn selectors() -> PageSelectors {
        PageSelectors::compile(&SelectorSettings::default()).unwrap()
    }

    fn base() -> Url {
        Url::parse("https://www.halooglasi.com").unwrap()
    }

    #[test]
    fn extracts_cards() {
        let rows = parse_results_page(RESULTS, &selectors(), &base());
        assert_eq!(rows.len(), 3);

        let first = &rows[0];
        assert_eq!(
            first.url.as_deref(),
            Some("https://www.halooglasi.com/nekretnine/izdavanje-stanova/stan-vracar/5425")
        );
        assert_eq!(first.price_raw.as_deref(), Some("550"));
        assert_eq!(first.area_raw.as_deref(), Some("52"));
        assert_eq!(first.rooms_raw.as_deref(), Some("2.5"));
        assert_eq!(first.floor_raw.as_deref(), Some("IV/6"));

        let second = &rows[1];
        assert_eq!(
            second.url.as_deref(),
            Some("https://www.halooglasi.com/nekretnine/izdavanje-stanova/stan-zvezdara/77")
        );
        assert_eq!(second.price_raw, None);
        assert_eq!(second.area_raw.as_deref(), Some("48"));
        assert_eq!(second.rooms_raw, None);
        assert_eq!(second.floor_raw.as_deref(), Some("VPR/4"));

        assert_eq!(rows[2].url, None);
    }

    #[test]
    fn empty_page_has_no_rows() {
        assert!(parse_results_page("<html><body><p>Nema oglasa</p></body></html>", &selectors(), &base()).is_empty());
    }

    #[test]
    fn description_is_whitespace_normalized() {
        let html = r#"<div><span id="plh51">Dvosoban stan,
            <b>renoviran</b>   blizu parka.</span></div>"#;
        assert_eq!(
            parse_description(html, &selectors()).as_deref(),
            Some("Dvosoban stan, renoviran blizu parka.")
        );
        assert_eq!(parse_description("<span id=\"plh51\">  </span>", &selectors()), None);
        assert_eq!(parse_description("<p>nothing</p>", &selectors()), None);
    }

    #[test]
    fn bad_selector_is_reported() {
        let cfg = SelectorSettings { price: "div[".into(), ..SelectorSettings::default() };
        let err = PageSelectors::compile(&cfg).unwrap_err();
        assert!(err.starts_with("selectors.price"), "{err}");
    }
}
