//! Listing extraction from a page of search-result markup.
//!
//! Every `<li>` in the payload is one listing. Extraction is pure: it never
//! touches the network and never fails as a whole. A listing missing a
//! required field comes back as a [`SkipReason::MissingField`] so the page
//! keeps its listing count (an empty page still means end-of-results).

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};

use crate::models::{RawRecord, SkipReason};

pub struct ListingExtractor {
    card: Selector,
    title: Selector,
    organization: Selector,
    location: Selector,
    posted: Selector,
    link: Selector,
}

impl ListingExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            card: selector("li")?,
            title: selector("h3")?,
            organization: selector("h4")?,
            location: selector("span.job-search-card__location")?,
            posted: selector("time")?,
            link: selector("a[href]")?,
        })
    }

    /// Extract one entry per listing element, in page order.
    pub fn extract(&self, payload: &str) -> Vec<Result<RawRecord, SkipReason>> {
        let document = Html::parse_fragment(payload);
        document
            .select(&self.card)
            .map(|card| self.extract_card(card))
            .collect()
    }

    fn extract_card(&self, card: ElementRef<'_>) -> Result<RawRecord, SkipReason> {
        let title = first_text(card, &self.title).ok_or(SkipReason::MissingField("title"))?;
        let organization = first_text(card, &self.organization)
            .ok_or(SkipReason::MissingField("organization"))?;
        let location =
            first_text(card, &self.location).ok_or(SkipReason::MissingField("location"))?;
        let source_link = card
            .select(&self.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| href.trim().to_string())
            .filter(|href| !href.is_empty())
            .ok_or(SkipReason::MissingField("link"))?;
        let posted_at = card
            .select(&self.posted)
            .next()
            .and_then(|t| t.value().attr("datetime"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(RawRecord {
            title,
            organization,
            location,
            posted_at,
            source_link,
            secondary_link: None,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector '{}': {}", css, e))
}

fn first_text(card: ElementRef<'_>, selector: &Selector) -> Option<String> {
    card.select(selector)
        .next()
        .map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|t| !t.is_empty())
}
