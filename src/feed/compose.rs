use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, TimeZone, Utc};

use crate::config::TICKER_COUNT;
use crate::feed::clustering::cluster_markets;
use crate::feed::editorial::{assign_sections, select_hero, select_movers, select_ticker};
use crate::feed::headlines::{card_summary, to_headline};
use crate::feed::scoring::HeroWeights;
use crate::store::FeedRow;
use crate::types::{
    Category, EditorialMarket, FeedLayout, FeedMeta, HeroSection, MarketStatus,
};

/// Everything a feed computation needs, loaded ahead of time. The
/// computation itself is pure: no store or cache access, no clock reads.
pub struct FeedInputs {
    pub markets: Vec<EditorialMarket>,
    pub recently_resolved: Vec<EditorialMarket>,
    pub total_markets: i64,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Shape a stored feed row into an editorial market: compute the 24h change,
/// the rounded probability, and the generated headline and summary.
pub fn build_editorial_market(row: &FeedRow) -> EditorialMarket {
    let change_pct = match row.price_24h_ago {
        Some(day_ago) => (row.current_price - day_ago) * 100.0,
        None => 0.0,
    };
    let probability = (row.current_price * 100.0).round() as i64;

    EditorialMarket {
        id: row.id.clone(),
        question: row.question.clone(),
        headline: to_headline(&row.question, probability),
        summary: card_summary(probability, change_pct, row.volume),
        category: Category::from_slug(&row.category).unwrap_or(Category::Other),
        current_price: row.current_price,
        probability,
        price_24h_ago: row.price_24h_ago,
        change_24h: round1(change_pct),
        volume: row.volume,
        resolution_date: row
            .resolution_date
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        status: MarketStatus::from_str(&row.status),
        slug: row.slug.clone(),
        image_url: row.image_url.clone(),
        cluster_id: None,
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Compose the full feed layout from one snapshot of priced markets:
/// clustering, hero selection, section assignment, ticker and movers.
pub fn compose_feed(mut inputs: FeedInputs, weights: &HeroWeights) -> FeedLayout {
    let clusters = cluster_markets(&mut inputs.markets);

    let (primary, secondary) = select_hero(&inputs.markets, weights);
    let mut hero_ids: HashSet<String> = HashSet::new();
    if let Some(p) = &primary {
        hero_ids.insert(p.id.clone());
    }
    for s in &secondary {
        hero_ids.insert(s.id.clone());
    }

    let sections = assign_sections(&inputs.markets, &hero_ids);
    let ticker = select_ticker(&inputs.markets, TICKER_COUNT);
    let movers = select_movers(&inputs.markets, TICKER_COUNT);

    let mut sources_status = BTreeMap::new();
    sources_status.insert("polymarket".to_string(), "connected".to_string());

    FeedLayout {
        hero: HeroSection { primary, secondary },
        clusters,
        sections,
        ticker,
        movers,
        recently_resolved: inputs.recently_resolved,
        meta: FeedMeta {
            total_markets: inputs.total_markets,
            last_sync: inputs.last_sync,
            sources_status,
        },
    }
}
