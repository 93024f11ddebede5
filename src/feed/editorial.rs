use std::collections::HashSet;

use crate::feed::scoring::{compute_newsworthiness, HeroWeights};
use crate::types::{Category, EditorialMarket, FeedSection, TickerItem};

pub const GEOPOLITICS_KEYWORDS: &[&str] = &[
    "war", "government", "minister", "president", "election", "strike", "nato", "capture",
    "military", "sanctions", "ceasefire", "invasion", "diplomacy", "parliament", "coalition",
];

pub const TECH_KEYWORDS: &[&str] = &[
    "nvidia", "apple", "microsoft", "google", "ai", "bitcoin", "ethereum", "crypto", "tesla",
    "openai", "meta", "amazon",
];

const HIGH_CONFIDENCE_CAP: usize = 6;
const SECTION_CAP: usize = 4;

/// Select the hero: the most newsworthy market plus up to two secondaries.
///
/// Markets below the movement threshold are ineligible; when nothing moved,
/// the fallback is simply the top three by raw volume. Eligible markets are
/// scored, deduplicated to one per cluster, and the secondaries prefer
/// categories different from the primary's.
pub fn select_hero(
    markets: &[EditorialMarket],
    weights: &HeroWeights,
) -> (Option<EditorialMarket>, Vec<EditorialMarket>) {
    let eligible: Vec<&EditorialMarket> = markets
        .iter()
        .filter(|m| m.change_24h.abs() >= weights.min_change_threshold)
        .collect();

    if eligible.is_empty() {
        let mut by_volume: Vec<&EditorialMarket> = markets.iter().collect();
        by_volume.sort_by(|a, b| b.volume.total_cmp(&a.volume));
        let primary = by_volume.first().map(|m| (*m).clone());
        let secondary = by_volume.iter().skip(1).take(2).map(|m| (*m).clone()).collect();
        return (primary, secondary);
    }

    let mut scored: Vec<(&EditorialMarket, f64)> = eligible
        .into_iter()
        .map(|m| (m, compute_newsworthiness(m.change_24h, m.volume, None, weights)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    // One market per cluster; unclustered markets stand alone.
    let mut seen_clusters: HashSet<String> = HashSet::new();
    let mut deduplicated: Vec<&EditorialMarket> = Vec::new();
    for &(market, _) in &scored {
        let cluster_key = match market.cluster_id {
            Some(id) => format!("cluster:{id}"),
            None => format!("market:{}", market.id),
        };
        if seen_clusters.insert(cluster_key) {
            deduplicated.push(market);
        }
    }

    let Some(primary) = deduplicated.first().copied() else {
        return (None, Vec::new());
    };
    let remaining = &deduplicated[1..];

    // Prefer category diversity for the two secondary slots.
    let mut second: Option<&EditorialMarket> = None;
    let mut third: Option<&EditorialMarket> = None;
    for &market in remaining {
        if second.is_none() && market.category != primary.category {
            second = Some(market);
        } else if third.is_none()
            && market.category != primary.category
            && Some(market.id.as_str()) != second.map(|m| m.id.as_str())
        {
            third = Some(market);
        }
        if second.is_some() && third.is_some() {
            break;
        }
    }

    // Backfill from score order when diversity can't be satisfied.
    if second.is_none() {
        second = remaining.first().copied();
    }
    if third.is_none() {
        third = remaining
            .iter()
            .find(|m| Some(m.id.as_str()) != second.map(|s| s.id.as_str()))
            .copied();
    }

    let secondary = [second, third].into_iter().flatten().cloned().collect();
    (Some(primary.clone()), secondary)
}

/// Assign the non-hero remainder to editorial sections in fixed priority
/// order. Each section claims its members before the next is built, so a
/// market appears in at most one section. Empty sections are omitted.
pub fn assign_sections(
    markets: &[EditorialMarket],
    hero_ids: &HashSet<String>,
) -> Vec<FeedSection> {
    let remaining: Vec<&EditorialMarket> =
        markets.iter().filter(|m| !hero_ids.contains(&m.id)).collect();

    let mut sections = Vec::new();

    // High Confidence (probability >= 90%)
    let mut high_conf: Vec<&EditorialMarket> =
        remaining.iter().filter(|m| m.probability >= 90).copied().collect();
    high_conf.sort_by(|a, b| {
        b.probability
            .cmp(&a.probability)
            .then(b.volume.total_cmp(&a.volume))
    });
    let high_conf_ids: HashSet<&str> = high_conf
        .iter()
        .take(HIGH_CONFIDENCE_CAP)
        .map(|m| m.id.as_str())
        .collect();
    if !high_conf.is_empty() {
        sections.push(FeedSection {
            label: "High Confidence · >90%".to_string(),
            card_variant: "compact".to_string(),
            grid_cols: 3,
            markets: high_conf.iter().take(HIGH_CONFIDENCE_CAP).map(|m| (*m).clone()).collect(),
        });
    }

    // Geopolitics & Conflict
    let mut geo: Vec<&EditorialMarket> = remaining
        .iter()
        .filter(|m| !high_conf_ids.contains(m.id.as_str()))
        .filter(|m| {
            m.category == Category::Politics || contains_keyword(&m.question, GEOPOLITICS_KEYWORDS)
        })
        .copied()
        .collect();
    geo.sort_by(|a, b| {
        b.change_24h
            .abs()
            .total_cmp(&a.change_24h.abs())
            .then(b.volume.total_cmp(&a.volume))
    });
    let geo_ids: HashSet<&str> = geo.iter().take(SECTION_CAP).map(|m| m.id.as_str()).collect();
    if !geo.is_empty() {
        sections.push(FeedSection {
            label: "Geopolitics & Conflict".to_string(),
            card_variant: "mini".to_string(),
            grid_cols: 2,
            markets: geo.iter().take(SECTION_CAP).map(|m| (*m).clone()).collect(),
        });
    }

    // Tech & Markets
    let mut tech: Vec<&EditorialMarket> = remaining
        .iter()
        .filter(|m| {
            !high_conf_ids.contains(m.id.as_str()) && !geo_ids.contains(m.id.as_str())
        })
        .filter(|m| {
            matches!(m.category, Category::Tech | Category::Crypto)
                || contains_keyword(&m.question, TECH_KEYWORDS)
        })
        .copied()
        .collect();
    tech.sort_by(|a, b| {
        b.change_24h
            .abs()
            .total_cmp(&a.change_24h.abs())
            .then(b.volume.total_cmp(&a.volume))
    });
    if !tech.is_empty() {
        sections.push(FeedSection {
            label: "Tech & Markets".to_string(),
            card_variant: "medium".to_string(),
            grid_cols: 2,
            markets: tech.iter().take(SECTION_CAP).map(|m| (*m).clone()).collect(),
        });
    }

    sections
}

fn contains_keyword(question: &str, keywords: &[&str]) -> bool {
    let lower = question.to_lowercase();
    keywords.iter().any(|kw| lower.contains(kw))
}

/// Biggest absolute movers, for the ticker bar.
pub fn select_ticker(markets: &[EditorialMarket], count: usize) -> Vec<TickerItem> {
    top_movers(markets, count)
        .into_iter()
        .map(|m| TickerItem {
            label: m.headline.chars().take(40).collect(),
            change: m.change_24h,
            probability: m.probability,
        })
        .collect()
}

/// Biggest absolute movers, for the sidebar.
pub fn select_movers(markets: &[EditorialMarket], count: usize) -> Vec<EditorialMarket> {
    top_movers(markets, count).into_iter().cloned().collect()
}

fn top_movers(markets: &[EditorialMarket], count: usize) -> Vec<&EditorialMarket> {
    let mut sorted: Vec<&EditorialMarket> = markets.iter().collect();
    sorted.sort_by(|a, b| b.change_24h.abs().total_cmp(&a.change_24h.abs()));
    sorted.into_iter().take(count).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarketStatus;

    fn editorial(id: &str, category: Category, change: f64, volume: f64) -> EditorialMarket {
        EditorialMarket {
            id: id.to_string(),
            question: format!("Will {id} happen?"),
            headline: format!("{id} happens"),
            summary: String::new(),
            category,
            current_price: 0.5,
            probability: 50,
            price_24h_ago: Some(0.5 - change / 100.0),
            change_24h: change,
            volume,
            resolution_date: None,
            status: MarketStatus::Active,
            slug: None,
            image_url: None,
            cluster_id: None,
        }
    }

    #[test]
    fn hero_dedup_drops_lower_scoring_cluster_sibling() {
        let mut a = editorial("a", Category::Crypto, 20.0, 5_000_000.0);
        a.cluster_id = Some(1);
        let mut b = editorial("b", Category::Crypto, 15.0, 3_000_000.0);
        b.cluster_id = Some(1);
        let c = editorial("c", Category::Politics, 10.0, 1_000_000.0);
        let d = editorial("d", Category::Sports, 8.0, 800_000.0);

        let (primary, secondary) = select_hero(&[a, b, c, d], &HeroWeights::default());
        let primary = primary.unwrap();
        assert_eq!(primary.id, "a");
        // b shares a's cluster and never appears, even as a secondary.
        assert!(secondary.iter().all(|m| m.id != "b"));
        assert_eq!(secondary.len(), 2);
    }

    #[test]
    fn hero_secondaries_prefer_other_categories() {
        let a = editorial("a", Category::Crypto, 20.0, 5_000_000.0);
        let b = editorial("b", Category::Crypto, 18.0, 4_000_000.0);
        let c = editorial("c", Category::Politics, 10.0, 1_000_000.0);
        let d = editorial("d", Category::Sports, 8.0, 800_000.0);

        let (primary, secondary) = select_hero(&[a, b, c, d], &HeroWeights::default());
        assert_eq!(primary.unwrap().id, "a");
        let ids: Vec<&str> = secondary.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[test]
    fn hero_backfills_same_category_when_diversity_runs_out() {
        let a = editorial("a", Category::Crypto, 20.0, 5_000_000.0);
        let b = editorial("b", Category::Crypto, 18.0, 4_000_000.0);
        let c = editorial("c", Category::Crypto, 15.0, 3_000_000.0);

        let (primary, secondary) = select_hero(&[a, b, c], &HeroWeights::default());
        assert_eq!(primary.unwrap().id, "a");
        let ids: Vec<&str> = secondary.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn quiet_markets_fall_back_to_volume_ranking() {
        let a = editorial("a", Category::Crypto, 0.5, 100.0);
        let b = editorial("b", Category::Politics, 0.1, 900.0);
        let c = editorial("c", Category::Sports, 1.0, 500.0);

        let (primary, secondary) = select_hero(&[a, b, c], &HeroWeights::default());
        assert_eq!(primary.unwrap().id, "b");
        let ids: Vec<&str> = secondary.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn sections_are_mutually_exclusive() {
        // Politics question that is also >= 90% probability: claimed by
        // High Confidence, never reappears in Geopolitics.
        let mut both = editorial("both", Category::Politics, 5.0, 1_000_000.0);
        both.probability = 95;
        let geo = editorial("geo", Category::Politics, 4.0, 500_000.0);
        let tech = editorial("tech", Category::Tech, 3.0, 400_000.0);

        let sections = assign_sections(&[both, geo, tech], &HashSet::new());
        let labels: Vec<&str> = sections.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["High Confidence · >90%", "Geopolitics & Conflict", "Tech & Markets"]);

        let high_ids: Vec<&str> = sections[0].markets.iter().map(|m| m.id.as_str()).collect();
        let geo_ids: Vec<&str> = sections[1].markets.iter().map(|m| m.id.as_str()).collect();
        let tech_ids: Vec<&str> = sections[2].markets.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(high_ids, vec!["both"]);
        assert_eq!(geo_ids, vec!["geo"]);
        assert_eq!(tech_ids, vec!["tech"]);
    }

    #[test]
    fn keyword_match_pulls_unmapped_categories_into_sections() {
        let kw = {
            let mut m = editorial("kw", Category::Other, 2.0, 100.0);
            m.question = "Will the ceasefire hold through March?".to_string();
            m
        };
        let sections = assign_sections(&[kw], &HashSet::new());
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].label, "Geopolitics & Conflict");
    }

    #[test]
    fn hero_markets_are_excluded_from_sections() {
        let mut hero = editorial("hero", Category::Politics, 10.0, 1_000_000.0);
        hero.probability = 95;
        let other = editorial("other", Category::Politics, 2.0, 100.0);

        let hero_ids: HashSet<String> = ["hero".to_string()].into_iter().collect();
        let sections = assign_sections(&[hero, other], &hero_ids);
        for section in &sections {
            assert!(section.markets.iter().all(|m| m.id != "hero"));
        }
    }

    #[test]
    fn empty_sections_are_omitted() {
        let quiet = editorial("q", Category::Sports, 1.0, 100.0);
        let sections = assign_sections(&[quiet], &HashSet::new());
        assert!(sections.is_empty());
    }

    #[test]
    fn ticker_takes_biggest_absolute_movers_and_truncates_labels() {
        let mut markets: Vec<EditorialMarket> = (0..12)
            .map(|i| editorial(&format!("m{i}"), Category::Other, i as f64 - 6.0, 100.0))
            .collect();
        markets[0].headline = "x".repeat(80);

        let ticker = select_ticker(&markets, 8);
        assert_eq!(ticker.len(), 8);
        // m0 has change -6.0, tied biggest absolute move.
        assert!(ticker.iter().any(|t| t.label == "x".repeat(40)));
        // Sorted by |change| descending.
        let changes: Vec<f64> = ticker.iter().map(|t| t.change.abs()).collect();
        let mut sorted = changes.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(changes, sorted);
    }

    #[test]
    fn movers_may_overlap_hero_and_sections() {
        let a = editorial("a", Category::Crypto, 20.0, 5_000_000.0);
        let movers = select_movers(&[a.clone()], 8);
        assert_eq!(movers.len(), 1);
        assert_eq!(movers[0].id, "a");
    }
}
