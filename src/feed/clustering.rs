use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::{Cluster, EditorialMarket};

/// A cluster needs at least this many members: the point is a ladder of
/// thresholds, and a pair is not a ladder.
const MIN_CLUSTER_SIZE: usize = 3;

pub const CLUSTER_TAG: &str = "STORY";

/// Ordered threshold patterns, first match wins. Each yields
/// (subject, threshold) capture groups.
fn threshold_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // "Will the price of Bitcoin be above $60,000 on February 13?"
            Regex::new(r"(?i)price of (.+?) (?:be )?above \$?([\d,]+(?:\.\d+)?)").unwrap(),
            // "Will Bitcoin be above $60,000?"
            Regex::new(r"(?i)(.+?) (?:be )?above \$?([\d,]+(?:\.\d+)?)").unwrap(),
            // "Will X exceed $Y?"
            Regex::new(r"(?i)(.+?) exceed \$?([\d,]+(?:\.\d+)?)").unwrap(),
        ]
    })
}

fn dollar_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$[\d,]+(?:\.\d+)?").unwrap())
}

fn month_day_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2}",
        )
        .unwrap()
    })
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Normalize a market title for clustering comparison: lowercase, strip the
/// question frame, blank out dollar amounts and dates, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    let t = title.to_lowercase();
    let t = t.trim();
    let t = t.strip_prefix("will ").unwrap_or(t);
    let t = t.trim_end_matches('?').trim();
    let t = dollar_re().replace_all(t, "THRESHOLD");
    let t = month_day_re().replace_all(&t, "DATE");
    whitespace_re().replace_all(&t, " ").trim().to_string()
}

/// Strip the "Will ...?" question frame so the extraction patterns see the
/// bare proposition ("Bitcoin be above $60,000").
fn strip_question_frame(title: &str) -> &str {
    let t = title.trim();
    let t = match t.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("will ") => &t[5..],
        _ => t,
    };
    t.trim_end_matches('?').trim()
}

/// Numeric threshold from a market title, via the ordered pattern list.
pub fn extract_threshold(title: &str) -> Option<f64> {
    let bare = strip_question_frame(title);
    for pattern in threshold_patterns() {
        if let Some(caps) = pattern.captures(bare) {
            let digits = caps.get(2)?.as_str().replace(',', "");
            if let Ok(value) = digits.parse::<f64>() {
                return Some(value);
            }
        }
    }
    None
}

/// Subject text ("Bitcoin") from a threshold market title.
pub fn extract_subject(title: &str) -> Option<String> {
    let bare = strip_question_frame(title);
    for pattern in threshold_patterns() {
        if let Some(caps) = pattern.captures(bare) {
            return Some(caps.get(1)?.as_str().trim().to_string());
        }
    }
    None
}

fn threshold_headline(threshold: f64) -> String {
    if threshold >= 1000.0 {
        format!("Above ${}", comma_format(threshold))
    } else {
        format!("Above ${threshold}")
    }
}

/// Thousands-comma formatting for whole-dollar thresholds.
fn comma_format(value: f64) -> String {
    let whole = value.round() as i64;
    let digits = whole.abs().to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if whole < 0 {
        format!("-{out}")
    } else {
        out
    }
}

/// Group markets that are thresholds of the same underlying question.
///
/// Markets land in the same bucket only when their normalized titles match
/// and each yields a numeric threshold. Surviving clusters get sequential
/// ids from 1 in first-seen order, members sorted ascending by threshold
/// with compact `Above $N` headlines. Cluster ids are written back onto the
/// input slice so downstream hero dedup can see them.
pub fn cluster_markets(markets: &mut [EditorialMarket]) -> Vec<Cluster> {
    // Bucket indices by normalized title, preserving first-seen order.
    let mut bucket_order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<(usize, f64)>> = HashMap::new();

    for (idx, market) in markets.iter().enumerate() {
        let Some(threshold) = extract_threshold(&market.question) else {
            continue;
        };
        let key = normalize_title(&market.question);
        let bucket = buckets.entry(key.clone()).or_insert_with(|| {
            bucket_order.push(key);
            Vec::new()
        });
        bucket.push((idx, threshold));
    }

    let mut clusters = Vec::new();
    let mut cluster_id = 1u32;

    for key in &bucket_order {
        let Some(mut members) = buckets.remove(key) else {
            continue;
        };
        if members.len() < MIN_CLUSTER_SIZE {
            continue;
        }
        members.sort_by(|a, b| a.1.total_cmp(&b.1));

        let subject = extract_subject(&markets[members[0].0].question);
        let title = match subject {
            Some(s) => format!("{s} Price Outlook"),
            None => "Related Markets".to_string(),
        };

        let mut cluster_members = Vec::with_capacity(members.len());
        for &(idx, threshold) in members.iter() {
            markets[idx].cluster_id = Some(cluster_id);
            markets[idx].headline = threshold_headline(threshold);
            cluster_members.push(markets[idx].clone());
        }

        clusters.push(Cluster {
            id: cluster_id,
            title,
            tag: CLUSTER_TAG.to_string(),
            markets: cluster_members,
        });
        cluster_id += 1;
    }

    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, MarketStatus};

    fn editorial(id: &str, question: &str) -> EditorialMarket {
        EditorialMarket {
            id: id.to_string(),
            question: question.to_string(),
            headline: question.to_string(),
            summary: String::new(),
            category: Category::Crypto,
            current_price: 0.5,
            probability: 50,
            price_24h_ago: None,
            change_24h: 0.0,
            volume: 0.0,
            resolution_date: None,
            status: MarketStatus::Active,
            slug: None,
            image_url: None,
            cluster_id: None,
        }
    }

    #[test]
    fn normalization_blanks_thresholds_and_dates() {
        assert_eq!(
            normalize_title("Will Bitcoin be above $60,000 on February 13?"),
            "bitcoin be above THRESHOLD on DATE"
        );
        assert_eq!(
            normalize_title("Will Bitcoin be above $70,000 on March 2?"),
            "bitcoin be above THRESHOLD on DATE"
        );
        assert_eq!(normalize_title("  Will it   rain?  "), "it rain");
    }

    #[test]
    fn threshold_and_subject_extraction() {
        assert_eq!(extract_threshold("Will Bitcoin be above $50,000?"), Some(50_000.0));
        assert_eq!(
            extract_threshold("Will the price of Ether be above $4,000.50?"),
            Some(4_000.5)
        );
        assert_eq!(extract_threshold("Will revenue exceed $1,000,000?"), Some(1_000_000.0));
        assert_eq!(extract_threshold("Will it rain tomorrow?"), None);

        assert_eq!(extract_subject("Will Bitcoin be above $50,000?").as_deref(), Some("Bitcoin"));
        assert_eq!(
            extract_subject("Will the price of Ether be above $4,000?").as_deref(),
            Some("Ether")
        );
    }

    #[test]
    fn ladder_of_three_forms_one_ordered_cluster() {
        let mut markets = vec![
            editorial("b", "Will Bitcoin be above $60,000?"),
            editorial("c", "Will Bitcoin be above $70,000?"),
            editorial("a", "Will Bitcoin be above $50,000?"),
        ];
        let clusters = cluster_markets(&mut markets);

        assert_eq!(clusters.len(), 1);
        let c = &clusters[0];
        assert_eq!(c.id, 1);
        assert_eq!(c.title, "Bitcoin Price Outlook");
        assert_eq!(c.tag, "STORY");
        assert_eq!(c.markets.len(), 3);
        let ids: Vec<&str> = c.markets.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(c.markets[0].headline, "Above $50,000");
        assert_eq!(c.markets[1].headline, "Above $60,000");
        assert_eq!(c.markets[2].headline, "Above $70,000");

        // Cluster ids are written back to the input list.
        assert!(markets.iter().all(|m| m.cluster_id == Some(1)));
    }

    #[test]
    fn a_pair_is_not_a_cluster() {
        let mut markets = vec![
            editorial("a", "Will Bitcoin be above $50,000?"),
            editorial("b", "Will Bitcoin be above $60,000?"),
        ];
        let clusters = cluster_markets(&mut markets);
        assert!(clusters.is_empty());
        assert!(markets.iter().all(|m| m.cluster_id.is_none()));
    }

    #[test]
    fn different_subjects_do_not_mix() {
        let mut markets = vec![
            editorial("a", "Will Bitcoin be above $50,000?"),
            editorial("b", "Will Bitcoin be above $60,000?"),
            editorial("c", "Will Bitcoin be above $70,000?"),
            editorial("d", "Will Ether be above $3,000?"),
            editorial("e", "Will Ether be above $4,000?"),
            editorial("f", "Will Ether be above $5,000?"),
        ];
        let clusters = cluster_markets(&mut markets);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].title, "Bitcoin Price Outlook");
        assert_eq!(clusters[1].title, "Ether Price Outlook");
        assert_eq!(clusters[0].id, 1);
        assert_eq!(clusters[1].id, 2);
    }

    #[test]
    fn sub_thousand_thresholds_skip_comma_formatting() {
        assert_eq!(threshold_headline(500.0), "Above $500");
        assert_eq!(threshold_headline(50_000.0), "Above $50,000");
        assert_eq!(threshold_headline(1_250_000.0), "Above $1,250,000");
    }
}
