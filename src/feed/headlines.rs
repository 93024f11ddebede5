use std::sync::OnceLock;

use regex::Regex;

fn will_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^Will\s+").unwrap())
}

fn price_of_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)the price of (.+?) be above").unwrap())
}

fn bare_be_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bbe\b\s+").unwrap())
}

/// Convert a question-format market title to a declarative news headline,
/// with editorial framing keyed off the probability (0-100 scale).
pub fn to_headline(title: &str, probability: i64) -> String {
    let headline = title.trim();
    let headline = will_prefix_re().replace(headline, "");
    let headline = headline.trim_end_matches('?').trim().to_string();

    let mut headline = capitalize_first(&headline);
    headline = price_of_re()
        .replace(&headline, |caps: &regex::Captures<'_>| {
            format!("{} Price Above", &caps[1])
        })
        .to_string();
    headline = bare_be_re().replace_all(&headline, "").to_string();

    let lower = headline.to_lowercase();
    if probability >= 80 {
        // High confidence reads as the expected outcome; the bare title stands.
        headline
    } else if probability >= 40 {
        if ["question", "uncertain", "jeopardy"].iter().any(|w| lower.contains(w)) {
            headline
        } else {
            format!("{headline} — Outcome Uncertain")
        }
    } else if ["unlikely", "doubt"].iter().any(|w| lower.contains(w)) {
        headline
    } else {
        format!("{headline} Remains Unlikely")
    }
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Template summary for a market card from its current state.
/// `change_pct` is the signed 24h change in percentage points.
pub fn card_summary(probability: i64, change_pct: f64, _volume: f64) -> String {
    let abs_change = change_pct.abs();

    if abs_change >= 10.0 && change_pct > 0.0 {
        return format!(
            "Prediction markets have surged {abs_change:.0}% in the last 24 hours, \
             signaling growing confidence at {probability}% likelihood."
        );
    }

    if abs_change >= 10.0 && change_pct < 0.0 {
        return format!(
            "Market confidence has dropped {abs_change:.0}% in the last 24 hours, \
             reflecting increasing uncertainty."
        );
    }

    if probability >= 90 {
        let change_clause = if abs_change >= 2.0 {
            let direction = if change_pct > 0.0 {
                "a recent surge"
            } else {
                "despite recent movement"
            };
            format!(", {direction} of {abs_change:.0}%")
        } else {
            String::new()
        };
        return format!("Markets assign {probability}% probability to this outcome{change_clause}.");
    }

    if probability <= 15 {
        return format!("Markets see this as highly unlikely at just {probability}% probability.");
    }

    format!("Traders currently price this outcome at {probability}% likelihood.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_frame_becomes_declarative() {
        assert_eq!(
            to_headline("Will Bitcoin reach $100,000 this year?", 85),
            "Bitcoin reach $100,000 this year"
        );
    }

    #[test]
    fn price_of_phrasing_is_compacted() {
        assert_eq!(
            to_headline("Will the price of Bitcoin be above $60,000 on Feb 13?", 85),
            "Bitcoin Price Above $60,000 on Feb 13"
        );
    }

    #[test]
    fn mid_probability_gets_uncertainty_marker() {
        let h = to_headline("Will the ceasefire hold?", 55);
        assert!(h.ends_with("— Outcome Uncertain"), "{h}");
        // No doubled marker when the title already carries one.
        let h2 = to_headline("Will the outcome stay uncertain?", 55);
        assert!(!h2.contains("— Outcome Uncertain"), "{h2}");
    }

    #[test]
    fn low_probability_reads_unlikely() {
        let h = to_headline("Will aliens land this year?", 5);
        assert!(h.ends_with("Remains Unlikely"), "{h}");
    }

    #[test]
    fn summary_picks_template_by_state() {
        assert!(card_summary(70, 12.0, 1000.0).contains("surged 12%"));
        assert!(card_summary(30, -11.0, 1000.0).contains("dropped 11%"));
        assert!(card_summary(95, 0.5, 1000.0).starts_with("Markets assign 95%"));
        assert!(card_summary(95, 3.0, 1000.0).contains("a recent surge of 3%"));
        assert!(card_summary(10, 0.0, 1000.0).contains("highly unlikely"));
        assert!(card_summary(50, 1.0, 1000.0).contains("50% likelihood"));
    }
}
