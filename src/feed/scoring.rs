use chrono::{DateTime, Utc};

/// Weights and curve parameters for the newsworthiness composite.
#[derive(Debug, Clone)]
pub struct HeroWeights {
    pub movement: f64,
    pub significance: f64,
    pub volatility: f64,
    pub sigmoid_steepness: f64,
    pub sigmoid_midpoint: f64,
    /// Minimum |24h change| in percentage points to be hero-eligible.
    pub min_change_threshold: f64,
    /// log10(volume) that maps to a full significance score.
    pub max_volume_log: f64,
}

impl Default for HeroWeights {
    fn default() -> Self {
        Self {
            movement: 0.4,
            significance: 0.5,
            volatility: 0.1,
            sigmoid_steepness: 0.15,
            sigmoid_midpoint: 8.0,
            min_change_threshold: 2.0,
            max_volume_log: 8.0,
        }
    }
}

/// Composite newsworthiness score.
///
/// `change_pct` is the 24h change in percentage points; `avg_daily_change`
/// is an optional historical baseline enabling the volatility bonus. The
/// movement and significance terms are capped at 100 and the bonus at 20,
/// but the weighted sum itself is not clamped — with non-default weights the
/// composite can exceed 100, and 100 is a soft ceiling by intent.
pub fn compute_newsworthiness(
    change_pct: f64,
    volume: f64,
    avg_daily_change: Option<f64>,
    w: &HeroWeights,
) -> f64 {
    let abs_change = change_pct.abs();

    // Movement: logistic in |change| — large moves saturate instead of dominating.
    let movement = 100.0 / (1.0 + (-w.sigmoid_steepness * (abs_change - w.sigmoid_midpoint)).exp());

    // Significance: log-scaled volume so whales don't swamp the feed.
    let volume_log = volume.max(1.0).log10();
    let significance = ((volume_log / w.max_volume_log) * 100.0).min(100.0);

    // Volatility bonus: only when a historical baseline exists.
    let volatility_bonus = match avg_daily_change {
        Some(avg) if avg > 0.0 => ((abs_change / avg) * 4.0).min(20.0),
        _ => 0.0,
    };

    let score = movement * w.movement
        + significance * w.significance
        + volatility_bonus * w.volatility;
    round2(score)
}

/// Multi-factor "most interesting" score, 0-100.
///
/// Factors: 24h delta (2x), 24h volume rank (1x), urgency of the resolution
/// deadline (1x), and price uncertainty peaking at 50% (0.5x). Normalized by
/// the theoretical maximum so the result stays in [0, 100].
pub fn interesting_score(
    delta: f64,
    volume_rank: usize,
    resolution_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    current_price: f64,
    total_markets: usize,
) -> f64 {
    // Max expected delta is ~0.30 (a 30-point move in 24h).
    let delta_score = (delta.abs() / 0.30).min(1.0);

    let volume_score = (1.0 - volume_rank as f64 / total_markets.max(1) as f64).max(0.0);

    let urgency_score = match resolution_date {
        Some(deadline) => {
            let days_until = ((deadline - now).num_seconds() as f64 / 86_400.0).max(0.0);
            if days_until > 0.0 {
                (1.0 / days_until).min(1.0)
            } else {
                1.0
            }
        }
        None => 0.0,
    };

    let uncertainty_score = 1.0 - (current_price - 0.5).abs() * 2.0;

    let score = delta_score * 2.0
        + volume_score * 1.0
        + urgency_score * 1.0
        + uncertainty_score * 0.5;

    // Max possible raw = 2 + 1 + 1 + 0.5 = 4.5
    round2(score / 4.5 * 100.0)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
