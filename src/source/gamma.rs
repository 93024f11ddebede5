use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::source::{ListQuery, MarketSource};
use crate::types::{map_category, FieldAnomaly, MarketStatus, NormalizedMarket};

/// Client for the Gamma REST API. Listing responses are JSON arrays of raw
/// market objects; each is reduced to a `NormalizedMarket` with defensive
/// per-field parsing.
pub struct GammaClient {
    client: reqwest::Client,
    base_url: String,
}

impl GammaClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl MarketSource for GammaClient {
    async fn list_markets(&self, query: &ListQuery) -> Result<Vec<NormalizedMarket>> {
        let url = format!(
            "{}/markets?limit={}&offset={}&active={}&closed={}&order={}&ascending={}",
            self.base_url,
            query.limit,
            query.offset,
            query.active,
            query.closed,
            query.order,
            query.ascending,
        );

        let resp = self.client.get(&url).send().await?;
        if resp.status().as_u16() == 429 {
            return Err(AppError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(AppError::Upstream(format!(
                "listing request failed with status {}",
                resp.status()
            )));
        }

        let body: Value = resp.json().await?;
        let items = body
            .as_array()
            .ok_or_else(|| AppError::Upstream("listing response was not an array".to_string()))?;

        let now = Utc::now();
        let mut markets = Vec::with_capacity(items.len());
        let mut anomaly_count = 0usize;

        for item in items {
            let Some((market, anomalies)) = normalize_market(item, now) else {
                continue;
            };
            if !anomalies.is_empty() {
                anomaly_count += anomalies.len();
                debug!(
                    market_id = %market.id,
                    fields = %anomalies.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(","),
                    "defaulted malformed upstream fields"
                );
            }
            markets.push(market);
        }

        if anomaly_count > 0 {
            warn!(
                anomalies = anomaly_count,
                page_offset = query.offset,
                "upstream page contained malformed fields"
            );
        }

        Ok(markets)
    }

    async fn fetch_market(&self, id: &str) -> Result<Option<NormalizedMarket>> {
        let url = format!("{}/markets/{}", self.base_url, id);
        let resp = self.client.get(&url).send().await?;
        if resp.status().as_u16() == 429 {
            return Err(AppError::RateLimited);
        }
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(AppError::Upstream(format!(
                "market lookup failed with status {}",
                resp.status()
            )));
        }

        let body: Value = resp.json().await?;
        Ok(normalize_market(&body, Utc::now()).map(|(m, _)| m))
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Reduce a raw upstream market object to a normalized record.
///
/// Returns None only when the record is structurally unusable (no id or no
/// question). Every other malformed field is replaced with its default and
/// reported in the anomaly list.
pub fn normalize_market(
    raw: &Value,
    now: DateTime<Utc>,
) -> Option<(NormalizedMarket, Vec<FieldAnomaly>)> {
    let id = raw.get("id").and_then(value_to_id)?;
    let question = raw.get("question").and_then(|q| q.as_str())?.to_string();
    if question.is_empty() {
        return None;
    }

    let mut anomalies = Vec::new();

    let (yes_price, no_price) = match raw.get("outcomePrices") {
        Some(v) => parse_price_pair(v).unwrap_or_else(|| {
            anomalies.push(FieldAnomaly::Prices);
            (0.5, 0.5)
        }),
        None => (0.5, 0.5),
    };

    let volume = parse_amount(raw.get("volume"), FieldAnomaly::Volume, &mut anomalies);
    let open_interest = parse_amount(raw.get("liquidity"), FieldAnomaly::Liquidity, &mut anomalies);

    let resolution_date = parse_date_field(raw.get("endDate"), FieldAnomaly::EndDate, &mut anomalies);
    let closed_time = parse_date_field(raw.get("closedTime"), FieldAnomaly::ClosedTime, &mut anomalies);

    let created_at = match raw.get("createdAt").and_then(|v| v.as_str()) {
        Some(s) => parse_datetime_lenient(s).unwrap_or_else(|| {
            anomalies.push(FieldAnomaly::CreatedDate);
            now
        }),
        None => now,
    };

    let raw_category = raw
        .get("category")
        .and_then(|c| c.as_str())
        .filter(|s| !s.is_empty())
        .or_else(|| raw.get("groupItemTitle").and_then(|c| c.as_str()))
        .unwrap_or("");
    let category = map_category(raw_category);

    let outcomes = match raw.get("outcomes") {
        Some(v) => match parse_string_list(v) {
            Some(list) => Some(list),
            None => {
                anomalies.push(FieldAnomaly::Outcomes);
                None
            }
        },
        None => None,
    };

    let status = if raw.get("active").and_then(|a| a.as_bool()).unwrap_or(false) {
        MarketStatus::Active
    } else {
        MarketStatus::Resolved
    };

    let market = NormalizedMarket {
        id,
        question,
        description: raw
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or("")
            .to_string(),
        category,
        resolution_date,
        closed_time,
        resolution_status: raw
            .get("umaResolutionStatus")
            .and_then(|s| s.as_str())
            .map(|s| s.to_string()),
        created_at,
        status,
        outcomes,
        image_url: raw.get("image").and_then(|s| s.as_str()).map(|s| s.to_string()),
        slug: raw.get("slug").and_then(|s| s.as_str()).map(|s| s.to_string()),
        yes_price,
        no_price,
        volume,
        open_interest,
    };

    Some((market, anomalies))
}

/// Upstream ids arrive as JSON strings or numbers.
fn value_to_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Price pair from either a JSON-encoded string (`"[\"0.65\", \"0.35\"]"`)
/// or a native list of strings/numbers.
fn parse_price_pair(v: &Value) -> Option<(f64, f64)> {
    let items: Vec<Value> = match v {
        Value::String(s) if !s.is_empty() => serde_json::from_str(s).ok()?,
        Value::Array(a) => a.clone(),
        _ => return None,
    };
    if items.len() < 2 {
        return None;
    }
    let yes = value_to_f64(&items[0])?;
    let no = value_to_f64(&items[1])?;
    Some((yes, no))
}

/// Dollar amounts arrive as numbers or numeric strings; anything else is 0.
fn parse_amount(v: Option<&Value>, field: FieldAnomaly, anomalies: &mut Vec<FieldAnomaly>) -> f64 {
    match v {
        None | Some(Value::Null) => 0.0,
        Some(v) => value_to_f64(v).unwrap_or_else(|| {
            anomalies.push(field);
            0.0
        }),
    }
}

fn parse_date_field(
    v: Option<&Value>,
    field: FieldAnomaly,
    anomalies: &mut Vec<FieldAnomaly>,
) -> Option<DateTime<Utc>> {
    let s = v?.as_str()?;
    match parse_datetime_lenient(s) {
        Some(dt) => Some(dt),
        None => {
            anomalies.push(field);
            None
        }
    }
}

fn parse_string_list(v: &Value) -> Option<Vec<String>> {
    let items: Vec<Value> = match v {
        Value::String(s) if !s.is_empty() => serde_json::from_str(s).ok()?,
        Value::Array(a) => a.clone(),
        _ => return None,
    };
    items
        .into_iter()
        .map(|i| i.as_str().map(|s| s.to_string()))
        .collect()
}

fn value_to_f64(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Lenient ISO-8601: full RFC 3339 (with or without the trailing `Z`),
/// a bare datetime, or a bare date (midnight UTC).
pub fn parse_datetime_lenient(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&ndt));
    }
    if let Ok(nd) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&nd.and_hms_opt(0, 0, 0)?));
    }
    None
}
