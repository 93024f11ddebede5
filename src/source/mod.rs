pub mod gamma;

pub use gamma::GammaClient;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::NormalizedMarket;

/// One page worth of listing parameters, mirroring the upstream query string.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub limit: usize,
    pub offset: usize,
    pub active: bool,
    pub closed: bool,
    pub order: &'static str,
    pub ascending: bool,
}

impl ListQuery {
    /// Active, not-closed listings ordered by volume descending.
    pub fn active_page(limit: usize, offset: usize) -> Self {
        Self { limit, offset, active: true, closed: false, order: "volume", ascending: false }
    }

    /// Recently-resolved listings ordered by close time descending.
    pub fn resolved_page(limit: usize, offset: usize) -> Self {
        Self { limit, offset, active: false, closed: true, order: "closedTime", ascending: false }
    }
}

/// Read-only upstream market source. The reconciler owns pagination; one
/// call fetches one page.
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn list_markets(&self, query: &ListQuery) -> Result<Vec<NormalizedMarket>>;

    /// Direct single-market lookup. `Ok(None)` when the upstream does not
    /// know the id or returns an unusable record.
    async fn fetch_market(&self, id: &str) -> Result<Option<NormalizedMarket>>;
}
