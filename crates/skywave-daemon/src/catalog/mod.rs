//! Remote station catalog: the client contract and the browsing engine built
//! on top of it.

pub mod browser;
pub mod radio_browser;

use async_trait::async_trait;
use skywave_proto::protocol::{CatalogQuery, RegionEntry, Station};

use crate::error::CatalogError;

pub use browser::{BrowserEvent, CatalogBrowser};
pub use radio_browser::RadioBrowserClient;

pub type CatalogResult<T> = Result<T, CatalogError>;

/// A country as the catalog lists it: display name only.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryCount {
    pub name: String,
    pub station_count: u32,
}

/// Remote listing operations.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Most clicked stations, from the top.  No offset support.
    async fn top_clicked(&self, count: usize) -> CatalogResult<Vec<Station>>;

    async fn search(&self, query: &CatalogQuery) -> CatalogResult<Vec<Station>>;

    async fn stations_by_country_code(
        &self,
        code: &str,
        limit: usize,
        offset: usize,
    ) -> CatalogResult<Vec<Station>>;

    async fn stations_by_region(
        &self,
        name: &str,
        limit: usize,
        offset: usize,
    ) -> CatalogResult<Vec<Station>>;

    async fn countries(&self) -> CatalogResult<Vec<CountryCount>>;

    /// Regions (states) for a country.  Implementations may return entries
    /// for other countries; callers filter.
    async fn regions(&self, country_code: &str) -> CatalogResult<Vec<RegionEntry>>;

    /// Count a listen.  Callers ignore failures.
    async fn record_interaction(&self, station_id: &str) -> CatalogResult<()>;
}
