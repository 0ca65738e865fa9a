//! Catalog browsing engine.
//!
//! `CatalogBrowser` tracks one active [`LoadMode`] and a single pagination
//! cursor.  Every public operation runs on the owner's task and returns
//! immediately; network fetches run on spawned tasks and post a
//! [`BrowserEvent`] back to the owner, which applies it with
//! [`CatalogBrowser::handle_event`].  Each mode switch bumps a generation
//! counter so a page that belongs to an abandoned mode is dropped on
//! arrival.
//!
//! The top-clicked listing has no offset parameter.  `load_more` in that mode
//! re-requests `offset + page_size` stations from the top and keeps only the
//! tail it has not seen yet, so each further page costs more than the last.

use std::collections::HashSet;
use std::sync::Arc;

use skywave_proto::country;
use skywave_proto::protocol::{
    CatalogQuery, CatalogSnapshot, CountryEntry, LoadMode, RegionEntry, Station,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{CatalogClient, CatalogResult, CountryCount};

/// Which page a fetch was for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageRequest {
    First,
    /// A continuation.  `seen` is the number of stations held when it was
    /// issued.
    More { seen: usize },
}

/// Completion of a spawned catalog fetch.
#[derive(Debug)]
pub enum BrowserEvent {
    PageLoaded {
        generation: u64,
        request: PageRequest,
        result: CatalogResult<Vec<Station>>,
    },
    CountriesLoaded {
        result: CatalogResult<Vec<CountryCount>>,
    },
    RegionsLoaded {
        country_code: String,
        result: CatalogResult<Vec<RegionEntry>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaginationCursor {
    /// Stations received so far in the current mode.
    pub offset: usize,
    pub page_size: usize,
    pub has_more: bool,
}

impl PaginationCursor {
    fn reset(page_size: usize) -> Self {
        Self {
            offset: 0,
            page_size,
            has_more: false,
        }
    }
}

pub struct CatalogBrowser {
    client: Arc<dyn CatalogClient>,
    events: mpsc::Sender<BrowserEvent>,
    local_country: Option<String>,

    mode: Option<LoadMode>,
    cursor: PaginationCursor,
    stations: Vec<Station>,
    generation: u64,
    in_flight: Option<PageRequest>,
    error: Option<String>,

    countries: Vec<CountryEntry>,
    countries_loading: bool,
    regions: Vec<RegionEntry>,
    regions_loading: bool,
    selected_country: Option<String>,
    selected_region: Option<String>,
}

impl CatalogBrowser {
    pub fn new(
        client: Arc<dyn CatalogClient>,
        events: mpsc::Sender<BrowserEvent>,
        page_size: usize,
        local_country: Option<String>,
    ) -> Self {
        let page_size = page_size.max(1);
        Self {
            client,
            events,
            local_country: local_country.map(|c| c.to_ascii_uppercase()),
            mode: None,
            cursor: PaginationCursor::reset(page_size),
            stations: Vec::new(),
            generation: 0,
            in_flight: None,
            error: None,
            countries: Vec::new(),
            countries_loading: false,
            regions: Vec::new(),
            regions_loading: false,
            selected_country: None,
            selected_region: None,
        }
    }

    // ── accessors ─────────────────────────────────────────────────────────────

    pub fn mode(&self) -> Option<&LoadMode> {
        self.mode.as_ref()
    }

    pub fn cursor(&self) -> PaginationCursor {
        self.cursor
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight == Some(PageRequest::First)
    }

    pub fn is_loading_more(&self) -> bool {
        matches!(self.in_flight, Some(PageRequest::More { .. }))
    }

    pub fn countries(&self) -> &[CountryEntry] {
        &self.countries
    }

    /// Countries that can be browsed by code.
    pub fn browsable_countries(&self) -> impl Iterator<Item = &CountryEntry> {
        self.countries.iter().filter(|c| c.code.is_some())
    }

    pub fn regions(&self) -> &[RegionEntry] {
        &self.regions
    }

    pub fn selected_country(&self) -> Option<&str> {
        self.selected_country.as_deref()
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            mode: self.mode.clone(),
            stations: self.stations.clone(),
            has_more: self.cursor.has_more,
            is_loading: self.is_loading() || self.countries_loading || self.regions_loading,
            is_loading_more: self.is_loading_more(),
            error: self.error.clone(),
            countries: self.countries.clone(),
            regions: self.regions.clone(),
            selected_country: self.selected_country.clone(),
            selected_region: self.selected_region.clone(),
        }
    }

    // ── load modes ────────────────────────────────────────────────────────────

    pub fn load_top_clicked(&mut self) {
        self.begin(LoadMode::TopClicked);
    }

    /// Free-text search.  A query with no criteria at all lists the top
    /// clicked stations instead.
    pub fn search(&mut self, query: CatalogQuery) {
        if query.has_criteria() {
            self.begin(LoadMode::Search(query));
        } else {
            self.load_top_clicked();
        }
    }

    /// Returns `false` and clears the country selection when `input` does
    /// not normalise to a country code.
    pub fn load_by_country_code(&mut self, input: &str) -> bool {
        let Some(code) = self.normalize_country_code(input) else {
            self.reject_country(input);
            return false;
        };
        self.select_country(code.clone());
        self.begin(LoadMode::ByCountryCode(code));
        true
    }

    pub fn load_by_region(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.selected_region = Some(name.to_string());
        self.begin(LoadMode::ByRegion(name.to_string()));
        true
    }

    /// Name search restricted to one country.  Blank text lists the whole
    /// country.
    pub fn search_within_country(&mut self, input: &str, text: &str) -> bool {
        let Some(code) = self.normalize_country_code(input) else {
            self.reject_country(input);
            return false;
        };
        if text.trim().is_empty() {
            return self.load_by_country_code(&code);
        }
        self.select_country(code.clone());
        self.begin(LoadMode::Search(CatalogQuery {
            name: Some(text.trim().to_string()),
            country_code: Some(code),
            ..CatalogQuery::default()
        }));
        true
    }

    /// Fetch the next page of the current mode.  Returns `false` without
    /// fetching when a page is already in flight, there is nothing more, or
    /// no mode is active.
    pub fn load_more(&mut self) -> bool {
        if self.in_flight.is_some() || !self.cursor.has_more {
            return false;
        }
        let Some(mode) = self.mode.clone() else {
            return false;
        };

        let seen = self.cursor.offset;
        debug!("catalog: load more {:?} from {}", mode, seen);
        self.in_flight = Some(PageRequest::More { seen });
        self.spawn_page(mode, PageRequest::More { seen });
        true
    }

    fn begin(&mut self, mode: LoadMode) {
        info!("catalog: loading {:?}", mode);
        self.generation += 1;
        self.stations.clear();
        self.cursor = PaginationCursor::reset(self.cursor.page_size);
        self.error = None;
        self.mode = Some(mode.clone());
        self.in_flight = Some(PageRequest::First);
        self.spawn_page(mode, PageRequest::First);
    }

    fn select_country(&mut self, code: String) {
        if self.selected_country.as_deref() != Some(code.as_str()) {
            self.regions.clear();
            self.regions_loading = false;
        }
        self.selected_country = Some(code);
        self.selected_region = None;
    }

    fn reject_country(&mut self, input: &str) {
        debug!("catalog: rejecting country {:?}", input);
        self.generation += 1;
        self.mode = None;
        self.in_flight = None;
        self.stations.clear();
        self.cursor = PaginationCursor::reset(self.cursor.page_size);
        self.selected_country = None;
        self.selected_region = None;
        self.regions.clear();
        self.regions_loading = false;
    }

    fn spawn_page(&self, mode: LoadMode, request: PageRequest) {
        let client = Arc::clone(&self.client);
        let events = self.events.clone();
        let generation = self.generation;
        let page_size = self.cursor.page_size;
        let offset = match request {
            PageRequest::First => 0,
            PageRequest::More { seen } => seen,
        };

        tokio::spawn(async move {
            let result = match &mode {
                LoadMode::TopClicked => client.top_clicked(offset + page_size).await,
                LoadMode::Search(query) => client.search(&query.with_page(page_size, offset)).await,
                LoadMode::ByCountryCode(code) => {
                    client.stations_by_country_code(code, page_size, offset).await
                }
                LoadMode::ByRegion(name) => {
                    client.stations_by_region(name, page_size, offset).await
                }
            };
            let _ = events
                .send(BrowserEvent::PageLoaded {
                    generation,
                    request,
                    result,
                })
                .await;
        });
    }

    // ── countries & regions ───────────────────────────────────────────────────

    pub fn load_countries(&mut self) {
        self.countries_loading = true;
        let client = Arc::clone(&self.client);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = client.countries().await;
            let _ = events.send(BrowserEvent::CountriesLoaded { result }).await;
        });
    }

    /// Load the regions of a country.  The country becomes the selection.
    pub fn load_regions(&mut self, input: &str) -> bool {
        let Some(code) = self.normalize_country_code(input) else {
            self.reject_country(input);
            return false;
        };
        self.select_country(code.clone());
        self.regions.clear();
        self.regions_loading = true;

        let client = Arc::clone(&self.client);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = client.regions(&code).await;
            let _ = events
                .send(BrowserEvent::RegionsLoaded {
                    country_code: code,
                    result,
                })
                .await;
        });
        true
    }

    /// Reduce free text, a bare code or `"Name-CODE"` to an uppercase
    /// alpha-2 code.  Names are looked up in the loaded country list.
    pub fn normalize_country_code(&self, input: &str) -> Option<String> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }

        let candidate = if country::is_alpha2(trimmed) {
            Some(trimmed.to_string())
        } else if let Some(tail) = trimmed
            .rsplit_once('-')
            .map(|(_, tail)| tail.trim())
            .filter(|tail| country::is_alpha2(tail))
        {
            Some(tail.to_string())
        } else {
            self.countries
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(trimmed))
                .and_then(|c| c.code.clone())
        };

        candidate
            .map(|c| c.to_ascii_uppercase())
            .filter(|c| country::is_alpha2(c))
    }

    // ── event handling ────────────────────────────────────────────────────────

    pub fn handle_event(&mut self, event: BrowserEvent) {
        match event {
            BrowserEvent::PageLoaded {
                generation,
                request,
                result,
            } => self.apply_page(generation, request, result),
            BrowserEvent::CountriesLoaded { result } => self.apply_countries(result),
            BrowserEvent::RegionsLoaded {
                country_code,
                result,
            } => self.apply_regions(country_code, result),
        }
    }

    fn apply_page(
        &mut self,
        generation: u64,
        request: PageRequest,
        result: CatalogResult<Vec<Station>>,
    ) {
        if generation != self.generation {
            debug!(
                "catalog: dropping stale page gen={} current={}",
                generation, self.generation
            );
            return;
        }
        self.in_flight = None;
        let page_size = self.cursor.page_size;

        match (request, result) {
            (PageRequest::First, Ok(stations)) => {
                debug!("catalog: first page {} stations", stations.len());
                self.cursor.offset = stations.len();
                self.cursor.has_more = stations.len() >= page_size;
                self.stations = stations;
                self.error = None;
            }
            (PageRequest::More { seen }, Ok(page)) => {
                let tail: Vec<Station> = match self.mode {
                    Some(LoadMode::TopClicked) => page.into_iter().skip(seen).collect(),
                    _ => page,
                };
                debug!("catalog: appended {} stations", tail.len());
                self.cursor.has_more = tail.len() >= page_size;
                self.cursor.offset += tail.len();
                self.stations.extend(tail);
                self.error = None;
            }
            (PageRequest::More { .. }, Err(crate::error::CatalogError::NotFound)) => {
                debug!("catalog: no further pages");
                self.cursor.has_more = false;
                self.error = None;
            }
            (_, Err(e)) => {
                warn!("catalog: fetch failed: {} (retryable: {})", e, e.is_retryable());
                self.stations.clear();
                self.cursor = PaginationCursor::reset(page_size);
                self.error = e.user_message();
            }
        }
    }

    fn apply_countries(&mut self, result: CatalogResult<Vec<CountryCount>>) {
        self.countries_loading = false;
        let counts = match result {
            Ok(counts) => counts,
            Err(e) => {
                warn!("catalog: countries failed: {} (retryable: {})", e, e.is_retryable());
                self.countries.clear();
                self.error = e
                    .user_message()
                    .map(|m| format!("Failed to load countries: {}", m));
                return;
            }
        };

        let local = self.local_country.as_deref();
        let entries = counts
            .into_iter()
            .map(|c| {
                let code = country::resolve(&c.name);
                CountryEntry {
                    is_local: code.is_some() && code.as_deref() == local,
                    name: c.name,
                    code,
                    station_count: c.station_count,
                }
            })
            .collect();

        let mut entries = country::dedupe_by_name(entries);
        entries.sort_by(|a, b| b.is_local.cmp(&a.is_local).then_with(|| a.name.cmp(&b.name)));
        info!("catalog: {} countries", entries.len());
        self.countries = entries;

        if self.selected_country.is_none() {
            if let Some(local) = self.countries.iter().find(|c| c.is_local) {
                self.selected_country = local.code.clone();
            }
        }
    }

    fn apply_regions(&mut self, country_code: String, result: CatalogResult<Vec<RegionEntry>>) {
        if self.selected_country.as_deref() != Some(country_code.as_str()) {
            debug!("catalog: dropping regions for {}", country_code);
            return;
        }
        self.regions_loading = false;

        match result {
            Ok(regions) => {
                let mut seen = HashSet::new();
                self.regions = regions
                    .into_iter()
                    .filter(|r| r.country_code.eq_ignore_ascii_case(&country_code))
                    .filter(|r| !r.name.trim().is_empty())
                    .filter(|r| seen.insert(r.name.clone()))
                    .collect();
                debug!("catalog: {} regions for {}", self.regions.len(), country_code);
            }
            Err(e) => {
                warn!("catalog: regions failed: {} (retryable: {})", e, e.is_retryable());
                self.regions.clear();
                self.error = e.user_message();
            }
        }
    }
}
