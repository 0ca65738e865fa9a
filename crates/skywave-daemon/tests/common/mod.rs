#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use skywave_daemon::catalog::{CatalogClient, CatalogResult, CountryCount};
use skywave_daemon::error::CatalogError;
use skywave_daemon::playback::{
    AudioTransport, NowPlayingSink, TransportEvent, TransportEventSink, TransportFactory,
};
use skywave_proto::protocol::{CatalogQuery, NowPlaying, RegionEntry, Station};

pub fn station(id: &str) -> Station {
    Station {
        id: id.to_string(),
        name: format!("Station {}", id),
        stream_url: format!("http://stream.example.com/{}", id),
        ..Station::default()
    }
}

pub fn stations(prefix: &str, n: usize) -> Vec<Station> {
    (0..n).map(|i| station(&format!("{}{}", prefix, i))).collect()
}

// ── catalog ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogCall {
    TopClicked(usize),
    Search(CatalogQuery),
    ByCountry {
        code: String,
        limit: usize,
        offset: usize,
    },
    ByRegion {
        name: String,
        limit: usize,
        offset: usize,
    },
    Countries,
    Regions(String),
    Interaction(String),
}

/// Serves slices of a fixed station pool and records every call.
pub struct MockCatalog {
    pool: Vec<Station>,
    countries: Vec<CountryCount>,
    regions: Vec<RegionEntry>,
    calls: Mutex<Vec<CatalogCall>>,
    failures: Mutex<VecDeque<CatalogError>>,
}

impl MockCatalog {
    pub fn new(pool: Vec<Station>) -> Self {
        Self {
            pool,
            countries: Vec::new(),
            regions: Vec::new(),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_countries(mut self, countries: &[(&str, u32)]) -> Self {
        self.countries = countries
            .iter()
            .map(|(name, count)| CountryCount {
                name: name.to_string(),
                station_count: *count,
            })
            .collect();
        self
    }

    pub fn with_regions(mut self, regions: &[(&str, &str)]) -> Self {
        self.regions = regions
            .iter()
            .map(|(name, code)| RegionEntry {
                name: name.to_string(),
                country_code: code.to_string(),
                station_count: 1,
            })
            .collect();
        self
    }

    /// The next listing call fails with `error`.
    pub fn fail_next(&self, error: CatalogError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> Vec<CatalogCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn listing_calls(&self) -> Vec<CatalogCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, CatalogCall::Interaction(_)))
            .collect()
    }

    fn record(&self, call: CatalogCall) -> CatalogResult<()> {
        self.calls.lock().unwrap().push(call);
        match self.failures.lock().unwrap().pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn page(&self, limit: usize, offset: usize) -> Vec<Station> {
        self.pool.iter().skip(offset).take(limit).cloned().collect()
    }
}

#[async_trait]
impl CatalogClient for MockCatalog {
    async fn top_clicked(&self, count: usize) -> CatalogResult<Vec<Station>> {
        self.record(CatalogCall::TopClicked(count))?;
        Ok(self.page(count, 0))
    }

    async fn search(&self, query: &CatalogQuery) -> CatalogResult<Vec<Station>> {
        self.record(CatalogCall::Search(query.clone()))?;
        Ok(self.page(query.limit, query.offset))
    }

    async fn stations_by_country_code(
        &self,
        code: &str,
        limit: usize,
        offset: usize,
    ) -> CatalogResult<Vec<Station>> {
        self.record(CatalogCall::ByCountry {
            code: code.to_string(),
            limit,
            offset,
        })?;
        Ok(self.page(limit, offset))
    }

    async fn stations_by_region(
        &self,
        name: &str,
        limit: usize,
        offset: usize,
    ) -> CatalogResult<Vec<Station>> {
        self.record(CatalogCall::ByRegion {
            name: name.to_string(),
            limit,
            offset,
        })?;
        Ok(self.page(limit, offset))
    }

    async fn countries(&self) -> CatalogResult<Vec<CountryCount>> {
        self.record(CatalogCall::Countries)?;
        Ok(self.countries.clone())
    }

    async fn regions(&self, country_code: &str) -> CatalogResult<Vec<RegionEntry>> {
        self.record(CatalogCall::Regions(country_code.to_string()))?;
        Ok(self.regions.clone())
    }

    async fn record_interaction(&self, station_id: &str) -> CatalogResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(CatalogCall::Interaction(station_id.to_string()));
        Ok(())
    }
}

// ── transport ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Load(String),
    Play,
    Pause,
    Stop,
    Volume(f32),
}

/// Records commands per generation and keeps every sink it was handed.
#[derive(Default)]
pub struct MockTransportFactory {
    calls: Arc<Mutex<Vec<(u64, TransportCall)>>>,
    sinks: Mutex<Vec<TransportEventSink>>,
    fail: Mutex<bool>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> Vec<(u64, TransportCall)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    /// Sink of the `index`-th transport built.
    pub fn sink(&self, index: usize) -> TransportEventSink {
        self.sinks.lock().unwrap()[index].clone()
    }

    pub fn last_sink(&self) -> TransportEventSink {
        self.sinks
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no transport created")
    }

    pub async fn emit_last(&self, event: TransportEvent) {
        assert!(self.last_sink().emit(event).await);
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, sink: TransportEventSink) -> anyhow::Result<Box<dyn AudioTransport>> {
        if *self.fail.lock().unwrap() {
            anyhow::bail!("no audio device");
        }
        let generation = sink.generation();
        self.sinks.lock().unwrap().push(sink);
        Ok(Box::new(MockTransport {
            generation,
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct MockTransport {
    generation: u64,
    calls: Arc<Mutex<Vec<(u64, TransportCall)>>>,
}

impl MockTransport {
    fn push(&self, call: TransportCall) {
        self.calls.lock().unwrap().push((self.generation, call));
    }
}

impl AudioTransport for MockTransport {
    fn load(&mut self, url: &str) {
        self.push(TransportCall::Load(url.to_string()));
    }

    fn play(&mut self) {
        self.push(TransportCall::Play);
    }

    fn pause(&mut self) {
        self.push(TransportCall::Pause);
    }

    fn stop(&mut self) {
        self.push(TransportCall::Stop);
    }

    fn set_volume(&mut self, volume: f32) {
        self.push(TransportCall::Volume(volume));
    }

    fn is_external_output(&self) -> bool {
        false
    }
}

// ── now playing ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<NowPlaying>>,
}

impl RecordingSink {
    pub fn last(&self) -> Option<NowPlaying> {
        self.updates.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

impl NowPlayingSink for RecordingSink {
    fn update(&self, now_playing: NowPlaying) {
        self.updates.lock().unwrap().push(now_playing);
    }
}
