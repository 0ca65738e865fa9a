use serde::{Deserialize, Serialize};

use crate::favorites::FavoriteEntry;
use crate::history::HistoryEntry;

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Clients check this on connect and can refuse to talk to an
/// incompatible daemon.
pub const PROTOCOL_VERSION: u32 = 1;

/// Page size used by the catalog unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Messages sent from a client to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    Play { station: Station },
    Pause,
    Resume,
    TogglePause,
    Stop,
    Volume { value: f32 },
    LoadTopClicked,
    Search { query: CatalogQuery },
    LoadCountry { code: String },
    LoadRegion { name: String },
    SearchWithinCountry { code: String, text: String },
    LoadMore,
    LoadCountries,
    LoadRegions { country_code: String },
    ToggleFavorite { station: Station },
    ClearHistory,
    GetState,
}

/// Messages sent from the daemon to clients (broadcasts)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: daemon version + full state snapshot.
    Hello {
        protocol_version: u32,
        daemon_rev: u64,
        state: DaemonState,
    },
    State {
        data: DaemonState,
    },
    NowPlaying {
        data: NowPlaying,
    },
    Log {
        message: String,
    },
    Error {
        message: String,
    },
}

/// A station as listed by the remote catalog.  Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Station {
    /// Opaque catalog identifier, stable across fetches.
    pub id: String,
    pub name: String,
    pub stream_url: String,
    #[serde(default)]
    pub homepage_url: Option<String>,
    #[serde(default)]
    pub favicon_url: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Comma separated free text, as the catalog reports it.
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub bitrate_kbps: Option<u32>,
}

impl Station {
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The stream URL if it is an absolute http(s) URL.
    pub fn playable_url(&self) -> Option<reqwest::Url> {
        let url = reqwest::Url::parse(self.stream_url.trim()).ok()?;
        matches!(url.scheme(), "http" | "https")
            .then_some(url)
            .filter(|u| u.host_str().is_some_and(|h| !h.is_empty()))
    }
}

/// Sort keys understood by the catalog search endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Name,
    Url,
    Homepage,
    Favicon,
    Tags,
    Country,
    State,
    Language,
    Votes,
    Codec,
    Bitrate,
    LastCheckOk,
    LastCheckTime,
    ClickTimestamp,
    ClickCount,
    ClickTrend,
    ChangeTimestamp,
    Random,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Name => "name",
            SortOrder::Url => "url",
            SortOrder::Homepage => "homepage",
            SortOrder::Favicon => "favicon",
            SortOrder::Tags => "tags",
            SortOrder::Country => "country",
            SortOrder::State => "state",
            SortOrder::Language => "language",
            SortOrder::Votes => "votes",
            SortOrder::Codec => "codec",
            SortOrder::Bitrate => "bitrate",
            SortOrder::LastCheckOk => "lastcheckok",
            SortOrder::LastCheckTime => "lastchecktime",
            SortOrder::ClickTimestamp => "clicktimestamp",
            SortOrder::ClickCount => "clickcount",
            SortOrder::ClickTrend => "clicktrend",
            SortOrder::ChangeTimestamp => "changetimestamp",
            SortOrder::Random => "random",
        }
    }
}

/// One catalog search request.  Built fresh per request and never mutated
/// after it is issued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogQuery {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub bitrate_min: Option<u32>,
    #[serde(default)]
    pub bitrate_max: Option<u32>,
    #[serde(default)]
    pub is_https: bool,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub reverse: bool,
    #[serde(default = "default_hide_broken")]
    pub hide_broken: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_hide_broken() -> bool {
    true
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self {
            name: None,
            country_code: None,
            language: None,
            tag: None,
            codec: None,
            bitrate_min: None,
            bitrate_max: None,
            is_https: false,
            order: SortOrder::default(),
            reverse: false,
            hide_broken: default_hide_broken(),
            limit: default_limit(),
            offset: 0,
        }
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl CatalogQuery {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// True when any filter differs from its default.  The name is not a
    /// filter.
    pub fn has_active_filters(&self) -> bool {
        is_set(&self.country_code)
            || is_set(&self.language)
            || is_set(&self.tag)
            || is_set(&self.codec)
            || self.bitrate_min.is_some()
            || self.bitrate_max.is_some()
            || self.is_https
            || self.order != SortOrder::Name
            || self.reverse
            || !self.hide_broken
    }

    /// True when the query would narrow the catalog at all.
    pub fn has_criteria(&self) -> bool {
        is_set(&self.name) || self.has_active_filters()
    }

    pub fn with_page(&self, limit: usize, offset: usize) -> Self {
        Self {
            limit,
            offset,
            ..self.clone()
        }
    }
}

/// The listing the catalog browser is currently paging through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", content = "value")]
pub enum LoadMode {
    TopClicked,
    Search(CatalogQuery),
    ByCountryCode(String),
    ByRegion(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "status", content = "data")]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading(Station),
    Playing(Station),
    Paused(Station),
    Failed { station: Station, error: String },
}

impl PlaybackState {
    pub fn station(&self) -> Option<&Station> {
        match self {
            PlaybackState::Idle => None,
            PlaybackState::Loading(s) | PlaybackState::Playing(s) | PlaybackState::Paused(s) => {
                Some(s)
            }
            PlaybackState::Failed { station, .. } => Some(station),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, PlaybackState::Loading(_))
    }

    /// Short label for logs and status lines.
    pub fn label(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading(_) => "loading",
            PlaybackState::Playing(_) => "playing",
            PlaybackState::Paused(_) => "paused",
            PlaybackState::Failed { .. } => "failed",
        }
    }
}

/// Live "now playing" text extracted from the stream.  Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StreamMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
}

impl StreamMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.artist.is_none()
    }

    /// Overwrite the fields present in `update`, keep the rest.
    pub fn merge(&mut self, update: StreamMetadata) {
        if update.title.is_some() {
            self.title = update.title;
        }
        if update.artist.is_some() {
            self.artist = update.artist;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CountryEntry {
    pub name: String,
    /// ISO 3166-1 alpha-2.  `None` disables browsing by country.
    pub code: Option<String>,
    pub station_count: u32,
    #[serde(default)]
    pub is_local: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionEntry {
    pub name: String,
    pub country_code: String,
    pub station_count: u32,
}

/// Payload for the system "now playing" surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NowPlaying {
    pub station: Option<Station>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub is_playing: bool,
}

impl NowPlaying {
    pub fn headline(&self) -> Option<&str> {
        self.station.as_ref().map(|s| s.name.as_str())
    }

    /// Stream artist, else the station's country name, else its raw code.
    pub fn display_artist(&self) -> Option<String> {
        if let Some(artist) = &self.artist {
            return Some(artist.clone());
        }
        let code = self.station.as_ref()?.country_code.as_deref()?;
        crate::country::region_name(code)
            .map(str::to_string)
            .or_else(|| Some(code.to_string()))
    }

    pub fn album_line(&self) -> Option<&str> {
        self.station.as_ref()?.tags.as_deref()
    }
}

/// Catalog browser view as published to clients.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogSnapshot {
    pub mode: Option<LoadMode>,
    pub stations: Vec<Station>,
    pub has_more: bool,
    pub is_loading: bool,
    pub is_loading_more: bool,
    pub error: Option<String>,
    pub countries: Vec<CountryEntry>,
    pub regions: Vec<RegionEntry>,
    pub selected_country: Option<String>,
    pub selected_region: Option<String>,
}

/// Full state of the daemon.  `rev` is a monotonically increasing counter
/// incremented every time the state changes.  Clients can use it to detect
/// missed updates and request a resync.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DaemonState {
    /// Monotonic revision counter, incremented on every state change.
    #[serde(default)]
    pub rev: u64,
    pub playback: PlaybackState,
    pub metadata: StreamMetadata,
    pub volume: f32,
    #[serde(default)]
    pub external_output: bool,
    #[serde(default)]
    pub playback_error: Option<String>,
    #[serde(default)]
    pub catalog: CatalogSnapshot,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub favorites: Vec<FavoriteEntry>,
}

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}
