/// DaemonCore: single-owner event loop for all mutable state.
///
/// All tasks that need to change playback, catalog, history or favourites
/// send `DaemonEvent` messages to this loop.  DaemonCore owns the
/// `PlaybackSession`, the `CatalogBrowser` and both stores exclusively; no
/// other task touches them.  Background work (catalog fetches, transport
/// events, grace timers) reports back over the session and browser channels,
/// which the loop drains alongside client events.  Playback confirmations
/// arrive on their own unbounded channel so a busy client queue never drops
/// a history entry.
///
/// After each event DaemonCore republishes the snapshot through the
/// `StateManager` and broadcasts `BroadcastMessage::StateUpdated`.
use std::sync::Arc;
use std::time::Duration;

use skywave_proto::config::Config;
use skywave_proto::favorites::FavoritesStore;
use skywave_proto::history::HistoryStore;
use skywave_proto::protocol::{Command, NowPlaying, Station};
use skywave_proto::state::StateManager;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::catalog::{BrowserEvent, CatalogBrowser, CatalogClient};
use crate::playback::{
    NowPlayingSink, PlaybackSession, SessionEvent, SuccessCallback, TransportFactory,
};
use crate::BroadcastMessage;

// ── DaemonEvent ───────────────────────────────────────────────────────────────

/// All inputs into the DaemonCore loop.
#[derive(Debug)]
pub enum DaemonEvent {
    /// A command from a socket client.
    ClientCommand(Command),
    /// Shutdown requested.
    Shutdown,
}

/// Forwards now-playing updates to every connected client.
pub struct BroadcastNowPlayingSink {
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl BroadcastNowPlayingSink {
    pub fn new(broadcast_tx: broadcast::Sender<BroadcastMessage>) -> Self {
        Self { broadcast_tx }
    }
}

impl NowPlayingSink for BroadcastNowPlayingSink {
    fn update(&self, now_playing: NowPlaying) {
        debug!(
            "now playing: {} | {} | {}",
            now_playing.headline().unwrap_or("-"),
            now_playing.display_artist().as_deref().unwrap_or("-"),
            now_playing.album_line().unwrap_or("-")
        );
        // No receivers is fine.
        let _ = self
            .broadcast_tx
            .send(BroadcastMessage::NowPlaying(now_playing));
    }
}

// ── DaemonCore ────────────────────────────────────────────────────────────────

pub struct DaemonCore {
    state_manager: Arc<StateManager>,
    session: PlaybackSession,
    browser: CatalogBrowser,
    history: HistoryStore,
    favorites: FavoritesStore,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    /// Success callbacks report confirmed stations here.
    confirm_tx: mpsc::UnboundedSender<Station>,
    confirm_rx: Option<mpsc::UnboundedReceiver<Station>>,
    session_rx: Option<mpsc::Receiver<SessionEvent>>,
    browser_rx: Option<mpsc::Receiver<BrowserEvent>>,
}

impl DaemonCore {
    pub async fn new(
        config: &Config,
        catalog: Arc<dyn CatalogClient>,
        factory: Arc<dyn TransportFactory>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
    ) -> anyhow::Result<Self> {
        let state_manager = Arc::new(StateManager::new(
            config.daemon.state_file.clone(),
            config.playback.default_volume,
        ));
        let volume = state_manager.volume().await;

        let (session_tx, session_rx) = mpsc::channel(256);
        let (browser_tx, browser_rx) = mpsc::channel(64);
        let (confirm_tx, confirm_rx) = mpsc::unbounded_channel();

        let session = PlaybackSession::new(
            factory,
            Arc::clone(&catalog),
            Arc::new(BroadcastNowPlayingSink::new(broadcast_tx.clone())),
            session_tx,
            Duration::from_millis(config.playback.grace_delay_ms),
            volume,
        );
        let browser = CatalogBrowser::new(
            catalog,
            browser_tx,
            config.catalog.page_size,
            config.catalog.local_country(),
        );

        let history = HistoryStore::open(config.daemon.history_file.clone());
        let favorites = FavoritesStore::open(config.daemon.favorites_file.clone());
        info!(
            "DaemonCore: {} history entries, {} favourites",
            history.len(),
            favorites.entries().len()
        );

        Ok(Self {
            state_manager,
            session,
            browser,
            history,
            favorites,
            broadcast_tx,
            confirm_tx,
            confirm_rx: Some(confirm_rx),
            session_rx: Some(session_rx),
            browser_rx: Some(browser_rx),
        })
    }

    /// Borrow the state manager (for use by the socket server).
    pub fn state_manager(&self) -> Arc<StateManager> {
        Arc::clone(&self.state_manager)
    }

    /// Run the core event loop.  Returns when a `Shutdown` event is received
    /// or the event channel is closed.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<DaemonEvent>) -> anyhow::Result<()> {
        let mut session_rx = self
            .session_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("DaemonCore already running"))?;
        let mut browser_rx = self
            .browser_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("DaemonCore already running"))?;
        let mut confirm_rx = self
            .confirm_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("DaemonCore already running"))?;

        info!("DaemonCore: starting event loop");
        self.browser.load_countries();
        self.browser.load_top_clicked();
        self.publish().await;

        loop {
            tokio::select! {
                evt = event_rx.recv() => match evt {
                    None => {
                        info!("DaemonCore: event channel closed, shutting down");
                        break;
                    }
                    Some(DaemonEvent::Shutdown) => {
                        info!("DaemonCore: shutdown requested");
                        break;
                    }
                    Some(DaemonEvent::ClientCommand(cmd)) => {
                        info!("DaemonCore: command {:?}", cmd);
                        if let Err(e) = self.handle_command(cmd).await {
                            error!("DaemonCore: command error: {:#}", e);
                        }
                    }
                },
                Some(station) = confirm_rx.recv() => {
                    self.record_history(station).await;
                }
                Some(evt) = session_rx.recv() => {
                    self.session.handle_event(evt);
                }
                Some(evt) = browser_rx.recv() => {
                    self.browser.handle_event(evt);
                }
            }
            self.publish().await;
        }

        self.session.stop();
        self.save_stores().await;
        Ok(())
    }

    async fn handle_command(&mut self, cmd: Command) -> anyhow::Result<()> {
        match cmd {
            Command::Play { station } => {
                let confirmed = self.confirm_tx.clone();
                let on_success: SuccessCallback = Box::new(move |station: Station| {
                    // Only fails once the loop has exited.
                    if confirmed.send(station).is_err() {
                        warn!("DaemonCore: playback confirmed after shutdown");
                    }
                });
                if let Err(e) = self.session.play(station, Some(on_success)) {
                    self.report_error(e.to_string());
                }
            }
            Command::Pause => self.session.pause(),
            Command::Resume => self.session.resume(),
            Command::TogglePause => self.session.toggle_pause(),
            Command::Stop => self.session.stop(),
            Command::Volume { value } => {
                self.session.set_volume(value);
                self.state_manager.set_volume(self.session.volume()).await?;
            }
            Command::LoadTopClicked => self.browser.load_top_clicked(),
            Command::Search { query } => self.browser.search(query),
            Command::LoadCountry { code } => {
                if !self.browser.load_by_country_code(&code) {
                    self.report_error(format!("Unknown country: {}", code.trim()));
                }
            }
            Command::LoadRegion { name } => {
                self.browser.load_by_region(&name);
            }
            Command::SearchWithinCountry { code, text } => {
                if !self.browser.search_within_country(&code, &text) {
                    self.report_error(format!("Unknown country: {}", code.trim()));
                }
            }
            Command::LoadMore => {
                if !self.browser.load_more() {
                    debug!("DaemonCore: load more ignored");
                }
            }
            Command::LoadCountries => self.browser.load_countries(),
            Command::LoadRegions { country_code } => {
                if !self.browser.load_regions(&country_code) {
                    self.report_error(format!("Unknown country: {}", country_code.trim()));
                }
            }
            Command::ToggleFavorite { station } => {
                let name = station.name.clone();
                let added = self.favorites.toggle(station);
                info!(
                    "DaemonCore: {} favourite {}",
                    if added { "added" } else { "removed" },
                    name
                );
                self.favorites.save().await?;
            }
            Command::ClearHistory => {
                self.history.clear();
                self.history.save().await?;
            }
            Command::GetState => {}
        }
        Ok(())
    }

    async fn record_history(&mut self, station: Station) {
        info!("DaemonCore: recording {} in history", station.name);
        self.history.record(station);
        if let Err(e) = self.history.save().await {
            warn!("DaemonCore: failed to save history: {:#}", e);
        }
    }

    fn report_error(&self, message: String) {
        warn!("DaemonCore: {}", message);
        let _ = self.broadcast_tx.send(BroadcastMessage::Error(message));
    }

    /// Copy the owned state into the shared snapshot and tell the clients.
    async fn publish(&mut self) {
        let session = &self.session;
        let catalog = self.browser.snapshot();
        let history = self.history.entries();
        let favorites = self.favorites.entries();
        self.state_manager
            .update(|s| {
                s.playback = session.state().clone();
                s.metadata = session.metadata().clone();
                s.volume = session.volume();
                s.external_output = session.external_output();
                s.playback_error = session.error().map(str::to_string);
                s.catalog = catalog;
                s.history = history;
                s.favorites = favorites;
            })
            .await;
        let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
    }

    async fn save_stores(&mut self) {
        if let Err(e) = self.history.save().await {
            warn!("DaemonCore: failed to save history: {:#}", e);
        }
        if let Err(e) = self.favorites.save().await {
            warn!("DaemonCore: failed to save favourites: {:#}", e);
        }
    }
}
