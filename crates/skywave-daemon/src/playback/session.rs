//! Playback session state machine.
//!
//! ```text
//!   Idle ──play──▶ Loading ──Ready──▶ Playing ◀──resume── Paused
//!                     │                  │  └────pause────▶  │
//!                     │                  │                   │
//!                     └──────Failed──────┴───────Failed──────┘
//!                                 any ──stop──▶ Idle
//! ```
//!
//! The session owns at most one transport.  `play()` tears the previous one
//! down before building the next, and `stop()` bumps the generation so that
//! late transport events and grace timers from the old session are ignored.
//!
//! The success callback handed to `play()` runs only after the session has
//! stayed in `Playing` for the grace delay following the transport's ready
//! signal.  Pausing, failing or stopping first discards it.

use std::sync::Arc;
use std::time::Duration;

use skywave_proto::protocol::{NowPlaying, PlaybackState, Station, StreamMetadata};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::{
    AudioTransport, NowPlayingSink, TransportEvent, TransportEventSink, TransportFactory,
};
use crate::catalog::CatalogClient;
use crate::error::PlaybackError;

const DEFAULT_FAILURE: &str = "Playback failed";

/// Runs once, with the station, when playback is confirmed.
pub type SuccessCallback = Box<dyn FnOnce(Station) + Send + Sync>;

/// Inputs the session's owner feeds back through `handle_event`.
#[derive(Debug)]
pub enum SessionEvent {
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    GraceElapsed {
        generation: u64,
    },
}

pub struct PlaybackSession {
    factory: Arc<dyn TransportFactory>,
    catalog: Arc<dyn CatalogClient>,
    now_playing: Arc<dyn NowPlayingSink>,
    events: mpsc::Sender<SessionEvent>,
    grace_delay: Duration,

    state: PlaybackState,
    metadata: StreamMetadata,
    volume: f32,
    external_output: bool,
    error: Option<String>,

    transport: Option<Box<dyn AudioTransport>>,
    generation: u64,
    on_success: Option<SuccessCallback>,
    grace_timer: Option<AbortHandle>,
}

impl PlaybackSession {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        catalog: Arc<dyn CatalogClient>,
        now_playing: Arc<dyn NowPlayingSink>,
        events: mpsc::Sender<SessionEvent>,
        grace_delay: Duration,
        volume: f32,
    ) -> Self {
        Self {
            factory,
            catalog,
            now_playing,
            events,
            grace_delay,
            state: PlaybackState::Idle,
            metadata: StreamMetadata::default(),
            volume: volume.clamp(0.0, 1.0),
            external_output: false,
            error: None,
            transport: None,
            generation: 0,
            on_success: None,
            grace_timer: None,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn external_output(&self) -> bool {
        self.external_output
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Start playing `station`.
    ///
    /// An unusable stream URL leaves the current session untouched apart
    /// from the error message.  Transport failures are reported through the
    /// state, not the return value.
    pub fn play(
        &mut self,
        station: Station,
        on_success: Option<SuccessCallback>,
    ) -> Result<(), PlaybackError> {
        let Some(url) = station.playable_url() else {
            warn!("playback: invalid stream url {:?} for {}", station.stream_url, station.name);
            self.error = Some(PlaybackError::InvalidStreamUrl.to_string());
            return Err(PlaybackError::InvalidStreamUrl);
        };

        self.teardown();
        info!("playback: loading {} ({})", station.name, url);
        self.state = PlaybackState::Loading(station.clone());

        let sink = TransportEventSink::new(self.generation, self.events.clone());
        match self.factory.create(sink) {
            Ok(mut transport) => {
                transport.set_volume(self.volume);
                transport.load(url.as_str());
                transport.play();
                self.external_output = transport.is_external_output();
                self.transport = Some(transport);
                self.on_success = on_success;
            }
            Err(e) => {
                warn!("playback: no transport: {:#}", e);
                let message = PlaybackError::Transport(e.to_string()).to_string();
                self.error = Some(message.clone());
                self.state = PlaybackState::Failed {
                    station: station.clone(),
                    error: message,
                };
            }
        }

        let catalog = Arc::clone(&self.catalog);
        let station_id = station.id.clone();
        tokio::spawn(async move {
            if let Err(e) = catalog.record_interaction(&station_id).await {
                debug!("playback: interaction for {} not recorded: {}", station_id, e);
            }
        });

        self.notify();
        Ok(())
    }

    pub fn pause(&mut self) {
        let station = match &self.state {
            PlaybackState::Loading(s) | PlaybackState::Playing(s) => s.clone(),
            _ => return,
        };
        debug!("playback: pause");
        self.cancel_grace();
        self.on_success = None;
        if let Some(t) = self.transport.as_mut() {
            t.pause();
        }
        self.state = PlaybackState::Paused(station);
        self.notify();
    }

    /// Resume without a grace delay.  The success callback is not revived.
    pub fn resume(&mut self) {
        let PlaybackState::Paused(station) = &self.state else {
            return;
        };
        debug!("playback: resume");
        let station = station.clone();
        if let Some(t) = self.transport.as_mut() {
            t.play();
        }
        self.state = PlaybackState::Playing(station);
        self.notify();
    }

    pub fn toggle_pause(&mut self) {
        match self.state {
            PlaybackState::Paused(_) => self.resume(),
            PlaybackState::Loading(_) | PlaybackState::Playing(_) => self.pause(),
            _ => {}
        }
    }

    pub fn stop(&mut self) {
        let was_idle = matches!(self.state, PlaybackState::Idle) && self.transport.is_none();
        self.teardown();
        if !was_idle {
            info!("playback: stopped");
            self.notify();
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(t) = self.transport.as_mut() {
            t.set_volume(self.volume);
        }
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport { generation, event } => {
                if generation != self.generation || self.transport.is_none() {
                    debug!("playback: dropping stale transport event {:?}", event);
                    return;
                }
                self.handle_transport_event(event);
            }
            SessionEvent::GraceElapsed { generation } => {
                if generation != self.generation {
                    return;
                }
                self.grace_timer = None;
                if let PlaybackState::Playing(station) = &self.state {
                    if let Some(callback) = self.on_success.take() {
                        info!("playback: confirmed {}", station.name);
                        callback(station.clone());
                    }
                }
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Ready => {
                let PlaybackState::Loading(station) = &self.state else {
                    return;
                };
                let station = station.clone();
                info!("playback: playing {}", station.name);
                self.state = PlaybackState::Playing(station);
                self.error = None;
                if self.on_success.is_some() {
                    self.start_grace_timer();
                }
                self.notify();
            }
            TransportEvent::Failed(message) => {
                let Some(station) = self.state.station().cloned() else {
                    return;
                };
                if matches!(self.state, PlaybackState::Failed { .. }) {
                    return;
                }
                let message = message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE.to_string());
                warn!("playback: {} failed: {}", station.name, message);
                self.cancel_grace();
                self.on_success = None;
                if let Some(mut t) = self.transport.take() {
                    t.stop();
                }
                self.error = Some(message.clone());
                self.state = PlaybackState::Failed {
                    station,
                    error: message,
                };
                self.notify();
            }
            TransportEvent::Metadata(payload) => {
                let update = payload.parse();
                if update.is_empty() {
                    return;
                }
                debug!("playback: metadata {:?}", update);
                self.metadata.merge(update);
                self.notify();
            }
            TransportEvent::ExternalOutput(external) => {
                if external != self.external_output {
                    debug!("playback: external output {}", external);
                    self.external_output = external;
                }
            }
        }
    }

    fn start_grace_timer(&mut self) {
        self.cancel_grace();
        let events = self.events.clone();
        let generation = self.generation;
        let delay = self.grace_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SessionEvent::GraceElapsed { generation }).await;
        });
        self.grace_timer = Some(handle.abort_handle());
    }

    fn cancel_grace(&mut self) {
        if let Some(timer) = self.grace_timer.take() {
            timer.abort();
        }
    }

    /// Back to `Idle` without notifying.
    fn teardown(&mut self) {
        self.generation += 1;
        self.cancel_grace();
        self.on_success = None;
        if let Some(mut transport) = self.transport.take() {
            transport.stop();
        }
        self.state = PlaybackState::Idle;
        self.metadata = StreamMetadata::default();
        self.external_output = false;
        self.error = None;
    }

    fn notify(&self) {
        self.now_playing.update(NowPlaying {
            station: self.state.station().cloned(),
            title: self.metadata.title.clone(),
            artist: self.metadata.artist.clone(),
            is_playing: self.state.is_playing(),
        });
    }
}
