//! Playback: the session state machine and the seams it drives.
//!
//! A [`TransportFactory`] builds one [`AudioTransport`] per `play()`.  The
//! transport reports back through the [`TransportEventSink`] it was built
//! with; the sink stamps every event with the session generation that
//! created it, so events from a torn-down transport are recognisable and
//! dropped.

pub mod session;

use std::collections::HashMap;

use skywave_proto::metadata::{self, MetadataItem};
use skywave_proto::protocol::{NowPlaying, StreamMetadata};
use tokio::sync::mpsc;

pub use session::{PlaybackSession, SessionEvent, SuccessCallback};

/// Raw metadata in whichever shape the transport saw it.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataPayload {
    Items(Vec<MetadataItem>),
    Headers(HashMap<String, String>),
    Icy(String),
}

impl MetadataPayload {
    pub fn parse(&self) -> StreamMetadata {
        match self {
            MetadataPayload::Items(items) => metadata::parse_items(items),
            MetadataPayload::Headers(headers) => metadata::parse_headers(headers),
            MetadataPayload::Icy(raw) => metadata::parse_icy(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Audio is flowing.
    Ready,
    /// The stream could not be played or stopped unexpectedly.
    Failed(Option<String>),
    Metadata(MetadataPayload),
    /// Output moved to or from a wireless/external device.
    ExternalOutput(bool),
}

/// Where a transport sends its events.  Cloneable; every event carries the
/// generation of the session that created the transport.
#[derive(Debug, Clone)]
pub struct TransportEventSink {
    generation: u64,
    tx: mpsc::Sender<SessionEvent>,
}

impl TransportEventSink {
    pub fn new(generation: u64, tx: mpsc::Sender<SessionEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `false` once the session side is gone.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SessionEvent::Transport {
                generation: self.generation,
                event,
            })
            .await
            .is_ok()
    }
}

/// A streaming audio output.  Commands are fire-and-forget; outcomes arrive
/// as [`TransportEvent`]s.  Dropping the transport releases its event
/// subscription.
pub trait AudioTransport: Send + Sync {
    fn load(&mut self, url: &str);
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    /// `volume` in `0.0..=1.0`.
    fn set_volume(&mut self, volume: f32);
    fn is_external_output(&self) -> bool;
}

pub trait TransportFactory: Send + Sync {
    fn create(&self, sink: TransportEventSink) -> anyhow::Result<Box<dyn AudioTransport>>;
}

/// System "now playing" surface.  Must not block.
pub trait NowPlayingSink: Send + Sync {
    fn update(&self, now_playing: NowPlaying);
}
