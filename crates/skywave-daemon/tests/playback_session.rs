mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{station, MockCatalog, MockTransportFactory, RecordingSink, TransportCall};
use skywave_daemon::catalog::CatalogClient;
use skywave_daemon::error::PlaybackError;
use skywave_daemon::playback::{
    MetadataPayload, PlaybackSession, SessionEvent, SuccessCallback, TransportEvent,
};
use skywave_proto::protocol::{PlaybackState, Station};
use tokio::sync::mpsc;

const GRACE: Duration = Duration::from_secs(2);

struct Harness {
    session: PlaybackSession,
    rx: mpsc::Receiver<SessionEvent>,
    factory: Arc<MockTransportFactory>,
    catalog: Arc<MockCatalog>,
    sink: Arc<RecordingSink>,
    confirmed: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new() -> Self {
        let factory = Arc::new(MockTransportFactory::new());
        let catalog = Arc::new(MockCatalog::new(Vec::new()));
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::channel(32);
        let session = PlaybackSession::new(
            factory.clone(),
            catalog.clone() as Arc<dyn CatalogClient>,
            sink.clone(),
            tx,
            GRACE,
            0.5,
        );
        Self {
            session,
            rx,
            factory,
            catalog,
            sink,
            confirmed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn callback(&self) -> SuccessCallback {
        let confirmed = self.confirmed.clone();
        Box::new(move |s: Station| confirmed.lock().unwrap().push(s.id))
    }

    fn play(&mut self, station: Station) -> Result<(), PlaybackError> {
        let callback = self.callback();
        self.session.play(station, Some(callback))
    }

    /// Feed the next queued event into the session.
    async fn pump(&mut self) {
        let event = self.rx.recv().await.expect("session event");
        self.session.handle_event(event);
    }

    /// Emit `event` from the newest transport and apply it.
    async fn transport(&mut self, event: TransportEvent) {
        self.factory.emit_last(event).await;
        self.pump().await;
    }

    fn confirmed(&self) -> Vec<String> {
        self.confirmed.lock().unwrap().clone()
    }
}

#[tokio::test(start_paused = true)]
async fn test_success_callback_after_grace() {
    let mut h = Harness::new();
    h.play(station("a")).unwrap();
    assert!(matches!(h.session.state(), PlaybackState::Loading(s) if s.id == "a"));

    h.transport(TransportEvent::Ready).await;
    assert!(matches!(h.session.state(), PlaybackState::Playing(s) if s.id == "a"));
    assert!(h.confirmed().is_empty());

    // Nothing before the grace delay has passed.
    let early = tokio::time::timeout(GRACE - Duration::from_millis(100), h.rx.recv()).await;
    assert!(early.is_err());
    assert!(h.confirmed().is_empty());

    h.pump().await;
    assert_eq!(h.confirmed(), vec!["a".to_string()]);

    // A repeated ready signal does not re-arm the callback.
    h.transport(TransportEvent::Ready).await;
    let again = tokio::time::timeout(GRACE * 2, h.rx.recv()).await;
    assert!(again.is_err());
    assert_eq!(h.confirmed().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_switching_station_discards_previous_callback() {
    let mut h = Harness::new();
    h.play(station("a")).unwrap();
    h.transport(TransportEvent::Ready).await;
    let old_generation = h.session.generation();

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.play(station("b")).unwrap();
    assert_ne!(h.session.generation(), old_generation);

    // A late timer from the first session is ignored.
    h.session
        .handle_event(SessionEvent::GraceElapsed { generation: old_generation });
    assert!(h.confirmed().is_empty());

    h.transport(TransportEvent::Ready).await;
    h.pump().await;
    assert_eq!(h.confirmed(), vec!["b".to_string()]);

    // The first transport was stopped before the second was built.
    let calls = h.factory.calls();
    let stop_a = calls
        .iter()
        .position(|(g, c)| *g == old_generation && *c == TransportCall::Stop)
        .expect("first transport stopped");
    let load_b = calls
        .iter()
        .position(|(g, c)| *g != old_generation && matches!(c, TransportCall::Load(_)))
        .expect("second transport loaded");
    assert!(stop_a < load_b);
}

#[tokio::test(start_paused = true)]
async fn test_stop_ignores_late_transport_events() {
    let mut h = Harness::new();
    h.play(station("a")).unwrap();
    let old_sink = h.factory.last_sink();

    h.session.stop();
    assert_eq!(h.session.state(), &PlaybackState::Idle);
    assert!(!h.session.has_transport());

    assert!(old_sink.emit(TransportEvent::Ready).await);
    h.pump().await;
    assert_eq!(h.session.state(), &PlaybackState::Idle);

    let late = tokio::time::timeout(GRACE * 2, h.rx.recv()).await;
    assert!(late.is_err());
    assert!(h.confirmed().is_empty());
    assert!(!h.sink.last().unwrap().is_playing);
}

#[tokio::test(start_paused = true)]
async fn test_failure_discards_callback() {
    let mut h = Harness::new();
    h.play(station("a")).unwrap();
    h.transport(TransportEvent::Ready).await;
    h.transport(TransportEvent::Failed(None)).await;

    match h.session.state() {
        PlaybackState::Failed { station, error } => {
            assert_eq!(station.id, "a");
            assert_eq!(error, "Playback failed");
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(h.session.error(), Some("Playback failed"));
    assert!(!h.session.has_transport());

    let late = tokio::time::timeout(GRACE * 2, h.rx.recv()).await;
    assert!(late.is_err());
    assert!(h.confirmed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failure_message_from_transport() {
    let mut h = Harness::new();
    h.play(station("a")).unwrap();
    h.transport(TransportEvent::Failed(Some("Connection refused".into())))
        .await;
    assert_eq!(h.session.error(), Some("Connection refused"));
    assert!(matches!(h.session.state(), PlaybackState::Failed { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_pause_before_grace_discards_callback() {
    let mut h = Harness::new();
    h.play(station("a")).unwrap();
    h.transport(TransportEvent::Ready).await;

    h.session.pause();
    assert!(matches!(h.session.state(), PlaybackState::Paused(_)));
    h.session.resume();
    assert!(matches!(h.session.state(), PlaybackState::Playing(_)));

    let late = tokio::time::timeout(GRACE * 2, h.rx.recv()).await;
    assert!(late.is_err());
    assert!(h.confirmed().is_empty());

    let pauses: Vec<_> = h
        .factory
        .calls()
        .into_iter()
        .map(|(_, c)| c)
        .filter(|c| matches!(c, TransportCall::Pause | TransportCall::Play))
        .collect();
    assert_eq!(
        pauses,
        vec![TransportCall::Play, TransportCall::Pause, TransportCall::Play]
    );
}

#[tokio::test(start_paused = true)]
async fn test_toggle_pause() {
    let mut h = Harness::new();
    h.session.toggle_pause();
    assert_eq!(h.session.state(), &PlaybackState::Idle);

    h.play(station("a")).unwrap();
    h.transport(TransportEvent::Ready).await;
    h.session.toggle_pause();
    assert!(matches!(h.session.state(), PlaybackState::Paused(_)));
    h.session.toggle_pause();
    assert!(matches!(h.session.state(), PlaybackState::Playing(_)));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_url_leaves_session() {
    let mut h = Harness::new();
    h.play(station("a")).unwrap();
    let generation = h.session.generation();

    let mut broken = station("bad");
    broken.stream_url = "not a url".into();
    assert_eq!(h.play(broken), Err(PlaybackError::InvalidStreamUrl));

    assert!(matches!(h.session.state(), PlaybackState::Loading(s) if s.id == "a"));
    assert_eq!(h.session.generation(), generation);
    assert_eq!(h.session.error(), Some("Invalid station URL"));
    assert_eq!(h.factory.created(), 1);

    let mut ftp = station("ftp");
    ftp.stream_url = "ftp://example.com/stream".into();
    assert!(h.play(ftp).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_transport_creation_failure() {
    let mut h = Harness::new();
    h.factory.fail_create(true);
    assert!(h.play(station("a")).is_ok());
    assert!(matches!(h.session.state(), PlaybackState::Failed { .. }));
    assert_eq!(h.session.error(), Some("no audio device"));
}

#[tokio::test(start_paused = true)]
async fn test_metadata_merges_and_notifies() {
    let mut h = Harness::new();
    h.play(station("a")).unwrap();
    h.transport(TransportEvent::Ready).await;

    h.transport(TransportEvent::Metadata(MetadataPayload::Icy(
        "StreamTitle='Massive Attack - Teardrop';".into(),
    )))
    .await;
    assert_eq!(h.session.metadata().artist.as_deref(), Some("Massive Attack"));
    assert_eq!(h.session.metadata().title.as_deref(), Some("Teardrop"));

    let headers = HashMap::from([("icy-genre".to_string(), "trip hop".to_string())]);
    let before = h.sink.count();
    h.transport(TransportEvent::Metadata(MetadataPayload::Headers(headers)))
        .await;
    assert_eq!(h.sink.count(), before, "empty updates are not published");

    let now = h.sink.last().unwrap();
    assert_eq!(now.title.as_deref(), Some("Teardrop"));
    assert!(now.is_playing);
    assert_eq!(now.station.map(|s| s.id).as_deref(), Some("a"));
}

#[tokio::test(start_paused = true)]
async fn test_play_records_interaction_and_applies_volume() {
    let mut h = Harness::new();
    h.session.set_volume(1.5);
    assert!((h.session.volume() - 1.0).abs() < f32::EPSILON);

    h.play(station("a")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(h
        .catalog
        .calls()
        .contains(&common::CatalogCall::Interaction("a".into())));
    let calls: Vec<_> = h.factory.calls().into_iter().map(|(_, c)| c).collect();
    assert_eq!(
        calls,
        vec![
            TransportCall::Volume(1.0),
            TransportCall::Load("http://stream.example.com/a".into()),
            TransportCall::Play,
        ]
    );
}
