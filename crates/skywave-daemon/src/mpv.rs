/// mpv-backed audio transport.
///
/// Architecture:
///
/// ```text
///   MpvTransportFactory ── WorkerCommand (mpsc) ──▶ worker task
///                                                     │ owns MpvDriver + MpvHandle
///                                                     │
///         MpvHandle ── writer_task ← requests, serialised → socket
///                   └─ reader_task ← JSON lines from socket
///                                      ├── response (request_id) → oneshot
///                                      └── event / property-change → worker
/// ```
///
/// One mpv process serves every session.  Each `MpvTransport` subscribes to
/// the worker when created and unsubscribes when dropped; only the current
/// subscriber receives events.  After a `loadfile`, events are ignored until
/// mpv reports `start-file`, so the tail of the previous stream is never
/// attributed to the new one.
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use skywave_proto::metadata::MetadataItem;

use crate::playback::{
    AudioTransport, MetadataPayload, TransportEvent, TransportEventSink, TransportFactory,
};

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

// ── observation property IDs ──────────────────────────────────────────────────

pub const OBS_CORE_IDLE: u64 = 1;
pub const OBS_METADATA: u64 = 2;
pub const OBS_AUDIO_DEVICE: u64 = 3;

/// Metadata keys forwarded as timed items.
const ITEM_KEYS: [&str; 4] = ["icy-title", "title", "artist", "StreamTitle"];
/// Metadata keys forwarded as ICY headers.
const HEADER_KEYS: [&str; 2] = ["icy-name", "icy-description"];

// ── internal channel types ────────────────────────────────────────────────────

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns `Some((obs_id, data))` if this is a property-change event.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    pub async fn load_stream(&self, url: &str) -> anyhow::Result<()> {
        self.send(json!(["loadfile", url, "replace"])).await?;
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.send(json!(["stop"])).await?;
        Ok(())
    }

    pub async fn set_volume(&self, vol: f32) -> anyhow::Result<()> {
        let vol_pct = (vol * 100.0).clamp(0.0, 100.0);
        self.send(json!(["set_property", "volume", vol_pct])).await?;
        Ok(())
    }

    pub async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }

    /// Register observe_property for every property the worker maps.
    /// Must be called after every fresh connection.
    pub async fn observe_all_properties(&self) {
        let props = [
            (OBS_CORE_IDLE, "core-idle"),
            (OBS_METADATA, "metadata"),
            (OBS_AUDIO_DEVICE, "audio-device"),
        ];
        for (id, name) in &props {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
    pub last_volume: f32,
}

impl MpvDriver {
    pub fn new(volume: f32) -> Self {
        Self {
            socket_name: skywave_proto::platform::mpv_socket_name(),
            process: None,
            last_volume: volume,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        if let Some(ref mut child) = self.process {
            child.try_wait().ok().flatten().is_none()
        } else {
            false
        }
    }

    /// Kill the process if running.
    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        #[cfg(unix)]
        let _ = tokio::fs::remove_file(&self.socket_name).await;

        info!("mpv: spawning new process");
        let mpv_binary = skywave_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let vol_arg = format!(
            "--volume={}",
            (self.last_volume * 100.0).clamp(0.0, 100.0).round() as i64
        );

        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(skywave_proto::platform::mpv_socket_arg())
            .arg("--quiet")
            .arg(vol_arg)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);

        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Some(handle) = self.try_connect(event_tx.clone()).await {
                info!("mpv: connected to IPC socket");
                return Ok(handle);
            }
        }
        anyhow::bail!("mpv IPC socket did not appear")
    }

    #[cfg(unix)]
    async fn try_connect(&self, event_tx: mpsc::Sender<MpvEvent>) -> Option<MpvHandle> {
        let stream = tokio::net::UnixStream::connect(&self.socket_name).await.ok()?;
        Some(start_io_tasks(stream, event_tx))
    }

    #[cfg(windows)]
    async fn try_connect(&self, event_tx: mpsc::Sender<MpvEvent>) -> Option<MpvHandle> {
        let pipe = tokio::net::windows::named_pipe::ClientOptions::new()
            .open(&self.socket_name)
            .ok()?;
        Some(start_io_tasks(pipe, event_tx))
    }
}

fn start_io_tasks<S>(stream: S, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let reader = BufReader::new(read_half);

    // pending map: req_id → reply channel.  Shared between writer (inserts) and reader (resolves).
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(reader, pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: PendingMap,
    event_tx: mpsc::Sender<MpvEvent>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC connection closed")));
                }
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"]
                                .as_str()
                                .unwrap_or("unknown error")
                                .to_string();
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    }
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC read error: {}", e)));
                }
                break;
            }
        }
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        {
            let mut map = pending.lock().await;
            map.insert(req.req_id, req.reply);
        }
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            let mut map = pending.lock().await;
            if let Some(tx) = map.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── event mapping ─────────────────────────────────────────────────────────────

/// True when the device name contains any configured marker.
pub fn is_external_device(device: &str, markers: &[String]) -> bool {
    let device = device.to_ascii_lowercase();
    markers
        .iter()
        .any(|m| !m.is_empty() && device.contains(&m.to_ascii_lowercase()))
}

/// Split mpv's `metadata` property into timed items and ICY headers.
pub fn metadata_payloads(data: &Value) -> Vec<MetadataPayload> {
    let Some(map) = data.as_object() else {
        return Vec::new();
    };
    let text = |key: &str| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .and_then(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
    };

    let headers: HashMap<String, String> = HEADER_KEYS.iter().filter_map(|k| text(k)).collect();
    let items: Vec<MetadataItem> = ITEM_KEYS
        .iter()
        .filter_map(|k| text(k))
        .map(|(k, v)| MetadataItem::new(k, v))
        .collect();

    // Headers first so a song title in the items overrides the station name.
    let mut payloads = Vec::new();
    if !headers.is_empty() {
        payloads.push(MetadataPayload::Headers(headers));
    }
    if !items.is_empty() {
        payloads.push(MetadataPayload::Items(items));
    }
    payloads
}

/// Transport event for an `end-file`, if it means the stream is lost.
pub fn end_file_event(raw: &Value) -> Option<TransportEvent> {
    match raw.get("reason").and_then(Value::as_str) {
        Some("error") => Some(TransportEvent::Failed(
            raw.get("file_error")
                .and_then(Value::as_str)
                .map(str::to_string),
        )),
        Some("eof") => Some(TransportEvent::Failed(Some("Stream ended".to_string()))),
        _ => None,
    }
}

// ── worker ────────────────────────────────────────────────────────────────────

enum WorkerCommand {
    Subscribe(TransportEventSink),
    Unsubscribe { generation: u64 },
    Load(String),
    SetPause(bool),
    SetVolume(f32),
    Stop,
}

struct Worker {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    mpv_event_tx: mpsc::Sender<MpvEvent>,
    subscriber: Option<TransportEventSink>,
    external_markers: Vec<String>,
    external: Arc<AtomicBool>,
    awaiting_start: bool,
    ready_sent: bool,
}

impl Worker {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<WorkerCommand>,
        mut mpv_event_rx: mpsc::Receiver<MpvEvent>,
    ) {
        info!("mpv worker: started");
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                Some(evt) = mpv_event_rx.recv() => self.handle_mpv_event(evt).await,
            }
        }
        info!("mpv worker: shutting down");
        self.driver.kill().await;
    }

    async fn ensure_connected(&mut self) -> anyhow::Result<MpvHandle> {
        if let Some(handle) = &self.handle {
            if self.driver.process_alive() {
                return Ok(handle.clone());
            }
            warn!("mpv worker: process died, respawning");
        }
        self.handle = None;
        let handle = self
            .driver
            .spawn_and_connect(self.mpv_event_tx.clone())
            .await?;
        handle.observe_all_properties().await;
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    async fn emit(&mut self, event: TransportEvent) {
        if let Some(sink) = &self.subscriber {
            let _ = sink.emit(event).await;
        }
    }

    async fn handle_command(&mut self, cmd: WorkerCommand) {
        match cmd {
            WorkerCommand::Subscribe(sink) => {
                debug!("mpv worker: subscriber gen={}", sink.generation());
                self.subscriber = Some(sink);
            }
            WorkerCommand::Unsubscribe { generation } => {
                if self.subscriber.as_ref().map(|s| s.generation()) == Some(generation) {
                    self.subscriber = None;
                }
            }
            WorkerCommand::Load(url) => {
                self.awaiting_start = true;
                self.ready_sent = false;
                let result = match self.ensure_connected().await {
                    Ok(handle) => {
                        let _ = handle.set_volume(self.driver.last_volume).await;
                        handle.load_stream(&url).await
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    warn!("mpv worker: load failed: {:#}", e);
                    self.handle = None;
                    self.emit(TransportEvent::Failed(Some(e.to_string()))).await;
                }
            }
            WorkerCommand::SetPause(paused) => {
                if let Some(handle) = &self.handle {
                    if let Err(e) = handle.set_pause(paused).await {
                        warn!("mpv worker: set pause failed: {}", e);
                    }
                }
            }
            WorkerCommand::SetVolume(volume) => {
                self.driver.last_volume = volume;
                if let Some(handle) = &self.handle {
                    if let Err(e) = handle.set_volume(volume).await {
                        warn!("mpv worker: set volume failed: {}", e);
                    }
                }
            }
            WorkerCommand::Stop => {
                self.awaiting_start = false;
                self.ready_sent = false;
                if let Some(handle) = &self.handle {
                    let _ = handle.stop().await;
                }
            }
        }
    }

    async fn handle_mpv_event(&mut self, evt: MpvEvent) {
        if evt.event_name() == Some("start-file") {
            self.awaiting_start = false;
            return;
        }

        if let Some((OBS_AUDIO_DEVICE, data)) = evt.as_property_change() {
            let external = data
                .as_str()
                .is_some_and(|d| is_external_device(d, &self.external_markers));
            if self.external.swap(external, Ordering::Relaxed) != external {
                self.emit(TransportEvent::ExternalOutput(external)).await;
            }
            return;
        }

        if self.awaiting_start || self.subscriber.is_none() {
            return;
        }

        if let Some((obs_id, data)) = evt.as_property_change() {
            match obs_id {
                OBS_CORE_IDLE => {
                    if data.as_bool() == Some(false) && !self.ready_sent {
                        self.ready_sent = true;
                        self.emit(TransportEvent::Ready).await;
                    }
                }
                OBS_METADATA => {
                    for payload in metadata_payloads(data) {
                        self.emit(TransportEvent::Metadata(payload)).await;
                    }
                }
                _ => {}
            }
        } else if evt.event_name() == Some("end-file") {
            if let Some(event) = end_file_event(&evt.raw) {
                self.emit(event).await;
            }
        }
    }
}

// ── transport ─────────────────────────────────────────────────────────────────

/// Builds `MpvTransport`s that share one background mpv worker.
pub struct MpvTransportFactory {
    cmd_tx: mpsc::UnboundedSender<WorkerCommand>,
    external: Arc<AtomicBool>,
}

impl MpvTransportFactory {
    /// Spawn the worker.  mpv itself starts on the first load.
    pub fn spawn(volume: f32, external_markers: Vec<String>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (mpv_event_tx, mpv_event_rx) = mpsc::channel(256);
        let external = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            driver: MpvDriver::new(volume),
            handle: None,
            mpv_event_tx,
            subscriber: None,
            external_markers,
            external: Arc::clone(&external),
            awaiting_start: false,
            ready_sent: false,
        };
        tokio::spawn(worker.run(cmd_rx, mpv_event_rx));

        Self { cmd_tx, external }
    }
}

impl TransportFactory for MpvTransportFactory {
    fn create(&self, sink: TransportEventSink) -> anyhow::Result<Box<dyn AudioTransport>> {
        let generation = sink.generation();
        self.cmd_tx
            .send(WorkerCommand::Subscribe(sink))
            .map_err(|_| anyhow::anyhow!("mpv worker is not running"))?;
        Ok(Box::new(MpvTransport {
            generation,
            cmd_tx: self.cmd_tx.clone(),
            external: Arc::clone(&self.external),
        }))
    }
}

pub struct MpvTransport {
    generation: u64,
    cmd_tx: mpsc::UnboundedSender<WorkerCommand>,
    external: Arc<AtomicBool>,
}

impl MpvTransport {
    fn send(&self, cmd: WorkerCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            warn!("mpv transport: worker gone");
        }
    }
}

impl AudioTransport for MpvTransport {
    fn load(&mut self, url: &str) {
        self.send(WorkerCommand::Load(url.to_string()));
    }

    fn play(&mut self) {
        self.send(WorkerCommand::SetPause(false));
    }

    fn pause(&mut self) {
        self.send(WorkerCommand::SetPause(true));
    }

    fn stop(&mut self) {
        self.send(WorkerCommand::Stop);
    }

    fn set_volume(&mut self, volume: f32) {
        self.send(WorkerCommand::SetVolume(volume.clamp(0.0, 1.0)));
    }

    fn is_external_output(&self) -> bool {
        self.external.load(Ordering::Relaxed)
    }
}

impl Drop for MpvTransport {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WorkerCommand::Unsubscribe {
            generation: self.generation,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_change_parsing() {
        let evt = MpvEvent {
            raw: json!({"event": "property-change", "id": OBS_CORE_IDLE, "data": false}),
        };
        let (id, data) = evt.as_property_change().unwrap();
        assert_eq!(id, OBS_CORE_IDLE);
        assert_eq!(data.as_bool(), Some(false));

        let evt = MpvEvent {
            raw: json!({"event": "start-file", "playlist_entry_id": 1}),
        };
        assert!(evt.as_property_change().is_none());
        assert_eq!(evt.event_name(), Some("start-file"));
    }

    #[test]
    fn test_metadata_payloads_headers_then_items() {
        let data = json!({
            "icy-name": "Radio One",
            "icy-genre": "Rock / Pop",
            "icy-title": "Band - Song",
        });
        let payloads = metadata_payloads(&data);
        assert_eq!(payloads.len(), 2);
        assert!(matches!(payloads[0], MetadataPayload::Headers(_)));
        assert_eq!(payloads[0].parse().title.as_deref(), Some("Radio One"));

        let song = payloads[1].parse();
        assert_eq!(song.title.as_deref(), Some("Band - Song"));
        assert!(metadata_payloads(&json!(null)).is_empty());
        assert!(metadata_payloads(&json!({"icy-genre": "x"})).is_empty());
    }

    #[test]
    fn test_end_file_reasons() {
        assert_eq!(
            end_file_event(&json!({"event": "end-file", "reason": "error", "file_error": "loading failed"})),
            Some(TransportEvent::Failed(Some("loading failed".into())))
        );
        assert_eq!(
            end_file_event(&json!({"event": "end-file", "reason": "eof"})),
            Some(TransportEvent::Failed(Some("Stream ended".into())))
        );
        assert_eq!(end_file_event(&json!({"event": "end-file", "reason": "stop"})), None);
        assert_eq!(end_file_event(&json!({"event": "end-file", "reason": "redirect"})), None);
    }

    #[test]
    fn test_external_device_markers() {
        let markers = vec!["airplay".to_string(), "bluez".to_string()];
        assert!(is_external_device("pulse/bluez_output.AA_BB.a2dp", &markers));
        assert!(is_external_device("coreaudio/AirPlay", &markers));
        assert!(!is_external_device("alsa/default", &markers));
        assert!(!is_external_device("anything", &[String::new()]));
    }
}
