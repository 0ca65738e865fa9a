pub mod catalog;
pub mod core;
pub mod error;
pub mod mpv;
pub mod playback;
pub mod socket;

use skywave_proto::protocol::NowPlaying;

#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    StateUpdated,
    NowPlaying(NowPlaying),
    Log(String),
    /// A user-facing failure that is not part of the state snapshot.
    Error(String),
}
