//! Local media capture
//!
//! Device capture is an external capability: it either yields local
//! tracks or fails, and failure is never fatal to joining a room.
//! Acquisition degrades from video+audio to audio-only to no media at
//! all; a participant with no local tracks still negotiates receive-only
//! sessions.

use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Microphone / inbound audio
    Audio,
    /// Camera / inbound video
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Observer-facing description of a local track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalTrackInfo {
    /// Track kind
    pub kind: TrackKind,

    /// Track identifier
    pub track_id: String,
}

/// One local capture track
#[derive(Clone)]
pub struct LocalTrack {
    /// Track kind
    pub kind: TrackKind,

    /// The sendable track handle
    pub track: Arc<TrackLocalStaticSample>,
}

/// Device capture capability
///
/// Implementations open one track of the requested kind or fail with a
/// `Capture` error (permission denied, no such device, hardware fault).
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Open a capture track of the given kind
    async fn open_track(&self, kind: TrackKind) -> Result<Arc<TrackLocalStaticSample>>;
}

/// Default capture device producing sample-fed tracks
///
/// Opus 48kHz stereo for audio and VP8 for video; the application feeds
/// encoded samples into the returned tracks.
#[derive(Debug, Default)]
pub struct SampleCapture;

#[async_trait]
impl CaptureDevice for SampleCapture {
    async fn open_track(&self, kind: TrackKind) -> Result<Arc<TrackLocalStaticSample>> {
        let id = uuid::Uuid::new_v4();

        let (capability, track_id) = match kind {
            TrackKind::Audio => (
                RTCRtpCodecCapability {
                    mime_type: "audio/opus".to_string(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
                format!("audio-{}", id),
            ),
            TrackKind::Video => (
                RTCRtpCodecCapability {
                    mime_type: "video/vp8".to_string(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
                format!("video-{}", id),
            ),
        };

        Ok(Arc::new(TrackLocalStaticSample::new(
            capability,
            track_id,
            format!("local-{}", id),
        )))
    }
}

/// The local participant's capture source
///
/// At most one exists per mesh lifetime; its tracks are pushed into every
/// existing and future peer session. Stopped exactly once on teardown.
pub struct LocalMediaSource {
    tracks: Vec<LocalTrack>,
    stopped: bool,
}

impl LocalMediaSource {
    /// Acquire local media with graceful degradation
    ///
    /// Tries the requested kinds independently: a failing camera degrades
    /// to audio-only, a failing microphone to no media. Never fails.
    pub async fn acquire(
        device: &dyn CaptureDevice,
        constraints: &crate::config::CaptureConstraints,
    ) -> Self {
        let mut tracks = Vec::new();

        if constraints.video {
            match device.open_track(TrackKind::Video).await {
                Ok(track) => tracks.push(LocalTrack {
                    kind: TrackKind::Video,
                    track,
                }),
                Err(e) => warn!("Video capture unavailable, degrading: {}", e),
            }
        }

        if constraints.audio {
            match device.open_track(TrackKind::Audio).await {
                Ok(track) => tracks.push(LocalTrack {
                    kind: TrackKind::Audio,
                    track,
                }),
                Err(e) => warn!("Audio capture unavailable, degrading: {}", e),
            }
        }

        if tracks.is_empty() {
            info!("No local media acquired, joining receive-only");
        }

        Self {
            tracks,
            stopped: false,
        }
    }

    /// Build a source from already-opened tracks
    pub fn from_tracks(tracks: Vec<LocalTrack>) -> Self {
        Self {
            tracks,
            stopped: false,
        }
    }

    /// All acquired tracks
    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    /// The track of a given kind, if acquired
    pub fn track(&self, kind: TrackKind) -> Option<&LocalTrack> {
        self.tracks.iter().find(|t| t.kind == kind)
    }

    /// Whether no tracks were acquired
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Observer-facing track descriptions
    pub fn track_info(&self) -> Vec<LocalTrackInfo> {
        use webrtc::track::track_local::TrackLocal;

        self.tracks
            .iter()
            .map(|t| LocalTrackInfo {
                kind: t.kind,
                track_id: t.track.id().to_string(),
            })
            .collect()
    }

    /// Stop capture and release the tracks; idempotent
    pub fn stop(&mut self) {
        if self.stopped {
            debug!("Local media already stopped");
            return;
        }

        info!("Stopping local media ({} tracks)", self.tracks.len());
        self.tracks.clear();
        self.stopped = true;
    }
}

impl fmt::Debug for LocalMediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMediaSource")
            .field("tracks", &self.track_info())
            .field("stopped", &self.stopped)
            .finish()
    }
}
