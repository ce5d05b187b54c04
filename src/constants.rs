//! Compile-time capacities and protocol timeouts.

use embassy_time::Duration;

/// Maximum number of peers per role registry.
///
/// Peer ids are allocated in `[0, MAX_AV_PEERS)`; must be a power of two
/// because it doubles as the `FnvIndexMap` capacity.
pub const MAX_AV_PEERS: usize = 8;

/// Default upper bound on simultaneously connecting/connected peers.
pub const DEFAULT_MAX_CONNECTED_PEERS: usize = 1;

/// Depth of the API request/response channels.
pub const MAX_API_REQUESTS: usize = 4;

/// Depth of the inbound transport event channel.
pub const MAX_PENDING_EVENTS: usize = 8;

/// Depth of the decoded media frame channel.
pub const MAX_PENDING_FRAMES: usize = 8;

/// Maximum number of codec preference entries carried through the API.
pub const MAX_CODEC_PREFERENCES: usize = 8;

/// Maximum payload size of an AVRCP meta message buffer.
pub const MAX_META_DATA: usize = 512;

/// Maximum size of one decoded media frame.
pub const MAX_MEDIA_FRAME_BYTES: usize = 1024;

/// Maximum follow-up actions a single state-machine step may emit.
pub const MAX_FOLLOW_UPS: usize = 4;

/// Maximum chain of synthesized events processed for one inbound event.
pub const MAX_EVENT_BURST: usize = 8;

/// Delay before upgrading an AVRCP-only connection to a full AV connection.
pub const OPEN_ON_RC_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on waiting for the audio session to finish shutting down.
pub const AUDIO_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Service name registered with the transport for the Source role.
pub const SOURCE_SERVICE_NAME: &str = "Advanced Audio Source";

/// Service name registered with the transport for the Sink role.
pub const SINK_SERVICE_NAME: &str = "Advanced Audio Sink";
