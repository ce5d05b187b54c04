//! Recording collaborators for unit tests.

use core::cell::{Cell, RefCell};

use heapless::Vec;

use crate::address::PeerAddress;
use crate::av::event::{AvEvent, AvOpcode};
use crate::av::{Role, ServiceClass, StreamHandle};
use crate::callbacks::{AudioState, ConnectionState, HostCallbacks};
use crate::config::AvConfig;
use crate::rc::RcController;
use crate::service::AvService;
use crate::session::{AudioFocusState, AudioSessionHooks, CodecPreference, MediaFrame};
use crate::transport::{Features, StartData, SuspendData, Transport, TransportStatus};

pub(crate) const A: PeerAddress = PeerAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
pub(crate) const B: PeerAddress = PeerAddress::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x66]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransportCall {
    Enable(Features),
    Disable,
    Register {
        peer_id: u8,
        with_media: bool,
        service: ServiceClass,
    },
    Deregister(StreamHandle),
    Open {
        address: PeerAddress,
        handle: StreamHandle,
        initiator: bool,
        service: ServiceClass,
    },
    Close(StreamHandle),
    Start {
        handle: StreamHandle,
        use_latency_mode: bool,
    },
    Stop {
        handle: StreamHandle,
        suspend: bool,
    },
    OpenRc(StreamHandle),
    CloseRc(StreamHandle),
    SetLatency {
        handle: StreamHandle,
        low_latency: bool,
    },
    OffloadStart(StreamHandle),
}

#[derive(Default)]
pub(crate) struct RecordingTransport {
    pub calls: RefCell<Vec<TransportCall, 64>>,
}

impl RecordingTransport {
    fn record(&self, call: TransportCall) {
        self.calls.borrow_mut().push(call).ok();
    }

    pub fn count(&self, matches: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|call| matches(call)).count()
    }

    pub fn contains(&self, call: &TransportCall) -> bool {
        self.calls.borrow().iter().any(|recorded| recorded == call)
    }
}

impl Transport for RecordingTransport {
    fn enable(&self, features: Features) {
        self.record(TransportCall::Enable(features));
    }

    fn disable(&self) {
        self.record(TransportCall::Disable);
    }

    fn register(&self, _service_name: &str, peer_id: u8, with_media: bool, service: ServiceClass) {
        self.record(TransportCall::Register {
            peer_id,
            with_media,
            service,
        });
    }

    fn deregister(&self, handle: StreamHandle) {
        self.record(TransportCall::Deregister(handle));
    }

    fn open(&self, address: PeerAddress, handle: StreamHandle, initiator: bool, service: ServiceClass) {
        self.record(TransportCall::Open {
            address,
            handle,
            initiator,
            service,
        });
    }

    fn close(&self, handle: StreamHandle) {
        self.record(TransportCall::Close(handle));
    }

    fn start(&self, handle: StreamHandle, use_latency_mode: bool) {
        self.record(TransportCall::Start {
            handle,
            use_latency_mode,
        });
    }

    fn stop(&self, handle: StreamHandle, suspend: bool) {
        self.record(TransportCall::Stop { handle, suspend });
    }

    fn open_rc(&self, handle: StreamHandle) {
        self.record(TransportCall::OpenRc(handle));
    }

    fn close_rc(&self, handle: StreamHandle) {
        self.record(TransportCall::CloseRc(handle));
    }

    fn set_latency(&self, handle: StreamHandle, low_latency: bool) {
        self.record(TransportCall::SetLatency {
            handle,
            low_latency,
        });
    }

    fn offload_start(&self, handle: StreamHandle) {
        self.record(TransportCall::OffloadStart(handle));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AudioCall {
    Init(Role),
    Cleanup(Role),
    CodecPriorities(usize),
    OffloadCapabilities(usize),
    SetCodecActivePeer(PeerAddress),
    StartSession(PeerAddress),
    EndSession(PeerAddress),
    RestartSession {
        from: PeerAddress,
        to: PeerAddress,
    },
    BeginShutdown,
    OnStarted {
        address: PeerAddress,
        synthetic: bool,
        failed: bool,
    },
    OnSuspended,
    OnStopped,
    OnIdle,
    OnOffloadStarted {
        address: PeerAddress,
        status: TransportStatus,
    },
    SetRemoteDelay(u16),
    SetTxFlush(bool),
    SetRxFlush(bool),
    Enqueue(PeerAddress),
    UpdateCodecConfig(PeerAddress),
    SetAudioFocusState,
    SetAudioTrackGain,
    SetDynamicAudioBufferSize(u8),
}

pub(crate) struct RecordingAudio {
    pub calls: RefCell<Vec<AudioCall, 64>>,
    pub init_ok: Cell<bool>,
    pub restart_ok: Cell<bool>,
    pub start_session_ok: Cell<bool>,
    pub started_ack: Cell<bool>,
}

impl Default for RecordingAudio {
    fn default() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            init_ok: Cell::new(true),
            restart_ok: Cell::new(true),
            start_session_ok: Cell::new(true),
            started_ack: Cell::new(true),
        }
    }
}

impl RecordingAudio {
    fn record(&self, call: AudioCall) {
        self.calls.borrow_mut().push(call).ok();
    }

    pub fn contains(&self, call: &AudioCall) -> bool {
        self.calls.borrow().iter().any(|recorded| recorded == call)
    }

    pub fn count(&self, matches: impl Fn(&AudioCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|call| matches(call)).count()
    }
}

impl AudioSessionHooks for RecordingAudio {
    fn init(&self, role: Role) -> bool {
        self.record(AudioCall::Init(role));
        self.init_ok.get()
    }

    fn cleanup(&self, role: Role) {
        self.record(AudioCall::Cleanup(role));
    }

    fn configure_codec_priorities(&self, priorities: &[CodecPreference]) {
        self.record(AudioCall::CodecPriorities(priorities.len()));
    }

    fn update_offload_capabilities(&self, capabilities: &[CodecPreference]) {
        self.record(AudioCall::OffloadCapabilities(capabilities.len()));
    }

    fn set_codec_active_peer(&self, address: PeerAddress) -> bool {
        self.record(AudioCall::SetCodecActivePeer(address));
        true
    }

    fn start_session(&self, address: PeerAddress) -> bool {
        self.record(AudioCall::StartSession(address));
        self.start_session_ok.get()
    }

    fn end_session(&self, address: PeerAddress) {
        self.record(AudioCall::EndSession(address));
    }

    fn restart_session(&self, from: PeerAddress, to: PeerAddress) -> bool {
        self.record(AudioCall::RestartSession { from, to });
        self.restart_ok.get()
    }

    fn begin_shutdown(&self) {
        self.record(AudioCall::BeginShutdown);
    }

    fn on_started(&self, address: PeerAddress, start: Option<&StartData>) -> bool {
        self.record(AudioCall::OnStarted {
            address,
            synthetic: start.is_none(),
            failed: start.is_some_and(|data| !data.status.is_success()),
        });
        self.started_ack.get()
    }

    fn on_suspended(&self, _suspend: Option<&SuspendData>) {
        self.record(AudioCall::OnSuspended);
    }

    fn on_stopped(&self, _suspend: Option<&SuspendData>) {
        self.record(AudioCall::OnStopped);
    }

    fn on_idle(&self) {
        self.record(AudioCall::OnIdle);
    }

    fn on_offload_started(&self, address: PeerAddress, status: TransportStatus) {
        self.record(AudioCall::OnOffloadStarted { address, status });
    }

    fn set_remote_delay(&self, delay_tenths_ms: u16) {
        self.record(AudioCall::SetRemoteDelay(delay_tenths_ms));
    }

    fn set_tx_flush(&self, flush: bool) {
        self.record(AudioCall::SetTxFlush(flush));
    }

    fn set_rx_flush(&self, flush: bool) {
        self.record(AudioCall::SetRxFlush(flush));
    }

    fn enqueue(&self, frame: MediaFrame) -> usize {
        self.record(AudioCall::Enqueue(frame.address));
        self.count(|call| matches!(call, AudioCall::Enqueue(_)))
    }

    fn update_codec_config(&self, address: PeerAddress, _preferences: &[CodecPreference]) {
        self.record(AudioCall::UpdateCodecConfig(address));
    }

    fn set_audio_focus_state(&self, _state: AudioFocusState) {
        self.record(AudioCall::SetAudioFocusState);
    }

    fn set_audio_track_gain(&self, _gain: f32) {
        self.record(AudioCall::SetAudioTrackGain);
    }

    fn set_dynamic_audio_buffer_size(&self, size: u8) {
        self.record(AudioCall::SetDynamicAudioBufferSize(size));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Notification {
    Connection(PeerAddress, ConnectionState),
    Audio(PeerAddress, AudioState),
    SourceCodec(PeerAddress),
    SinkAudioConfig {
        address: PeerAddress,
        sample_rate: u32,
        channel_count: u8,
    },
    MandatoryCodecQuery(PeerAddress),
}

pub(crate) struct RecordingCallbacks {
    pub notifications: RefCell<Vec<Notification, 64>>,
    pub mandatory: Cell<bool>,
}

impl Default for RecordingCallbacks {
    fn default() -> Self {
        Self {
            notifications: RefCell::new(Vec::new()),
            mandatory: Cell::new(false),
        }
    }
}

impl RecordingCallbacks {
    fn record(&self, notification: Notification) {
        self.notifications.borrow_mut().push(notification).ok();
    }

    pub fn contains(&self, notification: &Notification) -> bool {
        self.notifications
            .borrow()
            .iter()
            .any(|recorded| recorded == notification)
    }

    pub fn connection_states(&self, address: PeerAddress) -> Vec<ConnectionState, 16> {
        self.notifications
            .borrow()
            .iter()
            .filter_map(|notification| match notification {
                Notification::Connection(a, state) if *a == address => Some(*state),
                _ => None,
            })
            .collect()
    }

    pub fn audio_states(&self, address: PeerAddress) -> Vec<AudioState, 16> {
        self.notifications
            .borrow()
            .iter()
            .filter_map(|notification| match notification {
                Notification::Audio(a, state) if *a == address => Some(*state),
                _ => None,
            })
            .collect()
    }
}

impl HostCallbacks for RecordingCallbacks {
    fn connection_state(&self, address: PeerAddress, state: ConnectionState) {
        self.record(Notification::Connection(address, state));
    }

    fn audio_state(&self, address: PeerAddress, state: AudioState) {
        self.record(Notification::Audio(address, state));
    }

    fn source_codec_config(
        &self,
        address: PeerAddress,
        _current: CodecPreference,
        _local_capabilities: &[CodecPreference],
        _selectable_capabilities: &[CodecPreference],
    ) {
        self.record(Notification::SourceCodec(address));
    }

    fn sink_audio_config(&self, address: PeerAddress, sample_rate: u32, channel_count: u8) {
        self.record(Notification::SinkAudioConfig {
            address,
            sample_rate,
            channel_count,
        });
    }

    fn mandatory_codec_preferred(&self, address: PeerAddress) -> bool {
        self.record(Notification::MandatoryCodecQuery(address));
        self.mandatory.get()
    }
}

pub(crate) struct RecordingRc {
    pub forwarded: RefCell<Vec<AvOpcode, 64>>,
    pub connected: Cell<bool>,
    pub handle: Cell<Option<StreamHandle>>,
    pub pending_play: RefCell<Vec<(PeerAddress, bool), 16>>,
}

impl Default for RecordingRc {
    fn default() -> Self {
        Self {
            forwarded: RefCell::new(Vec::new()),
            connected: Cell::new(false),
            handle: Cell::new(None),
            pending_play: RefCell::new(Vec::new()),
        }
    }
}

impl RcController for RecordingRc {
    fn handle_event(&self, _address: PeerAddress, event: &AvEvent) {
        self.forwarded.borrow_mut().push(event.opcode()).ok();
    }

    fn is_connected(&self, _address: PeerAddress) -> bool {
        self.connected.get()
    }

    fn connected_handle(&self, _address: PeerAddress) -> Option<StreamHandle> {
        self.handle.get()
    }

    fn check_pending_play(&self, address: PeerAddress, accepted: bool) {
        self.pending_play.borrow_mut().push((address, accepted)).ok();
    }
}

pub(crate) type TestService =
    AvService<RecordingTransport, RecordingAudio, RecordingCallbacks, RecordingRc>;

pub(crate) fn service() -> TestService {
    service_with_config(AvConfig::default())
}

pub(crate) fn service_with_config(config: AvConfig) -> TestService {
    AvService::new(
        RecordingTransport::default(),
        RecordingAudio::default(),
        RecordingCallbacks::default(),
        RecordingRc::default(),
        config,
    )
}
