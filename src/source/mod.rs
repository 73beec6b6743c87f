// Copyright (C) 2024 the freshet authors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTSP pull source.
//!
//! An [`RtspSource`] owns one background task that keeps a session against a
//! remote RTSP URL alive: connect, `OPTIONS`, `DESCRIBE`, `SETUP` every
//! track, hand the tracks to the parent path, `PLAY`, then forward RTP/RTCP
//! packets into the parent's stream until the session dies. Any failure
//! tears the session down and schedules a fresh attempt after a fixed pause;
//! only [`RtspSource::close`] stops the loop.
//!
//! The RTSP client library itself is a black box behind [`SourceConnector`]
//! and [`SessionClient`]; this module owns the lifecycle, not the protocol
//! encoding.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use log::Level;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::Error;

mod tls;

/// How long to wait after a failed or ended session before reconnecting.
const RETRY_PAUSE: Duration = Duration::from_secs(5);

/// Preferred transport for RTP data, negotiated during `SETUP`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Transport {
    /// Try UDP first, falling back to TCP when the server refuses it or
    /// packets don't arrive.
    #[default]
    Automatic,
    Udp,
    UdpMulticast,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Automatic => f.pad("automatic"),
            Transport::Udp => f.pad("udp"),
            Transport::UdpMulticast => f.pad("multicast"),
            Transport::Tcp => f.pad("tcp"),
        }
    }
}

impl std::str::FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "automatic" => Transport::Automatic,
            "udp" => Transport::Udp,
            "multicast" => Transport::UdpMulticast,
            "tcp" => Transport::Tcp,
            _ => {
                return Err(Error::invalid_config(format!(
                    "transport {s:?} not understood"
                )))
            }
        })
    }
}

/// Static configuration of one source, immutable for the worker's lifetime.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Remote `rtsp://` or `rtsps://` URL.
    pub url: String,

    pub transport: Transport,

    /// Allow the server to send RTP from a port other than the negotiated
    /// one. Needed for some NAT'd cameras.
    pub any_port_enable: bool,

    /// Hex-encoded SHA-256 of the server's DER-encoded TLS certificate,
    /// compared case-insensitively. `None` keeps standard chain verification.
    pub fingerprint: Option<String>,

    pub read_timeout: Duration,
    pub write_timeout: Duration,

    /// Number of received packets to buffer.
    pub read_buffer_count: usize,

    /// Size in bytes of each read buffer; must fit the largest packet the
    /// server emits.
    pub read_buffer_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            url: String::new(),
            transport: Transport::default(),
            any_port_enable: false,
            fingerprint: None,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            read_buffer_count: 512,
            read_buffer_size: 2048,
        }
    }
}

/// A media track discovered via `DESCRIBE`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    /// Index of the track within the presentation, also the key used when
    /// forwarding packets to the stream.
    pub id: usize,

    /// Media type as in the SDP `m=` line, e.g. `video` or `audio`.
    pub media: String,

    /// Encoding name with ASCII characters in lowercase, e.g. `h264`.
    pub encoding_name: String,

    /// RTP clock rate, in Hz.
    pub clock_rate: u32,

    /// Control URL for `SETUP`, if the server specified one.
    pub control: Option<Url>,
}

/// Observes RTSP requests/responses for debug logging.
pub type TransactionHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Everything the transport needs to establish a session, carried from the
/// worker configuration.
#[derive(Clone)]
pub struct ClientOptions {
    pub transport: Transport,
    pub any_port_enable: bool,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub read_buffer_count: usize,
    pub read_buffer_size: usize,

    /// TLS configuration for `rtsps` URLs, including the fingerprint pinning
    /// verifier when one is configured.
    pub tls: Arc<rustls::ClientConfig>,

    pub on_request: Option<TransactionHook>,
    pub on_response: Option<TransactionHook>,
}

/// Result of a `DESCRIBE`.
#[derive(Clone, Debug)]
pub struct Described {
    pub tracks: Vec<Track>,

    /// Base URL subsequent `SETUP` requests are issued against.
    pub base_url: Url,
}

/// Callback invoked with `(track_id, payload)` for each received packet. May
/// run on the transport's internal I/O task.
pub type PacketHandler = Box<dyn FnMut(usize, Bytes) + Send>;

/// One established RTSP connection, the black-box side of the source.
///
/// Methods take `&self`: the transport is expected to be internally
/// synchronized, mirroring how these client libraries are actually built.
pub trait SessionClient: Send + Sync {
    /// Issues `OPTIONS` (server discovery / keepalive preflight).
    fn options(&self) -> BoxFuture<'_, Result<(), Error>>;

    /// Issues `DESCRIBE`, returning the discovered tracks and base URL.
    fn describe(&self) -> BoxFuture<'_, Result<Described, Error>>;

    /// Issues `SETUP` for one track with the configured transport.
    fn setup<'a>(&'a self, track: &'a Track) -> BoxFuture<'a, Result<(), Error>>;

    /// Registers the callback for RTP packets. Must be called before
    /// [`SessionClient::play`].
    fn on_packet_rtp(&self, handler: PacketHandler);

    /// Registers the callback for RTCP packets.
    fn on_packet_rtcp(&self, handler: PacketHandler);

    /// Issues `PLAY`.
    fn play(&self) -> BoxFuture<'_, Result<(), Error>>;

    /// Runs until the session ends: `Err` on remote close, I/O error, or
    /// timeout; `Ok` after a local [`SessionClient::close`].
    fn wait(&self) -> BoxFuture<'_, Result<(), Error>>;

    /// Tears the connection down. Idempotent and non-blocking; any pending
    /// or future operation, including [`SessionClient::wait`], must resolve
    /// promptly afterwards.
    fn close(&self);
}

/// Factory for [`SessionClient`]s, the seam between the worker and the RTSP
/// client library.
pub trait SourceConnector: Send + Sync {
    fn connect<'a>(
        &'a self,
        url: &'a Url,
        options: ClientOptions,
    ) -> BoxFuture<'a, Result<Arc<dyn SessionClient>, Error>>;
}

/// Packet sink owned by the parent path, handed to the worker on readiness.
pub trait StreamSink: Send + Sync {
    fn on_packet_rtp(&self, track_id: usize, payload: Bytes);
    fn on_packet_rtcp(&self, track_id: usize, payload: Bytes);
}

/// Readiness handshake payload.
#[derive(Clone, Debug)]
pub struct SourceReadyRequest {
    pub tracks: Vec<Track>,
}

/// Upward capability to the path that owns this source. Methods may be
/// called from the worker's tasks concurrently with the owner's own use.
pub trait SourceParent: Send + Sync {
    /// Emits one operational log line on behalf of the source.
    fn log(&self, level: Level, message: &str);

    /// Registers the source's tracks with the path. On success the returned
    /// stream receives every packet until the matching
    /// [`SourceParent::on_source_not_ready`]. The parent may refuse (e.g.
    /// the path is shutting down).
    fn on_source_ready(&self, req: SourceReadyRequest) -> Result<Arc<dyn StreamSink>, Error>;

    /// Deregisters the source so the path can tear down consumers.
    fn on_source_not_ready(&self);
}

/// Handle to a running RTSP pull source.
///
/// Constructing one starts the worker in the background; the handle's sole
/// operation is [`RtspSource::close`].
pub struct RtspSource {
    cancel: CancellationToken,
    parent: Arc<dyn SourceParent>,
    join: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RtspSource {
    /// Starts the worker. Must be called from within a tokio runtime.
    pub fn new(
        conf: SourceConfig,
        connector: Arc<dyn SourceConnector>,
        parent: Arc<dyn SourceParent>,
    ) -> Self {
        parent.log(Level::Info, "[rtsp source] started");
        let cancel = CancellationToken::new();
        let worker = Worker {
            conf,
            connector,
            parent: parent.clone(),
            cancel: cancel.clone(),
        };
        let join = tokio::spawn(worker.run());
        RtspSource {
            cancel,
            parent,
            join: Mutex::new(Some(join)),
        }
    }

    /// Document identifying the source type to the status API.
    pub fn describe(&self) -> serde_json::Value {
        serde_json::json!({ "type": "rtspSource" })
    }

    /// Stops the worker: cancels the retry loop, closes any active session,
    /// and returns once all background work has quiesced, including the
    /// not-ready notification if the source was ready. Idempotent and safe
    /// to call from any task.
    pub async fn close(&self) {
        let join = self.join.lock().unwrap().take();
        if let Some(join) = join {
            self.parent.log(Level::Info, "[rtsp source] stopped");
            self.cancel.cancel();
            let _ = join.await;
        }
    }
}

#[derive(Clone)]
struct Worker {
    conf: SourceConfig,
    connector: Arc<dyn SourceConnector>,
    parent: Arc<dyn SourceParent>,
    cancel: CancellationToken,
}

impl Worker {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        self.parent.log(level, &format!("[rtsp source] {args}"));
    }

    async fn run(self) {
        loop {
            let retry = self.run_session().await;
            if !retry {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(RETRY_PAUSE) => {}
                _ = self.cancel.cancelled() => break,
            }
        }
    }

    /// One connection attempt. Returns whether the retry loop should
    /// continue; cancellation is the only way to get `false`.
    async fn run_session(&self) -> bool {
        self.log(Level::Debug, format_args!("connecting"));

        let tls = match tls::client_config(self.conf.fingerprint.as_deref()) {
            Ok(config) => Arc::new(config),
            Err(e) => {
                self.log(Level::Info, format_args!("ERR: {e}"));
                return true;
            }
        };
        let url = match Url::parse(&self.conf.url) {
            Ok(url) => url,
            Err(e) => {
                let e = Error::invalid_config(format!("invalid source URL: {e}"));
                self.log(Level::Info, format_args!("ERR: {e}"));
                return true;
            }
        };

        let options = self.client_options(tls);
        let client = tokio::select! {
            res = self.connector.connect(&url, options) => match res {
                Ok(client) => client,
                Err(e) => {
                    self.log(Level::Info, format_args!("ERR: {e}"));
                    return true;
                }
            },
            _ = self.cancel.cancelled() => return false,
        };

        // The blocking RTSP interaction runs on its own task so this one can
        // react to cancellation and close the client out from under it.
        let (tx, mut rx) = oneshot::channel();
        let worker = self.clone();
        let session = client.clone();
        tokio::spawn(async move {
            let _ = tx.send(worker.run_protocol(session).await);
        });

        tokio::select! {
            res = &mut rx => {
                if let Ok(Err(e)) = res {
                    self.log(Level::Info, format_args!("ERR: {e}"));
                }
                true
            }
            _ = self.cancel.cancelled() => {
                client.close();
                let _ = rx.await;
                false
            }
        }
    }

    async fn run_protocol(&self, client: Arc<dyn SessionClient>) -> Result<(), Error> {
        client.options().await?;
        let described = client.describe().await?;
        for track in &described.tracks {
            client.setup(track).await?;
        }

        let stream = self.parent.on_source_ready(SourceReadyRequest {
            tracks: described.tracks.clone(),
        })?;
        self.log(Level::Info, format_args!("ready"));

        let rtp = stream.clone();
        client.on_packet_rtp(Box::new(move |track_id, payload| {
            rtp.on_packet_rtp(track_id, payload);
        }));
        let rtcp = stream;
        client.on_packet_rtcp(Box::new(move |track_id, payload| {
            rtcp.on_packet_rtcp(track_id, payload);
        }));

        // From here on the parent must observe the matching not-ready no
        // matter how the session ends.
        let res = async {
            client.play().await?;
            client.wait().await
        }
        .await;
        self.parent.on_source_not_ready();
        res
    }

    fn client_options(&self, tls: Arc<rustls::ClientConfig>) -> ClientOptions {
        let parent = self.parent.clone();
        let on_request: TransactionHook = Arc::new(move |line: &str| {
            parent.log(Level::Debug, &format!("[rtsp source] c->s {line}"));
        });
        let parent = self.parent.clone();
        let on_response: TransactionHook = Arc::new(move |line: &str| {
            parent.log(Level::Debug, &format!("[rtsp source] s->c {line}"));
        });
        ClientOptions {
            transport: self.conf.transport,
            any_port_enable: self.conf.any_port_enable,
            read_timeout: self.conf.read_timeout,
            write_timeout: self.conf.write_timeout,
            read_buffer_count: self.conf.read_buffer_count,
            read_buffer_size: self.conf.read_buffer_size,
            tls,
            on_request: Some(on_request),
            on_response: Some(on_response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        rtp: AtomicUsize,
        rtcp: AtomicUsize,
    }

    impl StreamSink for CountingSink {
        fn on_packet_rtp(&self, _track_id: usize, _payload: Bytes) {
            self.rtp.fetch_add(1, Ordering::SeqCst);
        }

        fn on_packet_rtcp(&self, _track_id: usize, _payload: Bytes) {
            self.rtcp.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MockParent {
        ready: AtomicUsize,
        not_ready: AtomicUsize,
        reject: bool,
        sink: Arc<CountingSink>,
        lines: Mutex<Vec<(Level, String)>>,
    }

    impl MockParent {
        fn new(reject: bool) -> Arc<Self> {
            Arc::new(MockParent {
                ready: AtomicUsize::new(0),
                not_ready: AtomicUsize::new(0),
                reject,
                sink: Arc::new(CountingSink {
                    rtp: AtomicUsize::new(0),
                    rtcp: AtomicUsize::new(0),
                }),
                lines: Mutex::new(Vec::new()),
            })
        }

        fn has_line(&self, level: Level, needle: &str) -> bool {
            self.lines
                .lock()
                .unwrap()
                .iter()
                .any(|(l, m)| *l == level && m.contains(needle))
        }

        fn count_line(&self, needle: &str) -> usize {
            self.lines
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, m)| m.contains(needle))
                .count()
        }
    }

    impl SourceParent for MockParent {
        fn log(&self, level: Level, message: &str) {
            self.lines.lock().unwrap().push((level, message.to_owned()));
        }

        fn on_source_ready(&self, _req: SourceReadyRequest) -> Result<Arc<dyn StreamSink>, Error> {
            self.ready.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(Error::parent_rejected("path is closed"));
            }
            let sink: Arc<dyn StreamSink> = self.sink.clone();
            Ok(sink)
        }

        fn on_source_not_ready(&self) {
            self.not_ready.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Always refuses the connection, recording when each attempt happened.
    #[derive(Default)]
    struct FailingConnector {
        attempts: Mutex<Vec<tokio::time::Instant>>,
    }

    impl SourceConnector for FailingConnector {
        fn connect<'a>(
            &'a self,
            _url: &'a Url,
            _options: ClientOptions,
        ) -> BoxFuture<'a, Result<Arc<dyn SessionClient>, Error>> {
            Box::pin(async move {
                self.attempts.lock().unwrap().push(tokio::time::Instant::now());
                Err(Error::transport("connection refused"))
            })
        }
    }

    /// Accepts the TCP connection and then never completes the handshake.
    #[derive(Default)]
    struct PendingConnector {
        attempts: AtomicUsize,
    }

    impl SourceConnector for PendingConnector {
        fn connect<'a>(
            &'a self,
            _url: &'a Url,
            _options: ClientOptions,
        ) -> BoxFuture<'a, Result<Arc<dyn SessionClient>, Error>> {
            Box::pin(async move {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                std::future::pending().await
            })
        }
    }

    #[derive(Default)]
    struct MockClient {
        closed: CancellationToken,
        fail_play: bool,
        rtp_handler: Mutex<Option<PacketHandler>>,
        rtcp_handler: Mutex<Option<PacketHandler>>,
    }

    impl MockClient {
        fn send_rtp(&self, track_id: usize, payload: Bytes) {
            if let Some(handler) = self.rtp_handler.lock().unwrap().as_mut() {
                handler(track_id, payload);
            }
        }

        fn send_rtcp(&self, track_id: usize, payload: Bytes) {
            if let Some(handler) = self.rtcp_handler.lock().unwrap().as_mut() {
                handler(track_id, payload);
            }
        }
    }

    impl SessionClient for MockClient {
        fn options(&self) -> BoxFuture<'_, Result<(), Error>> {
            Box::pin(async { Ok(()) })
        }

        fn describe(&self) -> BoxFuture<'_, Result<Described, Error>> {
            Box::pin(async {
                Ok(Described {
                    tracks: vec![
                        Track {
                            id: 0,
                            media: "video".to_owned(),
                            encoding_name: "h264".to_owned(),
                            clock_rate: 90_000,
                            control: None,
                        },
                        Track {
                            id: 1,
                            media: "audio".to_owned(),
                            encoding_name: "mpeg4-generic".to_owned(),
                            clock_rate: 48_000,
                            control: None,
                        },
                    ],
                    base_url: Url::parse("rtsp://camera.example/stream/").unwrap(),
                })
            })
        }

        fn setup<'a>(&'a self, _track: &'a Track) -> BoxFuture<'a, Result<(), Error>> {
            Box::pin(async { Ok(()) })
        }

        fn on_packet_rtp(&self, handler: PacketHandler) {
            *self.rtp_handler.lock().unwrap() = Some(handler);
        }

        fn on_packet_rtcp(&self, handler: PacketHandler) {
            *self.rtcp_handler.lock().unwrap() = Some(handler);
        }

        fn play(&self) -> BoxFuture<'_, Result<(), Error>> {
            Box::pin(async move {
                if self.fail_play {
                    Err(Error::protocol("PLAY refused: 454 Session Not Found"))
                } else {
                    Ok(())
                }
            })
        }

        fn wait(&self) -> BoxFuture<'_, Result<(), Error>> {
            let closed = self.closed.clone();
            Box::pin(async move {
                closed.cancelled().await;
                Ok(())
            })
        }

        fn close(&self) {
            self.closed.cancel();
        }
    }

    struct OkConnector {
        client: Arc<MockClient>,
    }

    impl SourceConnector for OkConnector {
        fn connect<'a>(
            &'a self,
            _url: &'a Url,
            _options: ClientOptions,
        ) -> BoxFuture<'a, Result<Arc<dyn SessionClient>, Error>> {
            let client: Arc<dyn SessionClient> = self.client.clone();
            Box::pin(async move { Ok(client) })
        }
    }

    fn test_config() -> SourceConfig {
        SourceConfig {
            url: "rtsp://camera.example/stream".to_owned(),
            ..SourceConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_every_five_seconds_until_closed() {
        let parent = MockParent::new(false);
        let connector = Arc::new(FailingConnector::default());
        let source = RtspSource::new(test_config(), connector.clone(), parent.clone());

        tokio::time::sleep(Duration::from_secs(26)).await;
        source.close().await;

        let attempts = connector.attempts.lock().unwrap().clone();
        assert_eq!(attempts.len(), 6, "one attempt at t=0,5,..,25");
        for pair in attempts.windows(2) {
            assert_eq!(pair[1] - pair[0], RETRY_PAUSE);
        }

        // The worker has joined, so no further attempts can happen.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.attempts.lock().unwrap().len(), 6);

        assert_eq!(parent.ready.load(Ordering::SeqCst), 0);
        assert_eq!(parent.not_ready.load(Ordering::SeqCst), 0);
        assert!(parent.has_line(Level::Info, "ERR: transport failure: connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn close_during_blocking_connect_returns_promptly() {
        let parent = MockParent::new(false);
        let connector = Arc::new(PendingConnector::default());
        let source = RtspSource::new(test_config(), connector.clone(), parent.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);

        source.close().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(parent.ready.load(Ordering::SeqCst), 0);
        assert_eq!(parent.not_ready.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_and_not_ready_pair_up() {
        let parent = MockParent::new(false);
        let client = Arc::new(MockClient::default());
        let connector = Arc::new(OkConnector {
            client: client.clone(),
        });
        let source = RtspSource::new(test_config(), connector, parent.clone());

        while parent.ready.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(parent.has_line(Level::Info, "[rtsp source] ready"));

        // Packets flow through the registered callbacks into the sink.
        client.send_rtp(0, Bytes::from_static(b"rtp packet"));
        client.send_rtp(1, Bytes::from_static(b"rtp packet"));
        client.send_rtcp(0, Bytes::from_static(b"rtcp packet"));
        assert_eq!(parent.sink.rtp.load(Ordering::SeqCst), 2);
        assert_eq!(parent.sink.rtcp.load(Ordering::SeqCst), 1);

        source.close().await;
        assert_eq!(parent.ready.load(Ordering::SeqCst), 1);
        assert_eq!(parent.not_ready.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_rejection_cools_down_and_retries() {
        let parent = MockParent::new(true);
        let client = Arc::new(MockClient::default());
        let connector = Arc::new(OkConnector { client });
        let source = RtspSource::new(test_config(), connector, parent.clone());

        tokio::time::sleep(Duration::from_secs(11)).await;
        source.close().await;

        // Attempts at t=0, 5 and 10 all reached the handshake and were
        // refused; none of them may count as ready.
        assert_eq!(parent.ready.load(Ordering::SeqCst), 3);
        assert_eq!(parent.not_ready.load(Ordering::SeqCst), 0);
        assert!(parent.has_line(Level::Info, "ERR: source refused: path is closed"));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_error_pairs_not_ready_and_retries() {
        let parent = MockParent::new(false);
        let client = Arc::new(MockClient {
            fail_play: true,
            ..MockClient::default()
        });
        let connector = Arc::new(OkConnector { client });
        let source = RtspSource::new(test_config(), connector, parent.clone());

        tokio::time::sleep(Duration::from_secs(6)).await;
        source.close().await;

        // Two attempts, each of which became ready and then failed PLAY.
        assert_eq!(parent.ready.load(Ordering::SeqCst), 2);
        assert_eq!(parent.not_ready.load(Ordering::SeqCst), 2);
        assert!(parent.has_line(Level::Info, "ERR: protocol failure: PLAY refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_idempotent() {
        let parent = MockParent::new(false);
        let connector = Arc::new(FailingConnector::default());
        let source = RtspSource::new(test_config(), connector, parent.clone());

        source.close().await;
        source.close().await;
        assert_eq!(parent.count_line("started"), 1);
        assert_eq!(parent.count_line("stopped"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_url_cools_down_instead_of_dying() {
        let parent = MockParent::new(false);
        let connector = Arc::new(FailingConnector::default());
        let source = RtspSource::new(
            SourceConfig {
                url: "not a url".to_owned(),
                ..SourceConfig::default()
            },
            connector.clone(),
            parent.clone(),
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        source.close().await;

        // The URL never parses, so the connector is never reached, but the
        // worker keeps trying.
        assert!(connector.attempts.lock().unwrap().is_empty());
        assert!(parent.count_line("ERR: invalid configuration: invalid source URL") >= 2);
    }

    #[tokio::test]
    async fn describe_names_the_source_type() {
        let parent = MockParent::new(false);
        let connector = Arc::new(FailingConnector::default());
        let source = RtspSource::new(test_config(), connector, parent);
        assert_eq!(source.describe(), serde_json::json!({ "type": "rtspSource" }));
        source.close().await;
    }

    #[test]
    fn transport_parses_and_displays() {
        for s in ["automatic", "udp", "multicast", "tcp"] {
            let t: Transport = s.parse().unwrap();
            assert_eq!(t.to_string(), s);
        }
        assert!("quic".parse::<Transport>().is_err());
        assert_eq!(Transport::default(), Transport::Automatic);
    }
}
