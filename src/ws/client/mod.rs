mod error;
mod handler;
mod inner;
mod policy;

pub use error::{ConnectionError, Error};
pub use handler::{Event, Handler, Ignore};
pub use inner::ConnectionState;
pub use policy::{Decision, ReconnectPolicy};

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use futures_util::SinkExt;
use serde::{de::DeserializeOwned, Serialize};
use snafu::prelude::*;
use tokio::{sync::watch, task::JoinHandle};
use tokio_tungstenite::tungstenite::{
    protocol::{frame::coding::CloseCode, CloseFrame},
    Message as Frame,
};

use crate::{
    notify::{Notice, NoticeKind, Notifier},
    token::TokenStore,
    ws::message::Message,
};
use error::error as variant;
use inner::Shared;

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Per stream options of a realtime [`Client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub(crate) path: String,
    pub(crate) token: Option<String>,
    pub(crate) reconnect: bool,
    pub(crate) reconnect_delay: Duration,
    pub(crate) max_retries: u32,
    pub(crate) heartbeat_interval: Duration,
}

impl Options {
    /// Options for stream at `path` (appended to realtime base url), with default
    /// reconnect (on, 3s delay, 5 retries) and heartbeat (30s)
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self {
            path: path.into(),
            token: None,
            reconnect: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Authenticate with this token instead of the stored one
    pub fn token<S: Into<String>>(mut self, token: S) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Enable or disable reconnect on transient close
    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.reconnect = enabled;
        self
    }

    /// Wait before each reconnect attempt
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Max consecutive reconnect attempts
    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Heartbeat send interval, at least 1ms
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(MIN_HEARTBEAT_INTERVAL);
        self
    }

    /// stream path
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug)]
struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Realtime client of one logical stream.
///
/// Keeps a best effort websocket connection, delivers parsed [`Message`]s to its
/// [`Handler`], and reconnects after transient closes. Close code
/// [`AUTH_EXPIRED`](crate::ws::message::AUTH_EXPIRED) and
/// [`POLICY_REJECTED`](crate::ws::message::POLICY_REJECTED) are terminal.
#[derive(Debug)]
pub struct Client<T> {
    shared: Arc<Shared<T>>,
    running: Mutex<Option<Running>>,
}

impl<T> Client<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Create a disconnected client, `base` is the realtime base url (ws/wss)
    pub fn new<H: Handler<T>>(
        base: &str,
        options: Options,
        handler: H,
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(
                base.trim_end_matches('/').to_string(),
                options,
                tokens,
                notifier,
                Arc::new(handler),
            )),
            running: Mutex::new(None),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Url the next connection attempt will use
    pub fn url(&self) -> Result<url::Url, Error> {
        self.shared.url()
    }

    /// Start connecting in background, must be called inside a tokio runtime.
    ///
    /// A client which is already running is left untouched.
    pub fn connect(&self) -> Result<(), Error> {
        self.shared.url()?;

        let mut running = self.running();
        if let Some(ref r) = *running {
            if !r.handle.is_finished() {
                log::debug!("Realtime {} already running", self.shared.options.path);
                return Ok(());
            }
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(self.shared.clone().run(shutdown_rx));
        *running = Some(Running { shutdown, handle });

        Ok(())
    }

    /// Send a json message.
    ///
    /// Only an open connection sends, otherwise the message is dropped and the
    /// user notified, nothing is queued.
    pub async fn send(&self, message: &Message<T>) -> Result<(), Error> {
        let text = message.encode().context(variant::EncodeFailed)?;

        let mut sink = self.shared.sink.lock().await;
        match sink.as_mut() {
            Some(sink) if self.shared.state() == ConnectionState::Open => sink
                .send(Frame::Text(text))
                .await
                .context(variant::SendFailed),
            _ => {
                log::debug!("Realtime {} not open, drop message", self.shared.options.path);
                self.shared
                    .notify(Notice::error(NoticeKind::NotConnected));
                variant::NotConnected.fail()
            }
        }
    }

    /// Close the connection and stop heartbeat and any scheduled reconnect.
    ///
    /// No handler method is called once this returns. Closing a closed client does nothing.
    pub async fn close(&self) {
        let running = self.running().take();

        self.shared.stop_heartbeat();

        if let Some(running) = running {
            log::debug!("Closing realtime {}", self.shared.options.path);
            let _ = running.shutdown.send(true);
            if let Err(err) = running.handle.await {
                log::debug!("Realtime supervisor ended abnormally: {}", err);
            }
        }

        if let Some(mut sink) = self.shared.sink.lock().await.take() {
            self.shared.set_state(ConnectionState::Closing);
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            };
            if let Err(err) = sink.send(Frame::Close(Some(frame))).await {
                log::debug!("Send close frame failed: {}", err);
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Watch connection state changes
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.watch_state()
    }

    /// true if the connection is open
    pub fn is_open(&self) -> bool {
        self.shared.state() == ConnectionState::Open
    }

    /// reconnect attempts since last successful open
    pub fn retry_count(&self) -> u32 {
        self.shared.retry_count()
    }

    /// true while a heartbeat task is alive
    pub fn heartbeat_running(&self) -> bool {
        self.shared.heartbeat_running()
    }
}

impl<T> Drop for Client<T> {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(running) = running {
            let _ = running.shutdown.send(true);
        }
        self.shared.stop_heartbeat();
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::StreamExt;
    use serde_json::{json, Value};
    use tokio::{
        net::{TcpListener, TcpStream},
        sync::{mpsc, oneshot},
        time::{sleep, timeout},
    };
    use tokio_tungstenite::{
        accept_async, accept_hdr_async,
        tungstenite::handshake::server::{ErrorResponse, Request, Response},
        WebSocketStream,
    };

    use super::*;
    use crate::{notify::test::Recorder, token::MemoryTokenStore, ws::message::AUTH_EXPIRED};

    const WAIT: Duration = Duration::from_secs(3);
    const HEARTBEAT: &str = crate::ws::message::HEARTBEAT_FRAME;

    struct Fixture {
        client: Client<Value>,
        events: mpsc::UnboundedReceiver<Event<Value>>,
        notifier: Arc<Recorder>,
    }

    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("ws://{}", listener.local_addr().unwrap());
        (listener, base)
    }

    fn fixture(base: &str, options: Options) -> Fixture {
        let (tx, events) = mpsc::unbounded_channel();
        let notifier = Arc::new(Recorder::default());
        let client = Client::new(
            base,
            options,
            tx,
            Arc::new(MemoryTokenStore::new("stored-token")),
            notifier.clone(),
        );
        Fixture {
            client,
            events,
            notifier,
        }
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<Event<Value>>) -> Event<Value> {
        timeout(WAIT, events.recv())
            .await
            .expect("wait event timeout")
            .expect("event channel closed")
    }

    async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (tcp, _) = listener.accept().await.unwrap();
        accept_async(tcp).await.unwrap()
    }

    async fn close_with(ws: &mut WebSocketStream<TcpStream>, code: u16) {
        ws.close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: "bye".into(),
        }))
        .await
        .unwrap();
    }

    #[test]
    fn test_url_token_fallback() {
        let (tx, _rx) = mpsc::unbounded_channel::<Event<Value>>();
        let store = Arc::new(MemoryTokenStore::default());
        let client = Client::new(
            "wss://judge.example.com/ws/",
            Options::new("/notifications"),
            tx,
            store.clone(),
            Arc::new(Recorder::default()),
        );

        assert_eq!(
            client.url().unwrap().as_str(),
            "wss://judge.example.com/ws/notifications"
        );

        store.set(Some("a b&c".to_string()));
        assert_eq!(
            client.url().unwrap().as_str(),
            "wss://judge.example.com/ws/notifications?token=a+b%26c"
        );
    }

    #[test]
    fn test_url_prefers_explicit_token_and_checks_schema() {
        let f = fixture("ws://127.0.0.1:1", Options::new("/presence").token("explicit"));
        assert_eq!(
            f.client.url().unwrap().as_str(),
            "ws://127.0.0.1:1/presence?token=explicit"
        );

        let f = fixture("https://127.0.0.1:1", Options::new("/presence"));
        assert!(matches!(
            f.client.connect().unwrap_err(),
            Error::InvalidSchema { .. }
        ));
    }

    #[tokio::test]
    async fn test_receive_messages_and_drop_malformed_frames() {
        let (listener, base) = listen().await;
        let (uri_tx, uri_rx) = oneshot::channel();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_hdr_async(
                tcp,
                |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    let _ = uri_tx.send(req.uri().to_string());
                    Ok(resp)
                },
            )
            .await
            .unwrap();

            ws.send(Frame::Text(r#"{"type":"submission","data":{"verdict":"AC"}}"#.into()))
                .await
                .unwrap();
            ws.send(Frame::Text("definitely not json".into())).await.unwrap();
            ws.send(Frame::Binary(vec![1, 2, 3])).await.unwrap();
            ws.send(Frame::Text(r#"{"data":2,"created_at":"now"}"#.into()))
                .await
                .unwrap();

            // keep connection until client closes
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut f = fixture(&base, Options::new("/ws/submissions").token("t0k"));
        f.client.connect().unwrap();

        assert_eq!(next_event(&mut f.events).await, Event::Open);
        assert_eq!(uri_rx.await.unwrap(), "/ws/submissions?token=t0k");

        let first = next_event(&mut f.events).await;
        assert_eq!(
            first,
            Event::Message(Message::new(json!({ "verdict": "AC" })).with_kind("submission"))
        );

        let second = next_event(&mut f.events).await;
        let Event::Message(second) = second else {
            panic!("expect message, got {:?}", second)
        };
        assert_eq!(second.data, json!(2));
        assert_eq!(second.created_at.as_deref(), Some("now"));

        // malformed frames neither closed the connection nor produced events
        assert!(f.client.is_open());
        assert!(f.events.try_recv().is_err());

        f.client.close().await;
        timeout(WAIT, server).await.unwrap().unwrap();
        assert!(!f.client.is_open());
    }

    #[tokio::test]
    async fn test_send_and_heartbeat() {
        let (listener, base) = listen().await;
        let (frames_tx, mut frames) = mpsc::unbounded_channel();

        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            while let Some(Ok(frame)) = ws.next().await {
                if let Frame::Text(text) = frame {
                    let _ = frames_tx.send(text);
                }
            }
        });

        let mut f = fixture(
            &base,
            Options::new("/chat").heartbeat_interval(Duration::from_millis(50)),
        );
        f.client.connect().unwrap();
        assert_eq!(next_event(&mut f.events).await, Event::Open);
        assert!(f.client.heartbeat_running());

        f.client
            .send(&Message::new(json!({ "text": "hi" })).with_kind("chat"))
            .await
            .unwrap();

        let mut pings = 0;
        let mut chats = Vec::new();
        while pings < 2 {
            let text = timeout(WAIT, frames.recv()).await.unwrap().unwrap();
            if text == HEARTBEAT {
                pings += 1;
            } else {
                chats.push(text);
            }
        }
        assert_eq!(chats, vec![r#"{"type":"chat","data":{"text":"hi"}}"#.to_string()]);

        f.client.close().await;
        assert!(!f.client.heartbeat_running());
        timeout(WAIT, server).await.unwrap().unwrap();
    }

    #[test]
    fn test_zero_heartbeat_interval_is_clamped() {
        let options = Options::new("/chat").heartbeat_interval(Duration::ZERO);
        assert_eq!(options.heartbeat_interval, MIN_HEARTBEAT_INTERVAL);

        let options = Options::new("/chat").heartbeat_interval(Duration::from_secs(10));
        assert_eq!(options.heartbeat_interval, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_dropped() {
        let f = fixture("ws://127.0.0.1:1", Options::new("/chat"));

        let err = f.client.send(&Message::new(json!(1))).await.unwrap_err();

        assert!(matches!(err, Error::NotConnected));
        assert_eq!(f.notifier.kinds(), vec![NoticeKind::NotConnected]);
    }

    #[tokio::test]
    async fn test_reconnect_stops_after_max_retries() {
        let (listener, base) = listen().await;
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        tokio::spawn(async move {
            loop {
                // accept tcp then hang up before the handshake
                let (tcp, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                drop(tcp);
            }
        });

        let mut f = fixture(
            &base,
            Options::new("/notify")
                .max_retries(2)
                .reconnect_delay(Duration::ZERO),
        );
        f.client.connect().unwrap();

        let mut closes = 0;
        while closes < 3 {
            if let Event::Close(close) = next_event(&mut f.events).await {
                assert_eq!(close.code, crate::ws::message::ABNORMAL);
                closes += 1;
            }
        }

        let mut state = f.client.state();
        timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Disconnected))
            .await
            .unwrap()
            .unwrap();
        sleep(Duration::from_millis(200)).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(
            f.notifier.kinds(),
            vec![
                NoticeKind::Reconnecting { attempt: 1, max: 2 },
                NoticeKind::Reconnecting { attempt: 2, max: 2 },
                NoticeKind::RealtimeUnreachable,
            ]
        );
        assert_eq!(f.client.retry_count(), 2);
    }

    #[tokio::test]
    async fn test_open_resets_retry_count() {
        let (listener, base) = listen().await;

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            drop(tcp);
            let (tcp, _) = listener.accept().await.unwrap();
            drop(tcp);
            let mut ws = {
                let (tcp, _) = listener.accept().await.unwrap();
                accept_async(tcp).await.unwrap()
            };
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut f = fixture(
            &base,
            Options::new("/notify")
                .max_retries(5)
                .reconnect_delay(Duration::from_millis(10)),
        );
        f.client.connect().unwrap();

        loop {
            if next_event(&mut f.events).await == Event::Open {
                break;
            }
        }

        assert_eq!(f.client.retry_count(), 0);
        assert_eq!(
            f.notifier.kinds(),
            vec![
                NoticeKind::Reconnecting { attempt: 1, max: 5 },
                NoticeKind::Reconnecting { attempt: 2, max: 5 },
            ]
        );

        f.client.close().await;
        timeout(WAIT, server).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_terminal_close_codes_never_reconnect() {
        for (code, notice) in [
            (AUTH_EXPIRED, NoticeKind::RealtimeAuthExpired),
            (crate::ws::message::POLICY_REJECTED, NoticeKind::RealtimeRejected),
        ] {
            let (listener, base) = listen().await;
            let accepted = Arc::new(AtomicUsize::new(0));

            let counter = accepted.clone();
            tokio::spawn(async move {
                loop {
                    let mut ws = accept(&listener).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    close_with(&mut ws, code).await;
                    while let Some(Ok(_)) = ws.next().await {}
                }
            });

            let mut f = fixture(
                &base,
                Options::new("/notify")
                    .max_retries(10)
                    .reconnect_delay(Duration::ZERO),
            );
            f.client.connect().unwrap();

            assert_eq!(next_event(&mut f.events).await, Event::Open);
            match next_event(&mut f.events).await {
                Event::Close(close) => assert_eq!(close.code, code),
                other => panic!("expect close, got {:?}", other),
            }

            sleep(Duration::from_millis(200)).await;

            assert_eq!(accepted.load(Ordering::SeqCst), 1);
            assert_eq!(f.notifier.kinds(), vec![notice]);
            assert_eq!(*f.client.state().borrow(), ConnectionState::Disconnected);
        }
    }

    #[tokio::test]
    async fn test_transient_close_code_reconnects() {
        let (listener, base) = listen().await;

        tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            close_with(&mut ws, 1011).await;
            while let Some(Ok(_)) = ws.next().await {}

            let mut ws = accept(&listener).await;
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut f = fixture(
            &base,
            Options::new("/notify").reconnect_delay(Duration::from_millis(10)),
        );
        f.client.connect().unwrap();

        assert_eq!(next_event(&mut f.events).await, Event::Open);
        assert!(matches!(next_event(&mut f.events).await, Event::Close(c) if c.code == 1011));
        assert_eq!(next_event(&mut f.events).await, Event::Open);
        assert_eq!(f.client.retry_count(), 0);

        f.client.close().await;
    }

    #[tokio::test]
    async fn test_single_heartbeat_across_reconnects() {
        let (listener, base) = listen().await;
        let (pings_tx, mut pings) = mpsc::unbounded_channel::<()>();

        tokio::spawn(async move {
            for _ in 0..2 {
                let mut ws = accept(&listener).await;
                sleep(Duration::from_millis(60)).await;
                close_with(&mut ws, 1012).await;
                while let Some(Ok(_)) = ws.next().await {}
            }

            let mut ws = accept(&listener).await;
            while let Some(Ok(frame)) = ws.next().await {
                if frame == Frame::Text(HEARTBEAT.to_string()) {
                    let _ = pings_tx.send(());
                }
            }
        });

        let mut f = fixture(
            &base,
            Options::new("/notify")
                .heartbeat_interval(Duration::from_millis(50))
                .reconnect_delay(Duration::from_millis(5)),
        );
        f.client.connect().unwrap();

        let mut opens = 0;
        while opens < 3 {
            if next_event(&mut f.events).await == Event::Open {
                opens += 1;
            }
        }

        sleep(Duration::from_millis(330)).await;

        let mut count = 0;
        while pings.try_recv().is_ok() {
            count += 1;
        }
        // one heartbeat sends about 6 times here, leaked ones would multiply it
        assert!((3..=8).contains(&count), "got {} heartbeats", count);

        f.client.close().await;
        assert!(!f.client.heartbeat_running());
    }

    #[tokio::test]
    async fn test_close_cancels_scheduled_reconnect() {
        let (listener, base) = listen().await;
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        tokio::spawn(async move {
            loop {
                let (tcp, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                drop(tcp);
            }
        });

        let f = fixture(
            &base,
            Options::new("/notify").reconnect_delay(Duration::from_millis(300)),
        );
        f.client.connect().unwrap();

        let mut state = f.client.state();
        timeout(
            WAIT,
            state.wait_for(|s| matches!(s, ConnectionState::ReconnectScheduled { .. })),
        )
        .await
        .unwrap()
        .unwrap();

        f.client.close().await;
        sleep(Duration::from_millis(500)).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(*f.client.state().borrow(), ConnectionState::Disconnected);

        // closing twice is fine
        f.client.close().await;
    }

    #[tokio::test]
    async fn test_connect_twice_keeps_one_connection() {
        let (listener, base) = listen().await;
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = accepted.clone();
        tokio::spawn(async move {
            loop {
                let mut ws = accept(&listener).await;
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });
            }
        });

        let mut f = fixture(&base, Options::new("/notify"));
        f.client.connect().unwrap();
        f.client.connect().unwrap();

        assert_eq!(next_event(&mut f.events).await, Event::Open);
        sleep(Duration::from_millis(100)).await;

        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        f.client.close().await;
    }
}
