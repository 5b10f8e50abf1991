//! Concurrent, paginated fetching of events from relays.
//!
//! Each relay gets its own task that pages backwards in time until a page
//! brings nothing new. Events flow through a bounded channel, so a slow
//! consumer throttles the relays instead of buffering without limit.

use std::{collections::HashSet, io::Write, time::Duration};

use anyhow::{anyhow, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::{
    client_async_tls, tungstenite::client::IntoClientRequest, tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    event::Event,
    filter::{Filter, TimeRange},
    input::DumpParams,
};

/// Maximum number of events requested per page.
const PAGE_LIMIT: u32 = 5000;
const CHANNEL_CAPACITY: usize = 1000;
const SUBSCRIPTION_ID: &str = "nosdump";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const EOSE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOptions {
    pub skip_verification: bool,
    /// SOCKS5 proxy (`host:port`) used for every relay connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

/// Limits on how long a relay may stay silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP connect, optional SOCKS5 negotiation and the WebSocket handshake.
    pub connect: Duration,
    /// Gap between two messages while waiting for `EOSE` on a page.
    pub eose: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: CONNECT_TIMEOUT,
            eose: EOSE_TIMEOUT,
        }
    }
}

/// Owns the per-relay fetch tasks.
#[derive(Debug, Default)]
pub struct Fetcher {
    tasks: Vec<JoinHandle<()>>,
    timeouts: Timeouts,
}

impl Fetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start fetching every event matching `filter` within `range` from all
    /// `relays`. The returned channel closes once every relay is exhausted.
    ///
    /// Events are deduplicated per relay only; the same event coming from two
    /// relays is delivered twice.
    pub fn all_events(
        &mut self,
        relays: &[String],
        filter: &Filter,
        range: TimeRange,
        opts: &FetchOptions,
    ) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        for relay in relays {
            let relay = relay.clone();
            let filter = filter.clone();
            let opts = opts.clone();
            let tx = tx.clone();
            let timeouts = self.timeouts;
            self.tasks.push(tokio::spawn(async move {
                if let Err(e) = fetch_relay(&relay, &filter, range, &opts, timeouts, &tx).await {
                    warn!(relay = %relay, error = %e, "failed to fetch events");
                }
            }));
        }
        rx
    }

    /// Abort every relay task still running.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Fetcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Fetch everything described by `params`, writing each unique event to `out`
/// as one JSON line. Returns the number of events written.
pub async fn dump<W: Write>(params: &DumpParams, out: &mut W) -> Result<usize> {
    let mut fetcher = Fetcher::new();
    let mut events = fetcher.all_events(
        &params.relay_urls,
        &params.fetch_filter,
        params.fetch_time_range,
        &params.fetch_options,
    );

    let mut seen = HashSet::new();
    while let Some(ev) = events.recv().await {
        if !seen.insert(ev.id.clone()) {
            continue;
        }
        serde_json::to_writer(&mut *out, &ev)?;
        writeln!(out)?;
    }
    out.flush()?;
    fetcher.shutdown();
    info!(count = seen.len(), "dump finished");
    Ok(seen.len())
}

/// Page backwards through one relay, sending fresh events to `tx`.
async fn fetch_relay(
    relay: &str,
    filter: &Filter,
    range: TimeRange,
    opts: &FetchOptions,
    timeouts: Timeouts,
    tx: &mpsc::Sender<Event>,
) -> Result<()> {
    let mut ws = timeout(timeouts.connect, connect_ws(relay, opts.proxy.as_deref()))
        .await
        .map_err(|_| anyhow!("connection timed out after {:?}", timeouts.connect))??;
    debug!(relay, "connected");

    let mut seen = HashSet::new();
    let mut until = range.until;
    loop {
        let req = json!([
            "REQ",
            SUBSCRIPTION_ID,
            Value::Object(filter.to_req_json(range.since, until, Some(PAGE_LIMIT)))
        ]);
        ws.send(Message::Text(req.to_string())).await?;

        let mut oldest: Option<u64> = None;
        let mut fresh = 0usize;
        let mut connection_open = false;
        while let Some(msg) = timeout(timeouts.eose, ws.next())
            .await
            .map_err(|_| anyhow!("no EOSE within {:?}", timeouts.eose))?
        {
            let txt = match msg? {
                Message::Text(txt) => txt,
                Message::Close(_) => break,
                _ => continue,
            };
            match RelayMessage::parse(&txt) {
                Some(RelayMessage::Event(ev)) => {
                    oldest = Some(oldest.map_or(ev.created_at, |o| o.min(ev.created_at)));
                    if !seen.insert(ev.id.clone()) {
                        continue;
                    }
                    fresh += 1;
                    if !opts.skip_verification {
                        if let Err(e) = ev.verify() {
                            debug!(relay, id = %ev.id, error = %e, "dropping invalid event");
                            continue;
                        }
                    }
                    if tx.send(*ev).await.is_err() {
                        // receiver gone, nobody wants more events
                        return Ok(());
                    }
                }
                Some(RelayMessage::Eose) => {
                    connection_open = true;
                    break;
                }
                Some(RelayMessage::Closed(reason)) => {
                    debug!(relay, %reason, "subscription closed by relay");
                    connection_open = true;
                    break;
                }
                Some(RelayMessage::Notice(notice)) => debug!(relay, %notice, "notice"),
                None => {}
            }
        }
        if !connection_open {
            debug!(relay, "connection closed");
            return Ok(());
        }
        ws.send(Message::Text(json!(["CLOSE", SUBSCRIPTION_ID]).to_string()))
            .await?;

        match oldest {
            Some(ts) if fresh > 0 => until = Some(ts),
            _ => break,
        }
    }
    ws.close(None).await.ok();
    Ok(())
}

/// Relay-to-client messages the fetcher cares about.
enum RelayMessage {
    Event(Box<Event>),
    Eose,
    Closed(String),
    Notice(String),
}

impl RelayMessage {
    fn parse(txt: &str) -> Option<Self> {
        let val: Value = serde_json::from_str(txt).ok()?;
        let arr = val.as_array()?;
        match arr.first()?.as_str()? {
            "EVENT" if arr.len() >= 3 => serde_json::from_value(arr[2].clone())
                .ok()
                .map(|ev| RelayMessage::Event(Box::new(ev))),
            "EOSE" => Some(RelayMessage::Eose),
            "CLOSED" => Some(RelayMessage::Closed(
                arr.get(2).and_then(Value::as_str).unwrap_or_default().to_string(),
            )),
            "NOTICE" => Some(RelayMessage::Notice(
                arr.get(1).and_then(Value::as_str).unwrap_or_default().to_string(),
            )),
            _ => None,
        }
    }
}

type BoxedStream = Box<dyn AsyncReadWrite + Unpin + Send>;

/// Establish a WebSocket connection (TLS for `wss`), optionally via a SOCKS5 proxy.
async fn connect_ws(
    relay: &str,
    proxy: Option<&str>,
) -> Result<WebSocketStream<MaybeTlsStream<BoxedStream>>> {
    let url = Url::parse(relay)?;
    let host = url.host_str().ok_or_else(|| anyhow!("missing host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("missing port"))?;
    let req = relay.into_client_request()?;
    let stream: BoxedStream = if let Some(proxy) = proxy {
        Box::new(Socks5Stream::connect(proxy, (host, port)).await?)
    } else {
        Box::new(TcpStream::connect((host, port)).await?)
    };
    let (ws, _) = client_async_tls(req, stream).await?;
    Ok(ws)
}

/// Blanket trait for boxed async read/write streams.
trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}
