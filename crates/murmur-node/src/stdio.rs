//! Line-delimited JSON transport over stdin/stdout.
//!
//! One envelope per line in both directions. Inbound lines that fail to
//! decode are answered with an `error` body when the sender and `msg_id`
//! can still be recovered, and dropped otherwise. Logs go to stderr; stdout
//! carries nothing but protocol traffic.

use crate::error::TransportError;
use crate::protocol::Envelope;
use crate::transport::Transport;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of the inbound and outbound line queues.
pub const QUEUE_CAPACITY: usize = 1024;

/// Outbound half: envelopes are queued for a single writer task.
#[derive(Debug, Clone)]
pub struct StdioTransport {
    outbound: mpsc::Sender<Envelope>,
}

impl StdioTransport {
    pub fn new(outbound: mpsc::Sender<Envelope>) -> Self {
        Self { outbound }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn deliver(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// Wire the process's stdin/stdout up as a transport and an inbox. The
/// returned handle finishes once every clone of the transport is dropped
/// and the queued lines are flushed.
pub fn spawn_stdio() -> (Arc<StdioTransport>, mpsc::Receiver<Envelope>, JoinHandle<()>) {
    let (out_tx, out_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (in_tx, in_rx) = mpsc::channel(QUEUE_CAPACITY);
    let transport = Arc::new(StdioTransport::new(out_tx));

    let writer = tokio::spawn(async move {
        if let Err(err) = write_lines(tokio::io::stdout(), out_rx).await {
            warn!(error = %err, "stdout writer stopped");
        }
    });
    let replies = Arc::clone(&transport);
    tokio::spawn(read_lines(BufReader::new(tokio::io::stdin()), replies, in_tx));

    (transport, in_rx, writer)
}

/// Write every queued envelope as one line until the queue closes.
pub async fn write_lines<W>(mut writer: W, mut outbound: mpsc::Receiver<Envelope>) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = outbound.recv().await {
        let mut line = match envelope.encode() {
            Ok(line) => line,
            Err(err) => {
                warn!(dest = %envelope.dest, error = %err, "dropping unencodable envelope");
                continue;
            }
        };
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Decode lines from `reader` into `inbox` until EOF. Rejections for
/// undecodable lines go straight back out through `transport`.
pub async fn read_lines<R, T>(reader: R, transport: Arc<T>, inbox: mpsc::Sender<Envelope>)
where
    R: AsyncBufRead + Unpin,
    T: Transport,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "failed to read input");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match Envelope::decode(&line) {
            Ok(envelope) => {
                if inbox.send(envelope).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(error = %err, "rejecting input line");
                if let Some(rejection) = Envelope::rejection(&line, &err) {
                    if let Err(err) = transport.deliver(rejection).await {
                        debug!(error = %err, "failed to send rejection");
                    }
                }
            }
        }
    }
    debug!("input closed");
}
