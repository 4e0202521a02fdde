//! Message loop and process bootstrap.

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::node::Node;
use crate::protocol::{Envelope, Payload};
use crate::stdio;
use crate::transport::{Endpoint, Transport};
use murmur_core::NodeId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Extra time, beyond one rpc timeout, allowed for output to drain on exit.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

/// Drain `inbox` into `node`: replies complete pending rpcs, everything
/// else is handled on its own task so a slow handler never blocks the loop.
/// Returns once the inbox has closed and every handler has finished.
pub async fn run<T: Transport>(node: Arc<Node<T>>, mut inbox: mpsc::Receiver<Envelope>) {
    let mut handlers = JoinSet::new();
    loop {
        tokio::select! {
            envelope = inbox.recv() => {
                let Some(envelope) = envelope else {
                    break;
                };
                let Some(request) = node.endpoint().complete(envelope) else {
                    continue;
                };
                let node = Arc::clone(&node);
                handlers.spawn(async move { node.handle(request).await });
            }
            Some(_) = handlers.join_next(), if !handlers.is_empty() => {}
        }
    }
    while handlers.join_next().await.is_some() {}
    info!(node = %node.id(), "inbox closed, message loop stopped");
}

/// The controller's `init` request.
#[derive(Debug, Clone)]
pub struct Init {
    pub request: Envelope,
    pub node_id: NodeId,
    pub node_ids: Vec<NodeId>,
}

/// Wait for `init`. Anything that arrives first is refused as temporarily
/// unavailable, since there is no identity to answer with yet.
pub async fn await_init<T: Transport>(
    transport: &T,
    inbox: &mut mpsc::Receiver<Envelope>,
) -> Result<Init> {
    while let Some(envelope) = inbox.recv().await {
        if let Payload::Init { node_id, node_ids } = &envelope.body.payload {
            return Ok(Init {
                node_id: node_id.clone(),
                node_ids: node_ids.clone(),
                request: envelope,
            });
        }

        let err = NodeError::Uninitialized(envelope.body.payload.kind().to_string());
        warn!(from = %envelope.src, error = %err, "message before init");
        let refusal = envelope.answer(Payload::Error {
            code: err.code(),
            text: err.to_string(),
        });
        if let Some(refusal) = refusal {
            if let Err(err) = transport.deliver(refusal).await {
                debug!(error = %err, "failed to refuse early message");
            }
        }
    }
    Err(NodeError::Uninitialized("input closed before init".into()))
}

/// Bootstrap a node from `init` on `inbox`, then serve until the inbox
/// closes. The sync timer is stopped before returning.
pub async fn serve<T: Transport>(
    transport: Arc<T>,
    mut inbox: mpsc::Receiver<Envelope>,
    config: NodeConfig,
) -> Result<()> {
    let init = await_init(transport.as_ref(), &mut inbox).await?;

    let endpoint = Arc::new(Endpoint::new(init.node_id.clone(), transport));
    let node = Node::new(endpoint, init.node_ids, config);
    node.endpoint().reply(&init.request, Payload::InitOk).await?;
    info!(node = %node.id(), peers = node.cluster().len(), "initialized");

    node.start();
    run(Arc::clone(&node), inbox).await;
    node.stop();
    Ok(())
}

/// Run a node on stdin/stdout until input closes, then flush every reply
/// still queued for stdout.
pub async fn serve_stdio(config: NodeConfig) -> Result<()> {
    let (transport, inbox, writer) = stdio::spawn_stdio();
    // Rounds and relays still in flight keep the writer open until they end.
    let drain = config.rpc_timeout() + SHUTDOWN_GRACE;
    serve(transport, inbox, config).await?;

    match tokio::time::timeout(drain, writer).await {
        Ok(Ok(())) => debug!("output drained"),
        Ok(Err(err)) => warn!(error = %err, "stdout writer failed"),
        Err(_) => warn!(after = ?drain, "output did not drain before shutdown"),
    }
    Ok(())
}
