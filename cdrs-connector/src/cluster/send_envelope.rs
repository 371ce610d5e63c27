use std::sync::Arc;
use tracing::*;

use crate::cluster::topology::Node;
use crate::frame::Envelope;
use crate::protocol_error::Result;
use crate::retry::{QueryInfo, RetryDecision, RetrySession};
use crate::transport::CdrsTransport;

/// Mid-level interface for sending envelopes to the cluster. Uses a query plan to route the
/// envelope to the appropriate node, and retry policy for error handling. Returns `None` if no
/// nodes were present in the query plan.
pub async fn send_envelope<T: CdrsTransport + 'static>(
    query_plan: impl Iterator<Item = Arc<Node<T>>>,
    envelope: &Envelope,
    is_idempotent: bool,
    mut retry_session: Box<dyn RetrySession + Send + Sync>,
) -> Option<Result<Envelope>> {
    let mut result = None;

    'next_node: for node in query_plan {
        loop {
            let connection = node.persistent_connection().await;
            match connection {
                Ok(connection) => match connection.write_envelope(envelope).await {
                    Ok(envelope) => return Some(Ok(envelope)),
                    Err(error) => {
                        let query_info = QueryInfo {
                            error: &error,
                            is_idempotent,
                        };

                        let decision = retry_session.decide(query_info);
                        debug!(address = %node.address(), %error, %decision, "Request failed.");

                        match decision {
                            RetryDecision::RetrySameNode => continue,
                            RetryDecision::RetryNextNode => {
                                result = Some(Err(error));
                                continue 'next_node;
                            }
                            RetryDecision::DontRetry => return Some(Err(error)),
                        }
                    }
                },
                // save the error, but keep trying, since another node might be up
                Err(error) => {
                    result = Some(Err(error));
                    continue 'next_node;
                }
            }
        }
    }

    result
}
