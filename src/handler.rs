//! Connection handler: the per-session request/response loop.
//!
//! Owns one session end-to-end. Every inbound message draws the next value
//! from the shared counter and is answered on the same session, in order,
//! before the next message is read.

use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

use crate::counter::SequenceCounter;
use crate::session::Session;

/// Drive one session until the peer closes or the transport fails.
///
/// Each message is echoed back as `<message> - count=<n>` where `n` is the
/// process-wide sequence number for that message. A transport error aborts
/// this session only; counter values already drawn stay issued.
pub async fn handle_session<S>(
    mut session: Session<S>,
    counter: Arc<SequenceCounter>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(message) = session.recv().await? {
        let seq = counter.increment_and_get();
        trace!(seq, len = message.len(), "Echoing message");

        let response = format!("{message} - count={seq}");
        session.send(&response).await?;
    }

    Ok(())
}
