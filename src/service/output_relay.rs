/// Output relay: pty output → `output` frames
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::protocol::{Frame, OutputDecoder};
use crate::pty::AsyncPty;

/// Outbound frames for one connection, in emission order
pub type FrameSender = mpsc::UnboundedSender<Frame>;

/// What one relay run moved
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Chunks read from the pty
    pub chunks: u64,
    /// Raw bytes read from the pty
    pub bytes: u64,
    /// Frames that could not be handed to the transport
    pub dropped_frames: u64,
}

/// Drain `pty` until end of stream, emitting each chunk as an `output` frame.
///
/// Stops on EOF or a read error without emitting anything for it; the exit
/// status is reported by whoever awaits the process. A failed send is
/// counted and logged, and reading continues.
pub async fn run_output_relay(
    pty: Arc<dyn AsyncPty>,
    outbound: FrameSender,
    session_id: String,
) -> RelayStats {
    let mut decoder = OutputDecoder::new();
    let mut stats = RelayStats::default();

    loop {
        match pty.read_output_chunk().await {
            Ok(Some(chunk)) => {
                stats.chunks += 1;
                stats.bytes += chunk.len() as u64;
                trace!("Relay {}: {} bytes", session_id, chunk.len());

                let text = decoder.decode(&chunk);
                if !text.is_empty() {
                    emit(&outbound, text, &mut stats, &session_id);
                }
            }
            Ok(None) => {
                debug!("Relay {}: end of output", session_id);
                break;
            }
            Err(e) => {
                debug!("Relay {}: stopped on read error: {}", session_id, e);
                break;
            }
        }
    }

    if let Some(rest) = decoder.finish() {
        emit(&outbound, rest, &mut stats, &session_id);
    }

    debug!(
        "Relay {} finished: {} chunks, {} bytes, {} dropped frames",
        session_id, stats.chunks, stats.bytes, stats.dropped_frames
    );
    stats
}

fn emit(outbound: &FrameSender, text: String, stats: &mut RelayStats, session_id: &str) {
    if outbound.send(Frame::output(text)).is_err() {
        stats.dropped_frames += 1;
        if stats.dropped_frames == 1 {
            warn!("Relay {}: transport gone, discarding output", session_id);
        }
    }
}
