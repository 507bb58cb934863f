//! Abstraction over the network loop's per-connection primitives.
//!
//! The original wires a receipt channel directly into the shared I/O event
//! loop (`sf_send_add_event`, `sf_set_read_event`, `sf_task_detach_thread`):
//! collaborators this crate treats as out of scope. [`ConnectionTask`] gives
//! [`crate::channel::ReceiptChannel`] a narrow interface onto those
//! primitives so its state machine is testable against an in-memory double
//! instead of a real socket.

use std::io;

/// Per-connection primitives a [`crate::channel::ReceiptChannel`] needs from
/// its owning network loop.
pub trait ConnectionTask {
    /// Queues `frame` (a full header+body) for send and arms the write-ready
    /// event (`sf_send_add_event`).
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Re-arms the read-only event with nothing queued to send
    /// (`sf_set_read_event`), used when there was nothing to report.
    fn set_read_event(&mut self) -> io::Result<()>;
}

/// Which point in the connection lifecycle [`crate::channel::ReceiptChannel::deal_task`]
/// is being asked to handle.
pub enum TaskStage<'a> {
    /// The connection just finished its transport handshake; send the
    /// setup-channel request.
    Handshake,
    /// The event loop is re-entering with nothing new to read; either a
    /// heartbeat tick or the post-send continuation.
    Continue,
    /// A full response frame (header already parsed, `body` is everything
    /// after it) arrived from the server.
    Response { cmd: u8, status: u16, body: &'a [u8] },
}
