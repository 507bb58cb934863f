use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use wqueue::Queue;

use crate::config::ReceiptConfig;
use crate::error::ReceiptError;
use crate::lru::ReceiptThreadCtx;
use crate::protocol::{encode_report_body, ChannelIdKey, Cmd, Header, REPORT_HEADER_LEN};
use crate::task::{ConnectionTask, TaskStage};

/// One long-lived connection to a server's idempotency-receipt endpoint.
///
/// Tracks the handshake (`channel_id`/`key`), the pending-submission queue,
/// and the in-flight `waiting_resp` set that must survive a reconnect so a
/// retried send reports exactly the same req-ids, never fewer or more.
///
/// Always owned behind an `Arc` once handed to [`ReceiptChannel::deal_task`]:
/// establishment and cleanup register/remove the channel's own `Arc` with
/// the owning thread's [`ReceiptThreadCtx`], matching the original's
/// intrusive `dlink` membership in the thread's channel list.
pub struct ReceiptChannel {
    id: AtomicU32,
    key: AtomicU32,
    established: AtomicBool,
    /// Guards re-entrant processing of the same connection's I/O event,
    /// mirroring the original's `in_ioevent` flag; cleared on
    /// [`ReceiptChannel::cleanup`] (`receipt_task_finish_cleanup`).
    in_ioevent: AtomicBool,
    max_body_len: usize,
    queue: Queue<u64>,
    waiting_resp: Mutex<VecDeque<u64>>,
    handshake_lock: Mutex<()>,
    handshake_cond: Condvar,
    last_pkg_time: Mutex<Instant>,
}

impl ReceiptChannel {
    #[must_use]
    pub fn new(config: &ReceiptConfig) -> Self {
        Self {
            id: AtomicU32::new(config.channel_id),
            key: AtomicU32::new(config.channel_key),
            established: AtomicBool::new(false),
            in_ioevent: AtomicBool::new(false),
            max_body_len: config.max_body_len,
            queue: Queue::new(),
            waiting_resp: Mutex::new(VecDeque::new()),
            handshake_lock: Mutex::new(()),
            handshake_cond: Condvar::new(),
            last_pkg_time: Mutex::new(Instant::now()),
        }
    }

    #[must_use]
    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_in_ioevent(&self) -> bool {
        self.in_ioevent.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn channel_id(&self) -> u32 {
        self.id.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn channel_key(&self) -> u32 {
        self.key.load(Ordering::Acquire)
    }

    /// Queues one req-id to be reported as received, whether or not the
    /// channel is established yet.
    pub fn submit_receipt(&self, req_id: u64) {
        self.queue.push_back(req_id);
    }

    /// Blocks the calling thread until the channel becomes established or
    /// `timeout` elapses. Returns whether it became established.
    #[must_use]
    pub fn wait_established(&self, timeout: Duration) -> bool {
        if self.is_established() {
            return true;
        }
        let guard = self.handshake_lock.lock().unwrap();
        let (_guard, _timeout_result) = self
            .handshake_cond
            .wait_timeout_while(guard, timeout, |()| !self.is_established())
            .unwrap();
        self.is_established()
    }

    #[must_use]
    pub fn last_pkg_time(&self) -> Instant {
        *self.last_pkg_time.lock().unwrap()
    }

    fn touch(&self) {
        *self.last_pkg_time.lock().unwrap() = Instant::now();
    }

    /// Whether there is any submission in flight awaiting a server
    /// response — used by the recv-timeout policy (`on_recv_timeout`).
    #[must_use]
    pub fn has_in_flight(&self) -> bool {
        !self.waiting_resp.lock().unwrap().is_empty()
    }

    /// Entry point for the connection's deal-task callback. `lru` is the
    /// owning I/O thread's channel list, which establishment registers
    /// into and every successful response touches to the tail.
    pub fn deal_task(
        self: &Arc<Self>,
        task: &mut dyn ConnectionTask,
        stage: TaskStage<'_>,
        lru: &ReceiptThreadCtx,
    ) -> Result<(), ReceiptError> {
        self.in_ioevent.store(true, Ordering::Release);

        match stage {
            TaskStage::Handshake => self.send_setup_channel_request(task),
            TaskStage::Continue => {
                if self.is_established() {
                    self.report_req_receipt_request(task)
                } else {
                    Ok(())
                }
            }
            TaskStage::Response { cmd, status, body } => {
                if status != 0 {
                    let message = String::from_utf8_lossy(body).into_owned();
                    return Err(ReceiptError::ServerStatus { cmd, status, message });
                }
                match Cmd::try_from(cmd) {
                    Ok(Cmd::SetupChannelResp) => self.deal_setup_channel_response(body, lru)?,
                    Ok(Cmd::ReportReqReceiptResp) => self.deal_report_req_receipt_response(body)?,
                    _ => return Err(ReceiptError::UnexpectedCommand(cmd)),
                }
                self.touch();
                lru.touch(self);
                self.report_req_receipt_request(task)
            }
        }
    }

    /// Recv-timeout policy: timing out with nothing in flight is benign
    /// (there was simply nothing to report); timing out with an
    /// unacknowledged send is an error the caller should reconnect on.
    pub fn on_recv_timeout(&self) -> Result<(), ReceiptError> {
        if self.has_in_flight() {
            Err(ReceiptError::TimedOut)
        } else {
            Ok(())
        }
    }

    /// Detaches the channel from its thread's LRU chain and resets the
    /// established/in-ioevent flags so a subsequent reconnect re-runs the
    /// handshake cleanly (`receipt_task_finish_cleanup`).
    ///
    /// `waiting_resp` is left untouched: the in-flight req-ids it holds
    /// must survive the reconnect and are spliced back onto the queue once
    /// `deal_setup_channel_response` re-establishes the channel.
    pub fn cleanup(self: &Arc<Self>, lru: &ReceiptThreadCtx) {
        lru.remove(self);
        self.established.store(false, Ordering::Release);
        self.in_ioevent.store(false, Ordering::Release);
    }

    fn send_setup_channel_request(&self, task: &mut dyn ConnectionTask) -> Result<(), ReceiptError> {
        let pair = ChannelIdKey {
            channel_id: self.channel_id(),
            key: self.channel_key(),
        };
        let body = pair.encode();
        let header = Header::new(Cmd::SetupChannelReq, body.len() as u32);
        let mut frame = header.encode().to_vec();
        frame.extend_from_slice(&body);
        task.send(&frame)?;
        Ok(())
    }

    fn deal_setup_channel_response(self: &Arc<Self>, body: &[u8], lru: &ReceiptThreadCtx) -> Result<(), ReceiptError> {
        let body: [u8; 8] = body.try_into().map_err(|_| ReceiptError::InvalidBodyLength {
            expected: 8,
            actual: body.len(),
        })?;
        if self.is_established() {
            tracing::warn!("unexpected SETUP_CHANNEL_RESP on an already-established channel, ignoring");
            return Ok(());
        }

        let pair = ChannelIdKey::decode(&body);
        self.id.store(pair.channel_id, Ordering::Release);
        self.key.store(pair.key, Ordering::Release);
        self.established.store(true, Ordering::Release);
        lru.register(Arc::clone(self));

        let _guard = self.handshake_lock.lock().unwrap();
        self.handshake_cond.notify_all();
        drop(_guard);

        // Anything queued while unestablished (e.g. a retry carried over a
        // reconnect) goes back to the head of the main queue so it is
        // resent rather than silently dropped.
        let mut waiting = self.waiting_resp.lock().unwrap();
        if !waiting.is_empty() {
            let carried: Vec<u64> = waiting.drain(..).collect();
            self.queue.push_front_list(carried);
        }
        Ok(())
    }

    fn deal_report_req_receipt_response(&self, body: &[u8]) -> Result<(), ReceiptError> {
        if !body.is_empty() {
            return Err(ReceiptError::InvalidBodyLength {
                expected: 0,
                actual: body.len(),
            });
        }
        let mut waiting = self.waiting_resp.lock().unwrap();
        if waiting.is_empty() {
            tracing::warn!("unexpected REPORT_REQ_RECEIPT_RESP with nothing in flight, ignoring");
            return Ok(());
        }
        waiting.clear();
        Ok(())
    }

    /// Builds and sends the next report-receipt batch, or re-arms the
    /// read-only event if there was nothing to report.
    fn report_req_receipt_request(&self, task: &mut dyn ConnectionTask) -> Result<(), ReceiptError> {
        match self.build_batch() {
            Some(body) => {
                let header = Header::new(Cmd::ReportReqReceiptReq, body.len() as u32);
                let mut frame = header.encode().to_vec();
                frame.extend_from_slice(&body);
                task.send(&frame)?;
            }
            None => {
                task.set_read_event()?;
            }
        }
        Ok(())
    }

    /// Moves queued req-ids into `waiting_resp` (if it is currently empty)
    /// and encodes as many as fit in `max_body_len`, splitting the rest
    /// back onto the head of the main queue so a following batch picks up
    /// exactly where this one left off.
    ///
    /// Returns `None` when there is nothing to report, or when a batch is
    /// already in flight awaiting the server's response — a response must
    /// arrive (or the connection must reconnect) before another is sent,
    /// matching `check_report_req_receipt`'s `waiting_resp_qinfo.head !=
    /// NULL` guard. The caller should re-arm the read event rather than
    /// send an empty frame.
    fn build_batch(&self) -> Option<Vec<u8>> {
        let mut waiting = self.waiting_resp.lock().unwrap();
        if !waiting.is_empty() {
            return None;
        }

        waiting.extend(self.queue.try_pop_all());
        if waiting.is_empty() {
            return None;
        }

        let max_entries = self.max_body_len.saturating_sub(REPORT_HEADER_LEN) / 8;
        if max_entries == 0 {
            return None;
        }

        let send_count = waiting.len().min(max_entries);
        if send_count < waiting.len() {
            let remainder: Vec<u64> = waiting.drain(send_count..).collect();
            self.queue.push_front_list(remainder);
        }

        let to_send: Vec<u64> = waiting.iter().copied().collect();
        Some(encode_report_body(&to_send))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingTask {
        sent: Vec<Vec<u8>>,
        read_armed: bool,
    }

    impl ConnectionTask for RecordingTask {
        fn send(&mut self, frame: &[u8]) -> std::io::Result<()> {
            self.sent.push(frame.to_vec());
            Ok(())
        }

        fn set_read_event(&mut self) -> std::io::Result<()> {
            self.read_armed = true;
            Ok(())
        }
    }

    fn channel(max_body_len: usize) -> Arc<ReceiptChannel> {
        Arc::new(ReceiptChannel::new(&ReceiptConfig::new(max_body_len)))
    }

    #[test]
    fn handshake_sends_setup_channel_request() {
        let channel = channel(256);
        let lru = ReceiptThreadCtx::new();
        let mut task = RecordingTask::default();
        channel.deal_task(&mut task, TaskStage::Handshake, &lru).unwrap();

        assert_eq!(task.sent.len(), 1);
        let header = Header::decode(&task.sent[0][..9].try_into().unwrap());
        assert_eq!(header.cmd, Cmd::SetupChannelReq.as_u8());
    }

    #[test]
    fn setup_response_establishes_channel_and_wakes_waiters() {
        let channel = channel(256);
        let lru = ReceiptThreadCtx::new();
        let body = ChannelIdKey { channel_id: 9, key: 123 }.encode();
        let mut task = RecordingTask::default();

        channel
            .deal_task(
                &mut task,
                TaskStage::Response { cmd: Cmd::SetupChannelResp.as_u8(), status: 0, body: &body },
                &lru,
            )
            .unwrap();

        assert!(channel.is_established());
        assert_eq!(channel.channel_id(), 9);
        assert_eq!(channel.channel_key(), 123);
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn continue_before_established_is_a_noop() {
        let channel = channel(256);
        let lru = ReceiptThreadCtx::new();
        channel.submit_receipt(1);
        let mut task = RecordingTask::default();
        channel.deal_task(&mut task, TaskStage::Continue, &lru).unwrap();
        assert!(task.sent.is_empty());
        assert!(!task.read_armed);
    }

    fn establish(channel: &Arc<ReceiptChannel>, lru: &ReceiptThreadCtx) {
        let body = ChannelIdKey { channel_id: 1, key: 1 }.encode();
        let mut task = RecordingTask::default();
        channel
            .deal_task(
                &mut task,
                TaskStage::Response { cmd: Cmd::SetupChannelResp.as_u8(), status: 0, body: &body },
                lru,
            )
            .unwrap();
    }

    #[test]
    fn continue_after_established_reports_queued_receipts() {
        let channel = channel(256);
        let lru = ReceiptThreadCtx::new();
        establish(&channel, &lru);
        channel.submit_receipt(10);
        channel.submit_receipt(20);

        let mut task = RecordingTask::default();
        channel.deal_task(&mut task, TaskStage::Continue, &lru).unwrap();

        assert_eq!(task.sent.len(), 1);
        assert!(channel.has_in_flight());
    }

    #[test]
    fn report_response_clears_in_flight_set() {
        let channel = channel(256);
        let lru = ReceiptThreadCtx::new();
        establish(&channel, &lru);
        channel.submit_receipt(10);
        let mut task = RecordingTask::default();
        channel.deal_task(&mut task, TaskStage::Continue, &lru).unwrap();
        assert!(channel.has_in_flight());

        channel
            .deal_task(
                &mut task,
                TaskStage::Response { cmd: Cmd::ReportReqReceiptResp.as_u8(), status: 0, body: &[] },
                &lru,
            )
            .unwrap();
        assert!(!channel.has_in_flight());
    }

    #[test]
    fn build_batch_splits_when_it_overflows_max_body_len() {
        // REPORT_HEADER_LEN(4) + 1*8 == 12, so max_body_len=12 fits exactly one entry.
        let channel = channel(12);
        let lru = ReceiptThreadCtx::new();
        establish(&channel, &lru);
        channel.submit_receipt(1);
        channel.submit_receipt(2);
        channel.submit_receipt(3);

        let mut task = RecordingTask::default();
        channel.deal_task(&mut task, TaskStage::Continue, &lru).unwrap();
        let body = &task.sent[0][9..];
        assert_eq!(u32::from_be_bytes(body[0..4].try_into().unwrap()), 1);

        // Remaining two were pushed back to the queue head for the next round.
        channel
            .deal_task(
                &mut task,
                TaskStage::Response { cmd: Cmd::ReportReqReceiptResp.as_u8(), status: 0, body: &[] },
                &lru,
            )
            .unwrap();
        assert_eq!(task.sent.len(), 2);
        let second_body = &task.sent[1][9..];
        assert_eq!(u32::from_be_bytes(second_body[0..4].try_into().unwrap()), 2);
    }

    #[test]
    fn no_batch_is_sent_while_one_is_already_in_flight() {
        let channel = channel(256);
        let lru = ReceiptThreadCtx::new();
        establish(&channel, &lru);
        channel.submit_receipt(1);

        let mut task = RecordingTask::default();
        channel.deal_task(&mut task, TaskStage::Continue, &lru).unwrap();
        assert_eq!(task.sent.len(), 1);

        // A second req-id arrives while the first batch is still
        // unacknowledged (e.g. a heartbeat tick driving Continue again).
        channel.submit_receipt(2);
        channel.deal_task(&mut task, TaskStage::Continue, &lru).unwrap();

        // No second send: build_batch must refuse while waiting_resp holds
        // an un-acked batch, and re-arm the read event instead.
        assert_eq!(task.sent.len(), 1);
        assert!(task.read_armed);
    }

    #[test]
    fn nothing_queued_arms_read_event_instead_of_sending() {
        let channel = channel(256);
        let lru = ReceiptThreadCtx::new();
        establish(&channel, &lru);
        let mut task = RecordingTask::default();
        channel.deal_task(&mut task, TaskStage::Continue, &lru).unwrap();
        assert!(task.read_armed);
    }

    #[test]
    fn server_error_status_surfaces_as_server_status_error() {
        let channel = channel(256);
        let lru = ReceiptThreadCtx::new();
        let mut task = RecordingTask::default();
        let err = channel
            .deal_task(
                &mut task,
                TaskStage::Response { cmd: Cmd::SetupChannelResp.as_u8(), status: 5, body: b"nope" },
                &lru,
            )
            .unwrap_err();
        assert!(matches!(err, ReceiptError::ServerStatus { status: 5, .. }));
    }

    #[test]
    fn on_recv_timeout_errors_only_with_in_flight_work() {
        let channel = channel(256);
        let lru = ReceiptThreadCtx::new();
        assert!(channel.on_recv_timeout().is_ok());

        establish(&channel, &lru);
        channel.submit_receipt(1);
        let mut task = RecordingTask::default();
        channel.deal_task(&mut task, TaskStage::Continue, &lru).unwrap();
        assert!(channel.on_recv_timeout().is_err());
    }

    #[test]
    fn cleanup_detaches_from_lru_and_resets_flags_without_touching_waiting_resp() {
        let channel = channel(256);
        let lru = ReceiptThreadCtx::new();
        establish(&channel, &lru);
        channel.submit_receipt(1);
        let mut task = RecordingTask::default();
        channel.deal_task(&mut task, TaskStage::Continue, &lru).unwrap();
        assert!(channel.has_in_flight());
        assert_eq!(lru.len(), 1);

        channel.cleanup(&lru);

        assert!(!channel.is_established());
        assert!(!channel.is_in_ioevent());
        assert!(lru.is_empty());
        // waiting_resp survives the reconnect so it can be spliced back
        // onto the queue once the channel re-establishes.
        assert!(channel.has_in_flight());
    }

    #[test]
    fn reconnect_splices_waiting_resp_back_onto_queue_after_re_establishment() {
        let channel = channel(256);
        let lru = ReceiptThreadCtx::new();
        establish(&channel, &lru);
        channel.submit_receipt(1);
        channel.submit_receipt(2);
        channel.submit_receipt(3);
        let mut task = RecordingTask::default();
        channel.deal_task(&mut task, TaskStage::Continue, &lru).unwrap();
        assert!(channel.has_in_flight());

        channel.cleanup(&lru);
        assert!(!channel.is_established());

        establish(&channel, &lru);
        assert!(channel.is_established());

        // The reconnect's own deal_task call drives report_req_receipt_request,
        // which re-sends exactly the three carried-over req-ids.
        let last_sent = task.sent.last().unwrap();
        let body = &last_sent[9..];
        assert_eq!(u32::from_be_bytes(body[0..4].try_into().unwrap()), 3);
    }
}
