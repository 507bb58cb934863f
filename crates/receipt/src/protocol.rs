//! Big-endian wire framing for the idempotency-receipt protocol.
//!
//! Every frame starts with a fixed [`Header`]; the original builds every
//! protocol header and body by hand with `int2buff`/`long2buff` macros
//! writing big-endian integers straight into the task's send buffer. The
//! shapes here are the Rust equivalent: fixed-size structs with explicit
//! `encode`/`decode` methods using `to_be_bytes`/`from_be_bytes`.

/// Size in bytes of an encoded [`Header`].
pub const HEADER_LEN: usize = 9;

/// `channel_id` + `key`, the shape shared by the setup-channel request and
/// response bodies.
pub const CHANNEL_ID_KEY_LEN: usize = 8;

/// Size in bytes of one req-id entry in a report-receipt body.
pub const RECEIPT_ENTRY_LEN: usize = 8;

/// Size in bytes of the report-receipt request header (just a count).
pub const REPORT_HEADER_LEN: usize = 4;

/// Protocol commands exchanged over a receipt channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmd {
    SetupChannelReq,
    SetupChannelResp,
    ReportReqReceiptReq,
    ReportReqReceiptResp,
}

impl Cmd {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Cmd::SetupChannelReq => 1,
            Cmd::SetupChannelResp => 2,
            Cmd::ReportReqReceiptReq => 3,
            Cmd::ReportReqReceiptResp => 4,
        }
    }
}

impl TryFrom<u8> for Cmd {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            1 => Ok(Cmd::SetupChannelReq),
            2 => Ok(Cmd::SetupChannelResp),
            3 => Ok(Cmd::ReportReqReceiptReq),
            4 => Ok(Cmd::ReportReqReceiptResp),
            other => Err(other),
        }
    }
}

/// Fixed frame header: `cmd`, `status`, two reserved bytes, then the
/// big-endian body length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub cmd: u8,
    pub status: u16,
    pub flags: u8,
    pub padding: u8,
    pub body_len: u32,
}

impl Header {
    #[must_use]
    pub fn new(cmd: Cmd, body_len: u32) -> Self {
        Self {
            cmd: cmd.as_u8(),
            status: 0,
            flags: 0,
            padding: 0,
            body_len,
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.cmd;
        buf[1..3].copy_from_slice(&self.status.to_be_bytes());
        buf[3] = self.flags;
        buf[4] = self.padding;
        buf[5..9].copy_from_slice(&self.body_len.to_be_bytes());
        buf
    }

    #[must_use]
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            cmd: buf[0],
            status: u16::from_be_bytes([buf[1], buf[2]]),
            flags: buf[3],
            padding: buf[4],
            body_len: u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]),
        }
    }
}

/// `channel_id`/`key` pair carried by both the setup-channel request and
/// response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelIdKey {
    pub channel_id: u32,
    pub key: u32,
}

impl ChannelIdKey {
    #[must_use]
    pub fn encode(&self) -> [u8; CHANNEL_ID_KEY_LEN] {
        let mut buf = [0u8; CHANNEL_ID_KEY_LEN];
        buf[0..4].copy_from_slice(&self.channel_id.to_be_bytes());
        buf[4..8].copy_from_slice(&self.key.to_be_bytes());
        buf
    }

    #[must_use]
    pub fn decode(buf: &[u8; CHANNEL_ID_KEY_LEN]) -> Self {
        Self {
            channel_id: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            key: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

/// Encodes a report-receipt request body: a 4-byte count followed by one
/// big-endian `u64` per req-id. The caller (`build_batch` in
/// `crate::channel`) is responsible for truncating `req_ids` to fit the
/// send buffer before calling this.
#[must_use]
pub fn encode_report_body(req_ids: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(REPORT_HEADER_LEN + req_ids.len() * RECEIPT_ENTRY_LEN);
    buf.extend_from_slice(&(req_ids.len() as u32).to_be_bytes());
    for id in req_ids {
        buf.extend_from_slice(&id.to_be_bytes());
    }
    buf
}
