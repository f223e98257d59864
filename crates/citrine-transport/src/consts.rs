use std::time::Duration;

/// Largest datagram either side will emit.
pub const MAX_DATAGRAM_SIZE: usize = 1200;
/// Fixed header: 4-byte sequence / cumulative-ACK field plus 16 reserved bytes.
pub const HEADER_SIZE: usize = 20;
/// Payload capacity of a full data segment (one MSS).
pub const DATA_SIZE: usize = MAX_DATAGRAM_SIZE - HEADER_SIZE;

/// Sentinel payload of the end-of-stream segment.
pub const EOF_MARKER: &[u8] = b"EOF";
/// Payload of the ready datagram answering a transfer request.
pub const READY_MARKER: &[u8] = b"ACK";
/// Body of the transfer request datagram.
pub const REQUEST_BYTE: u8 = 0x01;

pub const INITIAL_RTO: Duration = Duration::from_secs(1);
pub const MIN_RTO: Duration = Duration::from_millis(50);
pub const MAX_RTO: Duration = Duration::from_secs(5);

/// Receive poll used by the fixed-window sender.
pub const FIXED_WINDOW_POLL: Duration = Duration::from_millis(50);
/// Slack added to the RTO when the CUBIC sender polls for ACKs.
pub const CUBIC_POLL_SLACK: Duration = Duration::from_millis(10);
/// Sleep applied when a send cycle neither admitted nor retransmitted anything.
pub const IDLE_YIELD: Duration = Duration::from_millis(10);

/// Duplicate-ACK count that triggers a fast retransmit.
pub const DUP_ACK_THRESHOLD: u32 = 3;
/// While in recovery, sweep for expired segments every this many duplicates.
pub const RECOVERY_SWEEP_EVERY: u32 = 100;

/// Per-attempt wait for the ready datagram during the request exchange.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
pub const MAX_REQUEST_ATTEMPTS: u32 = 5;
/// Cadence of the sender's waiting-for-request heartbeat.
pub const REQUEST_POLL: Duration = Duration::from_secs(10);

pub const MAX_EOF_ATTEMPTS: u32 = 10;
/// How many times the final ACK is repeated after the end-of-stream segment.
pub const FINAL_ACK_REPEAT: u32 = 5;
/// Receiver idle window before the current ACK is re-stated.
pub const RECEIVER_IDLE_TIMEOUT: Duration = Duration::from_secs(3);
