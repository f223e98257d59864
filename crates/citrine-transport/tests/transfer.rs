//! End-to-end transfers over real loopback sockets.
//!
//! Loss scenarios run through a small relay that forwards datagrams between
//! the two sides and drops selected ones on the way.

use bytes::Bytes;
use citrine_transport::TransportError;
use citrine_transport::congestion::{CongestionControl, Cubic, FixedWindow};
use citrine_transport::consts::{DATA_SIZE, HEADER_SIZE};
use citrine_transport::receiver::FileReceiver;
use citrine_transport::sender::FileSender;
use rand::RngCore;
use std::collections::HashSet;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

fn random_bytes(len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    rand::rng().fill_bytes(&mut data);
    Bytes::from(data)
}

async fn run_transfer<C>(data: Bytes, congestion: C) -> Bytes
where
    C: CongestionControl + Send + 'static,
{
    let sender = FileSender::bind("127.0.0.1:0".parse().unwrap(), data, congestion)
        .await
        .unwrap();
    let addr = sender.local_addr().unwrap();
    let serving = tokio::spawn(sender.serve());

    let receiver = FileReceiver::connect(addr).await.unwrap();
    let received = receiver.receive().await.unwrap();
    serving.await.unwrap().unwrap();
    received
}

/// Forwards datagrams between the receiver and `server`. Data segments whose
/// sequence number is in `drop_data` lose their first pass; the client-side
/// datagrams counted (1-based) in `drop_client_nth` are swallowed once.
async fn spawn_relay(
    server: SocketAddr,
    drop_data: HashSet<u32>,
    drop_client_nth: HashSet<u64>,
) -> SocketAddr {
    let client_side = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_side = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = client_side.local_addr().unwrap();

    tokio::spawn(async move {
        let mut drop_data = drop_data;
        let mut client: Option<SocketAddr> = None;
        let mut client_count = 0u64;
        let mut up = [0u8; 2048];
        let mut down = [0u8; 2048];
        loop {
            tokio::select! {
                received = client_side.recv_from(&mut up) => {
                    let Ok((len, from)) = received else { break };
                    client = Some(from);
                    client_count += 1;
                    if drop_client_nth.contains(&client_count) {
                        continue;
                    }
                    if server_side.send_to(&up[..len], server).await.is_err() {
                        break;
                    }
                }
                received = server_side.recv_from(&mut down) => {
                    let Ok((len, _)) = received else { break };
                    let Some(client) = client else { continue };
                    if len >= HEADER_SIZE {
                        let seq = u32::from_be_bytes(down[0..4].try_into().unwrap());
                        if drop_data.remove(&seq) {
                            continue;
                        }
                    }
                    if client_side.send_to(&down[..len], client).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    relay_addr
}

async fn run_transfer_through_relay<C>(
    data: Bytes,
    congestion: C,
    drop_data: HashSet<u32>,
    drop_client_nth: HashSet<u64>,
) -> Bytes
where
    C: CongestionControl + Send + 'static,
{
    let sender = FileSender::bind("127.0.0.1:0".parse().unwrap(), data, congestion)
        .await
        .unwrap();
    let addr = sender.local_addr().unwrap();
    let relay = spawn_relay(addr, drop_data, drop_client_nth).await;
    let serving = tokio::spawn(sender.serve());

    let receiver = FileReceiver::connect(relay).await.unwrap();
    let received = receiver.receive().await.unwrap();
    serving.await.unwrap().unwrap();
    received
}

#[tokio::test]
async fn lossless_three_segment_transfer() {
    let data = random_bytes(2500);
    let received = run_transfer(data.clone(), FixedWindow::new(20_000)).await;
    assert_eq!(received, data);
}

#[tokio::test]
async fn empty_file_produces_empty_output() {
    let received = run_transfer(Bytes::new(), FixedWindow::new(10_000)).await;
    assert!(received.is_empty());
}

#[tokio::test]
async fn single_short_segment() {
    let data = random_bytes(100);
    let received = run_transfer(data.clone(), FixedWindow::new(10_000)).await;
    assert_eq!(received, data);
}

#[tokio::test]
async fn source_ending_on_a_segment_boundary() {
    let data = random_bytes(2 * DATA_SIZE);
    let received = run_transfer(data.clone(), FixedWindow::new(20_000)).await;
    assert_eq!(received, data);
}

#[tokio::test]
async fn one_segment_window_still_completes() {
    let data = random_bytes(10 * DATA_SIZE + 7);
    let received = run_transfer(data.clone(), FixedWindow::new(DATA_SIZE)).await;
    assert_eq!(received, data);
}

#[tokio::test]
async fn cubic_bulk_transfer() {
    let data = random_bytes(150_000);
    let received = run_transfer(data.clone(), Cubic::new()).await;
    assert_eq!(received, data);
}

#[tokio::test]
async fn cubic_recovers_a_dropped_segment() {
    let data = random_bytes(40 * DATA_SIZE);
    let received = run_transfer_through_relay(
        data.clone(),
        Cubic::new(),
        HashSet::from([5]),
        HashSet::new(),
    )
    .await;
    assert_eq!(received, data);
}

#[tokio::test]
async fn fixed_window_recovers_scattered_drops() {
    let data = random_bytes(30 * DATA_SIZE + 311);
    let received = run_transfer_through_relay(
        data.clone(),
        FixedWindow::new(8 * DATA_SIZE),
        HashSet::from([2, 9, 17]),
        HashSet::new(),
    )
    .await;
    assert_eq!(received, data);
}

#[tokio::test]
async fn lost_acks_are_recovered_by_retransmission() {
    // Client datagram 1 is the transfer request; 2 and 3 are the first ACKs.
    let data = random_bytes(3 * DATA_SIZE);
    let received = run_transfer_through_relay(
        data.clone(),
        FixedWindow::new(DATA_SIZE),
        HashSet::new(),
        HashSet::from([2, 3]),
    )
    .await;
    assert_eq!(received, data);
}

#[tokio::test]
async fn unanswered_request_gives_up_after_five_attempts() {
    // A bound socket that never replies.
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = silent.local_addr().unwrap();

    let result = FileReceiver::connect(addr).await;
    match result {
        Err(TransportError::HandshakeExhausted(attempts)) => assert_eq!(attempts, 5),
        other => panic!("expected HandshakeExhausted, got {other:?}"),
    }
}
