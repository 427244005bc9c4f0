//! End-to-end transfers: a sender session and a receiver session talking over
//! the simulated link, and once over real UDP on loopback.
//!
//! The simulated tests run on tokio's paused clock, so acknowledgment and idle
//! timeouts elapse instantly. Both sessions are driven from one task with
//! `tokio::join!`.

use std::io::Cursor;
use std::net::SocketAddr;
use std::time::Duration;

use rcmp::{
    config::{ReceiverConfig, SenderConfig},
    error::TransferError,
    receiver_session::{ReceiveReport, ReceiverSession},
    sender_session::{SendReport, SenderSession},
    simulator::{link, FaultModel},
    socket::Socket,
    state::{ReceiverPhase, SenderPhase},
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn addrs() -> (SocketAddr, SocketAddr) {
    ("10.0.0.1:40000".parse().unwrap(), "10.0.0.2:5000".parse().unwrap())
}

/// Deterministic, non-repeating-looking file contents.
fn file_of(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(31) % 251) as u8).collect()
}

/// A receiver that acknowledges everything it is asked to.
fn faithful_receiver() -> ReceiverConfig {
    ReceiverConfig {
        ack_drop_probability: 0.0,
        seed: Some(0),
        ..ReceiverConfig::default()
    }
}

struct Outcome {
    sent: Result<SendReport, TransferError>,
    received: Result<ReceiveReport, TransferError>,
    output: Vec<u8>,
    sender_phase: SenderPhase,
    receiver_phase: ReceiverPhase,
}

async fn transfer(
    data: &[u8],
    data_faults: FaultModel,
    sender_config: SenderConfig,
    receiver_config: ReceiverConfig,
    seed: u64,
) -> Outcome {
    transfer_over(
        data,
        data_faults,
        FaultModel::perfect(),
        sender_config,
        receiver_config,
        seed,
    )
    .await
}

/// Like [`transfer`], with faults on the acknowledgment direction too.
async fn transfer_over(
    data: &[u8],
    data_faults: FaultModel,
    ack_faults: FaultModel,
    sender_config: SenderConfig,
    receiver_config: ReceiverConfig,
    seed: u64,
) -> Outcome {
    let (sender_addr, receiver_addr) = addrs();
    let (a, b) = link(sender_addr, receiver_addr, data_faults, ack_faults, seed);

    let file = Cursor::new(data.to_vec());
    let mut sender = SenderSession::new(a, receiver_addr, file, data.len() as u64, sender_config)
        .expect("sender session");
    let mut receiver =
        ReceiverSession::new(b, Vec::new(), receiver_config).expect("receiver session");

    let (sent, received) = tokio::join!(sender.run(), receiver.run());

    let sender_phase = sender.phase();
    let receiver_phase = receiver.phase();
    let (_, output) = receiver.into_parts();
    Outcome {
        sent,
        received,
        output,
        sender_phase,
        receiver_phase,
    }
}

// ---------------------------------------------------------------------------
// Test 1: 5000-byte file over a clean link
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_five_thousand_bytes_clean_link() {
    let data = file_of(5000);
    let out = transfer(
        &data,
        FaultModel::perfect(),
        SenderConfig::default(),
        faithful_receiver(),
        1,
    )
    .await;

    let sent = out.sent.expect("sender succeeds");
    let received = out.received.expect("receiver succeeds");

    assert_eq!(out.output, data);
    assert_eq!(out.sender_phase, SenderPhase::Done);
    assert_eq!(out.receiver_phase, ReceiverPhase::Done);

    // seq 0 and 1 request acks; seq 2 carries the final 904 bytes unacknowledged.
    assert_eq!(sent.total_size, 5000);
    assert_eq!(sent.packets_sent, 3);
    assert_eq!(sent.acks_received, 2);
    assert_eq!(sent.retransmissions, 0);
    assert_eq!(sent.timeouts, 0);

    assert_eq!(received.bytes_written, 5000);
    assert_eq!(received.packets_received, 3);
    assert_eq!(received.acks_sent, 2);
    assert_eq!(received.duplicates, 0);
}

// ---------------------------------------------------------------------------
// Test 2: file that is an exact multiple of the chunk size
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_exact_multiple_of_chunk_size() {
    let data = file_of(4096);
    let out = transfer(
        &data,
        FaultModel::perfect(),
        SenderConfig::default(),
        faithful_receiver(),
        2,
    )
    .await;

    let sent = out.sent.expect("sender succeeds");
    let received = out.received.expect("receiver completes by byte count");

    assert_eq!(out.output, data);
    assert_eq!(sent.packets_sent, 2);
    // Both packets request an acknowledgment; the second is answered before
    // the receiver stops.
    assert_eq!(sent.acks_received, 2);
    assert_eq!(received.acks_sent, 2);
    assert_eq!(received.bytes_written, 4096);
}

// ---------------------------------------------------------------------------
// Test 3: empty file
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_empty_file() {
    let out = transfer(
        &[],
        FaultModel::perfect(),
        SenderConfig::default(),
        faithful_receiver(),
        3,
    )
    .await;

    let sent = out.sent.expect("sender succeeds");
    let received = out.received.expect("receiver succeeds");

    assert!(out.output.is_empty());
    assert_eq!(sent.packets_sent, 1);
    assert_eq!(sent.acks_received, 1);
    assert_eq!(received.bytes_written, 0);
    assert_eq!(out.receiver_phase, ReceiverPhase::Done);
}

// ---------------------------------------------------------------------------
// Test 4: duplicated data plus withheld acknowledgments
// ---------------------------------------------------------------------------

/// Whatever the loss pattern, the bytes that land are the file. The sender may
/// legitimately end up unsure (its last requested ack withheld after the
/// receiver has finished), but it never reports anything else.
#[tokio::test(start_paused = true)]
async fn test_duplication_and_ack_loss_preserve_contents() {
    let data = file_of(40 * 1024 + 123);
    let faults = FaultModel {
        duplicate_rate: 0.25,
        ..FaultModel::default()
    };
    // A generous retry limit keeps an unlucky run of withheld acks from
    // ending the transfer early.
    let sender_config = SenderConfig {
        max_consecutive_timeouts: 12,
        ..SenderConfig::default()
    };

    for seed in 0..4u64 {
        let receiver_config = ReceiverConfig {
            seed: Some(seed),
            ..ReceiverConfig::default()
        };
        let out = transfer(&data, faults.clone(), sender_config.clone(), receiver_config, seed)
            .await;

        let received = out.received.expect("receiver completes");
        assert_eq!(out.output, data, "seed {seed}: output differs");
        assert_eq!(received.bytes_written, data.len() as u64);
        match out.sent {
            Ok(_) => assert_eq!(out.sender_phase, SenderPhase::Done),
            Err(TransferError::ReceiverUnresponsive { .. }) => {
                assert_eq!(out.sender_phase, SenderPhase::Aborted)
            }
            Err(e) => panic!("seed {seed}: unexpected sender error {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Test 5: every acknowledgment withheld
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_all_acks_withheld_sender_gives_up() {
    let data = file_of(5000);
    let receiver_config = ReceiverConfig {
        ack_drop_probability: 1.0,
        seed: Some(9),
        ..ReceiverConfig::default()
    };
    let out = transfer(
        &data,
        FaultModel::perfect(),
        SenderConfig::default(),
        receiver_config,
        5,
    )
    .await;

    assert!(matches!(
        out.sent,
        Err(TransferError::ReceiverUnresponsive { timeouts: 5 })
    ));
    assert_eq!(out.sender_phase, SenderPhase::Aborted);

    // The receiver wrote the first chunk once, saw four retransmissions of it,
    // then went idle.
    assert!(matches!(
        out.received,
        Err(TransferError::ReceiverIdleTimeout { .. })
    ));
    assert_eq!(out.receiver_phase, ReceiverPhase::IdleTimeoutAbort);
    assert_eq!(out.output, &data[..2048]);
}

// ---------------------------------------------------------------------------
// Test 6: sender against a peer that never answers
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_silent_peer_aborts_after_five_timeouts() {
    let (sender_addr, receiver_addr) = addrs();
    let (a, _b) = link(
        sender_addr,
        receiver_addr,
        FaultModel::perfect(),
        FaultModel::perfect(),
        6,
    );
    let data = file_of(10_000);
    let mut sender = SenderSession::new(
        a,
        receiver_addr,
        Cursor::new(data),
        10_000,
        SenderConfig::default(),
    )
    .expect("sender session");

    let started = tokio::time::Instant::now();
    let res = sender.run().await;
    let elapsed = started.elapsed();

    assert!(matches!(
        res,
        Err(TransferError::ReceiverUnresponsive { timeouts: 5 })
    ));
    assert_eq!(sender.phase(), SenderPhase::Aborted);
    assert_eq!(sender.report().timeouts, 5);
    assert_eq!(sender.report().retransmissions, 4);
    assert!(
        elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6),
        "gave up after {elapsed:?}"
    );

    let (channel, _) = sender.into_parts();
    assert_eq!(channel.sent_count(), 5, "seq 0 sent once and retried four times");
}

// ---------------------------------------------------------------------------
// Test 7: loss, duplication and reordering in both directions
// ---------------------------------------------------------------------------

/// On a hostile link the receiver may end with only part of the file: an ack
/// for a packet it dropped as out of order still moves the sender on, so
/// runs routinely stop short. What it does write is always a prefix of the file, and
/// both sides always reach a defined end.
#[tokio::test(start_paused = true)]
async fn test_hostile_link_output_is_a_prefix() {
    let data = file_of(24 * 2048 + 500);
    let faults = FaultModel {
        loss_rate: 0.1,
        duplicate_rate: 0.1,
        reorder_rate: 0.1,
    };

    for seed in 0..8u64 {
        let out = transfer_over(
            &data,
            faults.clone(),
            faults.clone(),
            SenderConfig::default(),
            faithful_receiver(),
            seed,
        )
        .await;

        assert!(
            data.starts_with(&out.output),
            "seed {seed}: output is not a prefix of the file"
        );
        assert!(out.sender_phase.is_terminal(), "seed {seed}: {}", out.sender_phase);
        assert!(out.receiver_phase.is_terminal(), "seed {seed}: {}", out.receiver_phase);
        match out.sent {
            Ok(_) | Err(TransferError::ReceiverUnresponsive { .. }) => {}
            Err(e) => panic!("seed {seed}: unexpected sender error {e}"),
        }
        match out.received {
            Ok(received) => {
                assert_eq!(out.output, data, "seed {seed}: finished with a partial file");
                assert_eq!(received.bytes_written, data.len() as u64);
            }
            Err(TransferError::ReceiverIdleTimeout { .. }) => {}
            Err(e) => panic!("seed {seed}: unexpected receiver error {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Test 8: real UDP on loopback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_loopback_udp_file_transfer() {
    use std::io::Write;

    let data = file_of(3 * 2048 + 17);
    let mut input = tempfile::NamedTempFile::new().expect("input temp file");
    input.write_all(&data).expect("write input");
    input.flush().expect("flush input");
    let output = tempfile::NamedTempFile::new().expect("output temp file");

    let receiver_socket = Socket::bind("127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind receiver");
    let receiver_addr = receiver_socket.local_addr;
    let out_file = tokio::fs::File::create(output.path())
        .await
        .expect("create output");
    let mut receiver = ReceiverSession::new(receiver_socket, out_file, faithful_receiver())
        .expect("receiver session");

    let sender_socket = Socket::bind_for(receiver_addr).await.expect("bind sender");
    let in_file = tokio::fs::File::open(input.path()).await.expect("open input");
    let len = in_file.metadata().await.expect("metadata").len();
    let mut sender =
        SenderSession::new(sender_socket, receiver_addr, in_file, len, SenderConfig::default())
            .expect("sender session");

    let (sent, received) = tokio::join!(sender.run(), receiver.run());
    let sent = sent.expect("sender succeeds");
    let received = received.expect("receiver succeeds");

    assert_eq!(sent.total_size as usize, data.len());
    assert_eq!(received.bytes_written as usize, data.len());
    assert_eq!(received.connection_id, Some(sender.connection_id()));
    assert_eq!(std::fs::read(output.path()).expect("read output"), data);
}
