//! Orchestrator integration tests.
//!
//! Drives the full daemon flow over in-memory stdio: startup line, rule
//! updates, blocked notices and termination.

mod common;

use std::io::{self, Read};
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::sync::oneshot;

use common::{ChannelBinder, TIMEOUT, take_tap, udp_v4};
use nfsieve_core::config::NfsieveConfig;
use nfsieve_core::types::{Direction, Polarity, Verdict};
use nfsieve_daemon::control::spawn_reader_pipe;
use nfsieve_daemon::orchestrator::Orchestrator;
use nfsieve_regex_filter::encode_token;

fn test_config(queues: u16) -> NfsieveConfig {
    let mut config = NfsieveConfig::default();
    config.queue.count = queues;
    config
}

async fn next_line(lines: &mut Lines<BufReader<DuplexStream>>) -> String {
    tokio::time::timeout(TIMEOUT, lines.next_line())
        .await
        .expect("timed out waiting for stdout line")
        .expect("stdout read failed")
        .expect("stdout closed")
}

#[tokio::test]
async fn test_startup_line_rule_update_and_eof() {
    // Given: a daemon with two queues per direction
    let binder = ChannelBinder::default();
    let taps = binder.taps.clone();
    let (mut control_tx, control_rx) = tokio::io::duplex(1024);
    let (stdout_tx, stdout_rx) = tokio::io::duplex(1024);
    let mut stdout = BufReader::new(stdout_rx).lines();

    let orchestrator = Orchestrator::new(test_config(2)).unwrap();
    let daemon = tokio::spawn(orchestrator.run_with(
        binder,
        BufReader::new(control_rx),
        stdout_tx,
        std::future::pending::<()>(),
    ));

    // Then: the bound ranges are announced first
    assert_eq!(
        next_line(&mut stdout).await,
        "QUEUE INPUT 1000 1001 OUTPUT 1002 1003"
    );

    // When: an input deny rule is pushed
    let token = encode_token(Direction::Input, Polarity::Deny, "malware");
    control_tx
        .write_all(format!("{token}\n").as_bytes())
        .await
        .unwrap();
    assert_eq!(next_line(&mut stdout).await, "ACK OK");

    // Then: matching input traffic is dropped and reported
    let mut input = take_tap(&taps, 1001);
    assert_eq!(input.judge(udp_v4(b"malware sample")).await, Verdict::Drop);
    assert_eq!(next_line(&mut stdout).await, format!("BLOCKED {token}"));

    // And: output traffic is unaffected
    let mut output = take_tap(&taps, 1002);
    assert_eq!(output.judge(udp_v4(b"malware sample")).await, Verdict::Accept);

    // When: the controller closes stdin
    drop(control_tx);
    let result = tokio::time::timeout(TIMEOUT, daemon).await.unwrap().unwrap();

    // Then: the daemon fails
    let err = result.unwrap_err();
    assert!(err.to_string().contains("control channel"), "{err}");
}

#[tokio::test]
async fn test_shutdown_signal_is_clean_exit() {
    let binder = ChannelBinder::default();
    let (_control_tx, control_rx) = tokio::io::duplex(64);
    let (stdout_tx, stdout_rx) = tokio::io::duplex(1024);
    let mut stdout = BufReader::new(stdout_rx).lines();
    let (signal_tx, signal_rx) = oneshot::channel::<()>();

    let orchestrator = Orchestrator::new(test_config(1)).unwrap();
    let daemon = tokio::spawn(orchestrator.run_with(
        binder,
        BufReader::new(control_rx),
        stdout_tx,
        async move {
            let _ = signal_rx.await;
        },
    ));

    assert_eq!(
        next_line(&mut stdout).await,
        "QUEUE INPUT 1000 1000 OUTPUT 1001 1001"
    );

    signal_tx.send(()).unwrap();
    let result = tokio::time::timeout(TIMEOUT, daemon).await.unwrap().unwrap();
    assert!(result.is_ok(), "{:?}", result.err());

    // stdout is closed once the writer drains
    let rest = tokio::time::timeout(Duration::from_secs(1), stdout.next_line())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rest, None);
}

/// Blocks like an open but silent stdin until the sender side is dropped.
struct IdleInput(std_mpsc::Receiver<()>);

impl Read for IdleInput {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        let _ = self.0.recv();
        Ok(0)
    }
}

#[test]
fn test_shutdown_with_idle_control_input_exits_promptly() {
    // Given: a controller that holds the control input open and never writes
    let (_keep_open, idle) = std_mpsc::channel::<()>();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    let result = runtime.block_on(async {
        let control = spawn_reader_pipe(IdleInput(idle), tokio::runtime::Handle::current())
            .unwrap();
        let (stdout_tx, stdout_rx) = tokio::io::duplex(1024);
        let mut stdout = BufReader::new(stdout_rx).lines();
        let (signal_tx, signal_rx) = oneshot::channel::<()>();

        let daemon = tokio::spawn(Orchestrator::new(test_config(1)).unwrap().run_with(
            ChannelBinder::default(),
            BufReader::new(control),
            stdout_tx,
            async move {
                let _ = signal_rx.await;
            },
        ));

        assert_eq!(
            next_line(&mut stdout).await,
            "QUEUE INPUT 1000 1000 OUTPUT 1001 1001"
        );

        // When: a shutdown signal arrives
        signal_tx.send(()).unwrap();
        tokio::time::timeout(TIMEOUT, daemon).await.unwrap().unwrap()
    });
    assert!(result.is_ok(), "{:?}", result.err());

    // Then: the runtime winds down without waiting on the blocked reader
    let started = Instant::now();
    drop(runtime);
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "runtime shutdown took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_queue_contention_shifts_announced_ranges() {
    let binder = ChannelBinder {
        busy: [1000, 1003].into_iter().collect(),
        ..Default::default()
    };
    let (_control_tx, control_rx) = tokio::io::duplex(64);
    let (stdout_tx, stdout_rx) = tokio::io::duplex(1024);
    let mut stdout = BufReader::new(stdout_rx).lines();
    let (signal_tx, signal_rx) = oneshot::channel::<()>();

    let daemon = tokio::spawn(Orchestrator::new(test_config(2)).unwrap().run_with(
        binder,
        BufReader::new(control_rx),
        stdout_tx,
        async move {
            let _ = signal_rx.await;
        },
    ));

    assert_eq!(
        next_line(&mut stdout).await,
        "QUEUE INPUT 1001 1002 OUTPUT 1004 1005"
    );

    signal_tx.send(()).unwrap();
    tokio::time::timeout(TIMEOUT, daemon)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_queue_space_exhaustion_is_fatal() {
    // Given: every id from 65530 upward is taken
    let mut config = test_config(2);
    config.queue.base_id = 65530;
    let binder = ChannelBinder {
        busy: (65530..=65534).collect(),
        ..Default::default()
    };
    let (_control_tx, control_rx) = tokio::io::duplex(64);
    let (stdout_tx, _stdout_rx) = tokio::io::duplex(1024);

    let result = Orchestrator::new(config)
        .unwrap()
        .run_with(
            binder,
            BufReader::new(control_rx),
            stdout_tx,
            std::future::pending::<()>(),
        )
        .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("failed to start queue engine"), "{err}");
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = NfsieveConfig::default();
    config.queue.count = 0;
    assert!(Orchestrator::new(config).is_err());
}
