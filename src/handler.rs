//! Participant connection handler
//!
//! Handles one client connection: the username handshake, then a read
//! activity (socket → coordinator) and a write activity (outgoing queue →
//! socket). Both activities share one cancellation token, so whichever of
//! them stops first (peer close, I/O error, write timeout, removal by the
//! coordinator, server shutdown) stops the other, and the participant
//! leaves the room exactly once.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::codec::{LineCodec, Outbound};
use crate::config::Config;
use crate::coordinator::CoordinatorHandle;
use crate::error::AppError;
use crate::participant::Participant;
use crate::types::ParticipantId;

/// Prompt written (without terminator) before reading the display name
pub const PROMPT: &str = "Please Enter your username: ";

type LineReader<R> = FramedRead<R, LineCodec>;
type LineWriter<W> = FramedWrite<W, LineCodec>;

/// Handle a new connection
///
/// Runs the handshake, registers with the coordinator, then serves the
/// participant until it disconnects or `shutdown` is cancelled. Errors only
/// affect this connection; the caller logs them.
pub async fn handle_connection<S>(
    stream: S,
    handle: CoordinatorHandle,
    config: Arc<Config>,
    shutdown: CancellationToken,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(read_half, LineCodec::with_max_length(config.max_line_length));
    let mut writer = FramedWrite::new(write_half, LineCodec::new());

    let id = ParticipantId::new();
    let token = shutdown.child_token();
    let (queue_tx, queue_rx) = mpsc::channel::<String>(config.queue_capacity);

    let registered =
        handshake(&mut reader, &mut writer, &handle, &config, id, &queue_tx, &token).await;
    let name = match registered {
        Ok(name) => name,
        Err(AppError::Cancelled) => {
            debug!("Participant {} cancelled during handshake", id);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    // The registry entry now holds the only sender
    drop(queue_tx);

    info!("Participant {} registered as '{}'", id, name);

    let served = run_session(reader, writer, queue_rx, &handle, &config, &name, &token).await;
    let result = match served {
        Err(AppError::Cancelled) => Ok(()),
        other => other,
    };

    token.cancel();
    let _ = handle.leave(id, name.clone()).await;

    info!("Participant {} ('{}') disconnected", id, name);

    result
}

/// Banner, prompt and registration
///
/// Prompts again after a refused name. Returns the accepted name.
async fn handshake<R, W>(
    reader: &mut LineReader<R>,
    writer: &mut LineWriter<W>,
    handle: &CoordinatorHandle,
    config: &Config,
    id: ParticipantId,
    queue_tx: &mpsc::Sender<String>,
    token: &CancellationToken,
) -> Result<String, AppError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let write_timeout = config.write_timeout;
    send_frame(writer, Outbound::Line(config.banner()), token, write_timeout).await?;

    loop {
        send_frame(writer, Outbound::Prompt(PROMPT.to_string()), token, write_timeout).await?;

        let name = tokio::select! {
            _ = token.cancelled() => return Err(AppError::Cancelled),
            frame = reader.next() => match frame {
                Some(line) => line?,
                None => return Err(AppError::Disconnected),
            },
        };

        let participant = Participant::new(id, name.clone(), queue_tx.clone(), token.clone());
        match handle.register(participant).await {
            Ok(()) => return Ok(name),
            Err(e) => {
                let Some(notice) = e.notice() else {
                    return Err(e);
                };
                debug!("Participant {} refused: {}", id, notice);
                send_frame(writer, Outbound::Line(notice), token, write_timeout).await?;
            }
        }
    }
}

/// Welcome line, then the read and write activities
///
/// The read activity runs on the current task; the write activity gets its
/// own task. Returns the first error either of them hit.
async fn run_session<R, W>(
    reader: LineReader<R>,
    mut writer: LineWriter<W>,
    queue_rx: mpsc::Receiver<String>,
    handle: &CoordinatorHandle,
    config: &Config,
    name: &str,
    token: &CancellationToken,
) -> Result<(), AppError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let welcome = Outbound::Line(format!("Welcome {}", name));
    send_frame(&mut writer, welcome, token, config.write_timeout).await?;

    let write_task = tokio::spawn(write_activity(
        writer,
        queue_rx,
        token.clone(),
        config.write_timeout,
    ));

    let read_result = read_activity(reader, handle, name, token).await;
    token.cancel();

    let write_result = match write_task.await {
        Ok(result) => result,
        Err(e) => {
            error!("Write task for '{}' failed: {}", name, e);
            Ok(())
        }
    };

    read_result.and(write_result)
}

/// Socket → coordinator
///
/// Frames each inbound line as `[{name}]{text}` and publishes it.
async fn read_activity<R>(
    mut reader: LineReader<R>,
    handle: &CoordinatorHandle,
    name: &str,
    token: &CancellationToken,
) -> Result<(), AppError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => {
                debug!("Read activity for '{}' cancelled", name);
                return Ok(());
            }
            frame = reader.next() => frame,
        };

        match frame {
            Some(Ok(text)) => handle.publish(format!("[{}]{}", name, text)).await?,
            Some(Err(e)) => return Err(e.into()),
            None => {
                debug!("'{}' closed the connection", name);
                return Ok(());
            }
        }
    }
}

/// Outgoing queue → socket
///
/// Each write is bounded by `write_timeout`. Ends when the token is
/// cancelled (even mid-write), the queue closes, or a write fails.
async fn write_activity<W>(
    mut writer: LineWriter<W>,
    mut queue_rx: mpsc::Receiver<String>,
    token: CancellationToken,
    write_timeout: Duration,
) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    // Stops the read activity however this function exits
    let _guard = token.clone().drop_guard();

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => {
                debug!("Write activity cancelled");
                return Ok(());
            }
            line = queue_rx.recv() => line,
        };

        // Removed from the room: nothing more will be queued
        let Some(line) = line else {
            break;
        };

        match send_frame(&mut writer, Outbound::Line(line), &token, write_timeout).await {
            Err(AppError::Cancelled) => {
                debug!("Write activity cancelled mid-write");
                return Ok(());
            }
            other => other?,
        }
    }

    let _ = timeout(write_timeout, writer.close()).await;
    debug!("Write activity ended");

    Ok(())
}

/// Write one frame unless the token fires or the write takes too long
async fn send_frame<W>(
    writer: &mut LineWriter<W>,
    frame: Outbound,
    token: &CancellationToken,
    write_timeout: Duration,
) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    tokio::select! {
        _ = token.cancelled() => Err(AppError::Cancelled),
        written = timeout(write_timeout, writer.send(frame)) => match written {
            Ok(result) => Ok(result?),
            Err(_) => Err(AppError::WriteTimeout),
        },
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{
        AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf,
        WriteHalf,
    };
    use tokio::task::JoinHandle;

    use super::*;
    use crate::coordinator::Coordinator;
    use crate::error::LineError;

    const WAIT: Duration = Duration::from_secs(2);

    struct Peer {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn line(&mut self) -> String {
            let mut line = String::new();
            timeout(WAIT, self.reader.read_line(&mut line))
                .await
                .expect("timed out waiting for line")
                .unwrap();
            line
        }

        async fn exact(&mut self, len: usize) -> String {
            let mut buf = vec![0; len];
            timeout(WAIT, self.reader.read_exact(&mut buf))
                .await
                .expect("timed out waiting for bytes")
                .unwrap();
            String::from_utf8(buf).unwrap()
        }

        async fn send(&mut self, text: &str) {
            self.writer.write_all(text.as_bytes()).await.unwrap();
        }

        async fn login(&mut self, name: &str) {
            assert_eq!(self.line().await, "Welcome to Mukul's Ultimate chat server!\n");
            assert_eq!(self.exact(PROMPT.len()).await, PROMPT);
            self.send(&format!("{}\r\n", name)).await;
            assert_eq!(self.line().await, format!("Welcome {}\n", name));
        }
    }

    fn start() -> CoordinatorHandle {
        let (coordinator, handle) = Coordinator::new(&Config::default());
        tokio::spawn(coordinator.run());
        handle
    }

    fn connect(
        handle: &CoordinatorHandle,
        shutdown: &CancellationToken,
    ) -> (Peer, JoinHandle<Result<(), AppError>>) {
        connect_with(handle, shutdown, Config::default(), 4096)
    }

    fn connect_with(
        handle: &CoordinatorHandle,
        shutdown: &CancellationToken,
        config: Config,
        buffer: usize,
    ) -> (Peer, JoinHandle<Result<(), AppError>>) {
        let (client, server) = tokio::io::duplex(buffer);
        let task = tokio::spawn(handle_connection(
            server,
            handle.clone(),
            Arc::new(config),
            shutdown.clone(),
        ));
        let (reader, writer) = tokio::io::split(client);
        let peer = Peer {
            reader: BufReader::new(reader),
            writer,
        };
        (peer, task)
    }

    #[tokio::test]
    async fn test_handshake_sequence() {
        let handle = start();
        let shutdown = CancellationToken::new();
        let (mut alice, _task) = connect(&handle, &shutdown);

        alice.login("alice").await;
        assert_eq!(alice.line().await, "*** alice just joined the channel\n");
        assert_eq!(handle.roster().await.unwrap(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_handshake_reprompts_on_taken_and_empty_names() {
        let handle = start();
        let shutdown = CancellationToken::new();
        let (mut first, _t1) = connect(&handle, &shutdown);
        first.login("bob").await;

        let (mut second, _t2) = connect(&handle, &shutdown);
        assert_eq!(second.line().await, "Welcome to Mukul's Ultimate chat server!\n");
        assert_eq!(second.exact(PROMPT.len()).await, PROMPT);

        second.send("bob\r\n").await;
        assert_eq!(second.line().await, "Username 'bob' is already taken\n");
        assert_eq!(second.exact(PROMPT.len()).await, PROMPT);

        second.send("\n").await;
        assert_eq!(second.line().await, "Username cannot be empty\n");
        assert_eq!(second.exact(PROMPT.len()).await, PROMPT);

        second.send("bobby\n").await;
        assert_eq!(second.line().await, "Welcome bobby\n");
        assert_eq!(second.line().await, "*** bobby just joined the channel\n");

        assert_eq!(handle.roster().await.unwrap(), vec!["bob", "bobby"]);
    }

    #[tokio::test]
    async fn test_chat_line_framing() {
        let handle = start();
        let shutdown = CancellationToken::new();
        let (mut alice, _t1) = connect(&handle, &shutdown);
        alice.login("alice").await;
        alice.line().await;

        let (mut bob, _t2) = connect(&handle, &shutdown);
        bob.login("bob").await;
        bob.line().await;
        assert_eq!(alice.line().await, "*** bob just joined the channel\n");

        alice.send("hi\r\n").await;
        assert_eq!(bob.line().await, "[alice]hi\n");
        assert_eq!(alice.line().await, "[alice]hi\n");

        bob.send("plain lf\n").await;
        assert_eq!(alice.line().await, "[bob]plain lf\n");
    }

    #[tokio::test]
    async fn test_remote_disconnect_removes_participant() {
        let handle = start();
        let shutdown = CancellationToken::new();
        let (mut bob, _t1) = connect(&handle, &shutdown);
        bob.login("bob").await;
        bob.line().await;

        let (mut alice, alice_task) = connect(&handle, &shutdown);
        alice.login("alice").await;
        alice.line().await;
        assert_eq!(bob.line().await, "*** alice just joined the channel\n");

        drop(alice);

        timeout(WAIT, alice_task).await.unwrap().unwrap().unwrap();
        assert_eq!(bob.line().await, "*** alice left the channel\n");
        assert_eq!(handle.roster().await.unwrap(), vec!["bob"]);
    }

    #[tokio::test]
    async fn test_unterminated_line_closes_only_that_connection() {
        let handle = start();
        let shutdown = CancellationToken::new();
        let (mut bob, _t1) = connect(&handle, &shutdown);
        bob.login("bob").await;
        bob.line().await;

        let (mut mallory, mallory_task) = connect(&handle, &shutdown);
        mallory.login("mallory").await;
        mallory.line().await;
        bob.line().await;

        mallory.send("no terminator").await;
        mallory.writer.shutdown().await.unwrap();

        let result = timeout(WAIT, mallory_task).await.unwrap().unwrap();
        assert!(matches!(
            result,
            Err(AppError::Line(LineError::Unterminated(13)))
        ));

        assert_eq!(bob.line().await, "*** mallory left the channel\n");
        assert_eq!(handle.roster().await.unwrap(), vec!["bob"]);
    }

    #[tokio::test]
    async fn test_disconnect_during_handshake() {
        let handle = start();
        let shutdown = CancellationToken::new();
        let (peer, task) = connect(&handle, &shutdown);

        drop(peer);

        let result = timeout(WAIT, task).await.unwrap().unwrap();
        assert!(matches!(
            result,
            Err(AppError::Disconnected) | Err(AppError::Io(_)) | Err(AppError::Line(_))
        ));
        assert!(handle.roster().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_participants() {
        let handle = start();
        let shutdown = CancellationToken::new();
        let (mut alice, alice_task) = connect(&handle, &shutdown);
        alice.login("alice").await;
        let (_waiting, waiting_task) = connect(&handle, &shutdown);

        shutdown.cancel();

        timeout(WAIT, alice_task).await.unwrap().unwrap().unwrap();
        timeout(WAIT, waiting_task).await.unwrap().unwrap().unwrap();
        assert!(handle.roster().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stalled_reader_does_not_block_others() {
        let config = Config {
            queue_capacity: 4,
            write_timeout: Duration::from_millis(200),
            ..Config::default()
        };
        let (coordinator, handle) = Coordinator::new(&config);
        tokio::spawn(coordinator.run());
        let shutdown = CancellationToken::new();

        let (mut slow, slow_task) = connect_with(&handle, &shutdown, config.clone(), 64);
        slow.login("slow").await;
        // From here on `slow` never reads again

        let (mut alice, _t) = connect_with(&handle, &shutdown, config, 4096);
        alice.login("alice").await;

        for i in 0..32 {
            alice.send(&format!("{}\n", i)).await;
            let expected = format!("[alice]{}\n", i);
            loop {
                let line = alice.line().await;
                if line == expected {
                    break;
                }
                assert!(line.starts_with("*** "), "unexpected line {:?}", line);
            }
        }

        let result = timeout(WAIT, slow_task).await.unwrap().unwrap();
        assert!(matches!(result, Ok(()) | Err(AppError::WriteTimeout)));
        assert_eq!(handle.roster().await.unwrap(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_blocked_handshake_write() {
        let handle = start();
        let shutdown = CancellationToken::new();
        // The banner alone overflows a 16-byte pipe that is never drained
        let (_peer, task) = connect_with(&handle, &shutdown, Config::default(), 16);
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.cancel();

        // Well under the default 5 s write timeout
        let result = timeout(WAIT, task)
            .await
            .expect("handler still blocked after shutdown")
            .unwrap();
        assert!(result.is_ok());
        assert!(handle.roster().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_timeout_removes_stalled_participant() {
        let config = Config {
            queue_capacity: 1024,
            write_timeout: Duration::from_millis(100),
            ..Config::default()
        };
        let (coordinator, handle) = Coordinator::new(&config);
        tokio::spawn(coordinator.run());
        let shutdown = CancellationToken::new();

        let (mut slow, slow_task) = connect_with(&handle, &shutdown, config, 64);
        slow.login("slow").await;
        assert_eq!(handle.roster().await.unwrap(), vec!["slow"]);

        // Queue never fills; only the socket write stalls
        for i in 0..16 {
            handle.publish(format!("[feed]line number {}", i)).await.unwrap();
        }

        let result = timeout(WAIT, slow_task).await.unwrap().unwrap();
        assert!(matches!(result, Err(AppError::WriteTimeout)));
        assert!(handle.roster().await.unwrap().is_empty());
    }
}
