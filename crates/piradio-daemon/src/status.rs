//! Session output reader.
//!
//! Each new player session hands its stdout over through the handoff
//! channel. Sessions are read strictly one after another, so the reader is
//! never attached to a process other than the one whose output it holds.

use std::sync::Arc;

use piradio_proto::protocol::{parse_status_line, StatusEvent};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stdout of one player session.
pub struct SessionOutput {
    pub station: usize,
    /// Volume the player was started with.
    pub volume: u8,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Cancelled when the session is torn down.
    pub cancel: CancellationToken,
}

pub trait StatusSink: Send + Sync + 'static {
    fn session_started(&self, station: usize, volume: u8);
    fn apply(&self, event: StatusEvent);
}

/// Read handed-off sessions until the channel closes or `shutdown` fires.
pub async fn run<S: StatusSink>(
    mut handoff: mpsc::Receiver<SessionOutput>,
    sink: Arc<S>,
    log_output: bool,
    shutdown: CancellationToken,
) {
    loop {
        let output = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = handoff.recv() => match next {
                Some(output) => output,
                None => break,
            },
        };
        read_session(output, sink.as_ref(), log_output, &shutdown).await;
    }
    debug!("status: reader stopped");
}

async fn read_session<S: StatusSink>(
    output: SessionOutput,
    sink: &S,
    log_output: bool,
    shutdown: &CancellationToken,
) {
    let SessionOutput {
        station,
        volume,
        reader,
        cancel,
    } = output;
    if cancel.is_cancelled() {
        debug!("status: session for station {} already gone", station);
        return;
    }

    sink.session_started(station, volume);
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = shutdown.cancelled() => return,
            read = reader.read_until(b'\n', &mut buf) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {
                // ICY metadata is frequently Latin-1.
                let line = String::from_utf8_lossy(&buf);
                if log_output && !line.trim().is_empty() {
                    debug!("player: {}", line.trim_end());
                }
                if let Some(event) = parse_status_line(&line) {
                    sink.apply(event);
                }
            }
            Err(e) => {
                warn!("status: reading player output failed: {}", e);
                break;
            }
        }
    }

    // A torn-down session is not a stop the listener needs to see.
    if cancel.is_cancelled() {
        return;
    }
    info!("status: player output for station {} ended", station);
    sink.apply(StatusEvent::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl StatusSink for Recorder {
        fn session_started(&self, station: usize, volume: u8) {
            self.events
                .lock()
                .unwrap()
                .push(format!("start {} {}", station, volume));
        }

        fn apply(&self, event: StatusEvent) {
            self.events.lock().unwrap().push(format!("{:?}", event));
        }
    }

    fn output(station: usize, bytes: &[u8]) -> (SessionOutput, CancellationToken) {
        let cancel = CancellationToken::new();
        let output = SessionOutput {
            station,
            volume: 55,
            reader: Box::new(std::io::Cursor::new(bytes.to_vec())),
            cancel: cancel.clone(),
        };
        (output, cancel)
    }

    #[tokio::test]
    async fn test_lines_parsed_then_stopped_at_eof() {
        let recorder = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(rx, recorder.clone(), true, shutdown.clone()));

        let (out, _cancel) = output(
            1,
            b"Playing http://x\nName   : Jazz Radio\nICY Info: StreamTitle='A - B';StreamUrl='';\nnoise\nBitrate: 128kbit/s\n",
        );
        tx.send(out).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(
            recorder.events(),
            vec![
                "start 1 55".to_string(),
                "StationName(\"Jazz Radio\")".to_string(),
                "Title(\"A - B\")".to_string(),
                "Bitrate(\"128kbit/s\")".to_string(),
                "Stopped".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_sessions_read_in_handoff_order() {
        let recorder = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(run(rx, recorder.clone(), false, CancellationToken::new()));

        let (first, _c1) = output(0, b"Name: One\n");
        let (second, _c2) = output(1, b"Name: Two\n");
        tx.send(first).await.unwrap();
        tx.send(second).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(
            recorder.events(),
            vec![
                "start 0 55".to_string(),
                "StationName(\"One\")".to_string(),
                "Stopped".to_string(),
                "start 1 55".to_string(),
                "StationName(\"Two\")".to_string(),
                "Stopped".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_torn_down_session_emits_no_stop() {
        let recorder = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(run(rx, recorder.clone(), false, CancellationToken::new()));

        let (client, mut server) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        tx.send(SessionOutput {
            station: 2,
            volume: 35,
            reader: Box::new(client),
            cancel: cancel.clone(),
        })
        .await
        .unwrap();

        tokio::io::AsyncWriteExt::write_all(&mut server, b"Volume: 40 %\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        drop(server);
        drop(tx);
        task.await.unwrap();

        assert_eq!(
            recorder.events(),
            vec!["start 2 35".to_string(), "Volume(\"40\")".to_string()]
        );
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_decoded_lossily() {
        let recorder = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(run(rx, recorder.clone(), false, CancellationToken::new()));

        let (out, _cancel) = output(0, b"ICY Info: StreamTitle='Caf\xe9';\n");
        tx.send(out).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let events = recorder.events();
        assert!(events[1].starts_with("Title(\"Caf"), "events: {:?}", events);
        assert_eq!(events[2], "Stopped");
    }

    #[tokio::test]
    async fn test_shutdown_stops_reader() {
        let recorder = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::channel::<SessionOutput>(1);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run(rx, recorder.clone(), false, shutdown.clone()));
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        drop(tx);
        assert!(recorder.events().is_empty());
    }
}
