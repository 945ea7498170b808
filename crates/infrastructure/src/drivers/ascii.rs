use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_serial::SerialStream;

use domain::{BusLink, BusProtocol, DriverError, SerialSettings};

use super::serial;

/// Ascii-bus link: one command line out, one reply line back.
pub struct AsciiLink<S> {
    port: String,
    timeout: Duration,
    wire: Mutex<Option<BufReader<S>>>,
    closed: AtomicBool,
}

impl AsciiLink<SerialStream> {
    pub fn open(settings: &SerialSettings) -> Result<Self, DriverError> {
        let stream = serial::open_stream(settings)?;
        Ok(Self::new(
            &settings.port,
            stream,
            Duration::from_millis(settings.timeout_ms),
        ))
    }
}

impl<S> AsciiLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(port: impl Into<String>, stream: S, timeout: Duration) -> Self {
        Self {
            port: port.into(),
            timeout,
            wire: Mutex::new(Some(BufReader::new(stream))),
            closed: AtomicBool::new(false),
        }
    }
}

fn io_error(context: &str, e: std::io::Error) -> DriverError {
    serial::classify_io(context, &e)
}

#[async_trait]
impl<S> BusLink for AsciiLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn protocol(&self) -> BusProtocol {
        BusProtocol::AsciiBus
    }

    fn port(&self) -> &str {
        &self.port
    }

    async fn transact(&self, request: &str) -> Result<String, DriverError> {
        let mut wire = self.wire.lock().await;
        let stream = wire.as_mut().ok_or(DriverError::NoHandle)?;

        tracing::trace!(port = %self.port, %request, "ascii >>");
        let frame = format!("{request}\r\n");
        stream
            .get_mut()
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| io_error("write failed", e))?;
        stream
            .get_mut()
            .flush()
            .await
            .map_err(|e| io_error("flush failed", e))?;

        let mut line = String::new();
        let read = tokio::time::timeout(self.timeout, stream.read_line(&mut line))
            .await
            .map_err(|_| DriverError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| io_error("read failed", e))?;
        if read == 0 {
            return Err(DriverError::Transport("port closed by peer".into()));
        }

        let reply = line.trim_end_matches(['\r', '\n']).to_string();
        tracing::trace!(port = %self.port, %reply, "ascii <<");
        if reply.is_empty() {
            return Err(DriverError::Protocol(format!("empty reply to {request}")));
        }
        Ok(reply)
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut wire = self.wire.lock().await;
        self.closed.store(true, Ordering::Release);
        if let Some(mut stream) = wire.take() {
            stream
                .get_mut()
                .shutdown()
                .await
                .map_err(|e| io_error("shutdown failed", e))?;
            tracing::debug!(port = %self.port, "Ascii port closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
