// Transport layer.
//
// The core only needs a duplex, message-delimited channel: a send half it
// can write serialized frames to, and a stream of inbound frames whose
// termination doubles as the close signal. `PipeTransport` is the concrete
// implementation over any async byte pair (child-process stdio, a socket,
// an in-memory duplex in tests), framing each JSON message with a 4-byte
// little-endian length prefix.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Send half of the browser transport.
///
/// Implementations serialize one message per call; the connection holds the
/// transport behind a lock so all outbound traffic flows through a single
/// write path.
#[async_trait]
pub trait Transport: Send {
    /// Send one serialized message to the browser.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Close the underlying channel. Further sends fail.
    async fn close(&mut self);
}

/// Length-prefixed pipe transport (send half).
pub struct PipeTransport<W> {
    writer: W,
    closed: bool,
}

/// Receive half of the pipe transport. Owns the read end and pumps frames
/// into the channel handed to the connection; runs until EOF, a framing
/// error, or the receiver being dropped.
pub struct PipeTransportReceiver<R> {
    reader: R,
    message_tx: mpsc::UnboundedSender<String>,
}

impl<W> PipeTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Create a transport pair from a write/read byte stream pair.
    ///
    /// Returns the send half, the receive half (spawn its `run` loop), and
    /// the inbound message channel for the connection.
    pub fn new<R>(
        writer: W,
        reader: R,
    ) -> (
        PipeTransport<W>,
        PipeTransportReceiver<R>,
        mpsc::UnboundedReceiver<String>,
    )
    where
        R: AsyncRead + Unpin + Send,
    {
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        (
            PipeTransport {
                writer,
                closed: false,
            },
            PipeTransportReceiver { reader, message_tx },
            message_rx,
        )
    }
}

#[async_trait]
impl<W> Transport for PipeTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, text: String) -> Result<()> {
        if self.closed {
            return Err(Error::Transport("transport closed".to_string()));
        }
        let bytes = text.as_bytes();
        let length = bytes.len() as u32;

        self.writer
            .write_all(&length.to_le_bytes())
            .await
            .map_err(|e| Error::Transport(format!("Failed to write length: {e}")))?;
        self.writer
            .write_all(bytes)
            .await
            .map_err(|e| Error::Transport(format!("Failed to write message: {e}")))?;
        self.writer
            .flush()
            .await
            .map_err(|e| Error::Transport(format!("Failed to flush: {e}")))?;
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
        let _ = self.writer.shutdown().await;
    }
}

impl<R> PipeTransportReceiver<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Run the read loop. Returns when the stream ends or the connection
    /// drops its receiver; either way the inbound channel closes behind it,
    /// which the connection treats as the disconnect signal.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let mut len_buf = [0u8; 4];
            self.reader
                .read_exact(&mut len_buf)
                .await
                .map_err(|e| Error::Transport(format!("Failed to read length prefix: {e}")))?;
            let length = u32::from_le_bytes(len_buf) as usize;

            let mut message_buf = vec![0u8; length];
            self.reader
                .read_exact(&mut message_buf)
                .await
                .map_err(|e| Error::Transport(format!("Failed to read message: {e}")))?;

            let text = String::from_utf8(message_buf)
                .map_err(|e| Error::Transport(format!("Message is not valid UTF-8: {e}")))?;

            if self.message_tx.send(text).is_err() {
                // Connection gone; stop reading.
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) {
        let bytes = text.as_bytes();
        writer
            .write_all(&(bytes.len() as u32).to_le_bytes())
            .await
            .unwrap();
        writer.write_all(bytes).await.unwrap();
        writer.flush().await.unwrap();
    }

    #[tokio::test]
    async fn send_produces_length_prefixed_frames() {
        let (mut our_end, their_end) = tokio::io::duplex(1024);
        let (unused_read, _unused_write) = tokio::io::duplex(16);
        let (mut transport, _receiver, _rx) = PipeTransport::new(their_end, unused_read);

        transport
            .send(r#"{"id":1,"method":"Page.enable"}"#.to_string())
            .await
            .unwrap();

        let mut len_buf = [0u8; 4];
        our_end.read_exact(&mut len_buf).await.unwrap();
        let length = u32::from_le_bytes(len_buf) as usize;
        let mut message = vec![0u8; length];
        our_end.read_exact(&mut message).await.unwrap();
        assert_eq!(message, br#"{"id":1,"method":"Page.enable"}"#);
    }

    #[tokio::test]
    async fn receiver_delivers_messages_in_order() {
        let (write_side, read_side) = tokio::io::duplex(4096);
        let (sink, _other) = tokio::io::duplex(16);
        let (_transport, receiver, mut rx) = PipeTransport::new(sink, read_side);

        let read_task = tokio::spawn(receiver.run());

        let mut browser = write_side;
        write_frame(&mut browser, r#"{"method":"first"}"#).await;
        write_frame(&mut browser, r#"{"method":"second"}"#).await;

        assert_eq!(rx.recv().await.unwrap(), r#"{"method":"first"}"#);
        assert_eq!(rx.recv().await.unwrap(), r#"{"method":"second"}"#);

        drop(browser);
        let result = read_task.await.unwrap();
        assert!(result.is_err()); // EOF mid-prefix surfaces as a transport error
    }

    #[tokio::test]
    async fn truncated_length_prefix_is_an_error() {
        let (mut write_side, read_side) = tokio::io::duplex(64);
        let (sink, _other) = tokio::io::duplex(16);
        let (_transport, receiver, _rx) = PipeTransport::new(sink, read_side);

        write_side.write_all(&[0x01, 0x02]).await.unwrap();
        write_side.flush().await.unwrap();
        drop(write_side);

        let result = receiver.run().await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("length prefix"));
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (sink, _keep_alive) = tokio::io::duplex(64);
        let (reader, _other) = tokio::io::duplex(16);
        let (mut transport, _receiver, _rx) = PipeTransport::new(sink, reader);

        transport.close().await;
        let err = transport.send("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
