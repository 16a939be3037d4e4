//! TCP development link.
//!
//! Serves one client at a time. Frames are a big-endian `u16` length
//! followed by the payload. Once the pairing core enables encryption every
//! frame in either direction goes through a [`SecureChannel`].

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use swb_core::errors::TransportError;
use swb_core::transport::{LinkEvent, RtsTransport};
use swb_core::ReactorEvent;
use swb_crypto::{SecureChannel, SessionKeys};
use swb_proto::rts::NonceBytes;

pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {0} bytes exceeds the link limit")]
    FrameTooLarge(usize),
    #[error("pairing reactor stopped")]
    ReactorGone,
}

type Outbound = Option<mpsc::UnboundedSender<Vec<u8>>>;

/// Read one frame. `Ok(None)` on a clean close between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>, LinkError> {
    let mut len_buf = [0u8; 2];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    Ok(Some(data))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<(), LinkError> {
    let len = u16::try_from(data.len()).map_err(|_| LinkError::FrameTooLarge(data.len()))?;
    let mut buf = BytesMut::with_capacity(2 + data.len());
    buf.put_u16(len);
    buf.put_slice(data);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

// ============================================================================
// Transport adapter
// ============================================================================

/// The [`RtsTransport`] handed to the pairing core. Sends go to whichever
/// connection is current; with none, they fail with `Closed`.
pub struct LinkTransport {
    outbound: watch::Receiver<Outbound>,
    keys: Option<SessionKeys>,
    nonces: Option<(NonceBytes, NonceBytes)>,
    channel: Option<SecureChannel>,
}

impl LinkTransport {
    pub fn new() -> (Self, LinkHandle) {
        let (tx, rx) = watch::channel(None);
        let transport = Self { outbound: rx, keys: None, nonces: None, channel: None };
        let (close, _) = watch::channel(0u64);
        let handle = LinkHandle { outbound: Arc::new(tx), close: Arc::new(close) };
        (transport, handle)
    }

    fn push(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(frame.len()));
        }
        let sender = self.outbound.borrow().clone();
        match sender {
            Some(sender) => sender.send(frame).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }
}

impl RtsTransport for LinkTransport {
    fn set_crypto_keys(&mut self, keys: &SessionKeys) {
        self.keys = Some(keys.clone());
    }

    fn set_nonce(&mut self, to_robot: &NonceBytes, to_device: &NonceBytes) {
        self.nonces = Some((*to_robot, *to_device));
    }

    fn set_encrypted_channel_established(&mut self, established: bool) {
        self.channel = match (established, &self.keys, &self.nonces) {
            (true, Some(keys), Some((to_robot, to_device))) => {
                Some(SecureChannel::new(keys, *to_device, *to_robot))
            }
            (true, _, _) => {
                warn!("encryption enabled before keys and nonces were set");
                None
            }
            (false, _, _) => None,
        };
    }

    fn send_plaintext(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.push(payload.to_vec())
    }

    fn send_encrypted(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let channel = self.channel.as_mut().ok_or(TransportError::NotConfigured)?;
        let sealed = channel.seal(payload).map_err(|e| TransportError::Crypto(e.to_string()))?;
        self.push(sealed)
    }

    fn open_frame(&mut self, frame: Vec<u8>) -> LinkEvent {
        match self.channel.as_mut() {
            Some(channel) => match channel.open(&frame) {
                Ok(payload) => LinkEvent::EncryptedReceived(payload),
                Err(e) => {
                    debug!(error = %e, bytes = frame.len(), "inbound frame failed to open");
                    LinkEvent::DecryptionFailed
                }
            },
            None => LinkEvent::PlaintextReceived(frame),
        }
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Connection-side half of the link, shared with the listener task and the
/// signal loop.
#[derive(Clone)]
pub struct LinkHandle {
    outbound: Arc<watch::Sender<Outbound>>,
    /// Bumped on every close request. A connection ends on any bump made
    /// after it was accepted, even one made while it was busy.
    close: Arc<watch::Sender<u64>>,
}

impl LinkHandle {
    /// Drop the current connection, if any.
    pub fn close(&self) {
        self.close.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    pub fn is_connected(&self) -> bool {
        self.outbound.borrow().is_some()
    }

    async fn run_connection(
        &self,
        stream: TcpStream,
        events: &mpsc::Sender<ReactorEvent>,
    ) -> Result<(), LinkError> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "TCP_NODELAY not set");
        }
        let mut close = self.close.subscribe();
        let (mut reader, mut writer) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        self.outbound.send_replace(Some(tx));

        let writer_task = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    debug!(error = %e, "link write failed");
                    break;
                }
            }
        });

        let result = async {
            events.send(ReactorEvent::StartPairing).await.map_err(|_| LinkError::ReactorGone)?;
            loop {
                tokio::select! {
                    frame = read_frame(&mut reader) => match frame? {
                        Some(frame) => events
                            .send(ReactorEvent::Frame(frame))
                            .await
                            .map_err(|_| LinkError::ReactorGone)?,
                        None => return Ok(()),
                    },
                    _ = close.changed() => {
                        info!("closing connection after pairing reset");
                        return Ok(());
                    }
                }
            }
        }
        .await;

        // Dropping the sender lets the writer flush what is queued and exit.
        self.outbound.send_replace(None);
        if let Err(e) = writer_task.await {
            debug!(error = %e, "link writer task failed");
        }
        result
    }
}

/// Accept clients one at a time until the reactor goes away.
pub async fn serve(
    listener: TcpListener,
    link: LinkHandle,
    events: mpsc::Sender<ReactorEvent>,
) -> Result<(), LinkError> {
    info!(addr = ?listener.local_addr().ok(), "link listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "client connected");
        let result = link.run_connection(stream, &events).await;
        info!(%peer, "client disconnected");
        match result {
            Err(LinkError::ReactorGone) => return Ok(()),
            Err(e) => warn!(%peer, error = %e, "connection ended with error"),
            Ok(()) => {}
        }
        if events.send(ReactorEvent::StopPairing).await.is_err() {
            return Ok(());
        }
    }
}
