use std::net::{IpAddr, SocketAddr};

use bytebuffer::ByteBuffer;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::{spawn, task};
use tracing::{debug, info, warn};

use crate::errors::Result;

pub const VIDEO_WIDTH:u32 = 960;
pub const VIDEO_HEIGHT:u32 = 720;

pub(crate) const MAX_CHUNK_SIZE:usize = 1460;

pub type TelloVideoSender = mpsc::UnboundedSender<TelloVideoFrame>;
pub type TelloVideoReceiver = mpsc::UnboundedReceiver<TelloVideoFrame>;

pub fn make_tello_video_channel() -> (TelloVideoSender, TelloVideoReceiver) {
    mpsc::unbounded_channel()
}

/// A frame of h264 video from the drone.
#[derive(Debug)]
pub struct TelloVideoFrame {
    pub data: Vec<u8>
}

/// Where to listen for video, and whom to listen to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoEndpoint {
    pub bind: SocketAddr,
    /// Only datagrams from this host are accepted, if set
    pub peer: Option<IpAddr>,
}

/// Joins the drone's UDP chunks back into frames.
///
/// The drone splits each frame into full-size chunks; a shorter chunk ends
/// the frame.
pub(crate) struct FrameAssembler {
    buf: ByteBuffer,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self { buf: ByteBuffer::new() }
    }
}

impl FrameAssembler {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        if chunk.is_empty() {
            return None;
        }
        self.buf.write_bytes(chunk);
        if chunk.len() < MAX_CHUNK_SIZE {
            let frame = std::mem::replace(&mut self.buf, ByteBuffer::new()).into_vec();
            Some(frame)
        } else {
            None
        }
    }
}

/// Receives one datagram from the endpoint's peer, skipping any others.
pub(crate) async fn recv_chunk(sock: &UdpSocket, peer: Option<IpAddr>, chunk: &mut [u8]) -> Result<usize> {
    loop {
        let (n, from) = sock.recv_from(chunk).await?;
        match peer {
            Some(p) if p != from.ip() => {
                debug!("ignoring {n} bytes from {from}");
            }
            _ => return Ok(n),
        }
    }
}

#[derive(Debug)]
pub(crate) struct VideoListener {
    task: task::JoinHandle<()>
}

impl VideoListener {
    pub(crate) async fn start_listening(endpoint: VideoEndpoint, sender: TelloVideoSender) -> Result<Self> {
        info!("START LISTENING for video at {}", endpoint.bind);

        let sock = UdpSocket::bind(endpoint.bind).await?;

        let task = spawn(async move {
            let mut assembler = FrameAssembler::default();
            let mut chunk = vec![0; MAX_CHUNK_SIZE];
            loop {
                let n = match recv_chunk(&sock, endpoint.peer, &mut chunk).await {
                    Ok(n) => n,
                    Err(err) => {
                        warn!("video receive failed ({err}), stopping");
                        break;
                    }
                };
                if let Some(data) = assembler.push(&chunk[..n]) {
                    if sender.send(TelloVideoFrame { data }).is_err() {
                        debug!("video receiver dropped, stopping");
                        break;
                    }
                }
            }
        });

        Ok(Self { task })
    }

    pub(crate) fn stop_listening(&self) {
        info!("STOP LISTENING for video");
        self.task.abort();
    }
}

impl Drop for VideoListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}
