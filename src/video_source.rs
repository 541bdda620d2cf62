//! Finding a video URL that actually delivers frames.
//!
//! The drone streams h264 to UDP port 11111 of whoever put it in command
//! mode. Depending on the host's network setup only some ways of listening
//! for it work, so a short, fixed list of candidate URLs is probed in order
//! and the first one to yield a decodable frame is used.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use openh264::decoder::Decoder;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::errors::{Result, TelloError};
use crate::settings::Settings;
use crate::video::{recv_chunk, FrameAssembler, VideoEndpoint, MAX_CHUNK_SIZE};

/// Ways of addressing the drone's video stream, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFormat {
    /// `udp://{host}:{port}`: any local interface, datagrams from the drone only
    Drone,
    /// `udp://@{host}:{port}`: bound to the drone's address
    BindDrone,
    /// `udp://0.0.0.0:{port}`: the usual SDK default
    Unspecified,
}

pub const CANDIDATE_FORMATS: &[AddressFormat] =
    &[AddressFormat::Drone, AddressFormat::BindDrone, AddressFormat::Unspecified];

impl AddressFormat {
    pub fn url(self, host: &str, port: u16) -> String {
        match self {
            AddressFormat::Drone => format!("udp://{host}:{port}"),
            AddressFormat::BindDrone => format!("udp://@{host}:{port}"),
            AddressFormat::Unspecified => format!("udp://0.0.0.0:{port}"),
        }
    }
}

/// A URL to try, and whether it has been seen to work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCandidate {
    pub url: String,
    pub works: bool,
}

impl VideoCandidate {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), works: false }
    }

    /// How to listen for this URL.
    ///
    /// `udp://host:port` listens on every interface but only accepts
    /// datagrams sent by `host`, unless `host` is itself unspecified.
    /// `udp://@host:port` binds to `host` and accepts anything.
    pub fn endpoint(&self) -> Result<VideoEndpoint> {
        let invalid = || TelloError::InvalidVideoUrl { url: self.url.clone() };

        let rest = self.url.strip_prefix("udp://").ok_or_else(invalid)?;
        let (bind_to_host, address) = match rest.strip_prefix('@') {
            Some(address) => (true, address),
            None => (false, rest),
        };
        let address: SocketAddr = address.parse().map_err(|_| invalid())?;

        let endpoint = if bind_to_host || address.ip().is_unspecified() {
            VideoEndpoint { bind: address, peer: None }
        } else {
            VideoEndpoint {
                bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), address.port()),
                peer: Some(address.ip()),
            }
        };
        Ok(endpoint)
    }
}

/// Something that can tell whether a URL delivers video.
#[allow(async_fn_in_trait)]
pub trait VideoProbe {
    /// True if a decodable frame arrived from `candidate` in time.
    async fn probe(&mut self, candidate: &VideoCandidate) -> bool;
}

/// Decides whether an assembled frame is usable.
///
/// Checks are `Send` so that starting video can happen on a spawned task.
pub trait FrameCheck: Send {
    fn is_decodable(&mut self, frame: &[u8]) -> bool;
}

/// Runs frames through an h264 decoder; a frame is good once it decodes
/// to a picture.
pub struct H264FrameCheck {
    decoder: Decoder,
}

impl H264FrameCheck {
    pub fn new() -> Result<Self> {
        let decoder = Decoder::new()
            .map_err(|e| TelloError::Generic { msg: format!("failed to create h264 decoder - {e:?}") })?;
        Ok(Self { decoder })
    }
}

impl FrameCheck for H264FrameCheck {
    fn is_decodable(&mut self, frame: &[u8]) -> bool {
        matches!(self.decoder.decode(frame), Ok(Some(_)))
    }
}

type MakeFrameCheck = fn() -> Result<Box<dyn FrameCheck>>;

fn make_h264_check() -> Result<Box<dyn FrameCheck>> {
    Ok(Box::new(H264FrameCheck::new()?))
}

/// Listens on a candidate's endpoint for a bounded time.
pub struct UdpVideoProbe {
    timeout: Duration,
    make_check: MakeFrameCheck,
}

impl UdpVideoProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, make_check: make_h264_check }
    }

    /// Uses another notion of "decodable", eg. for streams that are not h264.
    pub fn with_frame_check(timeout: Duration, make_check: MakeFrameCheck) -> Self {
        Self { timeout, make_check }
    }

    async fn first_decodable_frame(&self, candidate: &VideoCandidate) -> Result<bool> {
        let endpoint = candidate.endpoint()?;
        let sock = UdpSocket::bind(endpoint.bind).await?;
        let mut check = (self.make_check)()?;

        let receive = async {
            let mut assembler = FrameAssembler::default();
            let mut chunk = vec![0; MAX_CHUNK_SIZE];
            loop {
                let n = recv_chunk(&sock, endpoint.peer, &mut chunk).await?;
                if let Some(frame) = assembler.push(&chunk[..n]) {
                    if check.is_decodable(&frame) {
                        return Ok::<_, TelloError>(frame.len());
                    }
                }
            }
        };

        match timeout(self.timeout, receive).await {
            Ok(Ok(size)) => {
                info!("got a {size} byte frame from {}", candidate.url);
                Ok(true)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Ok(false),
        }
    }
}

impl VideoProbe for UdpVideoProbe {
    async fn probe(&mut self, candidate: &VideoCandidate) -> bool {
        match self.first_decodable_frame(candidate).await {
            Ok(works) => works,
            Err(err) => {
                warn!("probing {} failed: {err}", candidate.url);
                false
            }
        }
    }
}

/// Picks the first working video URL for a drone.
#[derive(Debug, Clone)]
pub struct VideoSourceSelector {
    candidates: Vec<VideoCandidate>,
}

impl VideoSourceSelector {
    pub fn new(settings: &Settings) -> Self {
        Self::for_drone(&settings.drone_host, settings.video_port)
    }

    pub fn for_drone(host: &str, port: u16) -> Self {
        let candidates = CANDIDATE_FORMATS
            .iter()
            .map(|f| VideoCandidate::new(f.url(host, port)))
            .collect();
        Self { candidates }
    }

    pub fn with_candidates(candidates: Vec<VideoCandidate>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[VideoCandidate] {
        &self.candidates
    }

    /// Probes candidates in order and returns the first that works.
    ///
    /// Candidates after the winner are left unprobed. Each candidate gets
    /// exactly one try.
    pub async fn select<P: VideoProbe>(&mut self, probe: &mut P) -> Result<VideoCandidate> {
        for candidate in self.candidates.iter_mut() {
            info!("trying video source {}", candidate.url);
            candidate.works = probe.probe(candidate).await;
            if candidate.works {
                info!("video stream working: {}", candidate.url);
                return Ok(candidate.clone());
            }
        }
        warn!("no video source produced a frame");
        Err(TelloError::NoVideoSource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_order() {
        let selector = VideoSourceSelector::for_drone("192.168.10.1", 11111);
        let urls: Vec<&str> = selector.candidates().iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["udp://192.168.10.1:11111", "udp://@192.168.10.1:11111", "udp://0.0.0.0:11111"]
        );
        assert!(selector.candidates().iter().all(|c| !c.works));
    }

    #[test]
    fn endpoints() {
        let drone = VideoCandidate::new("udp://192.168.10.1:11111").endpoint().unwrap();
        assert_eq!(drone.bind, "0.0.0.0:11111".parse().unwrap());
        assert_eq!(drone.peer, Some("192.168.10.1".parse().unwrap()));

        let bound = VideoCandidate::new("udp://@192.168.10.1:11111").endpoint().unwrap();
        assert_eq!(bound.bind, "192.168.10.1:11111".parse().unwrap());
        assert_eq!(bound.peer, None);

        let any = VideoCandidate::new("udp://0.0.0.0:11111").endpoint().unwrap();
        assert_eq!(any.bind, "0.0.0.0:11111".parse().unwrap());
        assert_eq!(any.peer, None);
    }

    #[test]
    fn bad_urls() {
        for url in ["http://192.168.10.1:11111", "udp://drone", "udp://@:11111", ""] {
            let err = VideoCandidate::new(url).endpoint().unwrap_err();
            assert!(matches!(err, TelloError::InvalidVideoUrl { .. }), "{url}");
        }
    }

    #[test]
    fn video_checks_can_move_between_threads() {
        fn assert_send<T: Send>() {}
        assert_send::<UdpVideoProbe>();
        assert_send::<H264FrameCheck>();
        assert_send::<Box<dyn FrameCheck>>();
    }

    #[tokio::test]
    async fn unusable_url_fails_probe() {
        let mut probe = UdpVideoProbe::new(Duration::from_millis(50));
        assert!(!probe.probe(&VideoCandidate::new("not a url")).await);
    }

    fn accept_anything() -> Result<Box<dyn FrameCheck>> {
        struct Anything;
        impl FrameCheck for Anything {
            fn is_decodable(&mut self, frame: &[u8]) -> bool {
                !frame.is_empty()
            }
        }
        Ok(Box::new(Anything))
    }

    #[tokio::test]
    async fn silent_source_times_out() {
        let mut probe = UdpVideoProbe::with_frame_check(Duration::from_millis(100), accept_anything);
        assert!(!probe.probe(&VideoCandidate::new("udp://@127.0.0.1:0")).await);
    }

    #[tokio::test]
    async fn udp_probe_sees_frames() {
        let port = {
            let s = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            s.local_addr().unwrap().port()
        };
        let candidate = VideoCandidate::new(format!("udp://@127.0.0.1:{port}"));

        let sender = tokio::spawn(async move {
            let drone = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            loop {
                let _ = drone.send_to(&[0, 0, 0, 1, 0x67], ("127.0.0.1", port)).await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        let mut probe = UdpVideoProbe::with_frame_check(Duration::from_secs(2), accept_anything);
        assert!(probe.probe(&candidate).await);
        sender.abort();
    }
}
