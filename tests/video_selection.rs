use tello_pilot::{TelloError, VideoCandidate, VideoProbe, VideoSourceSelector};

/// Answers from a fixed list of working URLs and remembers what it was asked.
struct FakeProbe {
    reachable: Vec<&'static str>,
    probed: Vec<String>,
}

impl FakeProbe {
    fn new(reachable: &[&'static str]) -> Self {
        Self { reachable: reachable.to_vec(), probed: vec![] }
    }
}

impl VideoProbe for FakeProbe {
    async fn probe(&mut self, candidate: &VideoCandidate) -> bool {
        self.probed.push(candidate.url.clone());
        self.reachable.contains(&candidate.url.as_str())
    }
}

#[tokio::test]
async fn second_candidate_wins_and_third_is_never_probed() {
    let mut selector = VideoSourceSelector::for_drone("192.168.10.1", 11111);
    let mut probe = FakeProbe::new(&["udp://@192.168.10.1:11111", "udp://0.0.0.0:11111"]);

    let chosen = selector.select(&mut probe).await.unwrap();

    assert_eq!(chosen.url, "udp://@192.168.10.1:11111");
    assert!(chosen.works);
    assert_eq!(probe.probed, vec!["udp://192.168.10.1:11111", "udp://@192.168.10.1:11111"]);

    let works: Vec<bool> = selector.candidates().iter().map(|c| c.works).collect();
    assert_eq!(works, vec![false, true, false]);
}

#[tokio::test]
async fn first_working_candidate_stops_the_search() {
    let mut selector = VideoSourceSelector::with_candidates(vec![
        VideoCandidate::new("udp://a:1"),
        VideoCandidate::new("udp://b:1"),
    ]);
    let mut probe = FakeProbe::new(&["udp://a:1", "udp://b:1"]);

    assert_eq!(selector.select(&mut probe).await.unwrap().url, "udp://a:1");
    assert_eq!(probe.probed.len(), 1);
}

#[tokio::test]
async fn nothing_works() {
    let mut selector = VideoSourceSelector::for_drone("192.168.10.1", 11111);
    let mut probe = FakeProbe::new(&[]);

    let err = selector.select(&mut probe).await.unwrap_err();

    assert!(matches!(err, TelloError::NoVideoSource));
    // each candidate is tried exactly once
    assert_eq!(probe.probed.len(), 3);
}
