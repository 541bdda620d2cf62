//! Describing what the drone's camera sees.
//!
//! A description of the current view gives the parser context for
//! behaviours such as "follow" and "avoid". Descriptions come either from a
//! hosted vision-language model or, without an API token, from a simulated
//! analyst with canned replies.

use std::collections::VecDeque;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Local};
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::errors::{Result, TelloError};
use crate::settings::Settings;

pub const DEFAULT_INSTRUCTION: &str = "Describe what you see in this drone camera view";
pub const AUTO_INSTRUCTION: &str =
    "Describe the current view. Are there any obstacles, people, or interesting features to note?";

const API_BASE: &str = "https://api-inference.huggingface.co/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Produces a text description of a camera image.
#[allow(async_fn_in_trait)]
pub trait Analyst {
    /// `image` is an encoded still (eg. JPEG) of the view.
    async fn analyze(&mut self, image: &[u8], instruction: &str) -> Result<String>;
}

/// One description of the view.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub timestamp: DateTime<Local>,
    pub instruction: String,
    pub text: String,
}

/// The most recent analyses, oldest first.
#[derive(Debug, Clone)]
pub struct AnalysisLog {
    capacity: usize,
    entries: VecDeque<Analysis>,
}

impl AnalysisLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, entries: VecDeque::with_capacity(capacity) }
    }

    pub fn record(&mut self, instruction: &str, text: &str) -> &Analysis {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(Analysis {
            timestamp: Local::now(),
            instruction: instruction.to_string(),
            text: text.to_string(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn latest(&self) -> Option<&Analysis> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Analysis> {
        self.entries.iter()
    }
}

const OBSTACLE_REPLIES: &[&str] = &[
    "I can see the room layout. There appear to be some objects that could be obstacles on the sides.",
    "The view shows a relatively clear central area with potential obstacles near the edges.",
    "I detect some vertical structures that could be obstacles. Recommend cautious navigation.",
];

const PERSON_REPLIES: &[&str] = &[
    "I can detect what may be people in the background. Maintaining safe distance is recommended.",
    "There appear to be some human figures in the view. Flying responsibly around people.",
    "I notice some movement that could be people. Exercise caution during flight operations.",
];

const EXPLORE_REPLIES: &[&str] = &[
    "The area looks suitable for exploration. I recommend starting with gentle movements.",
    "Good visibility for exploration. The space appears to have multiple interesting areas to investigate.",
    "This environment seems safe for exploration flights with appropriate caution.",
];

const GENERAL_REPLIES: &[&str] = &[
    "I can see an open indoor space with good lighting. The area appears clear with no immediate obstacles.",
    "There's a wall visible in the distance. I recommend maintaining safe distance from obstacles.",
    "I detect what appears to be furniture or objects in the room. Navigate carefully around them.",
    "The view shows a clear path ahead with plenty of space for maneuvering.",
    "I can see some people in the background. Maintain safe distance and fly responsibly.",
    "The lighting conditions are good for flight. The area appears suitable for drone operations.",
    "I notice some ceiling features above. Be mindful of altitude limits indoors.",
    "The floor appears to have a clear pattern. This could be useful for navigation reference.",
];

/// Canned descriptions chosen by what the instruction asks about.
#[derive(Debug, Default)]
pub struct SimulatedAnalyst;

impl SimulatedAnalyst {
    fn replies_for(instruction: &str) -> &'static [&'static str] {
        let instruction = instruction.to_lowercase();
        if instruction.contains("obstacle") {
            OBSTACLE_REPLIES
        } else if instruction.contains("person") || instruction.contains("people") {
            PERSON_REPLIES
        } else if instruction.contains("explore") {
            EXPLORE_REPLIES
        } else {
            GENERAL_REPLIES
        }
    }
}

impl Analyst for SimulatedAnalyst {
    async fn analyze(&mut self, _image: &[u8], instruction: &str) -> Result<String> {
        let replies = Self::replies_for(instruction);
        let reply = replies
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| TelloError::AnalysisFailed { msg: "no simulated replies".to_string() })?;
        Ok(reply.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct Generated {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    One(Generated),
    Many(Vec<Generated>),
}

/// Client for a vision-language model on the Hugging Face inference API.
#[derive(Debug)]
pub struct HuggingFaceAnalyst {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl HuggingFaceAnalyst {
    pub fn new(model_name: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: model_url(model_name),
            token: token.to_string(),
        })
    }
}

pub fn model_url(model_name: &str) -> String {
    format!("{API_BASE}/{model_name}")
}

fn request_body(image: &[u8], instruction: &str) -> serde_json::Value {
    json!({
        "inputs": {
            "image": BASE64.encode(image),
            "text": instruction,
        },
        "parameters": {
            "max_new_tokens": 100,
            "temperature": 0.7,
        }
    })
}

fn generated_text(response: InferenceResponse) -> Result<String> {
    match response {
        InferenceResponse::One(g) => Ok(g.generated_text),
        InferenceResponse::Many(many) => many
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .ok_or_else(|| TelloError::AnalysisFailed { msg: "empty response".to_string() }),
    }
}

impl Analyst for HuggingFaceAnalyst {
    async fn analyze(&mut self, image: &[u8], instruction: &str) -> Result<String> {
        info!("asking {} to {instruction:?}", self.url);
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&request_body(image, instruction))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "vision model API error: {body}");
            return Err(TelloError::AnalysisFailed { msg: format!("API error {status}") });
        }

        generated_text(response.json().await?)
    }
}

/// Whichever analyst the settings call for.
#[derive(Debug)]
pub enum SceneAnalyst {
    Simulated(SimulatedAnalyst),
    Remote(HuggingFaceAnalyst),
}

impl SceneAnalyst {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        match settings.token() {
            Some(token) => Ok(SceneAnalyst::Remote(HuggingFaceAnalyst::new(&settings.model_name, token)?)),
            None => {
                info!("no API token, scene analysis is simulated");
                Ok(SceneAnalyst::Simulated(SimulatedAnalyst))
            }
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, SceneAnalyst::Simulated(_))
    }
}

impl Analyst for SceneAnalyst {
    async fn analyze(&mut self, image: &[u8], instruction: &str) -> Result<String> {
        match self {
            SceneAnalyst::Simulated(a) => a.analyze(image, instruction).await,
            SceneAnalyst::Remote(a) => a.analyze(image, instruction).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_keeps_most_recent() {
        let mut log = AnalysisLog::new(2);
        log.record("a", "first");
        log.record("b", "second");
        log.record("c", "third");
        assert_eq!(log.len(), 2);
        assert_eq!(log.latest().unwrap().text, "third");
        let texts: Vec<&str> = log.iter().map(|a| a.text.as_str()).collect();
        assert_eq!(texts, vec!["second", "third"]);
    }

    #[test]
    fn zero_capacity_still_keeps_latest() {
        let mut log = AnalysisLog::new(0);
        log.record("a", "only");
        assert_eq!(log.latest().unwrap().text, "only");
    }

    #[tokio::test]
    async fn simulated_replies_follow_instruction() {
        let mut analyst = SimulatedAnalyst;
        let reply = analyst.analyze(&[], "identify obstacles and avoid them").await.unwrap();
        assert!(OBSTACLE_REPLIES.contains(&reply.as_str()));
        let reply = analyst.analyze(&[], "look for people and follow them").await.unwrap();
        assert!(PERSON_REPLIES.contains(&reply.as_str()));
    }

    #[test]
    fn request_shape() {
        let body = request_body(b"jpeg", "what is ahead?");
        assert_eq!(body["inputs"]["image"], "anBlZw==");
        assert_eq!(body["inputs"]["text"], "what is ahead?");
        assert_eq!(body["parameters"]["max_new_tokens"], 100);
    }

    #[test]
    fn reads_either_response_shape() {
        let one: InferenceResponse = serde_json::from_str(r#"{"generated_text": "a wall"}"#).unwrap();
        assert_eq!(generated_text(one).unwrap(), "a wall");
        let many: InferenceResponse = serde_json::from_str(r#"[{"generated_text": "a cat"}]"#).unwrap();
        assert_eq!(generated_text(many).unwrap(), "a cat");
        let none: InferenceResponse = serde_json::from_str("[]").unwrap();
        assert!(generated_text(none).is_err());
    }

    #[test]
    fn analyst_follows_token() {
        assert!(SceneAnalyst::from_settings(&Settings::default()).unwrap().is_simulated());
        assert_eq!(
            model_url("microsoft/StreamVLM"),
            "https://api-inference.huggingface.co/models/microsoft/StreamVLM"
        );
    }
}
