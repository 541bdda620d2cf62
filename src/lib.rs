//! Fly a Tello drone from plain-language instructions.
//!
//! Sentences such as "go back 2 meters" are turned into the drone's SDK
//! commands by a [`CommandParser`], and run on a connected [`Tello`]. Video
//! is received from whichever candidate URL a [`VideoSourceSelector`] finds
//! to work.

mod analysis;
mod command;
mod errors;
mod options;
mod parser;
mod settings;
mod state;
mod tello;
mod video;
mod video_source;
mod wifi;

pub use analysis::{
    Analysis, AnalysisLog, Analyst, HuggingFaceAnalyst, SceneAnalyst, SimulatedAnalyst,
    AUTO_INSTRUCTION, DEFAULT_INSTRUCTION,
};
pub use command::{
    FlightPlan, FlipDirection, Intent, MoveDirection, PrimitiveCommand, Query, TelloCommand,
    TelloCommandReceiver, TelloCommandSender, TurnDirection,
};
pub use errors::{Result, TelloError};
pub use options::TelloOptions;
pub use parser::CommandParser;
pub use settings::{Settings, DEFAULT_COMMAND_PORT, DEFAULT_DRONE_HOST, DEFAULT_VIDEO_PORT};
pub use state::{TelloState, TelloStateReceiver, Vector3};
pub use tello::{Connected, Disconnected, NoWifi, PlanOutcome, Tello};
pub use video::{TelloVideoFrame, TelloVideoReceiver, VideoEndpoint, VIDEO_HEIGHT, VIDEO_WIDTH};
pub use video_source::{
    AddressFormat, FrameCheck, H264FrameCheck, UdpVideoProbe, VideoCandidate, VideoProbe,
    VideoSourceSelector, CANDIDATE_FORMATS,
};
