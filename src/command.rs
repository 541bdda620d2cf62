use std::fmt;
use std::str::FromStr;

use tokio::sync::mpsc;

use crate::errors::TelloError;

/// Commands accepted over the remote control channel, see
/// [`TelloOptions::with_command`](crate::TelloOptions::with_command).
#[derive(Debug)]
pub enum TelloCommand {
    TakeOff,
    Land,
    StopAndHover,
    EmergencyStop,
    RemoteControl { left_right: i8, forwards_backwards: i8, up_down: i8, yaw: i8 },
    Flip(FlipDirection),
    /// Run a whole plan, eg. one parsed from a sentence
    Execute(FlightPlan),
}

pub type TelloCommandSender = mpsc::UnboundedSender<TelloCommand>;
pub type TelloCommandReceiver = mpsc::UnboundedReceiver<TelloCommand>;

pub fn make_tello_command_channel() -> (TelloCommandSender, TelloCommandReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
}

impl MoveDirection {
    pub fn verb(self) -> &'static str {
        match self {
            MoveDirection::Forward => "forward",
            MoveDirection::Back => "back",
            MoveDirection::Left => "left",
            MoveDirection::Right => "right",
            MoveDirection::Up => "up",
            MoveDirection::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    Clockwise,
    CounterClockwise,
}

impl TurnDirection {
    pub fn verb(self) -> &'static str {
        match self {
            TurnDirection::Clockwise => "cw",
            TurnDirection::CounterClockwise => "ccw",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Forward,
    Back,
    Left,
    Right,
}

impl FlipDirection {
    pub fn letter(self) -> char {
        match self {
            FlipDirection::Forward => 'f',
            FlipDirection::Back => 'b',
            FlipDirection::Left => 'l',
            FlipDirection::Right => 'r',
        }
    }
}

/// Values the drone can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Battery,
    Height,
    FlightTime,
    Temperature,
}

impl Query {
    pub fn verb(self) -> &'static str {
        match self {
            Query::Battery => "battery?",
            Query::Height => "height?",
            Query::FlightTime => "time?",
            Query::Temperature => "temp?",
        }
    }
}

/// A single instruction in the drone's text SDK.
///
/// Formats exactly as sent on the wire, eg. `forward 50` or `cw 90`, and
/// parses back from the same text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveCommand {
    Command,
    TakeOff,
    Land,
    /// Stop the motors immediately
    Emergency,
    /// Hover in place
    Stop,
    StreamOn,
    StreamOff,
    Move { direction: MoveDirection, cm: u32 },
    Turn { direction: TurnDirection, degrees: u32 },
    Flip(FlipDirection),
    RemoteControl { left_right: i8, forwards_backwards: i8, up_down: i8, yaw: i8 },
    Query(Query),
}

impl PrimitiveCommand {
    /// Read commands answer with a value rather than `ok`.
    pub fn is_query(&self) -> bool {
        matches!(self, PrimitiveCommand::Query(_))
    }

    /// `rc` commands get no reply from the drone.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, PrimitiveCommand::RemoteControl { .. })
    }
}

impl fmt::Display for PrimitiveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveCommand::Command => write!(f, "command"),
            PrimitiveCommand::TakeOff => write!(f, "takeoff"),
            PrimitiveCommand::Land => write!(f, "land"),
            PrimitiveCommand::Emergency => write!(f, "emergency"),
            PrimitiveCommand::Stop => write!(f, "stop"),
            PrimitiveCommand::StreamOn => write!(f, "streamon"),
            PrimitiveCommand::StreamOff => write!(f, "streamoff"),
            PrimitiveCommand::Move { direction, cm } => write!(f, "{} {cm}", direction.verb()),
            PrimitiveCommand::Turn { direction, degrees } => write!(f, "{} {degrees}", direction.verb()),
            PrimitiveCommand::Flip(direction) => write!(f, "flip {}", direction.letter()),
            PrimitiveCommand::RemoteControl { left_right, forwards_backwards, up_down, yaw } => {
                write!(f, "rc {left_right} {forwards_backwards} {up_down} {yaw}")
            }
            PrimitiveCommand::Query(q) => write!(f, "{}", q.verb()),
        }
    }
}

impl FromStr for PrimitiveCommand {
    type Err = TelloError;

    /// Parses a command typed in the drone's own syntax. Magnitudes are
    /// kept as given and clamped when the command is sent.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TelloError::InvalidCommand { msg: s.to_string() };

        let lower = s.trim().to_lowercase();
        let mut parts = lower.split_whitespace();
        let verb = parts.next().ok_or_else(invalid)?;
        let args: Vec<&str> = parts.collect();

        let magnitude = |args: &[&str]| -> Result<u32, TelloError> {
            match args {
                [n] => n.parse::<u32>().map_err(|_| invalid()),
                _ => Err(invalid()),
            }
        };

        let command = match verb {
            "command" => PrimitiveCommand::Command,
            "takeoff" => PrimitiveCommand::TakeOff,
            "land" => PrimitiveCommand::Land,
            "emergency" => PrimitiveCommand::Emergency,
            "stop" => PrimitiveCommand::Stop,
            "streamon" => PrimitiveCommand::StreamOn,
            "streamoff" => PrimitiveCommand::StreamOff,
            "battery?" => PrimitiveCommand::Query(Query::Battery),
            "height?" => PrimitiveCommand::Query(Query::Height),
            "time?" => PrimitiveCommand::Query(Query::FlightTime),
            "temp?" => PrimitiveCommand::Query(Query::Temperature),
            "forward" | "back" | "left" | "right" | "up" | "down" => {
                let direction = match verb {
                    "forward" => MoveDirection::Forward,
                    "back" => MoveDirection::Back,
                    "left" => MoveDirection::Left,
                    "right" => MoveDirection::Right,
                    "up" => MoveDirection::Up,
                    _ => MoveDirection::Down,
                };
                PrimitiveCommand::Move { direction, cm: magnitude(&args)? }
            }
            "cw" => PrimitiveCommand::Turn { direction: TurnDirection::Clockwise, degrees: magnitude(&args)? },
            "ccw" => PrimitiveCommand::Turn { direction: TurnDirection::CounterClockwise, degrees: magnitude(&args)? },
            "flip" => {
                let direction = match args.as_slice() {
                    ["f"] => FlipDirection::Forward,
                    ["b"] => FlipDirection::Back,
                    ["l"] => FlipDirection::Left,
                    ["r"] => FlipDirection::Right,
                    _ => return Err(invalid()),
                };
                PrimitiveCommand::Flip(direction)
            }
            "rc" => {
                let values = args
                    .iter()
                    .map(|a| a.parse::<i8>().map_err(|_| invalid()))
                    .collect::<Result<Vec<_>, _>>()?;
                match values.as_slice() {
                    [a, b, c, d] => PrimitiveCommand::RemoteControl {
                        left_right: *a,
                        forwards_backwards: *b,
                        up_down: *c,
                        yaw: *d,
                    },
                    _ => return Err(invalid()),
                }
            }
            _ => return Err(invalid()),
        };

        let takes_args = matches!(
            command,
            PrimitiveCommand::Move { .. }
                | PrimitiveCommand::Turn { .. }
                | PrimitiveCommand::Flip(_)
                | PrimitiveCommand::RemoteControl { .. }
        );
        if !takes_args && !args.is_empty() {
            return Err(invalid());
        }

        Ok(command)
    }
}

/// What a sentence was understood to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    None,
    Emergency,
    Movement,
    Rotation,
    FlightControl,
    Avoid,
    Follow,
    Explore,
    Patrol,
    Spin,
}

/// Ordered primitive commands produced from one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightPlan {
    pub intent: Intent,
    pub commands: Vec<PrimitiveCommand>,
}

impl FlightPlan {
    pub fn empty() -> Self {
        Self { intent: Intent::None, commands: vec![] }
    }

    pub fn new(intent: Intent, commands: Vec<PrimitiveCommand>) -> Self {
        Self { intent, commands }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The commands in wire format.
    pub fn to_strings(&self) -> Vec<String> {
        self.commands.iter().map(|c| c.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_in_sdk_syntax() {
        let forward = PrimitiveCommand::Move { direction: MoveDirection::Forward, cm: 50 };
        assert_eq!(forward.to_string(), "forward 50");
        let ccw = PrimitiveCommand::Turn { direction: TurnDirection::CounterClockwise, degrees: 90 };
        assert_eq!(ccw.to_string(), "ccw 90");
        assert_eq!(PrimitiveCommand::Flip(FlipDirection::Left).to_string(), "flip l");
        assert_eq!(PrimitiveCommand::Query(Query::Battery).to_string(), "battery?");
    }

    #[test]
    fn parses_typed_commands() {
        assert_eq!(
            "UP 50".parse::<PrimitiveCommand>().unwrap(),
            PrimitiveCommand::Move { direction: MoveDirection::Up, cm: 50 }
        );
        assert_eq!("height?".parse::<PrimitiveCommand>().unwrap(), PrimitiveCommand::Query(Query::Height));
        assert_eq!(
            "rc -10 20 0 100".parse::<PrimitiveCommand>().unwrap(),
            PrimitiveCommand::RemoteControl { left_right: -10, forwards_backwards: 20, up_down: 0, yaw: 100 }
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        for bad in ["", "forward", "forward ten", "flip x", "land now", "hover 3", "rc 1 2 3"] {
            assert!(bad.parse::<PrimitiveCommand>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn rc_has_no_reply() {
        let rc = PrimitiveCommand::RemoteControl { left_right: 0, forwards_backwards: 0, up_down: 0, yaw: 0 };
        assert!(!rc.expects_reply());
        assert!(PrimitiveCommand::Land.expects_reply());
    }

    #[test]
    fn typed_queries_are_recognised() {
        for typed in ["battery?", "height?", "time?", "temp?"] {
            assert!(typed.parse::<PrimitiveCommand>().unwrap().is_query(), "{typed}");
        }
        assert!(!"up 50".parse::<PrimitiveCommand>().unwrap().is_query());
    }
}
