//! Plain-language instructions to drone commands.
//!
//! Recognition is keyword based and works on whole words of the lower-cased
//! sentence. Intents are tried in a fixed order and the first one that
//! matches wins:
//!
//! 1. emergency words, which discard everything else
//! 2. compound behaviours (avoid, follow, explore, patrol, spin)
//! 3. rotation (`turn left 45 degrees`)
//! 4. flight control (take off, land, flip)
//! 5. movement (`go back 2 meters`)
//!
//! Sentences with none of these produce an empty plan.

use regex::Regex;
use tracing::debug;

use crate::command::{
    FlightPlan, FlipDirection, Intent, MoveDirection, PrimitiveCommand, TurnDirection,
};
use crate::errors::{Result, TelloError};
use crate::settings::Settings;

use MoveDirection::*;
use PrimitiveCommand::{Move, Turn};
use TurnDirection::*;

const NUMBER: &str = r"(\d+(?:\.\d+)?)";
const DISTANCE_UNIT: &str =
    r"(centimeters?|centimetres?|cm|meters?|metres?|m|feet|foot|ft)\b";
const ANGLE_UNIT: &str = r"(?:(?:degrees?|deg)\b|°)";

const CM_PER_FOOT: f64 = 30.0;

/// A behaviour that expands to a fixed command sequence.
struct CompoundIntent {
    intent: Intent,
    keywords: &'static [&'static str],
    /// When scene analysis is available it must mention one of these
    context_words: &'static [&'static str],
    steps: &'static [(Step, u32)],
    /// Steps used instead when the analysis lacks `context_words` but
    /// mentions one of the fallback words
    fallback: Option<Fallback>,
}

struct Fallback {
    context_words: &'static [&'static str],
    steps: &'static [(Step, u32)],
}

#[derive(Clone, Copy)]
enum Step {
    Move(MoveDirection),
    Turn(TurnDirection),
}

const COMPOUND_INTENTS: &[CompoundIntent] = &[
    CompoundIntent {
        intent: Intent::Avoid,
        keywords: &["avoid", "dodge", "evade", "stay away"],
        context_words: &["obstacle", "obstacles", "wall", "walls", "object", "objects"],
        steps: &[(Step::Move(Back), 50), (Step::Turn(Clockwise), 90)],
        fallback: None,
    },
    CompoundIntent {
        intent: Intent::Follow,
        keywords: &["follow", "track", "chase", "pursue"],
        context_words: &["person", "people"],
        steps: &[(Step::Move(Forward), 30)],
        // no one in view, head for whatever object is there
        fallback: Some(Fallback {
            context_words: &["object", "objects"],
            steps: &[(Step::Move(Forward), 20)],
        }),
    },
    CompoundIntent {
        intent: Intent::Explore,
        keywords: &["explore", "look around", "search"],
        context_words: &[],
        steps: &[
            (Step::Turn(Clockwise), 90),
            (Step::Move(Forward), 30),
            (Step::Turn(Clockwise), 90),
            (Step::Move(Forward), 30),
        ],
        fallback: None,
    },
    CompoundIntent {
        intent: Intent::Patrol,
        keywords: &["patrol"],
        context_words: &[],
        steps: &[
            (Step::Move(Forward), 50),
            (Step::Turn(Clockwise), 90),
            (Step::Move(Forward), 50),
            (Step::Turn(Clockwise), 90),
        ],
        fallback: None,
    },
    CompoundIntent {
        intent: Intent::Spin,
        keywords: &["spin", "turn around"],
        context_words: &[],
        steps: &[(Step::Turn(Clockwise), 180)],
        fallback: None,
    },
];

const ROTATIONS: &[(TurnDirection, &[&str])] = &[
    (CounterClockwise, &["turn left", "rotate left"]),
    (Clockwise, &["turn right", "rotate right"]),
];

const MOVEMENTS: &[(MoveDirection, &[&str])] = &[
    (Forward, &["forward", "forwards", "ahead"]),
    (Back, &["back", "backward", "backwards", "retreat"]),
    (Left, &["left"]),
    (Right, &["right"]),
    (Up, &["up", "higher", "rise", "ascend"]),
    (Down, &["down", "lower", "descend"]),
];

const TAKE_OFF_WORDS: &[&str] = &["takeoff", "take off", "launch"];
const LAND_WORDS: &[&str] = &["land", "landing"];

const FLIP_DIRECTIONS: &[(FlipDirection, &str)] = &[
    (FlipDirection::Forward, "forward"),
    (FlipDirection::Back, "back"),
    (FlipDirection::Left, "left"),
    (FlipDirection::Right, "right"),
];

/// Builds a regex matching any of `words` as whole words.
fn keyword_regex(words: &[impl AsRef<str>]) -> Result<Regex> {
    let alternatives: Vec<String> = words
        .iter()
        .map(|w| regex::escape(w.as_ref().trim()).replace(' ', r"\s+"))
        .filter(|w| !w.is_empty())
        .collect();
    // an empty list must never match
    let pattern = if alternatives.is_empty() {
        r"\b\B".to_string()
    } else {
        format!(r"\b(?:{})\b", alternatives.join("|"))
    };
    compile(&pattern)
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| TelloError::Generic { msg: format!("bad pattern {pattern}: {e}") })
}

struct Magnitudes {
    distance_after: Regex,
    distance_before: Regex,
    angle_after: Regex,
    angle_before: Regex,
    bare_number: Regex,
}

impl Magnitudes {
    fn new() -> Result<Self> {
        Ok(Self {
            distance_after: compile(&format!(r"{NUMBER}\s*{DISTANCE_UNIT}"))?,
            distance_before: compile(&format!(r"\b{DISTANCE_UNIT}\s*{NUMBER}"))?,
            angle_after: compile(&format!(r"{NUMBER}\s*{ANGLE_UNIT}"))?,
            angle_before: compile(&format!(r"(?:\b(?:degrees?|deg)|°)\s*{NUMBER}"))?,
            bare_number: compile(&format!(r"\b{NUMBER}\b"))?,
        })
    }

    /// Distance in centimetres, if the text names one.
    fn distance(&self, text: &str) -> Option<f64> {
        let with_unit = self
            .distance_after
            .captures(text)
            .map(|c| (c.get(1), c.get(2)))
            .or_else(|| self.distance_before.captures(text).map(|c| (c.get(2), c.get(1))));

        if let Some((Some(number), Some(unit))) = with_unit {
            let value: f64 = number.as_str().parse().ok()?;
            let factor = match unit.as_str() {
                "cm" | "centimeter" | "centimeters" | "centimetre" | "centimetres" => 1.0,
                "ft" | "foot" | "feet" => CM_PER_FOOT,
                _ => 100.0,
            };
            return Some(value * factor);
        }

        self.bare(text)
    }

    /// Angle in degrees, if the text names one.
    fn angle(&self, text: &str) -> Option<f64> {
        let with_unit = self
            .angle_after
            .captures(text)
            .or_else(|| self.angle_before.captures(text))
            .and_then(|c| c.get(1));

        match with_unit {
            Some(number) => number.as_str().parse().ok(),
            None => self.bare(text),
        }
    }

    fn bare(&self, text: &str) -> Option<f64> {
        self.bare_number
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|n| n.as_str().parse().ok())
    }
}

fn to_whole(value: f64) -> u32 {
    // float to int casts saturate, so huge values land on u32::MAX before clamping
    value.round() as u32
}

/// Turns sentences such as "go back 2 meters" into [`FlightPlan`]s.
pub struct CommandParser {
    settings: Settings,
    emergency: Regex,
    compound: Vec<(Regex, &'static CompoundIntent)>,
    context: Vec<Regex>,
    fallback_context: Vec<Option<Regex>>,
    rotations: Vec<(Regex, TurnDirection)>,
    movements: Vec<(Regex, MoveDirection)>,
    take_off: Regex,
    land: Regex,
    flip: Regex,
    flip_directions: Vec<(Regex, FlipDirection)>,
    magnitudes: Magnitudes,
}

impl CommandParser {
    pub fn new(settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let mut compound = Vec::with_capacity(COMPOUND_INTENTS.len());
        let mut context = Vec::with_capacity(COMPOUND_INTENTS.len());
        let mut fallback_context = Vec::with_capacity(COMPOUND_INTENTS.len());
        for c in COMPOUND_INTENTS {
            compound.push((keyword_regex(c.keywords)?, c));
            context.push(keyword_regex(c.context_words)?);
            fallback_context.push(c.fallback.as_ref().map(|f| keyword_regex(f.context_words)).transpose()?);
        }

        let rotations = ROTATIONS
            .iter()
            .map(|(d, words)| -> Result<_> { Ok((keyword_regex(words)?, *d)) })
            .collect::<Result<Vec<_>>>()?;
        let movements = MOVEMENTS
            .iter()
            .map(|(d, words)| -> Result<_> { Ok((keyword_regex(words)?, *d)) })
            .collect::<Result<Vec<_>>>()?;
        let flip_directions = FLIP_DIRECTIONS
            .iter()
            .map(|(d, word)| -> Result<_> { Ok((keyword_regex(&[word])?, *d)) })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            settings: settings.clone(),
            emergency: keyword_regex(&settings.emergency_words)?,
            compound,
            context,
            fallback_context,
            rotations,
            movements,
            take_off: keyword_regex(TAKE_OFF_WORDS)?,
            land: keyword_regex(LAND_WORDS)?,
            flip: keyword_regex(&["flip"])?,
            flip_directions,
            magnitudes: Magnitudes::new()?,
        })
    }

    /// Parses an instruction without any scene analysis.
    pub fn parse(&self, text: &str) -> FlightPlan {
        self.parse_with_context(text, None)
    }

    /// Parses an instruction; `analysis` is the latest description of the
    /// camera view, which gates the follow and avoid behaviours.
    pub fn parse_with_context(&self, text: &str, analysis: Option<&str>) -> FlightPlan {
        let text = text.to_lowercase();
        let analysis = analysis.map(str::to_lowercase);

        let plan = self.interpret(&text, analysis.as_deref());
        debug!("parsed {text:?} as {:?} {:?}", plan.intent, plan.to_strings());
        plan
    }

    fn interpret(&self, text: &str, analysis: Option<&str>) -> FlightPlan {
        if self.emergency.is_match(text) {
            return FlightPlan::new(Intent::Emergency, vec![PrimitiveCommand::Emergency]);
        }

        let gates = self.context.iter().zip(&self.fallback_context);
        for ((keywords, compound), (context, fallback_context)) in self.compound.iter().zip(gates) {
            if !keywords.is_match(text) {
                continue;
            }
            if let Some(analysis) = analysis {
                if !compound.context_words.is_empty() && !context.is_match(analysis) {
                    if let (Some(fallback), Some(words)) = (&compound.fallback, fallback_context) {
                        if words.is_match(analysis) {
                            return FlightPlan::new(compound.intent, self.expand(fallback.steps));
                        }
                    }
                    debug!("{:?} ignored, nothing relevant in view", compound.intent);
                    return FlightPlan::empty();
                }
            }
            return FlightPlan::new(compound.intent, self.expand(compound.steps));
        }

        for (keywords, direction) in &self.rotations {
            if keywords.is_match(text) {
                let degrees = self.angle(text);
                return FlightPlan::new(Intent::Rotation, vec![Turn { direction: *direction, degrees }]);
            }
        }

        if self.take_off.is_match(text) {
            return FlightPlan::new(Intent::FlightControl, vec![PrimitiveCommand::TakeOff]);
        }
        if self.land.is_match(text) {
            return FlightPlan::new(Intent::FlightControl, vec![PrimitiveCommand::Land]);
        }
        if self.flip.is_match(text) {
            let direction = self
                .flip_directions
                .iter()
                .find(|(word, _)| word.is_match(text))
                .map(|(_, d)| *d)
                .unwrap_or(FlipDirection::Forward);
            return FlightPlan::new(Intent::FlightControl, vec![PrimitiveCommand::Flip(direction)]);
        }

        for (keywords, direction) in &self.movements {
            if keywords.is_match(text) {
                let cm = self.distance(text);
                return FlightPlan::new(Intent::Movement, vec![Move { direction: *direction, cm }]);
            }
        }

        FlightPlan::empty()
    }

    fn expand(&self, steps: &[(Step, u32)]) -> Vec<PrimitiveCommand> {
        steps
            .iter()
            .map(|(step, n)| match step {
                Step::Move(direction) => Move { direction: *direction, cm: self.settings.clamp_distance(*n) },
                Step::Turn(direction) => Turn { direction: *direction, degrees: self.settings.clamp_angle(*n) },
            })
            .collect()
    }

    fn distance(&self, text: &str) -> u32 {
        let cm = self
            .magnitudes
            .distance(text)
            .map(to_whole)
            .unwrap_or(self.settings.default_movement_distance);
        self.settings.clamp_distance(cm)
    }

    fn angle(&self, text: &str) -> u32 {
        let degrees = self
            .magnitudes
            .angle(text)
            .map(to_whole)
            .unwrap_or(self.settings.default_rotation_angle);
        self.settings.clamp_angle(degrees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> CommandParser {
        CommandParser::new(&Settings::default()).unwrap()
    }

    fn commands(text: &str) -> Vec<String> {
        parser().parse(text).to_strings()
    }

    #[test]
    fn movement_with_units() {
        assert_eq!(commands("Go back 2 meters"), vec!["back 200"]);
        assert_eq!(commands("move forward 50cm"), vec!["forward 50"]);
        assert_eq!(commands("move forward 1.5 m"), vec!["forward 150"]);
        assert_eq!(commands("go up 3 feet"), vec!["up 90"]);
        assert_eq!(commands("move right 75"), vec!["right 75"]);
    }

    #[test]
    fn unit_before_number() {
        assert_eq!(commands("go left cm 40"), vec!["left 40"]);
        assert_eq!(commands("rotate right degrees 45"), vec!["cw 45"]);
    }

    #[test]
    fn defaults_without_numbers() {
        assert_eq!(commands("fly forward"), vec!["forward 50"]);
        assert_eq!(commands("rotate right"), vec!["cw 90"]);
    }

    #[test]
    fn rotation_wins_over_plain_direction() {
        assert_eq!(commands("Turn left 90 degrees"), vec!["ccw 90"]);
        assert_eq!(commands("turn right 45°"), vec!["cw 45"]);
    }

    #[test]
    fn magnitudes_are_clamped() {
        assert_eq!(commands("move forward 5 cm"), vec!["forward 20"]);
        assert_eq!(commands("move forward 9 m"), vec!["forward 500"]);
        assert_eq!(commands("move forward 99999999999999 m"), vec!["forward 500"]);
        assert_eq!(commands("turn left 720 degrees"), vec!["ccw 360"]);
        assert_eq!(commands("turn left 0 degrees"), vec!["ccw 1"]);
    }

    #[test]
    fn minutes_are_not_meters() {
        assert_eq!(commands("go up for 2 minutes"), vec!["up 20"]);
    }

    #[test]
    fn emergency_discards_everything_else() {
        for text in [
            "emergency",
            "go forward 2 m then EMERGENCY",
            "stop!",
            "halt and turn left 90 degrees",
            "abort the patrol",
        ] {
            assert_eq!(commands(text), vec!["emergency"], "{text}");
        }
    }

    #[test]
    fn emergency_words_are_whole_words() {
        assert_eq!(commands("go up to the bus stops"), vec!["up 50"]);
    }

    #[test]
    fn compound_intents_expand() {
        assert_eq!(commands("There's something in front, avoid it"), vec!["back 50", "cw 90"]);
        assert_eq!(commands("follow that person"), vec!["forward 30"]);
        assert_eq!(
            commands("look around and explore"),
            vec!["cw 90", "forward 30", "cw 90", "forward 30"]
        );
        assert_eq!(commands("patrol the room"), vec!["forward 50", "cw 90", "forward 50", "cw 90"]);
        assert_eq!(commands("turn around"), vec!["cw 180"]);
    }

    #[test]
    fn flight_control() {
        assert_eq!(commands("take off please"), vec!["takeoff"]);
        assert_eq!(commands("land now"), vec!["land"]);
        assert_eq!(commands("do a flip to the left"), vec!["flip l"]);
        assert_eq!(commands("flip"), vec!["flip f"]);
    }

    #[test]
    fn nothing_recognised_is_empty() {
        let plan = parser().parse("what a lovely day");
        assert!(plan.is_empty());
        assert_eq!(plan.intent, Intent::None);
        assert!(parser().parse("").is_empty());
    }

    #[test]
    fn keywords_are_whole_words() {
        // "upbeat" and "download" must not read as up/down
        assert!(parser().parse("upbeat download").is_empty());
    }

    #[test]
    fn context_gates_follow_and_avoid() {
        let p = parser();
        let empty_room = "An open indoor space with good lighting.";
        assert!(p.parse_with_context("follow them", Some(empty_room)).is_empty());
        assert!(p.parse_with_context("avoid it", Some(empty_room)).is_empty());

        let people = "I can see some people in the background.";
        assert_eq!(p.parse_with_context("follow them", Some(people)).to_strings(), vec!["forward 30"]);

        let wall = "There's a wall visible in the distance.";
        assert_eq!(p.parse_with_context("dodge", Some(wall)).to_strings(), vec!["back 50", "cw 90"]);

        // with nobody in view, follow closes in on an object instead
        let furniture = "There might be some furniture or objects in the room.";
        assert_eq!(p.parse_with_context("follow it", Some(furniture)).to_strings(), vec!["forward 20"]);
        assert_eq!(p.parse_with_context("track it", Some(furniture)).intent, Intent::Follow);

        // explore does not depend on what is in view
        assert_eq!(p.parse_with_context("explore", Some(empty_room)).commands.len(), 4);
    }

    #[test]
    fn configured_limits_apply() {
        let settings = Settings {
            max_movement_distance: 100,
            default_rotation_angle: 45,
            emergency_words: vec!["cancel".to_string()],
            ..Settings::default()
        };
        let p = CommandParser::new(&settings).unwrap();
        assert_eq!(p.parse("go forward 3 m").to_strings(), vec!["forward 100"]);
        assert_eq!(p.parse("turn left").to_strings(), vec!["ccw 45"]);
        assert_eq!(p.parse("cancel that").to_strings(), vec!["emergency"]);
        // "stop" is no longer an emergency word, and means nothing else either
        assert!(p.parse("stop").is_empty());
    }

    #[test]
    fn no_emergency_words_never_matches() {
        let settings = Settings { emergency_words: vec![], ..Settings::default() };
        let p = CommandParser::new(&settings).unwrap();
        assert_eq!(p.parse("go down").to_strings(), vec!["down 50"]);
    }
}
