use tello_pilot::{CommandParser, Intent, MoveDirection, PrimitiveCommand, Settings};

fn parser() -> CommandParser {
    CommandParser::new(&Settings::default()).unwrap()
}

#[test]
fn forward_distances_are_normalised_and_clamped() {
    let parser = parser();
    for m in [0u32, 1, 19, 20, 21, 50, 99, 100, 250, 499, 500, 501, 1000, 100_000] {
        let cases = [("cm", m), ("m", m.saturating_mul(100)), ("degrees", m)];
        for (unit, expected) in cases {
            let plan = parser.parse(&format!("move forward {m} {unit}"));
            assert_eq!(plan.intent, Intent::Movement, "{m} {unit}");
            assert_eq!(
                plan.commands,
                vec![PrimitiveCommand::Move { direction: MoveDirection::Forward, cm: expected.clamp(20, 500) }],
                "{m} {unit}"
            );
        }
    }
}

#[test]
fn emergency_is_always_a_single_stop() {
    let parser = parser();
    for text in [
        "emergency",
        "EMERGENCY!!!",
        "take off, go forward 3 m, then emergency",
        "emergency: turn left 90 degrees and explore",
        "follow the person... no, emergency",
    ] {
        let plan = parser.parse(text);
        assert_eq!(plan.intent, Intent::Emergency, "{text}");
        assert_eq!(plan.to_strings(), vec!["emergency"], "{text}");
    }
}

#[test]
fn unrecognised_text_is_an_empty_plan() {
    let parser = parser();
    for text in ["", "   ", "hello there", "what's the weather like?", "42", "°°°"] {
        let plan = parser.parse(text);
        assert!(plan.is_empty(), "{text:?} gave {:?}", plan.to_strings());
    }
}

#[test]
fn documented_examples() {
    let parser = parser();
    assert_eq!(parser.parse("Go back 2 meters").to_strings(), vec!["back 200"]);
    assert_eq!(parser.parse("Turn left 90 degrees").to_strings(), vec!["ccw 90"]);
    assert_eq!(
        parser.parse("There's something in front, avoid it").to_strings(),
        vec!["back 50", "cw 90"]
    );
}

#[test]
fn plans_round_trip_through_sdk_syntax() {
    let parser = parser();
    let plan = parser.parse("explore the kitchen");
    for command in &plan.commands {
        assert_eq!(&command.to_string().parse::<PrimitiveCommand>().unwrap(), command);
    }
}
