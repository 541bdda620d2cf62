extern crate tello_pilot;

use tello_pilot::{CommandParser, Settings, Tello, TelloOptions, Result};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    fly().await.unwrap();
}

async fn fly() -> Result<()> {
    let settings = Settings::from_env();
    let parser = CommandParser::new(&settings)?;

    let drone = Tello::new()
        .wait_for_wifi().await?;

    let drone = drone.connect_with(TelloOptions::new(settings)).await?;

    drone.take_off().await?;
    for instruction in ["go up 50 cm", "turn left 90 degrees", "move forward half a meter", "explore", "land"] {
        let plan = parser.parse(instruction);
        drone.execute(&plan).await?;
    }

    Ok(())
}
