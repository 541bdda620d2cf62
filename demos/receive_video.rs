extern crate tello_pilot;

use tello_pilot::{TelloOptions, Tello, Result};


#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut options = TelloOptions::default();

    // we want video...
    let mut video_receiver = options.with_video();

    tokio::spawn(async move {
        while let Some(frame) = video_receiver.recv().await {
            println!("video frame: {} bytes", frame.data.len());
        }
    });

    fly(options).await.unwrap();
}


async fn fly(options:TelloOptions) -> Result<()> {
    let drone = Tello::new()
        .wait_for_wifi().await?;

    let mut drone = drone.connect_with(options).await?;

    if let Some(source) = drone.start_video().await? {
        println!("video from {}", source.url);
    }

    drone.take_off().await?;
    drone.turn_clockwise(360).await?;
    drone.land().await?;

    drone.stop_video().await?;

    Ok(())
}
