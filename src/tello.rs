use std::future::Future;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::command::*;
use crate::errors::{Result, TelloError};
use crate::options::TelloOptions;
use crate::settings::Settings;
use crate::state::{StateListener, TelloStateSender};
use crate::video::{TelloVideoSender, VideoListener};
use crate::video_source::{UdpVideoProbe, VideoCandidate, VideoSourceSelector};
use crate::wifi::wait_for_wifi;

const WIFI_SSID_PREFIX:&str = "TELLO";
const WIFI_WAIT_LIMIT:Duration = Duration::from_secs(120);

/// Pause between the steps of a flight plan.
const INTER_COMMAND_DELAY:Duration = Duration::from_millis(500);

const MAX_RESPONSE_SIZE:usize = 256;

// states
#[derive(Debug)]
pub struct NoWifi;

#[derive(Debug)]
pub struct Disconnected;

#[derive(Debug)]
pub struct Connected {
    sock: UdpSocket,
    settings: Settings,
    state_listener: Option<StateListener>,
    video_sender: Option<TelloVideoSender>,
    video_listener: Option<VideoListener>,
    video_source: Option<VideoCandidate>,
    command_receiver: Option<TelloCommandReceiver>,
}

/// How a plan run with [`Tello::execute_unless`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    Completed,
    /// Cut short, and the motors stopped
    Aborted,
}

#[derive(Debug)]
pub struct Tello<S = NoWifi> {
    state: S
}

impl Tello<NoWifi> {
    pub fn new() -> Self {
        Self { state: NoWifi }
    }

    pub async fn wait_for_wifi(&self) -> Result<Tello<Disconnected>>  {
        info!("waiting for WiFi...");
        wait_for_wifi(WIFI_SSID_PREFIX, WIFI_WAIT_LIMIT).await?;
        Ok(Tello { state: Disconnected })
    }

    /// Skips the WiFi check, eg. when the drone is in station mode on
    /// another network.
    pub fn assume_wifi(self) -> Tello<Disconnected> {
        Tello { state: Disconnected }
    }
}

impl Default for Tello<NoWifi> {
    fn default() -> Self {
        Self::new()
    }
}

impl Tello<Disconnected> {
    pub async fn connect(&self) -> Result<Tello<Connected>> {
        self.connect_with(TelloOptions::default()).await
    }

    pub async fn connect_with(&self, options: TelloOptions) -> Result<Tello<Connected>> {
        let TelloOptions { settings, state_sender, video_sender, command_receiver } = options;

        let local_address = format!("0.0.0.0:{}", settings.local_command_port);
        let drone_address = format!("{}:{}", settings.drone_host, settings.command_port);

        info!("CONNECT {local_address} → {drone_address}");

        let sock = UdpSocket::bind(&local_address).await?;
        sock.connect(&drone_address).await?;

        let state_listener = start_state_listener(state_sender).await?;

        let drone = Tello {
            state: Connected {
                sock,
                settings,
                state_listener,
                video_sender,
                video_listener: None,
                video_source: None,
                command_receiver,
            }
        };

        info!("putting drone in command mode...");
        match drone.send_command(&PrimitiveCommand::Command).await {
            Ok(_) => {}
            Err(TelloError::ResponseTimeout { .. }) => {
                warn!("no response from {drone_address}");
                return Err(TelloError::ConnectionFailed { address: drone_address });
            }
            Err(err) => return Err(err),
        }

        info!("CONNECTED");

        Ok(drone)
    }
}

async fn start_state_listener(sender: Option<TelloStateSender>) -> Result<Option<StateListener>> {
    match sender {
        Some(sender) => Ok(Some(StateListener::start_listening(sender).await?)),
        None => Ok(None),
    }
}

impl Tello<Connected> {
    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }

    /// The video URL picked by [`start_video`](Self::start_video), if any.
    pub fn video_source(&self) -> Option<&VideoCandidate> {
        self.state.video_source.as_ref()
    }

    /// Sends a raw SDK message and returns the drone's reply.
    ///
    /// Replies starting with `error` are turned into
    /// [`TelloError::CommandFailed`].
    pub async fn send(&self, msg:&str) -> Result<String> {
        info!("SEND {msg}");
        let s = &self.state.sock;
        self.discard_stale_replies();
        s.send(msg.as_bytes()).await?;

        let mut buf = vec![0; MAX_RESPONSE_SIZE];
        let n = timeout(self.state.settings.response_timeout(), s.recv(&mut buf))
            .await
            .map_err(|_| TelloError::ResponseTimeout { command: msg.to_string() })??;
        buf.truncate(n);
        let response = String::from_utf8(buf)?.trim().to_string();

        info!("RECEIVED {response}");

        if response.starts_with("error") {
            return Err(TelloError::CommandFailed { command: msg.to_string(), response });
        }

        Ok(response)
    }

    /// Drops replies still queued from earlier commands, eg. one that came
    /// in after its command timed out, so they can't answer this one.
    fn discard_stale_replies(&self) {
        let mut buf = [0u8; MAX_RESPONSE_SIZE];
        while let Ok(n) = self.state.sock.try_recv(&mut buf) {
            warn!("discarding late reply {:?}", String::from_utf8_lossy(&buf[..n]));
        }
    }

    /// Sends a command, with moves and turns clamped to the configured
    /// limits first.
    pub async fn send_command(&self, command: &PrimitiveCommand) -> Result<String> {
        let command = self.within_limits(command);
        if command.expects_reply() {
            self.send(&command.to_string()).await
        } else {
            let msg = command.to_string();
            debug!("SEND {msg}");
            self.state.sock.send(msg.as_bytes()).await?;
            Ok(String::new())
        }
    }

    fn within_limits(&self, command: &PrimitiveCommand) -> PrimitiveCommand {
        let settings = &self.state.settings;
        match *command {
            PrimitiveCommand::Move { direction, cm } => {
                PrimitiveCommand::Move { direction, cm: settings.clamp_distance(cm) }
            }
            PrimitiveCommand::Turn { direction, degrees } => {
                PrimitiveCommand::Turn { direction, degrees: settings.clamp_angle(degrees) }
            }
            ref other => other.clone(),
        }
    }

    /// Runs the steps of a plan in order, pausing briefly between them.
    ///
    /// Stops at the first step the drone rejects.
    pub async fn execute(&self, plan: &FlightPlan) -> Result<()> {
        if plan.is_empty() {
            info!("nothing to do");
            return Ok(());
        }
        info!("executing {:?} plan {:?}", plan.intent, plan.to_strings());

        for (i, command) in plan.commands.iter().enumerate() {
            if i > 0 {
                sleep(INTER_COMMAND_DELAY).await;
            }
            match self.send_command(command).await {
                Ok(_) => info!("✓ {command} executed"),
                Err(err) => {
                    warn!("✗ {command} failed: {err}");
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Runs a plan unless `abort` completes first, in which case the rest
    /// of the plan is dropped and the motors are stopped.
    pub async fn execute_unless(&self, plan: &FlightPlan, abort: impl Future<Output = ()>) -> Result<PlanOutcome> {
        let execution = self.execute(plan);
        tokio::pin!(execution);
        tokio::select! {
            result = &mut execution => result.map(|_| PlanOutcome::Completed),
            _ = abort => {
                warn!("aborting {:?} plan", plan.intent);
                self.emergency().await?;
                Ok(PlanOutcome::Aborted)
            }
        }
    }

    pub async fn take_off(&self) -> Result<()> {
        self.send_command(&PrimitiveCommand::TakeOff).await?;
        Ok(())
    }

    pub async fn land(&self) -> Result<()> {
        self.send_command(&PrimitiveCommand::Land).await?;
        Ok(())
    }

    /// Stops the motors immediately.
    pub async fn emergency(&self) -> Result<()> {
        self.send_command(&PrimitiveCommand::Emergency).await?;
        Ok(())
    }

    /// Hovers in place.
    pub async fn stop(&self) -> Result<()> {
        self.send_command(&PrimitiveCommand::Stop).await?;
        Ok(())
    }

    /// Moves `cm` centimetres, clamped to the configured limits.
    pub async fn move_in(&self, direction: MoveDirection, cm: u32) -> Result<()> {
        self.send_command(&PrimitiveCommand::Move { direction, cm }).await?;
        Ok(())
    }

    pub async fn move_up(&self, cm: u32) -> Result<()> {
        self.move_in(MoveDirection::Up, cm).await
    }

    pub async fn move_down(&self, cm: u32) -> Result<()> {
        self.move_in(MoveDirection::Down, cm).await
    }

    pub async fn move_left(&self, cm: u32) -> Result<()> {
        self.move_in(MoveDirection::Left, cm).await
    }

    pub async fn move_right(&self, cm: u32) -> Result<()> {
        self.move_in(MoveDirection::Right, cm).await
    }

    pub async fn move_forward(&self, cm: u32) -> Result<()> {
        self.move_in(MoveDirection::Forward, cm).await
    }

    pub async fn move_back(&self, cm: u32) -> Result<()> {
        self.move_in(MoveDirection::Back, cm).await
    }

    /// Turns `degrees`, clamped to the configured limits.
    pub async fn turn(&self, direction: TurnDirection, degrees: u32) -> Result<()> {
        self.send_command(&PrimitiveCommand::Turn { direction, degrees }).await?;
        Ok(())
    }

    pub async fn turn_clockwise(&self, degrees: u32) -> Result<()> {
        self.turn(TurnDirection::Clockwise, degrees).await
    }

    pub async fn turn_counterclockwise(&self, degrees: u32) -> Result<()> {
        self.turn(TurnDirection::CounterClockwise, degrees).await
    }

    pub async fn flip(&self, direction: FlipDirection) -> Result<()> {
        self.send_command(&PrimitiveCommand::Flip(direction)).await?;
        Ok(())
    }

    pub async fn remote_control(&self, left_right: i8, forwards_backwards: i8, up_down: i8, yaw: i8) -> Result<()> {
        let rc = PrimitiveCommand::RemoteControl { left_right, forwards_backwards, up_down, yaw };
        self.send_command(&rc).await?;
        Ok(())
    }

    pub async fn query(&self, query: Query) -> Result<String> {
        self.send_command(&PrimitiveCommand::Query(query)).await
    }

    /// Battery charge in percent.
    pub async fn battery(&self) -> Result<u8> {
        let reply = self.query(Query::Battery).await?;
        leading_number(&reply)
    }

    /// Height in centimetres.
    pub async fn height(&self) -> Result<u32> {
        // reported in decimetres, eg. "10dm"
        let reply = self.query(Query::Height).await?;
        let dm: u32 = leading_number(&reply)?;
        Ok(dm * 10)
    }

    /// Motor time in seconds.
    pub async fn flight_time(&self) -> Result<u32> {
        let reply = self.query(Query::FlightTime).await?;
        leading_number(&reply)
    }

    /// Temperature range as reported, eg. "60~62C".
    pub async fn temperature(&self) -> Result<String> {
        self.query(Query::Temperature).await
    }

    /// Turns on the video stream and, if video was requested, finds a
    /// working video URL and starts forwarding frames from it.
    pub async fn start_video(&mut self) -> Result<Option<VideoCandidate>> {
        self.send_command(&PrimitiveCommand::StreamOn).await?;

        let Some(sender) = self.state.video_sender.clone() else {
            return Ok(None);
        };

        let settings = &self.state.settings;
        let mut selector = VideoSourceSelector::new(settings);
        let mut probe = UdpVideoProbe::new(settings.video_probe_timeout());
        let source = selector.select(&mut probe).await?;

        let listener = VideoListener::start_listening(source.endpoint()?, sender).await?;
        self.state.video_listener = Some(listener);
        self.state.video_source = Some(source.clone());

        Ok(Some(source))
    }

    pub async fn stop_video(&mut self) -> Result<()> {
        if let Some(listener) = self.state.video_listener.take() {
            listener.stop_listening();
        }
        self.state.video_source = None;
        self.send_command(&PrimitiveCommand::StreamOff).await?;
        Ok(())
    }

    /// Serves the command channel from
    /// [`TelloOptions::with_command`](crate::TelloOptions::with_command)
    /// until every sender is dropped.
    ///
    /// Failed commands are logged and the loop carries on.
    pub async fn handle_commands(&mut self) -> Result<()> {
        let Some(mut receiver) = self.state.command_receiver.take() else {
            return Err(TelloError::Generic { msg: "no command channel, see TelloOptions::with_command".to_string() });
        };

        while let Some(command) = receiver.recv().await {
            let result = match command {
                TelloCommand::TakeOff => self.take_off().await,
                TelloCommand::Land => self.land().await,
                TelloCommand::StopAndHover => self.stop().await,
                TelloCommand::EmergencyStop => self.emergency().await,
                TelloCommand::RemoteControl { left_right, forwards_backwards, up_down, yaw } => {
                    self.remote_control(left_right, forwards_backwards, up_down, yaw).await
                }
                TelloCommand::Flip(direction) => self.flip(direction).await,
                TelloCommand::Execute(plan) => self.execute(&plan).await,
            };
            if let Err(err) = result {
                warn!("command failed: {err}");
            }
        }

        info!("command channel closed");
        Ok(())
    }

    pub async fn disconnect(mut self) -> Result<()> {
        if let Some(listener) = self.state.video_listener.take() {
            listener.stop_listening();
        }
        if let Some(listener) = self.state.state_listener.take() {
            listener.stop_listening();
        }
        info!("DISCONNECTED");
        Ok(())
    }
}

fn leading_number<T: std::str::FromStr>(reply: &str) -> Result<T> {
    let digits: String = reply.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().map_err(|_| TelloError::ParseError { msg: format!("reply {reply:?}") })
}
