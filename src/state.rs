use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::{spawn, task};
use tracing::{debug, info, warn};

use crate::errors::{Result, TelloError};

pub(crate) const STATE_UDP_PORT:u16 = 8890;

pub type TelloStateSender = mpsc::UnboundedSender<TelloState>;
pub type TelloStateReceiver = mpsc::UnboundedReceiver<TelloState>;

pub fn make_tello_state_channel() -> (TelloStateSender, TelloStateReceiver) {
    mpsc::unbounded_channel()
}

/// The live state of the drone.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TelloState {
    pub roll: i16,
    pub pitch: i16,
    pub yaw: i16,
    pub height: i16,
    pub barometer: f32,
    pub battery: u8,
    pub time_of_flight: u16,
    pub motor_time: u16,
    pub temperature_low: i16,
    pub temperature_high: i16,
    pub velocity: Vector3<i16>,
    pub acceleration: Vector3<f32>
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Vector3<T> {
    pub x: T,
    pub y: T,
    pub z: T
}

impl TelloState {
    /// Parses a state string received from the drone.
    ///
    /// Example message:
    /// "mid:-1;x:-100;y:-100;z:-100;mpry:-1,-1,-1;pitch:0;roll:0;yaw:-3;vgx:0;vgy:0;vgz:1;templ:58;temph:60;tof:71;h:50;bat:82;baro:-57.14;time:14;agx:17.00;agy:-4.00;agz:-956.00;"
    ///
    pub fn from_message(s: &str) -> Result<TelloState> {
        let mut state = TelloState::default();

        for f in s.trim().split(';') {
            if f.is_empty() { continue; }

            let (k, v) = split_key_value(f)?;

            match k {
                "roll" => state.roll = value_as(v)?,
                "pitch" => state.pitch = value_as(v)?,
                "yaw" => state.yaw = value_as(v)?,
                "h" => state.height = value_as(v)?,
                "baro" => state.barometer = value_as(v)?,
                "bat" => state.battery = value_as(v)?,
                "tof" => state.time_of_flight = value_as(v)?,
                "time" => state.motor_time = value_as(v)?,
                "templ" => state.temperature_low = value_as(v)?,
                "temph" => state.temperature_high = value_as(v)?,
                "vgx" => state.velocity.x = value_as(v)?,
                "vgy" => state.velocity.y = value_as(v)?,
                "vgz" => state.velocity.z = value_as(v)?,
                "agx" => state.acceleration.x = value_as(v)?,
                "agy" => state.acceleration.y = value_as(v)?,
                "agz" => state.acceleration.z = value_as(v)?,
                _ => {}
            }
        }

        Ok(state)
    }

    /// One-line status, as shown while polling.
    pub fn summary(&self) -> String {
        format!(
            "battery {}% | height {}cm | flight time {}s | temp {}°C",
            self.battery, self.height, self.motor_time, self.temperature_high
        )
    }
}

fn split_key_value(kv: &str) -> Result<(&str, &str)> {
    kv.split_once(':')
        .ok_or_else(|| TelloError::ParseError { msg: format!("state field {kv:?}") })
}

fn value_as<T: std::str::FromStr>(s: &str) -> Result<T> {
    s.trim().parse::<T>().map_err(|_| TelloError::ParseError { msg: format!("state value {s:?}") })
}

#[derive(Debug)]
pub(crate) struct StateListener {
    task: task::JoinHandle<()>
}

impl StateListener {
    pub(crate) async fn start_listening(sender:TelloStateSender) -> Result<Self> {
        let local_address = SocketAddr::from(([0, 0, 0, 0], STATE_UDP_PORT));
        Self::start_listening_at(local_address, sender).await
    }

    pub(crate) async fn start_listening_at(local_address: SocketAddr, sender:TelloStateSender) -> Result<Self> {
        info!("START LISTENING for state at {local_address}");

        let sock = UdpSocket::bind(local_address).await?;

        let task = spawn(async move {
            let mut buf = vec![0; 1024];
            loop {
                let n = match sock.recv(&mut buf).await {
                    Ok(n) => n,
                    Err(err) => {
                        warn!("state receive failed ({err}), stopping");
                        break;
                    }
                };

                let raw_state = String::from_utf8_lossy(&buf[..n]);
                let state = match TelloState::from_message(&raw_state) {
                    Ok(state) => state,
                    Err(err) => {
                        debug!("skipping state datagram: {err}");
                        continue;
                    }
                };
                if sender.send(state).is_err() {
                    debug!("state receiver dropped, stopping");
                    break;
                }
            }
        });

        Ok(Self { task })
    }

    pub(crate) fn stop_listening(&self) {
        info!("STOP LISTENING for state");
        self.task.abort();
    }
}

impl Drop for StateListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}
