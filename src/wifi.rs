use std::process::Command;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::{TelloError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

//////////////////////////////////////////////////////////////////////////////
// macOS

#[cfg(target_os = "macos")]
fn list_wifi_devices() -> Result<Vec<String>> {
    let output = run_command("networksetup", &["-listallhardwareports"])?;

    let mut found_wifi = false;
    let mut devices:Vec<String> = vec![];
    for l in output.lines() {
        if !found_wifi {
            // looking for something like "Hardware Port: Wi-Fi"...
            if l.contains("Wi-Fi") {
                found_wifi = true;
            }
        }
        else {
            // ...then next line should be like "Device: en1"
            found_wifi = false;
            devices.push(l.trim_start_matches("Device: ").to_string());
        }
    }

    Ok(devices)
}

#[cfg(target_os = "macos")]
async fn poll_for_ssid(ssid_prefix: &str) -> Result<()> {
    let devices = list_wifi_devices()?;

    // wait for any one of them to connect
    let waiting_for = format!("Current Wi-Fi Network: {ssid_prefix}");
    loop {
        for device in devices.iter() {
            let s = run_command("networksetup", &["-getairportnetwork", device])?;
            if s.starts_with(&waiting_for) {
                return Ok(())
            }
        }
        sleep(POLL_INTERVAL).await;
    }
}

//////////////////////////////////////////////////////////////////////////////
// linux

#[cfg(target_os = "linux")]
async fn poll_for_ssid(ssid_prefix: &str) -> Result<()> {
    loop {
        let s = run_command("iwgetid", &["-r"])?;
        debug!("current SSID {:?}", s.trim());
        if s.starts_with(ssid_prefix) {
            return Ok(())
        }
        sleep(POLL_INTERVAL).await;
    }
}

//////////////////////////////////////////////////////////////////////////////
// anything else

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
async fn poll_for_ssid(_ssid_prefix: &str) -> Result<()> {
    warn!("wait_for_wifi has not been implemented for this OS, assuming joined already and continuing");
    Ok(())
}

//////////////////////////////////////////////////////////////////////////////

/// Waits until the host joins a network whose SSID starts with
/// `ssid_prefix`, giving up after `limit`.
pub async fn wait_for_wifi(ssid_prefix: &str, limit: Duration) -> Result<()> {
    match timeout(limit, poll_for_ssid(ssid_prefix)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("no {ssid_prefix}* network after {limit:?}");
            Err(TelloError::WiFiNotConnected)
        }
    }
}

fn run_command(cmd:&str, args: &[&str]) -> Result<String> {
    let raw_output = Command::new(cmd)
        .args(args)
        .output()
        .map_err(|e| TelloError::Generic { msg: format!("failed to run {cmd} - {e}") })?;

    String::from_utf8(raw_output.stdout).map_err(
        |e|  TelloError::Generic { msg: format!("failed to decode {cmd} output - {e:?}") }
    )
}
