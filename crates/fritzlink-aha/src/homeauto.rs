// Typed homeauto command endpoints
//
// Thin wrappers over AhaClient::execute that parse the plain-text
// bodies of /webservices/homeautoswitch.lua. Scaled integers are
// converted through the units module so readings come back in SI terms.

use tracing::debug;

use crate::client::{AhaClient, AhaCommand};
use crate::devicelist::{self, RawDevice};
use crate::error::Error;
use crate::session;
use crate::units::{self, HkrTarget};

impl AhaClient {
    /// Fetch the raw actor inventory document.
    ///
    /// `switchcmd=getdevicelistinfos`
    pub async fn device_list_infos(&self) -> Result<String, Error> {
        debug!("fetching device inventory");
        self.execute(&AhaCommand::device_list_infos()).await
    }

    /// Fetch and decode the actor inventory.
    pub async fn device_list(&self) -> Result<Vec<RawDevice>, Error> {
        let body = self.device_list_infos().await?;
        devicelist::parse_device_list(&body)
    }

    /// List the AINs of all switchable outlets.
    ///
    /// `switchcmd=getswitchlist` returns a comma-separated line.
    pub async fn switch_list(&self) -> Result<Vec<String>, Error> {
        let body = self.execute(&AhaCommand::switch_list()).await?;
        Ok(body
            .trim()
            .split(',')
            .filter(|ain| !ain.is_empty())
            .map(str::to_owned)
            .collect())
    }

    /// Current on/off state of an outlet.
    ///
    /// `switchcmd=getswitchstate`
    pub async fn switch_state(&self, ain: &str) -> Result<bool, Error> {
        let body = self.execute(&AhaCommand::switch_state(ain)).await?;
        parse_flag("getswitchstate", &body)
    }

    /// Switch an outlet on or off; returns the resulting state.
    ///
    /// `switchcmd=setswitchon` / `setswitchoff`
    pub async fn set_switch(&self, ain: &str, on: bool) -> Result<bool, Error> {
        let command = if on {
            AhaCommand::set_switch_on(ain)
        } else {
            AhaCommand::set_switch_off(ain)
        };
        let body = self.execute(&command).await?;
        parse_flag(command.name(), &body)
    }

    /// Flip an outlet; returns the resulting state.
    ///
    /// `switchcmd=setswitchtoggle`
    pub async fn toggle_switch(&self, ain: &str) -> Result<bool, Error> {
        let body = self.execute(&AhaCommand::toggle_switch(ain)).await?;
        parse_flag("setswitchtoggle", &body)
    }

    /// Present power draw in watts.
    ///
    /// `switchcmd=getswitchpower` reports milliwatts.
    pub async fn switch_power(&self, ain: &str) -> Result<f64, Error> {
        let body = self.execute(&AhaCommand::switch_power(ain)).await?;
        units::watts_from_milliwatts(&body)
            .ok_or_else(|| malformed("getswitchpower", "expected milliwatts", &body))
    }

    /// Lifetime energy in kilowatt hours.
    ///
    /// `switchcmd=getswitchenergy` reports watt hours.
    pub async fn switch_energy(&self, ain: &str) -> Result<f64, Error> {
        let body = self.execute(&AhaCommand::switch_energy(ain)).await?;
        units::kilowatt_hours_from_watt_hours(&body)
            .ok_or_else(|| malformed("getswitchenergy", "expected watt hours", &body))
    }

    /// Last temperature reading in degrees C.
    ///
    /// `switchcmd=gettemperature` reports tenths of a degree.
    pub async fn temperature(&self, ain: &str) -> Result<f64, Error> {
        let body = self.execute(&AhaCommand::temperature(ain)).await?;
        units::celsius_from_deci(&body)
            .ok_or_else(|| malformed("gettemperature", "expected deci-degrees", &body))
    }

    /// Thermostat target setpoint.
    ///
    /// `switchcmd=gethkrtsoll` reports half degrees with the on/off
    /// sentinels.
    pub async fn target_temperature(&self, ain: &str) -> Result<HkrTarget, Error> {
        let body = self.execute(&AhaCommand::target_temperature(ain)).await?;
        HkrTarget::parse(&body)
            .ok_or_else(|| malformed("gethkrtsoll", "expected half-degrees", &body))
    }

    /// Set the thermostat target; returns the setpoint the gateway kept.
    ///
    /// `switchcmd=sethkrtsoll&param=...`
    pub async fn set_target_temperature(
        &self,
        ain: &str,
        target: HkrTarget,
    ) -> Result<HkrTarget, Error> {
        let body = self
            .execute(&AhaCommand::set_target_temperature(ain, target))
            .await?;
        // Old firmware answers with an empty body instead of echoing.
        if body.trim().is_empty() {
            return Ok(target);
        }
        HkrTarget::parse(&body)
            .ok_or_else(|| malformed("sethkrtsoll", "expected half-degrees", &body))
    }

    /// Comfort-schedule setpoint in degrees C.
    ///
    /// `switchcmd=gethkrkomfort`
    pub async fn comfort_temperature(&self, ain: &str) -> Result<HkrTarget, Error> {
        let body = self.execute(&AhaCommand::comfort_temperature(ain)).await?;
        HkrTarget::parse(&body)
            .ok_or_else(|| malformed("gethkrkomfort", "expected half-degrees", &body))
    }

    /// Economy-schedule setpoint in degrees C.
    ///
    /// `switchcmd=gethkrabsenk`
    pub async fn economy_temperature(&self, ain: &str) -> Result<HkrTarget, Error> {
        let body = self.execute(&AhaCommand::economy_temperature(ain)).await?;
        HkrTarget::parse(&body)
            .ok_or_else(|| malformed("gethkrabsenk", "expected half-degrees", &body))
    }

    /// Battery charge in percent, for battery-powered actors.
    ///
    /// `switchcmd=getbatterycharge`
    pub async fn battery_charge(&self, ain: &str) -> Result<u8, Error> {
        let body = self.execute(&AhaCommand::battery_charge(ain)).await?;
        body.trim()
            .parse()
            .map_err(|_| malformed("getbatterycharge", "expected a percentage", &body))
    }
}

fn parse_flag(command: &str, body: &str) -> Result<bool, Error> {
    units::flag(body).ok_or_else(|| malformed(command, "expected 0 or 1", body))
}

fn malformed(command: &str, message: &str, body: &str) -> Error {
    Error::MalformedResponse {
        message: format!("{command}: {message}"),
        body: session::preview(body),
    }
}
