// Wire models for getdevicelistinfos
//
// The inventory document is XML with one <device> element per actor.
// Firmware lines disagree about the envelope: most serve <devicelist>
// directly, some nest it one level under a named wrapper, and an empty
// inventory may be nothing but a version marker. Every leaf is decoded
// as optional text because the gateway emits empty elements for
// readings it cannot take.

use serde::Deserialize;

use crate::error::Error;
use crate::session;

/// Root inventory document.
#[derive(Debug, Default, Deserialize)]
pub struct DeviceList {
    #[serde(rename = "@version", default)]
    pub version: Option<String>,
    #[serde(rename = "device", default)]
    pub devices: Vec<RawDevice>,
}

/// Envelope used by firmware that nests the list under a wrapper element.
#[derive(Debug, Deserialize)]
struct WrappedDeviceList {
    devicelist: DeviceList,
}

/// One `<device>` element, exactly as it appears on the wire.
///
/// `functionbitmask` advertises capabilities, but firmware omits bits
/// for features it clearly serves elsewhere in the same document, so
/// consumers decide by element presence and keep the mask advisory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDevice {
    #[serde(rename = "@identifier", default)]
    pub identifier: String,
    #[serde(rename = "@id", default)]
    pub id: Option<String>,
    #[serde(rename = "@functionbitmask", default)]
    pub functionbitmask: Option<String>,
    #[serde(rename = "@fwversion", default)]
    pub fwversion: Option<String>,
    #[serde(rename = "@manufacturer", default)]
    pub manufacturer: Option<String>,
    #[serde(rename = "@productname", default)]
    pub productname: Option<String>,
    #[serde(default)]
    pub present: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub switch: Option<RawSwitch>,
    #[serde(default)]
    pub powermeter: Option<RawPowerMeter>,
    #[serde(default)]
    pub temperature: Option<RawTemperature>,
    #[serde(default)]
    pub hkr: Option<RawHkr>,
    #[serde(default)]
    pub alert: Option<RawAlert>,
    #[serde(rename = "button", default)]
    pub buttons: Vec<RawButton>,
    #[serde(default)]
    pub humidity: Option<RawHumidity>,
    #[serde(default)]
    pub battery: Option<String>,
    #[serde(default)]
    pub batterylow: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSwitch {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub lock: Option<String>,
    #[serde(default)]
    pub devicelock: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPowerMeter {
    #[serde(default)]
    pub power: Option<String>,
    #[serde(default)]
    pub energy: Option<String>,
    #[serde(default)]
    pub voltage: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTemperature {
    #[serde(default)]
    pub celsius: Option<String>,
    #[serde(default)]
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHkr {
    #[serde(default)]
    pub tist: Option<String>,
    #[serde(default)]
    pub tsoll: Option<String>,
    #[serde(default)]
    pub komfort: Option<String>,
    #[serde(default)]
    pub absenk: Option<String>,
    #[serde(default)]
    pub lock: Option<String>,
    #[serde(default)]
    pub devicelock: Option<String>,
    #[serde(default)]
    pub errorcode: Option<String>,
    #[serde(default)]
    pub batterylow: Option<String>,
    #[serde(default)]
    pub battery: Option<String>,
    #[serde(default)]
    pub windowopenactiv: Option<String>,
    #[serde(default)]
    pub nextchange: Option<RawNextChange>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawNextChange {
    #[serde(default)]
    pub endperiod: Option<String>,
    #[serde(default)]
    pub tchange: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAlert {
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawButton {
    #[serde(rename = "@identifier", default)]
    pub identifier: Option<String>,
    #[serde(rename = "@id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub lastpressedtimestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHumidity {
    #[serde(default)]
    pub rel_humidity: Option<String>,
}

/// Decode an inventory document into its device elements.
///
/// Accepts the three envelope shapes seen in the wild; anything else is
/// a [`Error::MalformedResponse`]. A body that is really the login page
/// (or carries the all-zero session token) is reported as
/// [`Error::SessionInvalid`] so the dispatcher's re-auth path covers it.
pub fn parse_device_list(body: &str) -> Result<Vec<RawDevice>, Error> {
    if let Some(err) = session::session_rejection(body) {
        return Err(err);
    }

    // Shape 1 and 3: <devicelist> at the root, possibly with no devices.
    // A parse that yields neither devices nor a version marker means the
    // root was some other element, so fall through to the wrapped shape.
    if let Ok(list) = quick_xml::de::from_str::<DeviceList>(body) {
        if !list.devices.is_empty() || list.version.is_some() {
            return Ok(list.devices);
        }
    }

    // Shape 2: <devicelist> nested one level down.
    match quick_xml::de::from_str::<WrappedDeviceList>(body) {
        Ok(wrapped) => Ok(wrapped.devicelist.devices),
        Err(e) => Err(Error::MalformedResponse {
            message: format!("unrecognized device list document: {e}"),
            body: session::preview(body),
        }),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
