//! Spur radio protocol: function codes, group addresses and timing constants.

use std::fmt;
use std::time::Duration;

use crate::identity::ShortAddr;

/// Group address include grants are sent to (the node is not addressable yet).
pub const GRANT_ADDRESS: ShortAddr = ShortAddr(0xBB00);

/// Group address for the periodic presence beacon.
pub const BEACON_ADDRESS: ShortAddr = ShortAddr(0xBBBB);

/// Source address used by nodes that have not been granted an address.
pub const UNADDRESSED: ShortAddr = ShortAddr(0x0000);

/// Sleep interval in half-seconds for a node in normal state (2 hours).
pub const NORMAL_WAKEUP: u16 = 60 * 60 * 2;

/// Sleep interval in half-seconds for a node whose button is pressed (5 minutes).
pub const PRESSED_WAKEUP: u16 = 5 * 60;

/// Button state value that selects `PRESSED_WAKEUP`.
pub const PRESSED_STATE: u8 = 0x01;

/// Button state of a node that has never sent an alert.
pub const IDLE_STATE: u8 = 0xFF;

/// Maximum bytes transmitted per fast tick.
pub const TICK_BYTE_BUDGET: usize = 120;

/// An in-flight frame is resent when no ack arrived within this window.
pub const RESEND_AFTER: Duration = Duration::from_secs(9);

/// Resends allowed after the first transmission.
pub const MAX_RESENDS: u8 = 3;

/// Delay between a wakeup computation that finds pending config and the config send.
pub const CONFIG_SEND_DELAY: Duration = Duration::from_secs(1);

/// Fast ticks between beacons.
pub const DEFAULT_BEACON_EVERY: u32 = 6;

/// Interval of the backend liveness ping.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Signal strength reported to the backend with every notification.
pub const REPORTED_SIGNAL: u8 = 5;

/// Frame function. Codes are fixed by node firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    IncludeReq,
    SIncludeReq,
    IncludeGrant,
    Reinclude,
    Config,
    SendBattery,
    WokenUp,
    Ack,
    Alert,
    Beacon,
    Start,
    /// Any code outside the table. Decoding never fails on the function byte.
    Undefined(u8),
}

impl Function {
    pub const ALL: [Function; 11] = [
        Function::IncludeReq,
        Function::SIncludeReq,
        Function::IncludeGrant,
        Function::Reinclude,
        Function::Config,
        Function::SendBattery,
        Function::WokenUp,
        Function::Ack,
        Function::Alert,
        Function::Beacon,
        Function::Start,
    ];

    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Function::IncludeReq,
            0x01 => Function::SIncludeReq,
            0x02 => Function::IncludeGrant,
            0x04 => Function::Reinclude,
            0x05 => Function::Config,
            0x06 => Function::SendBattery,
            0x07 => Function::WokenUp,
            0x08 => Function::Ack,
            0x09 => Function::Alert,
            0x0A => Function::Beacon,
            0x0B => Function::Start,
            other => Function::Undefined(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Function::IncludeReq => 0x00,
            Function::SIncludeReq => 0x01,
            Function::IncludeGrant => 0x02,
            Function::Reinclude => 0x04,
            Function::Config => 0x05,
            Function::SendBattery => 0x06,
            Function::WokenUp => 0x07,
            Function::Ack => 0x08,
            Function::Alert => 0x09,
            Function::Beacon => 0x0A,
            Function::Start => 0x0B,
            Function::Undefined(code) => code,
        }
    }

    /// Wire name, as used in logs and backend messages.
    pub fn name(self) -> &'static str {
        match self {
            Function::IncludeReq => "include_req",
            Function::SIncludeReq => "s_include_req",
            Function::IncludeGrant => "include_grant",
            Function::Reinclude => "reinclude",
            Function::Config => "config",
            Function::SendBattery => "send_battery",
            Function::WokenUp => "woken_up",
            Function::Ack => "ack",
            Function::Alert => "alert",
            Function::Beacon => "beacon",
            Function::Start => "start",
            Function::Undefined(_) => "undefined",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        for function in Function::ALL {
            assert_eq!(Function::from_code(function.code()), function);
        }
        assert_eq!(Function::Alert.code(), 0x09);
        assert_eq!(Function::WokenUp.code(), 0x07);
    }

    #[test]
    fn unknown_code_is_undefined() {
        let f = Function::from_code(0x03);
        assert_eq!(f, Function::Undefined(0x03));
        assert_eq!(f.name(), "undefined");
        assert_eq!(f.code(), 0x03);
    }

    #[test]
    fn wakeups_are_half_seconds() {
        assert_eq!(NORMAL_WAKEUP, 7200);
        assert_eq!(PRESSED_WAKEUP, 300);
    }
}
