//! Alert codes sent by nodes: button presses and battery readings.

/// High byte marking a battery reading; the low byte carries the raw level.
pub const BATTERY_MARKER: u8 = 0x02;

/// Empirical calibration from raw battery byte to volts (times ten).
pub const BATTERY_SCALE: f64 = 0.235668;

/// Code reported when an alert frame carries no readable code.
pub const UNREADABLE_ALERT: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    LeftShort,
    RightShort,
    LeftLong,
    RightLong,
    Unknown,
}

impl AlertKind {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x0000 => AlertKind::LeftShort,
            0x0001 => AlertKind::RightShort,
            0x0002 => AlertKind::LeftLong,
            0x0003 => AlertKind::RightLong,
            _ => AlertKind::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AlertKind::LeftShort => "left_short",
            AlertKind::RightShort => "right_short",
            AlertKind::LeftLong => "left_long",
            AlertKind::RightLong => "right_long",
            AlertKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertEvent {
    Battery { level: f64 },
    /// `state` is the low byte, recorded as the node's button state.
    Button { code: u16, kind: AlertKind, state: u8 },
}

pub fn decode_alert(code: u16) -> AlertEvent {
    let [high, low] = code.to_be_bytes();
    if high == BATTERY_MARKER {
        AlertEvent::Battery {
            level: (f64::from(low) * BATTERY_SCALE) / 10.0,
        }
    } else {
        AlertEvent::Button {
            code,
            kind: AlertKind::from_code(code),
            state: low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_level() {
        match decode_alert(0x0205) {
            AlertEvent::Battery { level } => {
                assert!((level - (5.0 * 0.235668) / 10.0).abs() < 1e-12);
            }
            other => panic!("expected battery, got {other:?}"),
        }
    }

    #[test]
    fn button_press() {
        assert_eq!(
            decode_alert(0x0001),
            AlertEvent::Button {
                code: 1,
                kind: AlertKind::RightShort,
                state: 0x01
            }
        );
        assert_eq!(
            decode_alert(0x0003),
            AlertEvent::Button {
                code: 3,
                kind: AlertKind::RightLong,
                state: 0x03
            }
        );
    }

    #[test]
    fn unknown_alert_still_reported() {
        match decode_alert(0x0107) {
            AlertEvent::Button { kind, state, .. } => {
                assert_eq!(kind, AlertKind::Unknown);
                assert_eq!(state, 0x07);
            }
            other => panic!("expected button, got {other:?}"),
        }
        assert!(matches!(
            decode_alert(UNREADABLE_ALERT),
            AlertEvent::Button { kind: AlertKind::Unknown, state: 0xFF, .. }
        ));
    }
}
