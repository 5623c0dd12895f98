//! Screen and button configuration payloads for `config` frames.
//!
//! A payload is a run of tagged segments understood by the node firmware:
//! `S n R 0 F 2` selects screen `n`, `Y y <align> len text\0` draws one text line
//! (`C` centred, `l`/`r` left/right half), `X x Y y B w h` draws a box, `M …` is a
//! button mapping record, `A v` an application value, and `E S` ends a screen.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::wire::MAX_PAYLOAD_LEN;

/// Lines a screen can hold.
pub const MAX_LINES: usize = 5;

/// Vertical start of each line, indexed by [line count - 1][line index].
pub const Y_STARTS: [[u8; MAX_LINES]; MAX_LINES] = [
    [38, 0, 0, 0, 0],
    [18, 56, 0, 0, 0],
    [10, 40, 70, 0, 0],
    [4, 26, 48, 70, 0],
    [0, 20, 40, 60, 80],
];

pub const END_MARKER: [u8; 2] = *b"ES";

/// Screen shown while a node is being named.
const NAME_SCREEN: u8 = 22;
const NAME_TITLE: &str = "Spur button";
const NAME_SUBTITLE: &str = "Double-push to start";

const SCREEN_HEADER_LEN: usize = 6;

/// `Y y align len` plus the terminator.
const LINE_OVERHEAD: usize = 5;

/// Four `X x Y y B w h` boxes.
const OVERLAY_LEN: usize = 28;

/// Bytes left for lines and overlay once a screen's header and end marker are in.
const SCREEN_ROOM: usize = MAX_PAYLOAD_LEN - SCREEN_HEADER_LEN - END_MARKER.len();

/// Unset button mapping fields.
const UNSET: u8 = 0xFF;

/// Button-to-action mapping record. Every missing field encodes as 0xFF.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonMap {
    pub state: Option<u8>,
    pub alert: Option<u8>,
    #[serde(rename = "SingleLeft")]
    pub single_left: Option<u8>,
    #[serde(rename = "SingleRight")]
    pub single_right: Option<u8>,
    #[serde(rename = "DoubleLeft")]
    pub double_left: Option<u8>,
    #[serde(rename = "DoubleRight")]
    pub double_right: Option<u8>,
    #[serde(rename = "messageValue")]
    pub message_value: Option<u8>,
    #[serde(rename = "messageState")]
    pub message_state: Option<u8>,
    #[serde(rename = "waitValue")]
    pub wait_value: Option<u8>,
    #[serde(rename = "waitState")]
    pub wait_state: Option<u8>,
}

/// One entry of a node's pending configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `D<n>`: text for screen `n`.
    Screen { index: u8, text: String },
    /// `name`: the naming screen with the node's display name.
    Name(String),
    /// `S…`: button mapping.
    ButtonMap(ButtonMap),
    /// `app_value`.
    AppValue(u8),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("unknown directive {0:?}")]
    UnknownKey(String),
    #[error("directive {key:?}: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl Directive {
    pub fn parse(key: &str, value: &Value) -> Result<Self, DirectiveError> {
        let invalid = |reason: &str| DirectiveError::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if let Some(index) = key.strip_prefix('D') {
            let index = index
                .parse::<u8>()
                .map_err(|_| invalid("screen index is not a byte"))?;
            let text = value.as_str().ok_or_else(|| invalid("expected text"))?;
            Ok(Directive::Screen {
                index,
                text: text.to_string(),
            })
        } else if key == "name" {
            let text = value.as_str().ok_or_else(|| invalid("expected text"))?;
            Ok(Directive::Name(text.to_string()))
        } else if key.starts_with('S') {
            let map: ButtonMap =
                serde_json::from_value(value.clone()).map_err(|e| invalid(&e.to_string()))?;
            Ok(Directive::ButtonMap(map))
        } else if key == "app_value" {
            let v = value
                .as_u64()
                .and_then(|v| u8::try_from(v).ok())
                .ok_or_else(|| invalid("expected a byte"))?;
            Ok(Directive::AppValue(v))
        } else {
            Err(DirectiveError::UnknownKey(key.to_string()))
        }
    }
}

/// Parse a backend config object in key order, skipping entries that do not parse.
pub fn parse_directives(config: &Map<String, Value>) -> Vec<Directive> {
    config
        .iter()
        .filter_map(|(key, value)| match Directive::parse(key, value) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(error = %e, "skipping config directive");
                None
            }
        })
        .collect()
}

/// One payload per directive, in order.
pub fn encode(directives: &[Directive]) -> Vec<Vec<u8>> {
    directives.iter().map(encode_directive).collect()
}

/// Encode one directive. Screen text is cut to fit a single frame.
pub fn encode_directive(directive: &Directive) -> Vec<u8> {
    let mut out = Vec::new();
    match directive {
        Directive::Screen { index, text } => {
            push_screen_header(&mut out, *index);
            push_text(&mut out, text, SCREEN_ROOM);
            out.extend_from_slice(&END_MARKER);
        }
        Directive::Name(name) => {
            push_screen_header(&mut out, NAME_SCREEN);
            let mut room = SCREEN_ROOM
                - (LINE_OVERHEAD + NAME_TITLE.len())
                - (LINE_OVERHEAD + NAME_SUBTITLE.len());
            push_segment(&mut out, Y_STARTS[2][0], b'C', NAME_TITLE);
            push_line(&mut out, Y_STARTS[2][1], b'C', name, &mut room);
            push_segment(&mut out, Y_STARTS[2][2], b'C', NAME_SUBTITLE);
            out.extend_from_slice(&END_MARKER);
        }
        Directive::ButtonMap(m) => {
            let f = |v: Option<u8>| v.unwrap_or(UNSET);
            out.extend_from_slice(&[
                b'M',
                f(m.state),
                f(m.state),
                f(m.alert),
                f(m.double_left),
                f(m.single_left),
                UNSET,
                UNSET,
                f(m.single_right),
                f(m.double_right),
                f(m.message_value),
                f(m.message_state),
                f(m.wait_value),
                f(m.wait_state),
                UNSET,
                UNSET,
                UNSET,
            ]);
        }
        Directive::AppValue(v) => out.extend_from_slice(&[b'A', *v]),
    }
    out
}

fn push_screen_header(out: &mut Vec<u8>, screen: u8) {
    out.extend_from_slice(&[b'S', screen, b'R', 0, b'F', 2]);
}

/// Lay out `text` line by line within `room` bytes; a `left | right` line becomes
/// two half-width segments and adds the soft-button outline for the first such line.
/// Text that does not fit is clipped, then later lines are dropped.
fn push_text(out: &mut Vec<u8>, text: &str, mut room: usize) {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.len() > MAX_LINES {
        warn!(lines = lines.len(), "screen text has too many lines, truncating");
        lines.truncate(MAX_LINES);
    }
    let count = lines.len();
    let overlay = lines
        .iter()
        .position(|l| l.contains('|'))
        .and_then(|split| soft_buttons(count, split));
    if overlay.is_some() {
        room -= OVERLAY_LEN;
    }
    for (i, line) in lines.iter().enumerate() {
        let y = Y_STARTS[count - 1][i];
        let fitted = if line.contains('|') {
            let mut halves = line.split('|');
            let left = halves.next().unwrap_or("").trim();
            let right = halves.next().unwrap_or("").trim();
            push_line(out, y, b'l', left, &mut room) && push_line(out, y, b'r', right, &mut room)
        } else {
            push_line(out, y, b'C', line, &mut room)
        };
        if !fitted {
            warn!(kept = i, lines = count, "screen text does not fit a frame, dropping lines");
            break;
        }
    }
    if let Some(boxes) = overlay {
        for (x, y, w, h) in boxes {
            out.extend_from_slice(&[b'X', x, b'Y', y, b'B', w, h]);
        }
    }
}

/// Push one line if at least its framing fits in `room`, clipping the text to what is left.
fn push_line(out: &mut Vec<u8>, y: u8, align: u8, text: &str, room: &mut usize) -> bool {
    if *room < LINE_OVERHEAD {
        return false;
    }
    let text = clip(text, *room - LINE_OVERHEAD);
    push_segment(out, y, align, text);
    *room -= LINE_OVERHEAD + text.len();
    true
}

fn push_segment(out: &mut Vec<u8>, y: u8, align: u8, text: &str) {
    out.extend_from_slice(&[b'Y', y, align, (text.len() + 1) as u8]);
    out.extend_from_slice(text.as_bytes());
    out.push(0);
}

fn clip(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    warn!(len = text.len(), max, "screen line too long, clipping");
    &text[..end]
}

/// Outline of the two soft buttons (outer and inner box on each half), aligned to
/// the split line. Hand-tuned per (line count, split line); None where no layout exists.
fn soft_buttons(lines: usize, split: usize) -> Option<[(u8, u8, u8, u8); 4]> {
    let (y, h) = match (lines, split) {
        (_, 0) => (0x01, 0x5C),
        (4, 1) => (0x18, 0x44),
        (4, 2) => (0x2E, 0x30),
        (4, 3) => (0x44, 0x18),
        (3, 1) => (0x1E, 0x40),
        (3, 2) => (0x44, 0x18),
        (2, 1) => (0x30, 0x2F),
        _ => return None,
    };
    Some([
        (0x01, y, 0x62, h),
        (0x02, y + 1, 0x60, h - 2),
        (0x65, y, 0x62, h),
        (0x66, y + 1, 0x60, h - 2),
    ])
}
