//! ASCII command set of the simulated controller.
//!
//! Frames are `<channel><mnemonic>[<param>]\r`, for example `0MA1500\r`.
//! A status query `<channel>TS\r` is answered with
//! `<channel> P<steps> E<counts> V<steps/s> S<hex bits>\r`.

use vernier_common::motion::command::CommandKind;
use vernier_common::motion::error::ProtocolError;
use vernier_common::motion::status::{AxisReading, StatusBits};
use vernier_common::motion::types::AxisId;

use crate::driver::CommandEncoder;

pub const VENDOR: &str = "simulation";

/// Two-letter mnemonic for each command.
pub fn mnemonic(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::MoveAbsolute => "MA",
        CommandKind::MoveRelative => "MR",
        CommandKind::HomeForward => "HF",
        CommandKind::HomeReverse => "HR",
        CommandKind::LoadPosition => "LP",
        CommandKind::SetBaseVelocity => "VB",
        CommandKind::SetVelocity => "VE",
        CommandKind::SetAcceleration => "AC",
        CommandKind::Go => "GO",
        CommandKind::SetEncoderRatio => "ER",
        CommandKind::GetInfo => "TS",
        CommandKind::Stop => "ST",
        CommandKind::Jog => "JG",
        CommandKind::JogVelocity => "JV",
        CommandKind::EnableTorque => "MO",
        CommandKind::DisableTorque => "MF",
    }
}

fn takes_param(kind: CommandKind) -> bool {
    !matches!(
        kind,
        CommandKind::HomeForward
            | CommandKind::HomeReverse
            | CommandKind::Go
            | CommandKind::GetInfo
            | CommandKind::Stop
            | CommandKind::EnableTorque
            | CommandKind::DisableTorque
    )
}

/// Encoder for the simulated controller.
#[derive(Debug, Default)]
pub struct SimEncoder;

impl CommandEncoder for SimEncoder {
    fn name(&self) -> &'static str {
        VENDOR
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn encode(
        &self,
        axis: AxisId,
        kind: CommandKind,
        param: f64,
    ) -> Result<Vec<u8>, ProtocolError> {
        if !param.is_finite() {
            return Err(ProtocolError::Unsupported {
                vendor: VENDOR,
                command: format!("{kind:?} with non-finite parameter"),
            });
        }
        let frame = if takes_param(kind) {
            format!("{}{}{}\r", axis.channel, mnemonic(kind), param)
        } else {
            format!("{}{}\r", axis.channel, mnemonic(kind))
        };
        Ok(frame.into_bytes())
    }

    fn decode(&self, reply: &[u8]) -> Result<AxisReading, ProtocolError> {
        let text = std::str::from_utf8(reply)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?
            .trim_end_matches('\r');

        let mut fields = text.split_whitespace();
        fields
            .next()
            .filter(|ch| ch.parse::<u8>().is_ok())
            .ok_or_else(|| ProtocolError::Malformed(format!("missing channel in {text:?}")))?;

        let mut reading = AxisReading::default();
        let mut seen = 0u8;
        for field in fields {
            let mut chars = field.chars();
            let tag = chars.next();
            let value = chars.as_str();
            match tag {
                Some('P') => reading.position = parse_num(value, text)?,
                Some('E') => reading.encoder_position = parse_num(value, text)?,
                Some('V') => reading.velocity = parse_num(value, text)?,
                Some('S') => {
                    let bits = u32::from_str_radix(value, 16)
                        .map_err(|_| ProtocolError::Malformed(format!("bad status in {text:?}")))?;
                    reading.status = StatusBits::from_bits_truncate(bits);
                }
                _ => {
                    return Err(ProtocolError::Malformed(format!(
                        "unknown field {field:?} in {text:?}"
                    )));
                }
            }
            seen += 1;
        }
        if seen != 4 {
            return Err(ProtocolError::Malformed(format!("incomplete status {text:?}")));
        }
        Ok(reading)
    }
}

fn parse_num(value: &str, frame: &str) -> Result<f64, ProtocolError> {
    value
        .parse()
        .map_err(|_| ProtocolError::Malformed(format!("bad number {value:?} in {frame:?}")))
}

/// Format a status reply the way the simulated controller sends it.
pub fn format_status(channel: u8, reading: &AxisReading) -> Vec<u8> {
    format!(
        "{} P{} E{} V{} S{:04X}\r",
        channel,
        reading.position,
        reading.encoder_position,
        reading.velocity,
        reading.status.bits()
    )
    .into_bytes()
}
