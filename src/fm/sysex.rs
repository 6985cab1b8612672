//! DX7 SYSEX codec: bijective pack/unpack between the 155-byte unpacked
//! [`Patch`] and the 128-byte wire format, plus parsing of the MIDI SYSEX
//! message wrapper (`F0 43 0n fmt ... checksum F7`) for single-voice and
//! 32-voice bank dumps.

use crate::error::EngineError;
use crate::fm::patch::{GlobalPatch, OperatorPatch, Patch};

/// Roland^H^H Yamaha manufacturer ID used by the DX7.
const YAMAHA_ID: u8 = 0x43;
/// Single-voice format byte (sub-status 0, format 0).
const FORMAT_SINGLE_VOICE: u8 = 0x00;
/// 32-voice bank format byte (sub-status 0, format 9).
const FORMAT_BANK: u8 = 0x09;

/// Packed single-voice size (wire format, no header/checksum/terminator).
pub const PACKED_VOICE_SIZE: usize = 128;
/// Packed bank size: 32 voices back to back.
pub const PACKED_BANK_SIZE: usize = 32 * PACKED_VOICE_SIZE;
/// Unpacked voice size (see [`crate::fm::patch::UNPACKED_VOICE_SIZE`]).
pub const UNPACKED_VOICE_SIZE: usize = super::patch::UNPACKED_VOICE_SIZE;

/// Pack one [`Patch`] into the 128-byte DX7 wire format.
pub fn pack_voice(patch: &Patch) -> [u8; PACKED_VOICE_SIZE] {
    let mut out = [0u8; PACKED_VOICE_SIZE];
    for (i, op) in patch.operators.iter().enumerate() {
        pack_operator(op, &mut out[i * 17..i * 17 + 17]);
    }
    pack_global(&patch.global, &mut out[102..128]);
    out
}

fn pack_operator(op: &OperatorPatch, buf: &mut [u8]) {
    buf[0] = op.eg_rate[0];
    buf[1] = op.eg_rate[1];
    buf[2] = op.eg_rate[2];
    buf[3] = op.eg_rate[3];
    buf[4] = op.eg_level[0];
    buf[5] = op.eg_level[1];
    buf[6] = op.eg_level[2];
    buf[7] = op.eg_level[3];
    buf[8] = op.break_point;
    buf[9] = op.left_depth;
    buf[10] = op.right_depth;
    buf[11] = (op.left_curve & 0x03) | ((op.right_curve & 0x03) << 2);
    buf[12] = (op.rate_scale & 0x07) | ((op.detune & 0x0f) << 3);
    buf[13] = (op.amp_mod_sens & 0x03) | ((op.key_vel_sens & 0x07) << 2);
    buf[14] = op.output_level;
    buf[15] = (op.freq_coarse & 0x1f) << 1 | (op.osc_mode & 0x01);
    buf[16] = op.freq_fine;
}

fn pack_global(g: &GlobalPatch, buf: &mut [u8]) {
    buf[0] = g.pitch_eg_rate[0];
    buf[1] = g.pitch_eg_rate[1];
    buf[2] = g.pitch_eg_rate[2];
    buf[3] = g.pitch_eg_rate[3];
    buf[4] = g.pitch_eg_level[0];
    buf[5] = g.pitch_eg_level[1];
    buf[6] = g.pitch_eg_level[2];
    buf[7] = g.pitch_eg_level[3];
    buf[8] = g.algorithm & 0x1f;
    buf[9] = (g.feedback & 0x07) | ((g.osc_key_sync & 0x01) << 3);
    buf[10] = g.lfo_speed;
    buf[11] = g.lfo_delay;
    buf[12] = g.lfo_pitch_mod_depth;
    buf[13] = g.lfo_amp_mod_depth;
    buf[14] = (g.lfo_sync & 0x01)
        | ((g.lfo_waveform & 0x07) << 1)
        | ((g.lfo_pitch_mod_sens & 0x07) << 4);
    buf[15] = g.transpose & 0x3f;
    buf[16..26].copy_from_slice(&g.name);
}

/// Unpack a 128-byte wire-format voice into a [`Patch`].
pub fn unpack_voice(packed: &[u8]) -> Result<Patch, EngineError> {
    if packed.len() != PACKED_VOICE_SIZE {
        return Err(EngineError::BadPatchSize {
            expected: PACKED_VOICE_SIZE,
            actual: packed.len(),
        });
    }

    let mut patch = Patch::default();
    for (i, op) in patch.operators.iter_mut().enumerate() {
        unpack_operator(&packed[i * 17..i * 17 + 17], op);
    }
    unpack_global(&packed[102..128], &mut patch.global);
    Ok(patch)
}

fn unpack_operator(buf: &[u8], op: &mut OperatorPatch) {
    op.eg_rate = [buf[0], buf[1], buf[2], buf[3]];
    op.eg_level = [buf[4], buf[5], buf[6], buf[7]];
    op.break_point = buf[8];
    op.left_depth = buf[9];
    op.right_depth = buf[10];
    op.left_curve = buf[11] & 0x03;
    op.right_curve = (buf[11] >> 2) & 0x03;
    op.rate_scale = buf[12] & 0x07;
    op.detune = (buf[12] >> 3) & 0x0f;
    op.amp_mod_sens = buf[13] & 0x03;
    op.key_vel_sens = (buf[13] >> 2) & 0x07;
    op.output_level = buf[14];
    op.osc_mode = buf[15] & 0x01;
    op.freq_coarse = (buf[15] >> 1) & 0x1f;
    op.freq_fine = buf[16];
}

fn unpack_global(buf: &[u8], g: &mut GlobalPatch) {
    g.pitch_eg_rate = [buf[0], buf[1], buf[2], buf[3]];
    g.pitch_eg_level = [buf[4], buf[5], buf[6], buf[7]];
    g.algorithm = buf[8] & 0x1f;
    g.feedback = buf[9] & 0x07;
    g.osc_key_sync = (buf[9] >> 3) & 0x01;
    g.lfo_speed = buf[10];
    g.lfo_delay = buf[11];
    g.lfo_pitch_mod_depth = buf[12];
    g.lfo_amp_mod_depth = buf[13];
    g.lfo_sync = buf[14] & 0x01;
    g.lfo_waveform = (buf[14] >> 1) & 0x07;
    g.lfo_pitch_mod_sens = (buf[14] >> 4) & 0x07;
    g.transpose = buf[15] & 0x3f;
    g.name.copy_from_slice(&buf[16..26]);
}

/// Unpack the unpacked (155-byte) representation directly, bypassing the
/// bit-packed wire format. Used when a host hands us already-unpacked
/// voice bytes (e.g. from a parameter-edit buffer rather than a SYSEX
/// dump).
pub fn patch_from_unpacked(data: &[u8]) -> Result<Patch, EngineError> {
    if data.len() != UNPACKED_VOICE_SIZE {
        return Err(EngineError::BadPatchSize {
            expected: UNPACKED_VOICE_SIZE,
            actual: data.len(),
        });
    }
    let mut patch = Patch::default();
    for (i, op) in patch.operators.iter_mut().enumerate() {
        let b = &data[i * 21..i * 21 + 21];
        op.eg_rate = [b[0], b[1], b[2], b[3]];
        op.eg_level = [b[4], b[5], b[6], b[7]];
        op.break_point = b[8];
        op.left_depth = b[9];
        op.right_depth = b[10];
        op.left_curve = b[11];
        op.right_curve = b[12];
        op.rate_scale = b[13];
        op.amp_mod_sens = b[14];
        op.key_vel_sens = b[15];
        op.output_level = b[16];
        op.osc_mode = b[17];
        op.freq_coarse = b[18];
        op.freq_fine = b[19];
        op.detune = b[20];
    }
    let g = &data[126..155];
    patch.global.pitch_eg_rate = [g[0], g[1], g[2], g[3]];
    patch.global.pitch_eg_level = [g[4], g[5], g[6], g[7]];
    patch.global.algorithm = g[8];
    patch.global.feedback = g[9];
    patch.global.osc_key_sync = g[10];
    patch.global.lfo_speed = g[11];
    patch.global.lfo_delay = g[12];
    patch.global.lfo_pitch_mod_depth = g[13];
    patch.global.lfo_amp_mod_depth = g[14];
    patch.global.lfo_sync = g[15];
    patch.global.lfo_waveform = g[16];
    patch.global.lfo_pitch_mod_sens = g[17];
    patch.global.transpose = g[18];
    patch.global.name.copy_from_slice(&g[19..29]);
    Ok(patch)
}

/// DX7's 7-bit checksum: two's complement of the low 7 bits of the byte
/// sum, so that `(sum of data bytes + checksum) & 0x7f == 0`.
pub fn checksum(data: &[u8]) -> u8 {
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    (0x80u32.wrapping_sub(sum & 0x7f) & 0x7f) as u8
}

/// A parsed SYSEX payload: either a single voice or a full 32-voice bank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SysexVoiceData {
    /// A single voice.
    Voice(Box<Patch>),
    /// A 32-voice bank, in program order.
    Bank(Vec<Patch>),
}

/// Parse one complete SYSEX message (including `F0`..`F7` framing) into
/// voice data, validating the manufacturer ID, format byte, length, and
/// checksum.
pub fn parse_sysex_message(msg: &[u8]) -> Result<SysexVoiceData, EngineError> {
    if msg.len() < 6 {
        return Err(EngineError::MalformedSysex("message too short"));
    }
    if msg[0] != 0xF0 {
        return Err(EngineError::MalformedSysex("missing F0 start byte"));
    }
    if *msg.last().unwrap() != 0xF7 {
        return Err(EngineError::MalformedSysex("missing F7 terminator"));
    }
    if msg[1] != YAMAHA_ID {
        return Err(EngineError::MalformedSysex("not a Yamaha manufacturer ID"));
    }

    let format = msg[3];
    let payload = &msg[4..msg.len() - 2];
    let claimed_checksum = msg[msg.len() - 2];

    let computed = checksum(payload);
    if computed != claimed_checksum {
        return Err(EngineError::BadChecksum {
            expected: claimed_checksum,
            actual: computed,
        });
    }

    match format {
        FORMAT_SINGLE_VOICE => {
            if payload.len() != UNPACKED_VOICE_SIZE && payload.len() != PACKED_VOICE_SIZE {
                return Err(EngineError::BadPatchSize {
                    expected: PACKED_VOICE_SIZE,
                    actual: payload.len(),
                });
            }
            let patch = if payload.len() == PACKED_VOICE_SIZE {
                unpack_voice(payload)?
            } else {
                patch_from_unpacked(payload)?
            };
            Ok(SysexVoiceData::Voice(Box::new(patch)))
        }
        FORMAT_BANK => {
            if payload.len() != PACKED_BANK_SIZE {
                return Err(EngineError::BadPatchSize {
                    expected: PACKED_BANK_SIZE,
                    actual: payload.len(),
                });
            }
            let patches = payload
                .chunks_exact(PACKED_VOICE_SIZE)
                .map(unpack_voice)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(SysexVoiceData::Bank(patches))
        }
        _ => Err(EngineError::MalformedSysex("unrecognized sysex format byte")),
    }
}

/// Build a complete single-voice SYSEX message for `patch`, ready to send.
pub fn build_voice_message(patch: &Patch, channel: u8) -> Vec<u8> {
    let packed = pack_voice(patch);
    let mut msg = Vec::with_capacity(6 + PACKED_VOICE_SIZE);
    msg.push(0xF0);
    msg.push(YAMAHA_ID);
    msg.push(channel & 0x0f);
    msg.push(FORMAT_SINGLE_VOICE);
    msg.extend_from_slice(&packed);
    msg.push(checksum(&packed));
    msg.push(0xF7);
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_patch() -> Patch {
        let mut patch = Patch::init_voice();
        patch.global.algorithm = 17;
        patch.global.feedback = 5;
        patch.global.name = *b"TESTPATCH ";
        patch.operators[2].freq_coarse = 3;
        patch.operators[2].detune = 12;
        patch.operators[4].left_curve = 2;
        patch.operators[4].right_curve = 1;
        patch
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        let patch = sample_patch();
        let packed = pack_voice(&patch);
        assert_eq!(packed.len(), PACKED_VOICE_SIZE);
        let unpacked = unpack_voice(&packed).unwrap();
        assert_eq!(unpacked, patch);
    }

    #[test]
    fn test_checksum_is_seven_bit_complement() {
        let data = [1u8, 2, 3, 4];
        let cksum = checksum(&data);
        let total = (data.iter().map(|&b| b as u32).sum::<u32>() + cksum as u32) & 0x7f;
        assert_eq!(total, 0);
    }

    #[test]
    fn test_build_and_parse_voice_message_round_trips() {
        let patch = sample_patch();
        let msg = build_voice_message(&patch, 0);
        match parse_sysex_message(&msg).unwrap() {
            SysexVoiceData::Voice(parsed) => assert_eq!(*parsed, patch),
            SysexVoiceData::Bank(_) => panic!("expected a single voice"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_checksum() {
        let patch = sample_patch();
        let mut msg = build_voice_message(&patch, 0);
        let last_data = msg.len() - 2;
        msg[last_data] ^= 0xff;
        msg[last_data] &= 0x7f;
        assert!(matches!(
            parse_sysex_message(&msg),
            Err(EngineError::BadChecksum { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_missing_terminator() {
        let patch = sample_patch();
        let mut msg = build_voice_message(&patch, 0);
        msg.pop();
        assert!(parse_sysex_message(&msg).is_err());
    }

    #[test]
    fn test_parse_bank_splits_into_32_voices() {
        let patch = sample_patch();
        let packed = pack_voice(&patch);
        let mut payload = Vec::with_capacity(PACKED_BANK_SIZE);
        for _ in 0..32 {
            payload.extend_from_slice(&packed);
        }
        let cksum = checksum(&payload);
        let mut msg = vec![0xF0, YAMAHA_ID, 0x00, FORMAT_BANK];
        msg.extend_from_slice(&payload);
        msg.push(cksum);
        msg.push(0xF7);

        match parse_sysex_message(&msg).unwrap() {
            SysexVoiceData::Bank(patches) => {
                assert_eq!(patches.len(), 32);
                assert_eq!(patches[0], patch);
                assert_eq!(patches[31], patch);
            }
            SysexVoiceData::Voice(_) => panic!("expected a bank"),
        }
    }

    #[test]
    fn test_operator_packing_preserves_detune_and_coarse() {
        let patch = sample_patch();
        let packed = pack_voice(&patch);
        let unpacked = unpack_voice(&packed).unwrap();
        assert_eq!(unpacked.operators[2].freq_coarse, 3);
        assert_eq!(unpacked.operators[2].detune, 12);
    }
}
