//! The ~40 host-to-modem commands, as a single typed catalog instead of
//! one method per command. Mirrors `ahoi.modem.modem.Modem`'s individual
//! methods, but each command now carries its own argument encoding instead
//! of duplicating `bytearray()` / `to_bytes()` boilerplate per call site.

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::*;
use crate::error::{Error, Result};

/// A single host -> modem command, with everything needed to build its
/// payload. `Command::type_byte` gives the packet `type`; `Command::payload`
/// gives the payload bytes (and validates range-limited arguments).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    GetVersion,
    GetBatVoltage,
    GetConfig,
    GetPowerLevel,
    GetPacketStat,
    ClearPacketStat,
    GetSyncStat,
    ClearSyncStat,
    GetSfdStat,
    ClearSfdStat,
    StartBootloader,
    Reset,
    Sleep,
    RxLevel,

    FreqBandsNum(Option<u8>),
    /// No setter exists upstream either; querying always sends an empty
    /// payload.
    FreqBands,
    FreqCarrierNum(Option<u8>),
    FreqCarriers,
    RangeDelay(Option<u32>),
    RxThresh(Option<u8>),
    BitSpread(Option<u8>),
    /// `(stage, level)`. `level` is a hex string, not a number: the wire
    /// payload is `stage` followed by the raw bytes `level` decodes to, not
    /// `level`'s numeric value. This mirrors `filterRaw`'s
    /// `bytearray.fromhex(level)` exactly, quirk included.
    FilterRaw(Option<(u8, String)>),
    /// `(txlen, rxlen)`, both required together.
    SyncLen(Option<(u8, u8)>),
    Agc(Option<u8>),
    SniffMode(Option<u8>),
    RxGain(Option<u8>),
    /// `(stage, level)`, both required together.
    RxGainRaw(Option<(u8, u8)>),
    PeakWinLen(Option<u32>),
    PktPin(Option<u8>),
    Transducer(Option<u8>),
    Id(Option<u8>),
    /// `(freqIdx, freqLvl)`. `freqLvl` only matters if `freqIdx` is set.
    TestFreq(Option<(u8, u8)>),
    TestSweep { gc: bool, gap: u8 },
    /// `testNoise`'s upstream implementation reads `gap` from an outer
    /// scope that the function signature never binds, so the wire value of
    /// `gap` in that command is always whatever stale local happened to be
    /// lying around — effectively undefined. That bug is not reproduced
    /// here: `step` is sent as specified.
    TestNoise { gc: bool, step: u8, dur: u8 },
    TestSound { dur: u8 },
    TxGain(Option<u8>),
    Sample { trigger: u8, num: u16, post: u16 },
}

impl Command {
    pub fn type_byte(&self) -> u8 {
        match self {
            Command::GetVersion => CMD_GET_VERSION,
            Command::GetBatVoltage => CMD_GET_BAT_VOLTAGE,
            Command::GetConfig => CMD_GET_CONFIG,
            Command::GetPowerLevel => CMD_GET_POWER_LEVEL,
            Command::GetPacketStat => CMD_GET_PACKET_STAT,
            Command::ClearPacketStat => CMD_CLEAR_PACKET_STAT,
            Command::GetSyncStat => CMD_GET_SYNC_STAT,
            Command::ClearSyncStat => CMD_CLEAR_SYNC_STAT,
            Command::GetSfdStat => CMD_GET_SFD_STAT,
            Command::ClearSfdStat => CMD_CLEAR_SFD_STAT,
            Command::StartBootloader => CMD_START_BOOTLOADER,
            Command::Reset => CMD_RESET,
            Command::Sleep => CMD_SLEEP,
            Command::RxLevel => CMD_RX_LEVEL,
            Command::FreqBandsNum(_) => CMD_FREQ_BANDS_NUM,
            Command::FreqBands => CMD_FREQ_BANDS,
            Command::FreqCarrierNum(_) => CMD_FREQ_CARRIER_NUM,
            Command::FreqCarriers => CMD_FREQ_CARRIERS,
            Command::RangeDelay(_) => CMD_RANGE_DELAY,
            Command::RxThresh(_) => CMD_RX_THRESH,
            Command::BitSpread(_) => CMD_BIT_SPREAD,
            Command::FilterRaw(_) => CMD_FILTER_RAW,
            Command::SyncLen(_) => CMD_SYNC_LEN,
            Command::Agc(_) => CMD_AGC,
            Command::SniffMode(_) => CMD_SNIFF_MODE,
            Command::RxGain(_) => CMD_RX_GAIN,
            Command::RxGainRaw(_) => CMD_RX_GAIN_RAW,
            Command::PeakWinLen(_) => CMD_PEAK_WIN_LEN,
            Command::PktPin(_) => CMD_PKT_PIN,
            Command::Transducer(_) => CMD_TRANSDUCER,
            Command::Id(_) => CMD_ID,
            Command::TestFreq(_) => CMD_TEST_FREQ,
            Command::TestSweep { .. } => CMD_TEST_SWEEP,
            Command::TestNoise { .. } => CMD_TEST_NOISE,
            Command::TestSound { .. } => CMD_TEST_SOUND,
            Command::TxGain(_) => CMD_TX_GAIN,
            Command::Sample { .. } => CMD_SAMPLE,
        }
    }

    pub fn payload(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        match self {
            Command::GetVersion
            | Command::GetBatVoltage
            | Command::GetConfig
            | Command::GetPowerLevel
            | Command::GetPacketStat
            | Command::ClearPacketStat
            | Command::GetSyncStat
            | Command::ClearSyncStat
            | Command::GetSfdStat
            | Command::ClearSfdStat
            | Command::StartBootloader
            | Command::Reset
            | Command::Sleep
            | Command::RxLevel
            | Command::FreqBands
            | Command::FreqCarriers => {}

            Command::FreqBandsNum(opt)
            | Command::FreqCarrierNum(opt)
            | Command::RxThresh(opt)
            | Command::BitSpread(opt)
            | Command::Agc(opt)
            | Command::SniffMode(opt)
            | Command::RxGain(opt)
            | Command::PktPin(opt)
            | Command::Transducer(opt)
            | Command::Id(opt)
            | Command::TxGain(opt) => {
                if let Some(v) = opt {
                    buf.put_u8(*v);
                }
            }

            Command::RangeDelay(opt) => {
                if let Some(v) = opt {
                    buf.put_u32(*v);
                }
            }

            Command::FilterRaw(opt) => {
                if let Some((stage, level_hex)) = opt {
                    buf.put_u8(*stage);
                    let bytes = hex_decode(level_hex)?;
                    buf.put_slice(&bytes);
                }
            }

            Command::SyncLen(opt) => {
                if let Some((txlen, rxlen)) = opt {
                    buf.put_u8(*txlen);
                    buf.put_u8(*rxlen);
                }
            }

            Command::RxGainRaw(opt) => {
                if let Some((stage, level)) = opt {
                    buf.put_u8(*stage);
                    buf.put_u8(*level);
                }
            }

            Command::PeakWinLen(opt) => {
                if let Some(winlen) = opt {
                    if *winlen > MAX_PEAKWINLEN {
                        return Err(Error::PeakWinLenOutOfRange);
                    }
                    buf.put_u16(*winlen as u16);
                }
            }

            Command::TestFreq(opt) => {
                if let Some((freq_idx, freq_lvl)) = opt {
                    buf.put_u8(*freq_idx);
                    buf.put_u8(*freq_lvl);
                }
            }

            Command::TestSweep { gc, gap } => {
                buf.put_u8(*gc as u8);
                buf.put_u8(*gap);
            }

            Command::TestNoise { gc, step, dur } => {
                if *step < 1 || *dur < 1 {
                    return Err(Error::TestNoiseOutOfRange);
                }
                buf.put_u8(*gc as u8);
                buf.put_u8(*step);
                buf.put_u8(*dur);
            }

            Command::TestSound { dur } => {
                if *dur < 1 || *dur > 250 {
                    return Err(Error::TestSoundDurationOutOfRange);
                }
                buf.put_u8(*dur);
            }

            Command::Sample { trigger, num, post } => {
                buf.put_u8(*trigger);
                buf.put_u16(*num);
                buf.put_u16(*post);
            }
        }
        Ok(buf.freeze())
    }
}

fn hex_decode(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(Error::Parse);
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| Error::Parse))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arg_commands_have_empty_payload() {
        assert_eq!(Command::GetVersion.payload().unwrap(), Bytes::new());
        assert_eq!(Command::GetVersion.type_byte(), 0x80);
    }

    #[test]
    fn single_byte_get_set_commands() {
        assert_eq!(Command::Id(None).payload().unwrap(), Bytes::new());
        assert_eq!(
            Command::Id(Some(7)).payload().unwrap(),
            Bytes::from_static(&[7])
        );
    }

    #[test]
    fn range_delay_is_four_bytes() {
        let pkt = Command::RangeDelay(Some(0x01020304)).payload().unwrap();
        assert_eq!(pkt.as_ref(), &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn peak_win_len_rejects_out_of_range() {
        assert!(matches!(
            Command::PeakWinLen(Some(MAX_PEAKWINLEN + 1)).payload(),
            Err(Error::PeakWinLenOutOfRange)
        ));
        let ok = Command::PeakWinLen(Some(MAX_PEAKWINLEN)).payload().unwrap();
        assert_eq!(ok.as_ref(), &[0x02, 0x80]);
    }

    #[test]
    fn filter_raw_decodes_level_as_hex_not_integer() {
        let pkt = Command::FilterRaw(Some((2, "0A1B".to_string())))
            .payload()
            .unwrap();
        assert_eq!(pkt.as_ref(), &[0x02, 0x0A, 0x1B]);
    }

    #[test]
    fn filter_raw_rejects_malformed_hex() {
        assert!(Command::FilterRaw(Some((0, "zz".to_string())))
            .payload()
            .is_err());
    }

    #[test]
    fn test_sound_rejects_out_of_range_duration() {
        assert!(Command::TestSound { dur: 0 }.payload().is_err());
        assert!(Command::TestSound { dur: 251 }.payload().is_err());
        assert!(Command::TestSound { dur: 250 }.payload().is_ok());
    }

    #[test]
    fn test_noise_rejects_zero_step_or_dur() {
        assert!(matches!(
            Command::TestNoise {
                gc: false,
                step: 0,
                dur: 1
            }
            .payload(),
            Err(Error::TestNoiseOutOfRange)
        ));
    }

    #[test]
    fn sample_encodes_trigger_num_post() {
        let pkt = Command::Sample {
            trigger: 1,
            num: 0x0200,
            post: 0x0010,
        }
        .payload()
        .unwrap();
        assert_eq!(pkt.as_ref(), &[0x01, 0x02, 0x00, 0x00, 0x10]);
    }
}
