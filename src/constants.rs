// Byte-stuffing delimiters
pub const DLE: u8 = 0x10u8;
pub const STX: u8 = 0x02u8;
pub const ETX: u8 = 0x03u8;

// Header/footer wire sizes
pub const HEADER_LEN: usize = 6;
pub const FOOTER_LEN: usize = 6;
pub const MAX_PAYLOAD_LEN: usize = 31;

// Address
pub const ADDR_BROADCAST: u8 = 0xFF;

// Type partitions
pub const TYPE_CMD_BASE: u8 = 0x80;
pub const TYPE_RANGING_ACK: u8 = 0x7F;

// ACK kinds (low bits of status)
pub const ACK_NONE: u8 = 0;
pub const ACK_PLAIN: u8 = 1;
pub const ACK_RANGE: u8 = 2;

// Host -> modem command type bytes (C5)
pub const CMD_GET_VERSION: u8 = 0x80;
pub const CMD_GET_CONFIG: u8 = 0x83;
pub const CMD_ID: u8 = 0x84;
pub const CMD_GET_BAT_VOLTAGE: u8 = 0x85;
pub const CMD_START_BOOTLOADER: u8 = 0x86;
pub const CMD_RESET: u8 = 0x87;
pub const CMD_SLEEP: u8 = 0x88;
pub const CMD_PKT_PIN: u8 = 0x89;
pub const CMD_FREQ_BANDS_NUM: u8 = 0x90;
pub const CMD_FREQ_BANDS: u8 = 0x91;
pub const CMD_FREQ_CARRIER_NUM: u8 = 0x92;
pub const CMD_FREQ_CARRIERS: u8 = 0x93;
pub const CMD_RX_THRESH: u8 = 0x94;
pub const CMD_BIT_SPREAD: u8 = 0x95;
pub const CMD_FILTER_RAW: u8 = 0x96;
pub const CMD_SYNC_LEN: u8 = 0x97;
pub const CMD_AGC: u8 = 0x98;
pub const CMD_RX_GAIN_RAW: u8 = 0x99;
pub const CMD_TX_GAIN: u8 = 0x9A;
pub const CMD_PEAK_WIN_LEN: u8 = 0x9B;
pub const CMD_TRANSDUCER: u8 = 0x9C;
pub const CMD_RX_GAIN: u8 = 0x9E;
pub const CMD_SAMPLE: u8 = 0xA0;
pub const CMD_SNIFF_MODE: u8 = 0xA1;
pub const CMD_RANGE_DELAY: u8 = 0xA8;
pub const CMD_TEST_FREQ: u8 = 0xB1;
pub const CMD_TEST_SWEEP: u8 = 0xB2;
pub const CMD_TEST_NOISE: u8 = 0xB3;
pub const CMD_TEST_SOUND: u8 = 0xB4;
pub const CMD_GET_POWER_LEVEL: u8 = 0xB8;
pub const CMD_RX_LEVEL: u8 = 0xB9;
pub const CMD_GET_PACKET_STAT: u8 = 0xC0;
pub const CMD_CLEAR_PACKET_STAT: u8 = 0xC1;
pub const CMD_GET_SYNC_STAT: u8 = 0xC2;
pub const CMD_CLEAR_SYNC_STAT: u8 = 0xC3;
pub const CMD_GET_SFD_STAT: u8 = 0xC4;
pub const CMD_CLEAR_SFD_STAT: u8 = 0xC5;

pub const MAX_PEAKWINLEN: u32 = 640;

// Default TCP port for the modem-over-TCP forwarder
pub const DEFAULT_TCP_PORT: u16 = 2464;
