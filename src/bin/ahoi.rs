use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use prettytable::{cell, row, table};
use structopt::StructOpt;

use ahoi::imgtx::{DebugCapture, ImageTxEngine, NullSink};
use ahoi::{Command, Config, Modem, Packet};

#[derive(StructOpt, Debug)]
#[structopt(name = "ahoi")]
struct App {
    /// A path to a serial device with an ahoi modem connected, e.g. /dev/ttyUSB0
    #[structopt(
        short,
        long,
        parse(from_os_str),
        conflicts_with = "host",
        required_unless = "host"
    )]
    device: Option<PathBuf>,

    /// A host[:port] to connect to a modem-over-TCP forwarder
    #[structopt(short, long, conflicts_with = "device", required_unless = "device")]
    host: Option<String>,

    /// Path to a TOML config file for image-transfer subcommands
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    #[structopt(subcommand)]
    command: AppCommand,
}

#[derive(StructOpt, Debug)]
enum AppCommand {
    /// Send one of the modem's ~40 host commands and wait for its reply
    Cmd(ModemCommand),
    /// Print every received packet until interrupted
    Listen,
    /// Flash new firmware over the serial bootloader passthrough
    Program {
        #[structopt(parse(from_os_str))]
        image: PathBuf,
        #[structopt(long)]
        empty: bool,
    },
    /// Run the image-transfer responder: waits for incoming CAP requests
    /// and transmits a captured image back
    ImgServe {
        #[structopt(parse(from_os_str))]
        debug_image: PathBuf,
    },
    /// Request an image from a remote station
    ImgRequest {
        #[structopt(default_value = "160")]
        width: u32,
        #[structopt(default_value = "120")]
        height: u32,
        #[structopt(default_value = "25")]
        quality: u8,
        #[structopt(long)]
        flash: bool,
    },
}

#[derive(StructOpt, Debug)]
#[structopt(about = "Modem commands")]
enum ModemCommand {
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
    Reset,
    Sleep,
    RxLevel,
    Id { value: Option<u8> },
    BitSpread { value: Option<u8> },
    TxGain { value: Option<u8> },
    RxGain { value: Option<u8> },
    RxThresh { value: Option<u8> },
    Agc { value: Option<u8> },
    SniffMode { value: Option<u8> },
    PktPin { value: Option<u8> },
    Transducer { value: Option<u8> },
    FreqBandsNum { value: Option<u8> },
    FreqBands,
    FreqCarrierNum { value: Option<u8> },
    FreqCarriers,
    RangeDelay { value: Option<u32> },
    PeakWinLen { value: Option<u32> },
    SyncLen { txlen: u8, rxlen: u8 },
    RxGainRaw { stage: u8, level: u8 },
    FilterRaw { stage: u8, level_hex: String },
    TestFreq { freq_idx: u8, freq_lvl: u8 },
    TestSweep { gc: bool, gap: u8 },
    TestNoise { gc: bool, step: u8, dur: u8 },
    TestSound { dur: u8 },
    Sample { trigger: u8, num: u16, post: u16 },
}

impl From<ModemCommand> for Command {
    fn from(cmd: ModemCommand) -> Command {
        match cmd {
            ModemCommand::GetVersion => Command::GetVersion,
            ModemCommand::GetBatVoltage => Command::GetBatVoltage,
            ModemCommand::GetConfig => Command::GetConfig,
            ModemCommand::GetPowerLevel => Command::GetPowerLevel,
            ModemCommand::GetPacketStat => Command::GetPacketStat,
            ModemCommand::ClearPacketStat => Command::ClearPacketStat,
            ModemCommand::GetSyncStat => Command::GetSyncStat,
            ModemCommand::ClearSyncStat => Command::ClearSyncStat,
            ModemCommand::GetSfdStat => Command::GetSfdStat,
            ModemCommand::ClearSfdStat => Command::ClearSfdStat,
            ModemCommand::Reset => Command::Reset,
            ModemCommand::Sleep => Command::Sleep,
            ModemCommand::RxLevel => Command::RxLevel,
            ModemCommand::Id { value } => Command::Id(value),
            ModemCommand::BitSpread { value } => Command::BitSpread(value),
            ModemCommand::TxGain { value } => Command::TxGain(value),
            ModemCommand::RxGain { value } => Command::RxGain(value),
            ModemCommand::RxThresh { value } => Command::RxThresh(value),
            ModemCommand::Agc { value } => Command::Agc(value),
            ModemCommand::SniffMode { value } => Command::SniffMode(value),
            ModemCommand::PktPin { value } => Command::PktPin(value),
            ModemCommand::Transducer { value } => Command::Transducer(value),
            ModemCommand::FreqBandsNum { value } => Command::FreqBandsNum(value),
            ModemCommand::FreqBands => Command::FreqBands,
            ModemCommand::FreqCarrierNum { value } => Command::FreqCarrierNum(value),
            ModemCommand::FreqCarriers => Command::FreqCarriers,
            ModemCommand::RangeDelay { value } => Command::RangeDelay(value),
            ModemCommand::PeakWinLen { value } => Command::PeakWinLen(value),
            ModemCommand::SyncLen { txlen, rxlen } => Command::SyncLen(Some((txlen, rxlen))),
            ModemCommand::RxGainRaw { stage, level } => Command::RxGainRaw(Some((stage, level))),
            ModemCommand::FilterRaw { stage, level_hex } => {
                Command::FilterRaw(Some((stage, level_hex)))
            }
            ModemCommand::TestFreq { freq_idx, freq_lvl } => {
                Command::TestFreq(Some((freq_idx, freq_lvl)))
            }
            ModemCommand::TestSweep { gc, gap } => Command::TestSweep { gc, gap },
            ModemCommand::TestNoise { gc, step, dur } => Command::TestNoise { gc, step, dur },
            ModemCommand::TestSound { dur } => Command::TestSound { dur },
            ModemCommand::Sample {
                trigger,
                num,
                post,
            } => Command::Sample {
                trigger,
                num,
                post,
            },
        }
    }
}

fn connect(app: &App) -> Result<Modem> {
    if let Some(device) = &app.device {
        Modem::connect(&device.to_string_lossy()).with_context(|| "failed to open modem")
    } else {
        let host = app.host.clone().unwrap();
        let mut parts = host.splitn(2, ':');
        let hostname = parts.next().unwrap_or("").to_string();
        let port = parts.next().and_then(|p| p.parse::<u16>().ok());
        Modem::connect_tcp(hostname, port).with_context(|| "failed to connect")
    }
}

fn run_img_serve(modem: Arc<Modem>, config: Config, debug_image: PathBuf) -> Result<()> {
    let _engine = ImageTxEngine::new(
        modem,
        config.transmission,
        config.image,
        Arc::new(NullSink),
        Arc::new(DebugCapture::new(debug_image)),
    );
    println!("serving image requests, press Ctrl+C to stop");
    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}

fn run_img_request(
    modem: Arc<Modem>,
    config: Config,
    width: u32,
    height: u32,
    quality: u8,
    flash: bool,
) -> Result<()> {
    let engine = ImageTxEngine::new(
        modem,
        config.transmission,
        config.image,
        Arc::new(NullSink),
        Arc::new(DebugCapture::new("debug.jpg")),
    );
    engine.request_img(Some((width, height)), Some(quality), Some(flash));
    std::thread::sleep(Duration::from_secs(5));
    engine.close();
    Ok(())
}

/// Blocks printing every received packet (already echoed by `set_rx_echo`)
/// until interrupted, the way `ahoi listen` just watches the wire.
fn run_listen(_modem: &Modem) -> Result<()> {
    println!("listening for packets, press Ctrl+C to stop");
    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}

/// Renders a command response payload as an offset/hex/ascii table, the
/// way the original prints `getPacketStat`/`getSyncStat`/`getConfig`
/// replies as formatted tables instead of raw bytes.
fn print_response(pkt: &Packet) {
    let mut table = table!(["offset", "hex", "ascii"]);
    for (i, chunk) in pkt.payload.chunks(8).enumerate() {
        let hex = chunk
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ");
        let ascii = chunk
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect::<String>();
        table.add_row(row![i * 8, hex, ascii]);
    }
    table.printstd();
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let app = App::from_args();
    debug!("{:#?}", app);

    match &app.command {
        AppCommand::Cmd(_) | AppCommand::Listen | AppCommand::Program { .. } => {
            let mut modem = connect(&app)?;
            modem.set_tx_echo(true);
            modem.set_rx_echo(true);

            let last_response: Arc<Mutex<Option<Packet>>> = Arc::new(Mutex::new(None));
            let captured = Arc::clone(&last_response);
            modem.add_rx_callback(move |pkt| {
                *captured.lock().unwrap() = Some(pkt.clone());
            });

            modem.receive(true)?;
            modem.set_mode_blocking(true);

            match app.command {
                AppCommand::Cmd(cmd) => {
                    modem.send_command(&cmd.into())?;
                    if let Some(pkt) = last_response.lock().unwrap().take() {
                        print_response(&pkt);
                    }
                }
                AppCommand::Listen => {
                    modem.set_mode_blocking(false);
                    run_listen(&modem)?;
                }
                AppCommand::Program { image, empty } => {
                    modem.program(&image, empty)?;
                }
                AppCommand::ImgServe { .. } | AppCommand::ImgRequest { .. } => unreachable!(),
            }
        }
        AppCommand::ImgServe { debug_image } => {
            let modem = Arc::new(connect(&app)?);
            modem.set_rx_echo(true);
            modem.receive(true)?;
            let config = match &app.config {
                Some(path) => Config::load(path)?,
                None => Config::default(),
            };
            run_img_serve(modem, config, debug_image.clone())?;
        }
        AppCommand::ImgRequest {
            width,
            height,
            quality,
            flash,
        } => {
            let modem = Arc::new(connect(&app)?);
            modem.set_rx_echo(true);
            modem.receive(true)?;
            let config = match &app.config {
                Some(path) => Config::load(path)?,
                None => Config::default(),
            };
            run_img_request(modem, config, *width, *height, *quality, *flash)?;
        }
    }

    Ok(())
}
