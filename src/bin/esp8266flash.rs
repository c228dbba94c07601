use std::{
    fs,
    path::PathBuf,
    sync::{mpsc, Arc},
    thread,
};

use clap::{Args, Parser, Subcommand};
use esp8266flash::{
    connection::Connection,
    flasher::{read_flash, Event, FlashOptions, Flasher},
    interface::SerialInterface,
    logging::initialize_logger,
    params::FlashParams,
    probe::probe,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, LevelFilter};
use miette::{IntoDiagnostic, Result, WrapErr};

/// Main CLI parser.
#[derive(Debug, Parser)]
#[command(about, max_term_width = 100, propagate_version = true, version)]
struct Cli {
    #[command(subcommand)]
    subcommand: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Flash a directory of firmware images to a connected device
    ///
    /// Image files are named by the flash offset they are written to, e.g.
    /// '0x00000.bin'. Images are written in ascending offset order, each
    /// with up to three attempts.
    Flash(FlashArgs),
    /// Check whether the device on a serial port is a flashable ESP8266
    ///
    /// Reboots the device into its ROM bootloader and reads the MAC
    /// address out of the efuse registers.
    Probe(ConnectArgs),
    /// Read a region of SPI flash into a file
    ///
    /// Uploads a small read-back stub into the device's RAM; the device
    /// reboots back into the bootloader afterwards.
    ReadFlash(ReadFlashArgs),
}

#[derive(Debug, Args)]
struct ConnectArgs {
    /// Serial port connected to the target device
    #[arg(short, long, value_name = "PORT")]
    port: String,
}

#[derive(Debug, Args)]
struct FlashArgs {
    #[clap(flatten)]
    connect_args: ConnectArgs,

    /// Directory holding the '0x*.bin' firmware images
    #[arg(value_name = "DIR")]
    dir: PathBuf,

    /// Force these flash parameters instead of preserving the ones on the
    /// device (either a number or '<mode>,<size>,<freq>', e.g. 'dio,4m,40m')
    #[arg(long, value_name = "PARAMS")]
    flash_params: Option<FlashParams>,

    /// Do not carry the flash parameters over from the firmware already
    /// on the device
    #[arg(long)]
    no_preserve_flash_params: bool,

    /// Trust the ROM to erase exactly what it is asked to
    #[arg(long)]
    no_erase_workaround: bool,

    /// Provision an identity block registered under this hostname when
    /// the device has none
    #[arg(long, value_name = "HOST")]
    id_hostname: Option<String>,
}

#[derive(Debug, Args)]
struct ReadFlashArgs {
    #[clap(flatten)]
    connect_args: ConnectArgs,

    /// Flash offset to read from
    #[arg(value_name = "OFFSET", value_parser = parse_u32)]
    offset: u32,

    /// Number of bytes to read
    #[arg(value_name = "LENGTH", value_parser = parse_u32)]
    length: u32,

    /// File to write the data to
    #[arg(value_name = "FILE")]
    output: PathBuf,
}

fn parse_u32(value: &str) -> Result<u32, String> {
    let (digits, radix) = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (value, 10),
    };
    u32::from_str_radix(digits, radix).map_err(|err| err.to_string())
}

fn main() -> Result<()> {
    miette::set_panic_hook();
    initialize_logger(LevelFilter::Info);

    let cli = Cli::parse();
    debug!("{:#?}", cli);

    match cli.subcommand {
        Commands::Flash(args) => flash(args),
        Commands::Probe(args) => {
            let mac = probe(&args.port)
                .wrap_err_with(|| format!("No ESP8266 detected on {}", args.port))?;
            println!("Found ESP8266 on {}, MAC address {}", args.port, mac);
            Ok(())
        }
        Commands::ReadFlash(args) => read_flash_to_file(args),
    }
}

fn flash(args: FlashArgs) -> Result<()> {
    let options = FlashOptions {
        preserve_flash_params: !args.no_preserve_flash_params
            && args.flash_params.is_none(),
        erase_bug_workaround: !args.no_erase_workaround,
        override_flash_params: args.flash_params,
        merge_flash_filesystem: false,
        generate_id_if_none_found: args.id_hostname.is_some(),
        id_hostname: args.id_hostname.unwrap_or_default(),
    };

    let (events, receiver) = mpsc::channel();
    let flasher = Arc::new(Flasher::new(options, events));

    flasher.load(&args.dir)?;
    flasher.set_port(Box::new(SerialInterface::open(&args.connect_args.port)?));

    let total = flasher.total_blocks();
    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::with_template("[{bar:40}] {pos:>4}/{len:4} blocks {msg}")
            .expect("valid progress template")
            .progress_chars("=> "),
    );

    let worker = {
        let flasher = Arc::clone(&flasher);
        thread::spawn(move || flasher.run())
    };

    let mut outcome = None;
    for event in receiver.iter() {
        match event {
            Event::Status(message) => progress.set_message(message),
            Event::Progress(blocks) => progress.set_position(blocks as u64),
            Event::Done { message, success } => {
                outcome = Some((message, success));
                break;
            }
        }
    }

    worker.join().expect("flasher worker panicked");

    match outcome {
        Some((message, true)) => {
            progress.finish_with_message(message);
            Ok(())
        }
        Some((message, false)) => {
            progress.abandon();
            Err(miette::miette!("{}", message))
        }
        // The worker ended without a terminal event; treat it as a failure.
        None => Err(miette::miette!("flashing ended unexpectedly")),
    }
}

fn read_flash_to_file(args: ReadFlashArgs) -> Result<()> {
    let mut interface = SerialInterface::open(&args.connect_args.port)?;
    let mut connection = Connection::new(&mut interface);

    connection.reboot_into_bootloader()?;
    let data = read_flash(&mut connection, args.offset, args.length)?;

    fs::write(&args.output, &data)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to write {}", args.output.display()))?;

    println!(
        "Read {:#x} bytes at {:#x} into {}",
        args.length,
        args.offset,
        args.output.display()
    );

    Ok(())
}
