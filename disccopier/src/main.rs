use anyhow::{Result, anyhow, bail};
use clap::Parser;
use console::style;
use disccopier_core::copy::{self, BUFFER_SIZE, CopyEvent, CopyOptions, CopyReport, FLUSH_BUFFERS};
use disccopier_core::drive::Drive;
use disccopier_core::platform;
use disccopier_core::reader::SpeedRequest;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "disccopier")]
#[command(
    about = "Copies an optical disc to an ISO image named after its volume label",
    version
)]
struct Cli {
    /// Directory to write the image to [default: root of the last fixed drive]
    dest: Option<PathBuf>,

    /// Optical drive to copy from, by its first letter [default: first optical drive]
    drive: Option<String>,

    /// Ask the drive to read at this speed, in KB/s (bare flag: 11080, 8x DVD)
    #[arg(long, value_name = "KBPS", num_args = 0..=1, default_missing_value = "11080")]
    speed: Option<u16>,

    /// Size of each device read, in bytes
    #[arg(long, value_name = "BYTES", default_value_t = BUFFER_SIZE)]
    buffer_size: usize,

    /// Flush the image to disk every N buffers (0 = only at the end)
    #[arg(long, value_name = "N", default_value_t = FLUSH_BUFFERS)]
    flush_buffers: u64,

    /// Do not print progress
    #[arg(short, long)]
    quiet: bool,

    /// Log debug diagnostics to stderr
    #[arg(long)]
    debug: bool,

    /// List optical and fixed drives and exit
    #[arg(long)]
    list: bool,
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Uses `dest` if it is an existing directory, or else the root of the last
/// fixed drive.
fn resolve_destination(dest: Option<PathBuf>) -> Result<PathBuf> {
    let dest = match dest {
        Some(dest) => dest,
        None => platform::list_fixed_drives()?
            .pop()
            .map(|drive| drive.root)
            .ok_or_else(|| anyhow!("Cannot find fixed drive"))?,
    };

    if !dest.is_dir() {
        let reason = if dest.exists() {
            "is not a directory"
        } else {
            "does not exist"
        };
        bail!("{} {}", dest.display(), reason);
    }

    Ok(dest)
}

/// Picks the first optical drive matching `choice`, which must hold a disc.
fn select_source(choice: &str) -> Result<Drive> {
    let suffix = match choice.chars().next() {
        Some(letter) => format!(" {}:", letter.to_ascii_uppercase()),
        None => String::new(),
    };

    let drive = platform::list_optical_drives()?
        .into_iter()
        .find(|drive| drive.matches_choice(choice))
        .ok_or_else(|| anyhow!("Cannot find optical drive{suffix}"))?;

    if !drive.ready {
        bail!("Optical drive{suffix} is not ready");
    }

    Ok(drive)
}

fn print_drives(title: &str, drives: &[Drive]) {
    println!("{title}:");
    if drives.is_empty() {
        println!("  (none)");
        return;
    }
    println!(
        "  {:<10} {:<15} {:>10}  {:<9} {}",
        "DRIVE", "DEVICE", "SIZE", "STATE", "LABEL"
    );
    println!("  {:-<10} {:-<15} {:->10}  {:-<9} {:-<12}", "", "", "", "", "");
    for drive in drives {
        println!("  {drive}");
    }
}

fn summary(report: &CopyReport) -> String {
    let total = report
        .total_size
        .map_or_else(|| "?".to_string(), |t| t.to_string());
    let percent = report
        .percent()
        .map_or_else(|| "?".to_string(), |p| p.to_string());
    format!(
        "Written {} / {} bytes ({}%)",
        report.bytes_written, total, percent
    )
}

fn progress_bar(drive: &Drive, verbose: bool) -> ProgressBar {
    if !verbose {
        return ProgressBar::hidden();
    }

    let pb = match drive.total_size {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{prefix:8} [{elapsed_precise}] [{bar:30.green/black}] {msg}")
                    .unwrap()
                    .progress_chars("■ "),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{prefix:8} [{elapsed_precise}] {spinner} {msg}")
                    .unwrap(),
            );
            pb
        }
    };
    pb.set_prefix("Copying");
    pb
}

/// The informational line printed for an event, if it has one.
fn event_line(event: &CopyEvent<'_>, dest: &Path) -> Option<String> {
    match event {
        CopyEvent::Started { device, .. } => Some(format!(
            "Copying optical disc from device {} to {}",
            style(device.display()).cyan(),
            style(dest.display()).cyan()
        )),
        CopyEvent::TargetResolved { path } => {
            Some(format!("Writing to {}", style(path.display()).cyan()))
        }
        CopyEvent::Progress(_) => None,
    }
}

fn copy_disc(drive: &Drive, dest: &Path, options: &CopyOptions) -> Result<()> {
    let pb = progress_bar(drive, options.verbose);

    // Info lines go to stdout around the bar; a hidden bar drops its own `println`.
    let result = copy::run(drive, dest, options, |event| {
        if let CopyEvent::Progress(snapshot) = &event {
            pb.set_position(snapshot.bytes_read);
            pb.set_message(snapshot.to_string());
        } else if options.verbose {
            if let Some(line) = event_line(&event, dest) {
                pb.suspend(|| println!("{line}"));
            }
        }
    });

    match result {
        Ok(report) => {
            pb.finish_and_clear();
            if options.verbose {
                println!("{}", style(summary(&report)).green());
            }
            Ok(())
        }
        Err(failure) => {
            pb.abandon();
            println!("{}", style(summary(&failure.report)).red());
            if let Some(target) = &failure.report.target {
                println!("Partial image kept at {}", style(target.display()).yellow());
            }
            Err(failure.into())
        }
    }
}

/// Builds the copy options from the command line.
fn copy_options(cli: &Cli) -> Result<CopyOptions> {
    if cli.buffer_size == 0 {
        bail!("--buffer-size must be greater than zero");
    }

    let flush_interval = (cli.buffer_size as u64)
        .checked_mul(cli.flush_buffers)
        .ok_or_else(|| anyhow!("--buffer-size times --flush-buffers is too large"))?;

    Ok(CopyOptions {
        buffer_size: cli.buffer_size,
        flush_interval,
        speed: cli.speed.map(SpeedRequest::symmetric),
        verbose: !cli.quiet,
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if cli.list {
        print_drives("Optical drives", &platform::list_optical_drives()?);
        println!();
        print_drives("Fixed drives", &platform::list_fixed_drives()?);
        return Ok(());
    }

    let options = copy_options(&cli)?;
    let dest = resolve_destination(cli.dest)?;
    let drive = select_source(cli.drive.as_deref().unwrap_or(""))?;

    copy_disc(&drive, &dest, &options)
}
