//! Contains the streaming copy engine: raw disc device in, ISO image file out.
//!
//! A copy session reads the device into one reusable buffer until the device
//! reports the end of the medium. The image file name depends on the disc's
//! volume label, so the file is only created once the first block has been
//! read. Every exit path closes the device and flushes and closes the image
//! file. A partially written image is kept after a mid-transfer failure.
use crate::drive::Drive;
use crate::error::CopyError;
use crate::label::extract_volume_label;
use crate::progress::{ProgressEstimator, ProgressSnapshot, percent_of};
use crate::reader::{RawDeviceReader, SpeedRequest};
use crate::target::resolve_target_path;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Use a 1 MiB buffer for device reads.
pub const BUFFER_SIZE: usize = 1024 * 1024;

/// The image file is flushed to disk every this many buffers.
pub const FLUSH_BUFFERS: u64 = 16;

/// Tunables of a copy session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOptions {
    /// Size of the read buffer, and the largest single device read.
    pub buffer_size: usize,
    /// The image is flushed to stable storage each time this many bytes have
    /// been written in total. `0` disables periodic flushing.
    pub flush_interval: u64,
    /// Drive speed to request when opening the device.
    pub speed: Option<SpeedRequest>,
    /// Emit [`CopyEvent::Progress`] after every write.
    pub verbose: bool,
}

impl CopyOptions {
    /// Checks that these options can drive a transfer.
    ///
    /// # Errors
    ///
    /// [`CopyError::InvalidOptions`] for a zero `buffer_size`, which would
    /// read nothing and look like an empty disc.
    pub fn validate(&self) -> Result<(), CopyError> {
        if self.buffer_size == 0 {
            return Err(CopyError::InvalidOptions("buffer size must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            buffer_size: BUFFER_SIZE,
            flush_interval: BUFFER_SIZE as u64 * FLUSH_BUFFERS,
            speed: None,
            verbose: true,
        }
    }
}

/// Where an image is written.
pub trait ImageSink: Write {
    /// Flushes buffered data all the way to stable storage.
    fn sync(&mut self) -> io::Result<()>;
}

impl ImageSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_data()
    }
}

/// Notifications sent to the caller while a copy runs.
#[derive(Debug)]
pub enum CopyEvent<'a> {
    /// The device is about to be opened.
    Started {
        device: &'a Path,
        total_size: Option<u64>,
    },
    /// The image file name has been chosen and the file is about to be created.
    TargetResolved { path: &'a Path },
    /// A block has been written.
    Progress(&'a ProgressSnapshot),
}

/// Byte counts of a finished or failed copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyReport {
    /// Bytes read from the device.
    pub bytes_read: u64,
    /// Bytes written to the image file.
    pub bytes_written: u64,
    /// Total size of the disc from drive metadata, if known.
    pub total_size: Option<u64>,
    /// The image file, once it has been created.
    pub target: Option<PathBuf>,
}

impl CopyReport {
    fn new(total_size: Option<u64>) -> Self {
        Self {
            bytes_read: 0,
            bytes_written: 0,
            total_size,
            target: None,
        }
    }

    /// Percentage of the disc that made it into the image.
    pub fn percent(&self) -> Option<u64> {
        percent_of(self.bytes_written, self.total_size)
    }
}

/// A copy that stopped on an error, with what had been done by then.
#[derive(Debug, Error)]
#[error("Copy failed after {} bytes", .report.bytes_written)]
pub struct CopyFailure {
    pub report: CopyReport,
    #[source]
    pub error: CopyError,
}

/// Copies the disc in `drive` to a new image file in `dest_dir`.
///
/// The drive is expected to be ready; its [`Drive::total_size`] is trusted as
/// the size of the disc and only feeds progress estimation. The image file is
/// named after the disc's volume label (see
/// [`crate::target::resolve_target_path`]).
///
/// # Errors
///
/// This function will return a [`CopyFailure`] if:
/// - The device cannot be opened or rejects the speed request. No file is created.
/// - The image file cannot be created. No file is created.
/// - A device read or an image write fails. The partial image is kept.
pub fn run<F>(
    drive: &Drive,
    dest_dir: &Path,
    options: &CopyOptions,
    mut on_event: F,
) -> Result<CopyReport, CopyFailure>
where
    F: FnMut(CopyEvent<'_>),
{
    options.validate().map_err(|error| CopyFailure {
        report: CopyReport::new(drive.total_size),
        error,
    })?;

    on_event(CopyEvent::Started {
        device: &drive.device_path,
        total_size: drive.total_size,
    });

    let reader = RawDeviceReader::open(&drive.device_path, options.speed).map_err(|error| {
        CopyFailure {
            report: CopyReport::new(drive.total_size),
            error,
        }
    })?;

    copy_stream(
        reader,
        drive.total_size,
        dest_dir,
        options,
        |path: &Path| File::create(path),
        on_event,
    )
}

/// Runs a copy session over an already opened device.
///
/// `reader` is consumed and dropped before this function returns. `open_sink`
/// is called at most once, with the resolved image path, after the first
/// non-empty read. A device that is empty from the start produces no file.
pub fn copy_stream<R, S, O, F>(
    mut reader: R,
    total_size: Option<u64>,
    dest_dir: &Path,
    options: &CopyOptions,
    open_sink: O,
    mut on_event: F,
) -> Result<CopyReport, CopyFailure>
where
    R: Read,
    S: ImageSink,
    O: FnOnce(&Path) -> io::Result<S>,
    F: FnMut(CopyEvent<'_>),
{
    let mut report = CopyReport::new(total_size);
    if let Err(error) = options.validate() {
        return Err(CopyFailure { report, error });
    }

    let mut sink: Option<S> = None;
    let mut session = Session {
        dest_dir,
        options,
        started: Instant::now(),
        estimator: options
            .verbose
            .then(|| ProgressEstimator::new(options.buffer_size, total_size)),
    };
    let mut buffer = vec![0u8; options.buffer_size];

    let mut outcome = session.pump(
        &mut reader,
        &mut buffer,
        &mut sink,
        &mut report,
        open_sink,
        &mut on_event,
    );

    drop(reader);

    if let Some(mut sink) = sink {
        let synced = sink.sync();
        drop(sink);
        if let Err(source) = synced {
            let path = report.target.clone().unwrap_or_default();
            match outcome {
                Ok(()) => outcome = Err(CopyError::SinkWrite { path, source }),
                Err(_) => warn!(image = %path.display(), error = %source, "final flush failed"),
            }
        }
    }

    match outcome {
        Ok(()) => {
            info!(
                bytes = report.bytes_written,
                image = ?report.target,
                "copy complete"
            );
            Ok(report)
        }
        Err(error) => {
            if let Some(target) = &report.target {
                warn!(
                    image = %target.display(),
                    bytes = report.bytes_written,
                    "partial image retained"
                );
            }
            Err(CopyFailure { report, error })
        }
    }
}

struct Session<'a> {
    dest_dir: &'a Path,
    options: &'a CopyOptions,
    started: Instant,
    estimator: Option<ProgressEstimator>,
}

impl Session<'_> {
    fn pump<R, S, O, F>(
        &mut self,
        reader: &mut R,
        buffer: &mut [u8],
        sink: &mut Option<S>,
        report: &mut CopyReport,
        open_sink: O,
        on_event: &mut F,
    ) -> Result<(), CopyError>
    where
        R: Read,
        S: ImageSink,
        O: FnOnce(&Path) -> io::Result<S>,
        F: FnMut(CopyEvent<'_>),
    {
        let mut count = read_block(reader, buffer, report)?;
        if count == 0 {
            debug!("device is empty");
            return Ok(());
        }

        let label = extract_volume_label(&buffer[..count]);
        let path = resolve_target_path(self.dest_dir, &label)?;
        info!(label = %label, image = %path.display(), "resolved image file");
        on_event(CopyEvent::TargetResolved { path: &path });

        let sink = sink.insert(open_sink(&path).map_err(|source| CopyError::SinkCreate {
            path: path.clone(),
            source,
        })?);
        report.target = Some(path.clone());

        while count > 0 {
            write_block(sink, &buffer[..count], report).map_err(|source| {
                CopyError::SinkWrite {
                    path: path.clone(),
                    source,
                }
            })?;

            if let Some(estimator) = self.estimator.as_mut() {
                let snapshot =
                    estimator.update(report.bytes_read, count, self.started.elapsed());
                on_event(CopyEvent::Progress(&snapshot));
            }

            let interval = self.options.flush_interval;
            if interval > 0 && report.bytes_written % interval == 0 {
                sink.sync().map_err(|source| CopyError::SinkWrite {
                    path: path.clone(),
                    source,
                })?;
                debug!(bytes = report.bytes_written, "flushed image file");
            }

            count = read_block(reader, buffer, report)?;
        }

        Ok(())
    }
}

/// Writes all of `block`, counting every byte the sink accepts, including
/// those of a block that fails part way.
fn write_block<S: Write>(sink: &mut S, block: &[u8], report: &mut CopyReport) -> io::Result<()> {
    let mut rest = block;
    while !rest.is_empty() {
        match sink.write(rest) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => {
                report.bytes_written += n as u64;
                rest = &rest[n..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// One device read into `buffer`; `Ok(0)` is the end of the medium.
fn read_block<R: Read>(
    reader: &mut R,
    buffer: &mut [u8],
    report: &mut CopyReport,
) -> Result<usize, CopyError> {
    loop {
        match reader.read(buffer) {
            Ok(count) => {
                report.bytes_read += count as u64;
                return Ok(count);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(CopyError::device_read(report.bytes_read, source)),
        }
    }
}
