use disccopier_core::copy::{self, CopyEvent, CopyOptions, ImageSink};
use disccopier_core::drive::{Drive, DriveKind};
use disccopier_core::label::LABEL_OFFSET;
use disccopier_core::CopyError;
use std::cell::Cell;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

const MIB: usize = 1024 * 1024;

/// A simulated disc that yields one scripted result per read.
struct ScriptedDevice {
    reads: Vec<io::Result<Vec<u8>>>,
    released: Rc<Cell<bool>>,
}

impl ScriptedDevice {
    fn new(reads: Vec<io::Result<Vec<u8>>>) -> (Self, Rc<Cell<bool>>) {
        let released = Rc::new(Cell::new(false));
        let device = Self {
            reads: reads.into_iter().rev().collect(),
            released: released.clone(),
        };
        (device, released)
    }
}

impl Read for ScriptedDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop() {
            None => Ok(0),
            Some(Err(e)) => Err(e),
            Some(Ok(block)) => {
                assert!(block.len() <= buf.len(), "block larger than the read buffer");
                buf[..block.len()].copy_from_slice(&block);
                Ok(block.len())
            }
        }
    }
}

impl Drop for ScriptedDevice {
    fn drop(&mut self) {
        self.released.set(true);
    }
}

/// Failures a [`TrackedSink`] injects.
#[derive(Clone, Copy, Default)]
struct SinkFaults {
    /// 1-based index of the first `write` call that fails.
    write_call: Option<usize>,
    /// Fail every `sync`.
    sync: bool,
}

/// A file sink that records how often it was synced and when it was closed.
struct TrackedSink {
    file: File,
    syncs: Rc<Cell<Vec<u64>>>,
    written: u64,
    write_calls: usize,
    faults: SinkFaults,
    released: Rc<Cell<bool>>,
}

impl Write for TrackedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_calls += 1;
        if self.faults.write_call.is_some_and(|n| self.write_calls >= n) {
            return Err(io::Error::other("disk full"));
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl ImageSink for TrackedSink {
    fn sync(&mut self) -> io::Result<()> {
        let mut syncs = self.syncs.take();
        syncs.push(self.written);
        self.syncs.set(syncs);
        if self.faults.sync {
            return Err(io::Error::other("sync failed"));
        }
        self.file.sync()
    }
}

impl Drop for TrackedSink {
    fn drop(&mut self) {
        self.released.set(true);
    }
}

fn labelled_block(label: &str) -> Vec<u8> {
    let mut block: Vec<u8> = (0..MIB).map(|i| (i % 251) as u8).collect();
    let field = &mut block[LABEL_OFFSET..LABEL_OFFSET + 32];
    field.fill(b' ');
    field[..label.len()].copy_from_slice(label.as_bytes());
    block
}

fn filler_block(seed: u8) -> Vec<u8> {
    (0..MIB).map(|i| (i as u8).wrapping_mul(seed)).collect()
}

struct Tracking {
    syncs: Rc<Cell<Vec<u64>>>,
    released: Rc<Cell<bool>>,
}

impl Tracking {
    fn new() -> Self {
        Self {
            syncs: Rc::new(Cell::new(Vec::new())),
            released: Rc::new(Cell::new(false)),
        }
    }

    fn opener(&self) -> impl FnOnce(&Path) -> io::Result<TrackedSink> + use<> {
        self.faulty_opener(SinkFaults::default())
    }

    fn faulty_opener(
        &self,
        faults: SinkFaults,
    ) -> impl FnOnce(&Path) -> io::Result<TrackedSink> + use<> {
        let syncs = self.syncs.clone();
        let released = self.released.clone();
        move |path: &Path| {
            Ok(TrackedSink {
                file: File::create(path)?,
                syncs,
                written: 0,
                write_calls: 0,
                faults,
                released,
            })
        }
    }

    fn syncs(&self) -> Vec<u64> {
        let syncs = self.syncs.take();
        self.syncs.set(syncs.clone());
        syncs
    }
}

#[test]
fn copies_labelled_disc_to_named_image() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = vec![labelled_block("SAMPLE_DISC"), filler_block(3), filler_block(7)];
    let expected: Vec<u8> = blocks.concat();
    let (device, device_released) =
        ScriptedDevice::new(blocks.into_iter().map(Ok).collect());
    let tracking = Tracking::new();

    let mut resolved = Vec::new();
    let mut percents = Vec::new();
    let report = copy::copy_stream(
        device,
        Some(3 * MIB as u64),
        dir.path(),
        &CopyOptions::default(),
        tracking.opener(),
        |event| match event {
            CopyEvent::TargetResolved { path } => resolved.push(path.to_path_buf()),
            CopyEvent::Progress(snapshot) => percents.push(snapshot.percent.unwrap()),
            CopyEvent::Started { .. } => {}
        },
    )
    .unwrap();

    let target = dir.path().join("SAMPLE_DISC.iso");
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].file_name().unwrap(), "SAMPLE_DISC.iso");
    assert_eq!(report.target.as_deref().map(Path::file_name), Some(target.file_name()));
    assert_eq!(report.bytes_read, 3 * MIB as u64);
    assert_eq!(report.bytes_written, 3 * MIB as u64);
    assert_eq!(report.percent(), Some(100));
    assert_eq!(percents, vec![33, 66, 100]);

    assert_eq!(fs::read(&target).unwrap(), expected);
    assert!(device_released.get());
    assert!(tracking.released.get());
    // Only the final flush: 3 MiB never reaches the 16 MiB interval.
    assert_eq!(tracking.syncs(), vec![3 * MIB as u64]);
}

#[test]
fn read_error_keeps_partial_image() {
    let dir = tempfile::tempdir().unwrap();
    let first = labelled_block("SAMPLE_DISC");
    let (device, device_released) = ScriptedDevice::new(vec![
        Ok(first.clone()),
        Err(io::Error::from_raw_os_error(23)),
        Ok(filler_block(7)),
    ]);
    let tracking = Tracking::new();

    let failure = copy::copy_stream(
        device,
        Some(3 * MIB as u64),
        dir.path(),
        &CopyOptions::default(),
        tracking.opener(),
        |_| {},
    )
    .unwrap_err();

    match &failure.error {
        CopyError::DeviceRead { offset, code, .. } => {
            assert_eq!(*offset, MIB as u64);
            assert_eq!(*code, Some(23));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(failure.report.bytes_written, MIB as u64);
    assert_eq!(failure.report.percent(), Some(33));

    let target = dir.path().join("SAMPLE_DISC.iso");
    assert_eq!(failure.report.target.as_deref().and_then(Path::file_name), target.file_name());
    assert_eq!(fs::read(&target).unwrap(), first);
    assert!(device_released.get());
    assert!(tracking.released.get());
    assert_eq!(tracking.syncs(), vec![MIB as u64]);
}

#[test]
fn flushes_on_every_interval_and_at_the_end() {
    let dir = tempfile::tempdir().unwrap();
    let block = 4096;
    let reads: Vec<io::Result<Vec<u8>>> = (0..7u8).map(|i| Ok(vec![i; block])).collect();
    let (device, _) = ScriptedDevice::new(reads);
    let tracking = Tracking::new();
    let options = CopyOptions {
        buffer_size: block,
        flush_interval: 2 * block as u64,
        ..CopyOptions::default()
    };

    let report =
        copy::copy_stream(device, None, dir.path(), &options, tracking.opener(), |_| {}).unwrap();

    assert_eq!(report.bytes_written, 7 * block as u64);
    assert_eq!(report.percent(), None);
    let b = block as u64;
    assert_eq!(tracking.syncs(), vec![2 * b, 4 * b, 6 * b, 7 * b]);
}

#[test]
fn unaligned_reads_skip_periodic_flush() {
    let dir = tempfile::tempdir().unwrap();
    let (device, _) = ScriptedDevice::new(vec![Ok(vec![1; 3000]), Ok(vec![2; 3000])]);
    let tracking = Tracking::new();
    let options = CopyOptions {
        buffer_size: 4096,
        flush_interval: 4096,
        ..CopyOptions::default()
    };

    copy::copy_stream(device, None, dir.path(), &options, tracking.opener(), |_| {}).unwrap();

    assert_eq!(tracking.syncs(), vec![6000]);
}

#[test]
fn unlabelled_disc_gets_generated_name_and_clashes_are_avoided() {
    let dir = tempfile::tempdir().unwrap();
    File::create(dir.path().join("SAMPLE_DISC.iso")).unwrap();

    let (device, _) = ScriptedDevice::new(vec![Ok(labelled_block("SAMPLE_DISC"))]);
    let report = copy::copy_stream(
        device,
        None,
        dir.path(),
        &CopyOptions::default(),
        |path: &Path| File::create(path),
        |_| {},
    )
    .unwrap();
    assert_eq!(
        report.target.unwrap().file_name().unwrap(),
        "SAMPLE_DISC (1).iso"
    );

    let (device, _) = ScriptedDevice::new(vec![Ok(vec![0; 1000])]);
    let report = copy::copy_stream(
        device,
        None,
        dir.path(),
        &CopyOptions::default(),
        |path: &Path| File::create(path),
        |_| {},
    )
    .unwrap();
    let name = report.target.unwrap();
    let name = name.file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("DiscCopier_"), "{name}");
    assert!(name.ends_with(".iso"));
}

#[test]
fn missing_device_fails_before_any_output() {
    let dir = tempfile::tempdir().unwrap();
    let drive = Drive {
        name: "Z:".to_string(),
        root: PathBuf::from("Z:\\"),
        device_path: dir.path().join("no-such-device"),
        kind: DriveKind::Optical,
        total_size: Some(3 * MIB as u64),
        label: None,
        ready: true,
    };

    let mut started = false;
    let failure = copy::run(&drive, dir.path(), &CopyOptions::default(), |event| {
        if let CopyEvent::Started { device, total_size } = event {
            assert_eq!(device, drive.device_path.as_path());
            assert_eq!(total_size, Some(3 * MIB as u64));
            started = true;
        }
    })
    .unwrap_err();

    assert!(started);
    assert!(matches!(failure.error, CopyError::DeviceOpen { .. }));
    assert!(failure.error.is_before_output());
    assert_eq!(failure.report.bytes_read, 0);
    assert_eq!(failure.report.target, None);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn copies_from_an_image_file_through_the_raw_reader() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.bin");
    let mut data = labelled_block("FROM_FILE");
    data.extend_from_slice(&[9u8; 12_345]);
    fs::write(&source, &data).unwrap();

    let out = dir.path().join("out");
    fs::create_dir(&out).unwrap();
    let drive = Drive {
        name: "sr9".to_string(),
        root: PathBuf::new(),
        device_path: source,
        kind: DriveKind::Optical,
        total_size: Some(data.len() as u64),
        label: None,
        ready: true,
    };

    let report = copy::run(&drive, &out, &CopyOptions::default(), |_| {}).unwrap();
    assert_eq!(report.bytes_written, data.len() as u64);
    assert_eq!(fs::read(out.join("FROM_FILE.iso")).unwrap(), data);
}

#[test]
fn write_error_keeps_partial_image() {
    let dir = tempfile::tempdir().unwrap();
    let block = 4096;
    let (device, device_released) = ScriptedDevice::new(vec![
        Ok(vec![1; block]),
        Ok(vec![2; block]),
        Ok(vec![3; block]),
    ]);
    let tracking = Tracking::new();
    let options = CopyOptions {
        buffer_size: block,
        ..CopyOptions::default()
    };
    let faults = SinkFaults {
        write_call: Some(2),
        ..SinkFaults::default()
    };

    let failure = copy::copy_stream(
        device,
        Some(3 * block as u64),
        dir.path(),
        &options,
        tracking.faulty_opener(faults),
        |_| {},
    )
    .unwrap_err();

    assert!(matches!(failure.error, CopyError::SinkWrite { .. }));
    assert!(!failure.error.is_before_output());
    assert_eq!(failure.report.bytes_read, 2 * block as u64);
    assert_eq!(failure.report.bytes_written, block as u64);
    assert_eq!(failure.report.percent(), Some(33));
    assert!(device_released.get());
    assert!(tracking.released.get());
    // The final flush still runs on the failure path.
    assert_eq!(tracking.syncs(), vec![block as u64]);

    let target = failure.report.target.unwrap();
    assert_eq!(fs::read(target).unwrap(), vec![1; block]);
}

#[test]
fn failed_final_flush_fails_the_copy() {
    let dir = tempfile::tempdir().unwrap();
    let (device, device_released) = ScriptedDevice::new(vec![Ok(vec![4; 2048])]);
    let tracking = Tracking::new();
    let faults = SinkFaults {
        sync: true,
        ..SinkFaults::default()
    };

    let failure = copy::copy_stream(
        device,
        Some(2048),
        dir.path(),
        &CopyOptions::default(),
        tracking.faulty_opener(faults),
        |_| {},
    )
    .unwrap_err();

    match &failure.error {
        CopyError::SinkWrite { path, source } => {
            assert_eq!(Some(path), failure.report.target.as_ref());
            assert_eq!(source.to_string(), "sync failed");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(failure.report.bytes_written, 2048);
    assert!(device_released.get());
    assert!(tracking.released.get());
}

#[test]
fn periodic_flush_failure_stops_the_copy() {
    let dir = tempfile::tempdir().unwrap();
    let block = 1024;
    let (device, _) = ScriptedDevice::new((0..4u8).map(|i| Ok(vec![i; block])).collect());
    let tracking = Tracking::new();
    let options = CopyOptions {
        buffer_size: block,
        flush_interval: block as u64,
        ..CopyOptions::default()
    };
    let faults = SinkFaults {
        sync: true,
        ..SinkFaults::default()
    };

    let failure = copy::copy_stream(
        device,
        None,
        dir.path(),
        &options,
        tracking.faulty_opener(faults),
        |_| {},
    )
    .unwrap_err();

    assert!(matches!(failure.error, CopyError::SinkWrite { .. }));
    assert_eq!(failure.report.bytes_read, block as u64);
    assert_eq!(failure.report.bytes_written, block as u64);
    // The periodic flush at 1 KiB, then the final flush during cleanup.
    assert_eq!(tracking.syncs(), vec![block as u64, block as u64]);
}
