//! Rolling throughput and ETA estimation over a ring of time snapshots.
//!
//! The estimator keeps one elapsed-time value per slot of a fixed ring. Each
//! update visits the next slot, and the time since that slot was last visited
//! (one full lap of the ring ago) is taken as the measurement window. This is
//! an approximation of a sliding window with constant memory and update cost,
//! no matter how long the transfer runs.
use std::fmt;
use std::time::Duration;

/// Number of slots in the snapshot ring.
pub const TIME_SNAPSHOTS: usize = 128;

/// One progress sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Bytes read so far.
    pub bytes_read: u64,
    /// Total size of the disc, if known.
    pub total_size: Option<u64>,
    /// Bytes counted in the measurement window.
    pub window_bytes: u64,
    /// Duration of the measurement window.
    pub window_elapsed: Duration,
    /// Bytes per microsecond (equivalently, MB/s). `None` for an empty window.
    pub throughput: Option<f64>,
    /// Time left at the current rate, rounded down to whole seconds.
    pub eta: Option<Duration>,
    /// `floor(100 * bytes_read / total_size)`. `None` if the size is unknown or zero.
    pub percent: Option<u64>,
}

/// Computes `floor(100 * bytes / total)`, or `None` for an unknown or zero total.
pub fn percent_of(bytes: u64, total: Option<u64>) -> Option<u64> {
    match total {
        Some(total) if total > 0 => Some((100 * u128::from(bytes) / u128::from(total)) as u64),
        _ => None,
    }
}

/// Formats a duration as `hh:mm:ss`.
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// The ring of time snapshots for one copy session.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    buffer_size: u64,
    total_size: Option<u64>,
    /// Elapsed milliseconds accounted for up to each slot's last visit.
    times: [Option<u64>; TIME_SNAPSHOTS],
    cursor: usize,
}

impl ProgressEstimator {
    pub fn new(buffer_size: usize, total_size: Option<u64>) -> Self {
        Self {
            buffer_size: buffer_size as u64,
            total_size,
            times: [None; TIME_SNAPSHOTS],
            cursor: 0,
        }
    }

    /// Records that `bytes_read` bytes have been read in total, the last
    /// `chunk` of them by the latest read, `elapsed` after the session started.
    pub fn update(&mut self, bytes_read: u64, chunk: usize, elapsed: Duration) -> ProgressSnapshot {
        let elapsed_ms = elapsed.as_millis() as u64;
        let slot = &mut self.times[self.cursor];

        let (window_bytes, window_ms) = match *slot {
            None => {
                *slot = Some(elapsed_ms);
                (bytes_read, elapsed_ms)
            }
            Some(accounted) => {
                let window_ms = elapsed_ms.saturating_sub(accounted);
                *slot = Some(accounted + window_ms);
                (
                    self.buffer_size * (TIME_SNAPSHOTS as u64 - 1) + chunk as u64,
                    window_ms,
                )
            }
        };
        self.cursor = (self.cursor + 1) % TIME_SNAPSHOTS;

        let throughput = (window_ms > 0).then(|| window_bytes as f64 / (window_ms as f64 * 1000.0));

        let eta = match self.total_size {
            Some(total) if window_bytes > 0 => {
                let remaining = total.saturating_sub(bytes_read);
                let eta_ms =
                    u128::from(window_ms) * u128::from(remaining) / u128::from(window_bytes);
                Some(Duration::from_secs((eta_ms / 1000) as u64))
            }
            _ => None,
        };

        ProgressSnapshot {
            bytes_read,
            total_size: self.total_size,
            window_bytes,
            window_elapsed: Duration::from_millis(window_ms),
            throughput,
            eta,
            percent: percent_of(bytes_read, self.total_size),
        }
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Written {}", self.bytes_read)?;
        match self.total_size {
            Some(total) => write!(f, " / {total} bytes")?,
            None => write!(f, " bytes")?,
        }
        if let Some(percent) = self.percent {
            write!(f, " ({percent}%)")?;
        }
        if let Some(throughput) = self.throughput {
            write!(f, " {throughput:.2} MB/s")?;
        }
        if let Some(eta) = self.eta {
            write!(f, ", ETA {}", format_eta(eta))?;
        }
        Ok(())
    }
}
