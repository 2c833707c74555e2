use crate::error::{Result, TsIndexError};
use crate::format::ts::types::TS_PACKET_BITS;
use crate::format::ts::{PacketReader, TsPacket};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::path::Path;

/// Packet totals and peak windowed bitrate of one PID.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PidRate {
    pub packet_count: u64,
    /// `None` if the stream ended before the first window closed
    pub max_bitrate: Option<f64>,
}

#[derive(Debug, Default)]
struct PidCounter {
    window: u64,
    total: u64,
    max_bitrate: Option<f64>,
}

/// Windowed per-PID bitrate estimator over a constant-bitrate time base.
///
/// Every packet advances a synthetic clock by `188 * 8 / overall_bitrate`
/// seconds. Once the clock passes the window length, each PID's rate for the
/// window is folded into its maximum and the window restarts. The result is
/// only as good as the constant-bitrate assumption.
#[derive(Debug)]
pub struct PerPidRateSampler {
    dt: f64,
    window_secs: f64,
    elapsed: f64,
    windows: u64,
    pids: BTreeMap<u16, PidCounter>,
}

impl PerPidRateSampler {
    pub fn new(overall_bitrate: f64, window_secs: f64) -> Result<Self> {
        if !(overall_bitrate.is_finite() && overall_bitrate > 0.0) {
            return Err(TsIndexError::InvalidData(format!(
                "overall bitrate must be positive, got {}",
                overall_bitrate
            )));
        }
        if !(window_secs.is_finite() && window_secs > 0.0) {
            return Err(TsIndexError::InvalidData(format!(
                "rate window must be positive, got {}",
                window_secs
            )));
        }
        Ok(Self {
            dt: TS_PACKET_BITS / overall_bitrate,
            window_secs,
            elapsed: 0.0,
            windows: 0,
            pids: BTreeMap::new(),
        })
    }

    /// Counts one packet of `pid` and closes the window if it has elapsed.
    pub fn push(&mut self, pid: u16) {
        let counter = self.pids.entry(pid).or_default();
        counter.window += 1;
        counter.total += 1;
        self.elapsed += self.dt;

        if self.elapsed > self.window_secs {
            self.close_window();
        }
    }

    pub fn push_packet(&mut self, packet: &TsPacket<'_>) {
        self.push(packet.pid());
    }

    fn close_window(&mut self) {
        for counter in self.pids.values_mut() {
            let rate = (counter.window as f64 * TS_PACKET_BITS) / self.elapsed;
            counter.max_bitrate = Some(counter.max_bitrate.map_or(rate, |max| max.max(rate)));
            counter.window = 0;
        }
        self.elapsed = 0.0;
        self.windows += 1;
    }

    /// Number of windows closed so far.
    pub fn windows(&self) -> u64 {
        self.windows
    }

    /// Drops any partial window and returns the per-PID results.
    pub fn finish(self) -> BTreeMap<u16, PidRate> {
        self.pids
            .into_iter()
            .map(|(pid, counter)| {
                (
                    pid,
                    PidRate {
                        packet_count: counter.total,
                        max_bitrate: counter.max_bitrate,
                    },
                )
            })
            .collect()
    }
}

/// Samples every validated packet from `reader`.
pub fn sample_reader<R: Read + Seek>(
    reader: &mut PacketReader<R>,
    overall_bitrate: f64,
    window_secs: f64,
) -> Result<BTreeMap<u16, PidRate>> {
    let mut sampler = PerPidRateSampler::new(overall_bitrate, window_secs)?;
    while let Some(buf) = reader.read_validated_packet()? {
        sampler.push_packet(&TsPacket::new(&buf));
    }
    debug!(
        "closed {} rate windows, {} sync losses",
        sampler.windows(),
        reader.sync_losses()
    );
    let rates = sampler.finish();
    info!("sampled rates for {} pids", rates.len());
    Ok(rates)
}

/// Opens `path` and computes per-PID packet counts and max bitrates.
pub fn calculate_max_bitrates<P: AsRef<Path>>(
    path: P,
    overall_bitrate: f64,
    window_secs: f64,
) -> Result<BTreeMap<u16, PidRate>> {
    let mut reader = PacketReader::open(path)?;
    sample_reader(&mut reader, overall_bitrate, window_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_share() {
        // 10 packets per second; windows close after 11 packets.
        let bitrate = TS_PACKET_BITS * 10.0;
        let mut sampler = PerPidRateSampler::new(bitrate, 1.0).unwrap();
        for i in 0..110 {
            sampler.push(if i % 2 == 0 { 0x100 } else { 0x101 });
        }
        assert_eq!(sampler.windows(), 10);

        let rates = sampler.finish();
        assert_eq!(rates[&0x100].packet_count, 55);
        assert_eq!(rates[&0x101].packet_count, 55);
        let max = rates[&0x100].max_bitrate.unwrap();
        // 6 of 11 packets in the best window, over 1.1 s.
        assert!((max - 6.0 * TS_PACKET_BITS / 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_no_closed_window() {
        let mut sampler = PerPidRateSampler::new(1_000_000.0, 1.0).unwrap();
        sampler.push(0x42);
        let rates = sampler.finish();
        assert_eq!(
            rates[&0x42],
            PidRate {
                packet_count: 1,
                max_bitrate: None
            }
        );
    }

    #[test]
    fn test_burst_sets_max() {
        let bitrate = TS_PACKET_BITS * 4.0;
        let mut sampler = PerPidRateSampler::new(bitrate, 1.0).unwrap();
        // window 1: five packets of 0x10; window 2: one 0x10 and four 0x11
        for pid in [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x11, 0x11, 0x11, 0x11] {
            sampler.push(pid);
        }
        let rates = sampler.finish();
        let window = 5.0 * TS_PACKET_BITS / bitrate;
        assert!((rates[&0x10].max_bitrate.unwrap() - 5.0 * TS_PACKET_BITS / window).abs() < 1e-6);
        assert!((rates[&0x11].max_bitrate.unwrap() - 4.0 * TS_PACKET_BITS / window).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(PerPidRateSampler::new(0.0, 1.0).is_err());
        assert!(PerPidRateSampler::new(f64::NAN, 1.0).is_err());
        assert!(PerPidRateSampler::new(1e6, 0.0).is_err());
    }
}
