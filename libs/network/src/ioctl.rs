//! Runtime-tunable channel settings
//!
//! IOCtl codes change a live channel without reconnecting. Buffer limits are
//! applied to the channel's [`BufferPool`]; the rest live in
//! [`ChannelSettings`], read by the writer on every submission.

use crate::transports::BufferPool;
use crate::{Result, TransportError};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Recognised IOCtl codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum IoctlCode {
    /// Upper bound of output buffers for a channel
    MaxNumBuffers = 1,
    /// Output buffers reserved for a channel
    NumGuaranteedBuffers = 2,
    /// Queued bytes that force a flush
    HighWaterMark = 3,
    /// Size of the server-wide shared buffer pool
    ServerNumPoolBuffers = 8,
    /// Smallest message eligible for compression; validated and reported,
    /// frames themselves are sent uncompressed
    CompressionThreshold = 9,
    /// Reset the peak usage counter of the shared pool
    ServerPeakBufReset = 10,
    /// 1 writes on the submitting thread, 0 queues for the writer task
    ReactorChannelDirectWrite = 200,
    /// Fall back to the preferred host now; a non-negative value also selects it
    ReactorChannelPreferredHost = 201,
}

impl IoctlCode {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::MaxNumBuffers,
            2 => Self::NumGuaranteedBuffers,
            3 => Self::HighWaterMark,
            8 => Self::ServerNumPoolBuffers,
            9 => Self::CompressionThreshold,
            10 => Self::ServerPeakBufReset,
            200 => Self::ReactorChannelDirectWrite,
            201 => Self::ReactorChannelPreferredHost,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Codes that apply to a server rather than to one channel
    pub fn is_server_code(self) -> bool {
        matches!(self, Self::ServerNumPoolBuffers | Self::ServerPeakBufReset)
    }
}

impl fmt::Display for IoctlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

impl TryFrom<i32> for IoctlCode {
    type Error = TransportError;

    fn try_from(code: i32) -> Result<Self> {
        Self::from_code(code).ok_or_else(|| {
            TransportError::configuration(format!("unknown IOCtl code {code}"), Some("ioctl"))
        })
    }
}

/// Writer settings shared between the submitting side and the writer task
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    high_water_mark: Arc<AtomicUsize>,
    compression_threshold: Arc<AtomicUsize>,
    direct_write: Arc<AtomicBool>,
}

impl ChannelSettings {
    pub fn new(high_water_mark: usize, compression_threshold: usize, direct_write: bool) -> Self {
        Self {
            high_water_mark: Arc::new(AtomicUsize::new(high_water_mark)),
            compression_threshold: Arc::new(AtomicUsize::new(compression_threshold)),
            direct_write: Arc::new(AtomicBool::new(direct_write)),
        }
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark.load(Ordering::Acquire)
    }

    pub fn compression_threshold(&self) -> usize {
        self.compression_threshold.load(Ordering::Acquire)
    }

    pub fn direct_write(&self) -> bool {
        self.direct_write.load(Ordering::Acquire)
    }

    /// Apply a channel-level code; server and preferred-host codes are handled by the caller
    pub fn apply(&self, code: IoctlCode, value: i64, pool: &BufferPool) -> Result<()> {
        let count = |what: &str| {
            usize::try_from(value).map_err(|_| {
                TransportError::configuration(format!("{what} must not be negative"), Some(what))
            })
        };
        match code {
            IoctlCode::MaxNumBuffers => {
                pool.set_max(count("max_num_buffers")?)?;
            }
            IoctlCode::NumGuaranteedBuffers => {
                pool.set_guaranteed(count("num_guaranteed_buffers")?)?;
            }
            IoctlCode::HighWaterMark => {
                self.high_water_mark
                    .store(count("high_water_mark")?, Ordering::Release);
            }
            IoctlCode::CompressionThreshold => {
                let threshold = count("compression_threshold")?;
                if threshold < 30 {
                    return Err(TransportError::configuration(
                        "compression threshold must be at least 30 bytes",
                        Some("compression_threshold"),
                    ));
                }
                self.compression_threshold.store(threshold, Ordering::Release);
            }
            IoctlCode::ReactorChannelDirectWrite => {
                self.direct_write.store(value != 0, Ordering::Release);
            }
            IoctlCode::ServerNumPoolBuffers
            | IoctlCode::ServerPeakBufReset
            | IoctlCode::ReactorChannelPreferredHost => {
                return Err(TransportError::configuration(
                    format!("{code} is not a channel setting"),
                    Some("ioctl"),
                ));
            }
        }
        Ok(())
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self::new(6144, 30, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_integers() {
        for code in [
            IoctlCode::MaxNumBuffers,
            IoctlCode::NumGuaranteedBuffers,
            IoctlCode::HighWaterMark,
            IoctlCode::ServerNumPoolBuffers,
            IoctlCode::CompressionThreshold,
            IoctlCode::ServerPeakBufReset,
            IoctlCode::ReactorChannelDirectWrite,
            IoctlCode::ReactorChannelPreferredHost,
        ] {
            assert_eq!(IoctlCode::try_from(code.code()).unwrap(), code);
        }
        assert!(IoctlCode::try_from(42).is_err());
        assert!(IoctlCode::ServerNumPoolBuffers.is_server_code());
    }

    #[test]
    fn channel_codes_update_settings_and_pool() {
        let settings = ChannelSettings::default();
        let pool = BufferPool::new("chan", 50, 100);

        settings.apply(IoctlCode::HighWaterMark, 1024, &pool).unwrap();
        settings.apply(IoctlCode::ReactorChannelDirectWrite, 1, &pool).unwrap();
        settings.apply(IoctlCode::NumGuaranteedBuffers, 1, &pool).unwrap();
        settings.apply(IoctlCode::MaxNumBuffers, 2, &pool).unwrap();

        assert_eq!(settings.high_water_mark(), 1024);
        assert!(settings.direct_write());
        assert_eq!(pool.stats().guaranteed, 1);
        assert_eq!(pool.stats().max, 2);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let settings = ChannelSettings::default();
        let pool = BufferPool::new("chan", 1, 1);
        assert!(settings.apply(IoctlCode::HighWaterMark, -1, &pool).is_err());
        assert!(settings.apply(IoctlCode::CompressionThreshold, 10, &pool).is_err());
        assert!(settings
            .apply(IoctlCode::ServerNumPoolBuffers, 10, &pool)
            .is_err());
    }
}
