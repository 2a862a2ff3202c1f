//! Crate-wide error taxonomy.
//!
//! Fallible construction paths return [`Error`]; the hot read/write paths never do (see
//! `memory::AddressSpace`). Conditions that the rest of the corpus treats as abort-worthy still
//! flow through a typed value here so tests and tooling observe them instead of a bare panic.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("region `{0}` size {1:#x} is not a multiple of the host allocation granularity")]
    UnalignedRegionSize(String, usize),

    #[error("could not reserve a {0:#x}-byte host address space window")]
    AddressSpaceReservation(usize),

    #[error("region handle table exhausted (capacity {0})")]
    RegionTableFull(usize),

    #[error("unknown region `{0}`")]
    UnknownRegion(String),

    #[error("address {0:#010x} does not resolve to a physical region")]
    NotPhysical(u32),

    #[error("block copy of {0} bytes is not a multiple of 4")]
    MisalignedBlockCopy(usize),

    #[error("cannot block-copy MMIO to MMIO")]
    MmioToMmioCopy,

    #[error("timer pool exhausted (capacity {0})")]
    TimerPoolFull(usize),

    #[error("texture cache exhausted (capacity {0})")]
    TextureCacheFull(usize),

    #[error("{0}")]
    Fatal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Logs `error!` and aborts the process. Reserved for conditions §7 classifies as
/// configuration-time or runtime fatal: continuing would violate an invariant the rest of the
/// core relies on.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
        std::process::abort();
    }};
}
