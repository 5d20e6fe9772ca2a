use super::ArchitectureTier;
use crate::error::{MoeGemmError, Result};

/// Per-multiprocessor resource limits used by the occupancy prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_shared_memory_per_sm: usize,
    /// Largest dynamic shared-memory allocation a block may opt into.
    pub max_shared_memory_per_block_optin: usize,
    pub max_registers_per_sm: usize,
    pub max_threads_per_sm: usize,
    pub max_blocks_per_sm: usize,
}

impl DeviceLimits {
    /// Published limits for a compute capability.
    ///
    /// Unlisted versions inside a supported band use the band's base part.
    pub fn for_sm_version(sm_version: u32) -> Result<Self> {
        let tier = ArchitectureTier::from_sm_version(sm_version)?;
        let limits = match (sm_version, tier) {
            (86, _) => Self::with_smem(100, 99, 1536, 16),
            (87, _) => Self::with_smem(164, 163, 2048, 16),
            (89, _) => Self::with_smem(100, 99, 1536, 24),
            (_, ArchitectureTier::Volta) => Self::with_smem(96, 96, 2048, 32),
            (_, ArchitectureTier::Turing) => Self::with_smem(64, 64, 1024, 16),
            (_, ArchitectureTier::Ampere) => Self::with_smem(164, 163, 2048, 32),
        };
        Ok(limits)
    }

    const fn with_smem(per_sm_kib: usize, optin_kib: usize, threads: usize, blocks: usize) -> Self {
        Self {
            max_shared_memory_per_sm: per_sm_kib << 10,
            max_shared_memory_per_block_optin: optin_kib << 10,
            max_registers_per_sm: 64 << 10,
            max_threads_per_sm: threads,
            max_blocks_per_sm: blocks,
        }
    }
}

/// Immutable description of the target device.
///
/// Created once at initialization and shared by reference; calls from many
/// host threads may use the same context concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceContext {
    sm_version: u32,
    tier: ArchitectureTier,
    multi_processor_count: u32,
    limits: DeviceLimits,
}

impl DeviceContext {
    /// Build a context from queried device properties.
    ///
    /// Fails with [`MoeGemmError::UnsupportedArchitecture`] outside the
    /// supported compute-capability bands.
    pub fn new(sm_version: u32, multi_processor_count: u32, limits: DeviceLimits) -> Result<Self> {
        let tier = ArchitectureTier::from_sm_version(sm_version)?;
        if multi_processor_count == 0 {
            return Err(MoeGemmError::Resource(
                "device reports zero multiprocessors".to_string(),
            ));
        }
        Ok(Self {
            sm_version,
            tier,
            multi_processor_count,
            limits,
        })
    }

    /// Context with the published limits of `sm_version`.
    pub fn for_sm_version(sm_version: u32, multi_processor_count: u32) -> Result<Self> {
        Self::new(
            sm_version,
            multi_processor_count,
            DeviceLimits::for_sm_version(sm_version)?,
        )
    }

    pub fn sm_version(&self) -> u32 {
        self.sm_version
    }

    pub fn tier(&self) -> ArchitectureTier {
        self.tier
    }

    pub fn multi_processor_count(&self) -> u32 {
        self.multi_processor_count
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }
}
