use crate::arch::{ArchDispatcher, DeviceLimits, KernelVariant};
use crate::config::GemmConfig;
use crate::error::Result;

/// Dynamic shared memory a kernel may use without opting in.
const DEFAULT_SHARED_MEMORY_LIMIT: usize = 48 << 10;

/// Maximum number of threadblocks of `variant` resident on one multiprocessor.
///
/// Zero means the device cannot run the variant at all.
pub fn max_active_blocks(variant: &KernelVariant, limits: &DeviceLimits) -> u32 {
    let smem = variant.shared_memory_bytes();
    if smem > DEFAULT_SHARED_MEMORY_LIMIT && smem >= limits.max_shared_memory_per_block_optin {
        return 0;
    }

    let threads = variant.thread_count();
    if threads == 0 || threads > limits.max_threads_per_sm {
        return 0;
    }

    let by_threads = limits.max_threads_per_sm / threads;
    let by_smem = if smem == 0 {
        usize::MAX
    } else {
        limits.max_shared_memory_per_sm / smem
    };
    let by_registers = limits.max_registers_per_sm / (variant.registers_per_thread() * threads);

    by_threads
        .min(by_smem)
        .min(by_registers)
        .min(limits.max_blocks_per_sm) as u32
}

/// Analytic occupancy of every candidate, in candidate order.
///
/// Each candidate is resolved through the dispatcher first, so an illegal
/// entry fails the whole probe instead of being skipped.
pub fn probe_candidates(
    dispatcher: &ArchDispatcher,
    candidates: &[GemmConfig],
    limits: &DeviceLimits,
) -> Result<Vec<u32>> {
    probe_candidates_with(dispatcher, candidates, |variant| {
        max_active_blocks(variant, limits)
    })
}

/// [`probe_candidates`] with a caller-supplied occupancy source.
pub fn probe_candidates_with<F>(
    dispatcher: &ArchDispatcher,
    candidates: &[GemmConfig],
    mut occupancy_of: F,
) -> Result<Vec<u32>>
where
    F: FnMut(&KernelVariant) -> u32,
{
    candidates
        .iter()
        .map(|config| {
            let variant = dispatcher.resolve(config)?;
            let occupancy = occupancy_of(&variant);
            tracing::trace!(
                tile = %config.tile_config,
                stages = config.stages,
                smem = variant.shared_memory_bytes(),
                occupancy,
                "probed candidate"
            );
            if occupancy == 0 {
                tracing::warn!(
                    tile = %config.tile_config,
                    stages = config.stages,
                    "candidate excluded: zero occupancy"
                );
            }
            Ok(occupancy)
        })
        .collect()
}
