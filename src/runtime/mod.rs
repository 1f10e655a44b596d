use anyhow::Result;
use std::fmt;
use std::ptr::NonNull;

/// Trait defining the device that backs a graph's arena.
/// The core asks it for raw buffers exactly once per graph lifetime;
/// everything else in the crate works on integer offsets.
pub trait Runtime: fmt::Debug {
    /// Acquires a buffer of `bytes` bytes, aligned for the arena.
    /// A zero-byte request yields a dangling, well-aligned pointer.
    fn alloc(&self, bytes: usize) -> Result<NonNull<u8>>;

    /// Returns a buffer previously handed out by `alloc`.
    ///
    /// # Safety
    /// `ptr` must come from `alloc` on this runtime with the same `bytes`,
    /// and must not be used afterwards.
    unsafe fn dealloc(&self, ptr: NonNull<u8>, bytes: usize);

    /// Human-readable device name.
    fn name(&self) -> &str;
}

pub mod cpu;
