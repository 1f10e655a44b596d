use crate::graph::memory_planner::ARENA_ALIGNMENT;
use crate::runtime::Runtime;
use anyhow::{anyhow, Result};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

/// Host-memory runtime backed by the global allocator.
#[derive(Debug, Default)]
pub struct CPURuntime;

impl Runtime for CPURuntime {
    fn alloc(&self, bytes: usize) -> Result<NonNull<u8>> {
        if bytes == 0 {
            return Ok(NonNull::<u64>::dangling().cast());
        }
        let layout = Layout::from_size_align(bytes, ARENA_ALIGNMENT)?;
        let raw = unsafe { alloc_zeroed(layout) };
        NonNull::new(raw).ok_or_else(|| anyhow!("cpu runtime failed to allocate {bytes} bytes"))
    }

    unsafe fn dealloc(&self, ptr: NonNull<u8>, bytes: usize) {
        if bytes == 0 {
            return;
        }
        let layout = Layout::from_size_align_unchecked(bytes, ARENA_ALIGNMENT);
        dealloc(ptr.as_ptr(), layout);
    }

    fn name(&self) -> &str {
        "cpu"
    }
}
