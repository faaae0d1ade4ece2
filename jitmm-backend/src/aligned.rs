//! Owned, alignment-guaranteed buffers.
//!
//! Kernels compiled with alignment flags assume their operands sit on the
//! target's preferred boundary. [`AlignedBuf`] provides an owned,
//! zero-initialized allocation on that boundary so a retained operand copy
//! is always a legal argument for such kernels, independent of how the
//! caller's original buffer was allocated.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use jitmm_descriptor::Element;

use crate::BackendError;

/// Owned, 64-byte-aligned, zero-initialized buffer of elements.
pub struct AlignedBuf<T> {
    ptr: NonNull<T>,
    len: usize,
}

impl<T: Element> AlignedBuf<T> {
    /// Preferred boundary: one cache line, which also covers the widest
    /// vector loads the reference targets use.
    pub const ALIGNMENT: usize = 64;

    /// Allocate `len` zeroed elements. The all-zero bit pattern is the
    /// zero value for both supported element types.
    pub fn zeroed(len: usize) -> Result<Self, BackendError> {
        if len == 0 {
            return Ok(AlignedBuf {
                ptr: NonNull::dangling(),
                len: 0,
            });
        }
        let layout = Self::layout(len)?;
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr =
            NonNull::new(raw.cast::<T>()).ok_or(BackendError::Allocation(layout.size()))?;
        Ok(AlignedBuf { ptr, len })
    }

    fn layout(len: usize) -> Result<Layout, BackendError> {
        let size = len
            .checked_mul(std::mem::size_of::<T>())
            .ok_or(BackendError::Allocation(usize::MAX))?;
        Layout::from_size_align(size, Self::ALIGNMENT.max(std::mem::align_of::<T>()))
            .map_err(|_| BackendError::Allocation(size))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Element> Drop for AlignedBuf<T> {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        if let Ok(layout) = Self::layout(self.len) {
            unsafe { dealloc(self.ptr.as_ptr().cast(), layout) };
        }
    }
}

// The buffer is exclusively owned; T is Send + Sync by the Element bound.
unsafe impl<T: Element> Send for AlignedBuf<T> {}
unsafe impl<T: Element> Sync for AlignedBuf<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_and_zero_fill() {
        let buf = AlignedBuf::<f64>::zeroed(37).unwrap();
        assert_eq!(buf.as_ptr() as usize % AlignedBuf::<f64>::ALIGNMENT, 0);
        assert_eq!(buf.len(), 37);
        assert!(buf.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_empty_buffer() {
        let buf = AlignedBuf::<f32>::zeroed(0).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.as_slice().len(), 0);
    }

    #[test]
    fn test_write_through_slice() {
        let mut buf = AlignedBuf::<f32>::zeroed(8).unwrap();
        buf.as_mut_slice()[3] = 1.5;
        assert_eq!(buf.as_slice()[3], 1.5);
        assert_eq!(buf.as_slice()[2], 0.0);
    }
}
