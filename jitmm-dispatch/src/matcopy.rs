//! Safe front end for the matrix-copy kernel family.

use jitmm_backend::CodegenBackend;
use jitmm_descriptor::MatcopyDescriptor;

use crate::{DispatchError, KernelCache};

/// Errors from the copy front end.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatcopyError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("no copy kernel available for this descriptor")]
    NoKernel,
    #[error("source operand required unless zero-fill is set")]
    MissingSource,
    #[error("source holds {len} bytes but the shape needs {needed}")]
    ShortSource { needed: usize, len: usize },
    #[error("destination holds {len} bytes but the shape needs {needed}")]
    ShortDestination { needed: usize, len: usize },
}

fn extent_bytes(rows: u32, row_len: u32, stride: u32, typesize: u32) -> usize {
    ((rows as usize - 1) * stride as usize + row_len as usize) * typesize as usize
}

/// Copy (or zero-fill) the logical `m x n` region described by `desc` from
/// `src` into `dst`, dispatching the kernel through `cache`.
///
/// Buffers are byte slices; `desc.typesize()` fixes the element width.
/// `src` is ignored (and may be `None`) when the descriptor requests
/// zero-fill. Bytes in the destination's leading-dimension padding are
/// never touched.
pub fn matcopy_into<B: CodegenBackend>(
    cache: &KernelCache<B>,
    desc: &MatcopyDescriptor,
    src: Option<&[u8]>,
    dst: &mut [u8],
) -> Result<(), MatcopyError> {
    if desc.m() == 0 || desc.n() == 0 {
        return Ok(());
    }

    let needed_dst = extent_bytes(desc.n(), desc.m(), desc.ldo(), desc.typesize());
    if dst.len() < needed_dst {
        return Err(MatcopyError::ShortDestination {
            needed: needed_dst,
            len: dst.len(),
        });
    }

    let src_ptr = if desc.zero_source() {
        std::ptr::null()
    } else {
        let src = src.ok_or(MatcopyError::MissingSource)?;
        let needed_src = extent_bytes(desc.n(), desc.m(), desc.ldi(), desc.typesize());
        if src.len() < needed_src {
            return Err(MatcopyError::ShortSource {
                needed: needed_src,
                len: src.len(),
            });
        }
        src.as_ptr()
    };

    let kernel = cache
        .dispatch_matcopy(desc)?
        .ok_or(MatcopyError::NoKernel)?;
    let copy = kernel.as_matcopy().ok_or(DispatchError::KernelType)?;

    // Extents validated above; src and dst cannot alias across & and &mut.
    unsafe { copy.call(src_ptr, dst.as_mut_ptr()) };
    Ok(())
}
