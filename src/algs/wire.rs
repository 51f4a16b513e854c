//! Typed exchange buffers on the wire.
//!
//! Builder and engine agree only on buffer length and element type, both
//! fixed by the static pass tables, so a buffer travels as its native byte
//! image without any header.

use std::ops::AddAssign;

use bytemuck::Pod;
use num_traits::Zero;

use crate::halo_error::HaloError;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Numeric field value that can be exchanged and accumulated.
pub trait HaloScalar: Pod + Zero + AddAssign + Send + 'static {
    /// Short name used in log lines.
    const NAME: &'static str;
}

impl HaloScalar for f64 {
    const NAME: &'static str = "double";
}

impl HaloScalar for f32 {
    const NAME: &'static str = "float";
}

/// Zero-filled buffer of `len` values, allocated fallibly.
pub fn zeroed_buffer<T: HaloScalar>(len: usize) -> Result<Vec<T>, HaloError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| HaloError::Allocation {
        bytes: len.saturating_mul(std::mem::size_of::<T>()),
    })?;
    buf.resize(len, T::zero());
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_image_has_native_width() {
        let v = [1.5f32, -2.0];
        assert_eq!(cast_slice(&v).len(), 8);
        let buf: Vec<f64> = zeroed_buffer(3).unwrap();
        assert_eq!(buf, vec![0.0; 3]);
    }

    #[test]
    fn impossible_allocation_is_an_error() {
        let err = zeroed_buffer::<f64>(usize::MAX / 2).unwrap_err();
        assert!(matches!(err, HaloError::Allocation { .. }));
    }
}
