//! The four element kinds the harness sweeps over.
//!
//! Every operation is written once against [`Scalar`]; the harness picks
//! the concrete type at runtime from an [`ElementType`].

use num_complex::{Complex, Complex32, Complex64};
use num_traits::{One, Zero};
use rand::Rng;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// Runtime tag for an element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Real single precision
    F32,
    /// Real double precision
    F64,
    /// Complex single precision
    C32,
    /// Complex double precision
    C64,
}

impl ElementType {
    /// All four element kinds, in sweep order
    pub const ALL: [ElementType; 4] = [
        ElementType::F32,
        ElementType::F64,
        ElementType::C32,
        ElementType::C64,
    ];

    #[inline]
    pub fn is_complex(&self) -> bool {
        matches!(self, ElementType::C32 | ElementType::C64)
    }

    #[inline]
    pub fn is_double(&self) -> bool {
        matches!(self, ElementType::F64 | ElementType::C64)
    }

    /// Machine epsilon of the underlying real type
    pub fn epsilon(&self) -> f64 {
        if self.is_double() {
            f64::EPSILON
        } else {
            f32::EPSILON as f64
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElementType::F32 => "Float32",
            ElementType::F64 => "Float64",
            ElementType::C32 => "ComplexF32",
            ElementType::C64 => "ComplexF64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Numeric element usable by both providers
pub trait Scalar:
    Copy
    + Send
    + Sync
    + fmt::Debug
    + PartialEq
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + 'static
{
    const ELEMENT: ElementType;

    /// Complex conjugate; identity for real types
    fn conj(self) -> Self;

    /// Modulus, widened to f64
    fn modulus(self) -> f64;

    /// Embed a real number
    fn from_real(x: f64) -> Self;

    /// Widen to a double precision complex
    fn to_c64(self) -> Complex64;

    /// Uniform sample in [0, 1) for each real component
    fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self;
}

macro_rules! impl_real_scalar {
    ($t:ty, $tag:expr) => {
        impl Scalar for $t {
            const ELEMENT: ElementType = $tag;

            #[inline]
            fn conj(self) -> Self {
                self
            }

            #[inline]
            fn modulus(self) -> f64 {
                <$t>::abs(self) as f64
            }

            #[inline]
            fn from_real(x: f64) -> Self {
                x as $t
            }

            #[inline]
            fn to_c64(self) -> Complex64 {
                Complex64::new(self as f64, 0.0)
            }

            fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
                rng.gen::<$t>()
            }
        }
    };
}

macro_rules! impl_complex_scalar {
    ($t:ty, $re:ty, $tag:expr) => {
        impl Scalar for $t {
            const ELEMENT: ElementType = $tag;

            #[inline]
            fn conj(self) -> Self {
                Complex::conj(&self)
            }

            #[inline]
            fn modulus(self) -> f64 {
                Complex::norm(self) as f64
            }

            #[inline]
            fn from_real(x: f64) -> Self {
                Complex::new(x as $re, 0.0)
            }

            #[inline]
            fn to_c64(self) -> Complex64 {
                Complex64::new(self.re as f64, self.im as f64)
            }

            fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
                Complex::new(rng.gen::<$re>(), rng.gen::<$re>())
            }
        }
    };
}

impl_real_scalar!(f32, ElementType::F32);
impl_real_scalar!(f64, ElementType::F64);
impl_complex_scalar!(Complex32, f32, ElementType::C32);
impl_complex_scalar!(Complex64, f64, ElementType::C64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conj_real_is_identity() {
        assert_eq!(Scalar::conj(2.5f64), 2.5);
        assert_eq!(Scalar::conj(-1.0f32), -1.0);
    }

    #[test]
    fn test_conj_complex_flips_imag() {
        let z = Complex64::new(1.0, 2.0);
        assert_eq!(Scalar::conj(z), Complex64::new(1.0, -2.0));
        assert_eq!(Scalar::modulus(Complex32::new(3.0, 4.0)), 5.0);
    }

    #[test]
    fn test_element_properties() {
        assert!(ElementType::C32.is_complex());
        assert!(!ElementType::F64.is_complex());
        assert!(ElementType::C64.is_double());
        assert_eq!(<Complex32 as Scalar>::ELEMENT, ElementType::C32);
        assert_eq!(ElementType::F32.to_string(), "Float32");
    }
}
