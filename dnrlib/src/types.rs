//! Primitive data types.

use num_complex::Complex64;

/// Data type for bus indices.
pub type BusIndex = usize;
/// Data type for line indices.
pub type LineIndex = usize;
/// Data type for transformer indices.
pub type TransformerIndex = usize;
/// Data type for period indices in multi-period problems.
pub type PeriodIndex = usize;
/// Data type for objective values and costs.
pub type Cost = f64;
/// Complex quantities: impedance in ohm, power in kVA, voltage in kV, current in A.
pub type Complex = Complex64;
