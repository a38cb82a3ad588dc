//! Typed port descriptors and the tensors that flow between them.

use serde::{Deserialize, Serialize};

/// Primitive numeric element kinds a port can carry.
///
/// `F64` is what the original worked examples use throughout; the other
/// kinds are reserved so wire codecs built on top of this crate don't have
/// to fork when a plugin wants a different element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElemType {
    F32,
    F64,
    I32,
    I64,
    U8,
}

impl ElemType {
    /// Size in bytes of a single element of this kind.
    pub fn size_bytes(self) -> usize {
        match self {
            ElemType::F32 | ElemType::I32 => 4,
            ElemType::F64 | ElemType::I64 => 8,
            ElemType::U8 => 1,
        }
    }
}

impl std::fmt::Display for ElemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElemType::F32 => "f32",
            ElemType::F64 => "f64",
            ElemType::I32 => "i32",
            ElemType::I64 => "i64",
            ElemType::U8 => "u8",
        };
        f.write_str(name)
    }
}

/// A finite, non-empty tuple of positive integers describing a tensor's
/// rectangular extent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Construct a shape. Panics if `dims` is empty or contains a zero —
    /// both are programmer errors at plugin-declaration time, not runtime
    /// conditions a caller can recover from.
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        let dims = dims.into();
        assert!(!dims.is_empty(), "shape must be non-empty");
        assert!(dims.iter().all(|&d| d > 0), "shape dims must be positive");
        Self(dims)
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Total element count, Π(shape).
    pub fn element_count(&self) -> usize {
        self.0.iter().product()
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, ")")
    }
}

/// An immutable `(shape, elem_type)` record describing a single input or
/// output slot on a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub shape: Shape,
    pub elem_type: ElemType,
}

impl PortDescriptor {
    pub fn new(shape: Shape, elem_type: ElemType) -> Self {
        Self { shape, elem_type }
    }

    /// Size in bytes this descriptor's backing region would require:
    /// Π(shape) · sizeof(elem_type).
    pub fn size_bytes(&self) -> usize {
        self.shape.element_count() * self.elem_type.size_bytes()
    }

    /// Two descriptors are compatible iff shape and element type are
    /// element-wise equal. No implicit broadcast, no coercion.
    pub fn is_compatible_with(&self, other: &PortDescriptor) -> bool {
        self == other
    }
}

impl std::fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.shape, self.elem_type)
    }
}

/// A concrete value flowing through a port: a descriptor plus the raw bytes.
#[derive(Debug, Clone)]
pub struct Tensor {
    descriptor: PortDescriptor,
    bytes: Vec<u8>,
}

impl Tensor {
    /// Build a tensor by copying `bytes` verbatim. Panics if the byte count
    /// doesn't match `descriptor.size_bytes()` — constructing a
    /// mis-sized tensor is always a programmer error, never a recoverable
    /// runtime condition.
    pub fn from_bytes(descriptor: PortDescriptor, bytes: Vec<u8>) -> Self {
        assert_eq!(
            bytes.len(),
            descriptor.size_bytes(),
            "tensor byte length does not match descriptor"
        );
        Self { descriptor, bytes }
    }

    /// Build an f64 tensor from a flat slice of values, for callers that
    /// want to work with typed data rather than raw bytes.
    pub fn from_f64(shape: Shape, values: &[f64]) -> Self {
        assert_eq!(
            values.len(),
            shape.element_count(),
            "value count does not match shape"
        );
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            descriptor: PortDescriptor::new(shape, ElemType::F64),
            bytes,
        }
    }

    pub fn descriptor(&self) -> &PortDescriptor {
        &self.descriptor
    }

    pub fn shape(&self) -> &Shape {
        &self.descriptor.shape
    }

    pub fn elem_type(&self) -> ElemType {
        self.descriptor.elem_type
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Interpret the tensor's bytes as f64 values. Panics if `elem_type` is
    /// not `F64` — callers that need generic access should use `as_bytes`.
    pub fn as_f64(&self) -> Vec<f64> {
        assert_eq!(self.descriptor.elem_type, ElemType::F64);
        self.bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }
}
