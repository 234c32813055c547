//! # Kernel Image
//!
//! The compiled-kernel metadata the dispatcher consumes.
//!
//! Compilation and linking happen elsewhere; by the time an image reaches
//! this crate it is a finished artifact: machine code, the compile-time
//! constant pool, the declared parameter list with its current argument
//! values, and an optional compile-time-required group shape.

use ember_core::{Error, Result};

/// VPU instructions are 64 bits; code regions must be a whole number of them.
pub const CODE_ALIGN: usize = 8;

// =============================================================================
// KERNEL PARAMETER
// =============================================================================

/// One explicit kernel parameter
///
/// Parameters are flattened to device words at argument-set time; the
/// element count is the word count. Order in [`KernelImage::params`] is
/// declaration order, which is also the order the words appear in the
/// parameter block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelParam {
    /// Declared parameter name (diagnostics only)
    pub name: String,
    /// Current argument value, flattened to device words
    pub words: Vec<u32>,
}

impl KernelParam {
    /// Scalar parameter helper
    pub fn scalar(name: impl Into<String>, value: u32) -> Self {
        Self {
            name: name.into(),
            words: vec![value],
        }
    }
}

// =============================================================================
// KERNEL IMAGE
// =============================================================================

/// A compiled kernel ready for dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelImage {
    /// Kernel function name (diagnostics only)
    pub name: String,
    /// Machine code bytes, a whole number of instructions
    pub code: Vec<u8>,
    /// Compile-time constant pool referenced by the code
    pub global_data: Vec<u8>,
    /// Explicit parameters in declaration order
    pub params: Vec<KernelParam>,
    /// Compile-time-required group shape; all-zero means unset
    pub required_group: [u32; 3],
}

impl KernelImage {
    /// Basic well-formedness: code exists and is instruction-aligned.
    pub fn validate(&self) -> Result<()> {
        if self.code.is_empty() || self.code.len() % CODE_ALIGN != 0 {
            return Err(Error::InvalidKernel);
        }
        Ok(())
    }

    /// The required group shape, if the compiler fixed one
    pub fn fixed_group(&self) -> Option<[u32; 3]> {
        if self.required_group == [0, 0, 0] {
            None
        } else {
            Some(self.required_group)
        }
    }

    /// Total explicit-parameter words per parameter block
    pub fn param_words(&self) -> usize {
        self.params.iter().map(|p| p.words.len()).sum()
    }
}

// =============================================================================
// TESTS
// =============================================================================
