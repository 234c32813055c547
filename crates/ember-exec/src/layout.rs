//! # Parameter-Block Layout
//!
//! The byte-exact format of the per-lane parameter block.
//!
//! Every lane reads its inputs from one block per batched iteration:
//! thirteen implicit words, the kernel's explicit parameter words in
//! declaration order, and a trailing continue-batch flag. The kernel
//! compiler emits code against this exact word order and bit packing, so
//! this module is the single authoritative definition: the field table,
//! the `#[repr(C)]` block struct, and the code generator must only ever
//! change together, with a version bump.

use bytemuck::{Pod, Zeroable};

// =============================================================================
// LAYOUT VERSION
// =============================================================================

/// Version of the block layout; bumped on any field or packing change.
pub const UNIFORM_LAYOUT_VERSION: u32 = 1;

/// Implicit words at the head of every parameter block
pub const IMPLICIT_WORDS: usize = 13;

/// Device word size in bytes
pub const WORD_BYTES: usize = 4;

// =============================================================================
// AXIS PACKING
// =============================================================================

/// Pack three per-axis values into one word: x in bits 0..8, y in 8..16,
/// z in 16..24. Group shapes are bounded by the lane count, so eight bits
/// per axis always suffice.
#[inline]
pub const fn pack_triple(x: u32, y: u32, z: u32) -> u32 {
    (x & 0xFF) | ((y & 0xFF) << 8) | ((z & 0xFF) << 16)
}

/// Reverse of [`pack_triple`]
#[inline]
pub const fn unpack_triple(packed: u32) -> [u32; 3] {
    [packed & 0xFF, (packed >> 8) & 0xFF, (packed >> 16) & 0xFF]
}

// =============================================================================
// IMPLICIT BLOCK
// =============================================================================

/// The implicit head of a parameter block
///
/// Field order is the wire order; see [`UNIFORM_FIELDS`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ImplicitBlock {
    /// Work dimensionality (1..=3)
    pub work_dim: u32,
    /// Packed local sizes ([`pack_triple`])
    pub local_sizes: u32,
    /// Packed local index of this lane ([`pack_triple`])
    pub local_index: u32,
    /// Groups per axis
    pub group_count: [u32; 3],
    /// This block's group index per axis (x includes the batch iteration)
    pub group_index: [u32; 3],
    /// Global offset per axis
    pub global_offset: [u32; 3],
    /// Bus address of the kernel's constant pool
    pub global_data_addr: u32,
}

static_assertions::const_assert_eq!(
    core::mem::size_of::<ImplicitBlock>(),
    IMPLICIT_WORDS * WORD_BYTES
);

// =============================================================================
// FIELD TABLE
// =============================================================================

/// One named word in the implicit block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformField {
    /// Field name as the code generator knows it
    pub name: &'static str,
    /// Word offset from the start of the block
    pub word: usize,
}

/// The authoritative implicit-field table, in wire order.
pub const UNIFORM_FIELDS: [UniformField; IMPLICIT_WORDS] = [
    UniformField { name: "work_dim", word: 0 },
    UniformField { name: "local_sizes", word: 1 },
    UniformField { name: "local_index", word: 2 },
    UniformField { name: "group_count_x", word: 3 },
    UniformField { name: "group_count_y", word: 4 },
    UniformField { name: "group_count_z", word: 5 },
    UniformField { name: "group_index_x", word: 6 },
    UniformField { name: "group_index_y", word: 7 },
    UniformField { name: "group_index_z", word: 8 },
    UniformField { name: "global_offset_x", word: 9 },
    UniformField { name: "global_offset_y", word: 10 },
    UniformField { name: "global_offset_z", word: 11 },
    UniformField { name: "global_data_addr", word: 12 },
];

// Pin the struct layout to the table.
static_assertions::const_assert_eq!(core::mem::offset_of!(ImplicitBlock, work_dim), 0);
static_assertions::const_assert_eq!(core::mem::offset_of!(ImplicitBlock, local_sizes), 4);
static_assertions::const_assert_eq!(core::mem::offset_of!(ImplicitBlock, local_index), 8);
static_assertions::const_assert_eq!(core::mem::offset_of!(ImplicitBlock, group_count), 12);
static_assertions::const_assert_eq!(core::mem::offset_of!(ImplicitBlock, group_index), 24);
static_assertions::const_assert_eq!(core::mem::offset_of!(ImplicitBlock, global_offset), 36);
static_assertions::const_assert_eq!(core::mem::offset_of!(ImplicitBlock, global_data_addr), 48);

// =============================================================================
// BLOCK GEOMETRY
// =============================================================================

/// Words in one parameter block for a kernel with `explicit_words`
/// explicit parameter words: implicit head, parameters, continue flag.
#[inline]
pub const fn block_words(explicit_words: usize) -> usize {
    IMPLICIT_WORDS + explicit_words + 1
}

/// Word offset of the continue-batch flag inside a block
#[inline]
pub const fn continue_flag_word(explicit_words: usize) -> usize {
    IMPLICIT_WORDS + explicit_words
}

// =============================================================================
// TESTS
// =============================================================================
