//! Packed cell encoding shared with the compute kernel.
//!
//! A cell is a single `u32`:
//!
//! ```text
//! 31                 8 7         4 3          0
//! ┌───────────────────┬───────────┬────────────┐
//! │ reserved (zero)   │ variation │ material   │
//! └───────────────────┴───────────┴────────────┘
//! ```
//!
//! The layout is the wire format exchanged with the kernel and must stay
//! bit-identical to the constants in the WGSL sources.

use sandfall_common::EncodingError;
use serde::{Deserialize, Serialize};

/// Number of bits holding the material tag.
pub const MATERIAL_BITS: u32 = 4;
/// Number of bits holding the variation index.
pub const VARIATION_BITS: u32 = 4;
/// Mask of the material tag within a packed cell.
pub const MATERIAL_MASK: u32 = (1 << MATERIAL_BITS) - 1;
/// Mask of the variation index once shifted down.
pub const VARIATION_MASK: u32 = (1 << VARIATION_BITS) - 1;
/// Largest encodable variation index.
pub const MAX_VARIATION: u8 = VARIATION_MASK as u8;
/// Bits that must be clear in every valid packed cell.
pub const RESERVED_MASK: u32 = !((1 << (MATERIAL_BITS + VARIATION_BITS)) - 1);

/// Material tag of a cell.
///
/// The set is closed; new materials are added as new tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Material {
    /// Empty space
    #[default]
    None = 0,
    /// Falling granular solid
    Sand = 1,
    /// Falling liquid
    Water = 2,
}

impl Material {
    /// All materials, in tag order.
    pub const ALL: [Material; 3] = [Material::None, Material::Sand, Material::Water];

    /// Returns the numeric tag.
    #[must_use]
    pub const fn id(self) -> u32 {
        self as u32
    }

    /// Looks up a material by tag.
    pub fn from_id(id: u32) -> Result<Self, EncodingError> {
        match id {
            0 => Ok(Material::None),
            1 => Ok(Material::Sand),
            2 => Ok(Material::Water),
            _ => Err(EncodingError::InvalidMaterial(id)),
        }
    }

    /// Returns true for materials that fall under the shipped rule set.
    #[must_use]
    pub const fn falls(self) -> bool {
        matches!(self, Material::Sand | Material::Water)
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Material::None => "none",
            Material::Sand => "sand",
            Material::Water => "water",
        }
    }
}

/// Packs a raw material tag and variation into a cell value.
///
/// Fails instead of truncating when either value exceeds its bit width.
pub fn pack(material: u32, variation: u32) -> Result<u32, EncodingError> {
    if material > MATERIAL_MASK {
        return Err(EncodingError::InvalidMaterial(material));
    }
    if variation > VARIATION_MASK {
        return Err(EncodingError::InvalidVariation(variation));
    }
    Ok(material | (variation << MATERIAL_BITS))
}

/// Splits a packed cell into its raw material tag and variation.
pub fn unpack(value: u32) -> Result<(u32, u32), EncodingError> {
    if value & RESERVED_MASK != 0 {
        return Err(EncodingError::InvalidCell(value));
    }
    Ok((value & MATERIAL_MASK, (value >> MATERIAL_BITS) & VARIATION_MASK))
}

/// Material tag of a packed cell, without validation.
#[must_use]
pub const fn material_bits(value: u32) -> u32 {
    value & MATERIAL_MASK
}

/// A decoded cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Cell {
    material: Material,
    variation: u8,
}

impl Cell {
    /// The empty cell (`None`, variation 0). Packs to `0`.
    pub const EMPTY: Cell = Cell {
        material: Material::None,
        variation: 0,
    };

    /// Creates a cell, checking the variation fits its bit width.
    pub fn new(material: Material, variation: u8) -> Result<Self, EncodingError> {
        if variation > MAX_VARIATION {
            return Err(EncodingError::InvalidVariation(u32::from(variation)));
        }
        Ok(Self {
            material,
            variation,
        })
    }

    /// Creates a cell with variation 0.
    #[must_use]
    pub const fn of(material: Material) -> Self {
        Self {
            material,
            variation: 0,
        }
    }

    /// Material tag.
    #[must_use]
    pub const fn material(self) -> Material {
        self.material
    }

    /// Variation index (visual only).
    #[must_use]
    pub const fn variation(self) -> u8 {
        self.variation
    }

    /// Packs into the kernel wire format.
    #[must_use]
    pub const fn pack(self) -> u32 {
        self.material as u32 | ((self.variation as u32) << MATERIAL_BITS)
    }

    /// Decodes a packed cell.
    pub fn unpack(value: u32) -> Result<Self, EncodingError> {
        let (material, variation) = unpack(value)?;
        Ok(Self {
            material: Material::from_id(material)?,
            variation: variation as u8,
        })
    }
}
