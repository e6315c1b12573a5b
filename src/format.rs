//! Vertex format resolution.
//!
//! Given the channels present on a [`GeometrySource`] and the draw's
//! texture-unit bindings, the resolver computes the packed hardware record:
//! field order (position, normal, color as one 32-bit quantity, then active
//! texture channels ascending by unit), per-field byte offsets, the total
//! stride, and a compact [`FormatSignature`] used by the buffer cache to
//! detect format-incompatible changes.
//!
//! Texture channels route through a unit → coordinate-set indirection:
//! single-pass submission feeds unit 0 from a coordinate-set map indexed by
//! pass; multi-texture submission maps one channel per active unit. An
//! unmapped unit is simply absent from the draw. A unit mapped as disabled
//! contributes zero copy width but keeps its slot so the unit's transform
//! and generation state are still configured. A mapping that points past the
//! source's channels degrades to a zero-filled channel with a consistency
//! warning rather than failing the draw.

use crate::device::DeviceCapabilities;
use crate::source::{GeometrySource, TexCoordSource};

/// How one resolved texture channel is filled during the copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexCoordCopy {
    /// Copied from the source channel `coord_set`.
    Explicit {
        /// Source texture-coordinate channel.
        coord_set: usize,
    },
    /// Evaluated host-side from channel `coord_set`'s plane equations.
    ObjectLinear {
        /// Source texture-coordinate channel.
        coord_set: usize,
    },
    /// Generated by the driver; nothing is copied.
    Generated {
        /// Source texture-coordinate channel carrying the generation state.
        coord_set: usize,
    },
    /// Explicitly disabled binding: zero width, unit state still configured.
    Disabled,
    /// Out-of-range mapping degraded to zeroes.
    ZeroFill,
}

/// One texture channel of the packed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTexCoord {
    /// Texture unit this channel feeds.
    pub unit: u32,
    /// Component count written to the record (0 for disabled/generated).
    pub width: u8,
    /// Byte offset of the channel within the packed record.
    pub offset: u32,
    /// Fill rule for the copy engine.
    pub copy: TexCoordCopy,
}

/// Compact, hashable identity of a packed vertex format.
///
/// Bit 0: normal present. Bit 1: color present. Bits `8 + 4*unit`: one
/// nibble per texture unit: 0 absent, 1 disabled, 2..4 explicit width,
/// 5..7 object-linear width + 3, 8 generated, 9 zero-filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatSignature(pub(crate) u64);

impl FormatSignature {
    /// Raw signature bits, for diagnostics.
    pub fn bits(&self) -> u64 {
        self.0
    }
}

/// The packed hardware vertex record for one draw.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexFormat {
    normal_offset: Option<u32>,
    color_offset: Option<u32>,
    texcoords: Vec<ResolvedTexCoord>,
    stride: u32,
    signature: FormatSignature,
}

impl VertexFormat {
    /// Byte offset of the position field (always first).
    pub fn position_offset(&self) -> u32 {
        0
    }

    /// Byte offset of the normal field, if present.
    pub fn normal_offset(&self) -> Option<u32> {
        self.normal_offset
    }

    /// Byte offset of the packed 32-bit color field, if present.
    pub fn color_offset(&self) -> Option<u32> {
        self.color_offset
    }

    /// Resolved texture channels, ascending by unit.
    pub fn texcoords(&self) -> &[ResolvedTexCoord] {
        &self.texcoords
    }

    /// Total packed record stride in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Format signature for cache compatibility checks.
    pub fn signature(&self) -> FormatSignature {
        self.signature
    }
}

/// Mapping of one texture unit for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitBinding {
    /// Unit is not used by this draw.
    Unmapped,
    /// Unit is explicitly disabled (zero-width channel, state configured).
    Disabled,
    /// Unit reads the given source texture-coordinate channel.
    CoordSet(usize),
}

/// Per-draw texture-unit → coordinate-set table.
#[derive(Debug, Clone, Default)]
pub struct TextureBindings {
    units: Vec<UnitBinding>,
}

impl TextureBindings {
    /// No texture units active.
    pub fn none() -> Self {
        Self::default()
    }

    /// Single-pass submission: unit 0 reads `coord_set`, nothing else.
    pub fn single(coord_set: usize) -> Self {
        Self {
            units: vec![UnitBinding::CoordSet(coord_set)],
        }
    }

    /// Single-pass submission through a coordinate-set map indexed by pass.
    ///
    /// Unit 0 reads the map entry for `pass`; a missing entry falls back to
    /// channel 0.
    pub fn single_pass(coord_set_map: &[usize], pass: usize) -> Self {
        Self::single(coord_set_map.get(pass).copied().unwrap_or(0))
    }

    /// Map `unit` to read source channel `coord_set`.
    pub fn with_unit(mut self, unit: u32, coord_set: usize) -> Self {
        self.set(unit, UnitBinding::CoordSet(coord_set));
        self
    }

    /// Explicitly disable `unit` (zero-width channel, state configured).
    pub fn with_disabled_unit(mut self, unit: u32) -> Self {
        self.set(unit, UnitBinding::Disabled);
        self
    }

    fn set(&mut self, unit: u32, binding: UnitBinding) {
        let unit = unit as usize;
        if self.units.len() <= unit {
            self.units.resize(unit + 1, UnitBinding::Unmapped);
        }
        self.units[unit] = binding;
    }

    /// The unit table.
    pub fn units(&self) -> &[UnitBinding] {
        &self.units
    }
}

/// Resolve the packed record layout for one draw.
pub fn resolve(
    source: &GeometrySource<'_>,
    bindings: &TextureBindings,
    caps: &DeviceCapabilities,
) -> VertexFormat {
    let mut offset = 12u32; // position float3 first
    let mut signature = 0u64;

    let normal_offset = source.normals().map(|_| {
        signature |= 1;
        let at = offset;
        offset += 12;
        at
    });

    let color_offset = source.colors().map(|_| {
        signature |= 1 << 1;
        let at = offset;
        offset += 4; // packed RGBA8
        at
    });

    // Without multi-texture support only unit 0 can be active.
    let unit_limit = if caps.multi_texture {
        caps.max_texture_units as usize
    } else {
        1
    };

    let mut texcoords = Vec::new();
    for (unit, binding) in bindings.units().iter().enumerate().take(unit_limit) {
        let (width, copy, nibble) = match *binding {
            UnitBinding::Unmapped => continue,
            UnitBinding::Disabled => (0u8, TexCoordCopy::Disabled, 1u64),
            UnitBinding::CoordSet(coord_set) => match source.texcoords().get(coord_set) {
                None => {
                    log::warn!(
                        "texture unit {unit} maps to coordinate channel {coord_set}, \
                         but the geometry has {}; using zeroes",
                        source.texcoords().len()
                    );
                    (2, TexCoordCopy::ZeroFill, 9)
                }
                Some(channel) => match channel.source {
                    TexCoordSource::Explicit(view) => {
                        let w = view.width();
                        (w, TexCoordCopy::Explicit { coord_set }, w as u64)
                    }
                    TexCoordSource::ObjectLinear(planes) => {
                        let w = planes.width();
                        (w, TexCoordCopy::ObjectLinear { coord_set }, w as u64 + 3)
                    }
                    TexCoordSource::Generated => (0, TexCoordCopy::Generated { coord_set }, 8),
                },
            },
        };
        signature |= nibble << (8 + 4 * unit);
        texcoords.push(ResolvedTexCoord {
            unit: unit as u32,
            width,
            offset,
            copy,
        });
        offset += width as u32 * 4;
    }

    VertexFormat {
        normal_offset,
        color_offset,
        texcoords,
        stride: offset,
        signature: FormatSignature(signature),
    }
}
