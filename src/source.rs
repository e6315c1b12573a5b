//! Per-draw geometry source views.
//!
//! A [`GeometrySource`] is a read-only view of one geometry's attribute
//! arrays for a single draw: a required position channel, optional normal
//! and color channels, up to [`MAX_TEXTURE_CHANNELS`] texture-coordinate
//! channels, and an optional index run. Channels reference the scene graph's
//! arrays in place with an arbitrary byte stride; nothing is copied until
//! the copy engine packs vertices into a hardware buffer.
//!
//! The accompanying [`DirtyMask`] says which channels changed since this
//! geometry's last draw in the same context. An all-clear mask with a
//! matching buffer format means the cached buffers are replayed without
//! touching the source arrays at all.

use bitflags::bitflags;
use glam::{Mat4, Vec4};

/// Maximum texture-coordinate channels a source may carry.
pub const MAX_TEXTURE_CHANNELS: usize = 8;

bitflags! {
    /// Per-channel change flags since the geometry's last draw.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DirtyMask: u32 {
        /// Positions changed.
        const VERTEX = 1 << 0;
        /// Colors changed.
        const COLOR = 1 << 1;
        /// Normals changed.
        const NORMAL = 1 << 2;
        /// Any texture-coordinate channel changed.
        const TEXTURE = 1 << 3;
        /// The index array changed.
        const INDEX = 1 << 4;
        /// Strip lengths changed.
        const STRIPCOUNT = 1 << 5;
    }
}

impl Default for DirtyMask {
    fn default() -> Self {
        Self::all()
    }
}

/// Stable identity of a geometry, used as the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryId(pub u64);

/// Precision of the position channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionFormat {
    /// Three 32-bit floats per vertex.
    Float3,
    /// Three 64-bit floats per vertex; narrowed to `f32` at copy time.
    Double3,
}

impl PositionFormat {
    fn element_size(&self) -> usize {
        match self {
            Self::Float3 => 12,
            Self::Double3 => 24,
        }
    }
}

/// Strided view over the position channel.
#[derive(Debug, Clone, Copy)]
pub struct PositionView<'a> {
    bytes: &'a [u8],
    stride: usize,
    format: PositionFormat,
}

impl<'a> PositionView<'a> {
    /// View a tightly packed `f32` position array.
    pub fn from_f32(data: &'a [[f32; 3]]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(data),
            stride: 12,
            format: PositionFormat::Float3,
        }
    }

    /// View a tightly packed `f64` position array.
    pub fn from_f64(data: &'a [[f64; 3]]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(data),
            stride: 24,
            format: PositionFormat::Double3,
        }
    }

    /// View raw bytes with an explicit stride and precision.
    pub fn from_bytes(bytes: &'a [u8], stride: usize, format: PositionFormat) -> Self {
        debug_assert!(stride >= format.element_size());
        Self {
            bytes,
            stride,
            format,
        }
    }

    /// Number of vertices addressable through this view.
    pub fn len(&self) -> usize {
        element_count(self.bytes.len(), self.stride, self.format.element_size())
    }

    /// Check if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read vertex `i`, narrowing doubles to `f32`.
    pub fn get(&self, i: usize) -> [f32; 3] {
        let at = i * self.stride;
        match self.format {
            PositionFormat::Float3 => bytemuck::pod_read_unaligned(&self.bytes[at..at + 12]),
            PositionFormat::Double3 => {
                let wide: [f64; 3] = bytemuck::pod_read_unaligned(&self.bytes[at..at + 24]);
                [wide[0] as f32, wide[1] as f32, wide[2] as f32]
            }
        }
    }
}

/// Strided view over the normal channel (`f32`x3).
#[derive(Debug, Clone, Copy)]
pub struct NormalView<'a> {
    bytes: &'a [u8],
    stride: usize,
}

impl<'a> NormalView<'a> {
    /// View a tightly packed normal array.
    pub fn from_f32(data: &'a [[f32; 3]]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(data),
            stride: 12,
        }
    }

    /// View raw bytes with an explicit stride.
    pub fn from_bytes(bytes: &'a [u8], stride: usize) -> Self {
        debug_assert!(stride >= 12);
        Self { bytes, stride }
    }

    /// Read normal `i`.
    pub fn get(&self, i: usize) -> [f32; 3] {
        let at = i * self.stride;
        bytemuck::pod_read_unaligned(&self.bytes[at..at + 12])
    }
}

/// Source precision and width of the color channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    /// Three 32-bit floats, alpha implied 1.0.
    Float3,
    /// Four 32-bit floats.
    Float4,
    /// Three bytes, alpha implied 255.
    Byte3,
    /// Four bytes.
    Byte4,
}

impl ColorFormat {
    fn element_size(&self) -> usize {
        match self {
            Self::Float3 => 12,
            Self::Float4 => 16,
            Self::Byte3 => 3,
            Self::Byte4 => 4,
        }
    }
}

/// Strided view over the color channel.
///
/// Whatever the source precision, colors reach the hardware buffer as one
/// 32-bit RGBA quantity.
#[derive(Debug, Clone, Copy)]
pub struct ColorView<'a> {
    bytes: &'a [u8],
    stride: usize,
    format: ColorFormat,
}

impl<'a> ColorView<'a> {
    /// View a tightly packed float RGB array.
    pub fn from_f32_rgb(data: &'a [[f32; 3]]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(data),
            stride: 12,
            format: ColorFormat::Float3,
        }
    }

    /// View a tightly packed float RGBA array.
    pub fn from_f32_rgba(data: &'a [[f32; 4]]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(data),
            stride: 16,
            format: ColorFormat::Float4,
        }
    }

    /// View raw bytes with an explicit stride and format.
    pub fn from_bytes(bytes: &'a [u8], stride: usize, format: ColorFormat) -> Self {
        debug_assert!(stride >= format.element_size());
        Self {
            bytes,
            stride,
            format,
        }
    }

    /// Read color `i` packed to RGBA8 (r in the low byte).
    pub fn packed(&self, i: usize) -> u32 {
        let at = i * self.stride;
        let [r, g, b, a] = match self.format {
            ColorFormat::Float3 => {
                let c: [f32; 3] = bytemuck::pod_read_unaligned(&self.bytes[at..at + 12]);
                [to_u8(c[0]), to_u8(c[1]), to_u8(c[2]), 255]
            }
            ColorFormat::Float4 => {
                let c: [f32; 4] = bytemuck::pod_read_unaligned(&self.bytes[at..at + 16]);
                [to_u8(c[0]), to_u8(c[1]), to_u8(c[2]), to_u8(c[3])]
            }
            ColorFormat::Byte3 => [self.bytes[at], self.bytes[at + 1], self.bytes[at + 2], 255],
            ColorFormat::Byte4 => [
                self.bytes[at],
                self.bytes[at + 1],
                self.bytes[at + 2],
                self.bytes[at + 3],
            ],
        };
        u32::from_le_bytes([r, g, b, a])
    }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

fn element_count(byte_len: usize, stride: usize, element_size: usize) -> usize {
    debug_assert!(stride > 0);
    if byte_len < element_size {
        0
    } else {
        (byte_len - element_size) / stride + 1
    }
}

/// Strided view over one explicit texture-coordinate channel (`f32` x width).
#[derive(Debug, Clone, Copy)]
pub struct TexCoordView<'a> {
    bytes: &'a [u8],
    stride: usize,
    width: u8,
}

impl<'a> TexCoordView<'a> {
    /// View a tightly packed 2-component array.
    pub fn from_f32_2(data: &'a [[f32; 2]]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(data),
            stride: 8,
            width: 2,
        }
    }

    /// View a tightly packed 3-component array.
    pub fn from_f32_3(data: &'a [[f32; 3]]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(data),
            stride: 12,
            width: 3,
        }
    }

    /// View a tightly packed 4-component array.
    pub fn from_f32_4(data: &'a [[f32; 4]]) -> Self {
        Self {
            bytes: bytemuck::cast_slice(data),
            stride: 16,
            width: 4,
        }
    }

    /// View raw bytes with an explicit stride and component width (2..=4).
    pub fn from_bytes(bytes: &'a [u8], stride: usize, width: u8) -> Self {
        debug_assert!((2..=4).contains(&width));
        debug_assert!(stride >= width as usize * 4);
        Self {
            bytes,
            stride,
            width,
        }
    }

    /// Component width of this channel.
    pub fn width(&self) -> u8 {
        self.width
    }

    /// Read coordinate `i`, padded with zeroes to four components.
    pub fn get(&self, i: usize) -> [f32; 4] {
        let at = i * self.stride;
        let mut out = [0.0f32; 4];
        for (c, slot) in out.iter_mut().enumerate().take(self.width as usize) {
            *slot = bytemuck::pod_read_unaligned(&self.bytes[at + c * 4..at + c * 4 + 4]);
        }
        out
    }
}

/// Plane equations for object-linear coordinate generation.
///
/// Each generated component is the dot product of one plane with the
/// object-space vertex position extended to (x, y, z, 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectLinearPlanes {
    planes: [Vec4; 4],
    count: u8,
}

impl ObjectLinearPlanes {
    /// Create a plane set from 2..=4 plane equations.
    pub fn new(planes: &[Vec4]) -> Self {
        debug_assert!((2..=4).contains(&planes.len()));
        let mut stored = [Vec4::ZERO; 4];
        stored[..planes.len()].copy_from_slice(planes);
        Self {
            planes: stored,
            count: planes.len() as u8,
        }
    }

    /// Number of generated components.
    pub fn width(&self) -> u8 {
        self.count
    }

    /// Evaluate the planes for an object-space position.
    pub fn evaluate(&self, position: [f32; 3]) -> [f32; 4] {
        let p = Vec4::new(position[0], position[1], position[2], 1.0);
        let mut out = [0.0f32; 4];
        for (c, slot) in out.iter_mut().enumerate().take(self.count as usize) {
            *slot = self.planes[c].dot(p);
        }
        out
    }
}

/// Where one texture-coordinate channel's data comes from.
#[derive(Debug, Clone, Copy)]
pub enum TexCoordSource<'a> {
    /// Coordinates supplied by the application.
    Explicit(TexCoordView<'a>),
    /// Coordinates computed host-side from plane equations.
    ObjectLinear(ObjectLinearPlanes),
    /// Coordinates generated by the driver; nothing is copied.
    Generated,
}

/// One texture-coordinate channel: its source plus an optional texture
/// transform applied to generated coordinates.
#[derive(Debug, Clone, Copy)]
pub struct TexCoordChannel<'a> {
    /// Coordinate source for this channel.
    pub source: TexCoordSource<'a>,
    /// Texture transform applied after object-linear generation.
    pub texture_transform: Option<Mat4>,
}

impl<'a> TexCoordChannel<'a> {
    /// Channel with explicit coordinates.
    pub fn explicit(view: TexCoordView<'a>) -> Self {
        Self {
            source: TexCoordSource::Explicit(view),
            texture_transform: None,
        }
    }

    /// Channel generated from object-linear planes.
    pub fn object_linear(planes: ObjectLinearPlanes) -> Self {
        Self {
            source: TexCoordSource::ObjectLinear(planes),
            texture_transform: None,
        }
    }

    /// Channel generated by the driver.
    pub fn generated() -> Self {
        Self {
            source: TexCoordSource::Generated,
            texture_transform: None,
        }
    }

    /// Set the texture transform for generated coordinates.
    pub fn with_texture_transform(mut self, transform: Mat4) -> Self {
        self.texture_transform = Some(transform);
        self
    }

    /// Number of components this channel contributes to the packed record.
    pub fn width(&self) -> u8 {
        match &self.source {
            TexCoordSource::Explicit(view) => view.width(),
            TexCoordSource::ObjectLinear(planes) => planes.width(),
            TexCoordSource::Generated => 0,
        }
    }
}

/// View over the source index array.
#[derive(Debug, Clone, Copy)]
pub enum IndexView<'a> {
    /// 16-bit indices.
    U16(&'a [u16]),
    /// 32-bit indices.
    U32(&'a [u32]),
}

impl IndexView<'_> {
    /// Number of indices in the array.
    pub fn len(&self) -> usize {
        match self {
            Self::U16(data) => data.len(),
            Self::U32(data) => data.len(),
        }
    }

    /// Check if the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read index `i` widened to `u32`.
    pub fn get(&self, i: usize) -> u32 {
        match self {
            Self::U16(data) => data[i] as u32,
            Self::U32(data) => data[i],
        }
    }
}

/// Read-only per-draw view of one geometry's attribute arrays.
#[derive(Debug, Clone)]
pub struct GeometrySource<'a> {
    id: GeometryId,
    positions: PositionView<'a>,
    normals: Option<NormalView<'a>>,
    colors: Option<ColorView<'a>>,
    texcoords: Vec<TexCoordChannel<'a>>,
    indices: Option<IndexView<'a>>,
    index_offset: u32,
    index_count: u32,
    dirty: DirtyMask,
}

impl<'a> GeometrySource<'a> {
    /// Create a source view with the required position channel.
    ///
    /// All channels start dirty; callers that track changes clear the mask
    /// with [`with_dirty`](Self::with_dirty).
    pub fn new(id: GeometryId, positions: PositionView<'a>) -> Self {
        Self {
            id,
            positions,
            normals: None,
            colors: None,
            texcoords: Vec::new(),
            indices: None,
            index_offset: 0,
            index_count: 0,
            dirty: DirtyMask::all(),
        }
    }

    /// Attach the normal channel.
    pub fn with_normals(mut self, normals: NormalView<'a>) -> Self {
        self.normals = Some(normals);
        self
    }

    /// Attach the color channel.
    pub fn with_colors(mut self, colors: ColorView<'a>) -> Self {
        self.colors = Some(colors);
        self
    }

    /// Append a texture-coordinate channel.
    pub fn with_texcoords(mut self, channel: TexCoordChannel<'a>) -> Self {
        debug_assert!(self.texcoords.len() < MAX_TEXTURE_CHANNELS);
        self.texcoords.push(channel);
        self
    }

    /// Attach an index run over `count` indices starting at `offset`.
    pub fn with_indices(mut self, indices: IndexView<'a>, offset: u32, count: u32) -> Self {
        debug_assert!((offset as usize + count as usize) <= indices.len());
        self.indices = Some(indices);
        self.index_offset = offset;
        self.index_count = count;
        self
    }

    /// Set the dirty mask for this draw.
    pub fn with_dirty(mut self, dirty: DirtyMask) -> Self {
        self.dirty = dirty;
        self
    }

    /// Geometry identity.
    pub fn id(&self) -> GeometryId {
        self.id
    }

    /// Position channel.
    pub fn positions(&self) -> &PositionView<'a> {
        &self.positions
    }

    /// Normal channel, if present.
    pub fn normals(&self) -> Option<&NormalView<'a>> {
        self.normals.as_ref()
    }

    /// Color channel, if present.
    pub fn colors(&self) -> Option<&ColorView<'a>> {
        self.colors.as_ref()
    }

    /// Texture-coordinate channels.
    pub fn texcoords(&self) -> &[TexCoordChannel<'a>] {
        &self.texcoords
    }

    /// Index array, if the draw is indexed.
    pub fn indices(&self) -> Option<&IndexView<'a>> {
        self.indices.as_ref()
    }

    /// First index of the draw's run.
    pub fn index_offset(&self) -> u32 {
        self.index_offset
    }

    /// Number of indices in the draw's run.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Dirty mask for this draw.
    pub fn dirty(&self) -> DirtyMask {
        self.dirty
    }

    /// Number of vertices in the position channel.
    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    /// Read source index `i` of the run (`i` is relative to the run start).
    pub fn run_index(&self, i: u32) -> u32 {
        debug_assert!(self.indices.is_some());
        match &self.indices {
            Some(indices) => indices.get((self.index_offset + i) as usize),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_view_f32() {
        let data = [[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let view = PositionView::from_f32(&data);
        assert_eq!(view.len(), 2);
        assert_eq!(view.get(1), [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_position_view_f64_narrows() {
        let data = [[1.5f64, 2.5, 3.5]];
        let view = PositionView::from_f64(&data);
        assert_eq!(view.len(), 1);
        assert_eq!(view.get(0), [1.5f32, 2.5, 3.5]);
    }

    #[test]
    fn test_position_view_strided() {
        // Positions interleaved with one padding float.
        let data: Vec<f32> = vec![1.0, 2.0, 3.0, 99.0, 4.0, 5.0, 6.0, 99.0];
        let bytes = bytemuck::cast_slice(&data);
        let view = PositionView::from_bytes(bytes, 16, PositionFormat::Float3);
        assert_eq!(view.len(), 2);
        assert_eq!(view.get(0), [1.0, 2.0, 3.0]);
        assert_eq!(view.get(1), [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_color_packing_float_rgb() {
        let data = [[1.0f32, 0.0, 0.5]];
        let view = ColorView::from_f32_rgb(&data);
        let packed = view.packed(0);
        assert_eq!(packed & 0xff, 255); // r
        assert_eq!((packed >> 8) & 0xff, 0); // g
        assert_eq!((packed >> 16) & 0xff, 128); // b
        assert_eq!(packed >> 24, 255); // implied alpha
    }

    #[test]
    fn test_color_packing_bytes() {
        let bytes = [10u8, 20, 30, 40];
        let view = ColorView::from_bytes(&bytes, 4, ColorFormat::Byte4);
        assert_eq!(view.packed(0), u32::from_le_bytes([10, 20, 30, 40]));
    }

    #[test]
    fn test_object_linear_planes() {
        let planes = ObjectLinearPlanes::new(&[
            Vec4::new(1.0, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0, 0.0, 1.0),
        ]);
        assert_eq!(planes.width(), 2);
        let coords = planes.evaluate([3.0, 4.0, 5.0]);
        assert_eq!(coords[0], 3.0);
        assert_eq!(coords[1], 9.0);
    }

    #[test]
    fn test_index_view() {
        let indices = [0u16, 4, 2];
        let view = IndexView::U16(&indices);
        assert_eq!(view.len(), 3);
        assert_eq!(view.get(1), 4);
    }

    #[test]
    fn test_source_builder() {
        let positions = [[0.0f32; 3]; 5];
        let normals = [[0.0f32, 1.0, 0.0]; 5];
        let indices = [0u16, 1, 2, 2, 3, 4];
        let source = GeometrySource::new(GeometryId(7), PositionView::from_f32(&positions))
            .with_normals(NormalView::from_f32(&normals))
            .with_indices(IndexView::U16(&indices), 3, 3)
            .with_dirty(DirtyMask::VERTEX | DirtyMask::INDEX);

        assert_eq!(source.vertex_count(), 5);
        assert_eq!(source.index_count(), 3);
        assert_eq!(source.run_index(0), 2);
        assert!(source.dirty().contains(DirtyMask::INDEX));
        assert!(!source.dirty().contains(DirtyMask::COLOR));
    }
}
