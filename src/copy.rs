//! Strided copy engine.
//!
//! Packs vertices from the source channel views into the resolved record
//! layout of a buffer's staging shadow. The copy is channel-major for
//! non-indexed windows (only the channels named by the refresh mask are
//! touched, which is what makes dirty-driven partial re-upload cheap) and
//! vertex-major for index compaction, where each newly assigned vertex is
//! copied in full the moment it gets its local index.
//!
//! A static transform (4×4 position transform with perspective divide and a
//! separate 3×3 normal transform) is applied only when geometry is baked
//! into an invariant frame for deferred recording. Object-linear texture
//! generation always evaluates the object-space (pre-transform) position,
//! then applies the unit's texture transform if one is set.

use glam::{Mat3, Mat4, Vec3, Vec4};

use crate::format::{TexCoordCopy, VertexFormat};
use crate::source::{DirtyMask, GeometrySource, TexCoordSource};

/// Transform baked into recorded geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticTransform {
    /// Applied to positions, with perspective divide.
    pub position: Mat4,
    /// Applied to normals.
    pub normal: Mat3,
}

impl StaticTransform {
    /// Build a transform pair from a single model matrix.
    ///
    /// The normal transform is the inverse-transpose of the upper 3×3 so
    /// normals stay perpendicular under non-uniform scale.
    pub fn from_matrix(matrix: Mat4) -> Self {
        Self {
            position: matrix,
            normal: Mat3::from_mat4(matrix).inverse().transpose(),
        }
    }

    /// Transform a position, including the perspective divide.
    pub fn apply_position(&self, p: [f32; 3]) -> [f32; 3] {
        self.position.project_point3(Vec3::from(p)).into()
    }

    /// Transform a normal.
    pub fn apply_normal(&self, n: [f32; 3]) -> [f32; 3] {
        (self.normal * Vec3::from(n)).into()
    }
}

/// Per-draw copy configuration.
#[derive(Clone, Copy)]
pub struct CopyOp<'a> {
    /// Resolved record layout to pack into.
    pub format: &'a VertexFormat,
    /// Static transform for record-mode submission, if any.
    pub transform: Option<&'a StaticTransform>,
}

fn put(staging: &mut [u8], at: usize, bytes: &[u8]) {
    staging[at..at + bytes.len()].copy_from_slice(bytes);
}

fn write_position(staging: &mut [u8], at: usize, source: &GeometrySource<'_>, src: u32, op: &CopyOp<'_>) {
    let mut p = source.positions().get(src as usize);
    if let Some(t) = op.transform {
        p = t.apply_position(p);
    }
    put(staging, at, bytemuck::bytes_of(&p));
}

fn write_normal(staging: &mut [u8], at: usize, source: &GeometrySource<'_>, src: u32, op: &CopyOp<'_>) {
    let Some(normals) = source.normals() else {
        return;
    };
    let mut n = normals.get(src as usize);
    if let Some(t) = op.transform {
        n = t.apply_normal(n);
    }
    put(staging, at, bytemuck::bytes_of(&n));
}

fn write_color(staging: &mut [u8], at: usize, source: &GeometrySource<'_>, src: u32) {
    let Some(colors) = source.colors() else {
        return;
    };
    put(staging, at, bytemuck::bytes_of(&colors.packed(src as usize)));
}

fn write_texcoord(
    staging: &mut [u8],
    at: usize,
    source: &GeometrySource<'_>,
    src: u32,
    copy: TexCoordCopy,
    width: u8,
) {
    let coords = match copy {
        TexCoordCopy::Explicit { coord_set } => {
            let Some(TexCoordSource::Explicit(view)) =
                source.texcoords().get(coord_set).map(|c| c.source)
            else {
                return;
            };
            view.get(src as usize)
        }
        TexCoordCopy::ObjectLinear { coord_set } => {
            let Some(channel) = source.texcoords().get(coord_set) else {
                return;
            };
            let TexCoordSource::ObjectLinear(planes) = channel.source else {
                return;
            };
            // Object-linear generation reads the object-space position.
            let mut coords = planes.evaluate(source.positions().get(src as usize));
            if let Some(transform) = channel.texture_transform {
                let q = if planes.width() < 4 { 1.0 } else { coords[3] };
                let v = transform * Vec4::new(coords[0], coords[1], coords[2], q);
                coords = v.to_array();
            }
            coords
        }
        TexCoordCopy::ZeroFill => [0.0; 4],
        TexCoordCopy::Disabled | TexCoordCopy::Generated { .. } => return,
    };
    put(
        staging,
        at,
        &bytemuck::cast_slice::<f32, u8>(&coords)[..width as usize * 4],
    );
}

/// Channel-major copy of the vertices selected by `order`.
///
/// Destination slot `i` receives source vertex `order[i]`. Only the
/// channels named by `refresh` are written; pass [`DirtyMask::all`] for a
/// full copy into a freshly allocated buffer. Object-linear channels also
/// refresh when positions do, since they are derived from them.
pub fn copy_channels(
    staging: &mut [u8],
    source: &GeometrySource<'_>,
    order: impl Iterator<Item = u32> + Clone,
    op: &CopyOp<'_>,
    refresh: DirtyMask,
) {
    let stride = op.format.stride() as usize;

    if refresh.contains(DirtyMask::VERTEX) {
        for (slot, src) in order.clone().enumerate() {
            write_position(staging, slot * stride, source, src, op);
        }
    }

    if refresh.contains(DirtyMask::NORMAL) {
        if let Some(offset) = op.format.normal_offset() {
            for (slot, src) in order.clone().enumerate() {
                write_normal(staging, slot * stride + offset as usize, source, src, op);
            }
        }
    }

    if refresh.contains(DirtyMask::COLOR) {
        if let Some(offset) = op.format.color_offset() {
            for (slot, src) in order.clone().enumerate() {
                write_color(staging, slot * stride + offset as usize, source, src);
            }
        }
    }

    for channel in op.format.texcoords() {
        if channel.width == 0 {
            continue;
        }
        let derived_from_positions = matches!(channel.copy, TexCoordCopy::ObjectLinear { .. });
        if !refresh.contains(DirtyMask::TEXTURE)
            && !(derived_from_positions && refresh.contains(DirtyMask::VERTEX))
        {
            continue;
        }
        for (slot, src) in order.clone().enumerate() {
            write_texcoord(
                staging,
                slot * stride + channel.offset as usize,
                source,
                src,
                channel.copy,
                channel.width,
            );
        }
    }
}

/// Vertex-major copy of one source vertex into destination slot `slot`.
///
/// Used by index compaction, which interleaves local-index assignment with
/// the attribute copy in a single pass.
pub fn copy_vertex(
    staging: &mut [u8],
    slot: u32,
    source: &GeometrySource<'_>,
    src: u32,
    op: &CopyOp<'_>,
) {
    let base = slot as usize * op.format.stride() as usize;
    write_position(staging, base, source, src, op);
    if let Some(offset) = op.format.normal_offset() {
        write_normal(staging, base + offset as usize, source, src, op);
    }
    if let Some(offset) = op.format.color_offset() {
        write_color(staging, base + offset as usize, source, src);
    }
    for channel in op.format.texcoords() {
        if channel.width == 0 {
            continue;
        }
        write_texcoord(
            staging,
            base + channel.offset as usize,
            source,
            src,
            channel.copy,
            channel.width,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceCapabilities;
    use crate::format::{self, TextureBindings};
    use crate::source::{
        ColorView, GeometryId, GeometrySource, NormalView, ObjectLinearPlanes, PositionView,
        TexCoordChannel, TexCoordView,
    };

    fn read_vec3(staging: &[u8], at: usize) -> [f32; 3] {
        bytemuck::pod_read_unaligned(&staging[at..at + 12])
    }

    fn read_u32(staging: &[u8], at: usize) -> u32 {
        bytemuck::pod_read_unaligned(&staging[at..at + 4])
    }

    #[test]
    fn test_pack_positions_in_order() {
        let positions = [[1.0f32, 0.0, 0.0], [2.0, 0.0, 0.0], [3.0, 0.0, 0.0]];
        let source = GeometrySource::new(GeometryId(1), PositionView::from_f32(&positions));
        let format = format::resolve(
            &source,
            &TextureBindings::none(),
            &DeviceCapabilities::default(),
        );
        let mut staging = vec![0u8; 3 * format.stride() as usize];
        let op = CopyOp {
            format: &format,
            transform: None,
        };
        // Reversed order: slot 0 gets vertex 2.
        copy_channels(&mut staging, &source, [2u32, 1, 0].into_iter(), &op, DirtyMask::all());
        assert_eq!(read_vec3(&staging, 0), [3.0, 0.0, 0.0]);
        assert_eq!(read_vec3(&staging, 12), [2.0, 0.0, 0.0]);
        assert_eq!(read_vec3(&staging, 24), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_partial_copy_touches_only_dirty_channels() {
        let positions = [[1.0f32, 2.0, 3.0]];
        let colors = [[1.0f32, 1.0, 1.0]];
        let source = GeometrySource::new(GeometryId(1), PositionView::from_f32(&positions))
            .with_colors(ColorView::from_f32_rgb(&colors));
        let format = format::resolve(
            &source,
            &TextureBindings::none(),
            &DeviceCapabilities::default(),
        );
        let mut staging = vec![0u8; format.stride() as usize];
        let op = CopyOp {
            format: &format,
            transform: None,
        };

        copy_channels(&mut staging, &source, [0u32].into_iter(), &op, DirtyMask::COLOR);
        // Positions untouched, color packed.
        assert_eq!(read_vec3(&staging, 0), [0.0, 0.0, 0.0]);
        assert_eq!(
            read_u32(&staging, format.color_offset().unwrap() as usize),
            u32::from_le_bytes([255, 255, 255, 255])
        );
    }

    #[test]
    fn test_static_transform_with_perspective_divide() {
        let positions = [[1.0f32, 2.0, 3.0]];
        let source = GeometrySource::new(GeometryId(1), PositionView::from_f32(&positions));
        let format = format::resolve(
            &source,
            &TextureBindings::none(),
            &DeviceCapabilities::default(),
        );
        let transform = StaticTransform::from_matrix(Mat4::from_scale(Vec3::splat(2.0)));
        let mut staging = vec![0u8; format.stride() as usize];
        let op = CopyOp {
            format: &format,
            transform: Some(&transform),
        };
        copy_channels(&mut staging, &source, [0u32].into_iter(), &op, DirtyMask::all());
        assert_eq!(read_vec3(&staging, 0), [2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_normal_transform_is_separate() {
        let positions = [[0.0f32; 3]];
        let normals = [[0.0f32, 1.0, 0.0]];
        let source = GeometrySource::new(GeometryId(1), PositionView::from_f32(&positions))
            .with_normals(NormalView::from_f32(&normals));
        let format = format::resolve(
            &source,
            &TextureBindings::none(),
            &DeviceCapabilities::default(),
        );
        // Non-uniform scale: the inverse-transpose keeps the normal on axis
        // but scales it by 1/sy.
        let transform = StaticTransform::from_matrix(Mat4::from_scale(Vec3::new(1.0, 4.0, 1.0)));
        let mut staging = vec![0u8; format.stride() as usize];
        let op = CopyOp {
            format: &format,
            transform: Some(&transform),
        };
        copy_channels(&mut staging, &source, [0u32].into_iter(), &op, DirtyMask::all());
        let n = read_vec3(&staging, format.normal_offset().unwrap() as usize);
        assert!((n[1] - 0.25).abs() < 1e-6);
        assert_eq!(n[0], 0.0);
        assert_eq!(n[2], 0.0);
    }

    #[test]
    fn test_object_linear_generation_pre_transform() {
        let positions = [[3.0f32, 0.0, 0.0]];
        let planes = ObjectLinearPlanes::new(&[Vec4::new(1.0, 0.0, 0.0, 0.0), Vec4::W]);
        let source = GeometrySource::new(GeometryId(1), PositionView::from_f32(&positions))
            .with_texcoords(TexCoordChannel::object_linear(planes));
        let format = format::resolve(
            &source,
            &TextureBindings::single(0),
            &DeviceCapabilities::default(),
        );
        // The static transform must not leak into texgen input.
        let transform = StaticTransform::from_matrix(Mat4::from_scale(Vec3::splat(10.0)));
        let mut staging = vec![0u8; format.stride() as usize];
        let op = CopyOp {
            format: &format,
            transform: Some(&transform),
        };
        copy_channels(&mut staging, &source, [0u32].into_iter(), &op, DirtyMask::all());
        let at = format.texcoords()[0].offset as usize;
        let s: f32 = bytemuck::pod_read_unaligned(&staging[at..at + 4]);
        let t: f32 = bytemuck::pod_read_unaligned(&staging[at + 4..at + 8]);
        assert_eq!(s, 3.0); // object-space x, not 30.0
        assert_eq!(t, 1.0); // constant plane
    }

    #[test]
    fn test_object_linear_texture_transform() {
        let positions = [[1.0f32, 0.0, 0.0]];
        let planes = ObjectLinearPlanes::new(&[Vec4::new(1.0, 0.0, 0.0, 0.0), Vec4::ZERO]);
        let channel = TexCoordChannel::object_linear(planes)
            .with_texture_transform(Mat4::from_translation(Vec3::new(0.5, 0.25, 0.0)));
        let source = GeometrySource::new(GeometryId(1), PositionView::from_f32(&positions))
            .with_texcoords(channel);
        let format = format::resolve(
            &source,
            &TextureBindings::single(0),
            &DeviceCapabilities::default(),
        );
        let mut staging = vec![0u8; format.stride() as usize];
        let op = CopyOp {
            format: &format,
            transform: None,
        };
        copy_channels(&mut staging, &source, [0u32].into_iter(), &op, DirtyMask::all());
        let at = format.texcoords()[0].offset as usize;
        let s: f32 = bytemuck::pod_read_unaligned(&staging[at..at + 4]);
        let t: f32 = bytemuck::pod_read_unaligned(&staging[at + 4..at + 8]);
        assert_eq!(s, 1.5);
        assert_eq!(t, 0.25);
    }

    #[test]
    fn test_explicit_texcoords_copied_raw() {
        let positions = [[0.0f32; 3]; 2];
        let uvs = [[0.1f32, 0.2], [0.3, 0.4]];
        let source = GeometrySource::new(GeometryId(1), PositionView::from_f32(&positions))
            .with_texcoords(TexCoordChannel::explicit(TexCoordView::from_f32_2(&uvs)));
        let format = format::resolve(
            &source,
            &TextureBindings::single(0),
            &DeviceCapabilities::default(),
        );
        let stride = format.stride() as usize;
        let mut staging = vec![0u8; 2 * stride];
        let op = CopyOp {
            format: &format,
            transform: None,
        };
        copy_channels(&mut staging, &source, [0u32, 1].into_iter(), &op, DirtyMask::all());
        let at = stride + format.texcoords()[0].offset as usize;
        let s: f32 = bytemuck::pod_read_unaligned(&staging[at..at + 4]);
        assert_eq!(s, 0.3);
    }

    #[test]
    fn test_vertex_major_copy_matches_channel_major() {
        let positions = [[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let colors = [[0.5f32, 0.5, 0.5], [1.0, 0.0, 0.0]];
        let source = GeometrySource::new(GeometryId(1), PositionView::from_f32(&positions))
            .with_colors(ColorView::from_f32_rgb(&colors));
        let format = format::resolve(
            &source,
            &TextureBindings::none(),
            &DeviceCapabilities::default(),
        );
        let stride = format.stride() as usize;
        let op = CopyOp {
            format: &format,
            transform: None,
        };

        let mut channel_major = vec![0u8; 2 * stride];
        copy_channels(
            &mut channel_major,
            &source,
            [1u32, 0].into_iter(),
            &op,
            DirtyMask::all(),
        );

        let mut vertex_major = vec![0u8; 2 * stride];
        copy_vertex(&mut vertex_major, 0, &source, 1, &op);
        copy_vertex(&mut vertex_major, 1, &source, 0, &op);

        assert_eq!(channel_major, vertex_major);
    }
}
