//! Point and ray field identifiers.
//!
//! Every field carries a fixed element kind and byte size. The size table is a
//! binary contract between producers and consumers (see `FormatPointsNode`),
//! so padding fields are included and sizes must stay exact.
//!
//! Typed access is resolved at compile time: each field with a concrete
//! element type has a zero-sized marker in [`tags`] implementing [`FieldTag`],
//! which ties the field to its Rust element type.

use crate::math::{Mat3x4f, Vec2f, Vec3f};
use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of element kinds a buffer can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    F32,
    F64,
    I32,
    U32,
    U16,
    U8,
    Vec2F32,
    Vec3F32,
    Mat3x4F32,
    /// Opaque filler of the given byte width.
    Padding(u8),
}

impl ElementKind {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            ElementKind::F32 | ElementKind::I32 | ElementKind::U32 => 4,
            ElementKind::F64 => 8,
            ElementKind::U16 => 2,
            ElementKind::U8 => 1,
            ElementKind::Vec2F32 => 8,
            ElementKind::Vec3F32 => 12,
            ElementKind::Mat3x4F32 => 48,
            ElementKind::Padding(bytes) => bytes as usize,
        }
    }

    /// Alignment required when viewing raw bytes as this kind.
    pub const fn align(self) -> usize {
        match self {
            ElementKind::F64 => 8,
            ElementKind::F32
            | ElementKind::I32
            | ElementKind::U32
            | ElementKind::Vec2F32
            | ElementKind::Vec3F32
            | ElementKind::Mat3x4F32 => 4,
            ElementKind::U16 => 2,
            ElementKind::U8 | ElementKind::Padding(_) => 1,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Padding(bytes) => write!(f, "padding[{}]", bytes),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Rust types that may be stored in a buffer.
pub trait FieldElement: Pod + Send + Sync + 'static {
    const KIND: ElementKind;
}

macro_rules! impl_field_element {
    ($($ty:ty => $kind:expr),* $(,)?) => {
        $(
            impl FieldElement for $ty {
                const KIND: ElementKind = $kind;
            }
        )*
    };
}

impl_field_element! {
    f32 => ElementKind::F32,
    f64 => ElementKind::F64,
    i32 => ElementKind::I32,
    u32 => ElementKind::U32,
    u16 => ElementKind::U16,
    u8 => ElementKind::U8,
    Vec2f => ElementKind::Vec2F32,
    Vec3f => ElementKind::Vec3F32,
    Mat3x4f => ElementKind::Mat3x4F32,
}

/// Identifier of a point or ray attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    Xyz,
    IsHit,
    RayIdx,
    EntityId,
    Intensity,
    RingId,
    Azimuth,
    Elevation,
    Distance,
    ReturnType,
    TimeStamp,
    RayPose,
    Normal,
    RadialSpeed,
    Padding8,
    Padding16,
    Padding32,
    /// Packed byte stream produced by formatting; point size is node-defined.
    DynamicFormat,
}

impl Field {
    pub const ALL: [Field; 18] = [
        Field::Xyz,
        Field::IsHit,
        Field::RayIdx,
        Field::EntityId,
        Field::Intensity,
        Field::RingId,
        Field::Azimuth,
        Field::Elevation,
        Field::Distance,
        Field::ReturnType,
        Field::TimeStamp,
        Field::RayPose,
        Field::Normal,
        Field::RadialSpeed,
        Field::Padding8,
        Field::Padding16,
        Field::Padding32,
        Field::DynamicFormat,
    ];

    pub const fn element_kind(self) -> ElementKind {
        match self {
            Field::Xyz | Field::Normal => ElementKind::Vec3F32,
            Field::IsHit | Field::EntityId => ElementKind::I32,
            Field::RayIdx => ElementKind::U32,
            Field::Intensity
            | Field::Azimuth
            | Field::Elevation
            | Field::Distance
            | Field::RadialSpeed => ElementKind::F32,
            Field::RingId => ElementKind::U16,
            Field::ReturnType | Field::DynamicFormat => ElementKind::U8,
            Field::TimeStamp => ElementKind::F64,
            Field::RayPose => ElementKind::Mat3x4F32,
            Field::Padding8 => ElementKind::Padding(1),
            Field::Padding16 => ElementKind::Padding(2),
            Field::Padding32 => ElementKind::Padding(4),
        }
    }

    /// Byte size of one element of this field.
    #[inline]
    pub const fn size(self) -> usize {
        self.element_kind().size()
    }

    pub const fn is_padding(self) -> bool {
        matches!(self, Field::Padding8 | Field::Padding16 | Field::Padding32)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Xyz => "XYZ_VEC3_F32",
            Field::IsHit => "IS_HIT_I32",
            Field::RayIdx => "RAY_IDX_U32",
            Field::EntityId => "ENTITY_ID_I32",
            Field::Intensity => "INTENSITY_F32",
            Field::RingId => "RING_ID_U16",
            Field::Azimuth => "AZIMUTH_F32",
            Field::Elevation => "ELEVATION_F32",
            Field::Distance => "DISTANCE_F32",
            Field::ReturnType => "RETURN_TYPE_U8",
            Field::TimeStamp => "TIME_STAMP_F64",
            Field::RayPose => "RAY_POSE_MAT3x4_F32",
            Field::Normal => "NORMAL_VEC3_F32",
            Field::RadialSpeed => "RADIAL_SPEED_F32",
            Field::Padding8 => "PADDING_8",
            Field::Padding16 => "PADDING_16",
            Field::Padding32 => "PADDING_32",
            Field::DynamicFormat => "DYNAMIC_FORMAT",
        };
        f.write_str(name)
    }
}

/// Compile-time binding between a field and its element type.
pub trait FieldTag: 'static {
    const FIELD: Field;
    type Elem: FieldElement;
}

/// Zero-sized field markers for typed access.
pub mod tags {
    use super::{Field, FieldTag};
    use crate::math::{Mat3x4f, Vec3f};

    macro_rules! field_tags {
        ($($name:ident => $ty:ty),* $(,)?) => {
            $(
                #[derive(Debug, Clone, Copy)]
                pub struct $name;

                impl FieldTag for $name {
                    const FIELD: Field = Field::$name;
                    type Elem = $ty;
                }
            )*
        };
    }

    field_tags! {
        Xyz => Vec3f,
        IsHit => i32,
        RayIdx => u32,
        EntityId => i32,
        Intensity => f32,
        RingId => u16,
        Azimuth => f32,
        Elevation => f32,
        Distance => f32,
        ReturnType => u8,
        TimeStamp => f64,
        RayPose => Mat3x4f,
        Normal => Vec3f,
        RadialSpeed => f32,
        DynamicFormat => u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_table() {
        let expected = [
            (Field::Xyz, 12),
            (Field::IsHit, 4),
            (Field::RayIdx, 4),
            (Field::EntityId, 4),
            (Field::Intensity, 4),
            (Field::RingId, 2),
            (Field::Azimuth, 4),
            (Field::Elevation, 4),
            (Field::Distance, 4),
            (Field::ReturnType, 1),
            (Field::TimeStamp, 8),
            (Field::RayPose, 48),
            (Field::Normal, 12),
            (Field::RadialSpeed, 4),
            (Field::Padding8, 1),
            (Field::Padding16, 2),
            (Field::Padding32, 4),
            (Field::DynamicFormat, 1),
        ];
        for (field, size) in expected {
            assert_eq!(field.size(), size, "size of {}", field);
        }
        assert_eq!(expected.len(), Field::ALL.len());
    }

    #[test]
    fn test_rust_types_match_kind_sizes() {
        assert_eq!(std::mem::size_of::<Vec3f>(), ElementKind::Vec3F32.size());
        assert_eq!(std::mem::size_of::<Vec2f>(), ElementKind::Vec2F32.size());
        assert_eq!(std::mem::size_of::<Mat3x4f>(), ElementKind::Mat3x4F32.size());
        assert_eq!(std::mem::align_of::<Mat3x4f>(), ElementKind::Mat3x4F32.align());
    }

    fn tag_matches<T: FieldTag>() -> bool {
        <T::Elem as FieldElement>::KIND == T::FIELD.element_kind()
    }

    #[test]
    fn test_tags_agree_with_field_kinds() {
        assert!(tag_matches::<tags::Xyz>());
        assert!(tag_matches::<tags::IsHit>());
        assert!(tag_matches::<tags::RayIdx>());
        assert!(tag_matches::<tags::EntityId>());
        assert!(tag_matches::<tags::Intensity>());
        assert!(tag_matches::<tags::RingId>());
        assert!(tag_matches::<tags::Azimuth>());
        assert!(tag_matches::<tags::Elevation>());
        assert!(tag_matches::<tags::Distance>());
        assert!(tag_matches::<tags::ReturnType>());
        assert!(tag_matches::<tags::TimeStamp>());
        assert!(tag_matches::<tags::RayPose>());
        assert!(tag_matches::<tags::Normal>());
        assert!(tag_matches::<tags::RadialSpeed>());
        assert!(tag_matches::<tags::DynamicFormat>());
    }

    #[test]
    fn test_padding_fields() {
        assert!(Field::Padding16.is_padding());
        assert!(!Field::Distance.is_padding());
        assert_eq!(Field::Padding16.element_kind().to_string(), "padding[2]");
    }
}
