//! Parameter Control Word decoding (`SPEC_FULL.md` §4.3).
//!
//! Grounded on `examples/original_source/src/hw/pvr/ta.c`'s `ta_get_poly_type_raw` /
//! `ta_get_vert_type_raw` / `ta_get_param_size_raw`: the first word of every TA command selects
//! a parameter kind, a list kind, and a set of format bits, which together determine how many
//! bytes the rest of the command occupies and how the vertex parameters that follow it are laid
//! out.

use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct PcwFlags: u32 {
        const UV_16BIT    = 1 << 0;
        const GOURAUD     = 1 << 1;
        const OFFSET      = 1 << 2;
        const TEXTURE     = 1 << 3;
        const VOLUME      = 1 << 6;
        const SHADOW      = 1 << 7;
        const END_OF_STRIP = 1 << 28;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum ParamType {
    EndOfList = 0,
    UserTileClip = 1,
    ObjectListSet = 2,
    Reserved3 = 3,
    PolyOrVolume = 4,
    Sprite = 5,
    Reserved6 = 6,
    Vertex = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum ListType {
    Opaque = 0,
    OpaqueModVol = 1,
    Translucent = 2,
    TranslucentModVol = 3,
    PunchThrough = 4,
}

/// The sentinel used for "no list/vertex type currently established", matching the original's
/// `TA_NUM_LISTS`/`TA_NUM_VERTS` out-of-range markers.
pub const NO_LIST_TYPE: u32 = 5;
pub const NO_VERTEX_TYPE: u32 = 18;

#[derive(Debug, Clone, Copy)]
pub struct Pcw(pub u32);

impl Pcw {
    pub fn flags(&self) -> PcwFlags {
        PcwFlags::from_bits_truncate(self.0)
    }

    pub fn col_type(&self) -> u32 {
        (self.0 >> 4) & 0x3
    }

    pub fn list_type_raw(&self) -> u32 {
        (self.0 >> 24) & 0x7
    }

    pub fn list_type(&self) -> Option<ListType> {
        ListType::from_u32(self.list_type_raw())
    }

    pub fn param_type_raw(&self) -> u32 {
        (self.0 >> 29) & 0x7
    }

    pub fn param_type(&self) -> ParamType {
        ParamType::from_u32(self.param_type_raw()).unwrap_or(ParamType::Reserved3)
    }
}

/// Derives the poly type (0..=6) that selects the layout of the poly-parameter command
/// following a `PolyOrVolume`/`Sprite` parameter header. Ported branch-for-branch (including
/// fallthrough) from `ta_get_poly_type_raw`: the list-type and sprite checks are tested first,
/// `volume` is keyed on `col_type` alone (independent of the texture bit), and only then does
/// an untextured/textured fallback chain run.
pub fn poly_type(pcw: Pcw) -> u32 {
    let f = pcw.flags();
    let col_type = pcw.col_type();

    if matches!(pcw.list_type(), Some(ListType::OpaqueModVol) | Some(ListType::TranslucentModVol)) {
        return 6;
    }
    if pcw.param_type() == ParamType::Sprite {
        return 5;
    }
    if f.contains(PcwFlags::VOLUME) {
        if col_type == 0 {
            return 3;
        }
        if col_type == 2 {
            return 4;
        }
        if col_type == 3 {
            return 3;
        }
    }
    if col_type == 0 || col_type == 1 || col_type == 3 {
        return 0;
    }
    let textured = f.contains(PcwFlags::TEXTURE);
    let offset = f.contains(PcwFlags::OFFSET);
    if col_type == 2 && textured && !offset {
        return 1;
    }
    if col_type == 2 && textured && offset {
        return 2;
    }
    if col_type == 2 && !textured {
        return 1;
    }
    0
}

/// Derives the vertex type (0..=17) that selects the layout of subsequent `Vertex` commands,
/// from a poly/sprite header's own PCW. Ported branch-for-branch from `ta_get_vert_type_raw`,
/// including its volume-then-texture fallthrough: a volume command with `col_type == 1` matches
/// none of the volume sub-branches and falls through into the non-volume texture/color chain.
pub fn vertex_type(pcw: Pcw) -> u32 {
    let f = pcw.flags();
    let col_type = pcw.col_type();
    let textured = f.contains(PcwFlags::TEXTURE);
    let uv16 = f.contains(PcwFlags::UV_16BIT);

    if matches!(pcw.list_type(), Some(ListType::OpaqueModVol) | Some(ListType::TranslucentModVol)) {
        return 17;
    }
    if pcw.param_type() == ParamType::Sprite {
        return if textured { 16 } else { 15 };
    }
    if f.contains(PcwFlags::VOLUME) {
        if textured {
            if col_type == 0 {
                return if uv16 { 12 } else { 11 };
            }
            if col_type == 2 || col_type == 3 {
                return if uv16 { 14 } else { 13 };
            }
        }
        if col_type == 0 {
            return 9;
        }
        if col_type == 2 || col_type == 3 {
            return 10;
        }
    }
    if textured {
        if col_type == 0 {
            return if uv16 { 4 } else { 3 };
        }
        if col_type == 1 {
            return if uv16 { 6 } else { 5 };
        }
        if col_type == 2 || col_type == 3 {
            return if uv16 { 8 } else { 7 };
        }
    }
    if col_type == 0 {
        return 0;
    }
    if col_type == 1 {
        return 1;
    }
    if col_type == 2 || col_type == 3 {
        return 2;
    }
    0
}

/// Command size in bytes: every TA command is either one or two 32-byte blocks. Ported from
/// `ta_get_param_size_raw`: polys are 32 bytes only when their derived poly type is 0, 1, or 3;
/// sprites are always 32; vertex size depends on the vertex type established by the last
/// poly/sprite header, with the 32-byte set being `{0,1,2,3,4,7,8,9,10}`.
pub fn param_size(pcw: Pcw, current_vertex_type: u32) -> u32 {
    match pcw.param_type() {
        ParamType::Vertex => vertex_size(current_vertex_type),
        ParamType::Sprite => 32,
        ParamType::PolyOrVolume => {
            let t = poly_type(pcw);
            if t == 0 || t == 1 || t == 3 {
                32
            } else {
                64
            }
        }
        _ => 32,
    }
}

fn vertex_size(vertex_type: u32) -> u32 {
    match vertex_type {
        0 | 1 | 2 | 3 | 4 | 7 | 8 | 9 | 10 => 32,
        _ => 64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_type_decodes_from_top_bits() {
        let pcw = Pcw(0 << 29);
        assert_eq!(pcw.param_type(), ParamType::EndOfList);
        let pcw = Pcw(7 << 29);
        assert_eq!(pcw.param_type(), ParamType::Vertex);
    }

    #[test]
    fn untextured_opaque_poly_is_type_zero() {
        let pcw = Pcw(4 << 29);
        assert_eq!(poly_type(pcw), 0);
    }

    #[test]
    fn col_type_zero_poly_is_32_bytes_even_when_textured() {
        // col_type 0/1/3 always resolve to poly type 0 regardless of the texture bit, per
        // `ta_get_poly_type_raw`'s fallback chain.
        let pcw = Pcw((4 << 29) | PcwFlags::TEXTURE.bits());
        assert_eq!(poly_type(pcw), 0);
        assert_eq!(param_size(pcw, NO_VERTEX_TYPE), 32);
    }

    #[test]
    fn textured_offset_col_type_two_poly_is_64_bytes() {
        let pcw = Pcw((4 << 29) | PcwFlags::TEXTURE.bits() | PcwFlags::OFFSET.bits() | (2 << 4));
        assert_eq!(poly_type(pcw), 2);
        assert_eq!(param_size(pcw, NO_VERTEX_TYPE), 64);
    }

    #[test]
    fn sprite_param_type_is_poly_type_five_regardless_of_col_type() {
        let pcw = Pcw(5 << 29);
        assert_eq!(poly_type(pcw), 5);
        assert_eq!(param_size(pcw, NO_VERTEX_TYPE), 32);
        assert_eq!(vertex_type(pcw), 15);
        let textured = Pcw((5 << 29) | PcwFlags::TEXTURE.bits());
        assert_eq!(vertex_type(textured), 16);
    }

    #[test]
    fn volume_poly_type_is_keyed_on_col_type_alone() {
        // volume && col_type == 2 is poly type 4 whether or not the texture bit is set.
        let untextured = Pcw((4 << 29) | PcwFlags::VOLUME.bits() | (2 << 4));
        assert_eq!(poly_type(untextured), 4);
        let textured = Pcw((4 << 29) | PcwFlags::VOLUME.bits() | PcwFlags::TEXTURE.bits() | (2 << 4));
        assert_eq!(poly_type(textured), 4);
    }

    #[test]
    fn modvol_list_type_is_poly_type_six_vertex_type_seventeen() {
        let pcw = Pcw((4 << 29) | (1 << 24)); // list_type = OpaqueModVol
        assert_eq!(poly_type(pcw), 6);
        assert_eq!(vertex_type(pcw), 17);
    }
}
