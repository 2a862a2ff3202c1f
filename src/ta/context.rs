//! Per-frame render context and the TA command parser (`SPEC_FULL.md` §4.3).
//!
//! Grounded on `examples/original_source/src/hw/pvr/ta.c`'s `ta_write_context`,
//! `ta_init_context`, `ta_cont_context`, `ta_demand_context`, and `ta_save_state`.

use crate::fatal;
use super::pcw::{ListType, ParamType, Pcw, NO_LIST_TYPE, NO_VERTEX_TYPE};
use log::{trace, warn};
use num_traits::FromPrimitive;

pub const MAX_CONTEXTS: usize = 16;
/// Bounded to the largest real display-list parameter buffer a frame ever produces.
pub const MAX_PARAM_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListInterrupt {
    Opaque,
    OpaqueModVol,
    Translucent,
    TranslucentModVol,
    PunchThrough,
}

impl ListInterrupt {
    fn from_list_type(lt: ListType) -> Self {
        match lt {
            ListType::Opaque => ListInterrupt::Opaque,
            ListType::OpaqueModVol => ListInterrupt::OpaqueModVol,
            ListType::Translucent => ListInterrupt::Translucent,
            ListType::TranslucentModVol => ListInterrupt::TranslucentModVol,
            ListType::PunchThrough => ListInterrupt::PunchThrough,
        }
    }
}

/// PVR register state captured at `STARTRENDER`, frozen into the context so the asynchronous
/// render can proceed independently of further guest register writes (`SPEC_FULL.md` §4.3,
/// "State capture").
#[derive(Debug, Clone, Default)]
pub struct RenderState {
    pub autosort: bool,
    pub texture_stride: u32,
    pub palette_8bpp: bool,
    pub video_width: u32,
    pub video_height: u32,
    pub background_isp: u32,
    pub background_tsp: u32,
    pub background_tcw: u32,
    pub background_depth: f32,
    pub punch_through_alpha_ref: u8,
    pub background_vertices: [[u8; 64]; 3],
}

pub struct TaContext {
    pub base_address: u32,
    pub params: Vec<u8>,
    pub cursor: usize,
    pub size: usize,
    pub list_type: u32,
    pub vertex_type: u32,
    pub frame: u64,
    pub rendering: bool,
    pub state: RenderState,
}

impl TaContext {
    pub fn new(base_address: u32) -> Self {
        TaContext {
            base_address,
            params: Vec::with_capacity(4096),
            cursor: 0,
            size: 0,
            list_type: NO_LIST_TYPE,
            vertex_type: NO_VERTEX_TYPE,
            frame: 0,
            rendering: false,
            state: RenderState::default(),
        }
    }

    /// `TA_LIST_INIT`: full reset of cursor, size, and parse state.
    pub fn init_context(&mut self) {
        self.params.clear();
        self.cursor = 0;
        self.size = 0;
        self.list_type = NO_LIST_TYPE;
        self.vertex_type = NO_VERTEX_TYPE;
    }

    /// `TA_LIST_CONT`. Per `ta_cont_context`, the cursor and accumulated size are retained —
    /// only the list/vertex parse state resets, so continuing a list picks up mid-buffer rather
    /// than rewinding it. See the Open Question note in `SPEC_FULL.md` §9.
    pub fn cont_context(&mut self) {
        self.list_type = NO_LIST_TYPE;
        self.vertex_type = NO_VERTEX_TYPE;
    }

    fn established_list_type(&self) -> Option<ListType> {
        ListType::from_u32(self.list_type)
    }

    /// Appends `data` to the parameter buffer and parses every complete 32-byte command
    /// boundary that becomes available, invoking `on_list_complete` once per raised end-of-list
    /// interrupt. Returns an error (fatal per §7) on buffer overflow or an unsupported
    /// parameter type.
    pub fn write(&mut self, data: &[u8], mut on_list_complete: impl FnMut(ListInterrupt)) {
        if self.size + data.len() > MAX_PARAM_BYTES {
            fatal!("TA context parameter buffer overflow (size={} + {})", self.size, data.len());
        }
        self.params.extend_from_slice(data);
        self.size += data.len();

        while self.cursor + 32 <= self.size {
            let pcw = Pcw(u32::from_le_bytes(self.params[self.cursor..self.cursor + 4].try_into().unwrap()));
            let needed = super::pcw::param_size(pcw, self.vertex_type) as usize;
            if self.cursor + needed > self.size {
                break;
            }

            match pcw.param_type() {
                ParamType::EndOfList => {
                    if let Some(lt) = self.established_list_type() {
                        on_list_complete(ListInterrupt::from_list_type(lt));
                    }
                    self.list_type = NO_LIST_TYPE;
                    self.vertex_type = NO_VERTEX_TYPE;
                }
                ParamType::UserTileClip => {
                    trace!("user tile clip consumed at cursor {}", self.cursor);
                }
                ParamType::ObjectListSet => {
                    fatal!("object list set parameter is unsupported");
                }
                ParamType::PolyOrVolume | ParamType::Sprite => {
                    if self.list_type == NO_LIST_TYPE {
                        if let Some(lt) = pcw.list_type() {
                            self.list_type = lt as u32;
                        }
                    }
                    // `ta_vert_type` derives purely from this header's own PCW, not from the
                    // context's established list type.
                    self.vertex_type = super::pcw::vertex_type(pcw);
                }
                ParamType::Vertex => {
                    // no state transition; just consumed.
                }
                ParamType::Reserved3 | ParamType::Reserved6 => {
                    warn!("reserved TA parameter type {} consumed", pcw.param_type_raw());
                }
            }

            self.cursor += needed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end_of_list_cmd() -> Vec<u8> {
        let mut v = vec![0u8; 32];
        v[3] = 0; // param_type bits at top of word: 0 << 29 handled below
        let pcw: u32 = 0 << 29;
        v[0..4].copy_from_slice(&pcw.to_le_bytes());
        v
    }

    fn opaque_poly_cmd() -> Vec<u8> {
        let mut v = vec![0u8; 32];
        let pcw: u32 = (4u32 << 29) | (0u32 << 24); // PolyOrVolume, Opaque list
        v[0..4].copy_from_slice(&pcw.to_le_bytes());
        v
    }

    #[test]
    fn end_of_list_raises_interrupt_once_and_resets_state() {
        let mut ctx = TaContext::new(0x1000_0000);
        ctx.init_context();
        let mut fired = Vec::new();
        ctx.write(&opaque_poly_cmd(), |i| fired.push(i));
        ctx.write(&end_of_list_cmd(), |i| fired.push(i));
        assert_eq!(fired, vec![ListInterrupt::Opaque]);
        assert_eq!(ctx.list_type, NO_LIST_TYPE);
        assert_eq!(ctx.vertex_type, NO_VERTEX_TYPE);
    }

    #[test]
    fn cont_context_retains_cursor_and_size() {
        let mut ctx = TaContext::new(0x1000_0000);
        ctx.init_context();
        ctx.write(&opaque_poly_cmd(), |_| {});
        let size_before = ctx.size;
        let cursor_before = ctx.cursor;
        ctx.cont_context();
        assert_eq!(ctx.size, size_before);
        assert_eq!(ctx.cursor, cursor_before);
        assert_eq!(ctx.list_type, NO_LIST_TYPE);
    }
}
