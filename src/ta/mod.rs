//! Tile Accelerator command processor (`SPEC_FULL.md` §4.3).

pub mod context;
pub mod pcw;
pub mod texture;
pub mod trace;
pub mod yuv;

use crate::error::Result;
use crate::fatal;
use crate::host::HostCallbacks;
use crate::scheduler::Scheduler;
use crate::video::{derive_resolution, ScalerControl, SpgControl};
use context::{ListInterrupt, TaContext, MAX_CONTEXTS};
use log::trace;
use texture::{TextureCache, TextureKey};
use yuv::YuvConverter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptLine {
    List(ListInterrupt),
    RenderDoneVideo,
    RenderDoneImage,
    RenderDoneTransfer,
    YuvDone,
}

/// Registers that `ta_save_state` reads when freezing render state; the device wiring these to
/// real MMIO is the `Holly`/PVR register block, out of this module's detailed scope. The TA
/// accepts them as a plain struct so `start_render` can be exercised without a full register
/// file.
#[derive(Debug, Clone, Default)]
pub struct PvrRegisterSnapshot {
    pub region_header_type_bit29: bool,
    pub presort: bool,
    pub region_header_word: u32,
    pub texture_stride_words: u32,
    pub palette_8bpp: bool,
    pub spg: SpgControl,
    pub pixel_double: bool,
    pub scaler: ScalerControl,
    pub isp_backgnd_t_tag_address: u32,
    pub isp_backgnd_skip: u32,
    pub shadow: bool,
    pub intensity_volume_mode: bool,
    pub punch_through_alpha_ref: u8,
}

pub struct TaProcessor {
    contexts: Vec<TaContext>,
    current: Option<usize>,
    rendering: Option<usize>,
    render_timer: Option<crate::scheduler::TimerHandle>,
    render_deadline_ns: i64,
    textures: TextureCache,
    yuv: Option<YuvConverter>,
    yuv_tex_base: u32,
}

impl TaProcessor {
    pub fn new(texture_cache_capacity: usize, render_deadline_ns: i64) -> Self {
        TaProcessor {
            contexts: Vec::with_capacity(MAX_CONTEXTS),
            current: None,
            rendering: None,
            render_timer: None,
            render_deadline_ns,
            textures: TextureCache::new(texture_cache_capacity),
            yuv: None,
            yuv_tex_base: 0,
        }
    }

    fn find_or_alloc(&mut self, base_address: u32) -> usize {
        if let Some(idx) = self.contexts.iter().position(|c| c.base_address == base_address) {
            return idx;
        }
        if self.contexts.len() >= MAX_CONTEXTS {
            fatal!("TA context pool exhausted (capacity {})", MAX_CONTEXTS);
        }
        self.contexts.push(TaContext::new(base_address));
        self.contexts.len() - 1
    }

    pub fn list_init(&mut self, base_address: u32) {
        let idx = self.find_or_alloc(base_address);
        self.contexts[idx].init_context();
        self.current = Some(idx);
    }

    pub fn list_cont(&mut self) {
        if let Some(idx) = self.current {
            self.contexts[idx].cont_context();
        }
    }

    /// FIFO poly band: must be written in 32-byte multiples.
    pub fn fifo_write_poly(&mut self, data: &[u8], mut raise: impl FnMut(InterruptLine)) -> Result<()> {
        if data.len() % 32 != 0 {
            fatal!("poly FIFO write size {} is not a multiple of 32", data.len());
        }
        let idx = match self.current {
            Some(idx) => idx,
            None => fatal!("poly FIFO write with no active TA context"),
        };
        self.contexts[idx].write(data, |interrupt| raise(InterruptLine::List(interrupt)));
        Ok(())
    }

    pub fn yuv_init(&mut self, u_size: u32, v_size: u32, yuv_tex_base: u32) {
        self.yuv = Some(YuvConverter::new(u_size, v_size));
        self.yuv_tex_base = yuv_tex_base;
    }

    /// FIFO YUV band: consumes exactly one 384-byte macroblock per call.
    pub fn fifo_write_yuv(&mut self, block: &[u8; 384], out: &mut [u8], out_stride: usize, mut raise: impl FnMut(InterruptLine)) {
        let done = match self.yuv.as_mut() {
            Some(conv) => conv.process_macroblock(block, out, out_stride),
            None => fatal!("YUV FIFO write with converter not initialized"),
        };
        if done {
            raise(InterruptLine::YuvDone);
        }
    }

    /// Re-scans a context's parameter stream registering every distinct texture source before
    /// render handoff, per `ta_register_texture_sources`.
    fn register_texture_sources(&mut self, idx: usize, frame: u64) {
        // A full re-scan needs the poly-parameter layout decoder to pull TSP/TCW words out of
        // each textured command; here we scan for any 64-byte command (the textured encoding)
        // and read its TSP/TCW from the fixed offsets the poly layouts share.
        let params = &self.contexts[idx].params;
        let mut cursor = 0usize;
        let mut found = Vec::new();
        while cursor + 32 <= params.len() {
            let pcw = pcw::Pcw(u32::from_le_bytes(params[cursor..cursor + 4].try_into().unwrap()));
            let size = pcw::param_size(pcw, self.contexts[idx].vertex_type) as usize;
            if cursor + size > params.len() {
                break;
            }
            if matches!(pcw.param_type(), pcw::ParamType::PolyOrVolume | pcw::ParamType::Sprite)
                && pcw.flags().contains(pcw::PcwFlags::TEXTURE)
                && cursor + 12 <= params.len()
            {
                let tsp = u32::from_le_bytes(params[cursor + 4..cursor + 8].try_into().unwrap());
                let tcw = u32::from_le_bytes(params[cursor + 8..cursor + 12].try_into().unwrap());
                found.push(TextureKey { tsp, tcw });
            }
            cursor += size;
        }
        for key in found {
            let _ = self.textures.register(key, frame);
        }
    }

    fn capture_state(&self, idx: usize, regs: &PvrRegisterSnapshot, video_ram: &[u8]) -> context::RenderState {
        let autosort = if regs.region_header_type_bit29 {
            regs.region_header_word & (1 << 29) != 0
        } else {
            !regs.presort
        };

        let (video_width, video_height) = derive_resolution(regs.spg, regs.pixel_double, regs.scaler);

        let bg_addr = (self.contexts[idx].base_address.wrapping_add(regs.isp_backgnd_t_tag_address * 4)) & 0x007f_ffff;
        let read_word = |off: u32| -> u32 {
            let base = bg_addr as usize + off as usize;
            if base + 4 <= video_ram.len() {
                u32::from_le_bytes(video_ram[base..base + 4].try_into().unwrap())
            } else {
                0
            }
        };
        let background_isp = read_word(0);
        let background_tsp = read_word(4);
        let background_tcw = read_word(8);

        let mut skip = regs.isp_backgnd_skip;
        if regs.shadow && !regs.intensity_volume_mode {
            skip *= 2;
        }
        let vertex_stride = ((skip + 3) * 4) as usize;

        let mut background_vertices = [[0u8; 64]; 3];
        for (i, vertex) in background_vertices.iter_mut().enumerate() {
            let off = bg_addr as usize + 12 + i * vertex_stride;
            let n = vertex_stride.min(64);
            if off + n <= video_ram.len() {
                vertex[..n].copy_from_slice(&video_ram[off..off + n]);
            }
        }

        context::RenderState {
            autosort,
            texture_stride: regs.texture_stride_words * 32,
            palette_8bpp: regs.palette_8bpp,
            video_width,
            video_height,
            background_isp,
            background_tsp,
            background_tcw,
            background_depth: 0.0,
            punch_through_alpha_ref: regs.punch_through_alpha_ref,
            background_vertices,
        }
    }

    /// `STARTRENDER`: hands the context at `param_base` to the host and schedules the
    /// render-complete acknowledgement timer.
    pub fn start_render(
        &mut self,
        param_base: u32,
        regs: &PvrRegisterSnapshot,
        video_ram: &[u8],
        scheduler: &mut Scheduler,
        host: &mut dyn HostCallbacks,
        mut raise: impl FnMut(InterruptLine) + 'static,
    ) -> Result<()> {
        let idx = match self.contexts.iter().position(|c| c.base_address == param_base) {
            Some(idx) => idx,
            None => fatal!("STARTRENDER with no context at base {:#010x}", param_base),
        };
        self.textures.drain_invalidated();
        self.register_texture_sources(idx, self.contexts[idx].frame);
        let state = self.capture_state(idx, regs, video_ram);
        self.contexts[idx].state = state;
        self.contexts[idx].frame += 1;
        self.contexts[idx].rendering = true;
        self.rendering = Some(idx);

        host.start_render(&self.contexts[idx]);
        trace!("STARTRENDER base={:#010x} frame={}", param_base, self.contexts[idx].frame);

        let deadline = self.render_deadline_ns;
        self.render_timer = Some(scheduler.start_timer(
            deadline,
            Box::new(move |_s| {
                raise(InterruptLine::RenderDoneVideo);
                raise(InterruptLine::RenderDoneImage);
                raise(InterruptLine::RenderDoneTransfer);
            }),
        )?);
        Ok(())
    }

    /// Host acknowledgement: releases the rendering context back to the free pool.
    pub fn finish_render(&mut self, host: &mut dyn HostCallbacks) {
        if let Some(idx) = self.rendering.take() {
            self.contexts[idx].rendering = false;
            host.finish_render();
        }
        self.render_timer = None;
    }

    pub fn texture_cache_mut(&mut self) -> &mut TextureCache {
        &mut self.textures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;

    #[test]
    fn start_render_schedules_deadline_and_raises_on_fire() {
        let mut ta = TaProcessor::new(64, 10_000_000);
        ta.list_init(0x1000_0000);
        let mut sched = Scheduler::new(8);
        let mut host = NullHost::default();
        let regs = PvrRegisterSnapshot::default();
        let video_ram = vec![0u8; 64];
        let fired = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let f = fired.clone();
        ta.start_render(0x1000_0000, &regs, &video_ram, &mut sched, &mut host, move |i| f.borrow_mut().push(i))
            .unwrap();
        assert_eq!(host.renders_started, 1);
        sched.tick(10_000_000, &mut []);
        assert_eq!(fired.borrow().len(), 3);
    }
}
