//! Texture source registration and cache (`SPEC_FULL.md` §4.3, "Texture source registration").
//!
//! Grounded on `examples/original_source/src/hw/pvr/ta.c`'s `ta_register_texture_source` and
//! `ta_alloc_texture`/`ta_find_texture`.

use std::collections::HashMap;

/// TSP and TCW are each a 32-bit PVR texture descriptor word; together they identify a unique
/// texture binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureKey {
    pub tsp: u32,
    pub tcw: u32,
}

#[derive(Debug, Clone)]
pub struct PaletteRef {
    pub addr: u32,
    pub size: u32,
}

#[derive(Debug, Clone)]
pub struct TextureEntry {
    pub key: TextureKey,
    pub texel_addr: u32,
    pub texel_size: u32,
    pub palette: Option<PaletteRef>,
    pub last_frame: u64,
    pub dirty: bool,
}

pub struct TextureCache {
    entries: HashMap<TextureKey, TextureEntry>,
    capacity: usize,
    invalidated: Vec<TextureKey>,
}

impl TextureCache {
    pub fn new(capacity: usize) -> Self {
        TextureCache {
            entries: HashMap::with_capacity(capacity),
            capacity,
            invalidated: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.invalidated.clear();
    }

    /// Queues `key` for invalidation; actually dirtying happens at the next safe point
    /// (`drain_invalidated`), matching the two-phase write-watch rule in `SPEC_FULL.md` §5.
    pub fn queue_invalidate(&mut self, key: TextureKey) {
        self.invalidated.push(key);
    }

    pub fn drain_invalidated(&mut self) {
        for key in self.invalidated.drain(..) {
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.dirty = true;
            }
        }
    }

    /// Registers (or re-touches) the texture source for `key`, computing its texel and palette
    /// addresses from the TCW the way `ta_register_texture_source` does.
    pub fn register(&mut self, key: TextureKey, frame: u64) -> crate::error::Result<&TextureEntry> {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.last_frame = frame;
            entry.dirty = false;
            return Ok(self.entries.get(&key).unwrap());
        }
        if self.entries.len() >= self.capacity {
            return Err(crate::error::Error::TextureCacheFull(self.capacity));
        }
        let texel_addr = (key.tcw & 0x001f_ffff) << 3;
        let (width, height, bpp) = decode_dimensions(key.tsp, key.tcw);
        let texel_size = (width as u32 * height as u32 * bpp as u32) / 8;

        let palette = decode_palette(key.tcw);

        let entry = TextureEntry {
            key,
            texel_addr,
            texel_size,
            palette,
            last_frame: frame,
            dirty: false,
        };
        self.entries.insert(key, entry);
        Ok(self.entries.get(&key).unwrap())
    }
}

/// Texture pixel formats relevant to palette addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    Palette4Bpp,
    Palette8Bpp,
    Other,
}

fn pixel_format(tcw: u32) -> PixelFormat {
    match (tcw >> 27) & 0x7 {
        5 => PixelFormat::Palette4Bpp,
        6 => PixelFormat::Palette8Bpp,
        _ => PixelFormat::Other,
    }
}

fn decode_dimensions(tsp: u32, _tcw: u32) -> (u32, u32, u32) {
    let u_size = 8u32 << (tsp & 0x7);
    let v_size = 8u32 << ((tsp >> 3) & 0x7);
    let bpp = 16;
    (u_size, v_size, bpp)
}

/// 4bpp palettes live in a 16-entry bank selected by the high bits of the selector, 8bpp in a
/// 256-entry bank selected by a narrower selector field, per `ta_register_texture_source`.
fn decode_palette(tcw: u32) -> Option<PaletteRef> {
    let selector = (tcw >> 21) & 0x3f;
    match pixel_format(tcw) {
        PixelFormat::Palette4Bpp => Some(PaletteRef {
            addr: (selector << 4) * 4,
            size: 16 * 4,
        }),
        PixelFormat::Palette8Bpp => Some(PaletteRef {
            addr: ((selector & 0x30) << 4) * 4,
            size: 256 * 4,
        }),
        PixelFormat::Other => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_4bpp_addressing_matches_selector_shift() {
        let tcw = (5u32 << 27) | (0x3 << 21);
        let p = decode_palette(tcw).unwrap();
        assert_eq!(p.size, 64);
        assert_eq!(p.addr, (0x3 << 4) * 4);
    }

    #[test]
    fn register_is_idempotent_within_a_frame() {
        let mut cache = TextureCache::new(4);
        let key = TextureKey { tsp: 0, tcw: 0 };
        cache.register(key, 1).unwrap();
        cache.register(key, 1).unwrap();
        assert_eq!(cache.entries.len(), 1);
    }
}
