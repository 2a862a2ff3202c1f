//! Video resolution derivation (`SPEC_FULL.md` §6.2).
//!
//! Grounded on `examples/original_source/src/hw/pvr/ta.c`'s `ta_save_state` video-size
//! computation: base resolution picked from the SPG timing mode, then adjusted by pixel
//! doubling, interlace, and the 6.10 fixed-point scaler.

#[derive(Debug, Clone, Copy, Default)]
pub struct SpgControl {
    pub ntsc: bool,
    pub pal: bool,
    pub interlace: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScalerControl {
    pub scale_x: bool,
    pub interlace: bool,
    /// 6.10 fixed-point vertical scale factor.
    pub scale_y: u32,
}

pub fn derive_resolution(spg: SpgControl, pixel_double: bool, scaler: ScalerControl) -> (u32, u32) {
    let (mut w, mut h) = if !spg.ntsc && !spg.pal && !spg.interlace {
        (640, 480)
    } else {
        (640, 240)
    };

    if pixel_double {
        w /= 2;
    }
    if spg.interlace {
        h *= 2;
    }
    if scaler.scale_x {
        w *= 2;
    }
    if !scaler.interlace {
        h = (h * scaler.scale_y) >> 10;
    }

    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progressive_vga_default() {
        let spg = SpgControl::default();
        let scaler = ScalerControl {
            scale_x: false,
            interlace: true,
            scale_y: 1 << 10,
        };
        assert_eq!(derive_resolution(spg, false, scaler), (640, 480));
    }

    #[test]
    fn ntsc_interlaced_240p_doubles_to_480() {
        let spg = SpgControl {
            ntsc: true,
            pal: false,
            interlace: true,
        };
        let scaler = ScalerControl {
            scale_x: false,
            interlace: true,
            scale_y: 1 << 10,
        };
        assert_eq!(derive_resolution(spg, false, scaler), (640, 480));
    }
}
