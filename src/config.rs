//! Construction-time configuration surface for a [`crate::machine::Machine`].
//!
//! This is not a persistence format for a user-facing settings screen (out of scope, see
//! `SPEC_FULL.md` §1) — it is the parameter surface the core itself needs at construction time.
//! A host may load a TOML file and then overlay explicit builder calls on top of it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub system_ram_size: usize,
    pub video_ram_size: usize,
    pub audio_ram_size: usize,
    pub boot_rom_size: usize,
    pub boot_flash_size: usize,
    /// Nanoseconds between `STARTRENDER` and the forced `finish_render` deadline.
    pub render_deadline_ns: i64,
    pub texture_cache_capacity: usize,
    pub timer_pool_capacity: usize,
    /// `env_logger`-style filter string, e.g. `"dc_core=debug"`. Not applied automatically —
    /// a host binary reads this and hands it to its own `env_logger::Builder`.
    pub log_filter: String,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            system_ram_size: 16 * 1024 * 1024,
            video_ram_size: 8 * 1024 * 1024,
            audio_ram_size: 2 * 1024 * 1024,
            boot_rom_size: 2 * 1024 * 1024,
            boot_flash_size: 128 * 1024,
            render_deadline_ns: 10_000_000,
            texture_cache_capacity: 8192,
            timer_pool_capacity: 128,
            log_filter: "warn".to_string(),
        }
    }
}

impl MachineConfig {
    pub fn from_toml_str(s: &str) -> crate::error::Result<Self> {
        let cfg: MachineConfig = toml::from_str(s)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = MachineConfig::default();
        assert_eq!(cfg.timer_pool_capacity, 128);
        assert_eq!(cfg.render_deadline_ns, 10_000_000);
    }

    #[test]
    fn partial_toml_overlays_defaults() {
        let cfg = MachineConfig::from_toml_str("texture_cache_capacity = 4096\n").unwrap();
        assert_eq!(cfg.texture_cache_capacity, 4096);
        assert_eq!(cfg.system_ram_size, MachineConfig::default().system_ram_size);
    }
}
