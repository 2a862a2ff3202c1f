//! Guest address space and memory system (`SPEC_FULL.md` §4.1).

mod address_space;
mod map;
mod mirror;
mod region;

pub use address_space::{abort_on_init_failure, MemorySystem, SharedMemoryObject};
pub use map::{flatten, AddressMap, AddressMapEntry, PageEntry, NUM_PAGES, PAGE_BITS, PAGE_SIZE};
pub use mirror::MirrorIterator;
pub use region::{MmioHandler, Region, RegionHandle, RegionKind, RegionTable, ALLOCATION_GRANULARITY, NULL_REGION};

#[cfg(test)]
mod tests {
    use super::*;

    struct RamHandler(Vec<u8>);
    impl MmioHandler for RamHandler {
        fn read8(&mut self, offset: u32) -> u8 {
            self.0[offset as usize]
        }
        fn write8(&mut self, offset: u32, v: u8) {
            self.0[offset as usize] = v;
        }
    }

    #[test]
    fn mmio_region_round_trips_through_page_table() {
        let mut mem = MemorySystem::new();
        let region = mem
            .create_mmio_region("pad", 0x100, Box::new(RamHandler(vec![0u8; 0x100])))
            .unwrap();
        let map = AddressMap::new().mount_region(0x1f000000, 0xffffffff, 0x100, region, 0);
        mem.init(&[map]).unwrap();
        mem.write8(0, 0x1f000010, 0x42);
        assert_eq!(mem.read8(0, 0x1f000010), 0x42);
    }
}
