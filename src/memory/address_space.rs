//! Host memory reservation and guest address dispatch (`SPEC_FULL.md` §4.1, §4.1.1).
//!
//! Grounded on `examples/original_source/src/memory.c`'s `reserve_address_space`,
//! `as_translate`/`as_lookup`, and on `examples/StephanvanSchaik-hy-rs/src/mmap.rs` for the
//! shape of a safe wrapper around raw host mappings. The 4 GiB reservation and the
//! `MAP_FIXED` re-mapping of a shared backing object are done with `libc` directly: no safe
//! mmap abstraction in the corpus supports remapping physical pages at a chosen offset inside
//! an existing reservation, which is exactly what aliasing two address spaces onto the same RAM
//! requires.

use crate::error::{Error, Result};
use crate::fatal;
use super::map::{flatten, AddressMap, PageEntry, NUM_PAGES, PAGE_BITS, PAGE_SIZE};
use super::region::{Region, RegionHandle, RegionKind, RegionTable, ALLOCATION_GRANULARITY, NULL_REGION};
use log::{debug, warn};
use std::ptr;

const RESERVATION_SIZE: usize = 1usize << 32;

/// A `memfd`-backed anonymous shared-memory object. Physical regions are slabs carved out of
/// this object so that two address spaces can `MAP_FIXED` the same bytes at different guest
/// offsets (the SH-4 and ARM7 views of system RAM, for instance).
pub struct SharedMemoryObject {
    fd: libc::c_int,
    size: usize,
}

impl SharedMemoryObject {
    fn new(size: usize) -> Result<Self> {
        let name = b"dc-core-shmem\0";
        let fd = unsafe { libc::memfd_create(name.as_ptr() as *const libc::c_char, 0) };
        if fd < 0 {
            return Err(Error::AddressSpaceReservation(size));
        }
        if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
            unsafe { libc::close(fd) };
            return Err(Error::AddressSpaceReservation(size));
        }
        Ok(SharedMemoryObject { fd, size })
    }
}

impl Drop for SharedMemoryObject {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

/// A device's private view of the 32-bit guest bus: a dense page table plus a host window into
/// which every physical page this device can see has been `MAP_FIXED` at its guest offset.
pub struct AddressSpace {
    host_base: *mut u8,
    pages: Vec<PageEntry>,
}

unsafe impl Send for AddressSpace {}

impl AddressSpace {
    fn reserve() -> Result<*mut u8> {
        // Probe candidate high bits the way the original scans downward from bit 63 looking for
        // a free 4 GiB window, then release the probe so the real mappings can claim it.
        unsafe {
            let probe = libc::mmap(
                ptr::null_mut(),
                RESERVATION_SIZE,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            );
            if probe == libc::MAP_FAILED {
                return Err(Error::AddressSpaceReservation(RESERVATION_SIZE));
            }
            Ok(probe as *mut u8)
        }
    }

    pub fn host_base(&self) -> *mut u8 {
        self.host_base
    }

    pub fn translate(&self, addr: u32) -> *mut u8 {
        unsafe { self.host_base.add(addr as usize) }
    }

    fn page(&self, addr: u32) -> PageEntry {
        self.pages[(addr >> PAGE_BITS) as usize]
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.host_base as *mut libc::c_void, RESERVATION_SIZE);
        }
    }
}

/// Owns the region table, the shared backing object, and every device address space created
/// from it. This is the single object a [`crate::machine::Machine`] hands to every device's
/// reads and writes.
pub struct MemorySystem {
    regions: RegionTable,
    shmem: Option<SharedMemoryObject>,
    shmem_cursor: usize,
    spaces: Vec<AddressSpace>,
    /// Raw mapping of the entire shared backing object at offset 0, independent of any device's
    /// address space. Mirrors `memory->shmem_base` in `examples/original_source/src/memory.c`,
    /// which `memory_translate` indexes by `shmem_offset + offset` alone.
    shmem_base: *mut u8,
}

unsafe impl Send for MemorySystem {}

impl MemorySystem {
    pub fn new() -> Self {
        MemorySystem {
            regions: RegionTable::new(),
            shmem: None,
            shmem_cursor: 0,
            spaces: Vec::new(),
            shmem_base: ptr::null_mut(),
        }
    }

    pub fn create_physical_region(&mut self, name: &str, size: usize) -> Result<RegionHandle> {
        if size % ALLOCATION_GRANULARITY != 0 {
            return Err(Error::UnalignedRegionSize(name.to_string(), size));
        }
        if let Some(existing) = self.regions.find(name) {
            return Ok(existing);
        }
        let offset = self.shmem_cursor;
        self.shmem_cursor += size;
        debug!("physical region `{}` size={:#x} shmem_offset={:#x}", name, size, offset);
        Ok(self.regions.push(Region {
            name: name.to_string(),
            kind: RegionKind::Physical {
                shmem_offset: offset,
                size,
            },
        }))
    }

    pub fn create_mmio_region(
        &mut self,
        name: &str,
        size: usize,
        handler: Box<dyn super::region::MmioHandler>,
    ) -> Result<RegionHandle> {
        if let Some(existing) = self.regions.find(name) {
            return Ok(existing);
        }
        debug!("mmio region `{}` size={:#x}", name, size);
        Ok(self.regions.push(Region {
            name: name.to_string(),
            kind: RegionKind::Mmio { size, handler },
        }))
    }

    /// Allocates the shared backing object sized to every physical region registered so far,
    /// then creates one [`AddressSpace`] per supplied map, `MAP_FIXED`-mapping each physical
    /// page the map resolves to.
    pub fn init(&mut self, maps: &[AddressMap]) -> Result<()> {
        let shmem = SharedMemoryObject::new(self.shmem_cursor.max(ALLOCATION_GRANULARITY))?;
        for map in maps {
            let pages = flatten(map);
            let host_base = AddressSpace::reserve()?;
            unsafe {
                libc::munmap(host_base as *mut libc::c_void, RESERVATION_SIZE);
            }
            self.map_physical_pages(host_base, &pages, &shmem)?;
            self.spaces.push(AddressSpace { host_base, pages });
        }
        self.shmem_base = map_whole_shmem(&shmem)?;
        self.shmem = Some(shmem);
        Ok(())
    }

    fn map_physical_pages(&self, host_base: *mut u8, pages: &[PageEntry], shmem: &SharedMemoryObject) -> Result<()> {
        let mut i = 0usize;
        while i < NUM_PAGES {
            let entry = pages[i];
            if entry.region == NULL_REGION || !self.regions.get(entry.region).is_physical() {
                i += 1;
                continue;
            }
            // Coalesce a run of pages backed by the same region at contiguous offsets into a
            // single mmap call.
            let mut run = 1usize;
            while i + run < NUM_PAGES {
                let next = pages[i + run];
                if next.region == entry.region && next.offset == entry.offset + (run as u32) * PAGE_SIZE {
                    run += 1;
                } else {
                    break;
                }
            }
            let shmem_offset = match self.regions.get(entry.region).kind {
                RegionKind::Physical { shmem_offset, .. } => shmem_offset + entry.offset as usize,
                _ => unreachable!(),
            };
            let dst = unsafe { host_base.add(i * PAGE_SIZE as usize) };
            let len = run * PAGE_SIZE as usize;
            let mapped = unsafe {
                libc::mmap(
                    dst as *mut libc::c_void,
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED | libc::MAP_FIXED,
                    shmem.fd,
                    shmem_offset as libc::off_t,
                )
            };
            if mapped == libc::MAP_FAILED {
                return Err(Error::AddressSpaceReservation(len));
            }
            i += run;
        }
        Ok(())
    }

    /// Resolves `offset` bytes into the named physical region to a host pointer into the shared
    /// backing object. Mirrors `memory_translate` in
    /// `examples/original_source/src/memory.c:311-315`: `shmem_base + region.shmem_offset +
    /// offset`, where `offset` is relative to the region's own start, not a guest address in any
    /// particular device's address space.
    pub fn translate(&self, name: &str, offset: usize) -> Result<*mut u8> {
        let handle = self.regions.find(name).ok_or_else(|| Error::UnknownRegion(name.to_string()))?;
        match self.regions.get(handle).kind {
            RegionKind::Physical { shmem_offset, .. } => {
                Ok(unsafe { self.shmem_base.add(shmem_offset + offset) })
            }
            RegionKind::Mmio { .. } => Err(Error::NotPhysical(offset as u32)),
        }
    }

    fn dispatch_mmio<T>(
        &mut self,
        space: usize,
        addr: u32,
        op: impl FnOnce(&mut dyn super::region::MmioHandler, u32) -> T,
        default: T,
    ) -> T {
        let entry = self.spaces[space].page(addr);
        if entry.region == NULL_REGION {
            warn!("read/write to unmapped guest address {:#010x}", addr);
            return default;
        }
        match &mut self.regions.get_mut(entry.region).kind {
            RegionKind::Mmio { handler, .. } => {
                let page_local = addr & (PAGE_SIZE - 1);
                op(handler.as_mut(), entry.offset + page_local)
            }
            RegionKind::Physical { .. } => default,
        }
    }

    pub fn read8(&mut self, space: usize, addr: u32) -> u8 {
        let entry = self.spaces[space].page(addr);
        if entry.region != NULL_REGION && self.regions.get(entry.region).is_physical() {
            return unsafe { *self.spaces[space].translate(addr) };
        }
        self.dispatch_mmio(space, addr, |h, off| h.read8(off), 0)
    }

    pub fn read16(&mut self, space: usize, addr: u32) -> u16 {
        let entry = self.spaces[space].page(addr);
        if entry.region != NULL_REGION && self.regions.get(entry.region).is_physical() {
            return unsafe { (self.spaces[space].translate(addr) as *const u16).read_unaligned() };
        }
        self.dispatch_mmio(space, addr, |h, off| h.read16(off), 0)
    }

    pub fn read32(&mut self, space: usize, addr: u32) -> u32 {
        let entry = self.spaces[space].page(addr);
        if entry.region != NULL_REGION && self.regions.get(entry.region).is_physical() {
            return unsafe { (self.spaces[space].translate(addr) as *const u32).read_unaligned() };
        }
        self.dispatch_mmio(space, addr, |h, off| h.read32(off), 0)
    }

    pub fn write8(&mut self, space: usize, addr: u32, v: u8) {
        let entry = self.spaces[space].page(addr);
        if entry.region != NULL_REGION && self.regions.get(entry.region).is_physical() {
            unsafe { *self.spaces[space].translate(addr) = v };
            return;
        }
        self.dispatch_mmio(space, addr, |h, off| h.write8(off, v), ());
    }

    pub fn write16(&mut self, space: usize, addr: u32, v: u16) {
        let entry = self.spaces[space].page(addr);
        if entry.region != NULL_REGION && self.regions.get(entry.region).is_physical() {
            unsafe { (self.spaces[space].translate(addr) as *mut u16).write_unaligned(v) };
            return;
        }
        self.dispatch_mmio(space, addr, |h, off| h.write16(off, v), ());
    }

    pub fn write32(&mut self, space: usize, addr: u32, v: u32) {
        let entry = self.spaces[space].page(addr);
        if entry.region != NULL_REGION && self.regions.get(entry.region).is_physical() {
            unsafe { (self.spaces[space].translate(addr) as *mut u32).write_unaligned(v) };
            return;
        }
        self.dispatch_mmio(space, addr, |h, off| h.write32(off, v), ());
    }

    /// Copies `len` bytes (a multiple of 4) from `src` to `dst`, both guest addresses in the
    /// same space. Physical-to-physical copies go through a single host `memcpy`; anything
    /// touching MMIO on both ends is unsupported.
    pub fn memcpy(&mut self, space: usize, dst: u32, src: u32, len: usize) -> Result<()> {
        if len % 4 != 0 {
            return Err(Error::MisalignedBlockCopy(len));
        }
        let src_entry = self.spaces[space].page(src);
        let dst_entry = self.spaces[space].page(dst);
        let src_phys = src_entry.region != NULL_REGION && self.regions.get(src_entry.region).is_physical();
        let dst_phys = dst_entry.region != NULL_REGION && self.regions.get(dst_entry.region).is_physical();
        match (src_phys, dst_phys) {
            (true, true) => unsafe {
                ptr::copy(
                    self.spaces[space].translate(src),
                    self.spaces[space].translate(dst),
                    len,
                );
                Ok(())
            },
            (false, false) => Err(Error::MmioToMmioCopy),
            _ => {
                for i in (0..len as u32).step_by(4) {
                    let v = self.read32(space, src + i);
                    self.write32(space, dst + i, v);
                }
                Ok(())
            }
        }
    }
}

impl Drop for MemorySystem {
    fn drop(&mut self) {
        if !self.shmem_base.is_null() {
            unsafe {
                libc::munmap(self.shmem_base as *mut libc::c_void, self.shmem_cursor.max(ALLOCATION_GRANULARITY));
            }
        }
    }
}

/// Maps the entire shared backing object at offset 0, giving `MemorySystem::translate` a
/// region-relative base independent of any device's address space.
fn map_whole_shmem(shmem: &SharedMemoryObject) -> Result<*mut u8> {
    let mapped = unsafe {
        libc::mmap(
            ptr::null_mut(),
            shmem.size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            shmem.fd,
            0,
        )
    };
    if mapped == libc::MAP_FAILED {
        return Err(Error::AddressSpaceReservation(shmem.size));
    }
    Ok(mapped as *mut u8)
}

pub fn abort_on_init_failure(result: Result<()>) {
    if let Err(e) = result {
        fatal!("memory system initialization failed: {}", e);
    }
}
