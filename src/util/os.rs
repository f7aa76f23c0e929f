//! Thin wrappers around the OS virtual memory calls the heap needs: reserve an address range,
//! commit and decommit pages inside it, and release it.

use crate::util::constants::BYTES_IN_PAGE;
use crate::util::Address;
use std::io::Result;

/// Page protection for a committed or reserved range.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MmapProtection {
    ReadWrite,
    NoAccess,
}

impl MmapProtection {
    fn get_native_flags(&self) -> i32 {
        use libc::{PROT_NONE, PROT_READ, PROT_WRITE};
        match self {
            Self::ReadWrite => PROT_READ | PROT_WRITE,
            Self::NoAccess => PROT_NONE,
        }
    }
}

/// Reserve `size` bytes of address space aligned to `align`. The range is not accessible
/// until it is committed. Returns the aligned start.
pub fn reserve(size: usize, align: usize) -> Result<Address> {
    debug_assert!(size % BYTES_IN_PAGE == 0);
    let padded = size + align;
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
    let prot = MmapProtection::NoAccess.get_native_flags();
    let ptr = unsafe { libc::mmap(std::ptr::null_mut(), padded, prot, flags, -1, 0) };
    if ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    let raw = Address::from_mut_ptr(ptr);
    let start = raw.align_up(align);
    // Give back the unaligned head and the unused tail.
    let head = start - raw;
    if head > 0 {
        munmap(raw, head)?;
    }
    let tail = padded - head - size;
    if tail > 0 {
        munmap(start + size, tail)?;
    }
    Ok(start)
}

/// Make a reserved range readable and writable.
pub fn commit(start: Address, size: usize) -> Result<()> {
    mprotect(start, size, MmapProtection::ReadWrite)
}

/// Return the pages of a committed range to the OS. The range stays reserved.
pub fn decommit(start: Address, size: usize) -> Result<()> {
    wrap_libc_call(
        &|| unsafe { libc::madvise(start.to_mut_ptr(), size, libc::MADV_DONTNEED) },
        0,
    )?;
    mprotect(start, size, MmapProtection::NoAccess)
}

/// Unmap a reserved range.
pub fn release(start: Address, size: usize) -> Result<()> {
    munmap(start, size)
}

pub fn is_mmap_oom(os_errno: i32) -> bool {
    os_errno == libc::ENOMEM
}

fn munmap(start: Address, size: usize) -> Result<()> {
    wrap_libc_call(&|| unsafe { libc::munmap(start.to_mut_ptr(), size) }, 0)
}

fn mprotect(start: Address, size: usize, prot: MmapProtection) -> Result<()> {
    wrap_libc_call(
        &|| unsafe { libc::mprotect(start.to_mut_ptr(), size, prot.get_native_flags()) },
        0,
    )
}

fn wrap_libc_call<T: PartialEq>(f: &dyn Fn() -> T, expect: T) -> Result<()> {
    let ret = f();
    if ret == expect {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Get the total memory of the system in bytes.
pub fn get_system_total_memory() -> u64 {
    use sysinfo::MemoryRefreshKind;
    use sysinfo::{RefreshKind, System};

    // Only load the memory component. Loading everything with `System::new_all()` is slow and
    // start-up only needs the total memory to cap the heap size.
    let sys = System::new_with_specifics(
        RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
    );
    sys.total_memory()
}
