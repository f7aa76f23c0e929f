use crate::util::constants::*;
use crate::util::Address;

/* Alignment */

pub fn is_address_aligned(addr: Address) -> bool {
    addr.is_aligned_to(BYTES_IN_ADDRESS)
}

pub fn page_align_down(address: Address) -> Address {
    address.align_down(BYTES_IN_PAGE)
}

pub const fn block_align_up(addr: Address) -> Address {
    addr.align_up(BYTES_IN_BLOCK)
}

pub const fn block_align_down(addr: Address) -> Address {
    addr.align_down(BYTES_IN_BLOCK)
}

pub const fn raw_align_up(val: usize, align: usize) -> usize {
    // See https://github.com/rust-lang/rust/blob/e620d0f337d0643c757bab791fc7d88d63217704/src/libcore/alloc.rs#L192
    val.wrapping_add(align).wrapping_sub(1) & !align.wrapping_sub(1)
}

pub const fn raw_align_down(val: usize, align: usize) -> usize {
    val & !align.wrapping_sub(1)
}

pub const fn raw_is_aligned(val: usize, align: usize) -> bool {
    val & align.wrapping_sub(1) == 0
}

/* Conversion */

pub const fn bytes_to_blocks_up(bytes: usize) -> usize {
    (bytes + BYTES_IN_BLOCK - 1) >> LOG_BYTES_IN_BLOCK
}

pub const fn bytes_to_blocks(bytes: usize) -> usize {
    bytes >> LOG_BYTES_IN_BLOCK
}

pub const fn blocks_to_bytes(blocks: usize) -> usize {
    blocks << LOG_BYTES_IN_BLOCK
}

/// Object sizes are rounded up to the object alignment, and never below the header size.
pub const fn object_size_align(size: usize) -> usize {
    let size = raw_align_up(size, MIN_OBJECT_ALIGNMENT);
    if size < MIN_OBJECT_SIZE {
        MIN_OBJECT_SIZE
    } else {
        size
    }
}

pub fn bytes_to_formatted_string(bytes: usize) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut i = 0;
    let mut num = bytes;
    while i < UNITS.len() - 1 {
        let new_num = num >> 10;
        if new_num == 0 {
            return format!("{}{}", num, UNITS[i]);
        }
        num = new_num;
        i += 1;
    }
    format!("{}{}", num, UNITS[UNITS.len() - 1])
}

#[cfg(test)]
mod tests {
    use crate::util::conversions::*;
    use crate::util::Address;

    #[test]
    fn test_page_align() {
        let addr = unsafe { Address::from_usize(0x123456789) };
        assert_eq!(page_align_down(addr), unsafe {
            Address::from_usize(0x123456000)
        });
        assert!(is_address_aligned(page_align_down(addr)));
    }

    #[test]
    fn test_block_align() {
        let addr = unsafe { Address::from_usize(0x12345) };
        assert_eq!(block_align_down(addr), unsafe { Address::from_usize(0x10000) });
        assert_eq!(block_align_up(addr), unsafe { Address::from_usize(0x18000) });
        assert_eq!(bytes_to_blocks_up(BYTES_IN_BLOCK + 1), 2);
        assert_eq!(bytes_to_blocks(BYTES_IN_BLOCK + 1), 1);
    }

    #[test]
    fn test_object_size_align() {
        assert_eq!(object_size_align(1), MIN_OBJECT_SIZE);
        assert_eq!(object_size_align(17), 24);
        assert_eq!(object_size_align(24), 24);
    }

    #[test]
    fn test_bytes_to_formatted_string() {
        assert_eq!(bytes_to_formatted_string(0), "0B");
        assert_eq!(bytes_to_formatted_string(1023), "1023B");
        assert_eq!(bytes_to_formatted_string(1024), "1KiB");
        assert_eq!(bytes_to_formatted_string(1025), "1KiB");
        assert_eq!(bytes_to_formatted_string(1 << 20), "1MiB");
    }
}
