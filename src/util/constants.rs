/// log2 of the number of bits in a byte
pub const LOG_BITS_IN_BYTE: u8 = 3;
/// The number of bits in a byte
pub const BITS_IN_BYTE: usize = 1 << LOG_BITS_IN_BYTE;

/// log2 of the number of bytes in a gigabyte
pub const LOG_BYTES_IN_GBYTE: u8 = 30;
/// The number of bytes in a gigabyte
pub const BYTES_IN_GBYTE: usize = 1 << LOG_BYTES_IN_GBYTE;

/// log2 of the number of bytes in a megabyte
pub const LOG_BYTES_IN_MBYTE: u8 = 20;
/// The number of bytes in a megabyte
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

#[cfg(target_pointer_width = "32")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 2;
#[cfg(target_pointer_width = "64")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 3;
/// The number of bytes in an address
pub const BYTES_IN_ADDRESS: usize = 1 << LOG_BYTES_IN_ADDRESS;

/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = LOG_BYTES_IN_ADDRESS;
/// The number of bytes in a word
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;
/// The number of bits in a word
pub const BITS_IN_WORD: usize = BYTES_IN_WORD * BITS_IN_BYTE;

/// log2 of the number of bytes in a page
pub const LOG_BYTES_IN_PAGE: u8 = 12;
/// The number of bytes in a page
pub const BYTES_IN_PAGE: usize = 1 << LOG_BYTES_IN_PAGE;

/// log2 of the number of bytes in a heap block. Blocks are the unit in which NOS and MOS
/// are handed to allocators and compacted, and the unit of a mark-sweep chunk.
pub const LOG_BYTES_IN_BLOCK: u8 = 15;
/// The number of bytes in a heap block
pub const BYTES_IN_BLOCK: usize = 1 << LOG_BYTES_IN_BLOCK;

/// Every object starts on this alignment.
pub const MIN_OBJECT_ALIGNMENT: usize = 8;
/// Two header words: the vtable word and the object-info word.
pub const OBJECT_HEADER_BYTES: usize = 2 * BYTES_IN_WORD;
/// The smallest object the allocator hands out is just a header.
pub const MIN_OBJECT_SIZE: usize = OBJECT_HEADER_BYTES;
/// Offset of the vtable word from the object reference.
pub const VTABLE_OFFSET: usize = 0;
/// Offset of the object-info word from the object reference.
pub const OBJ_INFO_OFFSET: usize = BYTES_IN_WORD;

/// Entries in one metadata buffer.
pub const METADATA_BUFFER_ENTRIES: usize = 512;

/// Number of collection samples the collection scheduler keeps.
pub const STAT_SAMPLE_WINDOW_SIZE: usize = 5;
