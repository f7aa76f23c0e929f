//! Utilities shared by the policies, the plans and the scheduler.

/// Address and object reference types.
pub mod address;
/// Thread-local bump allocation inside a block.
pub mod bump;
/// Constants used in gengc.
pub mod constants;
/// Calculation, conversion and rounding for memory related numbers.
pub mod conversions;
/// Finalizers and reference objects.
pub mod finref;
/// The object header bit protocol.
pub mod header;
/// Logger initialization.
pub mod logger;
/// Metadata buffers and the pools they travel through.
pub mod metadata;
/// gengc command line options.
pub mod options;
/// Wrapper functions for the OS virtual memory calls.
pub mod os;
/// Heap verification.
pub mod sanity;
/// Collection counters and timers.
pub mod statistics;
/// Utilities for tests.
#[cfg(any(test, feature = "mock_test"))]
pub mod test_util;

pub use self::address::Address;
pub use self::address::ObjectReference;
