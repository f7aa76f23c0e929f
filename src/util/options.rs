use crate::util::constants::*;
use std::default::Default;
use std::fmt::Debug;
use strum_macros::{Display, EnumString};

/// Which collector configuration to run.
#[derive(Copy, Clone, EnumString, Display, Debug, PartialEq, Eq)]
pub enum PlanSelector {
    /// NOS + MOS + LOS with minor, major and fallback collections.
    GenCompact,
    /// LOS + a size-classed sweep space, optionally concurrent.
    MarkSweep,
}

/// How a major collection compacts MOS and NOS.
#[derive(Copy, Clone, EnumString, Display, Debug, PartialEq, Eq)]
pub enum MajorAlgorithm {
    /// Order-preserving sliding compaction.
    SlideCompact,
    /// Like sliding, but later objects may back-fill the tail of an earlier target, so
    /// object order is not kept.
    MoveCompact,
}

/// Concurrency variant of the mark-sweep plan.
#[derive(Copy, Clone, EnumString, Display, Debug, PartialEq, Eq)]
pub enum ConcurrentAlgorithm {
    None,
    /// Snapshot-at-the-beginning: a deletion barrier records overwritten references.
    Satb,
    /// Incremental update: a barrier records written-to black objects, and a final
    /// stop-the-world remark rescans roots and dirty objects.
    MostlyConcurrent,
}

/// The default initial nursery size.
pub const DEFAULT_NURSERY_SIZE: usize = 4 << LOG_BYTES_IN_MBYTE;
/// The default committed heap size at start-up.
pub const DEFAULT_MIN_HEAP: usize = 16 << LOG_BYTES_IN_MBYTE;
/// The default reserved heap size, before capping by system memory.
pub const DEFAULT_MAX_HEAP: usize = 256 << LOG_BYTES_IN_MBYTE;
/// The default large object threshold.
pub const DEFAULT_LARGE_OBJECT_THRESHOLD: usize = 8 << LOG_BYTES_IN_KBYTE;

fn default_max_heap() -> usize {
    let quarter_of_system = (crate::util::os::get_system_total_memory() / 4) as usize;
    let capped = DEFAULT_MAX_HEAP.min(quarter_of_system.max(DEFAULT_MIN_HEAP));
    crate::util::conversions::raw_align_down(capped, BYTES_IN_BLOCK)
}

fn always_valid<T>(_: &T) -> bool {
    true
}

fn heap_size_valid(v: &usize) -> bool {
    *v >= 4 * BYTES_IN_BLOCK
}

/// Generate the `Options` struct. Every option has a name, a type, a validator and a default.
/// Options can be set with [`Options::set_from_str`] or with environment variables prefixed
/// with `GENGC_` (for example `GENGC_THREADS=4`), which are read by `Options::default()`.
macro_rules! options {
    ($($(#[$outer:meta])* $name:ident: $type:ty [$validator:expr] = $default:expr),* $(,)?) => [
        #[derive(Clone, Debug)]
        pub struct Options {
            $($(#[$outer])* pub $name: $type),*
        }
        impl Options {
            /// Set an option from its string form. Returns false (and keeps the previous value)
            /// if the value cannot be parsed or does not pass validation.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    $(stringify!($name) => if let Ok(typed) = val.parse::<$type>() {
                        let validate_fn = $validator;
                        let is_valid = validate_fn(&typed);
                        if is_valid {
                            self.$name = typed;
                        } else {
                            warn!("Unable to set {}={:?}. Invalid value. The previous value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        warn!("Unable to set {}={:?}. Can't parse value. The previous value will be used.", s, val);
                        false
                    })*
                    _ => {
                        warn!("Unknown option {}", s);
                        false
                    }
                }
            }

            /// Create an `Options` with every option at its default, ignoring the environment.
            pub fn without_env() -> Self {
                Options {
                    $($name: $default),*
                }
            }

            /// Read options from environment variables that start with `GENGC_`.
            pub fn read_env_var_settings(&mut self) {
                const PREFIX: &str = "GENGC_";
                for (key, val) in std::env::vars() {
                    // strip the prefix, and get the lower case string
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { self.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
            }
        }
        impl Default for Options {
            fn default() -> Self {
                let mut options = Self::without_env();
                options.read_env_var_settings();
                options
            }
        }
    ]
}

options! {
    /// The collector configuration.
    plan:                   PlanSelector        [always_valid] = PlanSelector::GenCompact,
    /// Minor collections use remembered sets and leave MOS and LOS alone. When false, a minor
    /// collection traces the whole heap but only evacuates NOS.
    generational:           bool                [always_valid] = true,
    /// How a major collection compacts MOS and NOS.
    major_algorithm:        MajorAlgorithm      [always_valid] = MajorAlgorithm::SlideCompact,
    /// Concurrency variant of the mark-sweep plan. Ignored by the generational plan.
    concurrent:             ConcurrentAlgorithm [always_valid] = ConcurrentAlgorithm::None,
    /// Number of collector threads.
    threads:                usize               [|v: &usize| *v > 0] = num_cpus::get(),
    /// Bytes committed at start-up.
    min_heap:               usize               [heap_size_valid] = DEFAULT_MIN_HEAP,
    /// Bytes reserved. The committed heap never grows past this.
    max_heap:               usize               [heap_size_valid] = default_max_heap(),
    /// Initial (and largest) nursery size in bytes.
    nursery_size:           usize               [|v: &usize| *v >= BYTES_IN_BLOCK] = DEFAULT_NURSERY_SIZE,
    /// Initial share of the committed heap given to the large object space.
    los_ratio:              f64                 [|v: &f64| *v > 0.0 && *v < 1.0] = 0.1,
    /// Objects of at least this many bytes are allocated in the large object space.
    large_object_threshold: usize               [|v: &usize| *v > MIN_OBJECT_SIZE && *v <= BYTES_IN_BLOCK / 2] = DEFAULT_LARGE_OBJECT_THRESHOLD,
    /// Only forward the older half of the nursery in each minor collection.
    nos_partial_forward:    bool                [always_valid] = false,
    /// Every Nth collection is a major collection. 0 means never forced.
    force_major_every:      usize               [always_valid] = 0,
    /// Let major collections move the LOS/MOS boundary.
    enable_space_tuner:     bool                [always_valid] = true,
    /// Number of metadata buffers created at start-up.
    metadata_buffers:       usize               [|v: &usize| *v > 0] = 256,
    /// Disable finalization.
    no_finalizer:           bool                [always_valid] = false,
    /// Treat reference objects as ordinary strong objects.
    no_reference_types:     bool                [always_valid] = false,
    /// Verify the heap before and after every collection.
    verify_heap:            bool                [always_valid] = false,
    /// Ignore collections requested by the application.
    ignore_system_gc:       bool                [always_valid] = false,
}

impl Options {
    /// Check the options against each other. Called once when the GC is built.
    pub fn validate(&mut self) -> Result<(), String> {
        if self.min_heap > self.max_heap {
            warn!(
                "min_heap {} is larger than max_heap {}. Using max_heap as min_heap.",
                self.min_heap, self.max_heap
            );
            self.min_heap = self.max_heap;
        }
        let min = crate::util::conversions::raw_align_down(self.min_heap, BYTES_IN_BLOCK);
        let los = (min as f64 * self.los_ratio) as usize;
        if min - los < 2 * BYTES_IN_BLOCK {
            return Err(format!(
                "min_heap {} is too small for los_ratio {}",
                self.min_heap, self.los_ratio
            ));
        }
        if self.concurrent != ConcurrentAlgorithm::None && self.plan != PlanSelector::MarkSweep {
            warn!(
                "concurrent={} only applies to the MarkSweep plan and is ignored.",
                self.concurrent
            );
            self.concurrent = ConcurrentAlgorithm::None;
        }
        let largest_class = *crate::policy::sweepspace::SIZE_CLASSES.last().unwrap_or(&0);
        if self.plan == PlanSelector::MarkSweep && self.large_object_threshold > largest_class {
            warn!(
                "large_object_threshold {} exceeds the largest size class. Using {}.",
                self.large_object_threshold, largest_class
            );
            self.large_object_threshold = largest_class;
        }
        Ok(())
    }

    pub fn is_concurrent(&self) -> bool {
        self.plan == PlanSelector::MarkSweep && self.concurrent != ConcurrentAlgorithm::None
    }
}
