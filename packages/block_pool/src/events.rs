use std::fmt::Debug;

use tracing::{debug, trace, warn};

use crate::ReleaseFault;

/// A noteworthy occurrence in the life of a [`BlockPool`][crate::BlockPool], delivered to the
/// pool's [`EventSink`].
///
/// Every event carries the identifier of the pool it originates from, so a sink shared between
/// several pools can tell them apart.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum PoolEvent {
    /// The pool was created and its backing store reserved.
    Created {
        /// Identifier of the pool.
        pool_id: u64,

        /// Size of each block in bytes.
        block_size: usize,

        /// Number of blocks in the pool.
        pool_size: usize,
    },

    /// A block was handed out to a caller.
    BlockAcquired {
        /// Identifier of the pool.
        pool_id: u64,

        /// Index of the acquired block.
        index: usize,

        /// Number of blocks in use right after the acquisition.
        used_blocks: usize,
    },

    /// A block was returned to the pool.
    BlockReleased {
        /// Identifier of the pool.
        pool_id: u64,

        /// Index of the released block.
        index: usize,

        /// Number of blocks in use right after the release.
        used_blocks: usize,
    },

    /// An acquisition failed because every block was in use.
    Exhausted {
        /// Identifier of the pool.
        pool_id: u64,

        /// Number of blocks in the pool, all of which are in use.
        pool_size: usize,
    },

    /// A release was rejected without changing the pool.
    InvalidRelease {
        /// Identifier of the pool.
        pool_id: u64,

        /// Why the release was rejected.
        fault: ReleaseFault,
    },

    /// The pool is being destroyed.
    Destroyed {
        /// Identifier of the pool.
        pool_id: u64,

        /// Number of blocks still in use at the time of destruction.
        used_blocks: usize,
    },
}

/// Receives [`PoolEvent`]s from a pool, for logging, tracing or testing purposes.
///
/// The pool calls the sink after it has released its internal lock, so a sink may take as long
/// as it likes (and may even call back into the pool) without blocking other callers. The sink
/// is called concurrently from every thread that uses the pool.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use block_pool::{BlockPool, EventSink, PoolEvent};
///
/// #[derive(Debug, Default)]
/// struct ExhaustionCounter(AtomicUsize);
///
/// impl EventSink for ExhaustionCounter {
///     fn record(&self, event: &PoolEvent) {
///         if matches!(event, PoolEvent::Exhausted { .. }) {
///             self.0.fetch_add(1, Ordering::Relaxed);
///         }
///     }
/// }
///
/// let counter = Arc::new(ExhaustionCounter::default());
///
/// let pool = BlockPool::builder()
///     .block_size(64)
///     .pool_size(1)
///     .event_sink(Arc::clone(&counter) as Arc<dyn EventSink>)
///     .build()
///     .unwrap();
///
/// let block = pool.acquire_block().unwrap();
/// assert!(pool.acquire_block().is_err());
/// assert_eq!(counter.0.load(Ordering::Relaxed), 1);
/// # pool.release_block(block).unwrap();
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Debug + Send + Sync {
    /// Records a single event.
    fn record(&self, event: &PoolEvent);
}

/// An [`EventSink`] that discards every event. This is the default sink of a pool.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    #[cfg_attr(test, mutants::skip)] // There is nothing to observe.
    fn record(&self, _event: &PoolEvent) {}
}

/// An [`EventSink`] that emits every event as a one-line [`tracing`] event.
///
/// Per-block traffic is emitted at `TRACE` level, pool lifecycle at `DEBUG` level and rejected
/// operations at `WARN` level. Which of them end up in a log is up to the installed subscriber.
///
/// # Examples
///
/// ```
/// use block_pool::BlockPool;
///
/// let pool = BlockPool::builder()
///     .block_size(64)
///     .pool_size(4)
///     .trace_events()
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: &PoolEvent) {
        match *event {
            PoolEvent::Created {
                pool_id,
                block_size,
                pool_size,
            } => debug!(pool_id, block_size, pool_size, "block pool created"),
            PoolEvent::BlockAcquired {
                pool_id,
                index,
                used_blocks,
            } => trace!(pool_id, index, used_blocks, "block acquired from pool"),
            PoolEvent::BlockReleased {
                pool_id,
                index,
                used_blocks,
            } => trace!(pool_id, index, used_blocks, "block released to pool"),
            PoolEvent::Exhausted { pool_id, pool_size } => {
                warn!(pool_id, pool_size, "block pool is full");
            }
            PoolEvent::InvalidRelease { pool_id, fault } => {
                warn!(pool_id, %fault, "rejected invalid block release");
            }
            PoolEvent::Destroyed {
                pool_id,
                used_blocks,
            } => debug!(pool_id, used_blocks, "block pool destroyed"),
        }
    }
}
