#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A thread-safe pool of fixed-size memory blocks, all carved from one contiguous backing store
//! that is reserved up front.
//!
//! This crate provides [`BlockPool`], suited to workloads that repeatedly allocate and release
//! objects of one size (message buffers, fixed-size records and similar) and want to avoid the
//! overhead and fragmentation of a general-purpose allocator on the hot path.
//!
//! # Key Features
//!
//! - **Fixed capacity**: The memory for every block is reserved when the pool is created and
//!   the pool never grows. Running out of blocks is a recoverable [`Error::PoolExhausted`].
//! - **Exclusive block handles**: [`Block`] dereferences to the bytes of the block and borrows
//!   the pool, so a pool cannot be destroyed while handles to its blocks are alive.
//! - **Detected misuse**: Releasing a block twice, releasing an address from outside the pool or
//!   returning a handle to the wrong pool is reported as [`Error::InvalidRelease`] and never
//!   corrupts the pool.
//! - **Thread safety**: The pool can be shared between threads; block bookkeeping is serialized
//!   by a single lock held only for the duration of the block selection.
//! - **Configurable block selection**: Lowest index first (default) or most recently released
//!   first, see [`AllocationStrategy`].
//! - **Injectable diagnostics**: Every operation reports a [`PoolEvent`] to an [`EventSink`],
//!   which discards them by default and can forward them to [`tracing`] via
//!   [`TracingEventSink`].
//! - **Status reporting**: [`BlockPool::status()`] returns a consistent [`PoolStatus`] snapshot
//!   with a human-readable [`Display`][std::fmt::Display] rendering.
//!
//! # Examples
//!
//! ## Acquiring and releasing blocks
//!
//! ```rust
//! use block_pool::BlockPool;
//!
//! // Four blocks of 64 bytes each.
//! let pool = BlockPool::new(64, 4).unwrap();
//!
//! let mut block = pool.acquire_block().unwrap();
//! block[..5].copy_from_slice(b"hello");
//!
//! assert_eq!(pool.used_blocks(), 1);
//!
//! // Releasing consumes the handle, so the block cannot be used afterwards.
//! pool.release_block(block).unwrap();
//!
//! assert_eq!(pool.used_blocks(), 0);
//! ```
//!
//! ## Handling exhaustion
//!
//! ```rust
//! use block_pool::{BlockPool, Error};
//!
//! let pool = BlockPool::new(64, 1).unwrap();
//!
//! let block = pool.acquire_block().unwrap();
//!
//! match pool.acquire_block() {
//!     Err(Error::PoolExhausted { pool_size }) => assert_eq!(pool_size, 1),
//!     _ => unreachable!("the only block is in use"),
//! }
//!
//! pool.release_block(block).unwrap();
//! assert!(pool.acquire_block().is_ok());
//! ```
//!
//! ## Sharing between threads
//!
//! ```rust
//! use std::thread;
//!
//! use block_pool::BlockPool;
//!
//! let pool = BlockPool::new(64, 8).unwrap();
//!
//! thread::scope(|scope| {
//!     for value in 0..4_u8 {
//!         let pool = &pool;
//!
//!         scope.spawn(move || {
//!             let mut block = pool.acquire_block().unwrap();
//!             block.fill(value);
//!             pool.release_block(block).unwrap();
//!         });
//!     }
//! });
//!
//! assert!(pool.is_empty());
//! ```

mod allocation_strategy;
mod backing;
mod block;
mod builder;
mod drop_policy;
mod error;
mod events;
mod occupancy;
mod pool;
mod pool_layout;
mod status;

pub use allocation_strategy::*;
pub(crate) use backing::*;
pub use block::*;
pub use builder::*;
pub use drop_policy::*;
pub use error::*;
pub use events::*;
pub(crate) use occupancy::*;
pub use pool::*;
pub(crate) use pool_layout::*;
pub use status::*;
