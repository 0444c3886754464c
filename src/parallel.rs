//! Distributed-memory plumbing: communicators, ghost exchange and distributed vectors.
//!
//! Every rank owns a contiguous range of global degree-of-freedom indices. Values of indices
//! owned by other ranks that a rank needs for its cell computations are called ghosts. A
//! [`Partitioner`] describes the owned range and ghost set of a rank and performs the
//! collective exchanges needed to import ghost values and to send ghost contributions back to
//! their owners.
//!
//! Operations documented as *collective* must be called by all ranks of the communicator in
//! the same order.
mod communicator;
mod partitioner;
mod vector;

pub use communicator::*;
pub use partitioner::*;
pub use vector::*;
