//! Atomic commit across heterogeneous SQL resource managers.
//!
//! A [`TransactionCoordinator`](core::domain::coordinator::TransactionCoordinator)
//! drives an ordered set of branches through two-phase commit, speaking the
//! Postgres prepared-transaction dialect or the MySQL XA dialect per branch.
//! Prepared transactions orphaned by a crash or a partial commit are resolved
//! by the [`RecoverySweeper`](core::domain::recovery::RecoverySweeper).

pub mod adapter;
pub mod core;
pub mod error;
