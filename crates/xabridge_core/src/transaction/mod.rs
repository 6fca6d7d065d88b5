//! Transaction manager contracts and completion callbacks.

mod manager;
mod release;

pub use manager::{
    transaction_running, Synchronization, SynchronizationRegistry, Transaction,
    TransactionManager,
};
pub use release::ResourceReleaseSynchronization;
