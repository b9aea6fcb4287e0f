//! # umber-types
//! Foundation types shared by the Umber mempool and its collaborators.

pub mod hash;
pub mod tx;

pub use hash::Hash256;
pub use tx::{Address, RawTx, TxEssentials};
