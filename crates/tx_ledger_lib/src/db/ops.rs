mod chain_block_ops;
mod tx_ops;
mod watched_address_ops;

pub use chain_block_ops::*;
pub use tx_ops::*;
pub use watched_address_ops::*;
