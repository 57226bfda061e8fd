//! Composable stream layers between the raw byte source and the XML payload.

mod cipher;
mod hashed_block;
mod store;

pub use cipher::{cipher_to_algorithm, SymmetricCipherStream, SymmetricCipherWriter};
pub use hashed_block::{HashedBlockReader, HashedBlockWriter};
pub use store::StoreDataStream;
