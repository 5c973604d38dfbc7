/// Little-endian binary writer and reader
pub mod binary_writer;
/// Common string and array helpers
pub mod common;
/// Seeded linear congruential generator
pub mod random;
/// Block partitioned parallel loops
pub mod threading;

pub use binary_writer::{read_sized_block, BinaryReader, BinaryWriter};
pub use common::Common;
pub use random::Random;
pub use threading::Threading;
