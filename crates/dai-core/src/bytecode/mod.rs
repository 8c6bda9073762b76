//! Bytecode core for dai: opcodes, chunk format.

pub mod chunk;
pub mod op;

pub use chunk::{Chunk, ConstPool, ConstValue, LineTable};
pub use op::{BinaryOp, Op};
