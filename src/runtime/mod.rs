pub mod labels;
pub mod memory;
pub mod runtime_error;
pub mod vm;

pub use memory::Memory;
pub use runtime_error::{Fault, RuntimeError};
pub use vm::{Vm, VmConfig};
