//! C ABI shared by the host and dynamically loaded plugins.

pub mod abi;
