//! Concrete implementations of the domain ports.

pub mod esbuild;
pub mod node;
pub mod shell;
pub mod storage;

pub use esbuild::EsbuildCli;
pub use node::NodeLoader;
pub use shell::ShellRunner;
pub use storage::LocalStorage;
