//! CCM core - collect, package and push a Claude Code configuration.

pub mod archive;
pub mod collector;
pub mod config;
pub mod executor;
pub mod policy;
pub mod sync;
pub mod transport;
pub mod version;

pub use archive::{Archiver, Compressor, TarGzCompressor, Unpacked};
pub use collector::{collect, Collection, CollectorOptions};
pub use config::{Config, Layout};
pub use policy::PathPolicy;
pub use sync::{PushError, PushStep, RemoteSynchronizer};
pub use transport::{RemoteTransport, ShellTransport};
