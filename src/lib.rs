//! Build, assemble and package the OpenNI SDK redistributable.
//!
//! A redist run builds the SDK with the host toolchain, copies binaries,
//! headers, documentation and samples into a fresh redist tree, rewrites the
//! relative paths inside the copied samples, generates the samples solutions
//! (or Makefile), rebuilds the samples against the tree and packages it.
//!
//! # Architecture
//!
//! ```text
//! openni-redist (bin)
//!     │
//!     ├── config ── redist.toml ─┐
//!     ├── platform ──────────────┼──> context::PipelineContext
//!     ├── toolchain ─────────────┘          │
//!     │                                     v
//!     └── pipeline ── preflight ── toolchain (build, docs)
//!                     samples ──── redist ── rewrite ── solution
//!                     toolchain (samples, cleanup) ── package
//! ```
//!
//! Every external tool goes through [`invoke`], which logs its output to a
//! file under the output directory and turns exit code plus log scan into a
//! verdict.

pub mod config;
pub mod context;
pub mod invoke;
pub mod logging;
pub mod package;
pub mod pipeline;
pub mod platform;
pub mod preflight;
pub mod redist;
pub mod rewrite;
pub mod samples;
pub mod solution;
pub mod toolchain;
pub mod version;

pub use context::{PipelineContext, RedistOptions};
pub use platform::{BuildBits, HostFamily, PlatformProfile};
pub use version::Version;
