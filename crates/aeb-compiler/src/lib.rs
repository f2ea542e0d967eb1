//! Requirement compiler: declarative design intent → ordered primitive
//! edit operations.
//!
//! The compiler is pure apart from the injected [`ComponentResolver`]
//! capability; it holds no shared state and is safe to run concurrently
//! against independent specs.

pub mod engine;
pub mod resolver;
pub mod types;

pub use engine::{compile, CompileOptions};
pub use resolver::{ComponentResolver, ResolveError, ResolvedCandidate, SearchResolver};
pub use types::{
    CompileError, CompileOutput, CompileSummary, ComponentReq, NetReq, PinStub, RequirementSpec,
    StubConn, StubDirection, WireReq,
};
