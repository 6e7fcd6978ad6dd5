//! # sqlgate-exec
//!
//! Turns statement requests into envelopes.
//!
//! A request names a [`DatabaseBinding`], carries its positional parameters
//! in wire form ([`ParamSpec`]) and is processed strictly in order:
//!
//! 1. [`ParameterBuilder`] converts the parameters, loading large objects
//!    from the caller's upload directory
//! 2. the statement is classified and described by a `SqlEvent`
//! 3. the binding's firewall chain evaluates it
//! 4. an allowed statement is bound and executed inside the request's
//!    session, which is committed on success and rolled back otherwise
//!
//! Batches run steps 1 to 3 for every line before anything executes.

pub mod binding;
pub mod blob;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod params;
pub mod wire;

pub use binding::{DatabaseBinding, Gateway};
pub use envelope::{Denial, Envelope, ErrorType, FailureEnvelope, ResultPayload, Status, SuccessEnvelope};
pub use error::{ExecError, ParameterError};
pub use executor::{BatchRequest, ExecState, StatementRequest};
pub use params::{BoundParameter, ParameterBuilder};
pub use wire::{fields_from_json, scan_fields, ParamSpec, NULL_SENTINEL};
