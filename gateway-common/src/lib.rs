//! AI Worker Gateway Common Types
//!
//! Wire types shared by the gateway server and its command-line client.

pub mod chat;
pub mod envelope;

pub use chat::{ChatMessage, GenerateRequest, RequestError};
pub use envelope::{Envelope, Failure, Success};
