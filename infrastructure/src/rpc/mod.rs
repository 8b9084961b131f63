//! Line-delimited JSON-RPC engine
//!
//! - [`envelope`]: request/response/notification types and error codes
//! - [`codec`]: line encoding and classification
//! - [`transport`]: framed reader and serialized writer over byte streams
//! - [`connection`]: correlation of requests and responses

pub mod codec;
pub mod connection;
pub mod envelope;
pub mod transport;

pub use codec::{CodecError, ParseError, ParseErrorReason};
pub use connection::{PendingCalls, Resolution, RpcConnection, RpcError};
pub use envelope::{Envelope, ErrorCode, ErrorObject, Notification, Request, RequestId, Response};
pub use transport::{FrameReader, Inbound, LineWriter, TransportError};
