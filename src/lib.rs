//! docbridge - an HTTP bridge to a document database speaking extended JSON
//!
//! Requests name a database and collection plus filter, update or pipeline
//! documents. The codec turns those loosely typed JSON trees into typed
//! [`codec::ExtendedValue`] trees, the dispatcher forwards them to a
//! [`store::DocumentStore`], and results travel back through the codec.

pub mod cli;
pub mod codec;
pub mod dispatcher;
pub mod http_server;
pub mod observability;
pub mod store;
