//! Backend transport: signed requests, tokens and wire types.

mod client;
pub mod contracts;
pub mod session;
pub mod signature;
mod types;

pub use client::SignedClient;
pub use contracts::{import_checked_in, Contract};
pub use session::{AccessToken, Credentials, Session};
pub use types::{
    ApiError, CheckinUpdate, CommentUpdate, EventPayload, NextAction, SendReceipt, ServerEnvelope,
    STATUS_OK,
};
