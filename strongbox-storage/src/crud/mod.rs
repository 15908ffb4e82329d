//! CRUD layers, bottom-up: key-path [`Crud`] over a codec, typed
//! [`MessageCrud`] over JSON records, and the cached [`CachedMessageCrud`].

pub mod cached;
pub mod generic;
pub mod message;

pub use cached::CachedMessageCrud;
pub use generic::{BatchRead, Crud, EntryCodec};
pub use message::{JsonCodec, KeyFn, MessageCrud};
