//! Repository layer for data access

pub mod ticket_spam_meta;

pub use ticket_spam_meta::{
    create_repository, DbTicketSpamMetaRepository, MemoryTicketSpamMetaRepository,
    TicketSpamMetaRepository,
};
