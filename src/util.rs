//! Shared utility modules used across the index codecs.

pub mod varint;
