#![doc = include_str!("../README.md")]
#![deny(missing_debug_implementations)]
#![deny(unsafe_code)]
#![deny(missing_docs)]

pub mod agent;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod key;
pub mod proto;
pub mod secret;

pub use async_trait::async_trait;
