#![forbid(unsafe_code)]

pub mod hash;
pub mod transcript;
pub mod kx;
pub mod channel;

pub use channel::{ChannelError, SecureChannel};
pub use kx::{
    generate_nonce, generate_pin, random_u32, KexError, LongTermKeyPair, Role, SessionKeys,
    KEY_LEN, NONCE_LEN,
};
