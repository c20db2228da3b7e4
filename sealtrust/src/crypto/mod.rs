// Crypto module declarations

pub mod cipher;
pub mod dh;
pub mod hash;
