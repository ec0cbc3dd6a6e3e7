pub mod token_exchange;

pub use token_exchange::CredentialCache;
