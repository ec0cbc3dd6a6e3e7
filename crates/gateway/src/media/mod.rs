pub mod relay;

pub use relay::MediaRelay;
