//! Protocol adapters

pub mod aave;
pub mod ethena;
pub mod etherfi;
pub mod lido;
pub mod morpho;
pub mod morpho_bundler;
pub mod rocketpool;
pub mod spark;

pub use aave::Aave;
pub use ethena::Ethena;
pub use etherfi::EtherFi;
pub use lido::Lido;
pub use morpho::Morpho;
pub use rocketpool::RocketPool;
