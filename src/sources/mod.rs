//! Spiders for the supported sites.

pub mod bga;
pub mod luding;

pub use bga::{BgaSpider, BgaStage};
pub use luding::{LudingSpider, LudingStage};
