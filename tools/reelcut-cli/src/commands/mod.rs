pub mod bundle;
pub mod export;
pub mod info;
