pub mod proxies;
pub mod system;
