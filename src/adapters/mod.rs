// Adapters layer: concrete implementations of the domain ports (HTTP order source, kernel client, local storage).

pub mod http;
pub mod storage;

pub use http::{HttpKernelClient, HttpOrderSource};
pub use storage::LocalStorage;
