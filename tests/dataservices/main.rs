#[path = "../common/mod.rs"]
mod common;

mod bulk;
mod http;
mod scenario;
