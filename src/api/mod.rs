pub mod client;

pub use client::{Client, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
