//! Request handlers: WebSocket streaming sessions and the static pages.

pub mod pages;
pub mod session;
