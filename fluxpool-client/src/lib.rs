#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![deny(elided_lifetimes_in_paths, unreachable_pub)]
#![warn(
    missing_docs,
    clippy::doc_link_with_quotes,
    clippy::doc_markdown,
    clippy::missing_errors_doc
)]

mod client;
mod error;
pub mod http;
mod point;
mod query;
pub mod udp;

pub use crate::{
    client::{Client, Pong},
    error::ClientError,
    http::{HttpClient, HttpConfig},
    point::{BatchPoints, Consistency, FieldValue, Point, PointBuilder, Precision},
    query::{Message, Query, Response, Series, StatementResult},
    udp::{UdpClient, UdpConfig},
};
