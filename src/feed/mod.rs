//! Feed format detection and parsing.
//!
//! This module turns a downloaded document into feed metadata and items:
//!
//! - **Preparation**: one strict XML tree and one tolerant HTML tree per attempt
//! - **Dispatch**: two-pass handler matching with auto-discovery in between
//! - **Formats**: RSS, Atom, schema.org LD+JSON and semantic HTML5 articles
//! - **Discovery**: redirecting a subscription from a web page to its feed
//!
//! # Example
//!
//! ```
//! use feedsift::feed::{Dispatcher, FormatRegistry, ParseContext};
//! use feedsift::model::{Feed, Subscription};
//! use feedsift::update::UpdateQueue;
//!
//! let data = br#"<rss version="2.0"><channel><item><title>i1</title></item></channel></rss>"#;
//! let registry = FormatRegistry::standard();
//! let mut queue = UpdateQueue::new();
//! let mut sub = Subscription::new(1, "https://example.com/rss");
//! let mut feed = Feed::new(1);
//!
//! let mut ctx = ParseContext::new(&mut sub, &mut feed, data);
//! let outcome = Dispatcher::new(&registry).parse(&mut ctx, &mut queue);
//! assert!(outcome.is_success());
//! assert_eq!(ctx.into_items().len(), 1);
//! ```

mod context;
mod date;
mod discovery;
mod dispatch;
mod document;
mod formats;
mod handler;

pub use context::ParseContext;
pub use date::parse_date;
pub use discovery::discover;
pub use dispatch::{DispatchError, Dispatcher, ParseOutcome};
pub use document::{looks_like_html, parse_html, parse_xml, DocumentError, XmlElement, XmlNode};
pub use handler::{DocumentRoot, FormatHandler, FormatRegistry};
