//! # searchprime - primed, reusable file search queries
//!
//! Client side of a search-as-you-type protocol against a SQL-speaking file
//! index. When the search box gains focus the caller *primes* a scope: a
//! query over the included folders (minus the excluded ones) is executed and
//! its cursor kept open. Every keystroke then runs a derived query that adds
//! a `CONTAINS` predicate and a `REUSEWHERE(id)` clause pointing at the
//! primed cursor, so the index only has to re-filter the primed result set.
//!
//! ## Architecture
//!
//! - [`query`] - scope filter SQL, execution, reuse tokens, priming session
//!   and batched row enumeration
//! - [`search`] - the facade applications call (`prepare`, `search`, `count_all`)
//! - [`service`] - trait seams to the index, the in-process [`service::MemoryIndex`]
//!   and the [`service::ServiceRegistry`]
//! - [`server`] - length-prefixed JSON protocol, daemon and remote backend (Unix)
//! - [`output`] - terminal formatting for the CLI
//! - [`utils`] - configuration, known folders, progress spinner
//!
//! ## Quick Start
//!
//! ```no_run
//! use searchprime::query::QueryExecutor;
//! use searchprime::search::FileSearchProvider;
//! use searchprime::service::MemoryIndex;
//!
//! let index = MemoryIndex::crawl(&["/home/me/Documents"], |_| {}).unwrap();
//! let mut provider = FileSearchProvider::new(QueryExecutor::new(index));
//!
//! provider.prepare(&["/home/me/Documents"], &["/home/me/Documents/tmp"]).unwrap();
//! for result in provider.search("invoice*").unwrap() {
//!     println!("{}", result.url);
//! }
//! ```

pub mod error;
pub mod output;
pub mod query;
pub mod search;
#[cfg(all(unix, feature = "daemon"))]
pub mod server;
pub mod service;
pub mod utils;

pub use error::{SearchError, SearchResult, ServiceError};
pub use search::{FileSearchProvider, QueryResult, SearchOptions};
