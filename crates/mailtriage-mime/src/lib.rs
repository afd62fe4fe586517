//! # mailtriage-mime
//!
//! Header-level message parsing used by the triage engine.
//!
//! Only the header block of a message is ever looked at. The crate covers:
//!
//! - **Header blocks**: folded RFC 5322 headers into a case-insensitive,
//!   multi-valued map
//! - **Address lists**: `To`/`Cc`/`From` values, including quoted display
//!   names and groups
//! - **Message identifiers**: `Message-ID`, `In-Reply-To` and `References`
//!   tokens
//! - **Encoded words**: RFC 2047 `=?charset?B|Q?...?=` decoding for subjects
//!
//! ## Quick Start
//!
//! ```
//! use mailtriage_mime::{Headers, parse_address_list};
//!
//! let headers = Headers::parse(
//!     "From: Alice <alice@example.com>\r\n\
//!      Subject: Lunch\r\n\
//!      \r\n",
//! );
//!
//! let from = parse_address_list(headers.get("from").unwrap_or_default());
//! assert_eq!(from[0].email, "alice@example.com");
//! assert_eq!(headers.get("SUBJECT"), Some("Lunch"));
//! ```
//!
//! Parsing never fails: malformed lines, addresses and identifiers are
//! dropped, so a damaged header block still yields whatever could be read.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod error;
mod header;

pub mod encoding;

pub use address::{Address, parse_address_list, parse_message_ids};
pub use error::{Error, Result};
pub use header::Headers;
