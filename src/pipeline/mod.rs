//! Building blocks the analysis pipeline is assembled from.
//!
//! ```text
//! input ──▶ pdf ──▶ (prompt) ──▶ llm ──▶ reply
//! (path/URL) (text)              (chat)   (JSON)
//! ```
//!
//! 1. [`input`]: read a local path or download a URL, reject non-PDF bytes
//! 2. [`pdf`]: extract the text layer and render generated documents; runs on
//!    the blocking pool because pdfium is not async-safe
//! 3. [`llm`]: one chat completion per request; the only stage with network I/O
//! 4. [`reply`]: strip code fences and parse the reply as JSON

pub mod input;
pub mod llm;
pub mod pdf;
pub mod reply;
