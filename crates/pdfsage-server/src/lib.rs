//! PdfSage server — HTTP API and terminal chat over PDF documents.

pub mod cli;
pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
