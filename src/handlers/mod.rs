//! HTTP handlers for the editor, template and public render APIs.

pub mod products;
pub mod public;
pub mod tables;
pub mod templates;
