pub mod db;
pub mod document_store;
pub mod types;
