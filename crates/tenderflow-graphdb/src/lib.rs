//! Graph database collaborator.
//!
//! [`Neo4jClient`] speaks the Neo4j HTTP transactional API. Rows come back
//! as JSON objects keyed by the query's `RETURN` column names.

pub mod neo4j;
mod wire;

pub use neo4j::Neo4jClient;
