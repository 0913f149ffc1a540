//! Result sinks
//!
//! Where fetched transactions end up. The sink is always named explicitly on
//! the command line as `<kind>:<target>`.

use crate::error::BeancounterError;
use crate::models::Transaction;
use crate::Result;
use std::path::PathBuf;

pub mod elasticsearch;
pub mod json_file;

pub use elasticsearch::ElasticsearchSink;
pub use json_file::JsonFileSink;

/// Trait for transaction sinks
#[async_trait::async_trait]
pub trait ResultSink: Send + Sync {
    async fn write(&self, batch: &[Transaction]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkKind {
    JsonFile(PathBuf),
    /// Elasticsearch 8 node address. Empty means take it from the environment.
    Elasticsearch(String),
}

impl SinkKind {
    pub fn parse(spec: &str) -> Result<Self> {
        let (kind, target) = spec.split_once(':').ok_or_else(|| {
            BeancounterError::Config(format!(
                "output {:?} has no kind prefix, expected jsonfile:<path> or es8:<url>",
                spec
            ))
        })?;

        match kind {
            "jsonfile" if target.is_empty() => Err(BeancounterError::Config(
                "jsonfile output needs a path".to_string(),
            )),
            "jsonfile" => Ok(SinkKind::JsonFile(PathBuf::from(target))),
            "es8" => Ok(SinkKind::Elasticsearch(target.to_string())),
            other => Err(BeancounterError::Config(format!(
                "unknown output kind {:?}, expected jsonfile or es8",
                other
            ))),
        }
    }

    pub fn into_sink(self) -> Result<Box<dyn ResultSink>> {
        Ok(match self {
            SinkKind::JsonFile(path) => Box::new(JsonFileSink::new(path)),
            SinkKind::Elasticsearch(address) if address.is_empty() => {
                Box::new(ElasticsearchSink::new(elasticsearch::address_from_env())?)
            }
            SinkKind::Elasticsearch(address) => Box::new(ElasticsearchSink::new(address)?),
        })
    }
}
