use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
  #[error("invalid tournament snapshot: {0}")]
  InvalidSnapshot(String),
  /// No match produced a start or completion event, so there is nothing to replay.
  #[error("no usable timeline: the snapshot has no started or completed matches with known players")]
  EmptyTimeline,
  #[error("start.gg: {0}")]
  Startgg(String),
  #[error("config: {0}")]
  Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
