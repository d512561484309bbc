use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::core::domain::decision_log::{Decision, DecisionLog, DecisionLogError};
use crate::core::domain::global_id::GlobalId;

#[derive(Debug, Serialize, Deserialize)]
struct DecisionEntry {
    global_id: GlobalId,
    decision: Decision,
}

/// Append-only JSON-lines decision log. Each record is flushed to disk
/// before `record` returns, so a commit decision survives a coordinator
/// crash.
pub struct FileDecisionLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileDecisionLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DecisionLog for FileDecisionLog {
    async fn record(&self, global_id: &GlobalId, decision: Decision) -> Result<(), DecisionLogError> {
        let mut line = serde_json::to_vec(&DecisionEntry {
            global_id: global_id.clone(),
            decision,
        })?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;
        Ok(())
    }

    async fn decision(&self, global_id: &GlobalId) -> Result<Option<Decision>, DecisionLogError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut latest = None;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let entry: DecisionEntry = serde_json::from_str(line)?;
            if &entry.global_id == global_id {
                latest = Some(entry.decision);
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decisions_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        let g1 = GlobalId::parse("G1").unwrap();
        let g2 = GlobalId::parse("G2").unwrap();

        let log = FileDecisionLog::new(&path);
        log.record(&g1, Decision::Commit).await.unwrap();
        log.record(&g2, Decision::Abort).await.unwrap();
        drop(log);

        let reopened = FileDecisionLog::new(&path);
        assert_eq!(reopened.decision(&g1).await.unwrap(), Some(Decision::Commit));
        assert_eq!(reopened.decision(&g2).await.unwrap(), Some(Decision::Abort));
    }

    #[tokio::test]
    async fn missing_file_means_no_decision() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileDecisionLog::new(dir.path().join("absent.jsonl"));
        let id = GlobalId::parse("G1").unwrap();
        assert_eq!(log.decision(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_lines_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        tokio::fs::write(&path, "not json\n").await.unwrap();
        let log = FileDecisionLog::new(&path);
        let id = GlobalId::parse("G1").unwrap();
        assert!(matches!(
            log.decision(&id).await,
            Err(DecisionLogError::Malformed(_))
        ));
    }
}
