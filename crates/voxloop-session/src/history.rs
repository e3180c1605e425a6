use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use voxloop_core::{HistoryError, TurnRecord};

/// Externally owned conversation history. The session appends one
/// record per completed turn and never reads anything back.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn append(&self, turn: &TurnRecord) -> Result<(), HistoryError>;
}

// ── MemoryHistory ─────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryHistory {
    turns: Mutex<Vec<TurnRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> Vec<TurnRecord> {
        self.turns.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.turns.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistorySink for MemoryHistory {
    async fn append(&self, turn: &TurnRecord) -> Result<(), HistoryError> {
        let mut turns = self
            .turns
            .lock()
            .map_err(|_| HistoryError::AppendFailed("history lock poisoned".to_string()))?;
        turns.push(turn.clone());
        Ok(())
    }
}

// ── FileHistory ───────────────────────────────────────────────

/// Appends each turn as one JSON object per line.
pub struct FileHistory {
    path: PathBuf,
}

impl FileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl HistorySink for FileHistory {
    async fn append(&self, turn: &TurnRecord) -> Result<(), HistoryError> {
        let line =
            serde_json::to_string(turn).map_err(|e| HistoryError::AppendFailed(e.to_string()))?;

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HistoryError::AppendFailed(e.to_string()))?;
        writeln!(file, "{}", line).map_err(|e| HistoryError::AppendFailed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn turn(user: &str, model: &str) -> TurnRecord {
        TurnRecord {
            user: user.to_string(),
            model: model.to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_history_appends_and_reads_back() {
        let history = MemoryHistory::new();
        assert!(history.is_empty());

        history.append(&turn("hi", "hello")).await.unwrap();
        history.append(&turn("bye", "goodbye")).await.unwrap();

        let turns = history.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].user, "hi");
        assert_eq!(turns[1].model, "goodbye");
    }

    #[tokio::test]
    async fn test_history_is_object_safe() {
        let history: Arc<dyn HistorySink> = Arc::new(MemoryHistory::new());
        history.append(&turn("a", "b")).await.unwrap();
    }

    #[test]
    fn test_history_sinks_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MemoryHistory>();
        assert_send_sync::<FileHistory>();
    }

    #[tokio::test]
    async fn test_file_history_writes_one_json_line_per_turn() {
        let dir = std::env::temp_dir().join("voxloop_history_lines");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("history.jsonl");
        let _ = std::fs::remove_file(&path);

        let history = FileHistory::new(&path);
        history.append(&turn("what time is it", "half past nine")).await.unwrap();
        history.append(&turn("thanks", "any time")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: TurnRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.user, "what time is it");
        assert_eq!(first.model, "half past nine");
        let second: TurnRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.user, "thanks");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_file_history_appends_across_instances() {
        let dir = std::env::temp_dir().join("voxloop_history_reopen");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("history.jsonl");
        let _ = std::fs::remove_file(&path);

        FileHistory::new(&path).append(&turn("one", "")).await.unwrap();
        FileHistory::new(&path).append(&turn("two", "")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_file_history_unwritable_path_fails() {
        let history = FileHistory::new("/nonexistent-dir/history.jsonl");
        match history.append(&turn("a", "b")).await {
            Err(HistoryError::AppendFailed(_)) => {}
            other => panic!("expected AppendFailed, got {:?}", other),
        }
    }
}
