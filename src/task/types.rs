use std::path::{Path, PathBuf};
use chrono::{DateTime, Duration, Utc};

use crate::error::TaskError;

pub const CONTAINER_PREFIX: &str = "osra-task-";

/// One uploaded image going through recognition.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub filename: String,
    pub input_path: PathBuf,
    /// Name the external process runs under, so it can be stopped by name.
    pub container_name: String,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: &str, filename: &str, upload_dir: &Path) -> Self {
        Self {
            id: id.to_string(),
            filename: filename.to_string(),
            input_path: upload_dir.join(filename),
            container_name: format!("{}{}", CONTAINER_PREFIX, id),
            created_at: Utc::now(),
        }
    }

    /// Time since the stream picked the task up.
    pub fn elapsed(&self) -> Duration {
        Utc::now().signed_duration_since(self.created_at)
    }
}

/// A structure string the recognition tool produced and the toolkit accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    pub smiles: String,
    /// The structure still contains `*` placeholders for unresolved groups.
    pub contains_r_group: bool,
}

impl Recognition {
    pub fn new(smiles: &str) -> Self {
        Self {
            smiles: smiles.to_string(),
            contains_r_group: smiles.contains('*'),
        }
    }
}

/// What the runner hands to the stream exactly once per task.
pub type Outcome = Result<Recognition, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_derives_paths_and_container_name() {
        let task = Task::new("abc", "mol.png", Path::new("/srv/uploads"));
        assert_eq!(task.input_path, PathBuf::from("/srv/uploads/mol.png"));
        assert_eq!(task.container_name, "osra-task-abc");
        assert!(task.elapsed() >= Duration::zero());
        assert!(task.created_at <= Utc::now());
    }

    #[test]
    fn test_recognition_flags_wildcards() {
        assert!(Recognition::new("*CCO").contains_r_group);
        assert!(!Recognition::new("CCO").contains_r_group);
    }
}
