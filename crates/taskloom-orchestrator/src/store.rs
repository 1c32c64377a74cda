use crate::types::Task;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use taskloom_core::{TaskloomError, TaskloomResult};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistence contract for tasks, their schedules and results.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task; an existing id is an error.
    async fn create(&self, task: &Task) -> TaskloomResult<()>;
    /// Stored copy of a task.
    async fn get(&self, id: Uuid) -> TaskloomResult<Option<Task>>;
    /// Insert or overwrite.
    async fn update(&self, task: &Task) -> TaskloomResult<()>;
    /// Removing an unknown id is not an error.
    async fn delete(&self, id: Uuid) -> TaskloomResult<()>;
    /// Every stored task, oldest first.
    async fn list(&self) -> TaskloomResult<Vec<Task>>;
}

/// Process-local store.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl InMemoryTaskStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: &Task) -> TaskloomResult<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(TaskloomError::Store(format!("Task {} already exists", task.id)));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> TaskloomResult<Option<Task>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn update(&self, task: &Task) -> TaskloomResult<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> TaskloomResult<()> {
        self.tasks.write().await.remove(&id);
        Ok(())
    }

    async fn list(&self) -> TaskloomResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }
}

/// File-based task store (one JSON file per task).
pub struct FileTaskStore {
    dir: PathBuf,
}

impl FileTaskStore {
    /// Store under `dir`, created if missing.
    pub async fn new(dir: PathBuf) -> TaskloomResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn task_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn write(&self, task: &Task) -> TaskloomResult<()> {
        let path = self.task_path(task.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(task)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn create(&self, task: &Task) -> TaskloomResult<()> {
        if tokio::fs::try_exists(self.task_path(task.id)).await? {
            return Err(TaskloomError::Store(format!("Task {} already exists", task.id)));
        }
        self.write(task).await
    }

    async fn get(&self, id: Uuid) -> TaskloomResult<Option<Task>> {
        let path = self.task_path(id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let task: Task = serde_json::from_str(&data)
            .map_err(|e| TaskloomError::Store(format!("Failed to parse task {id}: {e}")))?;
        Ok(Some(task))
    }

    async fn update(&self, task: &Task) -> TaskloomResult<()> {
        self.write(task).await
    }

    async fn delete(&self, id: Uuid) -> TaskloomResult<()> {
        let path = self.task_path(id);
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn list(&self) -> TaskloomResult<Vec<Task>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut tasks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(id) = name
                .strip_suffix(".json")
                .and_then(|stem| Uuid::parse_str(stem).ok())
            else {
                continue;
            };
            if let Some(task) = self.get(id).await? {
                tasks.push(task);
            }
        }
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }
}
