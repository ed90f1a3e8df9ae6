use std::fmt::{Display, Formatter};

use crate::firestore::constants::DEFAULT_DATABASE_ID;
use crate::firestore::error::{invalid_argument, FirestoreResult};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DatabaseId {
    project_id: String,
    database: String,
}

impl DatabaseId {
    pub fn new(project_id: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: database.into(),
        }
    }

    pub fn default(project_id: impl Into<String>) -> Self {
        Self::new(project_id, DEFAULT_DATABASE_ID)
    }

    /// Resolves either a bare database name (scoped to `default_project`) or a
    /// fully qualified `projects/{project}/databases/{database}` identifier.
    pub fn parse(identifier: &str, default_project: &str) -> FirestoreResult<Self> {
        if identifier.starts_with("projects/") {
            let segments: Vec<_> = identifier.split('/').collect();
            if segments.len() == 4
                && segments[0] == "projects"
                && segments[2] == "databases"
                && !segments[1].is_empty()
                && !segments[3].is_empty()
            {
                return Ok(Self::new(segments[1], segments[3]));
            }
            return Err(invalid_argument(
                "Database identifier must follow projects/{project}/databases/{database}",
            ));
        }
        if default_project.is_empty() {
            return Err(invalid_argument("A project id is required to address a database"));
        }
        if identifier.is_empty() {
            return Ok(Self::default(default_project));
        }
        Ok(Self::new(default_project, identifier))
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn is_default_database(&self) -> bool {
        self.database == DEFAULT_DATABASE_ID
    }

    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self::new(self.project_id.clone(), database)
    }
}

impl Display for DatabaseId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "projects/{}/databases/{}", self.project_id, self.database)
    }
}
