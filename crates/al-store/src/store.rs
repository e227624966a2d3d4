use std::io::{Error as IoError, ErrorKind};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use al_core::core::{
    Annotation, AnnotationId, AnnotationStore, AutoLabelError, Document, DocumentId, Label, LabelId, LabelSet,
    NewAnnotation, Project, ProjectId, ProjectType, Span, StoreError, UserId, ValidationError,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use crate::models::{Member, NewProject};

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    project_type TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS members (
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    joined_at TEXT NOT NULL,
    PRIMARY KEY (project_id, user_id)
);

CREATE TABLE IF NOT EXISTS labels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (project_id, text)
);

CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project_id);

CREATE TABLE IF NOT EXISTS annotations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    label_id INTEGER NOT NULL REFERENCES labels(id) ON DELETE CASCADE,
    start_offset INTEGER,
    end_offset INTEGER,
    created_at TEXT NOT NULL,
    CHECK ((start_offset IS NULL) = (end_offset IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_annotations_document ON annotations(document_id, user_id);
CREATE INDEX IF NOT EXISTS idx_annotations_label ON annotations(label_id);
"#;

const ANNOTATION_COLUMNS: &str =
    "id, document_id, user_id, label_id, start_offset, end_offset";

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("sqlite connection mutex poisoned")]
    Poisoned,
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict(message) => StoreError::Conflict(message),
            DbError::Invalid(invalid) => StoreError::Conflict(invalid.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<DbError> for AutoLabelError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Invalid(invalid) => AutoLabelError::Validation(invalid),
            other => AutoLabelError::Store(other.into()),
        }
    }
}

pub struct SqliteAnnotationStore {
    conn: Mutex<Connection>,
}

impl SqliteAnnotationStore {
    pub fn new(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn new_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    pub fn init(&self) -> Result<(), DbError> {
        let conn = self.lock_conn()?;
        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        conn.execute_batch(SCHEMA_SQL)?;
        if version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Projects and members
    // -----------------------------------------------------------------------

    pub fn create_project(&self, new: &NewProject) -> Result<Project, DbError> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO projects (name, description, project_type, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                new.name.as_str(),
                new.description.as_str(),
                new.project_type.as_str(),
                now(),
            ],
        )?;
        Ok(Project {
            id: ProjectId::new(conn.last_insert_rowid()),
            name: new.name.clone(),
            description: new.description.clone(),
            project_type: new.project_type,
        })
    }

    pub fn find_project(&self, id: ProjectId) -> Result<Option<Project>, DbError> {
        let conn = self.lock_conn()?;
        let project = conn
            .query_row(
                "SELECT id, name, description, project_type FROM projects WHERE id = ?1",
                params![id.value()],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    /// Removes a project with its members, labels, documents and annotations.
    pub fn delete_project(&self, id: ProjectId) -> Result<bool, DbError> {
        let conn = self.lock_conn()?;
        let deleted = conn.execute("DELETE FROM projects WHERE id = ?1", params![id.value()])?;
        Ok(deleted > 0)
    }

    pub fn list_projects_for_user(&self, user: &UserId) -> Result<Vec<Project>, DbError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT p.id, p.name, p.description, p.project_type
             FROM projects p
             JOIN members m ON m.project_id = p.id
             WHERE m.user_id = ?1
             ORDER BY p.id ASC",
        )?;
        let rows = stmt.query_map(params![user.as_str()], project_from_row)?;
        let projects = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    /// Idempotent.
    pub fn add_member(&self, project: ProjectId, user: &UserId) -> Result<(), DbError> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO members (project_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            params![project.value(), user.as_str(), now()],
        )?;
        Ok(())
    }

    pub fn list_members(&self, project: ProjectId) -> Result<Vec<Member>, DbError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, joined_at FROM members WHERE project_id = ?1 ORDER BY user_id ASC",
        )?;
        let rows = stmt.query_map(params![project.value()], |row| {
            let user: String = row.get(0)?;
            let joined_at: String = row.get(1)?;
            Ok(Member {
                user: UserId::new(user),
                joined_at: parse_datetime_utc(1, &joined_at)?,
            })
        })?;
        let members = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    pub fn has_member(&self, project: ProjectId, user: &UserId) -> Result<bool, DbError> {
        let conn = self.lock_conn()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM members WHERE project_id = ?1 AND user_id = ?2 LIMIT 1",
                params![project.value(), user.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        Ok(exists)
    }

    // -----------------------------------------------------------------------
    // Labels
    // -----------------------------------------------------------------------

    /// Label texts are unique per project.
    pub fn create_label(&self, project: ProjectId, text: &str) -> Result<Label, DbError> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO labels (project_id, text, created_at) VALUES (?1, ?2, ?3)",
            params![project.value(), text, now()],
        )
        .map_err(|err| label_write_error(err, project, text))?;
        Ok(Label {
            id: LabelId::new(conn.last_insert_rowid()),
            project,
            text: text.to_owned(),
        })
    }

    pub fn project_labels(&self, project: ProjectId) -> Result<LabelSet, DbError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, text FROM labels WHERE project_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![project.value()], label_from_row)?;
        let labels = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(LabelSet::new(labels))
    }

    pub fn find_label(&self, project: ProjectId, id: LabelId) -> Result<Option<Label>, DbError> {
        let conn = self.lock_conn()?;
        let label = conn
            .query_row(
                "SELECT id, project_id, text FROM labels WHERE id = ?1 AND project_id = ?2",
                params![id.value(), project.value()],
                label_from_row,
            )
            .optional()?;
        Ok(label)
    }

    /// `None` when the label does not exist in `project`.
    pub fn rename_label(
        &self,
        project: ProjectId,
        id: LabelId,
        text: &str,
    ) -> Result<Option<Label>, DbError> {
        let conn = self.lock_conn()?;
        let updated = conn
            .execute(
                "UPDATE labels SET text = ?1 WHERE id = ?2 AND project_id = ?3",
                params![text, id.value(), project.value()],
            )
            .map_err(|err| label_write_error(err, project, text))?;
        if updated == 0 {
            return Ok(None);
        }
        Ok(Some(Label {
            id,
            project,
            text: text.to_owned(),
        }))
    }

    /// Removes the label and, by cascade, every annotation using it.
    pub fn delete_label(&self, project: ProjectId, label: LabelId) -> Result<bool, DbError> {
        let conn = self.lock_conn()?;
        let deleted = conn.execute(
            "DELETE FROM labels WHERE id = ?1 AND project_id = ?2",
            params![label.value(), project.value()],
        )?;
        Ok(deleted > 0)
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    pub fn create_document(&self, project: ProjectId, text: &str) -> Result<Document, DbError> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO documents (project_id, text, created_at) VALUES (?1, ?2, ?3)",
            params![project.value(), text, now()],
        )?;
        Ok(Document {
            id: DocumentId::new(conn.last_insert_rowid()),
            project,
            text: text.to_owned(),
        })
    }

    pub fn find_document(
        &self,
        project: ProjectId,
        id: DocumentId,
    ) -> Result<Option<Document>, DbError> {
        let conn = self.lock_conn()?;
        let document = conn
            .query_row(
                "SELECT id, project_id, text FROM documents WHERE id = ?1 AND project_id = ?2",
                params![id.value(), project.value()],
                document_from_row,
            )
            .optional()?;
        Ok(document)
    }

    pub fn project_documents(&self, project: ProjectId) -> Result<Vec<Document>, DbError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, text FROM documents WHERE project_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![project.value()], document_from_row)?;
        let documents = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }

    /// Documents `user` has (`checked = true`) or has not yet annotated.
    pub fn list_documents_checked(
        &self,
        project: ProjectId,
        user: &UserId,
        checked: bool,
    ) -> Result<Vec<Document>, DbError> {
        self.search_documents(project, user, Some(checked), None)
    }

    /// Documents of `project` filtered by whether `user` annotated them and
    /// by a case-insensitive substring of their text.
    pub fn search_documents(
        &self,
        project: ProjectId,
        user: &UserId,
        checked: Option<bool>,
        text: Option<&str>,
    ) -> Result<Vec<Document>, DbError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT d.id, d.project_id, d.text
             FROM documents d
             WHERE d.project_id = ?1
               AND (?3 IS NULL OR EXISTS (
                   SELECT 1 FROM annotations a WHERE a.document_id = d.id AND a.user_id = ?2
               ) = ?3)
               AND (?4 IS NULL OR instr(lower(d.text), lower(?4)) > 0)
             ORDER BY d.id ASC",
        )?;
        let rows = stmt.query_map(
            params![project.value(), user.as_str(), checked, text],
            document_from_row,
        )?;
        let documents = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }

    pub fn delete_document(&self, project: ProjectId, id: DocumentId) -> Result<bool, DbError> {
        let conn = self.lock_conn()?;
        let deleted = conn.execute(
            "DELETE FROM documents WHERE id = ?1 AND project_id = ?2",
            params![id.value(), project.value()],
        )?;
        Ok(deleted > 0)
    }

    // -----------------------------------------------------------------------
    // Annotations
    // -----------------------------------------------------------------------

    /// Stores an annotation already checked against the document and label set.
    ///
    /// A span must not overlap any other span `user` holds on the document.
    pub fn create_annotation(
        &self,
        document: DocumentId,
        user: &UserId,
        new: &NewAnnotation,
    ) -> Result<Annotation, DbError> {
        let conn = self.lock_conn()?;
        ensure_disjoint(&conn, document, user, new, None)?;
        insert_annotation(&conn, document, user, new)
    }

    /// Rewrites label and span of an annotation owned by `user`. `None` when
    /// no such annotation exists on the document.
    pub fn update_annotation(
        &self,
        document: DocumentId,
        id: AnnotationId,
        user: &UserId,
        new: &NewAnnotation,
    ) -> Result<Option<Annotation>, DbError> {
        let conn = self.lock_conn()?;
        ensure_disjoint(&conn, document, user, new, Some(id))?;
        let updated = conn.execute(
            "UPDATE annotations SET label_id = ?1, start_offset = ?2, end_offset = ?3
             WHERE id = ?4 AND document_id = ?5 AND user_id = ?6",
            params![
                new.label.value(),
                new.span.map(|s| s.start() as i64),
                new.span.map(|s| s.end() as i64),
                id.value(),
                document.value(),
                user.as_str(),
            ],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        Ok(Some(Annotation {
            id,
            document,
            user: user.clone(),
            label: new.label,
            span: new.span,
        }))
    }

    pub fn find_annotation(
        &self,
        document: DocumentId,
        id: AnnotationId,
    ) -> Result<Option<Annotation>, DbError> {
        let conn = self.lock_conn()?;
        let annotation = conn
            .query_row(
                &format!(
                    "SELECT {ANNOTATION_COLUMNS} FROM annotations WHERE id = ?1 AND document_id = ?2"
                ),
                params![id.value(), document.value()],
                annotation_from_row,
            )
            .optional()?;
        Ok(annotation)
    }

    pub fn document_annotations(
        &self,
        document: DocumentId,
        user: Option<&UserId>,
    ) -> Result<Vec<Annotation>, DbError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ANNOTATION_COLUMNS}
             FROM annotations
             WHERE document_id = ?1 AND (?2 IS NULL OR user_id = ?2)
             ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(
            params![document.value(), user.map(UserId::as_str)],
            annotation_from_row,
        )?;
        let annotations = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(annotations)
    }

    /// Deletes only when `user` owns the annotation.
    pub fn delete_annotation(&self, id: AnnotationId, user: &UserId) -> Result<bool, DbError> {
        let conn = self.lock_conn()?;
        let deleted = conn.execute(
            "DELETE FROM annotations WHERE id = ?1 AND user_id = ?2",
            params![id.value(), user.as_str()],
        )?;
        Ok(deleted > 0)
    }

    pub fn replace_user_annotations(
        &self,
        document: DocumentId,
        user: &UserId,
        annotations: &[NewAnnotation],
    ) -> Result<Vec<Annotation>, DbError> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM annotations WHERE document_id = ?1 AND user_id = ?2",
            params![document.value(), user.as_str()],
        )?;
        let written = annotations
            .iter()
            .map(|new| insert_annotation(&tx, document, user, new))
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit()?;
        Ok(written)
    }
}

impl AnnotationStore for SqliteAnnotationStore {
    fn get_project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        Ok(self.find_project(id)?)
    }

    fn list_labels(&self, project: ProjectId) -> Result<LabelSet, StoreError> {
        Ok(self.project_labels(project)?)
    }

    fn get_document(
        &self,
        project: ProjectId,
        id: DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.find_document(project, id)?)
    }

    fn list_documents(&self, project: ProjectId) -> Result<Vec<Document>, StoreError> {
        Ok(self.project_documents(project)?)
    }

    fn list_annotations(
        &self,
        document: DocumentId,
        user: Option<&UserId>,
    ) -> Result<Vec<Annotation>, StoreError> {
        Ok(self.document_annotations(document, user)?)
    }

    fn is_member(&self, project: ProjectId, user: &UserId) -> Result<bool, StoreError> {
        Ok(self.has_member(project, user)?)
    }

    fn replace_annotations(
        &self,
        document: DocumentId,
        user: &UserId,
        annotations: &[NewAnnotation],
    ) -> Result<Vec<Annotation>, StoreError> {
        Ok(self.replace_user_annotations(document, user, annotations)?)
    }
}

fn insert_annotation(
    conn: &Connection,
    document: DocumentId,
    user: &UserId,
    new: &NewAnnotation,
) -> Result<Annotation, DbError> {
    conn.execute(
        "INSERT INTO annotations (document_id, user_id, label_id, start_offset, end_offset, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            document.value(),
            user.as_str(),
            new.label.value(),
            new.span.map(|s| s.start() as i64),
            new.span.map(|s| s.end() as i64),
            now(),
        ],
    )?;
    Ok(Annotation {
        id: AnnotationId::new(conn.last_insert_rowid()),
        document,
        user: user.clone(),
        label: new.label,
        span: new.span,
    })
}

fn ensure_disjoint(
    conn: &Connection,
    document: DocumentId,
    user: &UserId,
    new: &NewAnnotation,
    ignore: Option<AnnotationId>,
) -> Result<(), DbError> {
    let Some(span) = new.span else {
        return Ok(());
    };
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM annotations
             WHERE document_id = ?1 AND user_id = ?2
               AND start_offset < ?4 AND ?3 < end_offset
               AND (?5 IS NULL OR id <> ?5)
             ORDER BY id ASC
             LIMIT 1",
            params![
                document.value(),
                user.as_str(),
                span.start() as i64,
                span.end() as i64,
                ignore.map(|id| id.value()),
            ],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        Some(existing) => Err(ValidationError::OverlappingSpan {
            start: span.start(),
            end: span.end(),
            existing: AnnotationId::new(existing),
        }
        .into()),
        None => Ok(()),
    }
}

fn label_write_error(err: rusqlite::Error, project: ProjectId, text: &str) -> DbError {
    if is_constraint_violation(&err) {
        DbError::Conflict(format!("label {text:?} already exists in project {project}"))
    } else {
        DbError::Database(err)
    }
}

fn label_from_row(row: &Row<'_>) -> rusqlite::Result<Label> {
    Ok(Label {
        id: LabelId::new(row.get(0)?),
        project: ProjectId::new(row.get(1)?),
        text: row.get(2)?,
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    let project_type: String = row.get(3)?;
    Ok(Project {
        id: ProjectId::new(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        project_type: parse_project_type(3, &project_type)?,
    })
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: DocumentId::new(row.get(0)?),
        project: ProjectId::new(row.get(1)?),
        text: row.get(2)?,
    })
}

fn annotation_from_row(row: &Row<'_>) -> rusqlite::Result<Annotation> {
    let user: String = row.get(2)?;
    let start: Option<i64> = row.get(4)?;
    let end: Option<i64> = row.get(5)?;
    let span = match (start, end) {
        (Some(start), Some(end)) => Some(parse_span(4, start, end)?),
        _ => None,
    };
    Ok(Annotation {
        id: AnnotationId::new(row.get(0)?),
        document: DocumentId::new(row.get(1)?),
        user: UserId::new(user),
        label: LabelId::new(row.get(3)?),
        span,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_project_type(column: usize, value: &str) -> rusqlite::Result<ProjectType> {
    ProjectType::parse(value).ok_or_else(|| sql_parse_error(column, Type::Text, "project type", value))
}

fn parse_span(column: usize, start: i64, end: i64) -> rusqlite::Result<Span> {
    let invalid = || sql_parse_error(column, Type::Integer, "span", &format!("[{start}, {end})"));
    let start = usize::try_from(start).map_err(|_| invalid())?;
    let end = usize::try_from(end).map_err(|_| invalid())?;
    Span::ordered(start, end).map_err(|_| invalid())
}

pub(crate) fn parse_datetime_utc(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| sql_parse_error(column, Type::Text, "datetime", value))
}

fn sql_parse_error(column: usize, ty: Type, field: &'static str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        ty,
        Box::new(IoError::new(
            ErrorKind::InvalidData,
            format!("invalid {field}: {value}"),
        )),
    )
}
