use al_core::core::{ProjectId, UserId};
use rusqlite::params;

use crate::models::{LabelStats, Progress, ProjectStats, UserStats};
use crate::store::{DbError, SqliteAnnotationStore};

impl SqliteAnnotationStore {
    /// Annotation counts per label (every label, in id order) and per member
    /// (every member, in user-id order).
    pub fn project_stats(&self, project: ProjectId) -> Result<ProjectStats, DbError> {
        let conn = self.lock_conn()?;

        let mut stmt = conn.prepare(
            "SELECT l.text, COUNT(a.id)
             FROM labels l
             LEFT JOIN annotations a ON a.label_id = l.id
             WHERE l.project_id = ?1
             GROUP BY l.id
             ORDER BY l.id ASC",
        )?;
        let rows = stmt.query_map(params![project.value()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let per_label = rows.collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT m.user_id, COUNT(a.id)
             FROM members m
             LEFT JOIN documents d ON d.project_id = m.project_id
             LEFT JOIN annotations a ON a.document_id = d.id AND a.user_id = m.user_id
             WHERE m.project_id = ?1
             GROUP BY m.user_id
             ORDER BY m.user_id ASC",
        )?;
        let rows = stmt.query_map(params![project.value()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let per_user = rows.collect::<Result<Vec<_>, _>>()?;

        let (labels, label_data) = split_counts(per_label);
        let (users, user_data) = split_counts(per_user);
        Ok(ProjectStats {
            label: LabelStats {
                labels,
                data: label_data,
            },
            user: UserStats {
                users,
                data: user_data,
            },
        })
    }

    pub fn progress(&self, project: ProjectId, user: &UserId) -> Result<Progress, DbError> {
        let conn = self.lock_conn()?;
        let (total, done): (i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(EXISTS (
                        SELECT 1 FROM annotations a WHERE a.document_id = d.id AND a.user_id = ?2
                    )), 0)
             FROM documents d
             WHERE d.project_id = ?1",
            params![project.value(), user.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let total = count(total);
        Ok(Progress {
            total,
            remaining: total.saturating_sub(count(done)),
        })
    }
}

fn split_counts(rows: Vec<(String, i64)>) -> (Vec<String>, Vec<usize>) {
    rows.into_iter().map(|(name, n)| (name, count(n))).unzip()
}

fn count(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}
