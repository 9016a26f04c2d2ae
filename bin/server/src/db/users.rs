//! User directory stored in Postgres.
//!
//! Users live in a table named after the configured resource; links live in
//! `<resource>_links`, whose primary key `(provider, external_id)` keeps an
//! external identity on at most one user.

use async_trait::async_trait;
use hearthgate_core::UserId;
use hearthgate_identity::directory::PatchChange;
use hearthgate_identity::user::Links;
use hearthgate_identity::{
    DirectoryError, NewUser, PatchOp, UserDirectory, UserFilter, UserRecord, UserStatus,
};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use std::str::FromStr;
use tracing::{debug, instrument};

use super::is_valid_identifier;

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: String,
    username: String,
    status: String,
}

/// Row type for link queries.
#[derive(FromRow)]
struct LinkRow {
    provider: String,
    external_id: String,
}

fn backend(e: sqlx::Error) -> DirectoryError {
    DirectoryError::Backend {
        details: e.to_string(),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Postgres implementation of [`UserDirectory`].
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
    table: String,
    links_table: String,
}

impl PgUserDirectory {
    /// Creates a directory over the table named `resource`.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Backend` if `resource` is not a plain SQL
    /// identifier.
    pub fn new(pool: PgPool, resource: &str) -> Result<Self, DirectoryError> {
        if !is_valid_identifier(resource) {
            return Err(DirectoryError::Backend {
                details: format!("invalid resource name '{resource}'"),
            });
        }
        Ok(Self {
            pool,
            table: resource.to_string(),
            links_table: format!("{resource}_links"),
        })
    }

    /// Creates the user and link tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), DirectoryError> {
        let statements = [
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {users} (
                    id TEXT PRIMARY KEY,
                    username TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'active',
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#,
                users = self.table
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {users}_username_idx ON {users} (username)",
                users = self.table
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {links} (
                    provider TEXT NOT NULL,
                    external_id TEXT NOT NULL,
                    user_id TEXT NOT NULL REFERENCES {users} (id) ON DELETE CASCADE,
                    PRIMARY KEY (provider, external_id),
                    UNIQUE (user_id, provider)
                )
                "#,
                links = self.links_table,
                users = self.table
            ),
        ];
        for statement in &statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    fn select_users(&self) -> QueryBuilder<'static, Postgres> {
        QueryBuilder::new(format!(
            "SELECT u.id, u.username, u.status FROM {} u WHERE ",
            self.table
        ))
    }

    /// Appends `filter` as a boolean SQL expression.
    fn push_filter(
        &self,
        query: &mut QueryBuilder<'static, Postgres>,
        filter: &UserFilter,
    ) -> Result<(), DirectoryError> {
        match filter {
            UserFilter::Id(id) => {
                query.push("u.id = ").push_bind(id.as_str().to_string());
            }
            UserFilter::Attribute { name, value } => {
                let column = match name.as_str() {
                    "id" => "u.id",
                    "username" => "u.username",
                    "status" => "u.status",
                    _ => {
                        return Err(DirectoryError::UnsupportedFilter {
                            field: name.clone(),
                        });
                    }
                };
                query.push(column).push(" = ").push_bind(value.clone());
            }
            UserFilter::LinkedTo {
                provider,
                external_id,
            } => {
                query
                    .push(format!(
                        "EXISTS (SELECT 1 FROM {} l WHERE l.user_id = u.id AND l.provider = ",
                        self.links_table
                    ))
                    .push_bind(provider.clone())
                    .push(" AND l.external_id = ")
                    .push_bind(external_id.clone())
                    .push(")");
            }
            UserFilter::Any(filters) if filters.is_empty() => {
                query.push("FALSE");
            }
            UserFilter::Any(filters) => {
                query.push("(");
                for (i, inner) in filters.iter().enumerate() {
                    if i > 0 {
                        query.push(" OR ");
                    }
                    self.push_filter(query, inner)?;
                }
                query.push(")");
            }
        }
        Ok(())
    }

    async fn load_links(&self, user_id: &str) -> Result<Links, DirectoryError> {
        let rows: Vec<LinkRow> = sqlx::query_as(&format!(
            "SELECT provider, external_id FROM {} WHERE user_id = $1",
            self.links_table
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.provider, row.external_id))
            .collect())
    }

    async fn into_record(&self, row: UserRow) -> Result<UserRecord, DirectoryError> {
        let id = UserId::from_str(&row.id).map_err(|e| DirectoryError::Backend {
            details: format!("invalid user id '{}': {e}", row.id),
        })?;
        let links = self.load_links(&row.id).await?;
        Ok(UserRecord::with_all_fields(
            id,
            row.username,
            UserStatus::parse(&row.status),
            links,
        ))
    }

    async fn insert_link(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: &UserId,
        provider: &str,
        external_id: &str,
    ) -> Result<(), DirectoryError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (provider, external_id, user_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, provider) DO UPDATE SET external_id = EXCLUDED.external_id
            "#,
            self.links_table
        ))
        .bind(provider)
        .bind(external_id)
        .bind(user_id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DirectoryError::DuplicateLink {
                    provider: provider.to_string(),
                    external_id: external_id.to_string(),
                }
            } else {
                backend(e)
            }
        })?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    fn name(&self) -> &str {
        &self.table
    }

    #[instrument(skip(self), fields(directory = %self.table))]
    async fn get(&self, filter: &UserFilter) -> Result<Option<UserRecord>, DirectoryError> {
        let mut query = self.select_users();
        self.push_filter(&mut query, filter)?;
        query.push(" ORDER BY u.id LIMIT 1");

        let row: Option<UserRow> = query
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(row) => Ok(Some(self.into_record(row).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip_all, fields(directory = %self.table, user_id = %user.derive_id()))]
    async fn create(&self, user: NewUser) -> Result<UserRecord, DirectoryError> {
        let record = user.into_record();
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(&format!(
            "INSERT INTO {} (id, username, status) VALUES ($1, $2, $3)",
            self.table
        ))
        .bind(record.id().as_str())
        .bind(record.username())
        .bind(record.status().as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DirectoryError::DuplicateId {
                    id: record.id().clone(),
                }
            } else {
                backend(e)
            }
        })?;

        for (provider, external_id) in record.links() {
            self.insert_link(&mut tx, record.id(), provider, external_id)
                .await?;
        }

        tx.commit().await.map_err(backend)?;
        debug!("user created");
        Ok(record)
    }

    #[instrument(skip(self, ops), fields(directory = %self.table, ops = ops.len()))]
    async fn patch(&self, id: &UserId, ops: &[PatchOp]) -> Result<UserRecord, DirectoryError> {
        let changes = ops
            .iter()
            .map(PatchOp::change)
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await.map_err(backend)?;

        let exists: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT id FROM {} WHERE id = $1 FOR UPDATE",
            self.table
        ))
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        if exists.is_none() {
            return Err(DirectoryError::NotFound { id: id.clone() });
        }

        for change in changes {
            match change {
                PatchChange::Link {
                    provider,
                    external_id,
                } => {
                    self.insert_link(&mut tx, id, &provider, &external_id)
                        .await?;
                }
                PatchChange::Username(username) => {
                    sqlx::query(&format!("UPDATE {} SET username = $2 WHERE id = $1", self.table))
                        .bind(id.as_str())
                        .bind(username)
                        .execute(&mut *tx)
                        .await
                        .map_err(backend)?;
                }
                PatchChange::Status(status) => {
                    sqlx::query(&format!("UPDATE {} SET status = $2 WHERE id = $1", self.table))
                        .bind(id.as_str())
                        .bind(status.as_str())
                        .execute(&mut *tx)
                        .await
                        .map_err(backend)?;
                }
            }
        }

        tx.commit().await.map_err(backend)?;
        debug!("user patched");

        self.get(&UserFilter::Id(id.clone()))
            .await?
            .ok_or_else(|| DirectoryError::NotFound { id: id.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearthgate_identity::FILTERABLE_ATTRIBUTES;
    use sqlx::postgres::PgPoolOptions;

    fn directory() -> PgUserDirectory {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/hearthgate_test")
            .unwrap();
        PgUserDirectory::new(pool, "people").unwrap()
    }

    fn where_clause(filter: &UserFilter) -> Result<String, DirectoryError> {
        let directory = directory();
        let mut query = directory.select_users();
        directory.push_filter(&mut query, filter)?;
        let sql = query.sql().to_string();
        Ok(sql
            .split_once(" WHERE ")
            .map(|(_, w)| w.to_string())
            .unwrap_or_default())
    }

    #[tokio::test]
    async fn rejects_unsafe_resource_names() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/hearthgate_test")
            .unwrap();
        assert!(PgUserDirectory::new(pool, "people; DROP TABLE people").is_err());
    }

    #[tokio::test]
    async fn name_lookup_filter_renders_as_or() {
        let clause = where_clause(&UserFilter::any([
            UserFilter::Id(UserId::new("alice")),
            UserFilter::attribute("username", "alice"),
        ]))
        .unwrap();
        assert_eq!(clause, "(u.id = $1 OR u.username = $2)");
    }

    #[tokio::test]
    async fn link_filter_uses_links_table() {
        let clause = where_clause(&UserFilter::linked_to("slack", "U1")).unwrap();
        assert_eq!(
            clause,
            "EXISTS (SELECT 1 FROM people_links l WHERE l.user_id = u.id AND l.provider = $1 AND l.external_id = $2)"
        );
    }

    #[tokio::test]
    async fn every_filterable_attribute_has_a_column() {
        for name in FILTERABLE_ATTRIBUTES {
            assert!(where_clause(&UserFilter::attribute(*name, "x")).is_ok(), "{name}");
        }
    }

    #[tokio::test]
    async fn unsupported_attribute_is_rejected() {
        let err = where_clause(&UserFilter::attribute("email", "a@example.com")).unwrap_err();
        assert_eq!(
            err,
            DirectoryError::UnsupportedFilter {
                field: "email".to_string()
            }
        );
    }

    #[tokio::test]
    async fn empty_any_matches_nothing() {
        assert_eq!(where_clause(&UserFilter::any([])).unwrap(), "FALSE");
    }
}
