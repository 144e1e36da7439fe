//! Postgres-backed team repository.
//!
//! Each team is one row: the aggregate (without subscriptions) as a JSONB
//! snapshot, its subscriptions as a second JSONB column, and a few plain
//! columns the background queries filter on.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | RepositoryError | Scenario |
//! |------------|----------------------|-----------------|----------|
//! | Database (unique violation) | `23505` | `Duplicate` | Same team id, or a second Super/Maintenance team |
//! | Database (other) | Any other | `Unavailable` | Constraint or server failure |
//! | PoolClosed / Io / other | N/A | `Unavailable` | Connection failures |
//!
//! A conditional update that matches no row is reported as `Conflict` when the
//! team still exists and `NotFound` otherwise.
//!
//! ## Runtime
//!
//! `TeamRepository` is synchronous; the adapter runs its async queries on a
//! stored `tokio::runtime::Handle`. Call it from threads that are not driving
//! that runtime (scheduler threads, `spawn_blocking`).

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::Handle;
use tracing::{Span, instrument};
use uuid::Uuid;

use teamhub_core::{AggregateRoot, TeamId};
use teamhub_subscriptions::TeamSubscription;
use teamhub_teams::{LoadDepth, Team};

use super::r#trait::{RepositoryError, TeamRepository};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS teams (
        id             UUID PRIMARY KEY,
        team_type      TEXT NOT NULL,
        leader_id      UUID NULL,
        next_expiry_at TIMESTAMPTZ NULL,
        version        BIGINT NOT NULL CHECK (version > 0),
        team           JSONB NOT NULL,
        subscriptions  JSONB NOT NULL DEFAULT '[]'::jsonb,
        updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS teams_singleton_tier
        ON teams (team_type) WHERE team_type IN ('super', 'maintenance')
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS teams_leaderless
        ON teams (id) WHERE leader_id IS NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS teams_next_expiry
        ON teams (next_expiry_at) WHERE next_expiry_at IS NOT NULL
    "#,
];

/// Postgres-backed team repository.
///
/// Optimistic concurrency is enforced by the database: every write is an
/// `UPDATE ... WHERE version = $n`.
#[derive(Debug, Clone)]
pub struct PostgresTeamRepository {
    pool: PgPool,
    handle: Handle,
}

impl PostgresTeamRepository {
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self { pool, handle }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the table and indexes if they don't exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, team), fields(team_id = %team.id_typed(), team_type = %team.team_type()), err)]
    pub async fn insert_team(&self, team: &Team) -> Result<u64, RepositoryError> {
        if team.version() != 0 {
            return Err(RepositoryError::Conflict(format!(
                "team {} was already persisted at version {}",
                team.id_typed(),
                team.version()
            )));
        }
        let encoded = Encoded::new(team)?;

        sqlx::query(
            r#"
            INSERT INTO teams (id, team_type, leader_id, next_expiry_at, version, team, subscriptions)
            VALUES ($1, $2, $3, $4, 1, $5, $6)
            "#,
        )
        .bind(team.id_typed().as_uuid())
        .bind(team.team_type().as_str())
        .bind(team.leader_id().map(Uuid::from))
        .bind(team.next_expiry())
        .bind(&encoded.team)
        .bind(&encoded.subscriptions)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_team", e))?;

        Ok(1)
    }

    #[instrument(skip_all, fields(team_id = %id, depth = ?depth), err)]
    pub async fn fetch_team(&self, id: TeamId, depth: LoadDepth) -> Result<Option<Team>, RepositoryError> {
        let row = sqlx::query("SELECT team, subscriptions, version FROM teams WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_team", e))?;

        row.map(|r| decode_row(&r, depth)).transpose()
    }

    #[instrument(skip(self, team), fields(team_id = %team.id_typed(), version = team.version()), err)]
    pub async fn update_team(&self, team: &Team) -> Result<u64, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let version = update_in(&mut tx, team).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(version)
    }

    /// All-or-nothing: the first stale team rolls the whole batch back.
    #[instrument(skip(self, teams), fields(batch_size = teams.len(), committed = tracing::field::Empty), err)]
    pub async fn update_batch(&self, teams: &[Team]) -> Result<Vec<u64>, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut versions = Vec::with_capacity(teams.len());
        for team in teams {
            match update_in(&mut tx, team).await {
                Ok(v) => versions.push(v),
                Err(e) => {
                    tx.rollback()
                        .await
                        .map_err(|e| map_sqlx_error("rollback", e))?;
                    return Err(e);
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Span::current().record("committed", versions.len());
        Ok(versions)
    }

    #[instrument(skip(self, id), fields(team_id = %id), err)]
    pub async fn delete_team(&self, id: TeamId, expected_version: u64) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM teams WHERE id = $1 AND version = $2")
            .bind(id.as_uuid())
            .bind(expected_version as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_team", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        Err(self.miss(id, expected_version).await?)
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_leaderless(&self) -> Result<Vec<Team>, RepositoryError> {
        let rows = sqlx::query("SELECT team, subscriptions, version FROM teams WHERE leader_id IS NULL")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_leaderless", e))?;

        rows.iter().map(|r| decode_row(r, LoadDepth::Members)).collect()
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_expiring(&self, now: DateTime<Utc>) -> Result<Vec<Team>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT team, subscriptions, version
            FROM teams
            WHERE next_expiry_at IS NOT NULL AND next_expiry_at <= $1
            ORDER BY next_expiry_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_expiring", e))?;

        let mut teams = Vec::with_capacity(rows.len());
        for row in &rows {
            let team = decode_row(row, LoadDepth::Everything)?;
            if team.has_due_subscriptions(now) {
                teams.push(team);
            }
        }
        Ok(teams)
    }

    /// Classify a conditional write that matched no row.
    async fn miss(&self, id: TeamId, expected: u64) -> Result<RepositoryError, RepositoryError> {
        let row = sqlx::query("SELECT version FROM teams WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("check_version", e))?;

        Ok(match row {
            None => RepositoryError::NotFound(id),
            Some(r) => {
                let current: i64 = r
                    .try_get("version")
                    .map_err(|e| map_sqlx_error("check_version", e))?;
                RepositoryError::Conflict(format!(
                    "team {id}: expected version {expected}, found {current}"
                ))
            }
        })
    }
}

/// Conditional update inside an open transaction. Returns the new version.
async fn update_in(tx: &mut Transaction<'_, Postgres>, team: &Team) -> Result<u64, RepositoryError> {
    let id = team.id_typed();
    let encoded = Encoded::new(team)?;

    let row = match team.depth() {
        LoadDepth::Everything => sqlx::query(
            r#"
            UPDATE teams
            SET team = $2, leader_id = $3, subscriptions = $4, next_expiry_at = $5,
                version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $6
            RETURNING version
            "#,
        )
        .bind(id.as_uuid())
        .bind(&encoded.team)
        .bind(team.leader_id().map(Uuid::from))
        .bind(&encoded.subscriptions)
        .bind(team.next_expiry())
        .bind(team.version() as i64)
        .fetch_optional(&mut **tx)
        .await,
        LoadDepth::Members => sqlx::query(
            r#"
            UPDATE teams
            SET team = $2, leader_id = $3, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND version = $4
            RETURNING version
            "#,
        )
        .bind(id.as_uuid())
        .bind(&encoded.team)
        .bind(team.leader_id().map(Uuid::from))
        .bind(team.version() as i64)
        .fetch_optional(&mut **tx)
        .await,
    }
    .map_err(|e| map_sqlx_error("update_team", e))?;

    match row {
        Some(r) => {
            let version: i64 = r
                .try_get("version")
                .map_err(|e| map_sqlx_error("update_team", e))?;
            Ok(version as u64)
        }
        None => {
            let exists = sqlx::query("SELECT 1 FROM teams WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("check_version", e))?;
            Err(match exists {
                Some(_) => RepositoryError::Conflict(format!(
                    "team {id} changed since version {}",
                    team.version()
                )),
                None => RepositoryError::NotFound(id),
            })
        }
    }
}

struct Encoded {
    team: serde_json::Value,
    subscriptions: serde_json::Value,
}

impl Encoded {
    fn new(team: &Team) -> Result<Self, RepositoryError> {
        let core = team.clone().into_members_only();
        Ok(Self {
            team: serde_json::to_value(&core).map_err(|e| RepositoryError::Serialization(e.to_string()))?,
            subscriptions: serde_json::to_value(team.subscriptions())
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
        })
    }
}

fn decode_row(row: &PgRow, depth: LoadDepth) -> Result<Team, RepositoryError> {
    let snapshot: serde_json::Value = row
        .try_get("team")
        .map_err(|e| map_sqlx_error("decode_row", e))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|e| map_sqlx_error("decode_row", e))?;

    let team: Team = serde_json::from_value(snapshot)
        .map_err(|e| RepositoryError::Serialization(format!("team snapshot: {e}")))?;

    let mut team = match depth {
        LoadDepth::Members => team.into_members_only(),
        LoadDepth::Everything => {
            let subs: serde_json::Value = row
                .try_get("subscriptions")
                .map_err(|e| map_sqlx_error("decode_row", e))?;
            let subs: Vec<TeamSubscription> = serde_json::from_value(subs)
                .map_err(|e| RepositoryError::Serialization(format!("subscriptions: {e}")))?;
            team.with_subscriptions(subs)
        }
    };
    team.record_version(version as u64);
    Ok(team)
}

/// Map SQLx errors to `RepositoryError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => RepositoryError::Duplicate(msg),
                _ => RepositoryError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            RepositoryError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            RepositoryError::Serialization(format!("decode error in {operation}: {err}"))
        }
        _ => RepositoryError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

impl TeamRepository for PostgresTeamRepository {
    fn create(&self, team: &Team) -> Result<u64, RepositoryError> {
        self.handle.block_on(self.insert_team(team))
    }

    fn load_team_with_members(&self, id: TeamId) -> Result<Option<Team>, RepositoryError> {
        self.handle.block_on(self.fetch_team(id, LoadDepth::Members))
    }

    fn load_team_with_everything(&self, id: TeamId) -> Result<Option<Team>, RepositoryError> {
        self.handle.block_on(self.fetch_team(id, LoadDepth::Everything))
    }

    fn save(&self, team: &Team) -> Result<u64, RepositoryError> {
        self.handle.block_on(self.update_team(team))
    }

    fn save_batch(&self, teams: &[Team]) -> Result<Vec<u64>, RepositoryError> {
        if teams.is_empty() {
            return Ok(vec![]);
        }
        self.handle.block_on(self.update_batch(teams))
    }

    fn delete(&self, id: TeamId, expected_version: u64) -> Result<(), RepositoryError> {
        self.handle.block_on(self.delete_team(id, expected_version))
    }

    fn list_teams_missing_leader(&self) -> Result<Vec<Team>, RepositoryError> {
        self.handle.block_on(self.fetch_leaderless())
    }

    fn list_teams_with_expired_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Team>, RepositoryError> {
        self.handle.block_on(self.fetch_expiring(now))
    }
}
