use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

use crate::config::DatabaseSettings;
use crate::models::{CandidateFilter, Conversation, Interaction, Match, MatchStatus, Profile};
use crate::services::repository::{
    MatchRepository, MatchTransaction, ProfileRepository, RepositoryError, RepositoryResult,
};

const PROFILE_COLUMNS: &str =
    "user_id, gender, preference_gender, age, latitude, longitude, status";
const MATCH_COLUMNS: &str = "id, user_id, target_id, status, created_at, updated_at";
const CONVERSATION_COLUMNS: &str =
    "id, user1_id, user2_id, last_message, last_activity, created_at";

/// PostgreSQL-backed repository
///
/// Profiles and interactions are owned by the surrounding application; this
/// client only reads them. Match and conversation writes go through database
/// transactions.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Create a new PostgreSQL repository from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL repository from settings
    pub async fn from_settings(settings: &DatabaseSettings) -> Result<Self, RepositoryError> {
        let max_connections = settings.max_connections.unwrap_or(10);
        tracing::info!("Connecting to PostgreSQL (max: {} connections)", max_connections);

        Self::new(
            &settings.url,
            max_connections,
            settings.min_connections.unwrap_or(1),
            Duration::from_secs(settings.acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(settings.idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Wrap an existing pool; migrations are the caller's responsibility
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, RepositoryError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

fn profile_from_row(row: &PgRow) -> Result<Profile, sqlx::Error> {
    let age: Option<i16> = row.try_get("age")?;
    Ok(Profile {
        user_id: row.try_get("user_id")?,
        gender: row.try_get("gender")?,
        preference_gender: row.try_get("preference_gender")?,
        age: age.and_then(|a| u8::try_from(a).ok()),
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        status: row.try_get("status")?,
    })
}

fn interaction_from_row(row: &PgRow) -> Result<Interaction, sqlx::Error> {
    Ok(Interaction {
        actor_user_id: row.try_get("actor_user_id")?,
        target_user_id: row.try_get("target_user_id")?,
        interaction_type: row.try_get("interaction_type")?,
        report_reason: row.try_get("report_reason")?,
        created_at: row.try_get("created_at")?,
    })
}

fn match_from_row(row: &PgRow) -> Result<Match, sqlx::Error> {
    Ok(Match {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        target_id: row.try_get("target_id")?,
        status: row.try_get("status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn conversation_from_row(row: &PgRow) -> Result<Conversation, sqlx::Error> {
    Ok(Conversation {
        id: row.try_get("id")?,
        user1_id: row.try_get("user1_id")?,
        user2_id: row.try_get("user2_id")?,
        last_message: row.try_get("last_message")?,
        last_activity: row.try_get("last_activity")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ProfileRepository for PgRepository {
    async fn fetch_profile(&self, user_id: &str) -> RepositoryResult<Option<Profile>> {
        let query = format!("SELECT {} FROM profiles WHERE user_id = $1", PROFILE_COLUMNS);

        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(profile_from_row).transpose()?)
    }

    async fn fetch_active_interactions(&self, actor_id: &str) -> RepositoryResult<Vec<Interaction>> {
        let query = r#"
            SELECT actor_user_id, target_user_id, interaction_type, report_reason, created_at
            FROM interactions
            WHERE actor_user_id = $1
            ORDER BY created_at
        "#;

        let rows = sqlx::query(query).bind(actor_id).fetch_all(&self.pool).await?;

        let interactions = rows
            .iter()
            .map(interaction_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("User {} has {} interactions", actor_id, interactions.len());

        Ok(interactions)
    }

    async fn fetch_candidates(&self, filter: &CandidateFilter) -> RepositoryResult<Vec<Profile>> {
        let query = format!(
            r#"
            SELECT {}
            FROM profiles
            WHERE user_id <> $1
              AND status = 'active'
              AND gender IS NOT NULL
              AND preference_gender IS NOT NULL
              AND age IS NOT NULL
              AND latitude IS NOT NULL
              AND longitude IS NOT NULL
              AND NOT (user_id = ANY($2))
              AND ($3 = 'both' OR gender::text = $3)
              AND (preference_gender = 'both' OR preference_gender::text = $4)
            ORDER BY user_id
            "#,
            PROFILE_COLUMNS
        );

        let excluded: Vec<String> = filter.exclude_user_ids.iter().cloned().collect();

        let rows = sqlx::query(&query)
            .bind(&filter.seeker_id)
            .bind(&excluded)
            .bind(filter.seeker_preference.as_str())
            .bind(filter.seeker_gender.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(profile_from_row).collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl MatchRepository for PgRepository {
    async fn begin(&self) -> RepositoryResult<Box<dyn MatchTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgMatchTransaction { tx }))
    }

    async fn list_matches(
        &self,
        user_id: &str,
        status: Option<MatchStatus>,
        limit: u32,
        offset: u32,
    ) -> RepositoryResult<Vec<Match>> {
        let query = format!(
            r#"
            SELECT {}
            FROM matches
            WHERE user_id = $1
              AND ($2::match_status IS NULL OR status = $2)
            ORDER BY created_at DESC, id
            LIMIT $3 OFFSET $4
            "#,
            MATCH_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(status)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(match_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_conversation(&self, a: &str, b: &str) -> RepositoryResult<Option<Conversation>> {
        let query = format!(
            r#"
            SELECT {}
            FROM conversations
            WHERE (user1_id = $1 AND user2_id = $2) OR (user1_id = $2 AND user2_id = $1)
            "#,
            CONVERSATION_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(a)
            .bind(b)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(conversation_from_row).transpose()?)
    }

    async fn mutual_partner_ids(&self, user_id: &str) -> RepositoryResult<Vec<String>> {
        let query = r#"
            SELECT DISTINCT CASE WHEN user_id = $1 THEN target_id ELSE user_id END AS partner_id
            FROM matches
            WHERE status = 'mutual' AND (user_id = $1 OR target_id = $1)
            ORDER BY partner_id
        "#;

        let rows = sqlx::query(query).bind(user_id).fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| row.try_get("partner_id"))
            .collect::<Result<Vec<String>, _>>()?)
    }
}

struct PgMatchTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl MatchTransaction for PgMatchTransaction {
    async fn lock_pair(&mut self, a: &str, b: &str) -> RepositoryResult<()> {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1 || ':' || $2, 0))")
            .bind(low)
            .bind(high)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn find_match(&mut self, user_id: &str, target_id: &str) -> RepositoryResult<Option<Match>> {
        let query = format!(
            "SELECT {} FROM matches WHERE user_id = $1 AND target_id = $2 FOR UPDATE",
            MATCH_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(target_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.as_ref().map(match_from_row).transpose()?)
    }

    async fn insert_match(&mut self, record: &Match) -> RepositoryResult<()> {
        let query = r#"
            INSERT INTO matches (id, user_id, target_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#;

        sqlx::query(query)
            .bind(record.id)
            .bind(&record.user_id)
            .bind(&record.target_id)
            .bind(record.status)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn update_match_status(
        &mut self,
        id: Uuid,
        status: MatchStatus,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<Match> {
        let query = format!(
            r#"
            UPDATE matches
            SET status = $1, updated_at = GREATEST($2, created_at)
            WHERE id = $3
            RETURNING {}
            "#,
            MATCH_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(status)
            .bind(updated_at)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("match {}", id)))?;

        Ok(match_from_row(&row)?)
    }

    async fn find_conversation(&mut self, a: &str, b: &str) -> RepositoryResult<Option<Conversation>> {
        let query = format!(
            r#"
            SELECT {}
            FROM conversations
            WHERE (user1_id = $1 AND user2_id = $2) OR (user1_id = $2 AND user2_id = $1)
            "#,
            CONVERSATION_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(a)
            .bind(b)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.as_ref().map(conversation_from_row).transpose()?)
    }

    async fn insert_conversation(&mut self, conversation: &Conversation) -> RepositoryResult<()> {
        let query = r#"
            INSERT INTO conversations (id, user1_id, user2_id, last_message, last_activity, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#;

        sqlx::query(query)
            .bind(conversation.id)
            .bind(&conversation.user1_id)
            .bind(&conversation.user2_id)
            .bind(&conversation.last_message)
            .bind(conversation.last_activity)
            .bind(conversation.created_at)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
