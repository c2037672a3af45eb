use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;
use sqlx::{Executor, PgPool, Postgres};

use crate::models::*;

// ─── Checkpoint ─────────────────────────────────────────────────────────────

/// Get the last fully scanned block, if the checkpoint row exists.
pub async fn get_checkpoint(pool: &PgPool) -> Result<Option<i64>, sqlx::Error> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT last_processed_block FROM chain_checkpoint WHERE id = 1")
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|r| r.0))
}

/// Advance the checkpoint; `GREATEST` keeps it from moving backwards.
pub async fn set_checkpoint<'e, E>(executor: E, block_number: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO chain_checkpoint (id, last_processed_block, updated_at)
        VALUES (1, $1, NOW())
        ON CONFLICT (id) DO UPDATE
        SET last_processed_block = GREATEST(chain_checkpoint.last_processed_block, EXCLUDED.last_processed_block),
            updated_at = NOW()
        "#,
    )
    .bind(block_number)
    .execute(executor)
    .await?;
    Ok(())
}

// ─── Monitored Contracts ────────────────────────────────────────────────────

pub async fn list_monitored_contracts(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT address FROM monitored_contracts ORDER BY added_at, address")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn add_monitored_contract(pool: &PgPool, address: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO monitored_contracts (address) VALUES ($1) ON CONFLICT (address) DO NOTHING",
    )
    .bind(address)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn remove_monitored_contract(pool: &PgPool, address: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM monitored_contracts WHERE address = $1")
        .bind(address)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

// ─── Blockchain Events ──────────────────────────────────────────────────────

/// Insert an event, skipping duplicates on (transaction_hash, event_name, contract_address),
/// and try to take its dispatch claim.
///
/// A new row is inserted already claimed. An existing unhandled row is claimed
/// when nobody holds it or the claim predates `stale_before`.
pub async fn record_event(
    pool: &PgPool,
    event: &NewBlockchainEvent,
    stale_before: DateTime<Utc>,
) -> Result<EventRecordState, sqlx::Error> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO blockchain_events
            (transaction_hash, event_name, contract_address, block_number, log_index, args, timestamp, dispatch_claimed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
        ON CONFLICT (transaction_hash, event_name, contract_address) DO NOTHING
        "#,
    )
    .bind(&event.transaction_hash)
    .bind(&event.event_name)
    .bind(&event.contract_address)
    .bind(event.block_number)
    .bind(event.log_index)
    .bind(Json(&event.args))
    .bind(event.timestamp)
    .execute(pool)
    .await?
    .rows_affected();

    if inserted == 1 {
        return Ok(EventRecordState::Inserted);
    }

    let claimed = sqlx::query(
        r#"
        UPDATE blockchain_events SET dispatch_claimed_at = NOW()
        WHERE transaction_hash = $1 AND event_name = $2 AND contract_address = $3
          AND handled_at IS NULL
          AND (dispatch_claimed_at IS NULL OR dispatch_claimed_at < $4)
        "#,
    )
    .bind(&event.transaction_hash)
    .bind(&event.event_name)
    .bind(&event.contract_address)
    .bind(stale_before)
    .execute(pool)
    .await?
    .rows_affected();

    if claimed == 1 {
        return Ok(EventRecordState::Unhandled);
    }

    let (handled_at,): (Option<DateTime<Utc>>,) = sqlx::query_as(
        r#"
        SELECT handled_at FROM blockchain_events
        WHERE transaction_hash = $1 AND event_name = $2 AND contract_address = $3
        "#,
    )
    .bind(&event.transaction_hash)
    .bind(&event.event_name)
    .bind(&event.contract_address)
    .fetch_one(pool)
    .await?;

    Ok(match handled_at {
        Some(_) => EventRecordState::Handled,
        None => EventRecordState::InFlight,
    })
}

pub async fn mark_event_handled(pool: &PgPool, key: &EventKey) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE blockchain_events SET handled_at = NOW()
        WHERE transaction_hash = $1 AND event_name = $2 AND contract_address = $3
          AND handled_at IS NULL
        "#,
    )
    .bind(&key.transaction_hash)
    .bind(&key.event_name)
    .bind(&key.contract_address)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_events(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM blockchain_events")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

// ─── Circles ────────────────────────────────────────────────────────────────

/// Insert a circle and its creator membership in one transaction.
pub async fn insert_circle(pool: &PgPool, circle: &NewCircle) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO circles (circle_address, group_id_hash, creator_id, creator_address, status,
                             member_count, max_members, deposit_amount, current_round, created_at, metadata)
        VALUES ($1, $2, $3, $4, $5, 0, $6, $7, 0, $8, $9)
        ON CONFLICT (circle_address) DO NOTHING
        "#,
    )
    .bind(&circle.circle_address)
    .bind(&circle.group_id_hash)
    .bind(&circle.creator_id)
    .bind(&circle.creator_address)
    .bind(CircleStatus::Setup)
    .bind(circle.max_members)
    .bind(&circle.deposit_amount)
    .bind(circle.created_at)
    .bind(Json(&circle.metadata))
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    let creator = CircleMember {
        circle_address: circle.circle_address.clone(),
        wallet_address: circle.creator_address.clone(),
        user_id_hash: String::new(),
        joined_at: circle.created_at,
    };
    upsert_member(&mut *tx, &creator).await?;
    recount_members(&mut *tx, &circle.circle_address).await?;

    tx.commit().await?;
    Ok(true)
}

pub async fn get_circle(pool: &PgPool, address: &str) -> Result<Option<Circle>, sqlx::Error> {
    sqlx::query_as::<_, Circle>("SELECT * FROM circles WHERE circle_address = $1")
        .bind(address)
        .fetch_optional(pool)
        .await
}

pub async fn get_circles_by_group(
    pool: &PgPool,
    group_id: &str,
) -> Result<Vec<Circle>, sqlx::Error> {
    sqlx::query_as::<_, Circle>("SELECT * FROM circles WHERE group_id = $1 ORDER BY created_at")
        .bind(group_id)
        .fetch_all(pool)
        .await
}

pub async fn get_circles_by_status(
    pool: &PgPool,
    status: CircleStatus,
) -> Result<Vec<Circle>, sqlx::Error> {
    sqlx::query_as::<_, Circle>("SELECT * FROM circles WHERE status = $1 ORDER BY created_at")
        .bind(status)
        .fetch_all(pool)
        .await
}

pub async fn set_circle_group(
    pool: &PgPool,
    address: &str,
    group_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE circles SET group_id = $2 WHERE circle_address = $1")
        .bind(address)
        .bind(group_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn update_circle_status(
    pool: &PgPool,
    address: &str,
    status: CircleStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE circles SET status = $2 WHERE circle_address = $1")
        .bind(address)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Rounds only advance: a stale RoundStarted replay leaves the row untouched.
pub async fn update_circle_round(
    pool: &PgPool,
    address: &str,
    round: i32,
    deadline: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE circles SET current_round = $2, next_deadline = $3
        WHERE circle_address = $1 AND current_round <= $2
        "#,
    )
    .bind(address)
    .bind(round)
    .bind(deadline)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Insert a membership and recompute `member_count` from the membership rows.
pub async fn add_circle_member(pool: &PgPool, member: &CircleMember) -> Result<i64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    upsert_member(&mut *tx, member).await?;
    let count = recount_members(&mut *tx, &member.circle_address).await?;
    tx.commit().await?;
    Ok(count)
}

/// The creator row is inserted without a user hash; a later MemberJoined fills it in.
async fn upsert_member<'e, E>(executor: E, member: &CircleMember) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO circle_members (circle_address, wallet_address, user_id_hash, joined_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (circle_address, wallet_address) DO UPDATE
        SET user_id_hash = EXCLUDED.user_id_hash
        WHERE circle_members.user_id_hash = ''
        "#,
    )
    .bind(&member.circle_address)
    .bind(&member.wallet_address)
    .bind(&member.user_id_hash)
    .bind(member.joined_at)
    .execute(executor)
    .await?;
    Ok(())
}

async fn recount_members<'e, E>(executor: E, circle_address: &str) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i32,)> = sqlx::query_as(
        r#"
        UPDATE circles
        SET member_count = (SELECT COUNT(*) FROM circle_members WHERE circle_address = $1)
        WHERE circle_address = $1
        RETURNING member_count
        "#,
    )
    .bind(circle_address)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|r| r.0 as i64).unwrap_or(0))
}

pub async fn list_circle_members(
    pool: &PgPool,
    address: &str,
) -> Result<Vec<CircleMember>, sqlx::Error> {
    sqlx::query_as::<_, CircleMember>(
        "SELECT * FROM circle_members WHERE circle_address = $1 ORDER BY joined_at, wallet_address",
    )
    .bind(address)
    .fetch_all(pool)
    .await
}

pub async fn circle_stats(pool: &PgPool) -> Result<CircleStats, sqlx::Error> {
    let rows: Vec<(String, i64, i64)> = sqlx::query_as(
        r#"
        SELECT status, COUNT(*), COALESCE(SUM(member_count), 0)::BIGINT
        FROM circles
        GROUP BY status
        ORDER BY status
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut stats = CircleStats::default();
    for (status, count, members) in rows {
        stats.total_circles += count;
        stats.total_members += members;
        stats.by_status.push(StatusCount { status, count });
    }
    Ok(stats)
}

// ─── Ledgers ────────────────────────────────────────────────────────────────

/// Append a deposit/payout/penalty row; replays of the same transaction are ignored.
pub async fn insert_ledger_entry(
    pool: &PgPool,
    ledger: Ledger,
    entry: &LedgerEntry,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO {} (circle_address, round_index, member_address, amount, penalty, transaction_hash, block_number)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT DO NOTHING
        "#,
        ledger.table()
    );
    sqlx::query(&sql)
        .bind(&entry.circle_address)
        .bind(entry.round_index)
        .bind(&entry.member_address)
        .bind(&entry.amount)
        .bind(&entry.penalty)
        .bind(&entry.transaction_hash)
        .bind(entry.block_number)
        .execute(pool)
        .await?;
    Ok(())
}

// ─── Users ──────────────────────────────────────────────────────────────────

pub async fn get_user(pool: &PgPool, user_id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_user_by_wallet(pool: &PgPool, wallet: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE wallet_address = $1")
        .bind(wallet)
        .fetch_optional(pool)
        .await
}

/// Create the user on first contact; later calls refresh the profile and activity.
pub async fn upsert_user(pool: &PgPool, user: &NewUser) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (user_id, display_name, picture_url, language, notification_preferences, created_at, last_activity)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        ON CONFLICT (user_id) DO UPDATE
        SET display_name = COALESCE(EXCLUDED.display_name, users.display_name),
            picture_url = COALESCE(EXCLUDED.picture_url, users.picture_url),
            last_activity = NOW()
        RETURNING *
        "#,
    )
    .bind(&user.user_id)
    .bind(&user.display_name)
    .bind(&user.picture_url)
    .bind(user.language)
    .bind(Json(NotificationPreferences::default()))
    .fetch_one(pool)
    .await
}

pub async fn touch_user(pool: &PgPool, user_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_activity = NOW() WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_user_wallet(
    pool: &PgPool,
    user_id: &str,
    wallet: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET wallet_address = $2 WHERE user_id = $1")
        .bind(user_id)
        .bind(wallet)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Change language and/or preferences; `None` keeps the stored value.
pub async fn update_user_preferences(
    pool: &PgPool,
    user_id: &str,
    language: Option<Language>,
    preferences: Option<&NotificationPreferences>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET language = COALESCE($2, language),
            notification_preferences = COALESCE($3, notification_preferences)
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(language)
    .bind(preferences.map(Json))
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

// ─── Notification Queue ─────────────────────────────────────────────────────

pub async fn insert_notification(
    pool: &PgPool,
    n: &NewNotification,
) -> Result<NotificationEvent, sqlx::Error> {
    sqlx::query_as::<_, NotificationEvent>(
        r#"
        INSERT INTO notification_queue (notification_type, user_id, circle_address, message_content,
                                        scheduled_time, status, retry_count, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, 0, $7)
        RETURNING *
        "#,
    )
    .bind(n.notification_type)
    .bind(&n.user_id)
    .bind(&n.circle_address)
    .bind(Json(&n.message_content))
    .bind(n.scheduled_time)
    .bind(NotificationStatus::Pending)
    .bind(Json(&n.metadata))
    .fetch_one(pool)
    .await
}

pub async fn get_notification(
    pool: &PgPool,
    id: i64,
) -> Result<Option<NotificationEvent>, sqlx::Error> {
    sqlx::query_as::<_, NotificationEvent>("SELECT * FROM notification_queue WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn notifications_by_status(
    pool: &PgPool,
    status: NotificationStatus,
    limit: i64,
) -> Result<Vec<NotificationEvent>, sqlx::Error> {
    sqlx::query_as::<_, NotificationEvent>(
        "SELECT * FROM notification_queue WHERE status = $1 ORDER BY scheduled_time, id LIMIT $2",
    )
    .bind(status)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn due_notifications(
    pool: &PgPool,
    kind: Option<NotificationType>,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<NotificationEvent>, sqlx::Error> {
    sqlx::query_as::<_, NotificationEvent>(
        r#"
        SELECT * FROM notification_queue
        WHERE status = $1
          AND scheduled_time <= $2
          AND ($3::TEXT IS NULL OR notification_type = $3)
        ORDER BY scheduled_time, id
        LIMIT $4
        "#,
    )
    .bind(NotificationStatus::Pending)
    .bind(now)
    .bind(kind)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn retryable_notifications(
    pool: &PgPool,
    max_retries: i32,
    limit: i64,
) -> Result<Vec<NotificationEvent>, sqlx::Error> {
    sqlx::query_as::<_, NotificationEvent>(
        r#"
        SELECT * FROM notification_queue
        WHERE status = $1 AND retry_count < $2
        ORDER BY updated_at, id
        LIMIT $3
        "#,
    )
    .bind(NotificationStatus::Failed)
    .bind(max_retries)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Compare-and-swap into `sending`; only one caller can win a given row.
pub async fn claim_notification(
    pool: &PgPool,
    id: i64,
    max_retries: i32,
) -> Result<Option<NotificationEvent>, sqlx::Error> {
    sqlx::query_as::<_, NotificationEvent>(
        r#"
        UPDATE notification_queue
        SET status = 'sending', updated_at = NOW()
        WHERE id = $1
          AND (status = 'pending' OR (status = 'failed' AND retry_count < $2))
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(max_retries)
    .fetch_optional(pool)
    .await
}

pub async fn mark_notification_sent(
    pool: &PgPool,
    id: i64,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE notification_queue
        SET status = 'sent', sent_at = $2, last_error = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_notification_cancelled(
    pool: &PgPool,
    id: i64,
    reason: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE notification_queue SET status = 'cancelled', last_error = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_notification_failed(
    pool: &PgPool,
    id: i64,
    retry_count: i32,
    error: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE notification_queue
        SET status = 'failed', retry_count = $2, last_error = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(retry_count)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn reschedule_notification(
    pool: &PgPool,
    id: i64,
    retry_count: i32,
    next_attempt: DateTime<Utc>,
    error: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE notification_queue
        SET status = 'pending', retry_count = $2, scheduled_time = $3, last_error = $4, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(retry_count)
    .bind(next_attempt)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn release_stale_claims(
    pool: &PgPool,
    older_than: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE notification_queue SET status = 'pending', updated_at = NOW()
        WHERE status = 'sending' AND updated_at < $1
        "#,
    )
    .bind(older_than)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Retention: drop rows created before `cutoff`, whatever their status.
pub async fn delete_notifications_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM notification_queue WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// ─── Statistics ─────────────────────────────────────────────────────────────

pub async fn notification_stats(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<NotificationStats, sqlx::Error> {
    let (total, sent, failed, cancelled, pending, last_24h): (i64, i64, i64, i64, i64, i64) =
        sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'sent'),
                   COUNT(*) FILTER (WHERE status = 'failed'),
                   COUNT(*) FILTER (WHERE status = 'cancelled'),
                   COUNT(*) FILTER (WHERE status = 'pending'),
                   COUNT(*) FILTER (WHERE created_at >= $1)
            FROM notification_queue
            "#,
        )
        .bind(now - Duration::hours(24))
        .fetch_one(pool)
        .await?;

    let by_type: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT notification_type, COUNT(*)
        FROM notification_queue
        GROUP BY notification_type
        ORDER BY COUNT(*) DESC, notification_type
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(NotificationStats {
        total,
        total_sent: sent,
        total_failed: failed,
        total_cancelled: cancelled,
        total_pending: pending,
        success_rate: NotificationStats::rate(sent, failed),
        by_type: by_type
            .into_iter()
            .map(|(notification_type, count)| TypeCount {
                notification_type,
                count,
            })
            .collect(),
        last_24h,
    })
}
