//! Administrative routes, guarded by `x-admin-key` when `ADMIN_API_KEY` is set.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use kye_core::normalize_address;
use kye_indexer::{ScanReport, parse_address};
use kye_storage::models::{
    Circle, CircleStats, NotificationEvent, NotificationStats, NotificationStatus, NotificationType,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AppState;
use crate::response::{ApiError, ApiResponse, from_engine, json_ok};

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

pub async fn require_admin_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.admin_key {
        let given = request
            .headers()
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(next.run(request).await)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncRequest {
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
}

/// POST /admin/resync — re-scan a block range without moving the checkpoint.
pub async fn resync(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ResyncRequest>>,
) -> Result<Json<ApiResponse<ScanReport>>, ApiError> {
    let sync = state.sync.as_ref().ok_or(ApiError::Unavailable("FACTORY_ADDRESS"))?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let report = sync
        .lock()
        .await
        .resync(request.from_block, request.to_block)
        .await
        .map_err(from_engine)?;
    Ok(json_ok(report))
}

/// GET /admin/stats/notifications
pub async fn notification_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<NotificationStats>>, ApiError> {
    let stats = state.engine.stats(Utc::now()).await?;
    Ok(json_ok(stats))
}

/// GET /admin/stats/circles
pub async fn circle_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<CircleStats>>, ApiError> {
    Ok(json_ok(state.store.circle_stats().await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    pub scheduled_time: Option<DateTime<Utc>>,
}

/// POST /admin/notifications — send now, or queue for `scheduledTime`.
///
/// `data` is `null` when the user is unknown or opted out.
pub async fn send_notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendRequest>,
) -> Result<Json<ApiResponse<Option<NotificationEvent>>>, ApiError> {
    let kind: NotificationType = request.kind.parse().map_err(ApiError::BadRequest)?;
    let payload = match request.payload {
        Value::Null => Value::Object(Default::default()),
        Value::Object(map) => Value::Object(map),
        _ => return Err(ApiError::BadRequest("payload must be an object".into())),
    };

    let row = match request.scheduled_time {
        Some(at) => {
            state
                .engine
                .schedule_notification(&request.user_id, kind, &payload, at)
                .await?
        }
        None => {
            state
                .engine
                .send_notification(&request.user_id, kind, &payload)
                .await?
        }
    };
    Ok(json_ok(row))
}

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub status: String,
    pub limit: Option<i64>,
}

/// GET /admin/notifications?status=failed&limit=50, oldest schedule first.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<ApiResponse<Vec<NotificationEvent>>>, ApiError> {
    let status: NotificationStatus = query.status.parse().map_err(ApiError::BadRequest)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    Ok(json_ok(state.store.notifications_by_status(status, limit).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequest {
    pub group_id: String,
}

/// PUT /admin/circles/:address/group, binding a circle to its chat group.
pub async fn set_circle_group(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Json(request): Json<GroupRequest>,
) -> Result<Json<ApiResponse<Circle>>, ApiError> {
    let address = normalize_address(&address)?;
    let group_id = request.group_id.trim();
    if group_id.is_empty() {
        return Err(ApiError::BadRequest("groupId is empty".into()));
    }
    if !state.store.set_circle_group(&address, group_id).await? {
        return Err(ApiError::NotFound(format!("Circle {address}")));
    }
    let circle = state
        .store
        .get_circle(&address)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Circle {address}")))?;
    Ok(json_ok(circle))
}

/// GET /admin/groups/:group_id/circles
pub async fn group_circles(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Circle>>>, ApiError> {
    Ok(json_ok(state.store.get_circles_by_group(&group_id).await?))
}

/// GET /admin/contracts
pub async fn list_contracts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    Ok(json_ok(state.store.list_monitored_contracts().await?))
}

#[derive(Debug, Deserialize)]
pub struct ContractRequest {
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct ContractChange {
    pub address: String,
    pub changed: bool,
}

/// POST /admin/contracts — picked up by the worker on its next cycle.
pub async fn add_contract(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ContractRequest>,
) -> Result<Json<ApiResponse<ContractChange>>, ApiError> {
    let address = normalize_address(&request.address)?;
    let changed = match &state.sync {
        Some(sync) => {
            let parsed = parse_address(&address)
                .ok_or_else(|| ApiError::BadRequest(format!("not an address: {address}")))?;
            sync.lock().await.add_contract(parsed).await?
        }
        None => state.store.add_monitored_contract(&address).await?,
    };
    Ok(json_ok(ContractChange { address, changed }))
}

/// DELETE /admin/contracts/:address
pub async fn remove_contract(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<ApiResponse<ContractChange>>, ApiError> {
    let address = normalize_address(&address)?;
    let removed = match &state.sync {
        Some(sync) => {
            let parsed = parse_address(&address)
                .ok_or_else(|| ApiError::BadRequest(format!("not an address: {address}")))?;
            sync.lock().await.remove_contract(&parsed).await?
        }
        None => state.store.remove_monitored_contract(&address).await?,
    };
    if !removed {
        return Err(ApiError::NotFound(format!("Contract {address}")));
    }
    Ok(json_ok(ContractChange {
        address,
        changed: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::state;
    use kye_storage::Store;
    use kye_storage::models::{CircleMetadata, NewCircle, NewUser};
    use serde_json::json;

    const CONTRACT: &str = "0x00000000000000000000000000000000000000C1";

    #[tokio::test]
    async fn resync_needs_a_factory() {
        let (state, _, _) = state();
        let err = resync(State(Arc::new(state)), None).await.unwrap_err();
        assert!(matches!(err, ApiError::Unavailable(_)));
    }

    #[tokio::test]
    async fn contracts_can_be_registered_and_removed() {
        let (state, store, _) = state();
        let state = Arc::new(state);

        let Json(added) = add_contract(
            State(state.clone()),
            Json(ContractRequest {
                address: CONTRACT.into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(added.data.address, CONTRACT.to_ascii_lowercase());
        assert!(added.data.changed);
        assert_eq!(
            store.list_monitored_contracts().await.unwrap(),
            vec![CONTRACT.to_ascii_lowercase()]
        );

        remove_contract(State(state.clone()), Path(CONTRACT.into()))
            .await
            .unwrap();
        let err = remove_contract(State(state.clone()), Path(CONTRACT.into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = add_contract(
            State(state),
            Json(ContractRequest {
                address: "0x12".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn send_notification_delivers_or_schedules() {
        let (state, store, sender) = state();
        store
            .upsert_user(&NewUser {
                user_id: "U1".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let state = Arc::new(state);

        let Json(now) = send_notification(
            State(state.clone()),
            Json(SendRequest {
                user_id: "U1".into(),
                kind: "HELP".into(),
                payload: Value::Null,
                scheduled_time: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(now.data.unwrap().status, NotificationStatus::Sent);
        assert_eq!(sender.sent_to("U1").len(), 1);

        let at = Utc::now() + chrono::Duration::hours(1);
        let Json(later) = send_notification(
            State(state.clone()),
            Json(SendRequest {
                user_id: "U1".into(),
                kind: "CIRCLE_STATUS".into(),
                payload: json!({ "circleName": "Family", "status": "active" }),
                scheduled_time: Some(at),
            }),
        )
        .await
        .unwrap();
        let later = later.data.unwrap();
        assert_eq!(later.status, NotificationStatus::Pending);
        assert_eq!(later.scheduled_time, at);

        let err = send_notification(
            State(state),
            Json(SendRequest {
                user_id: "U1".into(),
                kind: "SPAM".into(),
                payload: Value::Null,
                scheduled_time: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn circles_can_be_bound_to_a_group() {
        let (state, store, _) = state();
        let address = CONTRACT.to_ascii_lowercase();
        store
            .insert_circle(&NewCircle {
                circle_address: address.clone(),
                group_id_hash: "0xgroup".into(),
                creator_id: None,
                creator_address: "0xaa".into(),
                max_members: 3,
                deposit_amount: "100".into(),
                created_at: Utc::now(),
                metadata: CircleMetadata::default(),
            })
            .await
            .unwrap();
        let state = Arc::new(state);

        let Json(bound) = set_circle_group(
            State(state.clone()),
            Path(CONTRACT.into()),
            Json(GroupRequest {
                group_id: "C123".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(bound.data.group_id.as_deref(), Some("C123"));

        let Json(listed) = group_circles(State(state.clone()), Path("C123".into()))
            .await
            .unwrap();
        assert_eq!(listed.data.len(), 1);
        assert_eq!(listed.data[0].circle_address, address);
        let Json(other) = group_circles(State(state.clone()), Path("C999".into()))
            .await
            .unwrap();
        assert!(other.data.is_empty());

        let err = set_circle_group(
            State(state),
            Path("0x00000000000000000000000000000000000000c2".into()),
            Json(GroupRequest {
                group_id: "C123".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn notifications_are_listed_by_status() {
        let (state, store, sender) = state();
        for id in ["U1", "U2"] {
            store
                .upsert_user(&NewUser {
                    user_id: id.into(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        let state = Arc::new(state);
        sender.block("U2");
        for id in ["U1", "U2"] {
            state
                .engine
                .send_notification(id, NotificationType::Help, &json!({}))
                .await
                .unwrap();
        }

        let Json(sent) = list_notifications(
            State(state.clone()),
            Query(NotificationQuery {
                status: "sent".into(),
                limit: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(sent.data.len(), 1);
        assert_eq!(sent.data[0].user_id, "U1");

        let Json(cancelled) = list_notifications(
            State(state.clone()),
            Query(NotificationQuery {
                status: "cancelled".into(),
                limit: Some(0),
            }),
        )
        .await
        .unwrap();
        assert_eq!(cancelled.data.len(), 1);
        assert_eq!(cancelled.data[0].user_id, "U2");

        let err = list_notifications(
            State(state),
            Query(NotificationQuery {
                status: "lost".into(),
                limit: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
