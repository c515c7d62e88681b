use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use gavel_core::{
    close::CloseOutcome,
    engine::AuctionEngine,
    error::{Error, StateError},
    types::{
        auction::{Auction, AuctionStatus},
        bid::{BidOutcome, RejectReason},
        primitives::{Amount, AuctionId, UserId},
    },
};

const USER_HEADER: &str = "x-user-id";

pub fn router(engine: Arc<AuctionEngine>) -> Router {
    Router::new()
        .route("/auctions", post(publish_auction))
        .route("/auctions/{id}", get(get_auction))
        .route("/auctions/{id}/bids", post(submit_bid))
        .route("/auctions/{id}/bids/{client_request_id}", get(bid_outcome))
        .route("/auctions/{id}/close", post(close_auction))
        .route("/auctions/{id}/republish", post(republish_auction))
        .route("/auctions/{id}/stop", post(stop_auction))
        .with_state(engine)
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub item: String,
    pub start_price: u64,
    pub duration_secs: i64,
}

#[derive(Debug, Deserialize)]
pub struct BidRequest {
    pub amount: u64,
    pub client_request_id: String,
}

#[derive(Debug, Serialize)]
pub struct AuctionResponse {
    pub id: u64,
    pub seller: u64,
    pub item: String,
    pub start_price: u64,
    pub current_price: u64,
    pub bid_count: u32,
    pub leader: Option<u64>,
    pub opened_at: String,
    pub end_at: String,
    pub status: &'static str,
}

impl AuctionResponse {
    fn from_auction(auction: &Auction) -> Self {
        Self {
            id: auction.id.as_u64(),
            seller: auction.seller.as_u64(),
            item: auction.item.clone(),
            start_price: auction.start_price.as_u64(),
            current_price: auction.current_price.as_u64(),
            bid_count: auction.bid_count.as_u32(),
            leader: auction.leader.map(|user| user.as_u64()),
            opened_at: auction.opened_at.to_rfc3339(),
            end_at: auction.end_at.to_rfc3339(),
            status: status_label(auction.status),
        }
    }
}

fn status_label(status: AuctionStatus) -> &'static str {
    match status {
        AuctionStatus::Draft => "draft",
        AuctionStatus::Live => "live",
        AuctionStatus::EndedSold => "ended_sold",
        AuctionStatus::EndedUnsold => "ended_unsold",
        AuctionStatus::Cancelled => "cancelled",
    }
}

#[derive(Debug, Serialize)]
pub struct BidOutcomeResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

/// One spot for the outcome-to-wire mapping: accepted is 201, still-queued is
/// 202 and the client polls. Rejections carry their reason code; the status
/// depends on the reason class.
fn outcome_response(outcome: BidOutcome) -> (StatusCode, Json<BidOutcomeResponse>) {
    match outcome {
        BidOutcome::Accepted { price, end_at } => (
            StatusCode::CREATED,
            Json(BidOutcomeResponse {
                status: "accepted",
                price: Some(price.as_u64()),
                end_at: Some(end_at.to_rfc3339()),
                reason: None,
                retryable: None,
            }),
        ),
        BidOutcome::Pending => (
            StatusCode::ACCEPTED,
            Json(BidOutcomeResponse {
                status: "pending",
                price: None,
                end_at: None,
                reason: None,
                retryable: None,
            }),
        ),
        BidOutcome::Rejected(reason) => (
            rejection_status(&reason),
            Json(BidOutcomeResponse {
                status: "rejected",
                price: None,
                end_at: None,
                reason: Some(reason.code()),
                retryable: Some(reason.retryable()),
            }),
        ),
    }
}

fn rejection_status(reason: &RejectReason) -> StatusCode {
    match reason {
        RejectReason::AuctionNotFound => StatusCode::NOT_FOUND,
        RejectReason::AuctionNotLive => StatusCode::CONFLICT,
        RejectReason::TooLow | RejectReason::TooHigh => StatusCode::UNPROCESSABLE_ENTITY,
        RejectReason::StoreFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Serialize)]
pub struct CloseResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<u64>,
}

impl CloseResponse {
    fn from_outcome(outcome: CloseOutcome) -> Self {
        match outcome {
            CloseOutcome::Sold { winner, price } => Self {
                outcome: "sold",
                winner: Some(winner.as_u64()),
                price: Some(price.as_u64()),
            },
            CloseOutcome::Unsold => Self {
                outcome: "unsold",
                winner: None,
                price: None,
            },
            CloseOutcome::AlreadyClosed => Self {
                outcome: "already_closed",
                winner: None,
                price: None,
            },
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    MissingUser,
    NotFound(String),
    Engine(Error),
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError::Engine(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingUser => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Engine(Error::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Engine(Error::State(StateError::AuctionNotFound)) => StatusCode::NOT_FOUND,
            ApiError::Engine(Error::State(_)) => StatusCode::CONFLICT,
            ApiError::Engine(Error::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::MissingUser => format!("missing or invalid {USER_HEADER} header"),
            ApiError::NotFound(message) => message.clone(),
            ApiError::Engine(error) => error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.message(), "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.message() }));
        (status, body).into_response()
    }
}

/// Caller identity. Stands in for the session layer: the authenticated user
/// id arrives in a trusted header set by the gateway.
fn user_id(headers: &HeaderMap) -> Result<UserId, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .map(UserId::new)
        .ok_or(ApiError::MissingUser)
}

async fn publish_auction(
    State(engine): State<Arc<AuctionEngine>>,
    headers: HeaderMap,
    Json(request): Json<PublishRequest>,
) -> Result<(StatusCode, Json<AuctionResponse>), ApiError> {
    let seller = user_id(&headers)?;
    let auction = engine
        .publish(
            seller,
            request.item,
            Amount::new(request.start_price),
            Duration::seconds(request.duration_secs),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuctionResponse::from_auction(&auction)),
    ))
}

async fn get_auction(
    State(engine): State<Arc<AuctionEngine>>,
    Path(id): Path<u64>,
) -> Result<Json<AuctionResponse>, ApiError> {
    let auction = engine.auction(AuctionId::new(id)).await?;
    Ok(Json(AuctionResponse::from_auction(&auction)))
}

async fn submit_bid(
    State(engine): State<Arc<AuctionEngine>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(request): Json<BidRequest>,
) -> Result<(StatusCode, Json<BidOutcomeResponse>), ApiError> {
    let buyer = user_id(&headers)?;
    let outcome = engine
        .submit(
            AuctionId::new(id),
            buyer,
            Amount::new(request.amount),
            &request.client_request_id,
        )
        .await?;

    Ok(outcome_response(outcome))
}

async fn bid_outcome(
    State(engine): State<Arc<AuctionEngine>>,
    Path((_id, client_request_id)): Path<(u64, String)>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<BidOutcomeResponse>), ApiError> {
    let buyer = user_id(&headers)?;
    match engine.outcome(buyer, &client_request_id) {
        Some(outcome) => Ok(outcome_response(outcome)),
        None => Err(ApiError::NotFound(
            "no recorded outcome for this request id".to_string(),
        )),
    }
}

async fn close_auction(
    State(engine): State<Arc<AuctionEngine>>,
    Path(id): Path<u64>,
) -> Result<Json<CloseResponse>, ApiError> {
    let outcome = engine.close(AuctionId::new(id)).await?;
    Ok(Json(CloseResponse::from_outcome(outcome)))
}

async fn republish_auction(
    State(engine): State<Arc<AuctionEngine>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<AuctionResponse>), ApiError> {
    let seller = user_id(&headers)?;
    let fresh = engine.republish(AuctionId::new(id), seller).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuctionResponse::from_auction(&fresh)),
    ))
}

async fn stop_auction(
    State(engine): State<Arc<AuctionEngine>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let seller = user_id(&headers)?;
    engine.stop(AuctionId::new(id), seller).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use gavel_core::error::ValidationError;

    use super::*;

    #[test]
    fn outcome_responses_map_to_expected_statuses() {
        let (status, body) = outcome_response(BidOutcome::Accepted {
            price: Amount::new(11_000),
            end_at: Utc::now(),
        });
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.0.status, "accepted");
        assert_eq!(body.0.price, Some(11_000));

        let (status, body) = outcome_response(BidOutcome::Pending);
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body.0.status, "pending");

        let (status, body) = outcome_response(BidOutcome::Rejected(RejectReason::TooLow));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.0.reason, Some("bid_too_low"));
        assert_eq!(body.0.retryable, Some(true));

        let (status, _) = outcome_response(BidOutcome::Rejected(RejectReason::TooHigh));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = outcome_response(BidOutcome::Rejected(RejectReason::AuctionNotLive));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.0.reason, Some("auction_not_live"));
        assert_eq!(body.0.retryable, Some(false));

        let (status, _) = outcome_response(BidOutcome::Rejected(RejectReason::AuctionNotFound));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            outcome_response(BidOutcome::Rejected(RejectReason::StoreFailure("down".into())));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0.retryable, Some(true));
    }

    #[test]
    fn api_errors_map_to_expected_statuses() {
        assert_eq!(ApiError::MissingUser.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Engine(ValidationError::AmountNotPositive.into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Engine(StateError::AuctionNotFound.into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Engine(StateError::HasBids.into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Engine(StateError::NotSeller.into()).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn user_header_is_parsed_or_rejected() {
        let mut headers = HeaderMap::new();
        assert!(matches!(user_id(&headers), Err(ApiError::MissingUser)));

        headers.insert(USER_HEADER, "42".parse().unwrap());
        assert_eq!(user_id(&headers).unwrap(), UserId::new(42));

        headers.insert(USER_HEADER, "not-a-number".parse().unwrap());
        assert!(matches!(user_id(&headers), Err(ApiError::MissingUser)));
    }

    #[test]
    fn auction_response_carries_wire_fields() {
        let now = Utc::now();
        let auction = Auction::new_listing(
            AuctionId::new(3),
            UserId::new(9),
            "camera".into(),
            Amount::new(10_000),
            now,
            now + Duration::hours(1),
        );

        let response = AuctionResponse::from_auction(&auction);
        assert_eq!(response.id, 3);
        assert_eq!(response.seller, 9);
        assert_eq!(response.current_price, 10_000);
        assert_eq!(response.status, "live");
        assert_eq!(response.leader, None);
    }
}
