use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::engine::{BookingFilter, Engine, EngineError, view};
use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::observability;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec: {0}")]
    Codec(#[from] LinesCodecError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// One request per line, discriminated by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CreateBooking {
        resource: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        requested_by: String,
    },
    UpdateBooking {
        id: Ulid,
        resource: Option<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        requested_by: Option<String>,
    },
    CancelBooking {
        id: Ulid,
    },
    DeleteBooking {
        id: Ulid,
    },
    GetBooking {
        id: Ulid,
    },
    ListBookings {
        resource: Option<String>,
        date: Option<NaiveDate>,
        requested_by: Option<String>,
        #[serde(default)]
        grouped: bool,
    },
    AvailableSlots {
        resource: String,
        date: NaiveDate,
        duration: Option<i64>,
    },
    ListResources,
    CreateResource {
        name: String,
        description: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingDto {
    pub id: Ulid,
    pub resource: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub requested_by: String,
    pub status: BookingStatus,
}

impl From<BookingView> for BookingDto {
    fn from(v: BookingView) -> Self {
        Self {
            id: v.booking.id,
            start: to_utc(v.booking.start),
            end: to_utc(v.booking.end),
            resource: v.booking.resource,
            requested_by: v.booking.requested_by,
            status: v.status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotDto {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
}

impl From<Slot> for SlotDto {
    fn from(s: Slot) -> Self {
        Self {
            start: to_utc(s.start),
            end: to_utc(s.end),
            duration_minutes: s.duration_minutes,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Data {
    Booking(BookingDto),
    Bookings(Vec<BookingDto>),
    Grouped(BTreeMap<String, Vec<BookingDto>>),
    Slots(Vec<SlotDto>),
    Resources(Vec<Resource>),
    Created { created: bool },
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub code: &'static str,
    pub message: String,
}

impl From<&EngineError> for ErrorBody {
    fn from(e: &EngineError) -> Self {
        Self {
            kind: e.kind().as_str(),
            code: e.code(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Data>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    pub fn success(data: Data) -> Self {
        Self { ok: true, data: Some(data), error: None }
    }

    pub fn failure(error: ErrorBody) -> Self {
        Self { ok: false, data: None, error: Some(error) }
    }

    /// Rejection that never reached the engine (bad JSON, oversized line).
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::failure(ErrorBody {
            kind: "VALIDATION",
            code: "VALIDATION",
            message: message.into(),
        })
    }
}

fn current_time() -> Ms {
    from_utc(&Utc::now())
}

/// Execute one decoded request against the engine.
pub async fn dispatch(engine: &Engine, req: Request) -> Result<Data, EngineError> {
    let now = current_time();
    match req {
        Request::CreateBooking {
            resource,
            start,
            end,
            requested_by,
        } => {
            let booking = engine
                .create_booking(&resource, from_utc(&start), from_utc(&end), &requested_by)
                .await?;
            Ok(Data::Booking(view(booking, now).into()))
        }
        Request::UpdateBooking {
            id,
            resource,
            start,
            end,
            requested_by,
        } => {
            let patch = BookingPatch {
                resource,
                start: start.as_ref().map(from_utc),
                end: end.as_ref().map(from_utc),
                requested_by,
            };
            let booking = engine.update_booking(id, patch).await?;
            Ok(Data::Booking(view(booking, now).into()))
        }
        Request::CancelBooking { id } => {
            let booking = engine.cancel_booking_at(id, now).await?;
            Ok(Data::Booking(view(booking, now).into()))
        }
        Request::DeleteBooking { id } => {
            let booking = engine.delete_booking(id).await?;
            Ok(Data::Booking(view(booking, now).into()))
        }
        Request::GetBooking { id } => Ok(Data::Booking(engine.get_booking(id, now).await?.into())),
        Request::ListBookings {
            resource,
            date,
            requested_by,
            grouped,
        } => {
            let filter = BookingFilter {
                resource,
                date,
                requested_by,
            };
            if grouped {
                let groups = engine
                    .bookings_grouped_by_resource(&filter, now)
                    .await?
                    .into_iter()
                    .map(|(name, views)| (name, views.into_iter().map(BookingDto::from).collect()))
                    .collect();
                Ok(Data::Grouped(groups))
            } else {
                let views = engine.list_bookings(&filter, now).await?;
                Ok(Data::Bookings(views.into_iter().map(BookingDto::from).collect()))
            }
        }
        Request::AvailableSlots {
            resource,
            date,
            duration,
        } => {
            let slots = engine.available_slots(&resource, date, duration).await?;
            Ok(Data::Slots(slots.into_iter().map(SlotDto::from).collect()))
        }
        Request::ListResources => Ok(Data::Resources(engine.list_resources().await?)),
        Request::CreateResource { name, description } => {
            let created = engine.create_resource(&name, description).await?;
            Ok(Data::Created { created })
        }
    }
}

/// Decode, execute and encode a single request line. Never fails on bad
/// input: every outcome becomes a reply.
pub async fn handle_line(engine: &Engine, line: &str) -> Result<String, WireError> {
    let started = Instant::now();
    let req: Request = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => {
            metrics::counter!(observability::REQUESTS_TOTAL, "op" => "invalid", "status" => "error")
                .increment(1);
            debug!("malformed request: {e}");
            return Ok(serde_json::to_string(&Reply::malformed(format!("malformed request: {e}")))?);
        }
    };

    let label = observability::request_label(&req);
    let reply = match dispatch(engine, req).await {
        Ok(data) => {
            metrics::counter!(observability::REQUESTS_TOTAL, "op" => label, "status" => "ok").increment(1);
            Reply::success(data)
        }
        Err(e) => {
            metrics::counter!(observability::REQUESTS_TOTAL, "op" => label, "status" => "error")
                .increment(1);
            if let EngineError::Store(ref inner) = e {
                warn!("{label} failed in storage: {inner}");
            }
            Reply::failure(ErrorBody::from(&e))
        }
    };
    metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => label)
        .record(started.elapsed().as_secs_f64());
    Ok(serde_json::to_string(&reply)?)
}

/// Serve one client until it disconnects.
pub async fn process_connection(socket: TcpStream, engine: Arc<Engine>) -> Result<(), WireError> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let mut resuming = false;
    loop {
        let frame = match framed.next().await {
            Some(frame) => frame,
            // a decode error pauses the stream for one poll
            None if resuming => {
                resuming = false;
                continue;
            }
            None => break,
        };
        resuming = false;
        let reply = match frame {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(&engine, &line).await?,
            // the codec discards the rest of the oversized line
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                resuming = true;
                debug!("rejected request line over {MAX_LINE_LEN} bytes");
                serde_json::to_string(&Reply::malformed(format!(
                    "line exceeds {MAX_LINE_LEN} bytes"
                )))?
            }
            Err(e) => return Err(e.into()),
        };
        framed.send(reply).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::store::LocalStore;
    use serde_json::Value;

    fn engine() -> Engine {
        let config = SchedulerConfig::default();
        Engine::new(Arc::new(LocalStore::in_memory(Some(config.buffer_ms))), config)
    }

    async fn call(engine: &Engine, line: &str) -> Value {
        let out = handle_line(engine, line).await.unwrap();
        serde_json::from_str(&out).unwrap()
    }

    #[test]
    fn parses_create_request() {
        let req: Request = serde_json::from_str(
            r#"{"op":"create_booking","resource":"R1","start":"2030-01-01T10:00:00Z","end":"2030-01-01T10:30:00Z","requested_by":"ana"}"#,
        )
        .unwrap();
        match req {
            Request::CreateBooking { resource, start, .. } => {
                assert_eq!(resource, "R1");
                assert_eq!(start.to_rfc3339(), "2030-01-01T10:00:00+00:00");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn optional_fields_default() {
        let req: Request = serde_json::from_str(r#"{"op":"list_bookings"}"#).unwrap();
        assert_eq!(
            req,
            Request::ListBookings {
                resource: None,
                date: None,
                requested_by: None,
                grouped: false
            }
        );
        let req: Request = serde_json::from_str(r#"{"op":"list_resources"}"#).unwrap();
        assert_eq!(observability::request_label(&req), "list_resources");
    }

    #[tokio::test]
    async fn create_then_conflict() {
        let engine = engine();
        let ok = call(
            &engine,
            r#"{"op":"create_booking","resource":"R1","start":"2030-01-01T10:00:00Z","end":"2030-01-01T10:30:00Z","requested_by":"ana"}"#,
        )
        .await;
        assert_eq!(ok["ok"], true);
        assert_eq!(ok["data"]["status"], "UPCOMING");
        assert_eq!(ok["data"]["resource"], "R1");

        let clash = call(
            &engine,
            r#"{"op":"create_booking","resource":"R1","start":"2030-01-01T10:35:00Z","end":"2030-01-01T11:00:00Z","requested_by":"bo"}"#,
        )
        .await;
        assert_eq!(clash["ok"], false);
        assert_eq!(clash["error"]["code"], "CONFLICT");
        assert_eq!(clash["error"]["kind"], "CONFLICT");
        assert!(clash.get("data").is_none());
    }

    #[tokio::test]
    async fn malformed_json_is_validation() {
        let engine = engine();
        let reply = call(&engine, "{not json").await;
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], "VALIDATION");

        let reply = call(&engine, r#"{"op":"teleport"}"#).await;
        assert_eq!(reply["error"]["code"], "VALIDATION");
    }

    #[tokio::test]
    async fn unknown_booking_not_found() {
        let engine = engine();
        let line = format!(r#"{{"op":"cancel_booking","id":"{}"}}"#, Ulid::new());
        let reply = call(&engine, &line).await;
        assert_eq!(reply["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn slots_reply_shape() {
        let engine = engine();
        let reply = call(
            &engine,
            r#"{"op":"available_slots","resource":"R1","date":"2030-01-01","duration":60}"#,
        )
        .await;
        let slots = reply["data"].as_array().unwrap();
        assert_eq!(slots.len(), 33);
        assert_eq!(slots[0]["start"], "2030-01-01T09:00:00Z");
        assert_eq!(slots[0]["duration_minutes"], 60);
    }
}
