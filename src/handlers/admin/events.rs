use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::convert::Infallible;

use crate::app::AppState;
use crate::database::Table;
use crate::error::ApiError;
use crate::events::{ChangeEvent, EventFilter};
use crate::middleware::AdminSession;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub table: Option<String>,
}

/// GET /api/admin/events?table= - server-sent change events
pub async fn stream(
    State(state): State<AppState>,
    admin: AdminSession,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let filter = match query.table.as_deref().filter(|t| !t.is_empty()) {
        Some(name) => {
            let table = Table::parse(name).ok_or_else(|| ApiError::field_error("table", format!("Unknown table: {}", name)))?;
            EventFilter::table(table)
        }
        None => EventFilter::default(),
    };
    tracing::info!(admin = %admin.user_id, table = ?filter.table, "event stream opened");

    let subscription = state.events.subscribe(filter);
    let events = stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.recv().await?;
        Some((Ok::<_, Infallible>(to_sse(&event)), subscription))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &ChangeEvent) -> Event {
    let name = format!("{}.{}", event.table, event.operation.as_str());
    match Event::default().event(name).json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            tracing::warn!("failed to encode change event: {}", e);
            Event::default().comment("unencodable event")
        }
    }
}
