//! Google Calendar event listing
//!
//! Fetches every page of `events.list` for a time range and converts the
//! API items into `provider::Event`. The API already orders by start time
//! (`orderBy=startTime` with expanded recurrences), so pages are concatenated
//! without re-sorting.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use provider::{Event, EventTime};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// One page of the events.list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: String,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    status: Option<String>,
    html_link: Option<String>,
    hangout_link: Option<String>,
    conference_data: Option<ApiConferenceData>,
    start: Option<ApiEventTime>,
    end: Option<ApiEventTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date_time: Option<DateTime<FixedOffset>>,
    date: Option<NaiveDate>,
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiConferenceData {
    #[serde(default)]
    entry_points: Vec<ApiEntryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEntryPoint {
    entry_point_type: Option<String>,
    uri: Option<String>,
}

/// Upper bound on pages fetched for one range.
const MAX_PAGES: usize = 50;

/// List events of `calendar_id` starting in `[time_min, time_max)`.
///
/// A repeated `nextPageToken` or more than `MAX_PAGES` pages is an invalid
/// response.
pub async fn list_events(
    client: &reqwest::Client,
    calendar_api_base: &str,
    access_token: &str,
    calendar_id: &str,
    time_min: DateTime<Utc>,
    time_max: DateTime<Utc>,
) -> Result<Vec<Event>> {
    let url = format!(
        "{}/calendars/{}/events",
        calendar_api_base.trim_end_matches('/'),
        url::form_urlencoded::byte_serialize(calendar_id.as_bytes()).collect::<String>()
    );

    let mut events = Vec::new();
    let mut page_token: Option<String> = None;
    let mut seen_tokens = HashSet::new();

    for _ in 0..MAX_PAGES {
        let mut request = client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ]);
        if let Some(token) = &page_token {
            request = request.query(&[("pageToken", token.as_str())]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Http("events request timeout".into())
            } else {
                Error::Http(format!("events request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("events.list returned {status}: {body}")));
        }

        let page = response
            .json::<EventListResponse>()
            .await
            .map_err(|e| Error::InvalidResponse(format!("invalid events response: {e}")))?;

        events.extend(page.items.into_iter().filter_map(convert_event));

        match page.next_page_token {
            Some(token) if !seen_tokens.insert(token.clone()) => {
                return Err(Error::InvalidResponse(format!(
                    "events.list repeated page token {token}"
                )));
            }
            Some(token) => page_token = Some(token),
            None => {
                debug!(calendar_id, count = events.len(), "fetched events");
                return Ok(events);
            }
        }
    }

    Err(Error::InvalidResponse(format!(
        "events.list exceeded {MAX_PAGES} pages"
    )))
}

fn convert_event(event: ApiEvent) -> Option<Event> {
    let (Some(start), Some(end)) = (
        event.start.and_then(convert_time),
        event.end.and_then(convert_time),
    ) else {
        warn!(event_id = %event.id, "skipping event without usable start/end");
        return None;
    };

    let meeting_url = event.hangout_link.or_else(|| {
        event.conference_data.and_then(|data| {
            data.entry_points
                .into_iter()
                .find(|ep| ep.entry_point_type.as_deref() == Some("video"))
                .and_then(|ep| ep.uri)
        })
    });

    Some(Event {
        id: event.id,
        title: event.summary,
        start,
        end,
        description: event.description,
        location: event.location,
        status: event.status,
        html_link: event.html_link,
        meeting_url,
    })
}

fn convert_time(time: ApiEventTime) -> Option<EventTime> {
    match (time.date_time, time.date) {
        (Some(date_time), _) => Some(EventTime::DateTime {
            date_time,
            time_zone: time.time_zone,
        }),
        (None, Some(date)) => Some(EventTime::Date { date }),
        (None, None) => None,
    }
}
