use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use super::{BusyInterval, CalendarEvent, CalendarProvider};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
const API_BASE: &str = "https://www.googleapis.com/calendar/v3/calendars";
const TIME_ZONE: &str = "Europe/Bucharest";

/// Service-account assertion exchanged for an access token.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    start: Option<EventTime>,
    end: Option<EventTime>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<EventItem>,
}

pub struct GoogleCalendar {
    calendar_id: String,
    service_account_email: String,
    key: EncodingKey,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleCalendar {
    pub fn new(
        calendar_id: String,
        service_account_email: String,
        private_key_pem: &str,
    ) -> anyhow::Result<Self> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .context("invalid Google service account private key")?;
        Ok(Self {
            calendar_id,
            service_account_email,
            key,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .context("failed to build HTTP client")?,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        let mut cached = self.token.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref() {
            if token.expires_at > now + Duration::seconds(60) {
                return Ok(token.value.clone());
            }
        }

        let claims = AssertionClaims {
            iss: &self.service_account_email,
            scope: CALENDAR_SCOPE,
            aud: TOKEN_URL,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .context("failed to sign service account assertion")?;

        let resp: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context("failed to call Google token endpoint")?
            .error_for_status()
            .context("Google token endpoint returned error")?
            .json()
            .await
            .context("failed to parse Google token response")?;

        *cached = Some(CachedToken {
            value: resp.access_token.clone(),
            expires_at: now + Duration::seconds(resp.expires_in),
        });
        Ok(resp.access_token)
    }

    fn events_url(&self, event_id: Option<&str>) -> anyhow::Result<Url> {
        let mut url = Url::parse(API_BASE)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("calendar API base cannot hold a path"))?;
            segments.push(&self.calendar_id).push("events");
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn event_body(event: &CalendarEvent) -> serde_json::Value {
        json!({
            "summary": event.summary,
            "description": event.description,
            "start": { "dateTime": event.start.to_rfc3339(), "timeZone": TIME_ZONE },
            "end": { "dateTime": event.end.to_rfc3339(), "timeZone": TIME_ZONE },
        })
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendar {
    async fn create_event(&self, event: &CalendarEvent) -> anyhow::Result<String> {
        let token = self.access_token().await?;
        let data: serde_json::Value = self
            .client
            .post(self.events_url(None)?)
            .bearer_auth(token)
            .json(&Self::event_body(event))
            .send()
            .await
            .context("failed to call Google Calendar API")?
            .error_for_status()
            .context("Google Calendar rejected event creation")?
            .json()
            .await
            .context("failed to parse Google Calendar response")?;

        data["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing id in Google Calendar response"))
    }

    async fn update_event(&self, event_id: &str, event: &CalendarEvent) -> anyhow::Result<()> {
        let token = self.access_token().await?;
        self.client
            .patch(self.events_url(Some(event_id))?)
            .bearer_auth(token)
            .json(&Self::event_body(event))
            .send()
            .await
            .context("failed to call Google Calendar API")?
            .error_for_status()
            .context("Google Calendar rejected event update")?;
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> anyhow::Result<()> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .delete(self.events_url(Some(event_id))?)
            .bearer_auth(token)
            .send()
            .await
            .context("failed to call Google Calendar API")?;

        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                tracing::debug!(event_id, "calendar event already gone");
                Ok(())
            }
            _ => {
                resp.error_for_status()
                    .context("Google Calendar rejected event deletion")?;
                Ok(())
            }
        }
    }

    async fn list_events(
        &self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> anyhow::Result<Vec<BusyInterval>> {
        let token = self.access_token().await?;
        let mut url = self.events_url(None)?;
        url.query_pairs_mut()
            .append_pair("timeMin", &start.to_rfc3339())
            .append_pair("timeMax", &end.to_rfc3339())
            .append_pair("singleEvents", "true")
            .append_pair("orderBy", "startTime");

        let list: EventList = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .context("failed to call Google Calendar API")?
            .error_for_status()
            .context("Google Calendar rejected event listing")?
            .json()
            .await
            .context("failed to parse Google Calendar event list")?;

        Ok(busy_intervals(list))
    }
}

/// Timed, non-cancelled events. All-day entries carry no `dateTime` and are skipped.
fn busy_intervals(list: EventList) -> Vec<BusyInterval> {
    list.items
        .into_iter()
        .filter(|item| item.status.as_deref() != Some("cancelled"))
        .filter_map(|item| {
            Some(BusyInterval {
                start: item.start?.date_time?,
                end: item.end?.date_time?,
            })
        })
        .collect()
}
