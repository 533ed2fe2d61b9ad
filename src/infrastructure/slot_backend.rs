use crate::domain::models::{RawSlot, WorkPeriod};
use crate::domain::window::{parse_instant, TimeWindow};
use crate::infrastructure::config::BackendConfig;
use crate::infrastructure::error::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use std::sync::Mutex;
use url::Url;

const PAGE_LIMIT: u32 = 500;

/// Remote store boundary. Exactly the five operations the engine needs;
/// everything else about the backend (auth, pagination, wire format) stays
/// behind the implementation.
#[async_trait]
pub trait SlotBackend: Send + Sync {
    async fn fetch_period(&self, period_id: &str) -> Result<WorkPeriod, EngineError>;

    async fn fetch_slots_in_window(&self, window: &TimeWindow)
        -> Result<Vec<RawSlot>, EngineError>;

    async fn create_slot(
        &self,
        task_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RawSlot, EngineError>;

    async fn update_slot(
        &self,
        slot_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<RawSlot, EngineError>;

    async fn delete_slot(&self, slot_id: &str) -> Result<(), EngineError>;
}

#[derive(Debug, Default)]
struct Session {
    token: Option<String>,
    user_id: Option<String>,
}

/// HTTP implementation against a slot-tracking backend with bearer-token
/// sessions and cursor pagination.
#[derive(Debug)]
pub struct HttpSlotBackend {
    client: Client,
    base_url: Url,
    company_id: String,
    session: Mutex<Session>,
}

#[derive(Debug, serde::Serialize)]
struct LoginRequest<'a> {
    identifier: &'a str,
    login: &'a str,
    password: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct LoginResponse {
    token: Option<String>,
    user: Option<LoginUser>,
}

#[derive(Debug, serde::Deserialize)]
struct LoginUser {
    id: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct SlotsPageResponse {
    data: Option<Vec<RawSlot>>,
    next_page_token: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct CreateSlotRequest<'a> {
    start: String,
    end: String,
    status: &'static str,
    task_id: &'a str,
    changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct UpdateSlotRequest {
    changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<String>,
}

impl HttpSlotBackend {
    pub fn new(base_url: Url, company_id: &str) -> Self {
        Self {
            client: Client::new(),
            base_url,
            company_id: company_id.to_string(),
            session: Mutex::new(Session::default()),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, EngineError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|error| EngineError::InvalidConfig(format!("invalid base url: {error}")))?;
        Ok(Self::new(base_url, &config.company_id))
    }

    /// Opens a bearer-token session. Must be called before any slot or
    /// period operation.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), EngineError> {
        let endpoint = self.endpoint(&["login"])?;
        let request = LoginRequest {
            identifier: &self.company_id,
            login: username,
            password,
        };

        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let body = Self::check_status(response).await?;
        let parsed: LoginResponse = serde_json::from_str(&body).map_err(|error| {
            EngineError::BackendRejected {
                message: format!("invalid login payload: {error}"),
                status: None,
            }
        })?;

        let token = parsed.token.ok_or_else(|| EngineError::BackendRejected {
            message: "authentication failed, no token received".to_string(),
            status: None,
        })?;

        let mut session = self.lock_session()?;
        session.token = Some(token);
        session.user_id = parsed.user.and_then(|user| user.id);
        Ok(())
    }

    pub fn logout(&self) -> Result<(), EngineError> {
        let mut session = self.lock_session()?;
        session.token = None;
        session.user_id = None;
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock_session()
            .map(|session| session.token.is_some())
            .unwrap_or(false)
    }

    fn lock_session(&self) -> Result<std::sync::MutexGuard<'_, Session>, EngineError> {
        self.session
            .lock()
            .map_err(|error| EngineError::BackendUnavailable(format!("session lock poisoned: {error}")))
    }

    fn bearer_token(&self) -> Result<String, EngineError> {
        self.lock_session()?
            .token
            .clone()
            .ok_or_else(|| EngineError::BackendRejected {
                message: "not authenticated".to_string(),
                status: Some(401),
            })
    }

    fn user_id(&self) -> Option<String> {
        self.lock_session().ok().and_then(|session| session.user_id.clone())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, EngineError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                EngineError::InvalidConfig("backend base URL cannot be a base".to_string())
            })?;
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn check_status(response: reqwest::Response) -> Result<String, EngineError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| EngineError::BackendUnavailable(format!("failed reading response: {error}")))?;

        if status.is_success() {
            return Ok(body);
        }
        Err(EngineError::BackendRejected {
            message: rejection_message(status.as_u16(), &body),
            status: Some(status.as_u16()),
        })
    }

    async fn fetch_slot_pages(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<RawSlot>, EngineError> {
        let token = self.bearer_token()?;
        let endpoint = self.endpoint(&["project-times"])?;
        let mut slots = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(endpoint.clone())
                .bearer_auth(&token)
                .query(&[("start_from", start_date), ("start_to", end_date)])
                .query(&[("limit", PAGE_LIMIT)]);
            if let Some(user_id) = self.user_id() {
                request = request.query(&[("user", user_id.as_str())]);
            }
            if let Some(page_token) = page_token.as_deref() {
                request = request.query(&[("page_token", page_token)]);
            }

            let response = request.send().await.map_err(transport_error)?;
            let body = Self::check_status(response).await?;
            let mut parsed: SlotsPageResponse =
                serde_json::from_str(&body).map_err(|error| EngineError::BackendRejected {
                    message: format!("invalid slot list payload: {error}"),
                    status: None,
                })?;

            let page = parsed.data.take().unwrap_or_default();
            if page.is_empty() {
                break;
            }
            slots.extend(page);

            match parsed.next_page_token.take() {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        log::debug!("fetched {} raw slots between {start_date} and {end_date}", slots.len());
        Ok(slots)
    }
}

#[async_trait]
impl SlotBackend for HttpSlotBackend {
    async fn fetch_period(&self, period_id: &str) -> Result<WorkPeriod, EngineError> {
        let token = self.bearer_token()?;
        let endpoint = self.endpoint(&["working-times", period_id])?;
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_error)?;
        let body = Self::check_status(response).await?;
        serde_json::from_str(&body).map_err(|error| EngineError::BackendRejected {
            message: format!("invalid work period payload: {error}"),
            status: None,
        })
    }

    async fn fetch_slots_in_window(
        &self,
        window: &TimeWindow,
    ) -> Result<Vec<RawSlot>, EngineError> {
        // The backend filters by calendar date only; narrow to the exact
        // window locally. Slots with unparsable boundaries are dropped here,
        // the aggregator could not use them anyway.
        let start_date = window.start.date_naive().to_string();
        let end_date = window.end.date_naive().to_string();
        let slots = self.fetch_slot_pages(&start_date, &end_date).await?;

        Ok(slots
            .into_iter()
            .filter(|slot| {
                let (Some(start), Some(end)) = (
                    slot.start.as_deref().and_then(parse_instant),
                    slot.end.as_deref().and_then(parse_instant),
                ) else {
                    log::warn!("slot {} has unparsable boundaries, dropping", slot.id);
                    return false;
                };
                (start >= window.start && start < window.end)
                    || (end > window.start && end <= window.end)
                    || (start <= window.start && end >= window.end)
            })
            .collect())
    }

    async fn create_slot(
        &self,
        task_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RawSlot, EngineError> {
        if task_id.trim().is_empty() {
            return Err(EngineError::BackendRejected {
                message: "task id is required to create a slot".to_string(),
                status: None,
            });
        }

        let token = self.bearer_token()?;
        let endpoint = self.endpoint(&["project-times"])?;
        let request = CreateSlotRequest {
            start: format_instant(start),
            end: format_instant(end),
            status: "changeable",
            task_id,
            changed: true,
            user_id: self.user_id(),
        };

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let body = Self::check_status(response).await.map_err(enrich_not_bookable)?;
        serde_json::from_str(&body).map_err(|error| EngineError::BackendRejected {
            message: format!("invalid slot create payload: {error}"),
            status: None,
        })
    }

    async fn update_slot(
        &self,
        slot_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<RawSlot, EngineError> {
        let token = self.bearer_token()?;
        let endpoint = self.endpoint(&["project-times", slot_id])?;
        let request = UpdateSlotRequest {
            changed: true,
            start: start.map(format_instant),
            end: end.map(format_instant),
        };

        let response = self
            .client
            .patch(endpoint)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let body = Self::check_status(response).await?;
        serde_json::from_str(&body).map_err(|error| EngineError::BackendRejected {
            message: format!("invalid slot update payload: {error}"),
            status: None,
        })
    }

    async fn delete_slot(&self, slot_id: &str) -> Result<(), EngineError> {
        let token = self.bearer_token()?;
        let endpoint = self.endpoint(&["project-times", slot_id])?;
        let response = self
            .client
            .delete(endpoint)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check_status(response).await?;
        Ok(())
    }
}

/// Instants go over the wire with an explicit `+00:00` offset; the backend
/// does not accept the `Z` shorthand everywhere.
fn format_instant(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn transport_error(error: reqwest::Error) -> EngineError {
    if error.is_timeout() {
        return EngineError::BackendUnavailable("request timed out".to_string());
    }
    if error.is_connect() {
        return EngineError::BackendUnavailable(format!("connection failed: {error}"));
    }
    EngineError::BackendUnavailable(format!("request failed: {error}"))
}

/// Prefers the backend's own structured message so business-rule detail
/// (frozen periods, non-bookable tasks) reaches the user verbatim.
fn rejection_message(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = parsed.get("message").and_then(serde_json::Value::as_str) {
            return message.to_string();
        }
    }
    if body.trim().is_empty() {
        format!("backend returned http {status}")
    } else {
        format!("backend returned http {status}: {body}")
    }
}

fn enrich_not_bookable(error: EngineError) -> EngineError {
    match error {
        EngineError::BackendRejected { message, status }
            if message.to_ascii_lowercase().contains("not bookable") =>
        {
            EngineError::BackendRejected {
                message: "Task is not bookable. Select a different task or check that the task is active.".to_string(),
                status,
            }
        }
        other => other,
    }
}
